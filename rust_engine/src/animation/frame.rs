//! 帧：单个时间步的全骨骼世界变换

use glam::{Mat4, Quat, Vec3};

use super::MotionData;

/// 存储的帧数据
///
/// `world` 位于数据的原始坐标空间（未镜像、未缩放、未偏移），
/// 查询时才应用镜像、缩放和偏移。
#[derive(Clone, Debug)]
pub struct Frame {
    /// 1 起始索引
    pub index: usize,
    /// 时间戳（秒）
    pub timestamp: f32,
    pub world: Vec<Mat4>,
}

impl Frame {
    pub fn new(index: usize, timestamp: f32, world: Vec<Mat4>) -> Self {
        Self {
            index,
            timestamp,
            world,
        }
    }
}

/// 帧查询视图（借用所属的 MotionData）
#[derive(Clone, Copy, Debug)]
pub struct FrameRef<'a> {
    data: &'a MotionData,
    frame: &'a Frame,
}

impl<'a> PartialEq for FrameRef<'a> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.data, other.data) && self.frame.index == other.frame.index
    }
}

impl<'a> FrameRef<'a> {
    pub(crate) fn new(data: &'a MotionData, frame: &'a Frame) -> Self {
        Self { data, frame }
    }

    pub fn index(&self) -> usize {
        self.frame.index
    }

    pub fn timestamp(&self) -> f32 {
        self.frame.timestamp
    }

    pub fn world(&self) -> &'a [Mat4] {
        &self.frame.world
    }

    pub fn data(&self) -> &'a MotionData {
        self.data
    }

    pub fn first(&self) -> FrameRef<'a> {
        self.data.first_frame()
    }

    pub fn last(&self) -> FrameRef<'a> {
        self.data.last_frame()
    }

    /// 上一帧，首帧返回 None
    pub fn previous(&self) -> Option<FrameRef<'a>> {
        (self.frame.index > 1).then(|| self.data.frame(self.frame.index - 1))
    }

    /// 下一帧，末帧返回 None
    pub fn next(&self) -> Option<FrameRef<'a>> {
        (self.frame.index < self.data.total_frames()).then(|| self.data.frame(self.frame.index + 1))
    }

    // ========== 变换 ==========

    /// 骨骼变换：可选镜像，再应用全局缩放和偏移（仅作用于平移）
    pub fn bone_transformation(&self, bone: usize, mirrored: bool) -> Mat4 {
        let data = self.data;
        let (mut m, offset) = if mirrored {
            (
                data.mirror_axis.mirror_matrix(&self.frame.world[bone]),
                data.mirror_axis.mirror_vector(data.offset),
            )
        } else {
            (self.frame.world[bone], data.offset)
        };
        let translation = m.w_axis.truncate();
        m.w_axis = ((translation + offset) * data.scale).extend(1.0);
        m
    }

    pub fn bone_transformations(&self, mirrored: bool) -> Vec<Mat4> {
        (0..self.frame.world.len())
            .map(|i| self.bone_transformation(i, mirrored))
            .collect()
    }

    /// 按名称查询，未找到返回 None
    pub fn bone_transformation_by_name(&self, name: &str, mirrored: bool) -> Option<Mat4> {
        let index = self.data.bone_index(name)?;
        Some(self.bone_transformation(index, mirrored))
    }

    pub fn bone_transformations_by_name(&self, names: &[&str], mirrored: bool) -> Option<Vec<Mat4>> {
        names
            .iter()
            .map(|name| self.bone_transformation_by_name(name, mirrored))
            .collect()
    }

    pub fn bone_position(&self, bone: usize, mirrored: bool) -> Vec3 {
        self.bone_transformation(bone, mirrored).w_axis.truncate()
    }

    pub fn bone_rotation(&self, bone: usize, mirrored: bool) -> Quat {
        let (_, rotation, _) = self.bone_transformation(bone, mirrored).to_scale_rotation_translation();
        rotation.normalize()
    }

    // ========== 差分 ==========

    /// 有限差分的对比帧；时间戳减 delta 小于 0 时使用前向差分
    fn neighbour(&self, delta: f32) -> (FrameRef<'a>, bool) {
        if self.frame.timestamp - delta < 0.0 {
            (self.data.frame_at(self.frame.timestamp + delta), true)
        } else {
            (self.data.frame_at(self.frame.timestamp - delta), false)
        }
    }

    /// 骨骼速度，delta 为 0 时返回零向量
    pub fn bone_velocity(&self, bone: usize, mirrored: bool, delta: f32) -> Vec3 {
        if delta == 0.0 {
            return Vec3::ZERO;
        }
        let current = self.bone_position(bone, mirrored);
        let (other, forward) = self.neighbour(delta);
        let other = other.bone_position(bone, mirrored);
        if forward {
            (other - current) / delta
        } else {
            (current - other) / delta
        }
    }

    pub fn bone_velocities(&self, mirrored: bool, delta: f32) -> Vec<Vec3> {
        (0..self.frame.world.len())
            .map(|i| self.bone_velocity(i, mirrored, delta))
            .collect()
    }

    pub fn bone_velocity_by_name(&self, name: &str, mirrored: bool, delta: f32) -> Option<Vec3> {
        let index = self.data.bone_index(name)?;
        Some(self.bone_velocity(index, mirrored, delta))
    }

    /// 骨骼加速度（速度的差分，边界规则与速度相同）
    pub fn bone_acceleration(&self, bone: usize, mirrored: bool, delta: f32) -> Vec3 {
        if delta == 0.0 {
            return Vec3::ZERO;
        }
        let current = self.bone_velocity(bone, mirrored, delta);
        let (other, forward) = self.neighbour(delta);
        let other = other.bone_velocity(bone, mirrored, delta);
        if forward {
            (other - current) / delta
        } else {
            (current - other) / delta
        }
    }

    pub fn bone_accelerations(&self, mirrored: bool, delta: f32) -> Vec<Vec3> {
        (0..self.frame.world.len())
            .map(|i| self.bone_acceleration(i, mirrored, delta))
            .collect()
    }

    pub fn bone_acceleration_by_name(&self, name: &str, mirrored: bool, delta: f32) -> Option<Vec3> {
        let index = self.data.bone_index(name)?;
        Some(self.bone_acceleration(index, mirrored, delta))
    }

    /// 角速度（弧度/秒）
    pub fn angular_bone_velocity(&self, bone: usize, mirrored: bool, delta: f32) -> f32 {
        if delta == 0.0 {
            return 0.0;
        }
        let current = self.bone_rotation(bone, mirrored);
        let (other, _) = self.neighbour(delta);
        let other = other.bone_rotation(bone, mirrored);
        current.angle_between(other) / delta
    }

    pub fn angular_bone_velocities(&self, mirrored: bool, delta: f32) -> Vec<f32> {
        (0..self.frame.world.len())
            .map(|i| self.angular_bone_velocity(i, mirrored, delta))
            .collect()
    }

    pub fn angular_bone_velocity_by_name(&self, name: &str, mirrored: bool, delta: f32) -> Option<f32> {
        let index = self.data.bone_index(name)?;
        Some(self.angular_bone_velocity(index, mirrored, delta))
    }
}
