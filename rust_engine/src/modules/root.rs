//! 根节点模块：地面投影的根位置、朝向和速度
//!
//! 朝向由髋部和肩部左右连线在地面上的投影求得。
//! 估计查询允许时间越过片段边界，越界部分按边界点对称外推。

use glam::{Mat3, Mat4, Quat, Vec3};

use crate::animation::{FrameRef, MotionData};

/// 投影到地面（去掉 Y 分量）
fn project_on_ground(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// 以 `forward` 为 Z 轴、Y 为上方向的旋转
fn look_rotation(forward: Vec3) -> Quat {
    let right = Vec3::Y.cross(forward).normalize();
    let up = forward.cross(right);
    Quat::from_mat3(&Mat3::from_cols(right, up, forward)).normalize()
}

#[derive(Clone, Debug, Default)]
pub struct RootModule {
    pub right_shoulder: usize,
    pub left_shoulder: usize,
    pub right_up_leg: usize,
    pub left_up_leg: usize,
    pub neck: usize,
    pub hips: usize,
}

impl RootModule {
    pub fn new(data: &MotionData) -> Self {
        let mut module = Self::default();
        module.setup(data);
        module
    }

    /// 按名称子串查找相关骨骼，未找到时使用骨骼 0
    pub fn setup(&mut self, data: &MotionData) {
        let find = |pattern: &str| match data.hierarchy().find_bone_contains(pattern) {
            Some(bone) => bone.index,
            None => {
                log::debug!("{} 中未找到 {}，使用骨骼 0", data.name, pattern);
                0
            }
        };
        self.right_shoulder = find("RightShoulder");
        self.left_shoulder = find("LeftShoulder");
        self.right_up_leg = find("RightUpLeg");
        self.left_up_leg = find("LeftUpLeg");
        self.neck = find("Neck");
        self.hips = find("Hips");
    }

    // ========== 单帧 ==========

    pub fn root_position(&self, frame: &FrameRef, mirrored: bool) -> Vec3 {
        frame.bone_position(0, mirrored)
    }

    pub fn root_rotation(&self, frame: &FrameRef, mirrored: bool) -> Quat {
        let position = |bone: usize| frame.bone_position(bone, mirrored);
        let hips = project_on_ground(position(self.right_up_leg) - position(self.left_up_leg)).normalize_or_zero();
        let shoulders =
            project_on_ground(position(self.right_shoulder) - position(self.left_shoulder)).normalize_or_zero();
        let across = (hips + shoulders).normalize_or_zero();
        let forward = project_on_ground(-across.cross(Vec3::Y)).normalize_or_zero();
        if forward == Vec3::ZERO {
            Quat::IDENTITY
        } else {
            look_rotation(forward)
        }
    }

    pub fn root_transformation(&self, frame: &FrameRef, mirrored: bool) -> Mat4 {
        Mat4::from_rotation_translation(self.root_rotation(frame, mirrored), self.root_position(frame, mirrored))
    }

    pub fn root_velocity(&self, frame: &FrameRef, mirrored: bool, delta: f32) -> Vec3 {
        project_on_ground(frame.bone_velocity(0, mirrored, delta))
    }

    // ========== 估计 ==========

    /// 越界时间的对称点：(边界时间, 钳制后的对称时间)
    fn reflect(data: &MotionData, t: f32) -> (f32, f32) {
        let total = data.total_time();
        let boundary = t.clamp(0.0, total);
        let pivot = 2.0 * boundary - t;
        (boundary, pivot.clamp(0.0, total))
    }

    fn out_of_range(data: &MotionData, t: f32) -> bool {
        t < 0.0 || t > data.total_time()
    }

    /// 参考帧时间加偏移处的根位置
    pub fn estimated_position(&self, reference: &FrameRef, offset: f32, mirrored: bool) -> Vec3 {
        let data = reference.data();
        let t = reference.timestamp() + offset;
        if Self::out_of_range(data, t) {
            let (boundary, pivot) = Self::reflect(data, t);
            2.0 * self.root_position(&data.frame_at(boundary), mirrored)
                - self.root_position(&data.frame_at(pivot), mirrored)
        } else {
            self.root_position(&data.frame_at(t), mirrored)
        }
    }

    pub fn estimated_rotation(&self, reference: &FrameRef, offset: f32, mirrored: bool) -> Quat {
        let data = reference.data();
        let t = reference.timestamp() + offset;
        let t = if Self::out_of_range(data, t) {
            Self::reflect(data, t).1
        } else {
            t
        };
        self.root_rotation(&data.frame_at(t), mirrored)
    }

    pub fn estimated_transformation(&self, reference: &FrameRef, offset: f32, mirrored: bool) -> Mat4 {
        Mat4::from_rotation_translation(
            self.estimated_rotation(reference, offset, mirrored),
            self.estimated_position(reference, offset, mirrored),
        )
    }

    pub fn estimated_velocity(&self, reference: &FrameRef, offset: f32, mirrored: bool, delta: f32) -> Vec3 {
        if delta == 0.0 {
            return Vec3::ZERO;
        }
        (self.estimated_position(reference, offset + delta, mirrored)
            - self.estimated_position(reference, offset, mirrored))
            / delta
    }
}
