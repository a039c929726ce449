//! 动作数据：层级 + 帧序列 + 特征模块

use std::path::Path;

use glam::{EulerRot, Mat4, Quat, Vec3};

use super::{BvhFile, Frame, FrameRef, MirrorAxis};
use crate::config::ImportConfig;
use crate::modules::{Module, ModuleId, TrajectoryModule};
use crate::skeleton::{Actor, Hierarchy};
use crate::{MotionError, Result};

/// 动作数据
///
/// 导入后帧数据不可变；镜像、缩放、偏移在查询时应用。
/// 特征模块每种最多一个，修改参数或镜像状态后需显式重新计算。
#[derive(Clone, Debug)]
pub struct MotionData {
    pub name: String,
    hierarchy: Hierarchy,
    frames: Vec<Frame>,
    framerate: f32,

    /// 全局缩放（作用于平移）
    pub scale: f32,
    /// 全局偏移（缩放前加到平移上）
    pub offset: Vec3,
    pub mirror_axis: MirrorAxis,
    pub mirrored: bool,

    modules: Vec<Module>,
}

impl MotionData {
    /// 由每帧世界变换创建，帧时间戳为 `i / framerate`
    pub fn new(
        name: impl Into<String>,
        hierarchy: Hierarchy,
        world: Vec<Vec<Mat4>>,
        framerate: f32,
    ) -> Result<Self> {
        if world.is_empty() {
            return Err(MotionError::InvalidMotion("motion has no frames".to_string()));
        }
        if !(framerate.is_finite() && framerate > 0.0) {
            return Err(MotionError::InvalidMotion(format!("invalid framerate {}", framerate)));
        }
        let bone_count = hierarchy.len();
        if let Some(bad) = world.iter().position(|w| w.len() != bone_count) {
            return Err(MotionError::InvalidMotion(format!(
                "frame {} has {} transforms, expected {}",
                bad + 1,
                world[bad].len(),
                bone_count
            )));
        }

        let frames = world
            .into_iter()
            .enumerate()
            .map(|(i, w)| Frame::new(i + 1, i as f32 / framerate, w))
            .collect();

        Ok(Self {
            name: name.into(),
            hierarchy,
            frames,
            framerate,
            scale: 1.0,
            offset: Vec3::ZERO,
            mirror_axis: MirrorAxis::default(),
            mirrored: false,
            modules: Vec::new(),
        })
    }

    /// 从 BVH 文件导入
    pub fn load_bvh<P: AsRef<Path>>(path: P, config: &ImportConfig) -> Result<Self> {
        let path = path.as_ref();
        let bvh = BvhFile::load(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        bvh.to_motion_data(name, config)
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub fn framerate(&self) -> f32 {
        self.framerate
    }

    pub fn total_frames(&self) -> usize {
        self.frames.len()
    }

    /// 总时长（秒）
    pub fn total_time(&self) -> f32 {
        self.frames.len() as f32 / self.framerate
    }

    // ========== 帧访问 ==========

    /// 1 起始索引，钳制到 `[1, total_frames]`
    pub fn frame(&self, index: usize) -> FrameRef<'_> {
        let i = index.saturating_sub(1).min(self.frames.len() - 1);
        FrameRef::new(self, &self.frames[i])
    }

    /// 按时间取帧：`round(time * framerate)`，钳制到有效范围
    pub fn frame_at(&self, time: f32) -> FrameRef<'_> {
        let i = (time * self.framerate).round();
        let i = if i.is_nan() || i < 0.0 { 0 } else { i as usize };
        let i = i.min(self.frames.len() - 1);
        FrameRef::new(self, &self.frames[i])
    }

    pub fn first_frame(&self) -> FrameRef<'_> {
        FrameRef::new(self, &self.frames[0])
    }

    pub fn last_frame(&self) -> FrameRef<'_> {
        FrameRef::new(self, &self.frames[self.frames.len() - 1])
    }

    pub fn frames(&self) -> impl Iterator<Item = FrameRef<'_>> + '_ {
        self.frames.iter().map(move |f| FrameRef::new(self, f))
    }

    /// 骨骼名称查找，未找到时记录日志
    pub fn bone_index(&self, name: &str) -> Option<usize> {
        let index = self.hierarchy.find_index(name);
        if index.is_none() {
            log::warn!("{} 中未找到骨骼 {}", self.name, name);
        }
        index
    }

    pub fn set_bone_visible(&mut self, index: usize, visible: bool) {
        self.hierarchy.set_visible(index, visible);
    }

    pub fn set_bone_display_name(&mut self, index: usize, display_name: Option<String>) {
        self.hierarchy.set_display_name(index, display_name);
    }

    /// 以第一帧姿势创建骨架；根骨骼水平位置归零并去除偏航
    pub fn create_actor(&self, mirrored: bool) -> Actor {
        let world = self.first_frame().bone_transformations(mirrored);
        let mut actor = Actor::from_hierarchy(&self.hierarchy, &world);

        if let Some(root) = actor.root().map(|b| b.index) {
            let position = actor.world_position(root);
            actor.set_world_position(root, Vec3::new(0.0, position.y, 0.0));
            let (_, pitch, roll) = actor.world_rotation(root).to_euler(EulerRot::YXZ);
            actor.set_world_rotation(root, Quat::from_euler(EulerRot::YXZ, 0.0, pitch, roll));
        }
        actor
    }

    // ========== 模块 ==========

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.iter().find(|m| m.id() == id)
    }

    pub fn module_mut(&mut self, id: ModuleId) -> Option<&mut Module> {
        self.modules.iter_mut().find(|m| m.id() == id)
    }

    pub fn has_module(&self, id: ModuleId) -> bool {
        self.module(id).is_some()
    }

    /// 添加模块；已存在时记录日志并返回已有实例
    pub fn add_module(&mut self, id: ModuleId) -> &mut Module {
        let position = match self.modules.iter().position(|m| m.id() == id) {
            Some(position) => {
                log::info!("{} 中已存在 {:?} 模块", self.name, id);
                position
            }
            None => {
                let module = Module::create(id, self);
                self.modules.push(module);
                log::info!("{} 添加 {:?} 模块", self.name, id);
                self.modules.len() - 1
            }
        };
        &mut self.modules[position]
    }

    /// 移除模块；不存在时记录日志并返回 None
    pub fn remove_module(&mut self, id: ModuleId) -> Option<Module> {
        match self.modules.iter().position(|m| m.id() == id) {
            Some(position) => {
                log::info!("{} 移除 {:?} 模块", self.name, id);
                Some(self.modules.remove(position))
            }
            None => {
                log::info!("{} 中不存在 {:?} 模块", self.name, id);
                None
            }
        }
    }

    /// 取出模块，以只读方式访问其余数据后放回
    fn with_module<R>(&mut self, id: ModuleId, f: impl FnOnce(&mut Module, &MotionData) -> R) -> Option<R> {
        let Some(position) = self.modules.iter().position(|m| m.id() == id) else {
            log::warn!("{} 中不存在 {:?} 模块", self.name, id);
            return None;
        };
        let mut module = self.modules.remove(position);
        let result = f(&mut module, self);
        self.modules.insert(position, module);
        Some(result)
    }

    /// 重新计算模块的派生数据
    pub fn recompute_module(&mut self, id: ModuleId) -> bool {
        self.with_module(id, |module, data| module.compute(data)).is_some()
    }

    pub fn recompute_all(&mut self) {
        let ids: Vec<ModuleId> = self.modules.iter().map(Module::id).collect();
        for id in ids {
            self.recompute_module(id);
        }
    }

    /// 以 `reference`（1 起始帧索引）为中心采样轨迹
    pub fn compute_trajectory(&mut self, reference: usize) -> Option<&TrajectoryModule> {
        self.with_module(ModuleId::Trajectory, |module, data| {
            if let Module::Trajectory(trajectory) = module {
                trajectory.sample(data, reference);
            }
        })?;
        self.module(ModuleId::Trajectory).and_then(Module::as_trajectory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// 单骨骼沿 X 匀速运动（每帧 0.1）
    fn moving_bone(frames: usize, framerate: f32) -> MotionData {
        let mut hierarchy = Hierarchy::new();
        hierarchy.add_bone("Hips", None, Vec3::ZERO);
        let world = (0..frames)
            .map(|i| vec![Mat4::from_translation(Vec3::new(0.1 * i as f32, 1.0, 0.0))])
            .collect();
        MotionData::new("test", hierarchy, world, framerate).unwrap()
    }

    #[test]
    fn test_new_rejects_bad_input() {
        let mut hierarchy = Hierarchy::new();
        hierarchy.add_bone("Hips", None, Vec3::ZERO);
        assert!(MotionData::new("a", hierarchy.clone(), vec![], 30.0).is_err());
        assert!(MotionData::new("a", hierarchy.clone(), vec![vec![]], 30.0).is_err());
        assert!(MotionData::new("a", hierarchy, vec![vec![Mat4::IDENTITY]], 0.0).is_err());
    }

    #[test]
    fn test_frame_clamping() {
        let data = moving_bone(10, 30.0);
        assert_eq!(data.frame(0).index(), 1);
        assert_eq!(data.frame(1).index(), 1);
        assert_eq!(data.frame(10).index(), 10);
        assert_eq!(data.frame(99).index(), 10);
        assert_eq!(data.frame_at(-1.0).index(), 1);
        assert_eq!(data.frame_at(2.0 / 30.0).index(), 3);
        assert_eq!(data.frame_at(100.0).index(), 10);
        assert_relative_eq!(data.total_time(), 10.0 / 30.0);
        assert!(data.frame(1).previous().is_none());
        assert_eq!(data.frame(1).next().map(|f| f.index()), Some(2));
        assert!(data.frame(10).next().is_none());
        assert_eq!(data.frame(4).first().index(), 1);
        assert_eq!(data.frame(4).last().index(), 10);
    }

    #[test]
    fn test_velocity_boundary_asymmetry() {
        let data = moving_bone(10, 30.0);
        let delta = 1.0 / 30.0;

        // 首帧：前向差分
        let first = data.frame(1).bone_velocity(0, false, delta);
        assert_relative_eq!(first.x, 3.0, epsilon = 1e-3);
        // 末帧：后向差分
        let last = data.frame(10).bone_velocity(0, false, delta);
        assert_relative_eq!(last.x, 3.0, epsilon = 1e-3);
        assert_relative_eq!(last.y, 0.0, epsilon = 1e-4);

        // 镜像后符号相反
        let mirrored = data.frame(1).bone_velocity(0, true, delta);
        assert_relative_eq!(mirrored.x, -3.0, epsilon = 1e-3);

        assert_eq!(data.frame(5).bone_velocity(0, false, 0.0), Vec3::ZERO);
        assert_eq!(data.frame(5).angular_bone_velocity(0, false, 0.0), 0.0);
        assert_eq!(data.frame(5).bone_acceleration(0, false, 0.0), Vec3::ZERO);
    }

    #[test]
    fn test_constant_velocity_has_no_acceleration() {
        let data = moving_bone(10, 30.0);
        let acceleration = data.frame(6).bone_acceleration(0, false, 1.0 / 30.0);
        assert!(acceleration.length() < 1e-2);
    }

    #[test]
    fn test_scale_offset_and_mirror() {
        let mut data = moving_bone(3, 30.0);
        data.scale = 2.0;
        data.offset = Vec3::new(1.0, 0.0, 0.0);
        let p = data.frame(2).bone_position(0, false);
        assert_relative_eq!(p.x, 2.2, epsilon = 1e-5);
        assert_relative_eq!(p.y, 2.0, epsilon = 1e-5);
        let m = data.frame(2).bone_position(0, true);
        assert_relative_eq!(m.x, -2.2, epsilon = 1e-5);
        // 存储的世界变换不受影响
        assert_relative_eq!(data.frame(2).world()[0].w_axis.x, 0.1, epsilon = 1e-6);
    }

    #[test]
    fn test_by_name_lookup() {
        let data = moving_bone(3, 30.0);
        assert!(data.frame(1).bone_transformation_by_name("Hips", false).is_some());
        assert!(data.frame(1).bone_transformation_by_name("Head", false).is_none());
        assert!(data.frame(1).bone_transformations_by_name(&["Hips", "Head"], false).is_none());
    }

    #[test]
    fn test_angular_velocity() {
        let mut hierarchy = Hierarchy::new();
        hierarchy.add_bone("Hips", None, Vec3::ZERO);
        let world = (0..5)
            .map(|i| vec![Mat4::from_quat(Quat::from_rotation_y(0.1 * i as f32))])
            .collect();
        let data = MotionData::new("spin", hierarchy, world, 10.0).unwrap();
        assert_relative_eq!(data.frame(1).angular_bone_velocity(0, false, 0.1), 1.0, epsilon = 1e-3);
        assert_relative_eq!(data.frame(3).angular_bone_velocity(0, true, 0.1), 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_create_actor_removes_yaw() {
        let mut hierarchy = Hierarchy::new();
        hierarchy.add_bone("Hips", None, Vec3::ZERO);
        hierarchy.add_bone("Spine", Some(0), Vec3::Y);
        let root = Mat4::from_rotation_translation(Quat::from_rotation_y(1.0), Vec3::new(2.0, 1.0, 3.0));
        let world = vec![vec![root, root * Mat4::from_translation(Vec3::Y)]];
        let data = MotionData::new("actor", hierarchy, world, 30.0).unwrap();

        let actor = data.create_actor(false);
        let hips = actor.world_position(0);
        assert_relative_eq!(hips.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(hips.y, 1.0, epsilon = 1e-5);
        assert_relative_eq!(hips.z, 0.0, epsilon = 1e-5);
        let (yaw, _, _) = actor.world_rotation(0).to_euler(EulerRot::YXZ);
        assert_relative_eq!(yaw, 0.0, epsilon = 1e-5);
        assert_relative_eq!(actor.world_position(1).y, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_module_registry() {
        let mut data = moving_bone(20, 30.0);
        assert!(!data.has_module(ModuleId::Action));
        data.add_module(ModuleId::Action);
        data.add_module(ModuleId::Action);
        assert_eq!(data.modules().len(), 1);
        data.add_module(ModuleId::Head);
        assert_eq!(data.modules().len(), 2);
        assert!(data.recompute_module(ModuleId::Action));
        assert!(data.remove_module(ModuleId::Action).is_some());
        assert!(data.remove_module(ModuleId::Action).is_none());
        assert!(!data.recompute_module(ModuleId::Action));
        assert!(data.compute_trajectory(5).is_none());
    }
}
