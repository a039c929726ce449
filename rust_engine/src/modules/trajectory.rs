//! 轨迹模块：以参考帧为中心等间隔采样枢轴骨骼特征
//!
//! 采样统一使用镜像查询。越界采样点输出全零特征而不钳制到有效帧。

use glam::Vec3;

use crate::animation::MotionData;
use crate::config::TrajectoryConfig;

use super::{Module, ModuleId, PhaseModule};

/// 单个采样点的特征
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TrajectorySample {
    /// 采样帧（1 起始）；越界为 None
    pub frame: Option<usize>,
    /// 相对参考帧枢轴位置的位移
    pub position: Vec3,
    pub velocity: Vec3,
    /// 动作独热标签
    pub label: [f32; 3],
    pub phase: f32,
}

/// 单个枢轴骨骼的采样序列
#[derive(Clone, Debug)]
pub struct PivotTrajectory {
    /// 部位名称，同时用于查找相位
    pub name: String,
    pub bone: Option<usize>,
    pub samples: Vec<TrajectorySample>,
}

#[derive(Clone, Debug)]
pub struct TrajectoryModule {
    pub config: TrajectoryConfig,
    /// 参考帧（1 起始）
    reference: usize,
    pivots: Vec<PivotTrajectory>,
}

impl TrajectoryModule {
    pub fn new(data: &MotionData) -> Self {
        Self::with_config(data, TrajectoryConfig::default())
    }

    pub fn with_config(data: &MotionData, config: TrajectoryConfig) -> Self {
        let mut module = Self {
            config,
            reference: 1,
            pivots: Vec::new(),
        };
        module.compute(data);
        module
    }

    fn resolve_pivots(data: &MotionData) -> Vec<PivotTrajectory> {
        [(PhaseModule::LEFT_HAND, "LeftHand"), (PhaseModule::RIGHT_HAND, "RightHand")]
            .into_iter()
            .map(|(name, bone)| {
                let bone = data.hierarchy().find_bone_contains(bone).map(|b| b.index);
                if bone.is_none() {
                    log::warn!("{} 中未找到轨迹枢轴 {}", data.name, name);
                }
                PivotTrajectory {
                    name: name.to_string(),
                    bone,
                    samples: Vec::new(),
                }
            })
            .collect()
    }

    pub fn reference(&self) -> usize {
        self.reference
    }

    pub fn pivots(&self) -> &[PivotTrajectory] {
        &self.pivots
    }

    pub fn pivot(&self, name: &str) -> Option<&PivotTrajectory> {
        self.pivots.iter().find(|p| p.name == name)
    }

    /// 采样帧序列（可能越界，含负数）
    pub fn sample_frames(&self, reference: usize) -> Vec<i64> {
        let size = self.config.sample_size as i64;
        let start = reference as i64 - (self.config.sample_count / 2) as i64 * size;
        (0..self.config.sample_count as i64).map(|k| start + k * size).collect()
    }

    /// 以当前参考帧重新采样
    pub fn compute(&mut self, data: &MotionData) {
        self.sample(data, self.reference);
    }

    /// 以 `reference`（1 起始）为中心采样所有枢轴
    pub fn sample(&mut self, data: &MotionData, reference: usize) {
        let count = data.total_frames();
        self.reference = reference.clamp(1, count);
        self.pivots = Self::resolve_pivots(data);

        let frames = self.sample_frames(self.reference);
        let delta = 1.0 / data.framerate();
        let action = data.module(ModuleId::Action).and_then(Module::as_action);
        let phase = data.module(ModuleId::Phase).and_then(Module::as_phase);
        let reference_frame = data.frame(self.reference);

        for pivot in &mut self.pivots {
            let Some(bone) = pivot.bone else {
                pivot.samples = vec![TrajectorySample::default(); frames.len()];
                continue;
            };
            let origin = reference_frame.bone_position(bone, true);
            let name = pivot.name.as_str();

            pivot.samples = frames
                .iter()
                .map(|&f| {
                    if f < 1 || f > count as i64 {
                        return TrajectorySample::default();
                    }
                    let index = f as usize;
                    let frame = data.frame(index);
                    TrajectorySample {
                        frame: Some(index),
                        position: frame.bone_position(bone, true) - origin,
                        velocity: frame.bone_velocity(bone, true, delta),
                        label: action.map(|a| a.hot_vector(index)).unwrap_or_default(),
                        phase: phase.and_then(|p| p.phase(name, index)).unwrap_or(0.0),
                    }
                })
                .collect();
        }
    }
}
