//! Mocap Engine - 动作捕捉数据处理核心
//!
//! 提供动作数据标注与特征提取的核心功能：
//! - BVH 骨骼/动作解析
//! - 骨骼层级与运行时姿势（Actor）
//! - 帧缓冲区查询（位置、速度、加速度、镜像）
//! - 特征模块（相位、动作标签、情绪、轨迹、速度、根节点）
//! - IK 求解（CCD / FABRIK）

pub mod animation;
pub mod config;
pub mod modules;
pub mod skeleton;

pub use animation::{BvhFile, Frame, FrameRef, MirrorAxis, MotionData};
pub use config::{IkConfig, ImportConfig, PhaseConfig, TrajectoryConfig};
pub use modules::{Module, ModuleId};
pub use skeleton::{Actor, Bone, BoneTransform, CcdSolver, FabrikSolver, Hierarchy, IkChain, IkReport, SceneNode};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MotionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("BVH parse error: {0}")]
    BvhParse(String),

    #[error("Invalid hierarchy: {0}")]
    InvalidHierarchy(String),

    #[error("Invalid motion data: {0}")]
    InvalidMotion(String),
}

pub type Result<T> = std::result::Result<T, MotionError>;

/// 将非有限值（NaN/Inf）替换为 0，避免污染逐帧数组
pub(crate) fn finite_or_zero(value: f32, context: &str) -> f32 {
    if value.is_finite() {
        value
    } else {
        log::warn!("{} 产生非有限值 {}，已置 0", context, value);
        0.0
    }
}
