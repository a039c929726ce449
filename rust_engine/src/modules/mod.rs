//! 特征模块：从帧查询派生逐帧信号
//!
//! 模块种类是封闭集合，每个 MotionData 每种最多一个实例。

mod action;
mod emotion;
mod keyed_channels;
mod phase;
mod root;
mod trajectory;
mod velocity;

pub use action::ActionModule;
pub use emotion::EmotionModule;
pub use keyed_channels::{KeyedChannel, KeyedChannels};
pub use phase::{PhaseFunction, PhaseKey, PhaseModule, PhasePart};
pub use root::RootModule;
pub use trajectory::{PivotTrajectory, TrajectoryModule, TrajectorySample};
pub use velocity::VelocityModule;

use crate::animation::MotionData;

/// 模块类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModuleId {
    Phase,
    Emotion,
    Action,
    Velocity,
    Root,
    Head,
    Trajectory,
}

impl ModuleId {
    pub const ALL: [ModuleId; 7] = [
        ModuleId::Phase,
        ModuleId::Emotion,
        ModuleId::Action,
        ModuleId::Velocity,
        ModuleId::Root,
        ModuleId::Head,
        ModuleId::Trajectory,
    ];
}

/// 头部模块（无状态占位）
#[derive(Clone, Debug, Default)]
pub struct HeadModule;

/// 特征模块
#[derive(Clone, Debug)]
pub enum Module {
    Phase(PhaseModule),
    Emotion(EmotionModule),
    Action(ActionModule),
    Velocity(VelocityModule),
    Root(RootModule),
    Head(HeadModule),
    Trajectory(TrajectoryModule),
}

impl Module {
    /// 按类型创建并初始化
    pub fn create(id: ModuleId, data: &MotionData) -> Self {
        match id {
            ModuleId::Phase => Module::Phase(PhaseModule::new(data)),
            ModuleId::Emotion => Module::Emotion(EmotionModule::new(data)),
            ModuleId::Action => Module::Action(ActionModule::new(data)),
            ModuleId::Velocity => Module::Velocity(VelocityModule::new(data)),
            ModuleId::Root => Module::Root(RootModule::new(data)),
            ModuleId::Head => Module::Head(HeadModule),
            ModuleId::Trajectory => Module::Trajectory(TrajectoryModule::new(data)),
        }
    }

    pub fn id(&self) -> ModuleId {
        match self {
            Module::Phase(_) => ModuleId::Phase,
            Module::Emotion(_) => ModuleId::Emotion,
            Module::Action(_) => ModuleId::Action,
            Module::Velocity(_) => ModuleId::Velocity,
            Module::Root(_) => ModuleId::Root,
            Module::Head(_) => ModuleId::Head,
            Module::Trajectory(_) => ModuleId::Trajectory,
        }
    }

    /// 重新计算派生数据（可重复调用，结果不变）
    pub fn compute(&mut self, data: &MotionData) {
        match self {
            Module::Phase(m) => m.compute(data),
            Module::Emotion(m) => m.compute(),
            Module::Action(m) => m.compute(),
            Module::Velocity(m) => m.compute(data),
            Module::Root(m) => m.setup(data),
            Module::Head(_) => {}
            Module::Trajectory(m) => m.compute(data),
        }
    }

    pub fn as_phase(&self) -> Option<&PhaseModule> {
        match self {
            Module::Phase(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_phase_mut(&mut self) -> Option<&mut PhaseModule> {
        match self {
            Module::Phase(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_emotion(&self) -> Option<&EmotionModule> {
        match self {
            Module::Emotion(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_emotion_mut(&mut self) -> Option<&mut EmotionModule> {
        match self {
            Module::Emotion(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_action(&self) -> Option<&ActionModule> {
        match self {
            Module::Action(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_action_mut(&mut self) -> Option<&mut ActionModule> {
        match self {
            Module::Action(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_velocity(&self) -> Option<&VelocityModule> {
        match self {
            Module::Velocity(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_velocity_mut(&mut self) -> Option<&mut VelocityModule> {
        match self {
            Module::Velocity(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_root(&self) -> Option<&RootModule> {
        match self {
            Module::Root(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_trajectory(&self) -> Option<&TrajectoryModule> {
        match self {
            Module::Trajectory(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_trajectory_mut(&mut self) -> Option<&mut TrajectoryModule> {
        match self {
            Module::Trajectory(m) => Some(m),
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use glam::{Mat4, Vec3};

    use crate::animation::MotionData;
    use crate::skeleton::Hierarchy;

    /// 上半身 + 髋部骨架的静止位置
    const SKELETON: [(&str, Option<usize>, [f32; 3]); 10] = [
        ("Hips", None, [0.0, 1.0, 0.0]),
        ("Spine", Some(0), [0.0, 1.2, 0.0]),
        ("Neck", Some(1), [0.0, 1.5, 0.0]),
        ("Head", Some(2), [0.0, 1.6, 0.0]),
        ("LeftShoulder", Some(1), [0.2, 1.45, 0.0]),
        ("LeftHand", Some(4), [0.6, 1.45, 0.0]),
        ("RightShoulder", Some(1), [-0.2, 1.45, 0.0]),
        ("RightHand", Some(6), [-0.6, 1.45, 0.0]),
        ("LeftUpLeg", Some(0), [0.1, 0.95, 0.0]),
        ("RightUpLeg", Some(0), [-0.1, 0.95, 0.0]),
    ];

    pub const LEFT_HAND: usize = 5;

    /// 骨架动作：`motion(frame)` 给出第 frame（0 起始）帧的 (根位移, 左手位移)
    pub fn upper_body<F>(frames: usize, framerate: f32, motion: F) -> MotionData
    where
        F: Fn(usize) -> (Vec3, Vec3),
    {
        let mut hierarchy = Hierarchy::new();
        for (i, (name, parent, rest)) in SKELETON.iter().enumerate() {
            let offset = match parent {
                Some(p) => Vec3::from(*rest) - Vec3::from(SKELETON[*p].2),
                None => Vec3::from(*rest),
            };
            let index = hierarchy.add_bone(*name, *parent, offset);
            assert_eq!(index, i);
        }

        let world = (0..frames)
            .map(|f| {
                let (root, hand) = motion(f);
                SKELETON
                    .iter()
                    .enumerate()
                    .map(|(i, (_, _, rest))| {
                        let extra = if i == LEFT_HAND { hand } else { Vec3::ZERO };
                        Mat4::from_translation(Vec3::from(*rest) + root + extra)
                    })
                    .collect()
            })
            .collect();

        MotionData::new("upper_body", hierarchy, world, framerate).unwrap()
    }
}
