//! 动作标签模块

use crate::animation::MotionData;

use super::KeyedChannels;

/// 动作标签：共享关键帧的逐帧动作强度
#[derive(Clone, Debug)]
pub struct ActionModule {
    channels: KeyedChannels,
}

impl ActionModule {
    pub const NEUTRAL: &'static str = "Neutral";
    pub const LEFT_HAND_ON_HIP: &'static str = "LH on Hip";
    pub const RIGHT_HAND_ON_HIP: &'static str = "RH on Hip";

    pub const DEFAULT_ACTIONS: [&'static str; 6] = [
        "Neutral",
        "Cross Hands",
        "Cross Arms",
        "LH on Hip",
        "RH on Hip",
        "Thank",
    ];

    pub fn new(data: &MotionData) -> Self {
        Self::with_frame_count(data.total_frames())
    }

    pub fn with_frame_count(frame_count: usize) -> Self {
        Self {
            channels: KeyedChannels::new(frame_count, &Self::DEFAULT_ACTIONS),
        }
    }

    pub fn channels(&self) -> &KeyedChannels {
        &self.channels
    }

    pub fn add_action(&mut self, name: &str) -> bool {
        self.channels.add_channel(name)
    }

    pub fn remove_action(&mut self, name: &str) -> bool {
        self.channels.remove_channel(name)
    }

    pub fn is_key(&self, frame: usize) -> bool {
        self.channels.is_key(frame)
    }

    pub fn toggle_key(&mut self, frame: usize) {
        self.channels.toggle_key(frame);
    }

    pub fn toggle(&mut self, name: &str, frame: usize) {
        self.channels.toggle_value(name, frame);
    }

    pub fn set_value(&mut self, name: &str, frame: usize, value: f32) {
        self.channels.set_value(name, frame, value);
    }

    pub fn value(&self, name: &str, frame: usize) -> Option<f32> {
        self.channels.value(name, frame)
    }

    /// 独热向量 [Neutral, LH on Hip, RH on Hip]，值大于 0 记为 1
    pub fn hot_vector(&self, frame: usize) -> [f32; 3] {
        [Self::NEUTRAL, Self::LEFT_HAND_ON_HIP, Self::RIGHT_HAND_ON_HIP].map(|name| {
            match self.value(name, frame) {
                Some(v) if v > 0.0 => 1.0,
                _ => 0.0,
            }
        })
    }

    /// 空格分隔的独热向量，如 "1 0 0"
    pub fn hot_vector_string(&self, frame: usize) -> String {
        self.hot_vector(frame)
            .iter()
            .map(|v| format!("{}", v))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn compute(&mut self) {
        self.channels.compute();
    }
}
