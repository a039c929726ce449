//! 情绪标注模块

use crate::animation::MotionData;

use super::KeyedChannels;

#[derive(Clone, Debug)]
pub struct EmotionModule {
    channels: KeyedChannels,
}

impl EmotionModule {
    pub const DEFAULT_EMOTIONS: [&'static str; 5] = ["Happy", "Sad", "Scared", "Shocked", "Angry"];

    pub fn new(data: &MotionData) -> Self {
        Self::with_frame_count(data.total_frames())
    }

    pub fn with_frame_count(frame_count: usize) -> Self {
        Self {
            channels: KeyedChannels::new(frame_count, &Self::DEFAULT_EMOTIONS),
        }
    }

    pub fn channels(&self) -> &KeyedChannels {
        &self.channels
    }

    pub fn add_emotion(&mut self, name: &str) -> bool {
        self.channels.add_channel(name)
    }

    pub fn remove_emotion(&mut self, name: &str) -> bool {
        self.channels.remove_channel(name)
    }

    pub fn is_key(&self, frame: usize) -> bool {
        self.channels.is_key(frame)
    }

    pub fn toggle_key(&mut self, frame: usize) {
        self.channels.toggle_key(frame);
    }

    pub fn set_value(&mut self, name: &str, frame: usize, value: f32) {
        self.channels.set_value(name, frame, value);
    }

    pub fn value(&self, name: &str, frame: usize) -> Option<f32> {
        self.channels.value(name, frame)
    }

    /// 某帧所有情绪的值（按通道顺序），越界帧为 0
    pub fn values(&self, frame: usize) -> Vec<f32> {
        self.channels
            .channels()
            .iter()
            .map(|c| c.value(frame).unwrap_or(0.0))
            .collect()
    }

    pub fn compute(&mut self) {
        self.channels.compute();
    }
}
