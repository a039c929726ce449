//! 稀疏关键帧通道（动作 / 情绪标注共用）
//!
//! 所有通道共享一组关键帧（1 起始帧索引），首末帧始终为关键帧。
//! 相邻关键帧之间的值完全由两端关键帧线性插值决定。

use std::collections::BTreeSet;

use crate::finite_or_zero;

/// 命名的逐帧浮点通道
#[derive(Clone, Debug)]
pub struct KeyedChannel {
    pub name: String,
    values: Vec<f32>,
}

impl KeyedChannel {
    fn new(name: &str, frame_count: usize) -> Self {
        Self {
            name: name.to_string(),
            values: vec![0.0; frame_count],
        }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// 1 起始帧索引，越界返回 None
    pub fn value(&self, frame: usize) -> Option<f32> {
        frame.checked_sub(1).and_then(|i| self.values.get(i)).copied()
    }

    fn lerp_range(&mut self, from: usize, to: usize, frames: impl Iterator<Item = usize>) {
        let a = self.values[from - 1];
        let b = self.values[to - 1];
        let span = (to - from) as f32;
        for i in frames {
            let weight = (i - from) as f32 / span;
            self.values[i - 1] = (1.0 - weight) * a + weight * b;
        }
    }
}

/// 共享关键帧的通道集合
#[derive(Clone, Debug)]
pub struct KeyedChannels {
    frame_count: usize,
    keys: BTreeSet<usize>,
    channels: Vec<KeyedChannel>,
}

impl KeyedChannels {
    pub fn new(frame_count: usize, names: &[&str]) -> Self {
        let mut keys = BTreeSet::new();
        if frame_count > 0 {
            keys.insert(1);
            keys.insert(frame_count);
        }
        Self {
            frame_count,
            keys,
            channels: names.iter().map(|n| KeyedChannel::new(n, frame_count)).collect(),
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn valid(&self, frame: usize) -> bool {
        let valid = frame >= 1 && frame <= self.frame_count;
        if !valid {
            log::warn!("帧 {} 超出范围 [1, {}]", frame, self.frame_count);
        }
        valid
    }

    // ========== 关键帧 ==========

    pub fn keys(&self) -> impl Iterator<Item = usize> + '_ {
        self.keys.iter().copied()
    }

    pub fn is_key(&self, frame: usize) -> bool {
        self.keys.contains(&frame)
    }

    /// 上一个关键帧（不含自身），没有时返回首帧
    pub fn previous_key(&self, frame: usize) -> usize {
        self.keys.range(..frame).next_back().copied().unwrap_or(1)
    }

    /// 下一个关键帧（不含自身），没有时返回末帧
    pub fn next_key(&self, frame: usize) -> usize {
        self.keys
            .range(frame.saturating_add(1)..)
            .next()
            .copied()
            .unwrap_or(self.frame_count)
    }

    /// 切换关键帧并重新插值所有通道；首末帧不可切换
    pub fn toggle_key(&mut self, frame: usize) {
        if !self.valid(frame) {
            return;
        }
        if frame == 1 || frame == self.frame_count {
            log::warn!("首末帧始终为关键帧，忽略切换 {}", frame);
            return;
        }
        if !self.keys.remove(&frame) {
            self.keys.insert(frame);
        }
        for index in 0..self.channels.len() {
            self.compute_at(index, frame);
        }
    }

    // ========== 通道 ==========

    pub fn channels(&self) -> &[KeyedChannel] {
        &self.channels
    }

    pub fn channel(&self, name: &str) -> Option<&KeyedChannel> {
        self.channels.iter().find(|c| c.name == name)
    }

    fn channel_index(&self, name: &str) -> Option<usize> {
        let index = self.channels.iter().position(|c| c.name == name);
        if index.is_none() {
            log::info!("通道 {} 不存在", name);
        }
        index
    }

    /// 添加通道；同名通道已存在时返回 false
    pub fn add_channel(&mut self, name: &str) -> bool {
        if self.channels.iter().any(|c| c.name == name) {
            log::info!("通道 {} 已存在", name);
            return false;
        }
        self.channels.push(KeyedChannel::new(name, self.frame_count));
        true
    }

    pub fn remove_channel(&mut self, name: &str) -> bool {
        match self.channel_index(name) {
            Some(index) => {
                self.channels.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn value(&self, name: &str, frame: usize) -> Option<f32> {
        self.channel(name)?.value(frame)
    }

    /// 设置帧值并重新插值邻域；非关键帧的值会被插值覆盖
    pub fn set_value(&mut self, name: &str, frame: usize, value: f32) {
        if !self.valid(frame) {
            return;
        }
        let Some(index) = self.channel_index(name) else {
            return;
        };
        let value = finite_or_zero(value, name);
        if self.channels[index].values[frame - 1] != value {
            self.channels[index].values[frame - 1] = value;
            self.compute_at(index, frame);
        }
    }

    /// 关键帧上的值在 0 和 1 之间切换
    pub fn toggle_value(&mut self, name: &str, frame: usize) {
        if !self.valid(frame) || !self.is_key(frame) {
            return;
        }
        let Some(index) = self.channel_index(name) else {
            return;
        };
        let channel = &mut self.channels[index];
        channel.values[frame - 1] = if channel.values[frame - 1] == 1.0 { 0.0 } else { 1.0 };
        self.compute_at(index, frame);
    }

    /// 局部重新插值：关键帧更新两侧区间，非关键帧跨越整个区间
    fn compute_at(&mut self, index: usize, frame: usize) {
        let previous = self.previous_key(frame);
        let next = self.next_key(frame);
        let is_key = self.is_key(frame);
        let channel = &mut self.channels[index];

        if is_key {
            if previous != frame {
                channel.lerp_range(previous, frame, previous..frame);
            }
            if next != frame {
                channel.lerp_range(frame, next, frame + 1..=next);
            }
        } else if previous != next {
            channel.lerp_range(previous, next, previous..=next);
        }
    }

    /// 全部重新插值
    pub fn compute(&mut self) {
        let keys: Vec<usize> = self.keys.iter().copied().collect();
        for channel in &mut self.channels {
            for pair in keys.windows(2) {
                channel.lerp_range(pair[0], pair[1], pair[0]..=pair[1]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_keys() {
        let mut channels = KeyedChannels::new(30, &["A"]);
        assert!(channels.is_key(1));
        assert!(channels.is_key(30));
        channels.toggle_key(1);
        assert!(channels.is_key(1));
        assert_eq!(channels.previous_key(1), 1);
        assert_eq!(channels.next_key(30), 30);
        assert_eq!(channels.next_key(1), 30);

        // 越界帧返回 None
        assert_eq!(channels.value("A", 0), None);
        assert_eq!(channels.value("A", 31), None);
        assert_eq!(channels.channel("A").unwrap().value(30), Some(0.0));
    }

    #[test]
    fn test_linear_between_keys() {
        let mut channels = KeyedChannels::new(30, &["A"]);
        channels.toggle_key(10);
        channels.toggle_key(20);
        channels.set_value("A", 10, 0.0);
        channels.set_value("A", 20, 1.0);

        assert_eq!(channels.value("A", 15), Some(0.5));
        assert_eq!(channels.value("A", 10), Some(0.0));
        assert_eq!(channels.value("A", 20), Some(1.0));
        // 末帧值为 0，向后线性回落
        assert_eq!(channels.value("A", 25), Some(0.5));
    }

    #[test]
    fn test_removing_key_discards_value() {
        let mut channels = KeyedChannels::new(21, &["A"]);
        channels.toggle_key(11);
        channels.set_value("A", 11, 1.0);
        assert_eq!(channels.value("A", 6), Some(0.5));

        channels.toggle_key(11);
        assert!(!channels.is_key(11));
        assert!(channels.channel("A").unwrap().values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_toggle_value_and_channels() {
        let mut channels = KeyedChannels::new(11, &["A", "B"]);
        channels.toggle_key(6);
        channels.toggle_value("B", 6);
        assert_eq!(channels.value("B", 6), Some(1.0));
        assert_eq!(channels.value("A", 6), Some(0.0));
        channels.toggle_value("B", 6);
        assert_eq!(channels.value("B", 6), Some(0.0));

        // 非关键帧不能切换
        channels.toggle_value("B", 3);
        assert_eq!(channels.value("B", 3), Some(0.0));

        assert!(!channels.add_channel("A"));
        assert!(channels.add_channel("C"));
        assert!(channels.remove_channel("C"));
        assert!(!channels.remove_channel("C"));
        assert_eq!(channels.value("C", 1), None);
    }

    #[test]
    fn test_full_compute_matches_local() {
        let mut channels = KeyedChannels::new(40, &["A"]);
        channels.toggle_key(8);
        channels.toggle_key(25);
        channels.set_value("A", 8, 0.3);
        channels.set_value("A", 25, 0.9);
        channels.toggle_key(8);
        let local: Vec<f32> = channels.channel("A").unwrap().values().to_vec();
        channels.compute();
        assert_eq!(channels.channel("A").unwrap().values(), local.as_slice());
    }
}
