//! 相位模块：由速度和相对参考姿势的位移检测动作周期
//!
//! 每个身体部位（头、左手、右手）维护：
//! - 逐帧速度和（低于阈值置 0）
//! - 逐帧相对参考姿势的位移和（低于阈值置 0），参考姿势在静止时前移
//! - 关键帧：位移由 0 变非 0 为 In，由非 0 变 0 为 Out，首末帧为 Boundary
//! - 相位：In 到 Out 之间 0 -> 1 线性，其余区间为 0

use std::collections::BTreeMap;

use crate::animation::MotionData;
use crate::config::PhaseConfig;
use crate::finite_or_zero;

/// 关键帧类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseKey {
    /// 首帧 / 末帧
    Boundary,
    /// 周期开始（相位 0）
    In,
    /// 周期结束（相位 1）
    Out,
}

/// 单个部位的相位函数
#[derive(Clone, Debug)]
pub struct PhaseFunction {
    frame_count: usize,
    /// 1 起始帧索引 -> 关键帧类型
    keys: BTreeMap<usize, PhaseKey>,
    phase: Vec<f32>,

    pub velocities: Vec<f32>,
    pub normalized_velocities: Vec<f32>,
    pub positions: Vec<f32>,
    pub normalized_positions: Vec<f32>,
}

impl PhaseFunction {
    pub fn new(frame_count: usize) -> Self {
        let mut function = Self {
            frame_count,
            keys: BTreeMap::new(),
            phase: vec![0.0; frame_count],
            velocities: vec![0.0; frame_count],
            normalized_velocities: vec![0.0; frame_count],
            positions: vec![0.0; frame_count],
            normalized_positions: vec![0.0; frame_count],
        };
        function.reset_keys();
        function
    }

    fn reset_keys(&mut self) {
        self.keys.clear();
        self.phase.iter_mut().for_each(|p| *p = 0.0);
        if self.frame_count > 0 {
            self.keys.insert(1, PhaseKey::Boundary);
            self.keys.insert(self.frame_count, PhaseKey::Boundary);
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn phase(&self) -> &[f32] {
        &self.phase
    }

    /// 1 起始帧索引，越界返回 0
    pub fn phase_at(&self, frame: usize) -> f32 {
        frame.checked_sub(1).and_then(|i| self.phase.get(i)).copied().unwrap_or(0.0)
    }

    pub fn keys(&self) -> impl Iterator<Item = (usize, PhaseKey)> + '_ {
        self.keys.iter().map(|(f, k)| (*f, *k))
    }

    pub fn key(&self, frame: usize) -> Option<PhaseKey> {
        self.keys.get(&frame).copied()
    }

    pub fn is_key(&self, frame: usize) -> bool {
        self.keys.contains_key(&frame)
    }

    pub fn is_in_key(&self, frame: usize) -> bool {
        self.key(frame) == Some(PhaseKey::In)
    }

    pub fn is_out_key(&self, frame: usize) -> bool {
        self.key(frame) == Some(PhaseKey::Out)
    }

    /// 上一个关键帧（不含自身），没有时返回首帧
    pub fn previous_key(&self, frame: usize) -> usize {
        self.keys.range(..frame).next_back().map(|(f, _)| *f).unwrap_or(1)
    }

    /// 下一个关键帧（不含自身），没有时返回末帧
    pub fn next_key(&self, frame: usize) -> usize {
        self.keys
            .range(frame.saturating_add(1)..)
            .next()
            .map(|(f, _)| *f)
            .unwrap_or(self.frame_count)
    }

    fn valid(&self, frame: usize) -> bool {
        frame >= 1 && frame <= self.frame_count
    }

    // ========== 编辑 ==========

    /// 设置或清除关键帧，随后局部重新插值
    ///
    /// 首末帧清除后恢复为 Boundary。
    pub fn set_key(&mut self, frame: usize, key: Option<PhaseKey>) {
        if !self.valid(frame) {
            log::warn!("相位关键帧 {} 超出范围 [1, {}]", frame, self.frame_count);
            return;
        }
        if self.keys.remove(&frame).is_some() {
            self.phase[frame - 1] = 0.0;
        }
        match key {
            Some(PhaseKey::In) => {
                self.keys.insert(frame, PhaseKey::In);
                self.phase[frame - 1] = 0.0;
            }
            Some(PhaseKey::Out) => {
                self.keys.insert(frame, PhaseKey::Out);
                self.phase[frame - 1] = 1.0;
            }
            Some(PhaseKey::Boundary) | None => {}
        }
        if (frame == 1 || frame == self.frame_count) && !self.keys.contains_key(&frame) {
            self.keys.insert(frame, PhaseKey::Boundary);
        }
        self.interpolate_around(frame);
    }

    /// 设置单帧相位值，随后局部重新插值
    pub fn set_phase(&mut self, frame: usize, value: f32) {
        if !self.valid(frame) {
            log::warn!("相位帧 {} 超出范围 [1, {}]", frame, self.frame_count);
            return;
        }
        let value = finite_or_zero(value, "set_phase");
        if self.phase[frame - 1] != value {
            self.phase[frame - 1] = value;
            self.interpolate_around(frame);
        }
    }

    // ========== 插值 ==========

    /// 局部插值：关键帧更新两侧区间，非关键帧更新所在区间
    pub fn interpolate_around(&mut self, frame: usize) {
        let previous = self.previous_key(frame);
        let next = self.next_key(frame);
        if self.is_key(frame) {
            self.interpolate(previous, frame);
            self.interpolate(frame, next);
        } else {
            self.interpolate(previous, next);
        }
    }

    /// 全部重新插值
    pub fn interpolate_all(&mut self) {
        let keys: Vec<usize> = self.keys.keys().copied().collect();
        for pair in keys.windows(2) {
            self.interpolate(pair[0], pair[1]);
        }
    }

    /// 在关键帧 a、b 之间插值（不含端点）
    fn interpolate(&mut self, a: usize, b: usize) {
        if !self.valid(a) || !self.valid(b) {
            log::debug!("相位插值区间 ({}, {}) 无效", a, b);
            return;
        }
        if a >= b {
            return;
        }
        if self.key(a) == Some(PhaseKey::In) && self.key(b) == Some(PhaseKey::Out) {
            let start = self.phase[a - 1].rem_euclid(1.0);
            let end = self.phase[b - 1];
            let distance = (b - a) as f32;
            for i in a + 1..b {
                let rate_a = (i - a) as f32 / distance;
                let rate_b = (b - i) as f32 / distance;
                self.phase[i - 1] = rate_b * start + rate_a * end;
            }
        } else {
            for i in a + 1..b {
                self.phase[i - 1] = 0.0;
            }
        }
    }

    // ========== 检测 ==========

    /// 计算速度、位移和关键帧
    pub fn compute(&mut self, data: &MotionData, bones: &[usize], config: &PhaseConfig) {
        self.frame_count = data.total_frames();
        self.phase = vec![0.0; self.frame_count];
        self.compute_velocity(data, bones, config);
        self.compute_position(data, bones, config);
        self.compute_keys();
    }

    pub fn compute_velocity(&mut self, data: &MotionData, bones: &[usize], config: &PhaseConfig) {
        let delta = 1.0 / data.framerate();
        self.velocities = data
            .frames()
            .map(|frame| {
                let sum: f32 = bones
                    .iter()
                    .map(|&b| {
                        frame
                            .bone_velocity(b, data.mirrored, delta)
                            .length()
                            .min(config.max_bone_velocity)
                    })
                    .sum();
                let sum = finite_or_zero(sum, "phase velocity");
                if sum < config.velocity_threshold {
                    0.0
                } else {
                    sum
                }
            })
            .collect();
        self.normalized_velocities = normalize(&self.velocities);
    }

    /// 依赖 `velocities`，需先调用 `compute_velocity`
    pub fn compute_position(&mut self, data: &MotionData, bones: &[usize], config: &PhaseConfig) {
        let count = data.total_frames();
        let window = (data.framerate() * config.window).ceil().max(1.0) as usize;
        let mut reference = data.frame(config.reference_frame).bone_transformations(data.mirrored);
        let mut positions = vec![0.0; count];

        for (i, frame) in data.frames().enumerate() {
            let sum: f32 = bones
                .iter()
                .map(|&b| {
                    let position = frame.bone_position(b, data.mirrored);
                    reference[b]
                        .inverse()
                        .transform_point3(position)
                        .length()
                        .min(config.max_bone_displacement)
                })
                .sum();
            let sum = finite_or_zero(sum, "phase position");
            positions[i] = if sum < config.position_threshold { 0.0 } else { sum };

            // 前向窗口内速度和过小时，参考姿势前移到当前帧；窗口在末尾收缩
            let end = (i + window).min(count);
            let velocity: f32 = self.velocities[i..end].iter().sum();
            if velocity < config.velocity_threshold && positions[i] != 0.0 {
                reference = frame.bone_transformations(data.mirrored);
            }
        }

        self.positions = positions;
        self.normalized_positions = normalize(&self.positions);
    }

    /// 依据位移的 0 / 非 0 转换放置关键帧
    pub fn compute_keys(&mut self) {
        self.reset_keys();
        for i in 1..self.frame_count.saturating_sub(1) {
            let before = self.positions[i - 1];
            let current = self.positions[i];
            if before == 0.0 && current != 0.0 {
                self.keys.insert(i + 1, PhaseKey::In);
                self.phase[i] = 0.0;
            } else if before != 0.0 && current == 0.0 {
                self.keys.insert(i + 1, PhaseKey::Out);
                self.phase[i] = 1.0;
            }
        }
        self.interpolate_all();
    }
}

/// 最小-最大归一化到 [0, 1]；常量序列归一化为 0
fn normalize(values: &[f32]) -> Vec<f32> {
    let min = values.iter().copied().fold(f32::MAX, f32::min);
    let max = values.iter().copied().fold(f32::MIN, f32::max);
    let range = max - min;
    values
        .iter()
        .map(|v| if range > 0.0 { (v - min) / range } else { 0.0 })
        .collect()
}

/// 身体部位
#[derive(Clone, Debug)]
pub struct PhasePart {
    pub name: String,
    /// 参与计算的骨骼索引
    pub bones: Vec<usize>,
    pub function: PhaseFunction,
}

/// 相位模块
#[derive(Clone, Debug)]
pub struct PhaseModule {
    pub config: PhaseConfig,
    parts: Vec<PhasePart>,
    /// 部位解析时的镜像状态
    mirrored: bool,
}

impl PhaseModule {
    pub const HEAD: &'static str = "Head";
    pub const LEFT_HAND: &'static str = "Left Hand";
    pub const RIGHT_HAND: &'static str = "Right Hand";

    pub fn new(data: &MotionData) -> Self {
        Self::with_config(data, PhaseConfig::default())
    }

    pub fn with_config(data: &MotionData, config: PhaseConfig) -> Self {
        let mut module = Self {
            config,
            parts: Self::resolve_parts(data),
            mirrored: data.mirrored,
        };
        module.compute(data);
        module
    }

    /// 按骨骼名称解析部位；镜像时左右互换
    fn resolve_parts(data: &MotionData) -> Vec<PhasePart> {
        let (left, right) = if data.mirrored {
            ("RightShoulder", "LeftShoulder")
        } else {
            ("LeftShoulder", "RightShoulder")
        };
        [(Self::HEAD, "Neck"), (Self::LEFT_HAND, left), (Self::RIGHT_HAND, right)]
            .into_iter()
            .map(|(name, bone)| {
                let bones = match data.hierarchy().find_bone_contains(bone) {
                    Some(b) => data.hierarchy().subtree(b.index),
                    None => {
                        log::warn!("{} 中未找到 {}，部位 {} 为空", data.name, bone, name);
                        Vec::new()
                    }
                };
                PhasePart {
                    name: name.to_string(),
                    bones,
                    function: PhaseFunction::new(data.total_frames()),
                }
            })
            .collect()
    }

    /// 重新计算所有部位；镜像状态变化时重新解析部位
    pub fn compute(&mut self, data: &MotionData) {
        if self.mirrored != data.mirrored || self.parts.is_empty() {
            self.parts = Self::resolve_parts(data);
            self.mirrored = data.mirrored;
        }
        for part in &mut self.parts {
            part.function.compute(data, &part.bones, &self.config);
        }
    }

    pub fn parts(&self) -> &[PhasePart] {
        &self.parts
    }

    pub fn part(&self, name: &str) -> Option<&PhasePart> {
        self.parts.iter().find(|p| p.name == name)
    }

    pub fn part_mut(&mut self, name: &str) -> Option<&mut PhasePart> {
        self.parts.iter_mut().find(|p| p.name == name)
    }

    /// 部位在某帧（1 起始）的相位
    pub fn phase(&self, part: &str, frame: usize) -> Option<f32> {
        let part = self.part(part)?;
        (frame >= 1 && frame <= part.function.frame_count()).then(|| part.function.phase_at(frame))
    }
}
