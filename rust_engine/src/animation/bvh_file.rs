//! BVH (Biovision Hierarchy) 文件解析
//!
//! BVH 是行文本格式：HIERARCHY 段定义骨骼树、偏移和通道，
//! MOTION 段给出帧数、帧时间和每帧的通道值。

use std::fs;
use std::path::Path;

use glam::{Mat4, Quat, Vec3};

use super::MotionData;
use crate::config::ImportConfig;
use crate::skeleton::Hierarchy;
use crate::{MotionError, Result};

/// 通道类型（声明顺序即数据顺序）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BvhChannel {
    Xposition,
    Yposition,
    Zposition,
    Xrotation,
    Yrotation,
    Zrotation,
}

impl BvhChannel {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "Xposition" => Some(Self::Xposition),
            "Yposition" => Some(Self::Yposition),
            "Zposition" => Some(Self::Zposition),
            "Xrotation" => Some(Self::Xrotation),
            "Yrotation" => Some(Self::Yrotation),
            "Zrotation" => Some(Self::Zrotation),
            _ => None,
        }
    }
}

/// 关节声明
#[derive(Clone, Debug)]
pub struct BvhJoint {
    /// 规范化后的名称
    pub name: String,
    pub parent: Option<usize>,
    /// OFFSET（原始单位）
    pub offset: Vec3,
    /// 通道，End Site 为空
    pub channels: Vec<BvhChannel>,
}

/// BVH 文件数据
#[derive(Clone, Debug)]
pub struct BvhFile {
    pub joints: Vec<BvhJoint>,
    pub frame_time: f32,
    /// 每帧的通道值
    pub motion: Vec<Vec<f32>>,
}

/// 规范化骨骼名称：按 `_` `:` `.` 空格 分割，保留最后一段
///
/// 例如 "mixamorig:LeftHand" -> "LeftHand"
pub fn normalize_name(name: &str) -> String {
    name.rsplit(['_', ':', '.', ' '])
        .next()
        .unwrap_or(name)
        .to_string()
}

impl BvhFile {
    /// 从文件加载 BVH
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::parse(&bytes)
    }

    /// 解析字节数据（UTF-8，支持 BOM，非法字节替换）
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let content = decode_text(bytes);
        Self::parse_str(&content)
    }

    /// 解析文本
    pub fn parse_str(content: &str) -> Result<Self> {
        let mut lines = content.lines().enumerate();
        let joints = Self::parse_hierarchy(&mut lines)?;
        let (frame_time, motion) = Self::parse_motion(&mut lines, &joints)?;

        log::info!(
            "BVH 解析完成: {} 个骨骼, {} 帧, 帧时间 {}",
            joints.len(),
            motion.len(),
            frame_time
        );

        Ok(Self {
            joints,
            frame_time,
            motion,
        })
    }

    /// 解析 HIERARCHY 段，直到 MOTION
    fn parse_hierarchy<'a, I>(lines: &mut I) -> Result<Vec<BvhJoint>>
    where
        I: Iterator<Item = (usize, &'a str)>,
    {
        let mut joints: Vec<BvhJoint> = Vec::new();
        let mut stack: Vec<usize> = Vec::new();
        // 最近声明、尚未用 `{` 打开的关节
        let mut pending: Option<usize> = None;
        let mut found_motion = false;

        for (number, line) in lines.by_ref() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let Some(&keyword) = tokens.first() else {
                continue;
            };

            match keyword {
                "HIERARCHY" => {}
                "ROOT" | "JOINT" => {
                    if keyword == "ROOT" && !joints.is_empty() {
                        return Err(parse_error(number, "multiple ROOT declarations"));
                    }
                    if keyword == "JOINT" && stack.is_empty() {
                        return Err(parse_error(number, "JOINT outside of ROOT"));
                    }
                    let name = tokens
                        .get(1)
                        .filter(|t| **t != "{")
                        .ok_or_else(|| parse_error(number, "missing joint name"))?;
                    pending = Some(joints.len());
                    joints.push(BvhJoint {
                        name: normalize_name(name),
                        parent: stack.last().copied(),
                        offset: Vec3::ZERO,
                        channels: Vec::new(),
                    });
                }
                "End" => {
                    let parent = *stack
                        .last()
                        .ok_or_else(|| parse_error(number, "End Site outside of ROOT"))?;
                    let suffix = tokens.get(1).filter(|t| **t != "{").copied().unwrap_or("Site");
                    pending = Some(joints.len());
                    joints.push(BvhJoint {
                        name: normalize_name(&format!("{}{}", joints[parent].name, suffix)),
                        parent: Some(parent),
                        offset: Vec3::ZERO,
                        channels: Vec::new(),
                    });
                }
                "{" => {}
                "}" => {
                    if stack.pop().is_none() {
                        return Err(parse_error(number, "unbalanced '}'"));
                    }
                }
                "OFFSET" => {
                    let current = Self::current_joint(&stack, number)?;
                    if tokens.len() < 4 {
                        return Err(parse_error(number, "OFFSET needs 3 values"));
                    }
                    joints[current].offset = Vec3::new(
                        parse_float(tokens[1], number)?,
                        parse_float(tokens[2], number)?,
                        parse_float(tokens[3], number)?,
                    );
                }
                "CHANNELS" | "CHANNEL" => {
                    let current = Self::current_joint(&stack, number)?;
                    let count: usize = tokens
                        .get(1)
                        .and_then(|t| t.parse().ok())
                        .ok_or_else(|| parse_error(number, "malformed channel count"))?;
                    let names = &tokens[2..];
                    if names.len() != count {
                        return Err(parse_error(
                            number,
                            &format!("declared {} channels but listed {}", count, names.len()),
                        ));
                    }
                    joints[current].channels = names
                        .iter()
                        .map(|t| {
                            BvhChannel::parse(t)
                                .ok_or_else(|| parse_error(number, &format!("unknown channel {}", t)))
                        })
                        .collect::<Result<Vec<_>>>()?;
                }
                "MOTION" => {
                    found_motion = true;
                    break;
                }
                other => {
                    return Err(parse_error(number, &format!("unexpected token {}", other)));
                }
            }

            // 左花括号可与声明同行
            if tokens.contains(&"{") {
                let opened = pending
                    .take()
                    .ok_or_else(|| parse_error(number, "'{' without joint declaration"))?;
                stack.push(opened);
            }
        }

        if !found_motion {
            return Err(MotionError::BvhParse("missing MOTION section".to_string()));
        }
        if joints.is_empty() {
            return Err(MotionError::BvhParse("missing ROOT".to_string()));
        }
        if !stack.is_empty() || pending.is_some() {
            return Err(MotionError::BvhParse("unbalanced braces in HIERARCHY".to_string()));
        }
        Ok(joints)
    }

    fn current_joint(stack: &[usize], number: usize) -> Result<usize> {
        stack
            .last()
            .copied()
            .ok_or_else(|| parse_error(number, "property outside of joint block"))
    }

    /// 解析 MOTION 段：Frames、Frame Time 和数据行
    fn parse_motion<'a, I>(lines: &mut I, joints: &[BvhJoint]) -> Result<(f32, Vec<Vec<f32>>)>
    where
        I: Iterator<Item = (usize, &'a str)>,
    {
        let mut lines = lines.filter(|(_, line)| !line.trim().is_empty());

        let (number, line) = lines
            .next()
            .ok_or_else(|| MotionError::BvhParse("missing Frames header".to_string()))?;
        let frame_count: usize = line
            .trim()
            .strip_prefix("Frames:")
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| parse_error(number, "malformed Frames header"))?;

        let (number, line) = lines
            .next()
            .ok_or_else(|| MotionError::BvhParse("missing Frame Time header".to_string()))?;
        let frame_time: f32 = line
            .trim()
            .strip_prefix("Frame Time:")
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| parse_error(number, "malformed Frame Time header"))?;
        if !(frame_time.is_finite() && frame_time > 0.0) {
            return Err(parse_error(number, "Frame Time must be positive"));
        }

        let width: usize = joints.iter().map(|j| j.channels.len()).sum();
        let mut motion = Vec::with_capacity(frame_count);
        for (number, line) in lines {
            let row = line
                .split_whitespace()
                .map(|t| parse_float(t, number))
                .collect::<Result<Vec<f32>>>()?;
            if row.len() != width {
                return Err(parse_error(
                    number,
                    &format!("expected {} channel values, found {}", width, row.len()),
                ));
            }
            motion.push(row);
        }

        if motion.len() != frame_count {
            return Err(MotionError::BvhParse(format!(
                "header declares {} frames but found {}",
                frame_count,
                motion.len()
            )));
        }
        if motion.is_empty() {
            return Err(MotionError::BvhParse("motion has no frames".to_string()));
        }
        Ok((frame_time, motion))
    }

    /// 获取骨骼数量
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn frame_count(&self) -> usize {
        self.motion.len()
    }

    pub fn channel_count(&self) -> usize {
        self.joints.iter().map(|j| j.channels.len()).sum()
    }

    pub fn framerate(&self, config: &ImportConfig) -> f32 {
        let framerate = 1.0 / self.frame_time;
        if config.round_framerate {
            framerate.round()
        } else {
            framerate
        }
    }

    /// 构建层级（偏移已换算单位）
    pub fn hierarchy(&self, config: &ImportConfig) -> Result<Hierarchy> {
        Hierarchy::from_parts(
            self.joints
                .iter()
                .map(|j| (j.name.clone(), j.parent, j.offset / config.position_divisor)),
        )
    }

    /// 计算一帧的世界变换
    ///
    /// 位置通道替换对应分量，旋转通道按声明顺序右乘；
    /// 计算出的位置全为 0 时回退到 OFFSET。
    pub fn pose(&self, row: &[f32], config: &ImportConfig) -> Vec<Mat4> {
        let mut world: Vec<Mat4> = Vec::with_capacity(self.joints.len());
        let mut values = row.iter().copied();

        for joint in &self.joints {
            let mut position = Vec3::ZERO;
            let mut rotation = Quat::IDENTITY;

            for channel in &joint.channels {
                let value = values.next().unwrap_or(0.0);
                match channel {
                    BvhChannel::Xposition => position.x = value,
                    BvhChannel::Yposition => position.y = value,
                    BvhChannel::Zposition => position.z = value,
                    BvhChannel::Xrotation => rotation *= Quat::from_rotation_x(value.to_radians()),
                    BvhChannel::Yrotation => rotation *= Quat::from_rotation_y(value.to_radians()),
                    BvhChannel::Zrotation => rotation *= Quat::from_rotation_z(value.to_radians()),
                }
            }

            if position == Vec3::ZERO {
                position = joint.offset;
            }
            let local = Mat4::from_rotation_translation(rotation, position / config.position_divisor);
            let global = match joint.parent {
                Some(parent) => world[parent] * local,
                None => local,
            };
            world.push(global);
        }
        world
    }

    /// 转换为动作数据
    pub fn to_motion_data(&self, name: impl Into<String>, config: &ImportConfig) -> Result<MotionData> {
        let hierarchy = self.hierarchy(config)?;
        let world = self.motion.iter().map(|row| self.pose(row, config)).collect();
        MotionData::new(name, hierarchy, world, self.framerate(config))
    }
}

fn parse_float(token: &str, number: usize) -> Result<f32> {
    token
        .parse::<f32>()
        .map_err(|_| parse_error(number, &format!("invalid number {}", token)))
}

fn parse_error(number: usize, message: &str) -> MotionError {
    MotionError::BvhParse(format!("line {}: {}", number + 1, message))
}

/// 解码文本（UTF-8，识别 BOM）
fn decode_text(bytes: &[u8]) -> String {
    use encoding_rs::UTF_8;
    let (decoded, _, had_errors) = UTF_8.decode(bytes);
    if had_errors {
        log::warn!("BVH 文件包含非法 UTF-8 字节，已替换");
    }
    decoded.into_owned()
}
