//! 动作数据：BVH 解析、帧缓冲区和查询

mod bvh_file;
mod frame;
mod mirror;
mod motion_data;

pub use bvh_file::{normalize_name, BvhChannel, BvhFile, BvhJoint};
pub use frame::{Frame, FrameRef};
pub use mirror::MirrorAxis;
pub use motion_data::MotionData;
