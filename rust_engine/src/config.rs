//! 运动数据处理配置
//!
//! 所有参数扁平化，每个配置结构由使用它的模块/求解器实例持有，
//! 修改后需要显式重新计算对应模块。

/// BVH 导入配置
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// 位置单位换算除数，默认 100.0（厘米 -> 米）
    pub position_divisor: f32,
    /// 帧率是否四舍五入到整数，默认 true
    /// 例如 Frame Time 0.033333 -> 30 FPS
    pub round_framerate: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            position_divisor: 100.0,
            round_framerate: true,
        }
    }
}

/// 相位检测配置
#[derive(Debug, Clone)]
pub struct PhaseConfig {
    // ========== 阈值 ==========
    /// 速度阈值，默认 0.2
    /// 低于此值的速度视为静止（置 0）
    pub velocity_threshold: f32,
    /// 位移阈值，默认 0.2
    /// 相对参考姿势的位移低于此值视为"回到参考姿势"
    pub position_threshold: f32,

    // ========== 参考姿势 ==========
    /// 前向速度窗口（秒），默认 0.5
    /// 窗口内速度和低于阈值时参考姿势前移到当前帧
    pub window: f32,
    /// 初始参考帧（1 起始，会被钳制到有效范围），默认 5
    pub reference_frame: usize,

    // ========== 钳制 ==========
    /// 单骨骼速度上限，默认 1.0
    pub max_bone_velocity: f32,
    /// 单骨骼位移上限，默认 1.0
    pub max_bone_displacement: f32,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            velocity_threshold: 0.2,
            position_threshold: 0.2,
            window: 0.5,
            reference_frame: 5,
            max_bone_velocity: 1.0,
            max_bone_displacement: 1.0,
        }
    }
}

/// 轨迹采样配置
#[derive(Debug, Clone)]
pub struct TrajectoryConfig {
    /// 采样点数量，默认 13（参考帧位于中间采样点）
    pub sample_count: usize,
    /// 采样间隔（帧），默认 5
    pub sample_size: usize,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            sample_count: 13,
            sample_size: 5,
        }
    }
}

/// IK 求解配置
#[derive(Debug, Clone)]
pub struct IkConfig {
    /// 最大迭代次数，默认 20
    /// 达到上限仍未收敛不视为错误
    pub max_iterations: u32,
    /// 收敛误差（效果器到目标的距离），默认 1e-5
    pub error_threshold: f32,
    /// CCD 单步最大旋转角（弧度），默认 60°
    pub max_rotation: f32,
    /// 小于此角度（弧度）的旋转直接跳过，默认 1e-5
    pub min_rotation: f32,
}

impl Default for IkConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            error_threshold: 1.0e-5,
            max_rotation: 60.0_f32.to_radians(),
            min_rotation: 1.0e-5,
        }
    }
}
