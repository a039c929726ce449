//! 速度模块：单帧全骨骼运动学采样

use glam::{Mat4, Vec3};

use crate::animation::MotionData;

#[derive(Clone, Debug)]
pub struct VelocityModule {
    /// 骨骼选择掩码
    selected: Vec<bool>,
    /// 差分时间步（秒），默认 1 / framerate
    pub delta: f32,
    /// 当前采样帧（1 起始）
    frame: usize,

    pub transformations: Vec<Mat4>,
    pub velocities: Vec<Vec3>,
    pub accelerations: Vec<Vec3>,
    pub angular_velocities: Vec<f32>,
}

impl VelocityModule {
    pub fn new(data: &MotionData) -> Self {
        let mut module = Self {
            selected: vec![true; data.hierarchy().len()],
            delta: 1.0 / data.framerate(),
            frame: 1,
            transformations: Vec::new(),
            velocities: Vec::new(),
            accelerations: Vec::new(),
            angular_velocities: Vec::new(),
        };
        module.compute(data);
        module
    }

    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn is_selected(&self, bone: usize) -> bool {
        self.selected.get(bone).copied().unwrap_or(false)
    }

    pub fn toggle(&mut self, bone: usize) {
        match self.selected.get_mut(bone) {
            Some(selected) => *selected = !*selected,
            None => log::warn!("速度模块骨骼索引 {} 越界", bone),
        }
    }

    pub fn select_all(&mut self, selected: bool) {
        self.selected.iter_mut().for_each(|s| *s = selected);
    }

    /// 选中骨骼的索引
    pub fn selected_bones(&self) -> Vec<usize> {
        self.selected
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.then_some(i))
            .collect()
    }

    /// 采样某帧（1 起始，钳制）所有骨骼
    pub fn sample(&mut self, data: &MotionData, frame: usize) {
        let frame = data.frame(frame);
        self.frame = frame.index();
        if self.selected.len() != data.hierarchy().len() {
            self.selected = vec![true; data.hierarchy().len()];
        }
        let mirrored = data.mirrored;
        self.transformations = frame.bone_transformations(mirrored);
        self.velocities = frame.bone_velocities(mirrored, self.delta);
        self.accelerations = frame.bone_accelerations(mirrored, self.delta);
        self.angular_velocities = frame
            .angular_bone_velocities(mirrored, self.delta)
            .into_iter()
            .map(|v| crate::finite_or_zero(v, "angular velocity"))
            .collect();
    }

    pub fn compute(&mut self, data: &MotionData) {
        self.sample(data, self.frame);
    }

    /// 选中骨骼速度大小之和
    pub fn total_speed(&self) -> f32 {
        self.velocities
            .iter()
            .zip(&self.selected)
            .filter(|(_, s)| **s)
            .map(|(v, _)| v.length())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::fixtures;
    use approx::assert_relative_eq;

    #[test]
    fn test_sample_frame() {
        let data = fixtures::upper_body(10, 30.0, |f| {
            (Vec3::new(0.0, 0.0, 0.01 * f as f32), Vec3::ZERO)
        });
        let mut module = VelocityModule::new(&data);
        assert_eq!(module.frame(), 1);
        assert_relative_eq!(module.delta, 1.0 / 30.0);

        module.sample(&data, 5);
        assert_eq!(module.transformations.len(), 10);
        assert_relative_eq!(module.velocities[fixtures::LEFT_HAND].z, 0.3, epsilon = 1e-4);
        assert!(module.angular_velocities.iter().all(|v| *v == 0.0));
        assert_relative_eq!(module.total_speed(), 3.0, epsilon = 1e-3);

        module.select_all(false);
        module.toggle(0);
        assert_eq!(module.selected_bones(), vec![0]);
        assert_relative_eq!(module.total_speed(), 0.3, epsilon = 1e-4);

        module.sample(&data, 99);
        assert_eq!(module.frame(), 10);
    }
}
