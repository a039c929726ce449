//! IK 求解器（CCD / FABRIK）

use glam::{Quat, Vec3};

use super::Actor;
use crate::config::IkConfig;

const EPSILON: f32 = 1.0e-6;
/// 叉积长度平方低于此值视为共线
const AXIS_EPSILON: f32 = 1.0e-14;

/// IK 链：从根到效果器的骨骼索引
///
/// 设置根或效果器时重建索引缓存。
#[derive(Clone, Debug)]
pub struct IkChain {
    root: usize,
    effector: usize,
    indices: Vec<usize>,
}

impl IkChain {
    /// `root` 必须是 `effector` 的祖先
    pub fn new(actor: &Actor, root: usize, effector: usize) -> Option<Self> {
        let indices = Self::build(actor, root, effector)?;
        Some(Self {
            root,
            effector,
            indices,
        })
    }

    fn build(actor: &Actor, root: usize, effector: usize) -> Option<Vec<usize>> {
        let indices = actor.chain(root, effector);
        if indices.is_none() {
            log::warn!("骨骼 {} 不是骨骼 {} 的祖先，无法构建 IK 链", root, effector);
        }
        indices
    }

    pub fn set_root(&mut self, actor: &Actor, root: usize) -> bool {
        if root == self.root {
            return true;
        }
        match Self::build(actor, root, self.effector) {
            Some(indices) => {
                self.root = root;
                self.indices = indices;
                true
            }
            None => false,
        }
    }

    pub fn set_effector(&mut self, actor: &Actor, effector: usize) -> bool {
        if effector == self.effector {
            return true;
        }
        match Self::build(actor, self.root, effector) {
            Some(indices) => {
                self.effector = effector;
                self.indices = indices;
                true
            }
            None => false,
        }
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn effector(&self) -> usize {
        self.effector
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// 链上各段的当前长度
    pub fn segment_lengths(&self, actor: &Actor) -> Vec<f32> {
        self.indices
            .windows(2)
            .map(|pair| actor.world_position(pair[0]).distance(actor.world_position(pair[1])))
            .collect()
    }
}

/// 求解结果，未收敛不视为错误
#[derive(Clone, Debug, Default)]
pub struct IkReport {
    pub iterations: u32,
    /// 最终效果器到目标的距离
    pub error: f32,
    pub converged: bool,
    /// 每次迭代后的误差
    pub history: Vec<f32>,
}

fn effector_error(actor: &Actor, chain: &IkChain, target: Vec3) -> f32 {
    actor.world_position(chain.effector).distance(target)
}

/// CCD 求解器
#[derive(Clone, Debug)]
pub struct CcdSolver {
    pub chain: IkChain,
    pub config: IkConfig,
    /// 旋转轴退化时使用的参考轴
    pub reference_axis: Vec3,
}

impl CcdSolver {
    pub fn new(chain: IkChain, config: IkConfig) -> Self {
        Self {
            chain,
            config,
            reference_axis: Vec3::Y,
        }
    }

    /// 使效果器逼近 `target`
    pub fn solve(&self, actor: &mut Actor, target: Vec3) -> IkReport {
        let mut report = IkReport::default();
        let joints = &self.chain.indices;
        if joints.len() < 2 {
            report.error = effector_error(actor, &self.chain, target);
            report.converged = report.error < self.config.error_threshold;
            return report;
        }

        for _ in 0..self.config.max_iterations {
            if effector_error(actor, &self.chain, target) < self.config.error_threshold {
                break;
            }

            // 从效果器的父骨骼向根迭代
            for &joint in joints[..joints.len() - 1].iter().rev() {
                self.rotate_joint(actor, joint, target);
            }

            report.iterations += 1;
            report.history.push(effector_error(actor, &self.chain, target));
        }

        report.error = effector_error(actor, &self.chain, target);
        report.converged = report.error < self.config.error_threshold;
        report
    }

    fn rotate_joint(&self, actor: &mut Actor, joint: usize, target: Vec3) {
        let joint_position = actor.world_position(joint);
        let to_effector = actor.world_position(self.chain.effector) - joint_position;
        let to_target = target - joint_position;
        if to_effector.length_squared() < EPSILON || to_target.length_squared() < EPSILON {
            return;
        }

        let from = to_effector.normalize();
        let to = to_target.normalize();
        let cross = from.cross(to);
        let angle = cross.length().atan2(from.dot(to));
        if angle < self.config.min_rotation {
            return;
        }
        let angle = angle.min(self.config.max_rotation);

        let axis = self.rotation_axis(from, cross);
        let rotation = Quat::from_axis_angle(axis, angle);
        let current = actor.world_rotation(joint);
        actor.set_world_rotation(joint, (rotation * current).normalize());
    }

    /// 旋转轴；仅在方向反向共线时退化到参考轴在垂直平面上的投影
    fn rotation_axis(&self, from: Vec3, cross: Vec3) -> Vec3 {
        if cross.length_squared() > AXIS_EPSILON {
            return cross.normalize();
        }
        let projected = self.reference_axis - from * self.reference_axis.dot(from);
        if projected.length_squared() > EPSILON {
            log::debug!("CCD 旋转轴退化，使用参考轴");
            projected.normalize()
        } else {
            from.any_orthonormal_vector()
        }
    }
}

/// FABRIK 求解器
#[derive(Clone, Debug)]
pub struct FabrikSolver {
    pub chain: IkChain,
    pub config: IkConfig,
}

impl FabrikSolver {
    pub fn new(chain: IkChain, config: IkConfig) -> Self {
        Self { chain, config }
    }

    /// 求解并将新位置转换为骨骼旋转
    pub fn solve(&self, actor: &mut Actor, target: Vec3) -> IkReport {
        let joints = &self.chain.indices;
        let mut positions: Vec<Vec3> = joints.iter().map(|&i| actor.world_position(i)).collect();
        let lengths = self.chain.segment_lengths(actor);
        let mut report = IkReport::default();

        if lengths.is_empty() {
            report.error = effector_error(actor, &self.chain, target);
            report.converged = report.error < self.config.error_threshold;
            return report;
        }

        let root = positions[0];
        let total: f32 = lengths.iter().sum();

        if root.distance(target) > total {
            // 目标不可达：沿目标方向拉直
            let direction = (target - root).normalize_or_zero();
            for i in 0..lengths.len() {
                positions[i + 1] = positions[i] + direction * lengths[i];
            }
            report.iterations = 1;
            report.history.push(positions[lengths.len()].distance(target));
        } else {
            let last = positions.len() - 1;
            for _ in 0..self.config.max_iterations {
                if positions[last].distance(target) < self.config.error_threshold {
                    break;
                }

                // 前向：效果器拉到目标，向内保持段长
                positions[last] = target;
                for i in (0..last).rev() {
                    let direction = Self::direction(positions[i] - positions[i + 1], &positions, i);
                    positions[i] = positions[i + 1] + direction * lengths[i];
                }

                // 后向：根固定回原位，向外保持段长
                positions[0] = root;
                for i in 0..last {
                    let direction = Self::direction(positions[i + 1] - positions[i], &positions, i);
                    positions[i + 1] = positions[i] + direction * lengths[i];
                }

                report.iterations += 1;
                report.history.push(positions[last].distance(target));
            }
        }

        self.apply_positions(actor, &positions);

        report.error = effector_error(actor, &self.chain, target);
        report.converged = report.error < self.config.error_threshold;
        report
    }

    /// 段方向；两点重合时沿相邻段方向
    fn direction(delta: Vec3, positions: &[Vec3], i: usize) -> Vec3 {
        let direction = delta.normalize_or_zero();
        if direction != Vec3::ZERO {
            return direction;
        }
        log::debug!("FABRIK 段 {} 长度为 0，使用相邻段方向", i);
        positions
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).normalize_or_zero())
            .find(|d| *d != Vec3::ZERO)
            .unwrap_or(Vec3::Y)
    }

    /// 由位置重新推导旋转：逐关节旋转到新的子骨骼方向
    fn apply_positions(&self, actor: &mut Actor, positions: &[Vec3]) {
        let joints = &self.chain.indices;
        for i in 0..joints.len() - 1 {
            let joint = joints[i];
            let child = joints[i + 1];
            let current = (actor.world_position(child) - actor.world_position(joint)).normalize_or_zero();
            let desired = (positions[i + 1] - positions[i]).normalize_or_zero();
            if current == Vec3::ZERO || desired == Vec3::ZERO {
                continue;
            }
            let rotation = Quat::from_rotation_arc(current, desired);
            let world = actor.world_rotation(joint);
            actor.set_world_rotation(joint, (rotation * world).normalize());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{BoneTransform, SceneNode};
    use approx::assert_relative_eq;

    /// 沿 X 轴伸直的链，每段长 1
    fn straight_chain(segments: usize) -> Actor {
        let mut node = SceneNode::new(format!("Joint{}", segments), BoneTransform::new(Vec3::X, Quat::IDENTITY));
        for i in (1..segments).rev() {
            node = SceneNode::new(format!("Joint{}", i), BoneTransform::new(Vec3::X, Quat::IDENTITY))
                .with_child(node);
        }
        let root = SceneNode::new("Joint0", BoneTransform::default()).with_child(node);
        Actor::from_scene(&root)
    }

    #[test]
    fn test_chain_rebuild() {
        let actor = straight_chain(3);
        let mut chain = IkChain::new(&actor, 0, 3).unwrap();
        assert_eq!(chain.indices(), &[0, 1, 2, 3]);
        assert!(chain.set_root(&actor, 1));
        assert_eq!(chain.indices(), &[1, 2, 3]);
        assert!(chain.set_effector(&actor, 2));
        assert_eq!(chain.indices(), &[1, 2]);
        assert!(!chain.set_root(&actor, 3));
        assert_eq!(chain.root(), 1);
        assert!(IkChain::new(&actor, 3, 0).is_none());
    }

    #[test]
    fn test_ccd_right_angle_converges() {
        let mut actor = straight_chain(2);
        let chain = IkChain::new(&actor, 0, 2).unwrap();
        let config = IkConfig {
            error_threshold: 1.0e-3,
            ..IkConfig::default()
        };
        let max_iterations = config.max_iterations;
        let solver = CcdSolver::new(chain, config);

        let target = Vec3::new(1.0, 1.0, 0.0);
        let report = solver.solve(&mut actor, target);

        assert!(report.converged);
        assert!(report.iterations < max_iterations);
        assert!(actor.world_position(2).distance(target) < 1.0e-3);
        // 平面链的旋转轴始终为 Z，求解后仍在 z = 0 平面内
        assert!(actor.world_position(1).z.abs() < 1.0e-5);
        assert!(actor.world_position(2).z.abs() < 1.0e-5);
        assert_relative_eq!(actor.compute_length(1), 1.0, epsilon = 1e-4);
        assert_relative_eq!(actor.compute_length(2), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_ccd_collinear_target_stays_finite() {
        let mut actor = straight_chain(2);
        let chain = IkChain::new(&actor, 0, 2).unwrap();
        let solver = CcdSolver::new(chain, IkConfig::default());

        // 目标位于效果器反方向
        let report = solver.solve(&mut actor, Vec3::new(-1.5, 0.0, 0.0));
        for bone in actor.bones() {
            assert!(bone.position().is_finite());
            assert!(bone.rotation().is_finite());
        }
        assert!(report.error.is_finite());
        assert!(report.error < 2.0);
    }

    #[test]
    fn test_fabrik_reachable_monotonic() {
        let mut actor = straight_chain(3);
        let chain = IkChain::new(&actor, 0, 3).unwrap();
        let solver = FabrikSolver::new(chain, IkConfig::default());

        let target = Vec3::new(1.5, 1.5, 0.0);
        let report = solver.solve(&mut actor, target);

        assert!(report.iterations <= 20);
        for pair in report.history.windows(2) {
            assert!(pair[1] <= pair[0] + 1.0e-6);
        }
        assert!(report.history.last().copied().unwrap_or(f32::MAX) < 1.0e-4);
        assert!(actor.world_position(3).distance(target) < 1.0e-3);
        assert!(actor.world_position(0).distance(Vec3::ZERO) < 1.0e-6);
    }

    #[test]
    fn test_fabrik_unreachable_keeps_lengths() {
        let mut actor = straight_chain(3);
        let chain = IkChain::new(&actor, 0, 3).unwrap();
        let solver = FabrikSolver::new(chain.clone(), IkConfig::default());

        let target = Vec3::new(0.0, 5.0, 2.0);
        let report = solver.solve(&mut actor, target);

        assert!(!report.converged);
        for length in chain.segment_lengths(&actor) {
            assert_relative_eq!(length, 1.0, epsilon = 1e-5);
        }
        // 拉直指向目标
        let direction = actor.world_position(3).normalize();
        assert!(direction.distance(target.normalize()) < 1.0e-4);
    }
}
