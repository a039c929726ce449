//! 骨骼系统：层级拓扑、运行时姿势和 IK 求解器

mod actor;
mod bone;
mod hierarchy;
mod ik_solver;

pub use actor::Actor;
pub use bone::Bone;
pub use hierarchy::{Hierarchy, HierarchyBone};
pub use ik_solver::{CcdSolver, FabrikSolver, IkChain, IkReport};

use glam::{Mat4, Quat, Vec3};

/// 骨骼本地变换数据（无缩放）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoneTransform {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Default for BoneTransform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl BoneTransform {
    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self { translation, rotation }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.translation)
    }

    /// 从仿射矩阵提取（忽略缩放）
    pub fn from_matrix(matrix: &Mat4) -> Self {
        let (_, rotation, translation) = matrix.to_scale_rotation_translation();
        Self { translation, rotation }
    }
}

/// 宿主场景中的变换节点树（骨骼提取的输入）
#[derive(Clone, Debug, Default)]
pub struct SceneNode {
    pub name: String,
    /// 相对父节点的本地变换
    pub local: BoneTransform,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn new(name: impl Into<String>, local: BoneTransform) -> Self {
        Self {
            name: name.into(),
            local,
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: SceneNode) -> Self {
        self.children.push(child);
        self
    }

    /// 节点总数（含自身）
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(SceneNode::count).sum::<usize>()
    }
}

/// 提取过程中访问到的节点
pub(crate) struct VisitedNode<'a> {
    pub node: &'a SceneNode,
    pub parent: Option<usize>,
    /// 节点的世界变换
    pub world: Mat4,
    /// 最近的被保留祖先的世界变换
    pub parent_world: Mat4,
}

/// 深度优先遍历场景树，按访问顺序分配连续索引
///
/// `filter` 返回 false 的节点不分配索引，但仍递归其子节点，
/// 子节点挂接到最近的被保留祖先上。
pub(crate) fn walk_scene<'a, F, V>(root: &'a SceneNode, filter: &F, visit: &mut V)
where
    F: Fn(&SceneNode) -> bool,
    V: FnMut(VisitedNode<'a>) -> usize,
{
    fn recurse<'a, F, V>(
        node: &'a SceneNode,
        parent: Option<usize>,
        parent_world: Mat4,
        node_world_parent: Mat4,
        filter: &F,
        visit: &mut V,
    ) where
        F: Fn(&SceneNode) -> bool,
        V: FnMut(VisitedNode<'a>) -> usize,
    {
        let world = node_world_parent * node.local.to_matrix();
        let (next_parent, next_parent_world) = if filter(node) {
            let index = visit(VisitedNode {
                node,
                parent,
                world,
                parent_world,
            });
            (Some(index), world)
        } else {
            (parent, parent_world)
        };
        for child in &node.children {
            recurse(child, next_parent, next_parent_world, world, filter, visit);
        }
    }

    recurse(root, None, Mat4::IDENTITY, Mat4::IDENTITY, filter, visit);
}
