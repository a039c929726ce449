//! 骨骼节点（运行时姿势）

use glam::{Mat4, Quat, Vec3};

use super::BoneTransform;

/// 运行时骨骼
#[derive(Clone, Debug)]
pub struct Bone {
    pub index: usize,
    pub name: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,

    /// 相对父骨骼的本地变换
    pub local: BoneTransform,
    /// 全局变换（由 Actor 维护）
    pub global_transform: Mat4,

    /// 缓存的骨长，由 `Actor::compute_length` 更新
    pub length: f32,
}

impl Bone {
    pub fn new(index: usize, name: impl Into<String>, parent: Option<usize>) -> Self {
        Self {
            index,
            name: name.into(),
            parent,
            children: Vec::new(),
            local: BoneTransform::default(),
            global_transform: Mat4::IDENTITY,
            length: 0.0,
        }
    }

    /// 世界空间位置
    pub fn position(&self) -> Vec3 {
        self.global_transform.w_axis.truncate()
    }

    /// 世界空间旋转
    pub fn rotation(&self) -> Quat {
        let (_, rotation, _) = self.global_transform.to_scale_rotation_translation();
        rotation.normalize()
    }

    pub fn local_transform(&self) -> Mat4 {
        self.local.to_matrix()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }
}
