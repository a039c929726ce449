//! 骨架（Actor）：骨骼数组 + 全局变换维护

use glam::{Mat4, Quat, Vec3};

use super::{walk_scene, Bone, BoneTransform, Hierarchy, SceneNode};

/// 运行时骨架
///
/// 骨骼按索引存储在数组中，父子关系通过索引表达。
/// 所有修改接口都会递归更新受影响子树的全局变换。
#[derive(Clone, Debug, Default)]
pub struct Actor {
    bones: Vec<Bone>,
}

impl Actor {
    /// 由层级拓扑和每根骨骼的世界变换创建
    ///
    /// `world` 长度必须等于骨骼数量。
    pub fn from_hierarchy(hierarchy: &Hierarchy, world: &[Mat4]) -> Self {
        let mut bones: Vec<Bone> = hierarchy
            .bones()
            .iter()
            .map(|h| {
                let mut bone = Bone::new(h.index, h.name.clone(), h.parent);
                bone.children = h.children.clone();
                bone.global_transform = world[h.index];
                bone
            })
            .collect();

        for i in 0..bones.len() {
            let parent_world = match bones[i].parent {
                Some(parent) => bones[parent].global_transform,
                None => Mat4::IDENTITY,
            };
            let local = parent_world.inverse() * bones[i].global_transform;
            bones[i].local = BoneTransform::from_matrix(&local);
        }

        let mut actor = Self { bones };
        actor.update_all();
        actor.compute_lengths();
        actor
    }

    /// 从场景节点树创建（深度优先编号）
    pub fn from_scene(root: &SceneNode) -> Self {
        let mut bones: Vec<Bone> = Vec::with_capacity(root.count());
        walk_scene(root, &|_| true, &mut |visited| {
            let index = bones.len();
            let mut bone = Bone::new(index, visited.node.name.clone(), visited.parent);
            bone.local = visited.node.local;
            bone.global_transform = visited.world;
            if let Some(parent) = visited.parent {
                bones[parent].children.push(index);
            }
            bones.push(bone);
            index
        });

        let mut actor = Self { bones };
        actor.compute_lengths();
        actor
    }

    /// 获取骨骼数量
    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    /// 获取骨骼
    pub fn bone(&self, index: usize) -> Option<&Bone> {
        self.bones.get(index)
    }

    pub fn root(&self) -> Option<&Bone> {
        self.bones.iter().find(|b| b.is_root())
    }

    /// 精确名称查找
    pub fn find_bone(&self, name: &str) -> Option<&Bone> {
        self.bones.iter().find(|b| b.name == name)
    }

    /// 子串查找（如 "mixamorig:LeftHand" 匹配 "LeftHand"），返回索引最小者
    pub fn find_bone_contains(&self, pattern: &str) -> Option<&Bone> {
        self.bones.iter().find(|b| b.name.contains(pattern))
    }

    /// 第 n 个子骨骼，越界返回 None
    pub fn get_child(&self, index: usize, n: usize) -> Option<&Bone> {
        let child = *self.bones.get(index)?.children.get(n)?;
        self.bones.get(child)
    }

    /// 从根到 `effector` 的索引链；`root` 不是其祖先时返回 None
    pub fn chain(&self, root: usize, effector: usize) -> Option<Vec<usize>> {
        let mut chain = vec![effector];
        let mut current = effector;
        while current != root {
            current = self.bones.get(current)?.parent?;
            chain.push(current);
        }
        chain.reverse();
        Some(chain)
    }

    // ========== 骨长 ==========

    /// 重新计算骨骼到父骨骼的距离并缓存
    pub fn compute_length(&mut self, index: usize) -> f32 {
        let Some(bone) = self.bones.get(index) else {
            return 0.0;
        };
        let length = match bone.parent {
            Some(parent) => self.bones[parent].position().distance(bone.position()),
            None => 0.0,
        };
        self.bones[index].length = length;
        length
    }

    pub fn compute_lengths(&mut self) {
        for index in 0..self.bones.len() {
            self.compute_length(index);
        }
    }

    /// 沿父骨骼方向移动骨骼，使其到父骨骼的距离等于缓存骨长
    pub fn apply_length(&mut self, index: usize) {
        let Some(bone) = self.bones.get(index) else {
            return;
        };
        let Some(parent) = bone.parent else {
            return;
        };
        let parent_position = self.bones[parent].position();
        let direction = (bone.position() - parent_position).normalize_or_zero();
        if direction == Vec3::ZERO {
            log::debug!("骨骼 {} 与父骨骼重合，跳过骨长应用", bone.name);
            return;
        }
        let target = parent_position + direction * bone.length;
        self.set_world_position(index, target);
    }

    // ========== 姿势访问 ==========

    pub fn world_position(&self, index: usize) -> Vec3 {
        self.bones[index].position()
    }

    pub fn world_rotation(&self, index: usize) -> Quat {
        self.bones[index].rotation()
    }

    fn parent_global(&self, index: usize) -> Mat4 {
        match self.bones[index].parent {
            Some(parent) => self.bones[parent].global_transform,
            None => Mat4::IDENTITY,
        }
    }

    /// 设置世界空间位置（子树跟随）
    pub fn set_world_position(&mut self, index: usize, position: Vec3) {
        let local = self.parent_global(index).inverse().transform_point3(position);
        self.bones[index].local.translation = local;
        self.update_global_recursive(index);
    }

    /// 设置世界空间旋转（子树跟随）
    pub fn set_world_rotation(&mut self, index: usize, rotation: Quat) {
        let (_, parent_rotation, _) = self.parent_global(index).to_scale_rotation_translation();
        self.bones[index].local.rotation = (parent_rotation.inverse() * rotation).normalize();
        self.update_global_recursive(index);
    }

    /// 设置本地变换（子树跟随）
    pub fn set_local(&mut self, index: usize, local: BoneTransform) {
        self.bones[index].local = local;
        self.update_global_recursive(index);
    }

    /// 递归更新骨骼及其子树的全局变换
    pub fn update_global_recursive(&mut self, index: usize) {
        let mut stack = vec![index];
        while let Some(current) = stack.pop() {
            let parent_global = self.parent_global(current);
            let bone = &mut self.bones[current];
            bone.global_transform = parent_global * bone.local_transform();
            stack.extend(bone.children.iter().copied());
        }
    }

    /// 从所有根骨骼更新全局变换
    pub fn update_all(&mut self) {
        let roots: Vec<usize> = self
            .bones
            .iter()
            .filter(|b| b.is_root())
            .map(|b| b.index)
            .collect();
        for root in roots {
            self.update_global_recursive(root);
        }
    }
}
