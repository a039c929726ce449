//! 骨骼层级（静态拓扑）

use glam::Vec3;

use crate::{MotionError, Result};

use super::{walk_scene, SceneNode};

/// 层级中的骨骼节点
#[derive(Clone, Debug)]
pub struct HierarchyBone {
    /// 连续的 0 起始索引
    pub index: usize,
    pub name: String,
    /// 父骨骼索引，根骨骼为 None
    pub parent: Option<usize>,
    /// 子骨骼索引（按添加顺序）
    pub children: Vec<usize>,
    /// 静止姿势下相对父骨骼的偏移
    pub offset: Vec3,

    // 显示用字段，不影响拓扑
    pub visible: bool,
    pub display_name: Option<String>,
}

impl HierarchyBone {
    fn new(index: usize, name: String, parent: Option<usize>, offset: Vec3) -> Self {
        Self {
            index,
            name,
            parent,
            children: Vec::new(),
            offset,
            visible: true,
            display_name: None,
        }
    }

    /// 静止骨长（到父骨骼的距离）
    pub fn length(&self) -> f32 {
        if self.parent.is_some() {
            self.offset.length()
        } else {
            0.0
        }
    }

    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

/// 骨骼层级
#[derive(Clone, Debug, Default)]
pub struct Hierarchy {
    bones: Vec<HierarchyBone>,
}

impl Hierarchy {
    pub fn new() -> Self {
        Self { bones: Vec::new() }
    }

    /// 一次性构建层级：`(名称, 父索引, 偏移)`，按索引顺序给出
    pub fn from_parts<I>(parts: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Option<usize>, Vec3)>,
    {
        let parts: Vec<_> = parts.into_iter().collect();
        let mut bones: Vec<HierarchyBone> = Vec::with_capacity(parts.len());
        for (index, (name, parent, offset)) in parts.into_iter().enumerate() {
            bones.push(HierarchyBone::new(index, name, parent, offset));
        }

        let count = bones.len();
        for index in 0..count {
            if let Some(parent) = bones[index].parent {
                if parent >= count || parent == index {
                    return Err(MotionError::InvalidHierarchy(format!(
                        "bone {} ({}) has invalid parent {}",
                        index, bones[index].name, parent
                    )));
                }
                bones[parent].children.push(index);
            }
        }

        let hierarchy = Self { bones };
        hierarchy.validate()?;
        Ok(hierarchy)
    }

    /// 添加骨骼，返回新索引
    ///
    /// 父索引必须指向已添加的骨骼，否则记录警告并作为根骨骼添加。
    pub fn add_bone(&mut self, name: impl Into<String>, parent: Option<usize>, offset: Vec3) -> usize {
        let index = self.bones.len();
        let parent = match parent {
            Some(p) if p >= index => {
                log::warn!("骨骼 {} 的父索引 {} 无效，按根骨骼添加", index, p);
                None
            }
            other => other,
        };
        self.bones.push(HierarchyBone::new(index, name.into(), parent, offset));
        if let Some(parent) = parent {
            self.bones[parent].children.push(index);
        }
        index
    }

    /// 从场景节点树提取层级（深度优先，按访问顺序编号）
    pub fn extract(root: &SceneNode) -> Self {
        Self::extract_where(root, |_| true)
    }

    /// 仅提取白名单中的节点；跳过的节点仍会递归其子节点
    pub fn extract_filtered(root: &SceneNode, whitelist: &[&str]) -> Self {
        Self::extract_where(root, |node| whitelist.contains(&node.name.as_str()))
    }

    fn extract_where<F>(root: &SceneNode, filter: F) -> Self
    where
        F: Fn(&SceneNode) -> bool,
    {
        let mut hierarchy = Self {
            bones: Vec::with_capacity(root.count()),
        };
        walk_scene(root, &filter, &mut |visited| {
            let offset = (visited.parent_world.inverse() * visited.world).w_axis.truncate();
            hierarchy.add_bone(visited.node.name.clone(), visited.parent, offset)
        });
        if hierarchy.roots().count() > 1 {
            log::warn!("提取的层级包含 {} 个根骨骼", hierarchy.roots().count());
        }
        hierarchy
    }

    /// 校验拓扑：恰好一个根，每个骨骼从根出发恰好可达一次，无环
    pub fn validate(&self) -> Result<()> {
        if self.bones.is_empty() {
            return Err(MotionError::InvalidHierarchy("hierarchy has no bones".to_string()));
        }

        let roots: Vec<usize> = self.roots().collect();
        if roots.len() != 1 {
            return Err(MotionError::InvalidHierarchy(format!(
                "expected exactly one root, found {}",
                roots.len()
            )));
        }

        let mut visited = vec![false; self.bones.len()];
        let mut stack = vec![roots[0]];
        while let Some(index) = stack.pop() {
            if visited[index] {
                return Err(MotionError::InvalidHierarchy(format!(
                    "bone {} reachable more than once",
                    index
                )));
            }
            visited[index] = true;
            for &child in &self.bones[index].children {
                if self.bones[child].parent != Some(index) {
                    return Err(MotionError::InvalidHierarchy(format!(
                        "bone {} listed as child of {} but has parent {:?}",
                        child, index, self.bones[child].parent
                    )));
                }
                stack.push(child);
            }
        }

        if let Some(missing) = visited.iter().position(|v| !v) {
            return Err(MotionError::InvalidHierarchy(format!(
                "bone {} ({}) not reachable from root",
                missing, self.bones[missing].name
            )));
        }
        Ok(())
    }

    pub fn bones(&self) -> &[HierarchyBone] {
        &self.bones
    }

    pub fn bone(&self, index: usize) -> Option<&HierarchyBone> {
        self.bones.get(index)
    }

    pub fn set_visible(&mut self, index: usize, visible: bool) {
        if let Some(bone) = self.bones.get_mut(index) {
            bone.visible = visible;
        }
    }

    pub fn set_display_name(&mut self, index: usize, display_name: Option<String>) {
        if let Some(bone) = self.bones.get_mut(index) {
            bone.display_name = display_name;
        }
    }

    /// 获取骨骼数量
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.bones.iter().filter(|b| b.parent.is_none()).map(|b| b.index)
    }

    /// 精确名称查找
    pub fn find_bone(&self, name: &str) -> Option<&HierarchyBone> {
        self.bones.iter().find(|b| b.name == name)
    }

    /// 子串查找，多个匹配时返回索引最小者
    pub fn find_bone_contains(&self, pattern: &str) -> Option<&HierarchyBone> {
        self.bones.iter().find(|b| b.name.contains(pattern))
    }

    pub fn find_index(&self, name: &str) -> Option<usize> {
        self.find_bone(name).map(|b| b.index)
    }

    pub fn bone_names(&self) -> Vec<&str> {
        self.bones.iter().map(|b| b.name.as_str()).collect()
    }

    /// 第 n 个子骨骼；越界返回 None（遍历终止信号）
    pub fn child(&self, index: usize, n: usize) -> Option<usize> {
        self.bones.get(index)?.children.get(n).copied()
    }

    /// `ancestor` 是否为 `index` 的祖先（不含自身）
    pub fn is_ancestor(&self, ancestor: usize, index: usize) -> bool {
        let mut current = self.bones.get(index).and_then(|b| b.parent);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.bones[parent].parent;
        }
        false
    }

    /// 骨骼及其全部后代（深度优先）
    pub fn subtree(&self, index: usize) -> Vec<usize> {
        let mut result = Vec::new();
        let mut stack = vec![index];
        while let Some(current) = stack.pop() {
            let Some(bone) = self.bones.get(current) else {
                continue;
            };
            result.push(current);
            stack.extend(bone.children.iter().rev());
        }
        result
    }

    /// 左右对称骨骼（名称中 Left/Right 互换）
    pub fn symmetric_bone(&self, index: usize) -> Option<usize> {
        let name = &self.bones.get(index)?.name;
        let swapped = if name.contains("Left") {
            name.replace("Left", "Right")
        } else if name.contains("Right") {
            name.replace("Right", "Left")
        } else {
            return Some(index);
        };
        let found = self.find_index(&swapped);
        if found.is_none() {
            log::debug!("未找到 {} 的对称骨骼 {}", name, swapped);
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::BoneTransform;

    fn arm_parts() -> Vec<(String, Option<usize>, Vec3)> {
        vec![
            ("Hips".to_string(), None, Vec3::ZERO),
            ("Spine".to_string(), Some(0), Vec3::new(0.0, 0.1, 0.0)),
            ("LeftArm".to_string(), Some(1), Vec3::new(0.2, 0.0, 0.0)),
            ("LeftHand".to_string(), Some(2), Vec3::new(0.3, 0.0, 0.0)),
            ("RightArm".to_string(), Some(1), Vec3::new(-0.2, 0.0, 0.0)),
            ("RightHand".to_string(), Some(4), Vec3::new(-0.3, 0.0, 0.0)),
        ]
    }

    #[test]
    fn test_add_bone_rejects_invalid_parent() {
        let mut hierarchy = Hierarchy::new();
        // 指向自身或尚未添加的父骨骼时按根骨骼添加
        assert_eq!(hierarchy.add_bone("Hips", Some(0), Vec3::ZERO), 0);
        assert_eq!(hierarchy.bone(0).unwrap().parent, None);
        assert!(hierarchy.bone(0).unwrap().children.is_empty());

        hierarchy.add_bone("Spine", Some(0), Vec3::Y);
        hierarchy.add_bone("Neck", Some(5), Vec3::Y);
        assert_eq!(hierarchy.bone(2).unwrap().parent, None);
        assert_eq!(hierarchy.subtree(0), vec![0, 1]);
        assert!(!hierarchy.is_ancestor(0, 0));
        assert!(!hierarchy.is_ancestor(0, 2));
        assert!(hierarchy.validate().is_err());
    }

    #[test]
    fn test_from_parts_builds_children() {
        let hierarchy = Hierarchy::from_parts(arm_parts()).unwrap();
        assert_eq!(hierarchy.len(), 6);
        assert_eq!(hierarchy.bone(1).unwrap().children, vec![2, 4]);
        assert_eq!(hierarchy.child(1, 1), Some(4));
        assert_eq!(hierarchy.child(1, 2), None);
        assert!(hierarchy.is_ancestor(0, 5));
        assert!(!hierarchy.is_ancestor(2, 5));
        assert!((hierarchy.bone(3).unwrap().length() - 0.3).abs() < 1e-6);
        assert_eq!(hierarchy.bone(0).unwrap().length(), 0.0);
    }

    #[test]
    fn test_find_bone() {
        let hierarchy = Hierarchy::from_parts(arm_parts()).unwrap();
        assert_eq!(hierarchy.find_bone("LeftHand").map(|b| b.index), Some(3));
        assert!(hierarchy.find_bone("Hand").is_none());
        // 多个匹配时返回索引最小者
        assert_eq!(hierarchy.find_bone_contains("Hand").map(|b| b.index), Some(3));
        assert_eq!(hierarchy.find_bone_contains("Arm").map(|b| b.index), Some(2));
        assert!(hierarchy.find_bone_contains("Head").is_none());
    }

    #[test]
    fn test_symmetric_bone() {
        let hierarchy = Hierarchy::from_parts(arm_parts()).unwrap();
        assert_eq!(hierarchy.symmetric_bone(3), Some(5));
        assert_eq!(hierarchy.symmetric_bone(4), Some(2));
        assert_eq!(hierarchy.symmetric_bone(1), Some(1));
    }

    #[test]
    fn test_validate_rejects_two_roots() {
        let parts = vec![
            ("A".to_string(), None, Vec3::ZERO),
            ("B".to_string(), None, Vec3::ZERO),
        ];
        assert!(matches!(
            Hierarchy::from_parts(parts),
            Err(MotionError::InvalidHierarchy(_))
        ));
    }

    #[test]
    fn test_validate_rejects_cycle() {
        let parts = vec![
            ("Root".to_string(), None, Vec3::ZERO),
            ("A".to_string(), Some(2), Vec3::ZERO),
            ("B".to_string(), Some(1), Vec3::ZERO),
        ];
        assert!(Hierarchy::from_parts(parts).is_err());
    }

    #[test]
    fn test_extract_filtered_keeps_continuity() {
        let root = SceneNode::new("Root", BoneTransform::default()).with_child(
            SceneNode::new("Skip", BoneTransform::new(Vec3::new(0.0, 1.0, 0.0), glam::Quat::IDENTITY))
                .with_child(SceneNode::new(
                    "Leaf",
                    BoneTransform::new(Vec3::new(0.0, 2.0, 0.0), glam::Quat::IDENTITY),
                )),
        );

        let full = Hierarchy::extract(&root);
        assert_eq!(full.bone_names(), vec!["Root", "Skip", "Leaf"]);
        assert!(full.validate().is_ok());

        let filtered = Hierarchy::extract_filtered(&root, &["Root", "Leaf"]);
        assert_eq!(filtered.bone_names(), vec!["Root", "Leaf"]);
        assert_eq!(filtered.bone(1).unwrap().parent, Some(0));
        // 偏移累积了被跳过的节点
        assert!((filtered.bone(1).unwrap().offset - Vec3::new(0.0, 3.0, 0.0)).length() < 1e-6);
    }
}
