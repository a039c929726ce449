//! 镜像：沿坐标轴反射变换

use glam::{Mat4, Quat, Vec3, Vec4};

/// 镜像轴
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MirrorAxis {
    #[default]
    X,
    Y,
    Z,
}

impl MirrorAxis {
    /// 反射矩阵 S（对角，S = S⁻¹）
    fn reflection(self) -> Mat4 {
        let diagonal = match self {
            MirrorAxis::X => Vec4::new(-1.0, 1.0, 1.0, 1.0),
            MirrorAxis::Y => Vec4::new(1.0, -1.0, 1.0, 1.0),
            MirrorAxis::Z => Vec4::new(1.0, 1.0, -1.0, 1.0),
        };
        Mat4::from_diagonal(diagonal)
    }

    /// 镜像仿射变换：S * M * S，结果仍为刚体变换
    pub fn mirror_matrix(self, matrix: &Mat4) -> Mat4 {
        let s = self.reflection();
        s * *matrix * s
    }

    pub fn mirror_vector(self, v: Vec3) -> Vec3 {
        match self {
            MirrorAxis::X => Vec3::new(-v.x, v.y, v.z),
            MirrorAxis::Y => Vec3::new(v.x, -v.y, v.z),
            MirrorAxis::Z => Vec3::new(v.x, v.y, -v.z),
        }
    }

    /// 镜像旋转：保留镜像轴分量，取反其余两个虚部分量
    pub fn mirror_rotation(self, q: Quat) -> Quat {
        match self {
            MirrorAxis::X => Quat::from_xyzw(q.x, -q.y, -q.z, q.w),
            MirrorAxis::Y => Quat::from_xyzw(-q.x, q.y, -q.z, q.w),
            MirrorAxis::Z => Quat::from_xyzw(-q.x, -q.y, q.z, q.w),
        }
    }
}
