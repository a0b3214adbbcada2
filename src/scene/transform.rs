//! Local transforms for scene nodes

use glam::{Mat3, Mat4, Quat, Vec3};

/// Translation, rotation and scale of a node relative to its parent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn from_position_scale(position: Vec3, scale: Vec3) -> Self {
        Self {
            position,
            scale,
            ..Default::default()
        }
    }

    /// Decompose an affine matrix (as stored by glTF nodes)
    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, position) = matrix.to_scale_rotation_translation();
        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Rotate by euler angles (radians, XYZ order)
    pub fn with_euler(mut self, euler: Vec3) -> Self {
        self.rotation = Quat::from_euler(glam::EulerRot::XYZ, euler.x, euler.y, euler.z);
        self
    }

    /// Get the model matrix for this transform
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Get the normal matrix (inverse transpose of the upper 3x3)
    pub fn normal_matrix(&self) -> Mat3 {
        Mat3::from_mat4(self.matrix()).inverse().transpose()
    }

    pub fn translate(&mut self, offset: Vec3) {
        self.position += offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_applies_scale_then_translation() {
        let t = Transform::from_position_scale(Vec3::new(1.0, 2.0, 3.0), Vec3::splat(2.0));
        let p = t.matrix().transform_point3(Vec3::ONE);
        assert!((p - Vec3::new(3.0, 4.0, 5.0)).length() < 1e-6);
    }

    #[test]
    fn from_matrix_roundtrips_components() {
        let t = Transform::from_position(Vec3::new(0.0, 2.0, 0.0))
            .with_euler(Vec3::new(0.0, 0.5, 0.0));
        let back = Transform::from_matrix(t.matrix());
        assert!((back.position - t.position).length() < 1e-5);
        assert!(back.rotation.angle_between(t.rotation) < 1e-4);
    }
}
