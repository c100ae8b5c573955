//! Render-side transform component.

use glam::{Mat4, Quat, Vec3};

use crate::physics::Pose;

/// A renderable object's transform. Stores position, rotation, and scale separately.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    /// Create an identity transform.
    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }

    /// Create a transform from a position.
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::identity()
        }
    }

    /// Unit-scale transform at a simulated pose.
    pub fn from_pose(pose: &Pose) -> Self {
        Self {
            position: pose.position,
            rotation: pose.rotation,
            scale: Vec3::ONE,
        }
    }

    /// Convert to a 4x4 matrix (translation * rotation * scale).
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Anything the physics read-back can write a pose into.
///
/// Scale is owned by the render side and never touched.
pub trait RenderTransform {
    fn set_position(&mut self, position: Vec3);
    fn set_rotation(&mut self, rotation: Quat);

    fn set_pose(&mut self, pose: &Pose) {
        self.set_position(pose.position);
        self.set_rotation(pose.rotation);
    }
}

impl RenderTransform for Transform {
    fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let t = Transform::identity();
        assert_eq!(t.to_matrix(), Mat4::IDENTITY);
        assert_eq!(Transform::default(), t);
    }

    #[test]
    fn test_set_pose_keeps_scale() {
        let mut t = Transform {
            scale: Vec3::splat(2.0),
            ..Transform::identity()
        };
        let pose = Pose::new(Vec3::new(1.0, 2.0, 3.0), Quat::from_rotation_y(0.5));
        t.set_pose(&pose);
        assert_eq!(t.position, pose.position);
        assert_eq!(t.rotation, pose.rotation);
        assert_eq!(t.scale, Vec3::splat(2.0));
    }
}
