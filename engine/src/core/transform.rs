//! Local and world transforms for instances

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Transform representing position, rotation, and scale relative to the parent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Transform {
    /// Position in local space
    pub position: Vec3,
    /// Rotation in local space as a quaternion
    pub rotation: Quat,
    /// Scale in local space
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
    /// Create a new transform with the given position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a new transform with the given position and rotation
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Default::default()
        }
    }

    /// Convert this transform to a transformation matrix
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Set the scale of the transform
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }
}

/// World-space transform, recomputed from the hierarchy once per frame
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GlobalTransform {
    /// World-space transformation matrix
    pub matrix: Mat4,
}

impl Default for GlobalTransform {
    fn default() -> Self {
        Self {
            matrix: Mat4::IDENTITY,
        }
    }
}

impl GlobalTransform {
    /// Create a new global transform from a matrix
    pub fn from_matrix(matrix: Mat4) -> Self {
        Self { matrix }
    }

    /// Get the world position from the transformation matrix
    pub fn position(&self) -> Vec3 {
        self.matrix.w_axis.truncate()
    }

    /// Get the world rotation from the transformation matrix
    pub fn rotation(&self) -> Quat {
        let (_, rotation, _) = self.matrix.to_scale_rotation_translation();
        rotation
    }
}
