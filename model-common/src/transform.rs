//! Bone transform composition
//!
//! Global poses are composed root-first along the parent chain:
//!
//! ```text
//! global_rotation = parent_global_rotation * local_rotation
//! global_position = parent_global_position + parent_global_rotation * local_position
//! ```
//!
//! A [`RigidDelta`] re-expresses geometry bound to one skeleton's root bone in
//! the space of the same-named bone of another skeleton. The delta comes from a
//! single bone pair and is applied uniformly to every spliced vertex; per-bone
//! pose differences between the two skeletons are not reproduced.

use glam::{Mat3, Quat, Vec3};

use crate::model::{Bone, ModelError};

/// Derive `global_position`/`global_rotation` for every bone, in index order.
///
/// Every parent must be stored before its children. A root bone's global pose
/// equals its local pose.
pub fn compute_global_poses(bones: &mut [Bone]) -> Result<(), ModelError> {
    let count = bones.len();

    for index in 0..count {
        let Some(parent) = bones[index].parent() else {
            let bone = &mut bones[index];
            bone.global_position = bone.local_position;
            bone.global_rotation = bone.local_rotation;
            continue;
        };

        if parent >= count {
            return Err(ModelError::ParentOutOfRange {
                bone: bones[index].name.clone(),
                parent: bones[index].parent_index,
                count,
            });
        }
        if parent >= index {
            return Err(ModelError::ParentNotResolved {
                bone: bones[index].name.clone(),
                index,
                parent: bones[index].parent_index,
            });
        }

        let parent_position = bones[parent].global_position;
        let parent_rotation = bones[parent].global_rotation;

        let bone = &mut bones[index];
        bone.global_rotation = parent_rotation * bone.local_rotation;
        bone.global_position = parent_position + parent_rotation * bone.local_position;
    }

    Ok(())
}

/// Translation + rotation (no scale) between two skeleton spaces
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidDelta {
    pub translation: Vec3,
    pub rotation: Mat3,
}

impl Default for RigidDelta {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidDelta {
    pub fn identity() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Mat3::IDENTITY,
        }
    }

    /// Rotate, then translate. Used for vertex positions.
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation * point + self.translation
    }

    /// Rotate only. Used for normals and shape deltas.
    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation * vector
    }
}

/// Delta that moves geometry posed against `source` onto `target`.
///
/// Both bones must have resolved global poses.
pub fn compute_delta(source: &Bone, target: &Bone) -> RigidDelta {
    let rotation: Quat = target.global_rotation * source.global_rotation.inverse();

    RigidDelta {
        translation: target.global_position - source.global_position,
        rotation: Mat3::from_quat(rotation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    const EPSILON: f32 = 1e-5;

    fn chain() -> Vec<Bone> {
        vec![
            Bone::new("root", -1, Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY),
            Bone::new(
                "spine",
                0,
                Vec3::new(0.0, 1.0, 0.0),
                Quat::from_rotation_z(FRAC_PI_2),
            ),
            Bone::new("neck", 1, Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY),
        ]
    }

    #[test]
    fn test_root_global_equals_local() {
        let mut bones = chain();
        bones[0].global_position = Vec3::splat(99.0);
        compute_global_poses(&mut bones).unwrap();
        assert_eq!(bones[0].global_position, bones[0].local_position);
        assert_eq!(bones[0].global_rotation, bones[0].local_rotation);
    }

    #[test]
    fn test_chain_composition() {
        let mut bones = chain();
        compute_global_poses(&mut bones).unwrap();

        assert!(
            bones[1]
                .global_position
                .abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), EPSILON)
        );
        // 90 degrees about Z turns the neck's +X offset into +Y
        assert!(
            bones[2]
                .global_position
                .abs_diff_eq(Vec3::new(0.0, 3.0, 0.0), EPSILON)
        );
        assert!(
            bones[2]
                .global_rotation
                .abs_diff_eq(Quat::from_rotation_z(FRAC_PI_2), EPSILON)
        );
    }

    #[test]
    fn test_unresolved_parent_is_error() {
        let mut bones = chain();
        bones[1].parent_index = 2;
        assert!(matches!(
            compute_global_poses(&mut bones),
            Err(ModelError::ParentNotResolved { index: 1, .. })
        ));

        let mut bones = chain();
        bones[2].parent_index = 5;
        assert!(matches!(
            compute_global_poses(&mut bones),
            Err(ModelError::ParentOutOfRange { parent: 5, .. })
        ));
    }

    #[test]
    fn test_delta_translation_only() {
        let source = Bone::new("spine", -1, Vec3::ZERO, Quat::IDENTITY);
        let mut target = Bone::new("spine", 0, Vec3::ZERO, Quat::IDENTITY);
        target.global_position = Vec3::new(0.0, 1.0, 0.0);

        let delta = compute_delta(&source, &target);
        assert_eq!(delta.translation, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(
            delta.transform_point(Vec3::new(0.0, 1.0, 0.0)),
            Vec3::new(0.0, 2.0, 0.0)
        );
        assert_eq!(delta.transform_vector(Vec3::Y), Vec3::Y);
    }

    #[test]
    fn test_delta_rotation() {
        let source = Bone::new("hand", -1, Vec3::ZERO, Quat::IDENTITY);
        let target = Bone::new("hand", -1, Vec3::ZERO, Quat::from_rotation_y(FRAC_PI_2));

        let delta = compute_delta(&source, &target);
        assert!(
            delta
                .transform_vector(Vec3::X)
                .abs_diff_eq(Vec3::new(0.0, 0.0, -1.0), EPSILON)
        );
        assert_eq!(delta.translation, Vec3::ZERO);
    }

    #[test]
    fn test_identity_delta() {
        let delta = RigidDelta::default();
        let p = Vec3::new(1.0, -2.0, 3.0);
        assert_eq!(delta.transform_point(p), p);
        assert_eq!(delta.transform_vector(p), p);
    }
}
