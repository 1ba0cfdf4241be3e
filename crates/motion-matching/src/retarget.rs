//! Name-based retargeting of database poses onto another skeleton.
//!
//! Each mapped target bone receives the component-space rotation its source
//! bone has moved away from the source rest pose, applied on top of the
//! target's own rest pose. Bone offsets always come from the target rest
//! pose, so proportions are preserved. Source data is Y-up; a basis rotation
//! placed on the source root re-expresses every rotation in the target's
//! convention (Z-up by default).

use glam::{Mat4, Quat, Vec3};

use crate::database::Database;
use crate::error::{Error, Result};
use crate::math::y_up_to_z_up;
use crate::skeleton::{Bone, TargetSkeleton, Transform};

/// Names, hierarchy and local rest pose of the skeleton animation comes from
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSkeleton {
    pub names: Vec<String>,
    pub parents: Vec<i32>,
    pub rest_positions: Vec<Vec3>,
    pub rest_rotations: Vec<Quat>,
}

impl SourceSkeleton {
    pub fn new(
        names: Vec<String>,
        parents: Vec<i32>,
        rest_positions: Vec<Vec3>,
        rest_rotations: Vec<Quat>,
    ) -> Result<Self> {
        let bones = names.len();
        for (what, actual) in [
            ("source parents", parents.len()),
            ("source rest positions", rest_positions.len()),
            ("source rest rotations", rest_rotations.len()),
        ] {
            if actual != bones {
                return Err(Error::DimensionMismatch {
                    what,
                    expected: bones,
                    actual,
                });
            }
        }
        for (bone, &parent) in parents.iter().enumerate() {
            if parent < -1 || parent >= bone as i32 {
                return Err(Error::InvalidSkeleton(format!(
                    "source bone '{}' has parent {} which does not precede it",
                    names[bone], parent
                )));
            }
        }
        Ok(Self {
            names,
            parents,
            rest_positions,
            rest_rotations,
        })
    }

    /// Locomotion bone names with the pose of `frame` as rest pose
    pub fn locomotion(db: &Database, frame: usize) -> Result<Self> {
        if db.bone_count() != Bone::COUNT {
            return Err(Error::DimensionMismatch {
                what: "locomotion skeleton bones",
                expected: Bone::COUNT,
                actual: db.bone_count(),
            });
        }
        Self::new(
            Bone::names().into_iter().map(String::from).collect(),
            db.bone_parents.as_slice().to_vec(),
            db.bone_positions.row(frame).to_vec(),
            db.bone_rotations.row(frame).to_vec(),
        )
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// Component-space rotations with the root translation dropped and `basis`
/// applied to the root
fn component_rotations(out: &mut Vec<Quat>, basis: Quat, rotations: &[Quat], parents: &[i32]) {
    out.clear();
    for (bone, &rotation) in rotations.iter().enumerate() {
        let global = match usize::try_from(parents[bone]) {
            Ok(parent) => out[parent] * rotation,
            Err(_) => basis * rotation,
        };
        out.push(global);
    }
}

/// Maps source poses onto a [`TargetSkeleton`] and produces skinning matrices
#[derive(Debug, Clone)]
pub struct Retargeter {
    target: TargetSkeleton,
    source: SourceSkeleton,
    /// Source bone driving each target bone
    map: Vec<Option<usize>>,
    basis: Quat,
    target_rest_component: Vec<Transform>,
    inverse_bind: Vec<Mat4>,
    source_rest_inverse: Vec<Quat>,
    source_component: Vec<Quat>,
    component_space: Vec<Transform>,
    skinning: Vec<Mat4>,
}

impl Retargeter {
    /// Map every target bone whose name also exists in the source
    pub fn by_name(target: TargetSkeleton, source: SourceSkeleton) -> Self {
        let map = target.bones.iter().map(|bone| source.find(&bone.name)).collect();
        Self::with_map(target, source, map)
    }

    /// Map explicit `(target, source)` name pairs; other target bones follow
    /// their parents rigidly
    pub fn from_pairs(
        target: TargetSkeleton,
        source: SourceSkeleton,
        pairs: &[(&str, &str)],
    ) -> Result<Self> {
        let mut map = vec![None; target.len()];
        for &(target_name, source_name) in pairs {
            let target_bone = target.find(target_name).ok_or_else(|| {
                Error::InvalidSkeleton(format!("unknown target bone '{target_name}'"))
            })?;
            let source_bone = source.find(source_name).ok_or_else(|| {
                Error::InvalidSkeleton(format!("unknown source bone '{source_name}'"))
            })?;
            map[target_bone] = Some(source_bone);
        }
        Ok(Self::with_map(target, source, map))
    }

    fn with_map(target: TargetSkeleton, source: SourceSkeleton, map: Vec<Option<usize>>) -> Self {
        let target_rest_component = target.rest_component_space();
        let inverse_bind = target_rest_component
            .iter()
            .map(|t| t.to_matrix().inverse())
            .collect();
        let mut retargeter = Self {
            map,
            basis: y_up_to_z_up(),
            target_rest_component,
            inverse_bind,
            source_rest_inverse: Vec::with_capacity(source.len()),
            source_component: Vec::with_capacity(source.len()),
            component_space: Vec::with_capacity(target.len()),
            skinning: vec![Mat4::IDENTITY; target.len()],
            target,
            source,
        };
        retargeter.update_source_rest();
        retargeter
    }

    /// Use `basis` instead of Y-up to Z-up
    pub fn with_basis(mut self, basis: Quat) -> Self {
        self.basis = basis;
        self.update_source_rest();
        self
    }

    fn update_source_rest(&mut self) {
        component_rotations(
            &mut self.source_rest_inverse,
            self.basis,
            &self.source.rest_rotations,
            &self.source.parents,
        );
        for rotation in &mut self.source_rest_inverse {
            *rotation = rotation.inverse();
        }
    }

    pub fn target(&self) -> &TargetSkeleton {
        &self.target
    }

    pub fn source(&self) -> &SourceSkeleton {
        &self.source
    }

    /// Source bone driving target bone `index`
    pub fn mapping(&self, index: usize) -> Option<usize> {
        self.map[index]
    }

    /// Retarget local source `rotations` onto the target
    pub fn retarget(&mut self, rotations: &[Quat]) {
        assert_eq!(
            rotations.len(),
            self.source.len(),
            "pose does not match the source skeleton"
        );
        component_rotations(&mut self.source_component, self.basis, rotations, &self.source.parents);

        self.component_space.clear();
        for (index, bone) in self.target.bones.iter().enumerate() {
            let mut transform = match bone.parent {
                Some(parent) => self.component_space[parent].mul_transform(&bone.rest),
                None => bone.rest,
            };
            if let Some(source) = self.map[index] {
                let delta = self.source_component[source] * self.source_rest_inverse[source];
                transform.rotation = (delta * self.target_rest_component[index].rotation).normalize();
            }
            self.skinning[index] = transform.to_matrix() * self.inverse_bind[index];
            self.component_space.push(transform);
        }
    }

    /// Component-space transforms of the last retargeted pose
    pub fn component_space(&self) -> &[Transform] {
        &self.component_space
    }

    /// `component_space × inverse_bind` per target bone
    pub fn skinning_matrices(&self) -> &[Mat4] {
        &self.skinning
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::TargetBone;

    fn source() -> SourceSkeleton {
        SourceSkeleton::new(
            vec!["Entity".into(), "Hips".into(), "Spine".into()],
            vec![-1, 0, 1],
            vec![Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 0.2, 0.0)],
            vec![Quat::IDENTITY, Quat::from_rotation_x(0.2), Quat::IDENTITY],
        )
        .unwrap()
    }

    fn target() -> TargetSkeleton {
        TargetSkeleton::new(vec![
            TargetBone {
                name: "Entity".into(),
                parent: None,
                rest: Transform::IDENTITY,
            },
            TargetBone {
                name: "pelvis".into(),
                parent: Some(0),
                rest: Transform::new(Vec3::new(0.0, 0.0, 0.9), Quat::from_rotation_y(0.4)),
            },
            TargetBone {
                name: "spine_01".into(),
                parent: Some(1),
                rest: Transform::new(Vec3::new(0.0, 0.0, 0.25), Quat::IDENTITY),
            },
        ])
        .unwrap()
    }

    fn pairs() -> [(&'static str, &'static str); 3] {
        [("Entity", "Entity"), ("pelvis", "Hips"), ("spine_01", "Spine")]
    }

    #[test]
    fn test_rest_pose_gives_identity_skinning() {
        let source = source();
        let rest = source.rest_rotations.clone();
        let mut retargeter = Retargeter::from_pairs(target(), source, &pairs()).unwrap();
        retargeter.retarget(&rest);
        for m in retargeter.skinning_matrices() {
            assert!(m.abs_diff_eq(Mat4::IDENTITY, 1e-5), "{m:?}");
        }
    }

    #[test]
    fn test_root_yaw_becomes_z_rotation() {
        let source = source();
        let mut pose = source.rest_rotations.clone();
        pose[0] = Quat::from_rotation_y(0.5);
        let mut retargeter = Retargeter::by_name(target(), source);
        assert_eq!(retargeter.mapping(0), Some(0));
        assert_eq!(retargeter.mapping(1), None);
        retargeter.retarget(&pose);
        let root = retargeter.component_space()[0].rotation;
        assert!(root.dot(Quat::from_rotation_z(0.5)).abs() > 1.0 - 1e-5);
        // unmapped children follow rigidly
        let pelvis = retargeter.component_space()[1];
        let expected = Quat::from_rotation_z(0.5) * Vec3::new(0.0, 0.0, 0.9);
        assert!((pelvis.translation - expected).length() < 1e-5);
    }

    #[test]
    fn test_identity_basis_keeps_source_axes() {
        let source = source();
        let mut pose = source.rest_rotations.clone();
        pose[0] = Quat::from_rotation_y(0.5);
        let mut retargeter = Retargeter::from_pairs(target(), source, &pairs())
            .unwrap()
            .with_basis(Quat::IDENTITY);
        retargeter.retarget(&pose);
        let root = retargeter.component_space()[0].rotation;
        assert!(root.dot(Quat::from_rotation_y(0.5)).abs() > 1.0 - 1e-5);
    }

    #[test]
    fn test_rejects_parent_below_root_marker() {
        let result = SourceSkeleton::new(
            vec!["Entity".into(), "Hips".into()],
            vec![-1, -2],
            vec![Vec3::ZERO; 2],
            vec![Quat::IDENTITY; 2],
        );
        assert!(matches!(result, Err(Error::InvalidSkeleton(_))));
    }

    #[test]
    fn test_unknown_pair_is_rejected() {
        let result = Retargeter::from_pairs(target(), source(), &[("pelvis", "Tail")]);
        assert!(matches!(result, Err(Error::InvalidSkeleton(_))));
    }
}
