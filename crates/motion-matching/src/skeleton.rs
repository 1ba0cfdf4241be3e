//! Bone naming for the locomotion skeleton and rigid transforms.

use glam::{Mat4, Quat, Vec3};

#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Bones of the 23-bone locomotion skeleton, in database column order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
#[repr(usize)]
pub enum Bone {
    Entity = 0,
    Hips = 1,
    LeftUpLeg = 2,
    LeftLeg = 3,
    LeftFoot = 4,
    LeftToe = 5,
    RightUpLeg = 6,
    RightLeg = 7,
    RightFoot = 8,
    RightToe = 9,
    Spine = 10,
    Spine1 = 11,
    Spine2 = 12,
    Neck = 13,
    Head = 14,
    LeftShoulder = 15,
    LeftArm = 16,
    LeftForeArm = 17,
    LeftHand = 18,
    RightShoulder = 19,
    RightArm = 20,
    RightForeArm = 21,
    RightHand = 22,
}

impl Bone {
    pub const COUNT: usize = 23;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Entity,
        Self::Hips,
        Self::LeftUpLeg,
        Self::LeftLeg,
        Self::LeftFoot,
        Self::LeftToe,
        Self::RightUpLeg,
        Self::RightLeg,
        Self::RightFoot,
        Self::RightToe,
        Self::Spine,
        Self::Spine1,
        Self::Spine2,
        Self::Neck,
        Self::Head,
        Self::LeftShoulder,
        Self::LeftArm,
        Self::LeftForeArm,
        Self::LeftHand,
        Self::RightShoulder,
        Self::RightArm,
        Self::RightForeArm,
        Self::RightHand,
    ];

    /// Parent indices of the locomotion skeleton, root first
    pub const PARENTS: [i32; Self::COUNT] = [
        -1, 0, 1, 2, 3, 4, 1, 6, 7, 8, 1, 10, 11, 12, 13, 12, 15, 16, 17, 12, 19, 20, 21,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Entity => "Entity",
            Self::Hips => "Hips",
            Self::LeftUpLeg => "LeftUpLeg",
            Self::LeftLeg => "LeftLeg",
            Self::LeftFoot => "LeftFoot",
            Self::LeftToe => "LeftToe",
            Self::RightUpLeg => "RightUpLeg",
            Self::RightLeg => "RightLeg",
            Self::RightFoot => "RightFoot",
            Self::RightToe => "RightToe",
            Self::Spine => "Spine",
            Self::Spine1 => "Spine1",
            Self::Spine2 => "Spine2",
            Self::Neck => "Neck",
            Self::Head => "Head",
            Self::LeftShoulder => "LeftShoulder",
            Self::LeftArm => "LeftArm",
            Self::LeftForeArm => "LeftForeArm",
            Self::LeftHand => "LeftHand",
            Self::RightShoulder => "RightShoulder",
            Self::RightArm => "RightArm",
            Self::RightForeArm => "RightForeArm",
            Self::RightHand => "RightHand",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|bone| bone.name() == name)
    }

    /// Names in column order, for name-based retargeting
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|bone| bone.name()).collect()
    }
}

/// Translation, rotation and scale
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
            scale: Vec3::ONE,
        }
    }

    /// `self * child`: express `child` (given relative to `self`) in the
    /// space `self` is expressed in
    pub fn mul_transform(&self, child: &Self) -> Self {
        Self {
            translation: self.translation + self.rotation * (self.scale * child.translation),
            rotation: self.rotation * child.rotation,
            scale: self.scale * child.scale,
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// One bone of a skeleton that receives retargeted animation
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct TargetBone {
    pub name: String,
    pub parent: Option<usize>,
    /// Bind pose relative to the parent
    pub rest: Transform,
}

/// Skeleton that retargeted poses are written onto
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct TargetSkeleton {
    pub bones: Vec<TargetBone>,
}

impl TargetSkeleton {
    pub fn new(bones: Vec<TargetBone>) -> Result<Self> {
        let skeleton = Self { bones };
        skeleton.validate()?;
        Ok(skeleton)
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|bone| bone.name == name)
    }

    /// Parents must precede children so transforms can be accumulated in order
    pub fn validate(&self) -> Result<()> {
        for (index, bone) in self.bones.iter().enumerate() {
            match bone.parent {
                Some(parent) if parent >= index => {
                    return Err(Error::InvalidSkeleton(format!(
                        "bone {} ('{}') has parent {} which does not precede it",
                        index, bone.name, parent
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Bind pose of every bone in component space
    pub fn rest_component_space(&self) -> Vec<Transform> {
        let mut out: Vec<Transform> = Vec::with_capacity(self.bones.len());
        for bone in &self.bones {
            let transform = match bone.parent {
                Some(parent) => out[parent].mul_transform(&bone.rest),
                None => bone.rest,
            };
            out.push(transform);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bone_names_roundtrip() {
        for bone in Bone::ALL {
            assert_eq!(Bone::from_name(bone.name()), Some(bone));
        }
        assert_eq!(Bone::from_name("Tail"), None);
        assert_eq!(Bone::LeftFoot.index(), 4);
        assert_eq!(Bone::PARENTS[Bone::RightHand.index()], Bone::RightForeArm as i32);
    }

    #[test]
    fn test_target_skeleton_rejects_forward_parent() {
        let bones = vec![
            TargetBone {
                name: "root".into(),
                parent: Some(1),
                rest: Transform::IDENTITY,
            },
            TargetBone {
                name: "child".into(),
                parent: None,
                rest: Transform::IDENTITY,
            },
        ];
        assert!(matches!(
            TargetSkeleton::new(bones),
            Err(Error::InvalidSkeleton(_))
        ));
    }

    #[test]
    fn test_rest_component_space_accumulates() {
        let skeleton = TargetSkeleton::new(vec![
            TargetBone {
                name: "root".into(),
                parent: None,
                rest: Transform::new(Vec3::new(0.0, 1.0, 0.0), Quat::from_rotation_z(std::f32::consts::FRAC_PI_2)),
            },
            TargetBone {
                name: "child".into(),
                parent: Some(0),
                rest: Transform::new(Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY),
            },
        ])
        .unwrap();
        let cs = skeleton.rest_component_space();
        assert!((cs[1].translation - Vec3::new(0.0, 2.0, 0.0)).length() < 1e-6);
    }
}
