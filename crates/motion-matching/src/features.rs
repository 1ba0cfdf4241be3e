//! Feature vector layout.
//!
//! A layout is an ordered list of feature groups, each with a weight. The
//! database builds one normalized row per frame following the layout and
//! the instance builds its query vectors in the same order.

#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

use crate::skeleton::Bone;

/// Frame offsets of the future trajectory samples
pub const TRAJECTORY_FRAME_OFFSETS: [usize; 3] = [20, 40, 60];

/// One group of feature dimensions normalized together
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum FeatureGroup {
    /// Bone position in the root's local space (x, y, z)
    BonePosition(usize),
    /// Bone velocity in the root's local space (x, y, z)
    BoneVelocity(usize),
    /// Future root positions on the ground plane (x, z per sample)
    TrajectoryPositions,
    /// Future facing directions on the ground plane (x, z per sample)
    TrajectoryDirections,
}

impl FeatureGroup {
    pub fn dims(self) -> usize {
        match self {
            Self::BonePosition(_) | Self::BoneVelocity(_) => 3,
            Self::TrajectoryPositions | Self::TrajectoryDirections => {
                2 * TRAJECTORY_FRAME_OFFSETS.len()
            }
        }
    }
}

/// Per-group weights of the default locomotion layout
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde-support", serde(default))]
pub struct FeatureWeights {
    pub foot_position: f32,
    pub foot_velocity: f32,
    pub hip_velocity: f32,
    pub trajectory_positions: f32,
    pub trajectory_directions: f32,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self {
            foot_position: 0.75,
            foot_velocity: 1.0,
            hip_velocity: 1.0,
            trajectory_positions: 1.0,
            trajectory_directions: 1.5,
        }
    }
}

/// Bones sampled by the default locomotion layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde-support", serde(default))]
pub struct FeatureBones {
    pub left_foot: usize,
    pub right_foot: usize,
    pub hips: usize,
}

impl Default for FeatureBones {
    fn default() -> Self {
        Self {
            left_foot: Bone::LeftFoot.index(),
            right_foot: Bone::RightFoot.index(),
            hips: Bone::Hips.index(),
        }
    }
}

/// A weighted feature group placed at a column offset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureSlot {
    pub group: FeatureGroup,
    pub weight: f32,
    pub offset: usize,
}

/// Ordered, weighted feature groups
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureLayout {
    slots: Vec<FeatureSlot>,
    size: usize,
}

impl FeatureLayout {
    pub fn new(groups: &[(FeatureGroup, f32)]) -> Self {
        let mut slots = Vec::with_capacity(groups.len());
        let mut offset = 0;
        for &(group, weight) in groups {
            slots.push(FeatureSlot {
                group,
                weight,
                offset,
            });
            offset += group.dims();
        }
        Self {
            slots,
            size: offset,
        }
    }

    /// Feet positions, feet velocities, hip velocity, then trajectory
    /// positions and directions: 27 dimensions in total.
    pub fn locomotion(bones: &FeatureBones, weights: &FeatureWeights) -> Self {
        Self::new(&[
            (FeatureGroup::BonePosition(bones.left_foot), weights.foot_position),
            (FeatureGroup::BonePosition(bones.right_foot), weights.foot_position),
            (FeatureGroup::BoneVelocity(bones.left_foot), weights.foot_velocity),
            (FeatureGroup::BoneVelocity(bones.right_foot), weights.foot_velocity),
            (FeatureGroup::BoneVelocity(bones.hips), weights.hip_velocity),
            (FeatureGroup::TrajectoryPositions, weights.trajectory_positions),
            (FeatureGroup::TrajectoryDirections, weights.trajectory_directions),
        ])
    }

    pub fn slots(&self) -> &[FeatureSlot] {
        &self.slots
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn find(&self, group: FeatureGroup) -> Option<&FeatureSlot> {
        self.slots.iter().find(|slot| slot.group == group)
    }
}

impl Default for FeatureLayout {
    fn default() -> Self {
        Self::locomotion(&FeatureBones::default(), &FeatureWeights::default())
    }
}
