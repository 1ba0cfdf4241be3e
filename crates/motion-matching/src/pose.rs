//! Local-space skeletal poses and forward kinematics.
//!
//! Poses store every bone relative to its parent. Bone 0 is the root
//! (simulation bone) and is stored in the space of the animation it came
//! from, or in world space once it has passed through the inertializer.

use glam::{Quat, Vec3};

/// One skeletal pose with velocities and contact flags
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub positions: Vec<Vec3>,
    pub velocities: Vec<Vec3>,
    pub rotations: Vec<Quat>,
    pub angular_velocities: Vec<Vec3>,
    pub contacts: Vec<bool>,
}

impl Pose {
    /// Rest pose with every bone at the origin
    pub fn new(bones: usize, contacts: usize) -> Self {
        Self {
            positions: vec![Vec3::ZERO; bones],
            velocities: vec![Vec3::ZERO; bones],
            rotations: vec![Quat::IDENTITY; bones],
            angular_velocities: vec![Vec3::ZERO; bones],
            contacts: vec![false; contacts],
        }
    }

    pub fn bone_count(&self) -> usize {
        self.positions.len()
    }

    pub fn root(&self) -> RootState {
        RootState {
            position: self.positions[0],
            velocity: self.velocities[0],
            rotation: self.rotations[0],
            angular_velocity: self.angular_velocities[0],
        }
    }
}

/// Root bone transform and its derivatives
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootState {
    pub position: Vec3,
    pub velocity: Vec3,
    pub rotation: Quat,
    pub angular_velocity: Vec3,
}

impl Default for RootState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            angular_velocity: Vec3::ZERO,
        }
    }
}

#[inline]
fn parent_of(parents: &[i32], bone: usize) -> Option<usize> {
    usize::try_from(parents[bone]).ok()
}

/// Global position and rotation of `bone`, walking up the parent chain
pub fn forward_kinematics(
    positions: &[Vec3],
    rotations: &[Quat],
    parents: &[i32],
    bone: usize,
) -> (Vec3, Quat) {
    match parent_of(parents, bone) {
        Some(parent) => {
            let (parent_position, parent_rotation) =
                forward_kinematics(positions, rotations, parents, parent);
            (
                parent_rotation * positions[bone] + parent_position,
                parent_rotation * rotations[bone],
            )
        }
        None => (positions[bone], rotations[bone]),
    }
}

/// Global transform and derivatives of a single bone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneKinematics {
    pub position: Vec3,
    pub velocity: Vec3,
    pub rotation: Quat,
    pub angular_velocity: Vec3,
}

/// Like [`forward_kinematics`] but also propagates linear and angular
/// velocities through the chain.
pub fn forward_kinematics_velocity(
    positions: &[Vec3],
    velocities: &[Vec3],
    rotations: &[Quat],
    angular_velocities: &[Vec3],
    parents: &[i32],
    bone: usize,
) -> BoneKinematics {
    match parent_of(parents, bone) {
        Some(parent) => {
            let p = forward_kinematics_velocity(
                positions,
                velocities,
                rotations,
                angular_velocities,
                parents,
                parent,
            );
            let offset = p.rotation * positions[bone];
            BoneKinematics {
                position: offset + p.position,
                velocity: p.velocity + p.rotation * velocities[bone] + p.angular_velocity.cross(offset),
                rotation: p.rotation * rotations[bone],
                angular_velocity: p.rotation * (angular_velocities[bone] + p.angular_velocity),
            }
        }
        None => BoneKinematics {
            position: positions[bone],
            velocity: velocities[bone],
            rotation: rotations[bone],
            angular_velocity: angular_velocities[bone],
        },
    }
}

/// Global transforms for every bone in one pass.
///
/// Parents must precede their children, which the database loader enforces.
pub fn forward_kinematics_full(
    global_positions: &mut Vec<Vec3>,
    global_rotations: &mut Vec<Quat>,
    positions: &[Vec3],
    rotations: &[Quat],
    parents: &[i32],
) {
    global_positions.clear();
    global_rotations.clear();
    for bone in 0..positions.len() {
        match parent_of(parents, bone) {
            Some(parent) => {
                let parent_position = global_positions[parent];
                let parent_rotation = global_rotations[parent];
                global_positions.push(parent_rotation * positions[bone] + parent_position);
                global_rotations.push(parent_rotation * rotations[bone]);
            }
            None => {
                global_positions.push(positions[bone]);
                global_rotations.push(rotations[bone]);
            }
        }
    }
}
