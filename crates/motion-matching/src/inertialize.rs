//! Inertialization of pose transitions.
//!
//! On a transition the difference between the pose that was playing and the
//! pose that is about to play is stored as a per-bone offset. Every update
//! decays the offsets toward zero with a spring and adds them to the incoming
//! pose, hiding the jump.
//!
//! The root is special: incoming root motion lives in the space of whatever
//! clip is playing, so the inertializer also remembers where that clip's root
//! was (`src`) and where the character was displayed (`dst`) at the moment of
//! the transition, and maps every later root sample through that pair into
//! world space.

use glam::{Quat, Vec3};

use crate::math::quat_abs;
use crate::pose::{Pose, RootState};
use crate::spring::{decay_spring_damper_exact_quat, decay_spring_damper_exact_vec3};

#[inline]
fn transition_vec3(off_x: &mut Vec3, off_v: &mut Vec3, src_x: Vec3, src_v: Vec3, dst_x: Vec3, dst_v: Vec3) {
    *off_x = (src_x + *off_x) - dst_x;
    *off_v = (src_v + *off_v) - dst_v;
}

#[inline]
fn transition_quat(off_x: &mut Quat, off_v: &mut Vec3, src_x: Quat, src_v: Vec3, dst_x: Quat, dst_v: Vec3) {
    *off_x = quat_abs(*off_x * src_x * dst_x.inverse());
    *off_v = (*off_v + src_v) - dst_v;
}

/// Per-bone decaying offsets plus the root anchor of the last transition
#[derive(Debug, Clone, PartialEq)]
pub struct Inertializer {
    pub halflife: f32,
    offset_positions: Vec<Vec3>,
    offset_velocities: Vec<Vec3>,
    offset_rotations: Vec<Quat>,
    offset_angular_velocities: Vec<Vec3>,
    src_position: Vec3,
    src_rotation: Quat,
    dst_position: Vec3,
    dst_rotation: Quat,
}

impl Inertializer {
    pub fn new(bones: usize, halflife: f32) -> Self {
        Self {
            halflife,
            offset_positions: vec![Vec3::ZERO; bones],
            offset_velocities: vec![Vec3::ZERO; bones],
            offset_rotations: vec![Quat::IDENTITY; bones],
            offset_angular_velocities: vec![Vec3::ZERO; bones],
            src_position: Vec3::ZERO,
            src_rotation: Quat::IDENTITY,
            dst_position: Vec3::ZERO,
            dst_rotation: Quat::IDENTITY,
        }
    }

    /// Clear every offset and map animation space onto world space as-is,
    /// relative to the given root
    pub fn reset(&mut self, root_position: Vec3, root_rotation: Quat) {
        self.offset_positions.fill(Vec3::ZERO);
        self.offset_velocities.fill(Vec3::ZERO);
        self.offset_rotations.fill(Quat::IDENTITY);
        self.offset_angular_velocities.fill(Vec3::ZERO);

        self.src_position = root_position;
        self.src_rotation = root_rotation;
        self.dst_position = Vec3::ZERO;
        self.dst_rotation = Quat::IDENTITY;
    }

    /// Start a transition from `src` to `dst`.
    ///
    /// `root` is the displayed (world space) root; both poses are in
    /// animation space. Afterwards the root of `dst` is anchored at the
    /// displayed root.
    pub fn transition(&mut self, root: &RootState, src: &Pose, dst: &Pose) {
        self.dst_position = root.position;
        self.dst_rotation = root.rotation;
        self.src_position = dst.positions[0];
        self.src_rotation = dst.rotations[0];

        let world_dst_velocity =
            self.dst_rotation * (self.src_rotation.inverse() * dst.velocities[0]);
        let world_dst_angular_velocity =
            self.dst_rotation * (self.src_rotation.inverse() * dst.angular_velocities[0]);

        transition_vec3(
            &mut self.offset_positions[0],
            &mut self.offset_velocities[0],
            root.position,
            root.velocity,
            root.position,
            world_dst_velocity,
        );
        transition_quat(
            &mut self.offset_rotations[0],
            &mut self.offset_angular_velocities[0],
            root.rotation,
            root.angular_velocity,
            root.rotation,
            world_dst_angular_velocity,
        );

        for i in 1..self.offset_positions.len() {
            transition_vec3(
                &mut self.offset_positions[i],
                &mut self.offset_velocities[i],
                src.positions[i],
                src.velocities[i],
                dst.positions[i],
                dst.velocities[i],
            );
            transition_quat(
                &mut self.offset_rotations[i],
                &mut self.offset_angular_velocities[i],
                src.rotations[i],
                src.angular_velocities[i],
                dst.rotations[i],
                dst.angular_velocities[i],
            );
        }
    }

    /// Decay the offsets by `dt` and write `input` plus offsets to `out`,
    /// with the root mapped into world space
    pub fn update(&mut self, input: &Pose, dt: f32, out: &mut Pose) {
        let bones = input.bone_count();
        out.positions.resize(bones, Vec3::ZERO);
        out.velocities.resize(bones, Vec3::ZERO);
        out.rotations.resize(bones, Quat::IDENTITY);
        out.angular_velocities.resize(bones, Vec3::ZERO);
        out.contacts.clone_from(&input.contacts);

        let src_inverse = self.src_rotation.inverse();
        let root_position =
            self.dst_rotation * (src_inverse * (input.positions[0] - self.src_position)) + self.dst_position;
        let root_velocity = self.dst_rotation * (src_inverse * input.velocities[0]);
        let root_rotation = (self.dst_rotation * (src_inverse * input.rotations[0])).normalize();
        let root_angular_velocity = self.dst_rotation * (src_inverse * input.angular_velocities[0]);

        for i in 0..bones {
            let (position, velocity, rotation, angular_velocity) = if i == 0 {
                (root_position, root_velocity, root_rotation, root_angular_velocity)
            } else {
                (
                    input.positions[i],
                    input.velocities[i],
                    input.rotations[i],
                    input.angular_velocities[i],
                )
            };

            decay_spring_damper_exact_vec3(
                &mut self.offset_positions[i],
                &mut self.offset_velocities[i],
                self.halflife,
                dt,
            );
            out.positions[i] = position + self.offset_positions[i];
            out.velocities[i] = velocity + self.offset_velocities[i];

            decay_spring_damper_exact_quat(
                &mut self.offset_rotations[i],
                &mut self.offset_angular_velocities[i],
                self.halflife,
                dt,
            );
            out.rotations[i] = self.offset_rotations[i] * rotation;
            out.angular_velocities[i] =
                self.offset_angular_velocities[i] + self.offset_rotations[i] * angular_velocity;
        }
    }

    pub fn offset_positions(&self) -> &[Vec3] {
        &self.offset_positions
    }

    pub fn offset_rotations(&self) -> &[Quat] {
        &self.offset_rotations
    }

    pub fn offset_velocities(&self) -> &[Vec3] {
        &self.offset_velocities
    }

    pub fn offset_angular_velocities(&self) -> &[Vec3] {
        &self.offset_angular_velocities
    }
}
