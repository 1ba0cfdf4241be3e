//! Procedural locomotion data on the 23-bone skeleton.
//!
//! Clips are generated deterministically: the root walks or runs with a
//! speed and turn rate that vary per clip and over time, the legs and arms
//! swing with a speed-dependent gait phase, and velocities are finite
//! differences of the generated transforms. The data is good enough to
//! exercise feature building, search and playback without shipping assets.

use glam::{Quat, Vec3};

use crate::array::{Array1D, Array2D};
use crate::database::Database;
use crate::error::Result;
use crate::math::{quat_abs, quat_to_scaled_axis, yaw};
use crate::network::{Layer, NeuralNetwork};
use crate::skeleton::Bone;

/// Frame rate of generated clips
pub const FRAME_RATE: f32 = 60.0;

/// Contact flags per frame: left foot, right foot
pub const CONTACT_COUNT: usize = 2;

/// Local rest offsets of the locomotion skeleton, Y-up and facing +Z
pub fn rest_offsets() -> [Vec3; Bone::COUNT] {
    [
        Vec3::ZERO,
        Vec3::new(0.0, 0.95, 0.0),
        Vec3::new(0.1, -0.05, 0.0),
        Vec3::new(0.0, -0.43, 0.0),
        Vec3::new(0.0, -0.42, 0.0),
        Vec3::new(0.0, -0.05, 0.12),
        Vec3::new(-0.1, -0.05, 0.0),
        Vec3::new(0.0, -0.43, 0.0),
        Vec3::new(0.0, -0.42, 0.0),
        Vec3::new(0.0, -0.05, 0.12),
        Vec3::new(0.0, 0.1, 0.0),
        Vec3::new(0.0, 0.12, 0.0),
        Vec3::new(0.0, 0.12, 0.0),
        Vec3::new(0.0, 0.15, 0.0),
        Vec3::new(0.0, 0.1, 0.0),
        Vec3::new(0.05, 0.1, 0.0),
        Vec3::new(0.12, 0.0, 0.0),
        Vec3::new(0.28, 0.0, 0.0),
        Vec3::new(0.25, 0.0, 0.0),
        Vec3::new(-0.05, 0.1, 0.0),
        Vec3::new(-0.12, 0.0, 0.0),
        Vec3::new(-0.28, 0.0, 0.0),
        Vec3::new(-0.25, 0.0, 0.0),
    ]
}

struct ClipMotion {
    base_speed: f32,
    speed_swing: f32,
    turn_rate: f32,
}

impl ClipMotion {
    fn for_clip(clip: usize) -> Self {
        let c = clip as f32;
        Self {
            base_speed: 1.0 + (c * 1.37).rem_euclid(3.0),
            speed_swing: 0.4 + 0.2 * (clip % 3) as f32,
            turn_rate: ((clip % 5) as f32 - 2.0) * 0.35,
        }
    }

    fn speed(&self, t: f32, clip: usize) -> f32 {
        (self.base_speed + self.speed_swing * (0.7 * t + clip as f32).sin()).max(0.0)
    }

    fn turn(&self, t: f32) -> f32 {
        self.turn_rate * (0.5 + 0.5 * (0.4 * t).cos())
    }
}

/// Local pose of every bone for a root state and gait phase
fn limb_pose(phase: f32, speed: f32, positions: &mut [Vec3], rotations: &mut [Quat]) {
    let offsets = rest_offsets();
    positions[1..].copy_from_slice(&offsets[1..]);
    rotations[1..].fill(Quat::IDENTITY);

    let s = phase.sin();
    let stride = 0.2 + 0.08 * speed;

    positions[Bone::Hips.index()].y += 0.03 * (2.0 * phase).cos() - 0.015 * speed;
    rotations[Bone::Hips.index()] = Quat::from_rotation_y(0.1 * s);

    for (up_leg, leg, foot, side_phase) in [
        (Bone::LeftUpLeg, Bone::LeftLeg, Bone::LeftFoot, phase),
        (Bone::RightUpLeg, Bone::RightLeg, Bone::RightFoot, phase + std::f32::consts::PI),
    ] {
        let swing = side_phase.sin();
        rotations[up_leg.index()] = Quat::from_rotation_x(stride * swing);
        rotations[leg.index()] = Quat::from_rotation_x(0.3 * (1.0 - side_phase.cos()) * (0.5 + 0.2 * speed));
        rotations[foot.index()] = Quat::from_rotation_x(-0.2 * swing);
    }

    rotations[Bone::Spine.index()] = Quat::from_rotation_y(-0.05 * s);
    rotations[Bone::Spine1.index()] = Quat::from_rotation_x(0.02 * speed);
    rotations[Bone::Head.index()] = Quat::from_rotation_y(0.04 * s);

    rotations[Bone::LeftArm.index()] = Quat::from_rotation_z(-1.2) * Quat::from_rotation_y(-0.3 * s);
    rotations[Bone::RightArm.index()] = Quat::from_rotation_z(1.2) * Quat::from_rotation_y(-0.3 * s);
    rotations[Bone::LeftForeArm.index()] = Quat::from_rotation_y(0.2 + 0.1 * speed);
    rotations[Bone::RightForeArm.index()] = Quat::from_rotation_y(-0.2 - 0.1 * speed);
}

/// `clips` ranges of `frames` frames each
pub fn locomotion_database(clips: usize, frames: usize) -> Result<Database> {
    let total = clips * frames;
    let bones = Bone::COUNT;
    let dt = 1.0 / FRAME_RATE;

    let mut positions = Array2D::new(total, bones);
    let mut rotations = Array2D::from_vec(total, bones, vec![Quat::IDENTITY; total * bones]);
    let mut contacts = Array2D::new(total, CONTACT_COUNT);
    let mut range_starts = Vec::with_capacity(clips);
    let mut range_stops = Vec::with_capacity(clips);

    for clip in 0..clips {
        let motion = ClipMotion::for_clip(clip);
        let start = clip * frames;
        range_starts.push(start);
        range_stops.push(start + frames);

        let mut root_position = Vec3::new(clip as f32 * 0.5, 0.0, 0.0);
        let mut heading = clip as f32 * 0.9;
        let mut phase = 0.0f32;

        for f in 0..frames {
            let t = f as f32 * dt;
            let speed = motion.speed(t, clip);
            let i = start + f;

            positions[(i, 0)] = root_position;
            rotations[(i, 0)] = yaw(heading);
            limb_pose(phase, speed, positions.row_mut(i), rotations.row_mut(i));
            contacts[(i, 0)] = phase.cos() > 0.0;
            contacts[(i, 1)] = phase.cos() <= 0.0;

            root_position += yaw(heading) * Vec3::new(0.0, 0.0, speed * dt);
            heading += motion.turn(t) * dt;
            phase += std::f32::consts::TAU * (0.8 + 0.25 * speed) * dt;
        }
    }

    let mut velocities = Array2D::new(total, bones);
    let mut angular_velocities = Array2D::new(total, bones);
    for (&start, &stop) in range_starts.iter().zip(&range_stops) {
        for i in start..stop {
            // backward difference on the last frame of a clip
            let (a, b) = if i + 1 < stop { (i, i + 1) } else { (i - 1, i) };
            for j in 0..bones {
                velocities[(i, j)] = (positions[(b, j)] - positions[(a, j)]) * FRAME_RATE;
                let delta = quat_abs(rotations[(b, j)] * rotations[(a, j)].inverse());
                angular_velocities[(i, j)] = quat_to_scaled_axis(delta) * FRAME_RATE;
            }
        }
    }

    Database::from_parts(
        positions,
        velocities,
        rotations,
        angular_velocities,
        Array1D::from_vec(Bone::PARENTS.to_vec()),
        Array1D::from_vec(range_starts),
        Array1D::from_vec(range_stops),
        contacts,
    )
}

/// A single-layer decompressor that ignores its input and always decodes
/// the first frame's pose moving forward at the average root speed, plus an
/// all-zero latent table. `db` must have its features built.
pub fn mean_pose_network(db: &Database, latent_dims: usize) -> Result<(NeuralNetwork, Array2D<f32>)> {
    let bones = db.bone_count();
    let inputs = db.feature_count() + latent_dims;

    let mut output = Vec::new();
    output.extend(db.bone_positions.row(0)[1..].iter().flat_map(|p| p.to_array()));
    for rotation in &db.bone_rotations.row(0)[1..] {
        let x = *rotation * Vec3::X;
        let y = *rotation * Vec3::Y;
        output.extend([x.x, y.x, x.y, y.y, x.z, y.z]);
    }
    output.extend(std::iter::repeat_n(0.0, (bones - 1) * 6));

    let frames = db.frame_count().max(1) as f32;
    let mean_speed = (0..db.frame_count())
        .map(|i| db.bone_velocities[(i, 0)].length())
        .sum::<f32>()
        / frames;
    output.extend([0.0, 0.0, mean_speed, 0.0, 0.0, 0.0]);
    output.extend(std::iter::repeat_n(0.0, db.contact_count()));

    let outputs = output.len();
    let network = NeuralNetwork::new(
        Array1D::new(inputs),
        Array1D::from_vec(vec![1.0; inputs]),
        Array1D::from_vec(output),
        Array1D::from_vec(vec![1.0; outputs]),
        vec![Layer {
            kernel: Array2D::new(inputs, outputs),
            bias: Array1D::new(outputs),
        }],
    )?;

    Ok((network, Array2D::new(db.frame_count(), latent_dims)))
}
