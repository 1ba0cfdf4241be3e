//! Where the animation-space pose of each frame comes from.
//!
//! Playback either copies the stored database row ([`DirectPoseSource`]) or
//! decodes the frame's feature and latent vectors through a decompressor
//! network ([`NetworkPoseSource`]). The instance picks one at construction.

use glam::{Quat, Vec3};
use std::sync::Arc;

use crate::array::Array2D;
use crate::database::Database;
use crate::error::{Error, Result};
use crate::math::{quat_from_scaled_axis, quat_from_xform_xy};
use crate::network::NeuralNetwork;
use crate::pose::Pose;

/// Produces the pose of a database frame
pub trait PoseSource: Send {
    /// Write the pose of `frame` to `out`.
    ///
    /// `previous` is the pose produced on the step before, whose root is used
    /// by sources that integrate root motion over `dt`.
    fn pose(&mut self, db: &Database, frame: usize, previous: &Pose, dt: f32, out: &mut Pose);

    /// Frames before the end of a range the play head may not pass
    fn range_end_margin(&self) -> usize {
        1
    }

    fn name(&self) -> &'static str;
}

/// Plays stored database rows back unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectPoseSource;

impl PoseSource for DirectPoseSource {
    fn pose(&mut self, db: &Database, frame: usize, _previous: &Pose, _dt: f32, out: &mut Pose) {
        db.pose(frame, out);
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}

/// Decodes poses from `[features | latent]` through a decompressor network
#[derive(Debug, Clone)]
pub struct NetworkPoseSource {
    network: Arc<NeuralNetwork>,
    latent: Arc<Array2D<f32>>,
    input: Vec<f32>,
    output: Vec<f32>,
}

/// Network outputs per non-root bone: position, two rotation axes,
/// velocity and angular velocity
const OUTPUTS_PER_BONE: usize = 3 + 6 + 3 + 3;
/// Root linear and angular velocity
const ROOT_OUTPUTS: usize = 6;

impl NetworkPoseSource {
    /// Check that `network` and `latent` fit the features of `db`
    pub fn new(
        network: Arc<NeuralNetwork>,
        latent: Arc<Array2D<f32>>,
        db: &Database,
    ) -> Result<Self> {
        if latent.rows() != db.frame_count() {
            return Err(Error::DimensionMismatch {
                what: "latent rows",
                expected: db.frame_count(),
                actual: latent.rows(),
            });
        }

        let inputs = db.feature_count() + latent.cols();
        if network.input_size() != inputs {
            return Err(Error::DimensionMismatch {
                what: "decompressor inputs",
                expected: inputs,
                actual: network.input_size(),
            });
        }

        let outputs = (db.bone_count() - 1) * OUTPUTS_PER_BONE + ROOT_OUTPUTS + db.contact_count();
        if network.output_size() != outputs {
            return Err(Error::DimensionMismatch {
                what: "decompressor outputs",
                expected: outputs,
                actual: network.output_size(),
            });
        }

        Ok(Self {
            network,
            latent,
            input: Vec::with_capacity(inputs),
            output: Vec::with_capacity(outputs),
        })
    }

    pub fn network(&self) -> &NeuralNetwork {
        &self.network
    }
}

#[inline]
fn vec3_at(values: &[f32], offset: usize) -> Vec3 {
    Vec3::new(values[offset], values[offset + 1], values[offset + 2])
}

impl PoseSource for NetworkPoseSource {
    fn pose(&mut self, db: &Database, frame: usize, previous: &Pose, dt: f32, out: &mut Pose) {
        self.input.clear();
        self.input.extend_from_slice(db.features().row(frame));
        self.input.extend_from_slice(self.latent.row(frame));
        self.network.evaluate(&self.input, &mut self.output);

        let o = &self.output;
        let bones = db.bone_count();
        let children = bones - 1;
        out.positions.resize(bones, Vec3::ZERO);
        out.velocities.resize(bones, Vec3::ZERO);
        out.rotations.resize(bones, Quat::IDENTITY);
        out.angular_velocities.resize(bones, Vec3::ZERO);
        out.contacts.resize(db.contact_count(), false);

        let mut offset = 0;
        for i in 0..children {
            out.positions[i + 1] = vec3_at(o, offset + i * 3);
        }
        offset += children * 3;

        for i in 0..children {
            let base = offset + i * 6;
            let x = Vec3::new(o[base], o[base + 2], o[base + 4]);
            let y = Vec3::new(o[base + 1], o[base + 3], o[base + 5]);
            out.rotations[i + 1] = quat_from_xform_xy(x, y);
        }
        offset += children * 6;

        for i in 0..children {
            out.velocities[i + 1] = vec3_at(o, offset + i * 3);
        }
        offset += children * 3;

        for i in 0..children {
            out.angular_velocities[i + 1] = vec3_at(o, offset + i * 3);
        }
        offset += children * 3;

        // root motion is stored relative to the previous root
        let previous_rotation = previous.rotations[0];
        let root_velocity = previous_rotation * vec3_at(o, offset);
        let root_angular_velocity = previous_rotation * vec3_at(o, offset + 3);
        offset += ROOT_OUTPUTS;

        out.positions[0] = dt * root_velocity + previous.positions[0];
        out.rotations[0] = quat_from_scaled_axis(root_angular_velocity * dt) * previous_rotation;
        out.velocities[0] = root_velocity;
        out.angular_velocities[0] = root_angular_velocity;

        for contact in &mut out.contacts {
            *contact = o[offset] > 0.5;
            offset += 1;
        }

        assert_eq!(
            offset,
            self.network.output_size(),
            "decompressor output layout does not match the network"
        );
    }

    fn range_end_margin(&self) -> usize {
        2
    }

    fn name(&self) -> &'static str {
        "learned"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureLayout;
    use crate::synthetic;

    fn learned_source(db: &Database, latent_dims: usize) -> NetworkPoseSource {
        let (network, latent) = synthetic::mean_pose_network(db, latent_dims).unwrap();
        NetworkPoseSource::new(Arc::new(network), Arc::new(latent), db).unwrap()
    }

    #[test]
    fn test_direct_source_copies_row() {
        let db = synthetic::locomotion_database(1, 80).unwrap();
        let mut out = Pose::new(0, 0);
        let previous = Pose::new(db.bone_count(), db.contact_count());
        DirectPoseSource.pose(&db, 17, &previous, 1.0 / 60.0, &mut out);
        assert_eq!(out.positions, db.bone_positions.row(17));
        assert_eq!(out.rotations, db.bone_rotations.row(17));
        assert_eq!(out.contacts, db.contact_states.row(17));
    }

    #[test]
    fn test_network_source_rejects_latent_rows() {
        let mut db = synthetic::locomotion_database(1, 80).unwrap();
        db.build_features(&FeatureLayout::default()).unwrap();
        let (network, _) = synthetic::mean_pose_network(&db, 4).unwrap();
        let result = NetworkPoseSource::new(
            Arc::new(network),
            Arc::new(Array2D::new(10, 4)),
            &db,
        );
        assert!(matches!(
            result,
            Err(Error::DimensionMismatch {
                what: "latent rows",
                ..
            })
        ));
    }

    #[test]
    fn test_network_source_integrates_root() {
        let mut db = synthetic::locomotion_database(1, 80).unwrap();
        db.build_features(&FeatureLayout::default()).unwrap();
        let mut source = learned_source(&db, 4);
        assert_eq!(source.range_end_margin(), 2);

        let mut previous = Pose::new(db.bone_count(), db.contact_count());
        previous.positions[0] = Vec3::new(1.0, 0.0, 2.0);
        previous.rotations[0] = Quat::from_rotation_y(0.5);

        let dt = 1.0 / 60.0;
        let mut out = Pose::new(0, 0);
        source.pose(&db, 30, &previous, dt, &mut out);

        assert_eq!(out.bone_count(), db.bone_count());
        assert_eq!(out.contacts.len(), db.contact_count());
        let expected = previous.positions[0] + out.velocities[0] * dt;
        assert!((out.positions[0] - expected).length() < 1e-5);
        for rotation in &out.rotations {
            assert!((rotation.length() - 1.0).abs() < 1e-4);
        }
    }
}
