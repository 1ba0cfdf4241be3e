//! A motion matching character.
//!
//! [`MotionMatchingInstance::tick`] accumulates wall-clock time and runs one
//! fixed step per whole [`FIXED_DT`]. A step reads the input, predicts the
//! trajectory, searches the database when the periodic timer runs out, the
//! input has just settled after an abrupt change, or the clip is about to
//! end, and then plays one frame forward through the inertializer.
//!
//! # Example
//!
//! ```rust,ignore
//! use motion_matching::{AssetPaths, InputCommand, InputState, MotionMatchingConfig, MotionMatchingInstance};
//!
//! let mut instance = MotionMatchingInstance::load(
//!     &AssetPaths::from_dir("assets"),
//!     MotionMatchingConfig::default(),
//! )?;
//! let input = InputState::new(InputCommand::FORWARD);
//! instance.tick(1.0 / 30.0, &input);
//! let (position, rotation) = instance.root_motion();
//! ```

use glam::{Mat4, Quat, Vec3};
use log::{debug, trace, warn};
use std::sync::Arc;

use crate::config::{AssetPaths, MotionMatchingConfig, PoseSourceKind};
use crate::database::Database;
use crate::error::{Error, Result};
use crate::features::{FeatureGroup, TRAJECTORY_FRAME_OFFSETS};
use crate::inertialize::Inertializer;
use crate::input::InputState;
use crate::network::{NeuralNetwork, load_latent};
use crate::pose::{Pose, forward_kinematics_full};
use crate::pose_source::{DirectPoseSource, NetworkPoseSource, PoseSource};
use crate::retarget::Retargeter;
use crate::spring::simple_spring_damper_exact;
use crate::trajectory::{
    DesiredChange, SimulationState, TRAJECTORY_SAMPLE_FRAMES, TRAJECTORY_SAMPLES, Trajectory,
    desired_rotation_update, desired_velocity_update,
};

/// Length of one simulation step in seconds
pub const FIXED_DT: f32 = 1.0 / 60.0;

/// Why a search ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchReason {
    Periodic,
    Forced,
    EndOfRange,
}

/// World-space positions and directions for visualization
#[derive(Debug, Clone, PartialEq)]
pub struct DebugTrajectory {
    /// Predicted trajectory
    pub trajectory_positions: [Vec3; TRAJECTORY_SAMPLES],
    pub trajectory_directions: [Vec3; TRAJECTORY_SAMPLES],
    /// Trajectory stored with the playing frame
    pub matched_positions: [Vec3; TRAJECTORY_SAMPLES],
    pub matched_directions: [Vec3; TRAJECTORY_SAMPLES],
}

impl Default for DebugTrajectory {
    fn default() -> Self {
        Self {
            trajectory_positions: [Vec3::ZERO; TRAJECTORY_SAMPLES],
            trajectory_directions: [Vec3::Z; TRAJECTORY_SAMPLES],
            matched_positions: [Vec3::ZERO; TRAJECTORY_SAMPLES],
            matched_directions: [Vec3::Z; TRAJECTORY_SAMPLES],
        }
    }
}

/// One animated character playing from a shared database
pub struct MotionMatchingInstance {
    db: Arc<Database>,
    source: Box<dyn PoseSource>,
    config: MotionMatchingConfig,
    retargeter: Option<Retargeter>,

    frame_index: usize,
    accumulator: f32,
    search_timer: f32,
    force_search_timer: f32,
    transitions: usize,

    /// Animation-space pose at the play head
    current: Pose,
    scratch: Pose,
    /// Inertialized world-space pose
    output: Pose,
    global_positions: Vec<Vec3>,
    global_rotations: Vec<Quat>,
    inertializer: Inertializer,

    simulation: SimulationState,
    desired: DesiredChange,
    trajectory: Trajectory,
    gait: f32,
    gait_velocity: f32,

    current_features: Vec<f32>,
    query: Vec<f32>,
    debug_trajectory: DebugTrajectory,
}

impl std::fmt::Debug for MotionMatchingInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionMatchingInstance")
            .field("source", &self.source.name())
            .field("frame_index", &self.frame_index)
            .field("transitions", &self.transitions)
            .field("simulation", &self.simulation)
            .finish_non_exhaustive()
    }
}

impl MotionMatchingInstance {
    /// Start playing the first frame of the first range.
    ///
    /// The database must already have its features built.
    pub fn new(
        db: Arc<Database>,
        source: Box<dyn PoseSource>,
        config: MotionMatchingConfig,
    ) -> Result<Self> {
        if db.layout().is_none() {
            return Err(Error::InvalidFormat(
                "database features have not been built".into(),
            ));
        }

        let bones = db.bone_count();
        let contacts = db.contact_count();
        let frame_index = db.range_starts[0];

        let mut current = Pose::new(bones, contacts);
        db.pose(frame_index, &mut current);

        let mut inertializer = Inertializer::new(bones, config.inertialize_halflife);
        inertializer.reset(current.positions[0], current.rotations[0]);
        let mut output = Pose::new(bones, contacts);
        inertializer.update(&current, 0.0, &mut output);

        let mut instance = Self {
            source,
            retargeter: None,
            frame_index,
            accumulator: 0.0,
            search_timer: config.search_interval,
            force_search_timer: config.search_interval,
            transitions: 0,
            current,
            scratch: Pose::new(bones, contacts),
            output,
            global_positions: Vec::with_capacity(bones),
            global_rotations: Vec::with_capacity(bones),
            inertializer,
            simulation: SimulationState::default(),
            desired: DesiredChange::default(),
            trajectory: Trajectory::default(),
            gait: 0.0,
            gait_velocity: 0.0,
            current_features: vec![0.0; db.feature_count()],
            query: vec![0.0; db.feature_count()],
            debug_trajectory: DebugTrajectory::default(),
            config,
            db,
        };
        instance.update_global_pose();
        Ok(instance)
    }

    /// Load the database (and network data for learned playback) from
    /// `paths` and build features from `config`
    pub fn load(paths: &AssetPaths, config: MotionMatchingConfig) -> Result<Self> {
        let mut db = Database::load(&paths.database)?;
        db.build_features(&config.feature_layout())?;
        let db = Arc::new(db);

        let source: Box<dyn PoseSource> = match config.pose_source {
            PoseSourceKind::Direct => Box::new(DirectPoseSource),
            PoseSourceKind::Learned => {
                let network = Arc::new(NeuralNetwork::load(&paths.decompressor)?);
                let latent = Arc::new(load_latent(&paths.latent)?);
                Box::new(NetworkPoseSource::new(network, latent, &db)?)
            }
        };

        Self::new(db, source, config)
    }

    /// Retarget every step onto another skeleton.
    ///
    /// The retargeter's source skeleton must have one bone per database bone.
    pub fn with_retargeter(mut self, retargeter: Retargeter) -> Result<Self> {
        if retargeter.source().len() != self.db.bone_count() {
            return Err(Error::DimensionMismatch {
                what: "source skeleton bones",
                expected: self.db.bone_count(),
                actual: retargeter.source().len(),
            });
        }
        self.retargeter = Some(retargeter);
        self.retarget();
        Ok(self)
    }

    /// Advance by `dt` seconds of wall-clock time; returns the number of
    /// fixed steps taken
    pub fn tick(&mut self, dt: f32, input: &InputState) -> usize {
        self.accumulator += dt;
        let mut steps = 0;
        while self.accumulator >= FIXED_DT {
            self.step(input);
            self.accumulator -= FIXED_DT;
            steps += 1;
        }
        steps
    }

    /// Run exactly one fixed step
    pub fn step(&mut self, input: &InputState) {
        let dt = FIXED_DT;
        let steering = input.steering();

        let walk = if input.is_walking() { 1.0 } else { 0.0 };
        simple_spring_damper_exact(
            &mut self.gait,
            &mut self.gait_velocity,
            walk,
            self.config.gait_halflife,
            dt,
        );
        let speeds = self.config.run_speeds.lerp(&self.config.walk_speeds, self.gait);

        let desired_velocity = desired_velocity_update(
            steering.move_stick,
            steering.camera_azimuth,
            self.simulation.rotation,
            &speeds,
        );
        let desired_rotation = desired_rotation_update(
            self.desired.rotation,
            steering.move_stick,
            steering.camera_stick,
            steering.camera_azimuth,
            steering.strafe,
            desired_velocity,
        );
        self.desired.update(desired_velocity, desired_rotation, dt);

        let force_search = self.force_search_timer <= 0.0
            && self.desired.settled(
                self.config.velocity_change_threshold,
                self.config.rotation_change_threshold,
            );
        if force_search {
            self.force_search_timer = self.config.search_interval;
        } else if self.force_search_timer > 0.0 {
            self.force_search_timer -= dt;
        }

        self.trajectory.predict(
            &self.simulation,
            desired_velocity,
            desired_rotation,
            &steering,
            &speeds,
            &self.config.simulation_halflives,
            TRAJECTORY_SAMPLE_FRAMES as f32 * dt,
        );

        self.build_query();

        let margin = self.source.range_end_margin();
        let end_of_range = self.db.trajectory_index_clamp(self.frame_index, 1, margin) == self.frame_index;
        let reason = if end_of_range {
            Some(SearchReason::EndOfRange)
        } else if force_search {
            Some(SearchReason::Forced)
        } else if self.search_timer <= 0.0 {
            Some(SearchReason::Periodic)
        } else {
            None
        };

        if let Some(reason) = reason {
            self.search(reason, dt);
            self.search_timer = self.config.search_interval;
        }
        self.search_timer -= dt;

        self.frame_index = self.db.trajectory_index_clamp(self.frame_index, 1, margin);

        self.source
            .pose(&self.db, self.frame_index, &self.current, dt, &mut self.scratch);
        std::mem::swap(&mut self.current, &mut self.scratch);
        self.inertializer.update(&self.current, dt, &mut self.output);

        self.simulation.update(
            desired_velocity,
            desired_rotation,
            &self.config.simulation_halflives,
            dt,
        );

        self.update_global_pose();
        self.update_debug_trajectory();
        self.retarget();
    }

    fn search(&mut self, reason: SearchReason, dt: f32) {
        let incumbent = match reason {
            SearchReason::EndOfRange => None,
            _ => Some(self.frame_index),
        };

        match self.db.search(&self.query, incumbent, &self.config.search) {
            Some(result) if result.index != self.frame_index => {
                self.source
                    .pose(&self.db, result.index, &self.current, dt, &mut self.scratch);
                self.inertializer
                    .transition(&self.output.root(), &self.current, &self.scratch);
                debug!(
                    "Transition {} -> {} ({:?}, cost {:.4})",
                    self.frame_index, result.index, reason, result.cost
                );
                self.frame_index = result.index;
                self.transitions += 1;
            }
            Some(result) => {
                trace!(
                    "Kept frame {} ({:?}, cost {:.4})",
                    result.index, reason, result.cost
                );
            }
            None => {
                warn!(
                    "Search found no candidate at frame {} ({:?})",
                    self.frame_index, reason
                );
            }
        }
    }

    /// Pose features come from the playing frame, trajectory features from
    /// the prediction relative to the displayed root
    fn build_query(&mut self) {
        let db = &self.db;
        db.denormalize_features(db.features().row(self.frame_index), &mut self.current_features);

        let Some(layout) = db.layout() else {
            return;
        };
        let root_position = self.output.positions[0];
        let root_inverse = self.output.rotations[0].inverse();

        for slot in layout.slots() {
            let offset = slot.offset;
            match slot.group {
                FeatureGroup::BonePosition(_) | FeatureGroup::BoneVelocity(_) => {
                    let range = offset..offset + slot.group.dims();
                    self.query[range.clone()].copy_from_slice(&self.current_features[range]);
                }
                FeatureGroup::TrajectoryPositions => {
                    for k in 0..TRAJECTORY_FRAME_OFFSETS.len() {
                        let p = root_inverse * (self.trajectory.positions[k + 1] - root_position);
                        self.query[offset + 2 * k] = p.x;
                        self.query[offset + 2 * k + 1] = p.z;
                    }
                }
                FeatureGroup::TrajectoryDirections => {
                    for k in 0..TRAJECTORY_FRAME_OFFSETS.len() {
                        let d = root_inverse * (self.trajectory.rotations[k + 1] * Vec3::Z);
                        self.query[offset + 2 * k] = d.x;
                        self.query[offset + 2 * k + 1] = d.z;
                    }
                }
            }
        }
    }

    fn update_global_pose(&mut self) {
        forward_kinematics_full(
            &mut self.global_positions,
            &mut self.global_rotations,
            &self.output.positions,
            &self.output.rotations,
            self.db.bone_parents.as_slice(),
        );
    }

    fn update_debug_trajectory(&mut self) {
        let debug = &mut self.debug_trajectory;
        for i in 0..TRAJECTORY_SAMPLES {
            debug.trajectory_positions[i] = self.trajectory.positions[i];
            debug.trajectory_directions[i] = self.trajectory.rotations[i] * Vec3::Z;
        }

        let db = &self.db;
        db.denormalize_features(db.features().row(self.frame_index), &mut self.current_features);
        let root_position = self.output.positions[0];
        let root_rotation = self.output.rotations[0];
        debug.matched_positions[0] = root_position;
        debug.matched_directions[0] = root_rotation * Vec3::Z;

        let Some(layout) = db.layout() else {
            return;
        };
        let features = &self.current_features;
        if let Some(slot) = layout.find(FeatureGroup::TrajectoryPositions) {
            for k in 0..TRAJECTORY_FRAME_OFFSETS.len() {
                let local = Vec3::new(features[slot.offset + 2 * k], 0.0, features[slot.offset + 2 * k + 1]);
                debug.matched_positions[k + 1] = root_rotation * local + root_position;
            }
        }
        if let Some(slot) = layout.find(FeatureGroup::TrajectoryDirections) {
            for k in 0..TRAJECTORY_FRAME_OFFSETS.len() {
                let local = Vec3::new(features[slot.offset + 2 * k], 0.0, features[slot.offset + 2 * k + 1]);
                debug.matched_directions[k + 1] = root_rotation * local;
            }
        }
    }

    fn retarget(&mut self) {
        if let Some(retargeter) = &mut self.retargeter {
            retargeter.retarget(&self.output.rotations);
        }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn config(&self) -> &MotionMatchingConfig {
        &self.config
    }

    pub fn pose_source(&self) -> &dyn PoseSource {
        self.source.as_ref()
    }

    /// Database frame at the play head
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// Number of accepted transitions so far
    pub fn transitions(&self) -> usize {
        self.transitions
    }

    /// Inertialized local pose with the root in world space
    pub fn pose(&self) -> &Pose {
        &self.output
    }

    pub fn global_positions(&self) -> &[Vec3] {
        &self.global_positions
    }

    pub fn global_rotations(&self) -> &[Quat] {
        &self.global_rotations
    }

    /// World-space position and rotation of the displayed root
    pub fn root_motion(&self) -> (Vec3, Quat) {
        (self.output.positions[0], self.output.rotations[0])
    }

    pub fn has_root_motion(&self) -> bool {
        true
    }

    pub fn contacts(&self) -> &[bool] {
        &self.output.contacts
    }

    pub fn simulation(&self) -> &SimulationState {
        &self.simulation
    }

    pub fn desired_velocity(&self) -> Vec3 {
        self.desired.velocity
    }

    pub fn desired_rotation(&self) -> Quat {
        self.desired.rotation
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    /// Raw (not normalized) query of the last step
    pub fn query(&self) -> &[f32] {
        &self.query
    }

    pub fn debug_trajectory(&self) -> &DebugTrajectory {
        &self.debug_trajectory
    }

    pub fn inertializer(&self) -> &Inertializer {
        &self.inertializer
    }

    pub fn retargeter(&self) -> Option<&Retargeter> {
        self.retargeter.as_ref()
    }

    /// Skinning matrices of the retargeted pose, if a retargeter is set
    pub fn skinning_matrices(&self) -> Option<&[Mat4]> {
        self.retargeter.as_ref().map(Retargeter::skinning_matrices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureLayout;
    use crate::input::InputCommand;
    use crate::synthetic;

    fn instance() -> MotionMatchingInstance {
        let mut db = synthetic::locomotion_database(4, 240).unwrap();
        db.build_features(&FeatureLayout::default()).unwrap();
        MotionMatchingInstance::new(
            Arc::new(db),
            Box::new(DirectPoseSource),
            MotionMatchingConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_requires_built_features() {
        let db = synthetic::locomotion_database(1, 100).unwrap();
        let result = MotionMatchingInstance::new(
            Arc::new(db),
            Box::new(DirectPoseSource),
            MotionMatchingConfig::default(),
        );
        assert!(matches!(result, Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_retargeter_must_match_database_bones() {
        let source = crate::retarget::SourceSkeleton::new(
            vec!["Entity".into(), "Hips".into(), "Spine".into()],
            vec![-1, 0, 1],
            vec![Vec3::ZERO; 3],
            vec![Quat::IDENTITY; 3],
        )
        .unwrap();
        let target = crate::skeleton::TargetSkeleton::new(vec![crate::skeleton::TargetBone {
            name: "Entity".into(),
            parent: None,
            rest: crate::skeleton::Transform::IDENTITY,
        }])
        .unwrap();
        let result = instance().with_retargeter(Retargeter::by_name(target, source));
        assert!(matches!(
            result,
            Err(Error::DimensionMismatch {
                what: "source skeleton bones",
                expected: 23,
                actual: 3,
            })
        ));
    }

    #[test]
    fn test_tick_runs_whole_steps() {
        let mut instance = instance();
        let input = InputState::default();
        assert_eq!(instance.tick(0.5 * FIXED_DT, &input), 0);
        assert_eq!(instance.tick(0.6 * FIXED_DT, &input), 1);
        assert_eq!(instance.tick(2.0 * FIXED_DT, &input), 2);
    }

    #[test]
    fn test_starts_at_first_range_with_root_at_origin() {
        let instance = instance();
        assert_eq!(instance.frame_index(), instance.database().range_starts[0]);
        let (position, rotation) = instance.root_motion();
        assert!(position.length() < 1e-5);
        assert!(rotation.dot(Quat::IDENTITY).abs() > 1.0 - 1e-5);
        assert!(instance.has_root_motion());
    }

    #[test]
    fn test_play_head_stays_inside_ranges() {
        let mut instance = instance();
        let input = InputState::new(InputCommand::FORWARD);
        for _ in 0..600 {
            instance.step(&input);
            assert!(instance.database().range_of(instance.frame_index()).is_some());
        }
        assert!(instance.transitions() > 0);
    }

    #[test]
    fn test_query_copies_current_pose_features() {
        let mut instance = instance();
        instance.step(&InputState::default());
        let db = instance.database().clone();
        let layout = db.layout().unwrap().clone();
        let mut expected = vec![0.0; db.feature_count()];
        let slot = layout.find(FeatureGroup::TrajectoryPositions).unwrap();
        // query was built before the play head advanced
        let frame = db.range_starts[0];
        db.denormalize_features(db.features().row(frame), &mut expected);
        assert_eq!(instance.query()[..slot.offset], expected[..slot.offset]);
    }
}
