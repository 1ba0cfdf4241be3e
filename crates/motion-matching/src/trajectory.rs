//! Character simulation and future trajectory prediction.
//!
//! The simulated character is a point with a facing direction driven by
//! velocity and rotation springs. The same springs, stepped with a much
//! larger time step, predict where the character will be at each future
//! trajectory sample.

use glam::{Quat, Vec3};

#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

use crate::math::{quat_abs, quat_to_scaled_axis, yaw};
use crate::spring::{simple_spring_damper_exact_quat, simulation_positions_update};

/// Present sample plus one per future feature sample
pub const TRAJECTORY_SAMPLES: usize = 4;

/// Frames between two trajectory samples
pub const TRAJECTORY_SAMPLE_FRAMES: usize = 20;

/// Movement speeds in m/s
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct Speeds {
    pub forward: f32,
    pub side: f32,
    pub back: f32,
}

impl Speeds {
    pub const RUN: Self = Self {
        forward: 4.0,
        side: 3.0,
        back: 2.5,
    };

    pub const WALK: Self = Self {
        forward: 1.75,
        side: 1.5,
        back: 1.25,
    };

    /// Blend toward `other` by `t`
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            forward: self.forward + (other.forward - self.forward) * t,
            side: self.side + (other.side - self.side) * t,
            back: self.back + (other.back - self.back) * t,
        }
    }
}

/// Half-lives of the character simulation springs
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde-support", serde(default))]
pub struct SimulationHalflives {
    pub velocity: f32,
    pub rotation: f32,
}

impl Default for SimulationHalflives {
    fn default() -> Self {
        Self {
            velocity: 0.27,
            rotation: 0.27,
        }
    }
}

/// Stick and camera state that steers the character
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Steering {
    /// Movement stick on the ground plane, length at most one
    pub move_stick: Vec3,
    /// Camera stick; orbits the camera, or sets the facing when strafing
    pub camera_stick: Vec3,
    pub camera_azimuth: f32,
    pub strafe: bool,
}

impl Default for Steering {
    fn default() -> Self {
        Self {
            move_stick: Vec3::ZERO,
            camera_stick: Vec3::ZERO,
            camera_azimuth: std::f32::consts::PI,
            strafe: false,
        }
    }
}

/// Camera azimuth after orbiting for `dt`; strafing holds the camera still
pub fn orbit_camera_update_azimuth(azimuth: f32, camera_stick: Vec3, strafe: bool, dt: f32) -> f32 {
    let axis = if strafe { Vec3::ZERO } else { camera_stick };
    azimuth + 2.0 * dt * -axis.x
}

/// World-space velocity requested by the movement stick
pub fn desired_velocity_update(
    move_stick: Vec3,
    camera_azimuth: f32,
    simulation_rotation: Quat,
    speeds: &Speeds,
) -> Vec3 {
    let global_stick = yaw(camera_azimuth) * move_stick;
    let local_stick = simulation_rotation.inverse() * global_stick;
    let scale = if local_stick.z > 0.0 {
        Vec3::new(speeds.side, 0.0, speeds.forward)
    } else {
        Vec3::new(speeds.side, 0.0, speeds.back)
    };
    simulation_rotation * (scale * local_stick)
}

/// Facing requested by the sticks, or `desired_rotation` when idle
pub fn desired_rotation_update(
    desired_rotation: Quat,
    move_stick: Vec3,
    camera_stick: Vec3,
    camera_azimuth: f32,
    strafe: bool,
    desired_velocity: Vec3,
) -> Quat {
    if strafe {
        let direction = if camera_stick.length_squared() > 0.01 {
            yaw(camera_azimuth) * camera_stick.normalize()
        } else {
            yaw(camera_azimuth) * Vec3::NEG_Z
        };
        yaw(direction.x.atan2(direction.z))
    } else if move_stick.length_squared() > 0.01 {
        let direction = desired_velocity.normalize_or_zero();
        yaw(direction.x.atan2(direction.z))
    } else {
        desired_rotation
    }
}

/// Simulated character root
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationState {
    pub position: Vec3,
    pub velocity: Vec3,
    pub acceleration: Vec3,
    pub rotation: Quat,
    pub angular_velocity: Vec3,
}

impl Default for SimulationState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            acceleration: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            angular_velocity: Vec3::ZERO,
        }
    }
}

impl SimulationState {
    /// Spring toward the desired velocity and facing for one step
    pub fn update(
        &mut self,
        desired_velocity: Vec3,
        desired_rotation: Quat,
        halflives: &SimulationHalflives,
        dt: f32,
    ) {
        simulation_positions_update(
            &mut self.position,
            &mut self.velocity,
            &mut self.acceleration,
            desired_velocity,
            halflives.velocity,
            dt,
        );
        simple_spring_damper_exact_quat(
            &mut self.rotation,
            &mut self.angular_velocity,
            desired_rotation,
            halflives.rotation,
            dt,
        );
    }
}

/// Desired and simulated state at every trajectory sample
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub desired_velocities: [Vec3; TRAJECTORY_SAMPLES],
    pub desired_rotations: [Quat; TRAJECTORY_SAMPLES],
    pub positions: [Vec3; TRAJECTORY_SAMPLES],
    pub velocities: [Vec3; TRAJECTORY_SAMPLES],
    pub accelerations: [Vec3; TRAJECTORY_SAMPLES],
    pub rotations: [Quat; TRAJECTORY_SAMPLES],
    pub angular_velocities: [Vec3; TRAJECTORY_SAMPLES],
}

impl Default for Trajectory {
    fn default() -> Self {
        Self {
            desired_velocities: [Vec3::ZERO; TRAJECTORY_SAMPLES],
            desired_rotations: [Quat::IDENTITY; TRAJECTORY_SAMPLES],
            positions: [Vec3::ZERO; TRAJECTORY_SAMPLES],
            velocities: [Vec3::ZERO; TRAJECTORY_SAMPLES],
            accelerations: [Vec3::ZERO; TRAJECTORY_SAMPLES],
            rotations: [Quat::IDENTITY; TRAJECTORY_SAMPLES],
            angular_velocities: [Vec3::ZERO; TRAJECTORY_SAMPLES],
        }
    }
}

impl Trajectory {
    /// Predict every sample `dt` apart, starting from `state`.
    ///
    /// Future facings are computed from the desired velocities of the
    /// previous prediction, then future velocities from the predicted
    /// facings, so the two settle over consecutive calls.
    pub fn predict(
        &mut self,
        state: &SimulationState,
        desired_velocity: Vec3,
        desired_rotation: Quat,
        steering: &Steering,
        speeds: &Speeds,
        halflives: &SimulationHalflives,
        dt: f32,
    ) {
        self.desired_rotations[0] = desired_rotation;
        for i in 1..TRAJECTORY_SAMPLES {
            let azimuth = orbit_camera_update_azimuth(
                steering.camera_azimuth,
                steering.camera_stick,
                steering.strafe,
                i as f32 * dt,
            );
            self.desired_rotations[i] = desired_rotation_update(
                self.desired_rotations[i - 1],
                steering.move_stick,
                steering.camera_stick,
                azimuth,
                steering.strafe,
                self.desired_velocities[i],
            );
        }

        self.rotations = [state.rotation; TRAJECTORY_SAMPLES];
        self.angular_velocities = [state.angular_velocity; TRAJECTORY_SAMPLES];
        for i in 1..TRAJECTORY_SAMPLES {
            simple_spring_damper_exact_quat(
                &mut self.rotations[i],
                &mut self.angular_velocities[i],
                self.desired_rotations[i],
                halflives.rotation,
                i as f32 * dt,
            );
        }

        self.desired_velocities[0] = desired_velocity;
        for i in 1..TRAJECTORY_SAMPLES {
            let azimuth = orbit_camera_update_azimuth(
                steering.camera_azimuth,
                steering.camera_stick,
                steering.strafe,
                i as f32 * dt,
            );
            self.desired_velocities[i] =
                desired_velocity_update(steering.move_stick, azimuth, self.rotations[i], speeds);
        }

        self.positions[0] = state.position;
        self.velocities[0] = state.velocity;
        self.accelerations[0] = state.acceleration;
        for i in 1..TRAJECTORY_SAMPLES {
            self.positions[i] = self.positions[i - 1];
            self.velocities[i] = self.velocities[i - 1];
            self.accelerations[i] = self.accelerations[i - 1];
            simulation_positions_update(
                &mut self.positions[i],
                &mut self.velocities[i],
                &mut self.accelerations[i],
                self.desired_velocities[i],
                halflives.velocity,
                dt,
            );
        }
    }
}

/// Finite-difference rate of change of the desired velocity and rotation,
/// kept to detect when input settles after a sudden change
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DesiredChange {
    pub velocity: Vec3,
    pub rotation: Quat,
    pub velocity_change_curr: Vec3,
    pub velocity_change_prev: Vec3,
    pub rotation_change_curr: Vec3,
    pub rotation_change_prev: Vec3,
}

impl Default for DesiredChange {
    fn default() -> Self {
        Self {
            velocity: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            velocity_change_curr: Vec3::ZERO,
            velocity_change_prev: Vec3::ZERO,
            rotation_change_curr: Vec3::ZERO,
            rotation_change_prev: Vec3::ZERO,
        }
    }
}

impl DesiredChange {
    /// Record the new desired state reached after `dt`
    pub fn update(&mut self, velocity: Vec3, rotation: Quat, dt: f32) {
        let previous_velocity = self.velocity;
        let previous_rotation = self.rotation;
        self.velocity = velocity;
        self.rotation = rotation;

        self.velocity_change_prev = self.velocity_change_curr;
        self.velocity_change_curr = (velocity - previous_velocity) / dt;

        self.rotation_change_prev = self.rotation_change_curr;
        self.rotation_change_curr =
            quat_to_scaled_axis(quat_abs(rotation * previous_rotation.inverse())) / dt;
    }

    /// True on the step the velocity or rotation change falls below its
    /// threshold after having been at or above it
    pub fn settled(&self, velocity_threshold: f32, rotation_threshold: f32) -> bool {
        let velocity_settled = self.velocity_change_prev.length_squared() >= velocity_threshold
            && self.velocity_change_curr.length_squared() < velocity_threshold;
        let rotation_settled = self.rotation_change_prev.length_squared() >= rotation_threshold
            && self.rotation_change_curr.length_squared() < rotation_threshold;
        velocity_settled || rotation_settled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_forward_stick_uses_forward_speed() {
        // camera behind the character, facing +Z
        let v = desired_velocity_update(Vec3::NEG_Z, PI, Quat::IDENTITY, &Speeds::RUN);
        assert!((v - Vec3::new(0.0, 0.0, 4.0)).length() < 1e-5);

        let v = desired_velocity_update(Vec3::Z, PI, Quat::IDENTITY, &Speeds::RUN);
        assert!((v - Vec3::new(0.0, 0.0, -2.5)).length() < 1e-5);

        let v = desired_velocity_update(Vec3::X, PI, Quat::IDENTITY, &Speeds::RUN);
        assert!((v.length() - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_idle_stick_keeps_rotation() {
        let current = yaw(0.7);
        let q = desired_rotation_update(current, Vec3::ZERO, Vec3::ZERO, PI, false, Vec3::ZERO);
        assert_eq!(q, current);
    }

    #[test]
    fn test_stick_inside_dead_zone_keeps_rotation() {
        let current = yaw(0.7);
        let stick = Vec3::new(0.08, 0.0, 0.0);
        let q = desired_rotation_update(current, stick, Vec3::ZERO, PI, false, Vec3::X);
        assert_eq!(q, current);

        // a deflected camera stick inside the dead zone still faces camera forward
        let q = desired_rotation_update(current, Vec3::ZERO, stick, PI, true, Vec3::ZERO);
        assert!((q * Vec3::Z - Vec3::Z).length() < 1e-5);

        let outside = Vec3::new(0.2, 0.0, 0.0);
        let q = desired_rotation_update(current, outside, Vec3::ZERO, PI, false, Vec3::X);
        assert!((q * Vec3::Z - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn test_strafe_faces_camera_forward() {
        let q = desired_rotation_update(Quat::IDENTITY, Vec3::X, Vec3::ZERO, PI, true, Vec3::X);
        // camera at yaw PI looks down +Z
        assert!((q * Vec3::Z - Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn test_camera_orbit_disabled_when_strafing() {
        let stick = Vec3::new(1.0, 0.0, 0.0);
        assert_eq!(orbit_camera_update_azimuth(1.0, stick, true, 0.5), 1.0);
        assert!((orbit_camera_update_azimuth(1.0, stick, false, 0.5) - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_simulation_velocity_converges() {
        let mut state = SimulationState::default();
        let goal = Vec3::new(0.0, 0.0, 4.0);
        let halflives = SimulationHalflives::default();
        for _ in 0..150 {
            state.update(goal, Quat::IDENTITY, &halflives, 1.0 / 60.0);
        }
        assert!((state.velocity - goal).length() < 0.01 * goal.length());
    }

    #[test]
    fn test_prediction_runs_ahead_of_state() {
        let mut trajectory = Trajectory::default();
        let state = SimulationState::default();
        let steering = Steering {
            move_stick: Vec3::NEG_Z,
            ..Steering::default()
        };
        let desired = desired_velocity_update(Vec3::NEG_Z, PI, Quat::IDENTITY, &Speeds::RUN);
        for _ in 0..3 {
            trajectory.predict(
                &state,
                desired,
                Quat::IDENTITY,
                &steering,
                &Speeds::RUN,
                &SimulationHalflives::default(),
                20.0 / 60.0,
            );
        }
        assert_eq!(trajectory.positions[0], Vec3::ZERO);
        for i in 1..TRAJECTORY_SAMPLES {
            assert!(trajectory.positions[i].z > trajectory.positions[i - 1].z);
        }
    }

    #[test]
    fn test_settled_after_sudden_change() {
        let mut change = DesiredChange::default();
        let dt = 1.0 / 60.0;
        change.update(Vec3::ZERO, Quat::IDENTITY, dt);
        change.update(Vec3::new(0.0, 0.0, 4.0), Quat::IDENTITY, dt);
        assert!(!change.settled(50.0, 50.0));
        change.update(Vec3::new(0.0, 0.0, 4.0), Quat::IDENTITY, dt);
        assert!(change.settled(50.0, 50.0));
    }
}
