//! Player input consumed by an instance each tick.

use bitflags::bitflags;
use glam::Vec3;

use crate::trajectory::Steering;

bitflags! {
    /// Movement commands held down this tick
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
    pub struct InputCommand: u32 {
        const FORWARD  = 0x01;
        const BACKWARD = 0x02;
        const LEFT     = 0x04;
        const RIGHT    = 0x08;
        /// Blend speeds toward walking
        const WALK     = 0x10;
        /// Face the camera instead of the movement direction
        const STRAFE   = 0x20;
    }
}

/// Commands plus camera state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputState {
    pub commands: InputCommand,
    /// Camera azimuth about +Y; `PI` puts the camera behind a character
    /// facing +Z
    pub camera_yaw: f32,
    /// Camera stick on the ground plane (x, 0, z)
    pub camera_stick: Vec3,
}

impl Default for InputState {
    fn default() -> Self {
        Self {
            commands: InputCommand::empty(),
            camera_yaw: std::f32::consts::PI,
            camera_stick: Vec3::ZERO,
        }
    }
}

impl InputState {
    pub fn new(commands: InputCommand) -> Self {
        Self {
            commands,
            ..Self::default()
        }
    }

    /// Movement stick implied by the direction commands, in camera space
    /// (forward is -Z), clamped to unit length
    pub fn move_stick(&self) -> Vec3 {
        let mut stick = Vec3::ZERO;
        if self.commands.contains(InputCommand::FORWARD) {
            stick.z -= 1.0;
        }
        if self.commands.contains(InputCommand::BACKWARD) {
            stick.z += 1.0;
        }
        if self.commands.contains(InputCommand::LEFT) {
            stick.x -= 1.0;
        }
        if self.commands.contains(InputCommand::RIGHT) {
            stick.x += 1.0;
        }
        stick.clamp_length_max(1.0)
    }

    pub fn is_walking(&self) -> bool {
        self.commands.contains(InputCommand::WALK)
    }

    pub fn steering(&self) -> Steering {
        Steering {
            move_stick: self.move_stick(),
            camera_stick: self.camera_stick.clamp_length_max(1.0),
            camera_azimuth: self.camera_yaw,
            strafe: self.commands.contains(InputCommand::STRAFE),
        }
    }
}
