//! Headless playback driven by a fixed input

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use glam::Vec3;
use log::info;
use motion_matching::{
    AssetPaths, InputCommand, InputState, MotionMatchingInstance, PoseSourceKind,
};
use std::path::PathBuf;

use super::load_config;

#[derive(Clone, Copy, ValueEnum)]
pub enum Command {
    Forward,
    Backward,
    Left,
    Right,
    Walk,
    Strafe,
}

impl From<Command> for InputCommand {
    fn from(command: Command) -> Self {
        match command {
            Command::Forward => Self::FORWARD,
            Command::Backward => Self::BACKWARD,
            Command::Left => Self::LEFT,
            Command::Right => Self::RIGHT,
            Command::Walk => Self::WALK,
            Command::Strafe => Self::STRAFE,
        }
    }
}

#[derive(Args)]
pub struct SimulateArgs {
    /// Directory holding database.bin (and decompressor.bin, latent.bin)
    pub assets: PathBuf,

    /// Number of fixed 60 Hz steps to run
    #[arg(short, long, default_value_t = 300)]
    pub ticks: usize,

    /// Held commands, comma separated
    #[arg(short, long, value_enum, value_delimiter = ',')]
    pub input: Vec<Command>,

    /// JSON config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Decode poses through the decompressor network
    #[arg(long)]
    pub learned: bool,

    /// Print the root every N steps (0 prints only the summary)
    #[arg(long, default_value_t = 1)]
    pub every: usize,
}

pub fn execute(args: SimulateArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if args.learned {
        config.pose_source = PoseSourceKind::Learned;
    }

    let paths = AssetPaths::from_dir(&args.assets);
    let mut instance = MotionMatchingInstance::load(&paths, config)
        .with_context(|| format!("Failed to load assets from {}", args.assets.display()))?;
    info!(
        "Loaded {} frames, {} pose source",
        instance.database().frame_count(),
        instance.pose_source().name()
    );

    let commands = args
        .input
        .iter()
        .fold(InputCommand::empty(), |acc, &c| acc | InputCommand::from(c));
    let input = InputState::new(commands);

    for tick in 1..=args.ticks {
        instance.step(&input);
        if args.every > 0 && tick % args.every == 0 {
            let (position, _) = instance.root_motion();
            println!(
                "{tick:>6}  frame {:>6}  root ({:>8.3}, {:>8.3}, {:>8.3})",
                instance.frame_index(),
                position.x,
                position.y,
                position.z
            );
        }
    }

    let (position, rotation) = instance.root_motion();
    let facing = rotation * Vec3::Z;
    let simulation = instance.simulation();
    println!("Steps:        {}", args.ticks);
    println!("Transitions:  {}", instance.transitions());
    println!("Frame:        {}", instance.frame_index());
    println!(
        "Root:         ({:.3}, {:.3}, {:.3}) facing ({:.3}, {:.3})",
        position.x, position.y, position.z, facing.x, facing.z
    );
    println!(
        "Simulation:   ({:.3}, {:.3}, {:.3}) speed {:.3}",
        simulation.position.x,
        simulation.position.y,
        simulation.position.z,
        simulation.velocity.length()
    );

    Ok(())
}
