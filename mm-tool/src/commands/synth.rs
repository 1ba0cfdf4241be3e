//! Synthetic asset generation

use anyhow::{Context, Result};
use clap::Args;
use motion_matching::network::write_latent;
use motion_matching::{AssetPaths, synthetic};
use std::fs;
use std::path::PathBuf;

use super::load_config;

#[derive(Args)]
pub struct SynthArgs {
    /// Output directory
    pub output: PathBuf,

    /// Number of clips
    #[arg(long, default_value_t = 8)]
    pub clips: usize,

    /// Frames per clip
    #[arg(long, default_value_t = 600)]
    pub frames: usize,

    /// Latent dimensions of the generated decompressor
    #[arg(long, default_value_t = 32)]
    pub latent: usize,

    /// JSON config whose feature layout the decompressor is sized for
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

pub fn execute(args: SynthArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    let paths = AssetPaths::from_dir(&args.output);

    let mut db = synthetic::locomotion_database(args.clips, args.frames)?;
    db.save(&paths.database)
        .with_context(|| format!("Failed to write {}", paths.database.display()))?;

    db.build_features(&config.feature_layout())
        .context("Failed to build features")?;
    let (network, latent) = synthetic::mean_pose_network(&db, args.latent)?;
    network
        .save(&paths.decompressor)
        .with_context(|| format!("Failed to write {}", paths.decompressor.display()))?;

    let mut file = fs::File::create(&paths.latent)
        .with_context(|| format!("Failed to create {}", paths.latent.display()))?;
    write_latent(&mut file, &latent)
        .with_context(|| format!("Failed to write {}", paths.latent.display()))?;

    println!(
        "Wrote {} clips x {} frames to {}",
        args.clips,
        args.frames,
        args.output.display()
    );
    Ok(())
}
