//! Database inspection

use anyhow::{Context, Result};
use clap::Args;
use motion_matching::{Bone, Database, FeatureGroup};
use std::path::PathBuf;

use super::load_config;

#[derive(Args)]
pub struct InfoArgs {
    /// Path to a database.bin file
    pub file: PathBuf,

    /// Build features and print their offsets and scales
    #[arg(short, long)]
    pub features: bool,

    /// JSON config selecting feature bones and weights
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

pub fn execute(args: InfoArgs) -> Result<()> {
    let mut db = Database::load(&args.file)
        .with_context(|| format!("Failed to load database: {}", args.file.display()))?;

    println!("Database: {}", args.file.display());
    println!("  Frames:   {}", db.frame_count());
    println!("  Bones:    {}", db.bone_count());
    println!("  Contacts: {}", db.contact_count());
    println!("  Ranges:   {}", db.range_count());
    for (i, range) in db.ranges().enumerate() {
        println!(
            "    [{i:>3}] {:>6}..{:<6} ({} frames)",
            range.start,
            range.end,
            range.len()
        );
    }

    if !args.features {
        return Ok(());
    }

    let config = load_config(args.config.as_deref())?;
    db.build_features(&config.feature_layout())
        .context("Failed to build features")?;
    let Some(layout) = db.layout() else {
        return Ok(());
    };

    println!();
    println!("Features: {}", db.feature_count());
    for slot in layout.slots() {
        let name = match slot.group {
            FeatureGroup::BonePosition(bone) => format!("{} position", bone_name(bone)),
            FeatureGroup::BoneVelocity(bone) => format!("{} velocity", bone_name(bone)),
            FeatureGroup::TrajectoryPositions => "trajectory positions".to_string(),
            FeatureGroup::TrajectoryDirections => "trajectory directions".to_string(),
        };
        println!("  {name} (weight {})", slot.weight);
        for d in slot.offset..slot.offset + slot.group.dims() {
            println!(
                "    [{d:>2}] offset {:>10.4}  scale {:>10.4}",
                db.feature_offset()[d],
                db.feature_scale()[d]
            );
        }
    }

    Ok(())
}

fn bone_name(index: usize) -> String {
    Bone::ALL
        .get(index)
        .map_or_else(|| format!("bone {index}"), |bone| bone.name().to_string())
}
