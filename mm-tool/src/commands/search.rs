//! Single search queries against a database

use anyhow::{Context, Result, bail};
use clap::Args;
use motion_matching::{Database, search, search_brute_force};
use std::path::PathBuf;
use std::time::Instant;

use super::load_config;

#[derive(Args)]
pub struct SearchArgs {
    /// Path to a database.bin file
    pub file: PathBuf,

    /// Frame whose features form the query
    #[arg(short, long)]
    pub frame: usize,

    /// Treat FRAME as the playing frame when searching
    #[arg(long)]
    pub incumbent: bool,

    /// JSON config with feature and search settings
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

pub fn execute(args: SearchArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let mut db = Database::load(&args.file)
        .with_context(|| format!("Failed to load database: {}", args.file.display()))?;

    if args.frame >= db.frame_count() {
        bail!(
            "Frame {} is out of range (database has {} frames)",
            args.frame,
            db.frame_count()
        );
    }

    db.build_features(&config.feature_layout())
        .context("Failed to build features")?;
    let query = db.features().row(args.frame).to_vec();
    let current = args.incumbent.then_some(args.frame);

    let start = Instant::now();
    let pruned = search(&db, &query, current, &config.search);
    let pruned_time = start.elapsed();

    let start = Instant::now();
    let brute = search_brute_force(&db, &query, current, &config.search);
    let brute_time = start.elapsed();

    for (label, result, elapsed) in [
        ("Pruned", pruned, pruned_time),
        ("Brute force", brute, brute_time),
    ] {
        match result {
            Some(result) => println!(
                "{label:<12} frame {:>6} (range {}), cost {:.6} in {elapsed:?}",
                result.index,
                db.range_of(result.index).unwrap_or_default(),
                result.cost
            ),
            None => println!("{label:<12} no candidate frame in {elapsed:?}"),
        }
    }

    if pruned != brute {
        bail!("Pruned search disagrees with brute force: {pruned:?} vs {brute:?}");
    }

    Ok(())
}
