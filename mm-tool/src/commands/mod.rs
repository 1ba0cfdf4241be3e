//! Command implementations

pub mod info;
pub mod search;
pub mod simulate;
pub mod synth;

use anyhow::{Context, Result};
use motion_matching::MotionMatchingConfig;
use std::path::Path;

/// Defaults, or a JSON config file with any subset of the fields
pub fn load_config(path: Option<&Path>) -> Result<MotionMatchingConfig> {
    let Some(path) = path else {
        return Ok(MotionMatchingConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse config: {}", path.display()))
}
