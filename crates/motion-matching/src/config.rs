//! Tunables of a motion matching instance and the locations of its data.

use std::path::{Path, PathBuf};

#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

use crate::features::{FeatureBones, FeatureLayout, FeatureWeights};
use crate::search::SearchParams;
use crate::trajectory::{SimulationHalflives, Speeds};

/// How frames are turned into poses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde-support", serde(rename_all = "lowercase"))]
pub enum PoseSourceKind {
    /// Copy database rows
    #[default]
    Direct,
    /// Decode through the decompressor network and latent table
    Learned,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde-support", serde(default))]
pub struct MotionMatchingConfig {
    pub feature_weights: FeatureWeights,
    pub feature_bones: FeatureBones,
    pub search: SearchParams,
    /// Seconds between periodic searches
    pub search_interval: f32,
    pub inertialize_halflife: f32,
    pub simulation_halflives: SimulationHalflives,
    /// Half-life of the run/walk blend
    pub gait_halflife: f32,
    pub run_speeds: Speeds,
    pub walk_speeds: Speeds,
    /// Squared rate of change of the desired velocity that counts as abrupt
    pub velocity_change_threshold: f32,
    /// Squared rate of change of the desired rotation that counts as abrupt
    pub rotation_change_threshold: f32,
    pub pose_source: PoseSourceKind,
}

impl Default for MotionMatchingConfig {
    fn default() -> Self {
        Self {
            feature_weights: FeatureWeights::default(),
            feature_bones: FeatureBones::default(),
            search: SearchParams::default(),
            search_interval: 0.1,
            inertialize_halflife: 0.1,
            simulation_halflives: SimulationHalflives::default(),
            gait_halflife: 0.1,
            run_speeds: Speeds::RUN,
            walk_speeds: Speeds::WALK,
            velocity_change_threshold: 50.0,
            rotation_change_threshold: 50.0,
            pose_source: PoseSourceKind::Direct,
        }
    }
}

impl MotionMatchingConfig {
    pub fn feature_layout(&self) -> FeatureLayout {
        FeatureLayout::locomotion(&self.feature_bones, &self.feature_weights)
    }
}

/// Files an instance loads its data from
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct AssetPaths {
    pub database: PathBuf,
    pub decompressor: PathBuf,
    pub latent: PathBuf,
}

impl AssetPaths {
    pub const DATABASE_FILE: &'static str = "database.bin";
    pub const DECOMPRESSOR_FILE: &'static str = "decompressor.bin";
    pub const LATENT_FILE: &'static str = "latent.bin";

    /// Standard file names inside `dir`
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            database: dir.join(Self::DATABASE_FILE),
            decompressor: dir.join(Self::DECOMPRESSOR_FILE),
            latent: dir.join(Self::LATENT_FILE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_matches_weights() {
        let config = MotionMatchingConfig::default();
        let layout = config.feature_layout();
        assert_eq!(layout.size(), 27);
        assert_eq!(layout.slots()[0].weight, 0.75);
        assert_eq!(config.run_speeds.back, 2.5);
    }

    #[test]
    fn test_asset_paths_from_dir() {
        let paths = AssetPaths::from_dir("assets");
        assert_eq!(paths.database, Path::new("assets/database.bin"));
        assert_eq!(paths.latent, Path::new("assets/latent.bin"));
    }

    #[cfg(feature = "serde-support")]
    #[test]
    fn test_partial_config_uses_defaults() {
        let config: MotionMatchingConfig =
            serde_json::from_str(r#"{ "search_interval": 0.2, "pose_source": "learned" }"#).unwrap();
        assert_eq!(config.search_interval, 0.2);
        assert_eq!(config.pose_source, PoseSourceKind::Learned);
        assert_eq!(config.inertialize_halflife, 0.1);
    }
}
