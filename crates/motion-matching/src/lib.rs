//! Motion matching animation synthesis.
//!
//! A [`MotionMatchingInstance`] turns player input into a skeletal pose by
//! repeatedly searching a [`Database`] of animation frames for the frame
//! whose features best match the character's current pose and predicted
//! trajectory. Frames are played back directly or decoded through a small
//! decompressor network, and every jump between frames is hidden by an
//! [`Inertializer`].
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use motion_matching::{
//!     DirectPoseSource, FeatureLayout, InputCommand, InputState, MotionMatchingConfig,
//!     MotionMatchingInstance, synthetic,
//! };
//!
//! let mut db = synthetic::locomotion_database(2, 240)?;
//! db.build_features(&FeatureLayout::default())?;
//!
//! let mut instance = MotionMatchingInstance::new(
//!     Arc::new(db),
//!     Box::new(DirectPoseSource),
//!     MotionMatchingConfig::default(),
//! )?;
//! let steps = instance.tick(0.25, &InputState::new(InputCommand::FORWARD));
//! let (position, _rotation) = instance.root_motion();
//! println!("{steps} steps, root at {position}");
//! # Ok::<(), motion_matching::Error>(())
//! ```

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod array;
pub mod config;
pub mod database;
pub mod error;
pub mod features;
pub mod inertialize;
pub mod input;
pub mod instance;
pub mod io;
pub mod math;
pub mod network;
pub mod pose;
pub mod pose_source;
pub mod retarget;
pub mod search;
pub mod skeleton;
pub mod spring;
pub mod synthetic;
pub mod trajectory;

pub use array::{Array1D, Array2D};
pub use config::{AssetPaths, MotionMatchingConfig, PoseSourceKind};
pub use database::{Database, FeatureBounds};
pub use error::{Error, Result};
pub use features::{FeatureBones, FeatureGroup, FeatureLayout, FeatureWeights};
pub use inertialize::Inertializer;
pub use input::{InputCommand, InputState};
pub use instance::{DebugTrajectory, FIXED_DT, MotionMatchingInstance, SearchReason};
pub use network::NeuralNetwork;
pub use pose::{Pose, RootState};
pub use pose_source::{DirectPoseSource, NetworkPoseSource, PoseSource};
pub use retarget::{Retargeter, SourceSkeleton};
pub use search::{SearchParams, SearchResult, search, search_brute_force};
pub use skeleton::{Bone, TargetBone, TargetSkeleton, Transform};
pub use trajectory::{SimulationHalflives, SimulationState, Speeds, Trajectory};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
