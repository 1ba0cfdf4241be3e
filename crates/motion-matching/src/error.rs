use std::io;
use thiserror::Error;

/// Error types for loading and validating motion matching data
#[derive(Error, Debug)]
pub enum Error {
    /// I/O Error during reading or writing
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed binary payload (negative counts, truncated data, bad shapes)
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Two pieces of data that must agree in size do not
    #[error("Dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Bone hierarchy or retargeting table is inconsistent
    #[error("Invalid skeleton: {0}")]
    InvalidSkeleton(String),
}

/// Result type using the motion matching Error
pub type Result<T> = std::result::Result<T, Error>;
