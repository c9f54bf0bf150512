//! Error types for the simulation engine.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, SimError>;

/// Errors raised while building or loading a simulation.
///
/// Everything here is a construction-time failure. Numeric drift inside a
/// running simulation is clamped at the point of use and never surfaces as
/// an error.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("genome must be {expected} bits long, got {found}")]
    GenomeLength { expected: usize, found: usize },

    #[error("fitness table must be 5 states x 3 phenotypes: {0}")]
    FitnessTableShape(String),

    #[error("population cannot be empty")]
    EmptyPopulation,

    #[error("invalid permutation {0:?}: expected each of 0..5 exactly once")]
    InvalidPermutation(Vec<usize>),

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimError {
    /// Shorthand for a parameter validation failure
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
