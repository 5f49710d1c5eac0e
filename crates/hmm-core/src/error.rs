//! Error types for HMM inference.
//!
//! Inference is a pure deterministic computation, so every error is a
//! property of the inputs: nothing here is retryable.

use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias for inference operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the inference core.
#[derive(Debug, Error)]
pub enum Error {
    /// Initial distribution, transition matrix and log-likelihoods disagree on
    /// the number of states or timesteps.
    #[error("shape mismatch in {what}: expected {expected}, got {got}")]
    ShapeMismatch {
        what: &'static str,
        expected: String,
        got: String,
    },

    /// A distribution does not sum to one within tolerance.
    #[error("{what} row {index} is not a distribution (sum={sum})")]
    InvalidDistribution {
        what: &'static str,
        index: usize,
        sum: f64,
    },

    /// A distribution contains a negative or non-finite entry.
    #[error("{what} row {index} has an invalid probability {value}")]
    NegativeProbability {
        what: &'static str,
        index: usize,
        value: f64,
    },

    /// Every state is impossible at this timestep, so normalization is 0/0.
    #[error("degenerate likelihood at timestep {timestep}: every state has zero probability")]
    DegenerateLikelihood { timestep: usize },

    /// Observations were supplied for a model without states.
    #[error("model has no states but {num_timesteps} timesteps were supplied")]
    EmptyStateSpace { num_timesteps: usize },

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Build a [`Error::ShapeMismatch`].
    pub fn shape(what: &'static str, expected: impl ToString, got: impl ToString) -> Self {
        Error::ShapeMismatch {
            what,
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }
}
