//! Exact inference for discrete-state hidden Markov models.
//!
//! This library provides:
//! - Forward and backward filtering in log space
//! - Two-filter and RTS smoothing, fixed-lag smoothing
//! - Expected transition counts, Viterbi decoding, posterior sampling
//! - Parallel associative-scan versions of filtering and smoothing
//! - Configuration, logging and the engine façade used by the binary
//!
//! The binary entry point is in `main.rs`.

pub mod config;
pub mod engine;
pub mod error;
pub mod exit_codes;
pub mod inference;
pub mod logging;

pub use config::{Backend, ConfigError, InferenceConfig, SmootherKind};
pub use engine::HmmEngine;
pub use error::{Error, Result};
pub use inference::*;
