//! Inference configuration.
//!
//! Resolution order (highest to lowest priority):
//! 1. Environment overrides (`HMM_BACKEND`, `HMM_SCAN_SCHEDULE`,
//!    `HMM_SMOOTHER`, `HMM_VALIDATE`)
//! 2. TOML file (`--config`, or `HMM_CONFIG`)
//! 3. Built-in defaults
//!
//! The binary's `--backend`, `--schedule` and `--smoother` flags sit above
//! all three.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::inference::ScanSchedule;

/// Default sum-to-one tolerance for distribution validation.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Errors that can occur during config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML in config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Which formulation runs filtering and smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Step-by-step recursions.
    #[default]
    Sequential,
    /// Associative scans.
    Parallel,
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" | "serial" => Ok(Backend::Sequential),
            "parallel" | "scan" => Ok(Backend::Parallel),
            _ => Err(format!("unknown backend: {}", s)),
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Sequential => write!(f, "sequential"),
            Backend::Parallel => write!(f, "parallel"),
        }
    }
}

/// Which sequential smoother the engine uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SmootherKind {
    /// Forward filter combined with backward messages.
    #[default]
    TwoFilter,
    /// Rauch-Tung-Striebel backward sweep.
    Rts,
}

impl std::str::FromStr for SmootherKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "two-filter" | "forward-backward" => Ok(SmootherKind::TwoFilter),
            "rts" => Ok(SmootherKind::Rts),
            _ => Err(format!("unknown smoother: {}", s)),
        }
    }
}

impl std::fmt::Display for SmootherKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SmootherKind::TwoFilter => write!(f, "two-filter"),
            SmootherKind::Rts => write!(f, "rts"),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InferenceConfig {
    pub backend: Backend,
    /// Only read by the parallel backend.
    pub schedule: ScanSchedule,
    /// Only read by the sequential backend.
    pub smoother: SmootherKind,
    /// Check π and every transition row before running.
    pub validate_distributions: bool,
    /// Allowed |Σ - 1| when validating.
    pub tolerance: f64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Sequential,
            schedule: ScanSchedule::WorkEfficient,
            smoother: SmootherKind::TwoFilter,
            validate_distributions: false,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl InferenceConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve: explicit file, else `HMM_CONFIG`, else defaults; then
    /// environment overrides.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match explicit {
            Some(path) => Self::load(path)?,
            None => match std::env::var("HMM_CONFIG") {
                Ok(path) => Self::load(path)?,
                Err(_) => Self::default(),
            },
        };
        base.apply_env_overrides(|key| std::env::var(key).ok())
    }

    /// Defaults with environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `HMM_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("HMM_BACKEND") {
            self.backend = val.parse().map_err(|message| ConfigError::Invalid {
                key: "HMM_BACKEND",
                message,
            })?;
        }
        if let Some(val) = lookup("HMM_SCAN_SCHEDULE") {
            self.schedule = val.parse().map_err(|message| ConfigError::Invalid {
                key: "HMM_SCAN_SCHEDULE",
                message,
            })?;
        }
        if let Some(val) = lookup("HMM_SMOOTHER") {
            self.smoother = val.parse().map_err(|message| ConfigError::Invalid {
                key: "HMM_SMOOTHER",
                message,
            })?;
        }
        if let Some(val) = lookup("HMM_VALIDATE") {
            self.validate_distributions = match val.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "HMM_VALIDATE",
                        message: format!("expected a boolean, got {}", val),
                    })
                }
            };
        }
        self.validate()?;
        Ok(self)
    }

    /// Semantic checks serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(ConfigError::Invalid {
                key: "tolerance",
                message: format!("must be positive and finite, got {}", self.tolerance),
            });
        }
        Ok(())
    }

    /// Set the backend.
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Set the scan schedule.
    pub fn with_schedule(mut self, schedule: ScanSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Set the sequential smoother.
    pub fn with_smoother(mut self, smoother: SmootherKind) -> Self {
        self.smoother = smoother;
        self
    }

    /// Enable distribution validation.
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validate_distributions = enabled;
        self
    }
}
