//! Exit codes for the `hmm-core` binary.
//!
//! Exit code ranges:
//! - 0: success
//! - 10-19: input errors (fixable by changing arguments, config or data)
//! - 20-29: internal or environment errors

use crate::config::ConfigError;
use crate::error::Error;

/// Exit codes for `hmm-core` commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Inference ran to completion.
    Clean = 0,

    /// Invalid arguments.
    ArgsError = 10,

    /// Configuration file or environment override rejected.
    ConfigError = 11,

    /// Input arrays disagree on shape, or a distribution is invalid.
    InputError = 12,

    /// Every state is impossible at some timestep.
    DegenerateInput = 13,

    /// Internal error (bug - please report).
    InternalError = 20,

    /// I/O error reading input or writing output.
    IoError = 21,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Codes 10-19.
    pub fn is_user_error(self) -> bool {
        (10..20).contains(&self.as_i32())
    }

    /// Stable name for JSON output.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::InputError => "ERR_INPUT",
            ExitCode::DegenerateInput => "ERR_DEGENERATE",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }
}

impl From<&Error> for ExitCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::ShapeMismatch { .. }
            | Error::InvalidDistribution { .. }
            | Error::NegativeProbability { .. }
            | Error::EmptyStateSpace { .. } => ExitCode::InputError,
            Error::DegenerateLikelihood { .. } => ExitCode::DegenerateInput,
            Error::Config(ConfigError::Io { .. }) => ExitCode::IoError,
            Error::Config(_) => ExitCode::ConfigError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
