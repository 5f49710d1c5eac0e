//! Where the log filter and format come from.
//!
//! Level precedence: `--log-level`, then `HMM_LOG`, then `RUST_LOG`, then
//! `info`. A level applies to the `hmm_core` target; `RUST_LOG` is handed to
//! the subscriber verbatim as filter directives.

/// Target that carries the inference events.
const TARGET: &str = "hmm_core";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    /// One JSON object per line.
    Jsonl,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(LogFormat::Human),
            "jsonl" | "json" => Ok(LogFormat::Jsonl),
            _ => Err(format!("unknown log format: {s}")),
        }
    }
}

/// Verbosity of the inference events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Per-timestep events from the recursions.
    Trace,
    /// One event per inference call.
    Debug,
    /// Resolved configuration and command summaries.
    #[default]
    Info,
    /// Normalizer disagreements and similar.
    Warn,
    Error,
    Off,
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "off" | "quiet" => Ok(LogLevel::Off),
            _ => Err(format!("unknown log level: {s}")),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        })
    }
}

/// The filter the subscriber is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFilter {
    /// From `--log-level` or `HMM_LOG`.
    Level(LogLevel),
    /// Raw `RUST_LOG` directives.
    Directives(String),
}

impl Default for LogFilter {
    fn default() -> Self {
        LogFilter::Level(LogLevel::default())
    }
}

impl LogFilter {
    /// `EnvFilter` directive string.
    pub fn directives(&self) -> String {
        match self {
            LogFilter::Level(level) => format!("{TARGET}={level}"),
            LogFilter::Directives(raw) => raw.clone(),
        }
    }
}

/// Resolved logging settings for the binary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    pub filter: LogFilter,
}

impl LogConfig {
    /// Resolve against the process environment.
    pub fn from_env(cli_level: Option<LogLevel>, cli_format: Option<LogFormat>) -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), cli_level, cli_format)
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    ///
    /// An unparseable `HMM_LOG` or `HMM_LOG_FORMAT` is ignored.
    pub fn from_lookup<F>(lookup: F, cli_level: Option<LogLevel>, cli_format: Option<LogFormat>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let filter = cli_level
            .or_else(|| lookup("HMM_LOG").and_then(|v| v.parse().ok()))
            .map(LogFilter::Level)
            .or_else(|| {
                lookup("RUST_LOG")
                    .filter(|v| !v.trim().is_empty())
                    .map(LogFilter::Directives)
            })
            .unwrap_or_default();
        let format = cli_format
            .or_else(|| lookup("HMM_LOG_FORMAT").and_then(|v| v.parse().ok()))
            .unwrap_or_default();
        LogConfig { format, filter }
    }
}
