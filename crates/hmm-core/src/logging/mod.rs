//! Logging setup for the `hmm-core` binary and embedding applications.
//!
//! The inference routines only emit `tracing` events; nothing is printed
//! unless a subscriber is installed. [`init_logging`] installs one writing
//! human-readable or JSON lines to stderr, so stdout stays free for command
//! payloads.

pub mod config;

pub use config::{LogConfig, LogFilter, LogFormat, LogLevel};

use std::io::IsTerminal;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Build the `EnvFilter` for a resolved config.
///
/// Directives that fail to parse fall back to the default level.
pub fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_new(config.filter.directives())
        .unwrap_or_else(|_| EnvFilter::new(LogFilter::default().directives()))
}

/// Install the global subscriber.
///
/// Returns `false` when a subscriber was already installed.
pub fn init_logging(config: &LogConfig) -> bool {
    let filter = env_filter(config);
    match config.format {
        LogFormat::Human => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_ansi(std::io::stderr().is_terminal()),
            )
            .try_init()
            .is_ok(),
        LogFormat::Jsonl => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(false),
            )
            .try_init()
            .is_ok(),
    }
}
