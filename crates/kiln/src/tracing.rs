//! Tracing setup for the kiln binary.
//!
//! Logs always go to stderr so command output on stdout stays parseable.
//! `RUST_LOG` takes precedence over `--level` when set.

use std::io;
pub use tracing::Level;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TracingFormat {
    /// Multi-line human-readable format
    Pretty,
    /// Single-line format
    Compact,
    /// One JSON object per event
    Json,
}

/// Log level options for the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    /// Everything
    Trace,
    /// Debug and above
    Debug,
    /// Info and above
    Info,
    /// Warnings and above (default)
    Warn,
    /// Errors only
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Tracing configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Output format
    pub format: TracingFormat,
    /// Level used when `RUST_LOG` is unset
    pub level: Level,
    /// Explicit filter directive, overriding both `RUST_LOG` and `level`
    pub filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            format: TracingFormat::Pretty,
            level: Level::WARN,
            filter: None,
        }
    }
}

static CORRELATION_ID: std::sync::OnceLock<Uuid> = std::sync::OnceLock::new();

/// Correlation ID shared by every event of this invocation
pub fn correlation_id() -> Uuid {
    *CORRELATION_ID.get_or_init(Uuid::new_v4)
}

fn default_directive(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    format!("kiln={level},kiln_core={level}")
}

/// Install the global subscriber
pub fn init_tracing(config: TracingConfig) -> miette::Result<()> {
    let env_filter = match config.filter {
        Some(filter) => EnvFilter::try_new(filter),
        None => EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(default_directive(config.level))),
    }
    .map_err(|e| miette::miette!("Failed to create tracing filter: {e}"))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match config.format {
        TracingFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(io::stderr)
                    .with_target(true),
            )
            .try_init(),
        TracingFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(io::stderr)
                    .with_target(false),
            )
            .try_init(),
        TracingFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(io::stderr)
                    .with_current_span(true),
            )
            .try_init(),
    };
    result.map_err(|e| miette::miette!("Failed to install tracing subscriber: {e}"))?;

    tracing::debug!(
        correlation_id = %correlation_id(),
        version = env!("CARGO_PKG_VERSION"),
        format = ?config.format,
        "Tracing initialized"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_conversion() {
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
        assert_eq!(Level::from(LogLevel::Warn), Level::WARN);
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
    }

    #[test]
    fn test_default_directive_covers_both_crates() {
        assert_eq!(default_directive(Level::DEBUG), "kiln=debug,kiln_core=debug");
    }

    #[test]
    fn test_correlation_id_is_stable() {
        assert_eq!(correlation_id(), correlation_id());
    }
}
