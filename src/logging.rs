//! Logging setup for flyfeed.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::{FlyfeedError, Result};

/// Map a configured level name to a tracing level, defaulting to INFO.
fn level_from_name(name: &str) -> Level {
    match name.trim().to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// `RUST_LOG` directives win; the configured level is the fallback directive.
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::from_default_env().add_directive(level_from_name(level).into())
}

/// Initialize logging to stdout and to the configured log file.
///
/// The log file is appended to, so restarts keep earlier refresh history.
pub fn init(config: &LoggingConfig) -> Result<()> {
    if let Some(parent) = Path::new(&config.file).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.file)?;
    let writer = std::io::stdout.and(Arc::new(log_file));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true),
        )
        .with(env_filter(&config.level))
        .try_init()
        .map_err(|e| FlyfeedError::Config(format!("failed to install logger: {e}")))
}

/// Initialize console-only logging.
///
/// Used when the log file cannot be opened. Does nothing if a subscriber is
/// already installed.
pub fn init_console_only(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(true),
        )
        .with(env_filter(level))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_name() {
        assert_eq!(level_from_name("trace"), Level::TRACE);
        assert_eq!(level_from_name("DEBUG"), Level::DEBUG);
        assert_eq!(level_from_name("info"), Level::INFO);
        assert_eq!(level_from_name("warning"), Level::WARN);
        assert_eq!(level_from_name(" Warn "), Level::WARN);
        assert_eq!(level_from_name("error"), Level::ERROR);
    }

    #[test]
    fn test_level_from_name_default() {
        assert_eq!(level_from_name("verbose"), Level::INFO);
        assert_eq!(level_from_name(""), Level::INFO);
    }
}
