//! Structured logging setup.
//!
//! The library itself only emits `tracing` events. Applications that want
//! them printed call [`init_logging`] once at startup.

use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Install a global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config);

    let fmt_layer = if config.json_format {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_line_number(config.include_file_line)
            .with_file(config.include_file_line)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(config.include_file_line)
            .with_file(config.include_file_line)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!(level = ?config.level, json = config.json_format, "Logging initialized");
    Ok(())
}

/// `RUST_LOG` directives, falling back to the configured level when unset.
/// Malformed directives are skipped.
fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from(config.level).into())
        .from_env_lossy()
}
