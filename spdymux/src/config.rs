//! Multiplexer configuration.
//!
//! Precedence, lowest to highest:
//! 1. Default values
//! 2. Configuration file (TOML)
//! 3. Environment variables (`SPDYMUX_` prefix, `__` between sections)
//!
//! # Example
//!
//! ```toml
//! [session]
//! max_concurrent_streams = 256
//! reply_timeout_ms = 5000
//!
//! [logging]
//! level = "debug"
//! json_format = true
//! ```

use anyhow::{Context, Result};
use config::Config as ConfigLoader;
use serde::{Deserialize, Serialize};
use spdymux_proto::Priority;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    /// Per-session stream limits and timeouts
    pub session: SessionConfig,

    /// Logging output
    pub logging: LoggingConfig,
}

impl MuxConfig {
    /// Load configuration from `path`, then apply environment overrides.
    ///
    /// A missing file is not an error: defaults are used and a warning is
    /// logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, an override
    /// has the wrong type, or validation fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::load_file(path.as_ref())?;

        let env = ConfigLoader::builder()
            .add_source(
                config::Environment::with_prefix("SPDYMUX")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .context("Failed to load environment variables")?;
        config.apply_overrides(&env)?;

        config.check()?;
        Ok(config)
    }

    /// Parse and validate an in-memory TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).context("Failed to parse TOML config")?;
        config.check()?;
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(
                config_path = %path.display(),
                "Configuration file not found, using defaults"
            );
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))
    }

    /// Apply known keys from an override source.
    ///
    /// Examples (environment):
    /// - `SPDYMUX_SESSION__MAX_CONCURRENT_STREAMS=64`
    /// - `SPDYMUX_LOGGING__LEVEL=debug`
    fn apply_overrides(&mut self, source: &ConfigLoader) -> Result<()> {
        if let Ok(max) = source.get_int("session.max_concurrent_streams") {
            self.session.max_concurrent_streams = usize::try_from(max)
                .with_context(|| format!("Invalid session.max_concurrent_streams: {}", max))?;
        }
        if let Ok(priority) = source.get_int("session.default_priority") {
            self.session.default_priority = u8::try_from(priority)
                .with_context(|| format!("Invalid session.default_priority: {}", priority))?;
        }
        if let Ok(timeout) = source.get_int("session.reply_timeout_ms") {
            self.session.reply_timeout_ms = u64::try_from(timeout)
                .with_context(|| format!("Invalid session.reply_timeout_ms: {}", timeout))?;
        }
        if let Ok(level) = source.get_string("logging.level") {
            match level.parse() {
                Ok(level) => self.logging.level = level,
                Err(err) => tracing::warn!(%err, "Invalid log level override, ignoring"),
            }
        }
        if let Ok(json) = source.get_bool("logging.json_format") {
            self.logging.json_format = json;
        }
        if let Ok(file_line) = source.get_bool("logging.include_file_line") {
            self.logging.include_file_line = file_line;
        }
        Ok(())
    }

    /// Validate every section, collecting all problems.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Err(e) = self.session.validate() {
            errors.extend(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn check(&self) -> Result<()> {
        self.validate().map_err(|errors| {
            anyhow::anyhow!("Configuration validation failed:\n{}", errors.join("\n"))
        })
    }
}

/// Per-session settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum number of registered streams before inbound SYN_STREAMs
    /// are refused.
    ///
    /// **Default:** `1000`
    pub max_concurrent_streams: usize,

    /// Priority announced for locally opened streams (0 = highest, 7 = lowest).
    ///
    /// **Default:** `7`
    pub default_priority: u8,

    /// Reply timeout used by `Session::open_and_wait`, in milliseconds.
    /// Zero waits forever.
    ///
    /// **Default:** `0`
    pub reply_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_streams: 1000,
            default_priority: Priority::LOWEST.value(),
            reply_timeout_ms: 0,
        }
    }
}

impl SessionConfig {
    /// Validate session settings.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.max_concurrent_streams == 0 {
            errors.push("session.max_concurrent_streams must be > 0".to_string());
        }

        if Priority::new(self.default_priority).is_err() {
            errors.push(format!(
                "session.default_priority must be between {} and {} (got {})",
                Priority::HIGHEST.value(),
                Priority::LOWEST.value(),
                self.default_priority
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Reply timeout as a duration (zero = wait forever)
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level when `RUST_LOG` is unset.
    ///
    /// **Default:** `info`
    pub level: LogLevel,

    /// Emit JSON lines instead of human-readable output.
    ///
    /// **Default:** `false`
    pub json_format: bool,

    /// Include source file and line number in logs.
    ///
    /// **Default:** `false`
    pub include_file_line: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json_format: false,
            include_file_line: false,
        }
    }
}

/// Minimum level for the default log filter.
///
/// Accepts `warning` as well as `warn`, in any case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

impl LogLevel {
    const ALL: [LogLevel; 5] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
    ];
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl From<LogLevel> for tracing::level_filters::LevelFilter {
    fn from(level: LogLevel) -> Self {
        tracing::Level::from(level).into()
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("warning") {
            return Ok(LogLevel::Warn);
        }
        let parsed: tracing::Level = s
            .parse()
            .map_err(|_| format!("unknown log level {:?}", s))?;
        Self::ALL
            .into_iter()
            .find(|level| tracing::Level::from(*level) == parsed)
            .ok_or_else(|| format!("unknown log level {:?}", s))
    }
}
