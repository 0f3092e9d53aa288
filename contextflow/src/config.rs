//! Configuration for context slots, frames and logging.

use crate::errors::{ContextError, ContextResult};
use crate::frame::{FrameEventSink, LoggingFrameSink, NoOpFrameSink};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default limit on frames entered at once on one slot.
pub const DEFAULT_MAX_FRAME_DEPTH: usize = 1024;

/// Environment variable overriding [`ContextConfig::max_frame_depth`].
pub const ENV_MAX_FRAME_DEPTH: &str = "CONTEXTFLOW_MAX_FRAME_DEPTH";
/// Environment variable overriding [`ContextConfig::frame_events`].
pub const ENV_FRAME_EVENTS: &str = "CONTEXTFLOW_FRAME_EVENTS";
/// Environment variable overriding [`LoggingConfig::level`].
pub const ENV_LOG: &str = "CONTEXTFLOW_LOG";
/// Environment variable overriding [`LoggingConfig::format`].
pub const ENV_LOG_FORMAT: &str = "CONTEXTFLOW_LOG_FORMAT";

/// What frames do with their lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameEventMode {
    /// Events are discarded.
    #[default]
    Off,
    /// Events are logged through `tracing` at debug level.
    Log,
}

impl std::str::FromStr for FrameEventMode {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" | "" => Ok(Self::Off),
            "log" | "on" => Ok(Self::Log),
            other => Err(ContextError::Config(format!(
                "unknown frame event mode '{other}' (expected 'off' or 'log')"
            ))),
        }
    }
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable text.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(ContextError::Config(format!(
                "unknown log format '{other}' (expected 'text' or 'json')"
            ))),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive: a level (`info`) or a full `EnvFilter` expression.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Configuration for contextflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Maximum number of frames entered at once on one slot.
    #[serde(default = "default_max_frame_depth")]
    pub max_frame_depth: usize,
    /// What frames do with lifecycle events.
    #[serde(default)]
    pub frame_events: FrameEventMode,
    /// Logging setup.
    #[serde(default)]
    pub logging: LoggingConfig,
}

const fn default_max_frame_depth() -> usize {
    DEFAULT_MAX_FRAME_DEPTH
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_frame_depth: default_max_frame_depth(),
            frame_events: FrameEventMode::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ContextConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the frame nesting limit.
    #[must_use]
    pub const fn with_max_frame_depth(mut self, limit: usize) -> Self {
        self.max_frame_depth = limit;
        self
    }

    /// Sets the frame event mode.
    #[must_use]
    pub const fn with_frame_events(mut self, mode: FrameEventMode) -> Self {
        self.frame_events = mode;
        self
    }

    /// Sets the logging configuration.
    #[must_use]
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Loads defaults overridden by `CONTEXTFLOW_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::Config` if a variable holds an unparsable value.
    pub fn from_env() -> ContextResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads defaults overridden by whatever `lookup` returns per variable.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::Config` if a variable holds an unparsable value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ContextResult<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_MAX_FRAME_DEPTH) {
            config.max_frame_depth = raw.trim().parse().map_err(|e| {
                ContextError::Config(format!("{ENV_MAX_FRAME_DEPTH}='{raw}': {e}"))
            })?;
        }
        if let Some(raw) = lookup(ENV_FRAME_EVENTS) {
            config.frame_events = raw.parse()?;
        }
        if let Some(raw) = lookup(ENV_LOG) {
            config.logging.level = raw;
        }
        if let Some(raw) = lookup(ENV_LOG_FORMAT) {
            config.logging.format = raw.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parses a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::Config` for malformed or invalid documents.
    pub fn from_json(json: &str) -> ContextResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ContextError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values that cannot work.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::Config` describing the first problem found.
    pub fn validate(&self) -> ContextResult<()> {
        if self.max_frame_depth == 0 {
            return Err(ContextError::Config(
                "max_frame_depth must be at least 1".to_string(),
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ContextError::Config("logging.level is empty".to_string()));
        }
        Ok(())
    }

    /// Builds the frame event sink selected by `frame_events`.
    #[must_use]
    pub fn event_sink(&self) -> Arc<dyn FrameEventSink> {
        match self.frame_events {
            FrameEventMode::Off => Arc::new(NoOpFrameSink),
            FrameEventMode::Log => Arc::new(LoggingFrameSink::debug()),
        }
    }
}
