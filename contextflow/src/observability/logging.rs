//! Structured logging setup on top of `tracing-subscriber`.

use crate::config::{LogFormat, LoggingConfig};
use crate::errors::{ContextError, ContextResult};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Builds the log filter.
///
/// `RUST_LOG` wins over the configured level when it is set.
///
/// # Errors
///
/// Returns `ContextError::Config` if the configured directive cannot be parsed.
pub fn build_env_filter(config: &LoggingConfig) -> ContextResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level)
        .map_err(|e| ContextError::Config(format!("invalid log filter '{}': {e}", config.level)))
}

/// Installs the global `tracing` subscriber.
///
/// # Errors
///
/// Returns `ContextError::Config` if the filter is invalid or a global
/// subscriber was already installed.
pub fn init_logging(config: &LoggingConfig) -> ContextResult<()> {
    let filter = build_env_filter(config)?;
    let base = Registry::default().with(filter);

    let installed = match config.format {
        LogFormat::Json => base
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339()),
            )
            .try_init(),
        LogFormat::Text => base
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339()),
            )
            .try_init(),
    };

    installed.map_err(|e| ContextError::Config(format!("failed to install subscriber: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_rejects_garbage() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LoggingConfig {
            level: "contextflow=notalevel".to_string(),
            format: LogFormat::Json,
        };
        assert!(build_env_filter(&config).is_err());
    }

    #[test]
    fn test_filter_accepts_directives() {
        let config = LoggingConfig {
            level: "contextflow=debug,warn".to_string(),
            format: LogFormat::Text,
        };
        assert!(build_env_filter(&config).is_ok());
    }

    #[test]
    fn test_second_init_fails() {
        let config = LoggingConfig::default();
        let _ = init_logging(&config);
        let err = init_logging(&config).unwrap_err();
        assert!(matches!(err, ContextError::Config(_)));
    }
}
