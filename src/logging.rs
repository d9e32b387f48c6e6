//! Diagnostic logging.
//!
//! Logs go to stderr so that reports written to stdout stay machine-readable.

use std::io;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    pub enable_ansi: bool,
    /// Overrides both `RUST_LOG` and `level` when set.
    pub env_filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            enable_ansi: false,
            env_filter: None,
        }
    }
}

impl LoggingConfig {
    /// Maps repeated `-v` flags onto a level.
    pub fn from_verbosity(verbosity: u8) -> Self {
        let level = match verbosity {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };
        Self {
            level,
            ..Self::default()
        }
    }

    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Installs the global subscriber. `RUST_LOG` wins over the configured level.
    pub fn init(self) -> Result<()> {
        let env_filter = match &self.env_filter {
            Some(filter) => EnvFilter::try_new(filter)
                .map_err(|err| Error::Logging(format!("invalid filter '{}': {}", filter, err)))?,
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new(format!(
                    "{}={}",
                    env!("CARGO_PKG_NAME").replace('-', "_"),
                    self.level
                ))
            }),
        };
        let layer = fmt::layer()
            .with_writer(io::stderr)
            .with_ansi(self.enable_ansi)
            .with_target(false);
        Registry::default()
            .with(env_filter)
            .with(layer)
            .try_init()
            .map_err(|err| Error::Logging(format!("failed to initialise: {}", err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(LoggingConfig::from_verbosity(0).level, Level::WARN);
        assert_eq!(LoggingConfig::from_verbosity(1).level, Level::INFO);
        assert_eq!(LoggingConfig::from_verbosity(2).level, Level::DEBUG);
        assert_eq!(LoggingConfig::from_verbosity(7).level, Level::TRACE);
    }

    #[test]
    fn bad_filter_is_a_logging_error() {
        let err = LoggingConfig::default()
            .with_env_filter("desk_sim=loud")
            .init()
            .unwrap_err();
        assert!(matches!(err, Error::Logging(_)));
        assert!(!err.is_configuration());
    }
}
