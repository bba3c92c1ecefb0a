//! Logging configuration and initialization.

use serde::{Deserialize, Serialize};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

/// Logging configuration. `RUST_LOG` overrides `level` when set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`.
    pub format: String,
}

impl LoggingConfig {
    /// Install the global tracing subscriber. Logs go to stderr so reports on
    /// stdout stay machine-readable.
    ///
    /// Returns `false` when a subscriber was already installed (tests,
    /// embedding); that subscriber stays in place.
    pub fn init(&self) -> bool {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        let installed = match self.format.as_str() {
            "json" => fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init(),
            _ => fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init(),
        };
        match installed {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, format = %self.format, "Keeping existing tracing subscriber");
                false
            }
        }
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::ConfigError> {
        match self.format.as_str() {
            "pretty" | "json" => Ok(()),
            other => Err(crate::error::ConfigError::InvalidValue {
                field: "logging.format",
                reason: format!("unknown format {other:?}, expected pretty or json"),
            }),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_keeps_the_first_subscriber() {
        let config = LoggingConfig::default();
        config.init();
        assert!(!config.init());
    }
}
