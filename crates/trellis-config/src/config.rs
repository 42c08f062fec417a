//! The root configuration type.

use serde::{Deserialize, Serialize};
use trellis_telemetry::{LogConfig, LogFormat};

use crate::{ConfigError, DispatchSection, ServerSection};

/// Complete application configuration.
///
/// ```
/// use trellis_config::TrellisConfig;
///
/// let config = TrellisConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
/// assert!(config.dispatch.class_transformer);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TrellisConfig {
    /// `[server]`
    pub server: ServerSection,
    /// `[dispatch]`
    pub dispatch: DispatchSection,
    /// `[logging]`
    pub logging: LogConfig,
}

impl TrellisConfig {
    /// Local development: loopback address, error stacks, pretty debug logs.
    #[must_use]
    pub fn development() -> Self {
        Self {
            server: ServerSection {
                http_addr: "127.0.0.1:8080".to_string(),
                shutdown_timeout_secs: 5,
                ..ServerSection::default()
            },
            dispatch: DispatchSection {
                development: true,
                ..DispatchSection::default()
            },
            logging: LogConfig::development(),
        }
    }

    /// Production: all interfaces, no stacks, JSON logs.
    #[must_use]
    pub fn production() -> Self {
        Self {
            server: ServerSection::default(),
            dispatch: DispatchSection::default(),
            logging: LogConfig {
                format: LogFormat::Json,
                ..LogConfig::production()
            },
        }
    }

    /// Checks every section.
    ///
    /// # Errors
    ///
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.dispatch.validate()?;
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid_value("logging.level", "must not be empty"));
        }
        Ok(())
    }
}
