//! Configuration sections.

use std::time::Duration;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use trellis_dispatch::{DriverOptionsBuilder, ResultDefaults};
use trellis_server::{ServerConfig, DEFAULT_HTTP_ADDR, DEFAULT_MAX_BODY_BYTES, DEFAULT_SHUTDOWN_TIMEOUT_SECS};

use crate::ConfigError;

/// The `[server]` section.
///
/// # Example
///
/// ```
/// use trellis_config::ServerSection;
///
/// let section = ServerSection {
///     http_addr: "127.0.0.1:3000".to_string(),
///     request_timeout_ms: Some(5_000),
///     ..ServerSection::default()
/// };
/// let config = section.to_server_config();
///
/// assert_eq!(config.http_addr(), "127.0.0.1:3000");
/// assert_eq!(config.request_timeout(), Some(std::time::Duration::from_secs(5)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ServerSection {
    /// Bind address.
    pub http_addr: String,
    /// Graceful shutdown timeout in seconds.
    pub shutdown_timeout_secs: u64,
    /// Per-request timeout in milliseconds. Unset means no timeout.
    pub request_timeout_ms: Option<u64>,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    /// HTTP/1.1 keep-alive.
    pub keep_alive: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            request_timeout_ms: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            keep_alive: true,
        }
    }
}

impl ServerSection {
    /// Converts to the hyper driver's settings.
    pub fn to_server_config(&self) -> ServerConfig {
        ServerConfig::builder()
            .http_addr(self.http_addr.clone())
            .shutdown_timeout(Duration::from_secs(self.shutdown_timeout_secs))
            .request_timeout(self.request_timeout_ms.map(Duration::from_millis))
            .max_body_bytes(self.max_body_bytes)
            .keep_alive(self.keep_alive)
            .build()
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.http_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.http_addr),
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::invalid_value("server.max_body_bytes", "must be greater than 0"));
        }
        if self.request_timeout_ms == Some(0) {
            return Err(ConfigError::invalid_value(
                "server.request_timeout_ms",
                "must be greater than 0 when set",
            ));
        }
        Ok(())
    }
}

/// The `[dispatch]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DispatchSection {
    /// Include stacks in error bodies.
    pub development: bool,
    /// Project object results through the transformer.
    pub class_transformer: bool,
    /// Prefix joined onto every route.
    pub route_prefix: String,
    /// Status for `null` results.
    pub null_result_code: Option<u16>,
    /// Status for `undefined` results.
    pub undefined_result_code: Option<u16>,
    /// Whether parameters are required unless they say otherwise.
    pub params_required: bool,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            development: false,
            class_transformer: true,
            route_prefix: String::new(),
            null_result_code: None,
            undefined_result_code: None,
            params_required: false,
        }
    }
}

impl DispatchSection {
    /// Result defaults for driver options.
    ///
    /// # Errors
    ///
    /// Fails if a result code is not a valid HTTP status.
    pub fn result_defaults(&self) -> Result<ResultDefaults, ConfigError> {
        Ok(ResultDefaults {
            null_result_code: status("dispatch.null_result_code", self.null_result_code)?,
            undefined_result_code: status("dispatch.undefined_result_code", self.undefined_result_code)?,
            params_required: self.params_required,
        })
    }

    /// Applies this section to an options builder.
    ///
    /// # Errors
    ///
    /// Fails if a result code is not a valid HTTP status.
    pub fn apply(&self, builder: DriverOptionsBuilder) -> Result<DriverOptionsBuilder, ConfigError> {
        Ok(builder
            .development(self.development)
            .class_transformer(self.class_transformer)
            .route_prefix(self.route_prefix.clone())
            .defaults(self.result_defaults()?))
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        self.result_defaults().map(|_| ())
    }
}

fn status(field: &str, code: Option<u16>) -> Result<Option<StatusCode>, ConfigError> {
    code.map(|code| {
        StatusCode::from_u16(code).map_err(|_| ConfigError::invalid_value(field, format!("invalid status code {code}")))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults_convert() {
        let config = ServerSection::default().to_server_config();
        assert_eq!(config.http_addr(), DEFAULT_HTTP_ADDR);
        assert_eq!(config.request_timeout(), None);
        assert!(config.keep_alive());
    }

    #[test]
    fn test_server_validation() {
        let bad = ServerSection {
            http_addr: "localhost".to_string(),
            ..ServerSection::default()
        };
        assert!(matches!(bad.validate(), Err(ConfigError::InvalidValue { .. })));

        let zero = ServerSection {
            request_timeout_ms: Some(0),
            ..ServerSection::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_result_defaults() {
        let section = DispatchSection {
            null_result_code: Some(404),
            params_required: true,
            ..DispatchSection::default()
        };
        let defaults = section.result_defaults().unwrap();
        assert_eq!(defaults.null_result_code, Some(StatusCode::NOT_FOUND));
        assert_eq!(defaults.undefined_result_code, None);
        assert!(defaults.params_required);
    }

    #[test]
    fn test_invalid_status_code() {
        let section = DispatchSection {
            undefined_result_code: Some(42),
            ..DispatchSection::default()
        };
        let err = section.validate().unwrap_err();
        assert!(err.to_string().contains("dispatch.undefined_result_code"));
    }
}
