//! Layered configuration loading.
//!
//! Layers apply in call order; each one overrides only the keys it sets:
//!
//! 1. a preset (`with_defaults`, `with_development`, `with_production`)
//! 2. files or strings (TOML or JSON)
//! 3. environment variables `PREFIX__SECTION__KEY`, applied by `load`

use std::env;
use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::{ConfigError, TrellisConfig};

/// Builds a [`TrellisConfig`] from layered sources.
///
/// # Example
///
/// ```
/// use trellis_config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_development()
///     .with_string("[server]\nhttp_addr = \"127.0.0.1:3000\"", "toml")
///     .unwrap()
///     .load()
///     .unwrap();
///
/// assert_eq!(config.server.http_addr, "127.0.0.1:3000");
/// assert!(config.dispatch.development);
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: TrellisConfig,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Starts from the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets to the defaults.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = TrellisConfig::default();
        self
    }

    /// Resets to the development preset.
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = TrellisConfig::development();
        self
    }

    /// Resets to the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = TrellisConfig::production();
        self
    }

    /// Layers a `.toml` or `.json` file.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing, unreadable, malformed or names an unknown key.
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound { path: path.to_path_buf() });
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.display().to_string()))?;
        self.with_string(&content, format)
    }

    /// Layers a file if it exists.
    ///
    /// # Errors
    ///
    /// Fails if the file exists but does not load.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Layers configuration text in `format` (`toml` or `json`).
    ///
    /// # Errors
    ///
    /// Fails on malformed text, an unknown format or an unknown key.
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let layer: Value = match format.to_ascii_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };

        let mut merged = serde_json::to_value(&self.config)?;
        merge(&mut merged, layer);
        self.config = serde_json::from_value(merged)?;
        Ok(self)
    }

    /// Enables environment overrides under `prefix`.
    ///
    /// `APP__SERVER__HTTP_ADDR=0.0.0.0:9000` sets `server.http_addr` for prefix `APP`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_ascii_uppercase());
        self
    }

    /// Loads `.env` into the process environment, if present.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        let _ = dotenvy::dotenv();
        self
    }

    /// Applies environment overrides and validates.
    ///
    /// # Errors
    ///
    /// Fails on an unparseable override or an invalid final value.
    pub fn load(mut self) -> Result<TrellisConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env(&prefix, env::vars())?;
        }
        self.config.validate()?;
        Ok(self.config)
    }

    /// Returns the configuration without environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> TrellisConfig {
        self.config
    }

    fn apply_env<I>(&mut self, prefix: &str, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let marker = format!("{prefix}__");
        for (key, value) in vars {
            if let Some(path) = key.strip_prefix(&marker) {
                self.apply_env_var(&key, path, &value)?;
            }
        }
        Ok(())
    }

    fn apply_env_var(&mut self, var: &str, path: &str, value: &str) -> Result<(), ConfigError> {
        let server = &mut self.config.server;
        let dispatch = &mut self.config.dispatch;
        let logging = &mut self.config.logging;

        match path.split("__").collect::<Vec<_>>().as_slice() {
            ["SERVER", "HTTP_ADDR"] => server.http_addr = value.to_string(),
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => server.shutdown_timeout_secs = parse_number(var, value)?,
            ["SERVER", "REQUEST_TIMEOUT_MS"] => {
                server.request_timeout_ms = if value.is_empty() || value.eq_ignore_ascii_case("none") {
                    None
                } else {
                    Some(parse_number(var, value)?)
                };
            }
            ["SERVER", "MAX_BODY_BYTES"] => server.max_body_bytes = parse_number(var, value)?,
            ["SERVER", "KEEP_ALIVE"] => server.keep_alive = parse_bool(var, value)?,

            ["DISPATCH", "DEVELOPMENT"] => dispatch.development = parse_bool(var, value)?,
            ["DISPATCH", "CLASS_TRANSFORMER"] => dispatch.class_transformer = parse_bool(var, value)?,
            ["DISPATCH", "ROUTE_PREFIX"] => dispatch.route_prefix = value.to_string(),
            ["DISPATCH", "NULL_RESULT_CODE"] => dispatch.null_result_code = parse_code(var, value)?,
            ["DISPATCH", "UNDEFINED_RESULT_CODE"] => dispatch.undefined_result_code = parse_code(var, value)?,
            ["DISPATCH", "PARAMS_REQUIRED"] => dispatch.params_required = parse_bool(var, value)?,

            ["LOGGING", "LEVEL"] => logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                logging.format = value
                    .parse()
                    .map_err(|_| ConfigError::env(var, "expected 'json', 'pretty' or 'compact'"))?;
            }
            ["LOGGING", "ANSI"] => logging.ansi = parse_bool(var, value)?,
            ["LOGGING", "SPAN_EVENTS"] => logging.span_events = parse_bool(var, value)?,
            ["LOGGING", "INCLUDE_TARGET"] => logging.include_target = parse_bool(var, value)?,

            _ => return Err(ConfigError::env(var, "unknown configuration key")),
        }
        Ok(())
    }
}

/// Deep-merges `layer` into `base`; objects merge key by key, anything else replaces.
fn merge(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::env(var, "expected boolean")),
    }
}

fn parse_number<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::env(var, "expected integer"))
}

fn parse_code(var: &str, value: &str) -> Result<Option<u16>, ConfigError> {
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        Ok(None)
    } else {
        parse_number(var, value).map(Some)
    }
}
