//! Gateway configuration types.
//!
//! Configuration comes from the environment. Every variable is optional and
//! falls back to the default below.
//!
//! | Variable                  | Default          |
//! |---------------------------|------------------|
//! | `LISTEN_ADDR`             | `0.0.0.0:8080`   |
//! | `DATA_DIR`                | `/data/keel`     |
//! | `BUILD_QUEUE_URL`         | unset (no queue) |
//! | `CORS_ORIGINS`            | `*`              |
//! | `MAX_BODY_BYTES`          | `1048576`        |
//! | `REQUEST_TIMEOUT_SECONDS` | `30`             |

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable was set to a value that does not parse.
    #[error("invalid value for {var}: '{value}'")]
    Invalid {
        /// The environment variable.
        var: &'static str,
        /// The value it held.
        value: String,
    },
}

/// Configuration for the gateway service.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0:8080").
    #[serde(default = "GatewayConfig::default_listen_addr")]
    pub listen_addr: String,

    /// Directory holding the `RocksDB` database.
    #[serde(default = "GatewayConfig::default_data_dir")]
    pub data_dir: String,

    /// Base URL of the build queue. Builds are persisted but not dispatched when unset.
    #[serde(default)]
    pub build_queue_url: Option<String>,

    /// Allowed CORS origins.
    #[serde(default = "GatewayConfig::default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    #[serde(default = "GatewayConfig::default_max_body")]
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    #[serde(default = "GatewayConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl GatewayConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:8080".to_string()
    }

    fn default_data_dir() -> String {
        "/data/keel".to_string()
    }

    fn default_cors_origins() -> Vec<String> {
        vec!["*".to_string()]
    }

    const fn default_max_body() -> usize {
        1024 * 1024 // 1 MB
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value.
    ///
    /// Blank values count as unset.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a numeric variable does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let cors_origins = get("CORS_ORIGINS").map_or(defaults.cors_origins, |origins| {
            origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(ToString::to_string)
                .collect()
        });

        Ok(Self {
            listen_addr: get("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            data_dir: get("DATA_DIR").unwrap_or(defaults.data_dir),
            build_queue_url: get("BUILD_QUEUE_URL"),
            cors_origins,
            max_body_bytes: parse_var("MAX_BODY_BYTES", get("MAX_BODY_BYTES"))?
                .unwrap_or(defaults.max_body_bytes),
            request_timeout_seconds: parse_var(
                "REQUEST_TIMEOUT_SECONDS",
                get("REQUEST_TIMEOUT_SECONDS"),
            )?
            .unwrap_or(defaults.request_timeout_seconds),
        })
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

fn parse_var<T: FromStr>(var: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError> {
    value
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { var, value: v })
        })
        .transpose()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            data_dir: Self::default_data_dir(),
            build_queue_url: None,
            cors_origins: Self::default_cors_origins(),
            max_body_bytes: Self::default_max_body(),
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }
}
