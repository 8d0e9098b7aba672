//! Configuration management for Turnstile.
//!
//! Configuration is layered with the `config` crate: built-in defaults,
//! then an optional YAML file, then `TURNSTILE_*` environment variables
//! (nested keys separated by `__`, e.g. `TURNSTILE_SERVER__LISTEN_ADDR`).

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{default_policies, PolicyConfig};

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Which policy guards which route
    #[serde(default)]
    pub routes: RouteConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Path to a YAML file listing policies; replaces `policies` when set
    #[serde(default)]
    pub policies_path: Option<PathBuf>,

    /// Inline policy list
    #[serde(default = "default_policies")]
    pub policies: Vec<PolicyConfig>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            policies_path: None,
            policies: default_policies(),
        }
    }
}

/// Policy name bound to each route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    #[serde(default = "default_list_policy")]
    pub list_people: String,
    #[serde(default = "default_get_policy")]
    pub get_person: String,
    #[serde(default = "default_create_policy")]
    pub create_person: String,
    #[serde(default = "default_write_policy")]
    pub update_person: String,
    #[serde(default = "default_write_policy")]
    pub delete_person: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            list_people: default_list_policy(),
            get_person: default_get_policy(),
            create_person: default_create_policy(),
            update_person: default_write_policy(),
            delete_person: default_write_policy(),
        }
    }
}

fn default_list_policy() -> String {
    "fixed".to_string()
}

fn default_get_policy() -> String {
    "sliding".to_string()
}

fn default_create_policy() -> String {
    "token".to_string()
}

fn default_write_policy() -> String {
    "concurrency".to_string()
}

impl TurnstileConfig {
    /// Load configuration from defaults, an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Yaml));
        }

        builder
            .add_source(
                config::Environment::with_prefix("TURNSTILE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| TurnstileError::Config(e.to_string()))
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| TurnstileError::Config(e.to_string()))
    }

    /// The effective policy list.
    pub fn policies(&self) -> Result<Vec<PolicyConfig>> {
        match &self.rate_limiting.policies_path {
            Some(path) => PolicyConfig::list_from_file(path),
            None => Ok(self.rate_limiting.policies.clone()),
        }
    }
}
