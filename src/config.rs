use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::monitor::service::Severity;

pub const DEFAULT_ERROR_ICON: &str =
    "https://cdn1.iconfinder.com/data/icons/toolbar-std/512/error-512.png";
pub const DEFAULT_WARNING_ICON: &str = "https://cdn2.iconfinder.com/data/icons/color-svg-vector-icons-2/512/warning_alert_attention_search-512.png";
pub const DEFAULT_INFO_ICON: &str = "https://upload.wikimedia.org/wikipedia/commons/thumb/2/25/Info_icon-72a7cf.svg/1024px-Info_icon-72a7cf.svg.png";
pub const DEFAULT_USER_AGENT: &str = "Monitor/1.2 (Service status monitor)";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("{0} is required")]
    Missing(&'static str),
}

/// Where the list of monitored services comes from.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegistryKind {
    Warehouse,
    #[default]
    Static,
}

/// One entry of the in-process service mapping used by the standalone variant.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct StaticServiceConfig {
    pub name: String,
    pub kind: String,
    pub target: String,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub severity: Severity,
}

/// Icons used in the alert payload, keyed by the worst failing severity.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct AlertIcons {
    #[serde(default = "default_error_icon")]
    pub error: String,
    #[serde(default = "default_warning_icon")]
    pub warning: String,
    #[serde(default = "default_info_icon")]
    pub info: String,
}

impl Default for AlertIcons {
    fn default() -> Self {
        Self {
            error: default_error_icon(),
            warning: default_warning_icon(),
            info: default_info_icon(),
        }
    }
}

impl AlertIcons {
    pub fn for_severity(&self, severity: Severity) -> &str {
        match severity {
            Severity::Error => &self.error,
            Severity::Warning => &self.warning,
            Severity::Info => &self.info,
        }
    }
}

fn default_error_icon() -> String {
    DEFAULT_ERROR_ICON.to_string()
}

fn default_warning_icon() -> String {
    DEFAULT_WARNING_ICON.to_string()
}

fn default_info_icon() -> String {
    DEFAULT_INFO_ICON.to_string()
}

/// Configuration of the `monitor` binary, built once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub webhook_url: String,
    pub icons: AlertIcons,
    pub user_agent: String,
    pub registry: RegistryKind,
    pub database_url: Option<String>,
    pub tcp_timeout_secs: u64,
    pub http_timeout_secs: u64,
    pub ping_timeout_secs: u64,
    pub notify_timeout_secs: u64,
    pub services: Vec<StaticServiceConfig>,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialMonitorConfig {
    webhook_url: Option<String>,
    #[serde(default)]
    icons: Option<AlertIcons>,
    user_agent: Option<String>,
    registry: Option<RegistryKind>,
    database_url: Option<String>,
    tcp_timeout_secs: Option<u64>,
    http_timeout_secs: Option<u64>,
    ping_timeout_secs: Option<u64>,
    notify_timeout_secs: Option<u64>,
    #[serde(default)]
    services: Vec<StaticServiceConfig>,
}

const ENV_PREFIX: &str = "POLLWATCH_";

impl PartialMonitorConfig {
    /// Scalar keys map to `POLLWATCH_<KEY>`; `icons` and `services` are file-only.
    /// The bare `DATABASE_URL` is honoured when the prefixed one is unset.
    fn from_vars(vars: Vec<(String, String)>) -> Result<Self, ConfigError> {
        let plain_database_url = vars
            .iter()
            .find(|(key, _)| key == "DATABASE_URL")
            .map(|(_, value)| value.clone());
        let mut env_config: PartialMonitorConfig = envy::prefixed(ENV_PREFIX).from_iter(vars)?;
        env_config.database_url = env_config.database_url.or(plain_database_url);
        Ok(env_config)
    }
}

impl MonitorConfig {
    /// Loads the config file (when given and present), then applies
    /// environment overrides on top of it.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::load_with_vars(config_path, env::vars().collect())
    }

    /// Same as [`MonitorConfig::load`] with an explicit environment.
    pub fn load_with_vars(
        config_path: Option<&str>,
        vars: Vec<(String, String)>,
    ) -> Result<Self, ConfigError> {
        let file_config = match config_path {
            Some(path_str) if Path::new(path_str).exists() => {
                let contents = fs::read_to_string(path_str).map_err(|source| ConfigError::Read {
                    path: path_str.to_string(),
                    source,
                })?;
                info!(path = %path_str, "Loaded monitor config file.");
                Self::parse_partial(&contents, path_str)?
            }
            _ => PartialMonitorConfig::default(),
        };

        let env_config = PartialMonitorConfig::from_vars(vars)?;
        Self::merge(env_config, file_config)
    }

    /// Parses a TOML document without consulting the environment.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let file_config = Self::parse_partial(contents, "<inline>")?;
        Self::merge(PartialMonitorConfig::default(), file_config)
    }

    fn parse_partial(contents: &str, path: &str) -> Result<PartialMonitorConfig, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    fn merge(
        env_config: PartialMonitorConfig,
        file_config: PartialMonitorConfig,
    ) -> Result<Self, ConfigError> {
        let config = MonitorConfig {
            webhook_url: env_config
                .webhook_url
                .or(file_config.webhook_url)
                .ok_or(ConfigError::Missing("webhook_url"))?,
            icons: file_config.icons.unwrap_or_default(),
            user_agent: env_config
                .user_agent
                .or(file_config.user_agent)
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            registry: env_config
                .registry
                .or(file_config.registry)
                .unwrap_or_default(),
            database_url: env_config.database_url.or(file_config.database_url),
            tcp_timeout_secs: env_config
                .tcp_timeout_secs
                .or(file_config.tcp_timeout_secs)
                .unwrap_or(2),
            http_timeout_secs: env_config
                .http_timeout_secs
                .or(file_config.http_timeout_secs)
                .unwrap_or(5),
            ping_timeout_secs: env_config
                .ping_timeout_secs
                .or(file_config.ping_timeout_secs)
                .unwrap_or(2),
            notify_timeout_secs: env_config
                .notify_timeout_secs
                .or(file_config.notify_timeout_secs)
                .unwrap_or(10),
            services: file_config.services,
        };

        if config.registry == RegistryKind::Warehouse && config.database_url.is_none() {
            return Err(ConfigError::Missing("database_url"));
        }

        Ok(config)
    }
}
