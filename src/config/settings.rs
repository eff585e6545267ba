use serde::Deserialize;

use crate::config::providers::RawProviderConfig;
use crate::utils::constants::{DEFAULT_SERVER_HOST, DEFAULT_SERVER_PORT};

/// ================================
/// Full service configuration
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub settings: SettingsConfig,
    /// Providers declared inline, in addition to `settings.providers_dir`.
    #[serde(default)]
    pub providers: Vec<RawProviderConfig>,
}

/// ================================
/// Global service-wide settings
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct SettingsConfig {
    /// Secret every caller must present in the `Api-Key` header.
    pub api_key: String,
    /// Directory holding one provider file per configured provider.
    pub providers_dir: Option<String>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_path")]
    pub path: String,
    #[serde(default)]
    pub is_enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            path: default_metrics_path(),
            is_enabled: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// ================================
/// Logging
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String, // allowed: trace, debug, info, warn, error
    pub format: LogFormat,
}

impl LoggingConfig {
    pub fn new(level: String, format: LogFormat) -> Self {
        Self { level, format }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_host() -> String {
    DEFAULT_SERVER_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_SERVER_PORT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_settings_get_defaults() {
        let cfg: ServiceConfig = serde_yaml::from_str(
            r#"
settings:
  api_key: secret
"#,
        )
        .unwrap();

        assert_eq!(cfg.settings.server.host, "0.0.0.0");
        assert_eq!(cfg.settings.server.port, 1982);
        assert_eq!(cfg.settings.metrics.path, "/metrics");
        assert!(!cfg.settings.metrics.is_enabled);
        assert!(cfg.settings.providers_dir.is_none());
        assert!(cfg.providers.is_empty());
    }

    #[test]
    fn inline_providers_are_read() {
        let cfg: ServiceConfig = serde_yaml::from_str(
            r#"
settings:
  api_key: secret
  logging:
    level: debug
    format: json
providers:
  - type: rancher
    name: rancher-np
    url: https://rancher.example.com/v3-public/localProviders/local?action=login
    username: svc
    password: pw
    shortExpiration: 300
"#,
        )
        .unwrap();

        assert_eq!(cfg.providers.len(), 1);
        assert_eq!(cfg.providers[0].short_expiration, Some(300));
        let logging = cfg.settings.logging.unwrap();
        assert_eq!(logging.format, LogFormat::Json);
        assert_eq!(logging.level, "debug");
    }
}
