//! Configuration validation.
//! - Service settings: every issue is collected into one `Vec<String>`
//! - Provider records: checked one at a time, first missing field wins,
//!   producing the typed [`ProviderConfig`] the adapters are built from

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use tracing::{error, info};

use crate::config::providers::{
    GoogleConfig, MicrosoftConfig, ProviderConfig, ProviderType, RancherConfig, RawProviderConfig,
};
use crate::config::settings::{ServiceConfig, SettingsConfig};
use crate::observability::metrics::get_metrics;
use crate::utils::constants::DEFAULT_UPSTREAM_TIMEOUT_SECS;

/// Public entrypoint: returns Ok(()) or Err(Vec<String>) containing all issues.
pub async fn validate_service_config(cfg: &ServiceConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();

    validate_settings(&cfg.settings, &mut errors);

    for (index, provider) in cfg.providers.iter().enumerate() {
        if provider.name.as_deref().map_or(true, str::is_empty) {
            errors.push(format!("providers[{}]: missing required \"name\"", index));
        }
    }

    if errors.is_empty() {
        info!("config valid");
        Ok(())
    } else {
        error!("configuration validation errors ({}):", errors.len());
        for e in &errors {
            error!(" - {}", e);
        }
        get_metrics().await.config_validation_errors.inc();
        Err(errors)
    }
}

/// SETTINGS VALIDATION
fn validate_settings(settings: &SettingsConfig, errors: &mut Vec<String>) {
    if settings.api_key.trim().is_empty() {
        errors.push("settings.api_key must not be empty".to_string());
    }

    if settings.server.host.is_empty() {
        errors.push(format!(
            "settings.server.host '{}' must be valid",
            settings.server.host
        ));
    }

    if let Some(dir) = &settings.providers_dir {
        if dir.trim().is_empty() {
            errors.push("settings.providers_dir must not be empty when set".to_string());
        }
    }

    let metrics = &settings.metrics;
    if !metrics.path.starts_with('/') {
        errors.push(format!(
            "settings.metrics.path '{}' must start with '/'",
            metrics.path
        ));
    }

    if let Some(logging) = &settings.logging {
        let level = logging.level.to_lowercase();
        if !["trace", "debug", "info", "warn", "error"].contains(&level.as_str()) {
            errors.push(format!(
                "settings.logging.level '{}' must be one of trace, debug, info, warn, error",
                logging.level
            ));
        }
    }
}

/// PROVIDER VALIDATION
///
/// `origin` names where the record came from (a file path, or `providers[i]`).
pub fn validate_provider(raw: RawProviderConfig, origin: &str) -> Result<ProviderConfig> {
    let name = match raw.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_owned(),
        _ => bail!("no \"name\" found in token provider config file {}", origin),
    };

    let type_name = raw
        .provider_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(ProviderType::Google.as_str());
    let provider_type = ProviderType::parse(type_name).ok_or_else(|| {
        anyhow!(
            "unsupported token provider type \"{}\" in file {}",
            type_name,
            origin
        )
    })?;

    let timeout = Duration::from_secs(raw.timeout_seconds.unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS));
    let required = |field: &'static str, value: Option<String>| -> Result<String> {
        value.filter(|v| !v.is_empty()).ok_or_else(|| {
            anyhow!(
                "{} token provider file {} missing required \"{}\" attribute",
                provider_type,
                name,
                field
            )
        })
    };

    let config = match provider_type {
        ProviderType::Google => ProviderConfig::Google(GoogleConfig {
            name: name.clone(),
            timeout,
        }),
        ProviderType::Microsoft => ProviderConfig::Microsoft(MicrosoftConfig {
            client_id: required("clientId", raw.client_id)?,
            client_secret: required("clientSecret", raw.client_secret)?,
            resource: required("resource", raw.resource)?,
            login_endpoint: required("loginEndpoint", raw.login_endpoint)?,
            name: name.clone(),
            timeout,
        }),
        ProviderType::Rancher => ProviderConfig::Rancher(RancherConfig {
            username: required("username", raw.username)?,
            password: required("password", raw.password)?,
            url: required("url", raw.url)?,
            ca_certs: raw.ca_certs.filter(|pem| !pem.trim().is_empty()),
            short_expiration: raw.short_expiration.map(Duration::from_secs),
            name: name.clone(),
            timeout,
        }),
    };

    Ok(config)
}

/// Rejects names that collide case-insensitively.
pub fn ensure_unique_names(configs: &[ProviderConfig]) -> Result<()> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    for cfg in configs {
        if seen.insert(cfg.name().to_lowercase(), cfg.name()).is_some() {
            bail!("duplicate token provider listed: {}", cfg.name());
        }
    }
    Ok(())
}
