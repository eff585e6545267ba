use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use tracing::{debug, error, info};

use crate::config::proc_validator::{self, ensure_unique_names, validate_provider};
use crate::config::providers::{ProviderConfig, RawProviderConfig};
use crate::config::settings::{LogFormat, LoggingConfig, ServiceConfig};
use crate::observability::metrics::get_metrics;
use crate::utils::constants::PROVIDER_FILE_EXTENSIONS;

/// Load and validate config from YAML file
pub async fn file_to_config(path: &Path) -> Result<ServiceConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading config file {}", path.display()))?;

    let expanded = expand_env_vars(&content);
    parse_config(expanded).await
}

pub async fn parse_config(content: String) -> Result<ServiceConfig> {
    let metrics = get_metrics().await;
    let mut service_config: ServiceConfig = serde_yaml::from_str(&content).inspect_err(|e| {
        error!("parse config error: {}", e);
        metrics.parse_failures.inc();
    })?;

    // Apply defaults
    if service_config.settings.logging.is_none() {
        service_config.settings.logging = Some(LoggingConfig::new(
            "info".to_owned(),
            LogFormat::Compact,
        ));
    }

    debug!("validation config ...");
    proc_validator::validate_service_config(&service_config)
        .await
        .map_err(|errors| {
            anyhow!(
                "config is not valid, total errors: {}\n{}",
                errors.len(),
                errors.join("\n")
            )
        })?;

    Ok(service_config)
}

/// All providers of a deployment: those in `settings.providers_dir` followed by
/// the inline `providers` list. Names must be unique across both.
pub async fn collect_providers(service_config: &ServiceConfig) -> Result<Vec<ProviderConfig>> {
    let mut providers = match &service_config.settings.providers_dir {
        Some(dir) => load_providers_dir(Path::new(dir)).await?,
        None => Vec::new(),
    };

    for (index, raw) in service_config.providers.iter().enumerate() {
        providers.push(validate_provider(raw.clone(), &format!("providers[{}]", index))?);
    }

    ensure_unique_names(&providers)?;
    Ok(providers)
}

/// Reads every provider file (`*.json`, `*.yaml`, `*.yml`) in `dir`.
pub async fn load_providers_dir(dir: &Path) -> Result<Vec<ProviderConfig>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("open {}", dir.display()))?;

    let mut files: Vec<PathBuf> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() && is_provider_file(&path) {
            files.push(path);
        }
    }
    // read_dir order is platform dependent
    files.sort();

    if files.is_empty() {
        bail!("no token providers found in directory: {}", dir.display());
    }

    let mut providers = Vec::with_capacity(files.len());
    for path in files {
        let raw = read_provider_file(&path).await?;
        let provider = validate_provider(raw, &path.display().to_string())?;
        info!(
            provider = provider.name(),
            provider_type = %provider.provider_type(),
            file = %path.display(),
            "loaded token provider"
        );
        providers.push(provider);
        ensure_unique_names(&providers)?;
    }

    Ok(providers)
}

async fn read_provider_file(path: &Path) -> Result<RawProviderConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading token provider file {}", path.display()))?;
    let expanded = expand_env_vars(&content);

    let raw = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&expanded)
            .map_err(|e| anyhow!("{}: {}", path.display(), e))?,
        _ => serde_yaml::from_str(&expanded).map_err(|e| anyhow!("{}: {}", path.display(), e))?,
    };
    Ok(raw)
}

fn is_provider_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| PROVIDER_FILE_EXTENSIONS.contains(&ext))
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{(\w+)(?::([^\}]+))?\}").expect("env var pattern is a valid regex")
    })
}

/// Replaces `${VAR}` and `${VAR:default}` with the environment value.
pub fn expand_env_vars(input: &str) -> String {
    env_var_pattern()
        .replace_all(input, |caps: &regex::Captures| {
            let var = &caps[1];
            let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var).unwrap_or_else(|_| default.to_string())
        })
        .to_string()
}
