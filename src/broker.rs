//! Registry of configured token providers.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::config::providers::{GoogleConfig, ProviderConfig, ProviderType};
use crate::errors::{BrokerError, BrokerResult};
use crate::observability::metrics::get_metrics;
use crate::sources::{build_provider, Provider, Tokenizer};
use crate::utils::constants::DEFAULT_PROVIDER;

#[derive(Debug, Default)]
pub struct Broker {
    providers: HashMap<String, Provider>,
}

impl Broker {
    /// One adapter per config. Google is always served: when no provider is
    /// named `google`, an ambient one is registered under that name.
    pub fn from_configs(configs: &[ProviderConfig]) -> BrokerResult<Self> {
        let mut providers = Vec::with_capacity(configs.len() + 1);
        for cfg in configs {
            providers.push(build_provider(cfg)?);
        }
        if !providers
            .iter()
            .any(|p| p.name().eq_ignore_ascii_case(DEFAULT_PROVIDER))
        {
            debug!("registering default {} token provider", DEFAULT_PROVIDER);
            providers.push(build_provider(&ProviderConfig::Google(GoogleConfig::new(
                DEFAULT_PROVIDER,
            )))?);
        }
        Self::from_providers(providers)
    }

    pub fn from_providers(providers: impl IntoIterator<Item = Provider>) -> BrokerResult<Self> {
        let mut registry = HashMap::new();
        let mut seen = HashSet::new();
        for provider in providers {
            let name = provider.name().to_owned();
            if !seen.insert(name.to_ascii_lowercase()) {
                return Err(BrokerError::Configuration(format!(
                    "duplicate token provider listed: {}",
                    name
                )));
            }
            registry.insert(name, provider);
        }
        Ok(Self {
            providers: registry,
        })
    }

    /// Exact, case-sensitive lookup.
    pub fn lookup(&self, name: &str) -> BrokerResult<&Provider> {
        if let Some(provider) = self.providers.get(name) {
            return Ok(provider);
        }
        match ProviderType::parse(name) {
            Some(_) => Err(BrokerError::NotConfigured(name.to_owned())),
            None => Err(BrokerError::UnsupportedProvider(name.to_owned())),
        }
    }

    pub async fn token(&self, name: &str) -> BrokerResult<String> {
        let metrics = get_metrics().await;
        let outcome = match self.lookup(name) {
            Ok(provider) => provider.token().await,
            Err(e) => Err(e),
        };

        let label = match &outcome {
            Ok(_) => "ok",
            Err(e) => e.reason(),
        };
        // Unknown names are not used as label values.
        let provider_label = if self.providers.contains_key(name) { name } else { "unknown" };
        metrics
            .token_requests
            .with_label_values(&[provider_label, label])
            .inc();
        outcome
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub async fn log_registered(&self) {
        get_metrics().await.providers_configured.set(self.len() as i64);
        for name in self.names() {
            if let Ok(provider) = self.lookup(name) {
                info!(provider = name, provider_type = %provider.provider_type(), "token provider registered");
            }
        }
    }
}
