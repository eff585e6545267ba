//! Token providers.
//!
//! Each adapter owns its own [`TokenCell`](crate::cache::token_cache::TokenCell),
//! so two differently configured providers of the same type never share state.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::providers::{ProviderConfig, ProviderType};
use crate::errors::{BrokerError, BrokerResult};
use crate::helpers::time::get_instant;
use crate::observability::metrics::get_metrics;

pub mod google;
pub mod microsoft;
pub mod rancher;

use google::GoogleTokenizer;
use microsoft::MicrosoftTokenizer;
use rancher::RancherTokenizer;

/// Something that can hand out a bearer token, caching it between calls.
pub trait Tokenizer {
    fn token(&self) -> impl Future<Output = BrokerResult<String>> + Send;
}

#[derive(Debug)]
pub enum Provider {
    Google(GoogleTokenizer),
    Microsoft(MicrosoftTokenizer),
    Rancher(RancherTokenizer),
}

impl Provider {
    pub fn name(&self) -> &str {
        match self {
            Provider::Google(p) => p.name(),
            Provider::Microsoft(p) => p.name(),
            Provider::Rancher(p) => p.name(),
        }
    }

    pub fn provider_type(&self) -> ProviderType {
        match self {
            Provider::Google(_) => ProviderType::Google,
            Provider::Microsoft(_) => ProviderType::Microsoft,
            Provider::Rancher(_) => ProviderType::Rancher,
        }
    }
}

impl Tokenizer for Provider {
    async fn token(&self) -> BrokerResult<String> {
        match self {
            Provider::Google(p) => p.token().await,
            Provider::Microsoft(p) => p.token().await,
            Provider::Rancher(p) => p.token().await,
        }
    }
}

pub fn build_provider(cfg: &ProviderConfig) -> BrokerResult<Provider> {
    match cfg {
        ProviderConfig::Google(c) => GoogleTokenizer::new(c).map(Provider::Google),
        ProviderConfig::Microsoft(c) => MicrosoftTokenizer::new(c).map(Provider::Microsoft),
        ProviderConfig::Rancher(c) => RancherTokenizer::new(c).map(Provider::Rancher),
    }
}

/// Bounds an upstream exchange. A zero timeout fails without issuing the call.
pub(crate) async fn bounded<T>(
    timeout: Duration,
    label: &str,
    exchange: impl Future<Output = BrokerResult<T>>,
) -> BrokerResult<T> {
    let timed_out = || BrokerError::Timeout(format!("{}: request timed out after {:?}", label, timeout));
    if timeout.is_zero() {
        return Err(timed_out());
    }
    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| timed_out())?
}

/// Wraps one upstream refresh with logs and metrics.
pub(crate) async fn observed<T>(
    name: &str,
    provider_type: ProviderType,
    refresh: impl Future<Output = BrokerResult<T>>,
) -> BrokerResult<T> {
    let metrics = get_metrics().await;
    metrics
        .upstream_refreshes
        .with_label_values(&[name, provider_type.as_str()])
        .inc();

    debug!(provider = name, provider_type = %provider_type, "refreshing token from upstream");
    let started = get_instant();
    let outcome = refresh.await;
    metrics
        .upstream_duration
        .with_label_values(&[name])
        .observe(started.elapsed().as_secs_f64());

    match &outcome {
        Ok(_) => info!(provider = name, provider_type = %provider_type, "token refreshed"),
        Err(e) => {
            warn!(provider = name, provider_type = %provider_type, error = %e, "token refresh failed");
            metrics
                .upstream_failures
                .with_label_values(&[name, e.reason()])
                .inc();
        }
    }
    outcome
}

/// Builds the reqwest client an adapter talks to its upstream with.
pub(crate) fn build_client(builder: reqwest::ClientBuilder, name: &str) -> BrokerResult<reqwest::Client> {
    builder.build().map_err(|e| {
        BrokerError::Configuration(format!("token provider {}: error building http client: {}", name, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::providers::{GoogleConfig, MicrosoftConfig};

    #[tokio::test]
    async fn zero_timeout_fails_fast() {
        let err = bounded(Duration::ZERO, "microsoft", async { Ok::<_, BrokerError>(()) })
            .await
            .unwrap_err();
        assert_eq!(err, BrokerError::Timeout("microsoft: request timed out after 0ns".into()));
    }

    #[tokio::test]
    async fn slow_exchange_times_out() {
        let err = bounded(Duration::from_millis(20), "rancher", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, BrokerError>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, BrokerError::Timeout(_)));
    }

    #[test]
    fn providers_are_built_per_type() {
        let google = build_provider(&ProviderConfig::Google(GoogleConfig::new("gcp"))).unwrap();
        assert_eq!(google.name(), "gcp");
        assert_eq!(google.provider_type(), ProviderType::Google);

        let microsoft = build_provider(&ProviderConfig::Microsoft(MicrosoftConfig {
            name: "graph".into(),
            client_id: "id".into(),
            client_secret: "secret".into(),
            resource: "https://graph.microsoft.com".into(),
            login_endpoint: "https://login.example.com/oauth2/token".into(),
            timeout: Duration::from_secs(1),
        }))
        .unwrap();
        assert_eq!(microsoft.provider_type(), ProviderType::Microsoft);
    }
}
