//! Microsoft adapter: OAuth2 client-credentials exchange against a login endpoint.

use std::fmt;
use std::time::Duration;

use reqwest::{Client, Url};
use serde::Deserialize;

use crate::cache::token::CachedToken;
use crate::cache::token_cache::TokenCell;
use crate::config::providers::{MicrosoftConfig, ProviderType};
use crate::errors::{BrokerError, BrokerResult};
use crate::helpers::time::{now, seconds};
use crate::sources::{bounded, build_client, observed, Tokenizer};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Seconds, sent as a string by the v1 endpoint.
    expires_in: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error_description: Option<String>,
}

pub struct MicrosoftTokenizer {
    name: String,
    client: Client,
    client_id: String,
    client_secret: String,
    resource: String,
    login_endpoint: String,
    timeout: Duration,
    cell: TokenCell<CachedToken>,
}

impl fmt::Debug for MicrosoftTokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MicrosoftTokenizer")
            .field("name", &self.name)
            .field("client_id", &self.client_id)
            .field("resource", &self.resource)
            .field("login_endpoint", &self.login_endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl MicrosoftTokenizer {
    pub fn new(cfg: &MicrosoftConfig) -> BrokerResult<Self> {
        for (field, value) in [
            ("clientId", &cfg.client_id),
            ("clientSecret", &cfg.client_secret),
            ("resource", &cfg.resource),
            ("loginEndpoint", &cfg.login_endpoint),
        ] {
            if value.is_empty() {
                return Err(BrokerError::Configuration(format!(
                    "microsoft token provider file {} missing required \"{}\" attribute",
                    cfg.name, field
                )));
            }
        }

        Ok(Self {
            name: cfg.name.clone(),
            client: build_client(Client::builder(), &cfg.name)?,
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
            resource: cfg.resource.clone(),
            login_endpoint: cfg.login_endpoint.clone(),
            timeout: cfg.timeout,
            cell: TokenCell::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cached token, fresh or not.
    pub fn cached(&self) -> Option<CachedToken> {
        self.cell.peek()
    }

    async fn refresh(&self) -> BrokerResult<CachedToken> {
        let url = Url::parse(&self.login_endpoint)
            .map_err(|e| BrokerError::Transport(format!("microsoft: error making request: {}", e)))?;
        bounded(self.timeout, "microsoft", self.exchange(url)).await
    }

    async fn exchange(&self, url: Url) -> BrokerResult<CachedToken> {
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("resource", self.resource.as_str()),
        ];

        let response = self
            .client
            .post(url)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                BrokerError::Transport(format!("microsoft: error doing request for new token: {}", e))
            })?;

        let status = response.status();
        if !(200..=399).contains(&status.as_u16()) {
            let description = match response.text().await {
                Ok(body) => serde_json::from_str::<ErrorResponse>(&body)
                    .ok()
                    .and_then(|e| e.error_description)
                    .filter(|d| !d.is_empty()),
                Err(_) => None,
            };
            return Err(BrokerError::Protocol(format!(
                "microsoft: error getting token: {}",
                description.unwrap_or_else(|| status.to_string())
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| BrokerError::Transport(format!("microsoft: error reading body: {}", e)))?;
        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| BrokerError::Decode(format!("microsoft: error unmarshaling body: {}", e)))?;
        let expires_in: i64 = parsed.expires_in.trim().parse().map_err(|e| {
            BrokerError::Decode(format!(
                "microsoft: error converting expiresIn field for token: {}",
                e
            ))
        })?;

        let lifetime = seconds(expires_in).ok_or_else(|| {
            BrokerError::Decode(format!(
                "microsoft: error converting expiresIn field for token: {} is out of range",
                expires_in
            ))
        })?;

        Ok(CachedToken::with_margin(parsed.access_token, now(), lifetime))
    }
}

impl Tokenizer for MicrosoftTokenizer {
    async fn token(&self) -> BrokerResult<String> {
        self.cell
            .get_or_refresh(
                |cached| cached.is_fresh_at(now()),
                || observed(&self.name, ProviderType::Microsoft, self.refresh()),
            )
            .await
            .map(|cached| cached.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(login_endpoint: &str) -> MicrosoftConfig {
        MicrosoftConfig {
            name: "graph".into(),
            client_id: "clientId".into(),
            client_secret: "clientSecret".into(),
            resource: "https://graph.microsoft.com".into(),
            login_endpoint: login_endpoint.into(),
            timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn empty_fields_are_rejected_at_construction() {
        let mut cfg = config("https://login.example.com/oauth2/token");
        cfg.client_secret.clear();
        let err = MicrosoftTokenizer::new(&cfg).unwrap_err();
        assert_eq!(
            err,
            BrokerError::Configuration(
                "microsoft token provider file graph missing required \"clientSecret\" attribute".into()
            )
        );
    }

    #[tokio::test]
    async fn malformed_endpoint_is_a_request_error() {
        let tokenizer = MicrosoftTokenizer::new(&config("::not a url::")).unwrap();
        let err = tokenizer.token().await.unwrap_err();
        assert!(
            err.to_string().starts_with("microsoft: error making request: "),
            "{}",
            err
        );
        assert_eq!(err.status_code(), http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn secrets_are_not_in_debug_output() {
        let tokenizer = MicrosoftTokenizer::new(&config("https://login.example.com")).unwrap();
        assert!(!format!("{:?}", tokenizer).contains("clientSecret"));
    }
}
