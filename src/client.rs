//! Client for services that fetch their tokens from a running broker.

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::Deserialize;

use crate::utils::constants::{API_KEY_HEADER, DEFAULT_SERVER_PORT, TOKENS_PATH};

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Clone)]
pub struct BrokerClient {
    url: String,
    api_key: String,
    client: Client,
}

impl BrokerClient {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
            client: Client::new(),
        }
    }

    /// A client for a broker on this host, at the default port.
    pub fn local(api_key: impl Into<String>) -> Self {
        Self::new(format!("http://localhost:{}", DEFAULT_SERVER_PORT), api_key)
    }

    pub fn with_http_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Token for `provider`, e.g. `google` or the name of a configured provider.
    pub async fn token(&self, provider: &str) -> Result<String> {
        let response = self
            .client
            .get(format!("{}{}", self.url, TOKENS_PATH))
            .query(&[("provider", provider)])
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .with_context(|| format!("requesting token from {}", self.url))?;

        let status = response.status();
        if !(200..=399).contains(&status.as_u16()) {
            return Err(anyhow!("error getting token: {}", status));
        }

        let body: TokenResponse = response.json().await.context("decoding token response")?;
        Ok(body.token)
    }
}
