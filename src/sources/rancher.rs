//! Rancher adapter: exchanges local credentials for a kubeconfig token.
//!
//! Rancher has reported token expiry in two ways over time. Newer servers send
//! an RFC3339 `expiresAt`; older ones leave it empty and send `createdTS` plus
//! `ttl`, both in milliseconds. Which one applies is decided per response.
//! A `ttl` of zero is Rancher's encoding for a token that never expires.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use http::StatusCode;
use reqwest::{Certificate, Client};
use serde::{Deserialize, Serialize};

use crate::cache::token_cache::TokenCell;
use crate::config::providers::{ProviderType, RancherConfig};
use crate::errors::{BrokerError, BrokerResult};
use crate::helpers::time::{now, to_delta};
use crate::sources::{bounded, build_client, observed, Tokenizer};

const RESPONSE_TYPE_KUBECONFIG: &str = "kubeconfig";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewTokenRequest<'a> {
    response_type: &'a str,
    username: &'a str,
    password: &'a str,
}

/// Token record returned by the Rancher login action. Fields the broker does
/// not use are ignored.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeconfigToken {
    pub token: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, rename = "createdTS")]
    pub created_ts: i64,
    #[serde(default)]
    pub expires_at: Option<String>,
    /// Milliseconds.
    #[serde(default)]
    pub ttl: i64,
}

impl fmt::Debug for KubeconfigToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeconfigToken")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("user_id", &self.user_id)
            .field("created", &self.created)
            .field("created_ts", &self.created_ts)
            .field("expires_at", &self.expires_at)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl KubeconfigToken {
    /// `expiresAt` when set, otherwise `createdTS + ttl`. A zero `ttl` never
    /// expires; `shortExpiration` is the only bound on such tokens.
    pub fn expiry(&self) -> BrokerResult<DateTime<Utc>> {
        match self.expires_at.as_deref().filter(|raw| !raw.is_empty()) {
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| BrokerError::Decode(format!("error parsing expiresAt \"{}\": {}", raw, e))),
            None if self.ttl == 0 => Ok(DateTime::<Utc>::MAX_UTC),
            None => DateTime::from_timestamp_millis(self.created_ts.saturating_add(self.ttl))
                .ok_or_else(|| {
                    BrokerError::Decode(format!(
                        "createdTS {} plus ttl {} is out of range",
                        self.created_ts, self.ttl
                    ))
                }),
        }
    }

    /// `created`, falling back to `createdTS`.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created.or_else(|| {
            (self.created_ts > 0)
                .then(|| DateTime::from_timestamp_millis(self.created_ts))
                .flatten()
        })
    }
}

/// A kubeconfig token together with its decoded expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RancherToken {
    pub record: KubeconfigToken,
    pub expires_at: DateTime<Utc>,
}

impl RancherToken {
    pub fn from_record(record: KubeconfigToken) -> BrokerResult<Self> {
        let expires_at = record.expiry()?;
        Ok(Self { record, expires_at })
    }
}

/// True when the token must be replaced: it has expired, it is empty, or it is
/// older than `short_expiration`. A token with no creation time counts as too
/// old whenever `short_expiration` is set.
pub fn token_expired(
    token: &RancherToken,
    short_expiration: Option<Duration>,
    now: DateTime<Utc>,
) -> bool {
    if now >= token.expires_at || token.record.token.is_empty() {
        return true;
    }
    match short_expiration {
        Some(short) => match token.record.created_at() {
            Some(created) => now - created >= to_delta(short),
            None => true,
        },
        None => false,
    }
}

pub struct RancherTokenizer {
    name: String,
    client: Client,
    url: String,
    username: String,
    password: String,
    timeout: Duration,
    short_expiration: Option<Duration>,
    cell: TokenCell<RancherToken>,
}

impl fmt::Debug for RancherTokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RancherTokenizer")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("timeout", &self.timeout)
            .field("short_expiration", &self.short_expiration)
            .finish()
    }
}

impl RancherTokenizer {
    pub fn new(cfg: &RancherConfig) -> BrokerResult<Self> {
        for (field, value) in [
            ("url", &cfg.url),
            ("username", &cfg.username),
            ("password", &cfg.password),
        ] {
            if value.is_empty() {
                return Err(BrokerError::Configuration(format!(
                    "rancher token provider file {} missing required \"{}\" attribute",
                    cfg.name, field
                )));
            }
        }

        let mut builder = Client::builder();
        if let Some(pem) = &cfg.ca_certs {
            let certs = Certificate::from_pem_bundle(pem.as_bytes()).map_err(|e| {
                BrokerError::Configuration(format!(
                    "rancher token provider {}: invalid caCerts: {}",
                    cfg.name, e
                ))
            })?;
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        Ok(Self {
            name: cfg.name.clone(),
            client: build_client(builder, &cfg.name)?,
            url: cfg.url.clone(),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            timeout: cfg.timeout,
            short_expiration: cfg.short_expiration,
            cell: TokenCell::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cached record, fresh or not.
    pub fn cached(&self) -> Option<RancherToken> {
        self.cell.peek()
    }

    async fn refresh(&self) -> BrokerResult<RancherToken> {
        bounded(self.timeout, "rancher", self.exchange()).await
    }

    async fn exchange(&self) -> BrokerResult<RancherToken> {
        let request = NewTokenRequest {
            response_type: RESPONSE_TYPE_KUBECONFIG,
            username: &self.username,
            password: &self.password,
        };

        let response = self
            .client
            .post(&self.url)
            .header(http::header::ACCEPT, "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| BrokerError::Transport(format!("rancher: error doing request for new token: {}", e)))?;

        let status = response.status();
        if status != StatusCode::CREATED {
            return Err(BrokerError::Protocol(format!("error getting token: {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| BrokerError::Transport(format!("rancher: error reading body: {}", e)))?;
        let record: KubeconfigToken = serde_json::from_str(&body)
            .map_err(|e| BrokerError::Decode(format!("rancher: error unmarshaling body: {}", e)))?;

        RancherToken::from_record(record)
    }
}

impl Tokenizer for RancherTokenizer {
    async fn token(&self) -> BrokerResult<String> {
        let short_expiration = self.short_expiration;
        self.cell
            .get_or_refresh(
                |cached| !token_expired(cached, short_expiration, now()),
                || observed(&self.name, ProviderType::Rancher, self.refresh()),
            )
            .await
            .map(|cached| cached.record.token)
    }
}
