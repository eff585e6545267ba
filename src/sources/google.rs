//! Google adapter: tokens come from the ambient identity of the host.
//!
//! The chain mirrors Application Default Credentials: an explicit or
//! well-known credentials file first (`authorized_user` or `service_account`),
//! then the GCE metadata server.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::token::CachedToken;
use crate::cache::token_cache::TokenCell;
use crate::config::providers::{GoogleConfig, ProviderType};
use crate::errors::{BrokerError, BrokerResult};
use crate::helpers::time::now;
use crate::sources::{bounded, build_client, observed, Tokenizer};

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
pub const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const METADATA_HOST_ENV: &str = "GCE_METADATA_HOST";
const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";
const METADATA_TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";
const AUTHORIZED_USER: &str = "authorized_user";
const SERVICE_ACCOUNT: &str = "service_account";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Longest assertion lifetime Google accepts.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// A token as handed out by an ambient credential source, with its own expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbientToken {
    pub access_token: String,
    pub expiry: DateTime<Utc>,
}

/// Source of ambient Google credentials.
pub trait AmbientCredentials {
    fn fetch(
        &self,
        client: &Client,
        scope: &str,
    ) -> impl Future<Output = BrokerResult<AmbientToken>> + Send;
}

/// Shape shared by the metadata server and the OAuth2 token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

impl TokenResponse {
    fn into_ambient(self, fetched_at: DateTime<Utc>) -> BrokerResult<AmbientToken> {
        let expiry = TimeDelta::try_seconds(self.expires_in)
            .and_then(|lifetime| fetched_at.checked_add_signed(lifetime))
            .ok_or_else(|| {
                BrokerError::Decode(format!(
                    "google: expires_in {} is out of range",
                    self.expires_in
                ))
            })?;
        Ok(AmbientToken {
            access_token: self.access_token,
            expiry,
        })
    }
}

async fn decode_token_response(response: reqwest::Response, origin: &str) -> BrokerResult<AmbientToken> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| BrokerError::Transport(format!("google: error reading {} response: {}", origin, e)))?;
    if !status.is_success() {
        return Err(BrokerError::Protocol(format!(
            "google: {} returned {}",
            origin, status
        )));
    }
    let parsed: TokenResponse = serde_json::from_str(&body)
        .map_err(|e| BrokerError::Decode(format!("google: error decoding {} response: {}", origin, e)))?;
    parsed.into_ambient(now())
}

/// ================================
/// GCE metadata server
/// ================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataServer {
    base_url: String,
}

impl MetadataServer {
    /// `http://$GCE_METADATA_HOST`, falling back to the well-known host.
    pub fn from_env() -> Self {
        let host = std::env::var(METADATA_HOST_ENV)
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| DEFAULT_METADATA_HOST.to_owned());
        Self::with_base_url(format!("http://{}", host))
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    pub fn token_url(&self) -> String {
        format!("{}{}", self.base_url, METADATA_TOKEN_PATH)
    }
}

impl AmbientCredentials for MetadataServer {
    async fn fetch(&self, client: &Client, scope: &str) -> BrokerResult<AmbientToken> {
        let response = client
            .get(self.token_url())
            .query(&[("scopes", scope)])
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| BrokerError::Transport(format!("google: metadata server unavailable: {}", e)))?;
        decode_token_response(response, "metadata server").await
    }
}

/// ================================
/// gcloud `authorized_user` credentials
/// ================================
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct AuthorizedUser {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Deserialize)]
struct CredentialsKind {
    #[serde(rename = "type")]
    kind: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_owned()
}

impl fmt::Debug for AuthorizedUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedUser")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("refresh_token", &"***")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl AmbientCredentials for AuthorizedUser {
    async fn fetch(&self, client: &Client, _scope: &str) -> BrokerResult<AmbientToken> {
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", self.refresh_token.as_str()),
        ];
        let response = client
            .post(&self.token_uri)
            .form(&form)
            .send()
            .await
            .map_err(|e| BrokerError::Transport(format!("google: error refreshing user credentials: {}", e)))?;
        decode_token_response(response, "token endpoint").await
    }
}

/// ================================
/// `service_account` key files
/// ================================
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"***")
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

impl ServiceAccountKey {
    /// Self-signed RS256 assertion for the JWT bearer grant.
    pub fn assertion(&self, scope: &str, issued_at: DateTime<Utc>) -> BrokerResult<String> {
        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes()).map_err(|e| {
            BrokerError::Transport(format!(
                "google: invalid private key for {}: {}",
                self.client_email, e
            ))
        })?;
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();
        let iat = issued_at.timestamp();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope,
            aud: &self.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };
        jsonwebtoken::encode(&header, &claims, &key).map_err(|e| {
            BrokerError::Transport(format!(
                "google: error signing assertion for {}: {}",
                self.client_email, e
            ))
        })
    }
}

impl AmbientCredentials for ServiceAccountKey {
    async fn fetch(&self, client: &Client, scope: &str) -> BrokerResult<AmbientToken> {
        let assertion = self.assertion(scope, now())?;
        let form = [("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())];
        let response = client
            .post(&self.token_uri)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                BrokerError::Transport(format!("google: error exchanging service account assertion: {}", e))
            })?;
        decode_token_response(response, "token endpoint").await
    }
}

/// ================================
/// Credentials files
/// ================================
#[derive(Debug, Clone)]
pub enum CredentialsFile {
    AuthorizedUser(AuthorizedUser),
    ServiceAccount(ServiceAccountKey),
}

fn credentials_file_error(origin: &str, e: impl fmt::Display) -> BrokerError {
    BrokerError::Transport(format!("google: error reading credentials file {}: {}", origin, e))
}

impl CredentialsFile {
    /// Picks the credential flavour from the file's `type` field.
    pub fn from_json(content: &str, origin: &str) -> BrokerResult<Self> {
        let kind: CredentialsKind =
            serde_json::from_str(content).map_err(|e| credentials_file_error(origin, e))?;
        match kind.kind.as_str() {
            AUTHORIZED_USER => serde_json::from_str(content)
                .map(Self::AuthorizedUser)
                .map_err(|e| credentials_file_error(origin, e)),
            SERVICE_ACCOUNT => serde_json::from_str(content)
                .map(Self::ServiceAccount)
                .map_err(|e| credentials_file_error(origin, e)),
            other => Err(BrokerError::Transport(format!(
                "google: unsupported credentials type \"{}\" in {}",
                other, origin
            ))),
        }
    }

    pub async fn from_file(path: &Path) -> BrokerResult<Self> {
        let origin = path.display().to_string();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| credentials_file_error(&origin, e))?;
        Self::from_json(&content, &origin)
    }
}

impl AmbientCredentials for CredentialsFile {
    async fn fetch(&self, client: &Client, scope: &str) -> BrokerResult<AmbientToken> {
        match self {
            Self::AuthorizedUser(user) => user.fetch(client, scope).await,
            Self::ServiceAccount(key) => key.fetch(client, scope).await,
        }
    }
}

/// ================================
/// Default chain
/// ================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultChain {
    credentials_file: Option<PathBuf>,
    metadata: MetadataServer,
}

impl DefaultChain {
    pub fn new(credentials_file: Option<PathBuf>, metadata: MetadataServer) -> Self {
        Self {
            credentials_file,
            metadata,
        }
    }

    /// `$GOOGLE_APPLICATION_CREDENTIALS`, else the gcloud well-known file when it
    /// exists, else the metadata server alone.
    pub fn from_env() -> Self {
        let explicit = std::env::var_os(CREDENTIALS_ENV)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        let credentials_file = explicit.or_else(|| well_known_file().filter(|p| p.is_file()));
        Self::new(credentials_file, MetadataServer::from_env())
    }
}

fn well_known_file() -> Option<PathBuf> {
    let base = match std::env::var_os("CLOUDSDK_CONFIG") {
        Some(dir) => PathBuf::from(dir),
        None => PathBuf::from(std::env::var_os("HOME")?).join(".config").join("gcloud"),
    };
    Some(base.join("application_default_credentials.json"))
}

impl AmbientCredentials for DefaultChain {
    async fn fetch(&self, client: &Client, scope: &str) -> BrokerResult<AmbientToken> {
        match &self.credentials_file {
            Some(path) => {
                debug!(file = %path.display(), "using google credentials file");
                CredentialsFile::from_file(path).await?.fetch(client, scope).await
            }
            None => self.metadata.fetch(client, scope).await,
        }
    }
}

/// ================================
/// Adapter
/// ================================
pub struct GoogleTokenizer<C = DefaultChain> {
    name: String,
    client: Client,
    credentials: C,
    timeout: Duration,
    cell: TokenCell<CachedToken>,
}

impl<C: fmt::Debug> fmt::Debug for GoogleTokenizer<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleTokenizer")
            .field("name", &self.name)
            .field("credentials", &self.credentials)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GoogleTokenizer {
    pub fn new(cfg: &GoogleConfig) -> BrokerResult<Self> {
        Self::with_credentials(&cfg.name, DefaultChain::from_env(), cfg.timeout)
    }
}

impl<C> GoogleTokenizer<C>
where
    C: AmbientCredentials + Sync,
{
    pub fn with_credentials(name: &str, credentials: C, timeout: Duration) -> BrokerResult<Self> {
        Ok(Self {
            name: name.to_owned(),
            client: build_client(Client::builder(), name)?,
            credentials,
            timeout,
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
        let ambient = bounded(
            self.timeout,
            "google",
            self.credentials.fetch(&self.client, CLOUD_PLATFORM_SCOPE),
        )
        .await?;
        let fetched_at = now();
        Ok(CachedToken::with_margin(
            ambient.access_token,
            fetched_at,
            ambient.expiry - fetched_at,
        ))
    }
}

impl<C> Tokenizer for GoogleTokenizer<C>
where
    C: AmbientCredentials + Sync,
{
    async fn token(&self) -> BrokerResult<String> {
        self.cell
            .get_or_refresh(
                |cached| cached.is_fresh_at(now()),
                || observed(&self.name, ProviderType::Google, self.refresh()),
            )
            .await
            .map(|cached| cached.value)
    }
}
