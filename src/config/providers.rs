use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utils::constants::{
    DEFAULT_UPSTREAM_TIMEOUT_SECS, PROVIDER_GOOGLE, PROVIDER_MICROSOFT, PROVIDER_RANCHER,
};

/// ================================
/// Provider types
/// ================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Google,
    Microsoft,
    Rancher,
}

impl ProviderType {
    pub const ALL: [ProviderType; 3] = [
        ProviderType::Google,
        ProviderType::Microsoft,
        ProviderType::Rancher,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Google => PROVIDER_GOOGLE,
            ProviderType::Microsoft => PROVIDER_MICROSOFT,
            ProviderType::Rancher => PROVIDER_RANCHER,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ================================
/// Raw provider record, as written in a provider file
/// ================================
///
/// Every field is optional here; required fields are enforced per type by
/// [`crate::config::proc_validator::validate_provider`].
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawProviderConfig {
    /// google | microsoft | rancher. Absent means google.
    #[serde(rename = "type")]
    pub provider_type: Option<String>,
    pub name: Option<String>,

    // microsoft
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub resource: Option<String>,
    pub login_endpoint: Option<String>,

    // rancher
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// PEM bundle appended to the trust roots of the rancher client.
    pub ca_certs: Option<String>,
    /// Seconds after `created` at which a rancher token is rotated regardless of its expiry.
    pub short_expiration: Option<u64>,

    /// Upstream request timeout in seconds. Zero fails every request immediately.
    pub timeout_seconds: Option<u64>,
}

/// ================================
/// Validated provider configuration
/// ================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderConfig {
    Google(GoogleConfig),
    Microsoft(MicrosoftConfig),
    Rancher(RancherConfig),
}

impl ProviderConfig {
    pub fn name(&self) -> &str {
        match self {
            ProviderConfig::Google(c) => &c.name,
            ProviderConfig::Microsoft(c) => &c.name,
            ProviderConfig::Rancher(c) => &c.name,
        }
    }

    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderConfig::Google(_) => ProviderType::Google,
            ProviderConfig::Microsoft(_) => ProviderType::Microsoft,
            ProviderConfig::Rancher(_) => ProviderType::Rancher,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleConfig {
    pub name: String,
    pub timeout: Duration,
}

impl GoogleConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct MicrosoftConfig {
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
    pub resource: String,
    /// e.g. `https://login.microsoftonline.com/<tenant>/oauth2/token`
    pub login_endpoint: String,
    pub timeout: Duration,
}

impl fmt::Debug for MicrosoftConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MicrosoftConfig")
            .field("name", &self.name)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("resource", &self.resource)
            .field("login_endpoint", &self.login_endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct RancherConfig {
    pub name: String,
    pub url: String,
    pub username: String,
    pub password: String,
    pub ca_certs: Option<String>,
    pub timeout: Duration,
    pub short_expiration: Option<Duration>,
}

impl fmt::Debug for RancherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RancherConfig")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("ca_certs", &self.ca_certs.is_some())
            .field("timeout", &self.timeout)
            .field("short_expiration", &self.short_expiration)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_type_round_trips_through_its_name() {
        for t in ProviderType::ALL {
            assert_eq!(ProviderType::parse(t.as_str()), Some(t));
        }
        assert_eq!(ProviderType::parse("Google"), None);
        assert_eq!(ProviderType::parse("okta"), None);
    }

    #[test]
    fn raw_config_reads_camel_case_fields() {
        let raw: RawProviderConfig = serde_json::from_str(
            r#"{
                "type": "microsoft",
                "name": "graph",
                "clientId": "id",
                "clientSecret": "secret",
                "resource": "https://graph.microsoft.com",
                "loginEndpoint": "https://login.example.com/oauth2/token",
                "timeoutSeconds": 3
            }"#,
        )
        .unwrap();

        assert_eq!(raw.provider_type.as_deref(), Some("microsoft"));
        assert_eq!(raw.client_id.as_deref(), Some("id"));
        assert_eq!(raw.login_endpoint.as_deref(), Some("https://login.example.com/oauth2/token"));
        assert_eq!(raw.timeout_seconds, Some(3));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let cfg = RancherConfig {
            name: "rancher".into(),
            url: "https://rancher.example.com".into(),
            username: "svc".into(),
            password: "hunter2".into(),
            ca_certs: None,
            timeout: Duration::from_secs(1),
            short_expiration: None,
        };
        assert!(!format!("{:?}", cfg).contains("hunter2"));
    }
}
