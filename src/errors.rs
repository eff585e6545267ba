//! Error taxonomy shared by the broker, its adapters and the HTTP boundary.

use http::StatusCode;
use thiserror::Error;

/// Every failure a token lookup can surface.
///
/// Values are `Clone` because a single refresh outcome is handed to all
/// callers waiting on the same in-flight upstream call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// A provider was built from incomplete or invalid parameters.
    #[error("{0}")]
    Configuration(String),

    /// The requested name matches no known provider type.
    #[error("Unsupported token provider: {0}")]
    UnsupportedProvider(String),

    /// The requested name is a known provider type that this deployment does not wire.
    #[error("token provider not configured: {0}")]
    NotConfigured(String),

    /// Network failure, malformed URL or unreachable upstream.
    #[error("{0}")]
    Transport(String),

    /// The upstream call did not finish within the adapter's timeout.
    #[error("{0}")]
    Timeout(String),

    /// The identity provider answered with a non-success status.
    #[error("{0}")]
    Protocol(String),

    /// The identity provider answered with a body we could not decode.
    #[error("{0}")]
    Decode(String),
}

impl BrokerError {
    /// Status the HTTP boundary answers with for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            BrokerError::Configuration(_)
            | BrokerError::UnsupportedProvider(_)
            | BrokerError::NotConfigured(_) => StatusCode::BAD_REQUEST,
            BrokerError::Transport(_)
            | BrokerError::Timeout(_)
            | BrokerError::Protocol(_)
            | BrokerError::Decode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            BrokerError::Configuration(_) => "configuration",
            BrokerError::UnsupportedProvider(_) => "unsupported",
            BrokerError::NotConfigured(_) => "not_configured",
            BrokerError::Transport(_) => "transport",
            BrokerError::Timeout(_) => "timeout",
            BrokerError::Protocol(_) => "protocol",
            BrokerError::Decode(_) => "decode",
        }
    }
}

pub type BrokerResult<T> = std::result::Result<T, BrokerError>;
