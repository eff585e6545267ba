//! Shared constants and invariants

pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;

// Supported provider types
pub const PROVIDER_GOOGLE: &str = "google";
pub const PROVIDER_MICROSOFT: &str = "microsoft";
pub const PROVIDER_RANCHER: &str = "rancher";

/// Provider served when a request names none.
pub const DEFAULT_PROVIDER: &str = PROVIDER_GOOGLE;

// HTTP boundary
pub const TOKENS_PATH: &str = "/tokens";
pub const API_KEY_HEADER: &str = "Api-Key";
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
pub const DEFAULT_SERVER_PORT: u16 = 1982;

// Provider files picked up from the providers directory
pub const PROVIDER_FILE_EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];
