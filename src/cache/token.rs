use chrono::{DateTime, TimeDelta, Utc};

use crate::helpers::time::with_safety_margin;

/// Value of a token that was never fetched.
pub const TOKEN_VALUE_STUB: &str = "";

/// A bearer token together with the window it may be served in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub value: String,
    pub obtained_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    pub fn new(value: String, obtained_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value,
            obtained_at,
            expires_at,
        }
    }

    /// The "never fetched" sentinel. Never fresh.
    pub fn empty() -> Self {
        Self {
            value: TOKEN_VALUE_STUB.to_owned(),
            obtained_at: DateTime::<Utc>::MIN_UTC,
            expires_at: DateTime::<Utc>::MIN_UTC,
        }
    }

    /// Caches `value` for 90% of `lifetime`, measured from `now`.
    pub fn with_margin(value: String, now: DateTime<Utc>, lifetime: TimeDelta) -> Self {
        let expires_at = now
            .checked_add_signed(with_safety_margin(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self::new(value, now, expires_at)
    }

    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.value != TOKEN_VALUE_STUB && now < self.expires_at
    }
}

impl Default for CachedToken {
    fn default() -> Self {
        Self::empty()
    }
}
