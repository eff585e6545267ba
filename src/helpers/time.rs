use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Instant;

/// Share of a token's declared lifetime the broker is willing to serve it for.
pub const LIFETIME_MARGIN_NUMERATOR: i32 = 9;
pub const LIFETIME_MARGIN_DENOMINATOR: i32 = 10;

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// 90% of `lifetime`. Lifetimes too large to scale exactly are divided first.
pub fn with_safety_margin(lifetime: TimeDelta) -> TimeDelta {
    lifetime
        .checked_mul(LIFETIME_MARGIN_NUMERATOR)
        .and_then(|scaled| scaled.checked_div(LIFETIME_MARGIN_DENOMINATOR))
        .unwrap_or_else(|| lifetime / LIFETIME_MARGIN_DENOMINATOR * LIFETIME_MARGIN_NUMERATOR)
}

/// A lifetime in whole seconds, or `None` when chrono cannot represent it.
pub fn seconds(secs: i64) -> Option<TimeDelta> {
    TimeDelta::try_seconds(secs)
}

/// Converts a std duration into a chrono delta, saturating on overflow.
pub fn to_delta(duration: std::time::Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

pub fn get_instant() -> Instant {
    Instant::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn margin_is_ninety_percent() {
        assert_eq!(
            with_safety_margin(TimeDelta::seconds(3599)),
            TimeDelta::milliseconds(3_239_100)
        );
        assert_eq!(with_safety_margin(TimeDelta::zero()), TimeDelta::zero());
    }

    #[test]
    fn huge_lifetime_does_not_overflow() {
        let margin = with_safety_margin(TimeDelta::MAX);
        assert!(margin > TimeDelta::zero());
        assert!(margin < TimeDelta::MAX);

        let big = TimeDelta::seconds(9_000_000_000_000_000);
        assert_eq!(with_safety_margin(big), TimeDelta::seconds(8_100_000_000_000_000));
    }

    #[test]
    fn seconds_out_of_range_is_none() {
        assert_eq!(seconds(3600), Some(TimeDelta::hours(1)));
        assert_eq!(seconds(i64::MAX), None);
    }

    #[test]
    fn negative_lifetime_stays_negative() {
        assert!(with_safety_margin(TimeDelta::seconds(-10)) < TimeDelta::zero());
    }
}
