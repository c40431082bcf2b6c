use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Why a card is being suppressed; each reason maps to its own duration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownReason {
    Used,
    Dismissed,
    AdvisoryTip,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CooldownPolicy {
    pub use_secs: u64,
    pub dismiss_secs: u64,
    pub advisory_tip_secs: u64,
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self { use_secs: 90, dismiss_secs: 60, advisory_tip_secs: 60 }
    }
}

impl CooldownPolicy {
    pub fn seconds_for(&self, reason: CooldownReason) -> u64 {
        match reason {
            CooldownReason::Used => self.use_secs,
            CooldownReason::Dismissed => self.dismiss_secs,
            CooldownReason::AdvisoryTip => self.advisory_tip_secs,
        }
    }
}

/// Card key to "suppressed until". Expired entries are ignored rather than collected.
#[derive(Clone, Debug, Default)]
pub struct CooldownRegistry {
    until: HashMap<String, DateTime<Utc>>,
}

impl CooldownRegistry {
    pub fn suppress(&mut self, key: &str, seconds: u64, now: DateTime<Utc>) -> DateTime<Utc> {
        let span = Duration::seconds(i64::try_from(seconds).unwrap_or(i64::MAX).min(i64::MAX / 1_000));
        let until = now.checked_add_signed(span).unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.until.insert(key.to_string(), until);
        until
    }

    pub fn is_active(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.until.get(key).is_some_and(|until| *until > now)
    }

    pub fn suppressed_until(&self, key: &str) -> Option<DateTime<Utc>> {
        self.until.get(key).copied()
    }

    /// Keys with a deadline still in the future, sorted for stable output.
    pub fn active_keys(&self, now: DateTime<Utc>) -> Vec<&str> {
        let mut keys = self
            .until
            .iter()
            .filter(|(_, until)| **until > now)
            .map(|(key, _)| key.as_str())
            .collect::<Vec<_>>();
        keys.sort_unstable();
        keys
    }

    pub fn clear(&mut self) {
        self.until.clear();
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::{CooldownPolicy, CooldownReason, CooldownRegistry};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("valid timestamp")
    }

    #[test]
    fn suppression_is_active_until_deadline_exclusive() {
        let mut registry = CooldownRegistry::default();
        registry.suppress("price", 90, t0());

        assert!(registry.is_active("price", t0() + Duration::seconds(89)));
        assert!(!registry.is_active("price", t0() + Duration::seconds(90)));
        assert!(!registry.is_active("timing", t0()));
    }

    #[test]
    fn resuppression_overwrites_deadline() {
        let mut registry = CooldownRegistry::default();
        registry.suppress("price", 45, t0());
        let until = registry.suppress("price", 90, t0() + Duration::seconds(30));

        assert_eq!(until, t0() + Duration::seconds(120));
        assert_eq!(registry.suppressed_until("price"), Some(until));
        assert!(registry.is_active("price", t0() + Duration::seconds(100)));
    }

    #[test]
    fn use_suppresses_longer_than_dismiss() {
        let policy = CooldownPolicy::default();
        assert!(policy.seconds_for(CooldownReason::Used) > policy.seconds_for(CooldownReason::Dismissed));
        assert!((45..=75).contains(&policy.seconds_for(CooldownReason::Dismissed)));
        assert_eq!(policy.seconds_for(CooldownReason::AdvisoryTip), 60);
    }

    #[test]
    fn active_keys_skip_expired_entries_and_clear_empties_registry() {
        let mut registry = CooldownRegistry::default();
        registry.suppress("timing", 10, t0());
        registry.suppress("price", 90, t0());
        registry.suppress("security", 60, t0());

        let now = t0() + Duration::seconds(20);
        assert_eq!(registry.active_keys(now), vec!["price", "security"]);

        registry.clear();
        assert!(registry.active_keys(t0()).is_empty());
    }

    #[test]
    fn oversized_cooldown_saturates_instead_of_overflowing() {
        let mut registry = CooldownRegistry::default();
        let until = registry.suppress("price", u64::MAX, t0());

        assert_eq!(until, DateTime::<Utc>::MAX_UTC);
        assert!(registry.is_active("price", t0() + Duration::days(365)));
    }
}
