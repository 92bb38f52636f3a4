//! Retry eligibility for stuck delivery events.

#![allow(missing_docs)]

use std::time::Duration;

use apub_common::config::RetryConfig;
use chrono::{DateTime, Utc};

use crate::event::DeliveryEvent;

/// Which `waiting` events the sweep may push again.
///
/// An event is eligible once it is older than `stale_age`, nothing pushed or
/// attempted it within `stale_age`, and it has fewer than `max_attempts`
/// attempts. Events at the ceiling stay `waiting` for an operator to look
/// at; nothing marks them failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub stale_age: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            stale_age: Duration::from_secs(config.stale_age_secs),
            max_attempts: config.max_attempts,
        }
    }
}

impl RetryPolicy {
    /// Events untouched since this instant are stale.
    #[must_use]
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let age = chrono::Duration::from_std(self.stale_age).unwrap_or(chrono::Duration::MAX);
        now.checked_sub_signed(age).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    #[must_use]
    pub fn is_eligible(&self, event: &DeliveryEvent, now: DateTime<Utc>) -> bool {
        event.is_stale(self.cutoff(now), self.max_attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::DeliveryResult;
    use crate::jobs::{DeliverJob, JobPayload, Lane};
    use apub_federation::{Activity, ActivityType};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            stale_age: Duration::from_secs(3600),
            max_attempts: 3,
        }
    }

    fn event(attempts: u32, age: chrono::Duration, now: DateTime<Utc>) -> DeliveryEvent {
        let activity = Activity::new(ActivityType::Like, "https://a/u#likes/1", "https://a/u", "https://b/n");
        let mut event = DeliveryEvent::new(
            "e1".to_string(),
            Lane::Deliver,
            JobPayload::Deliver(DeliverJob::new(
                "https://b/inbox".to_string(),
                activity,
                "https://a/u".to_string(),
            )),
            now - age,
        );
        event.attempts = attempts;
        event
    }

    #[test]
    fn test_default_matches_config() {
        assert_eq!(policy(), RetryPolicy::default());
    }

    #[test]
    fn test_eligibility() {
        let now = Utc::now();
        let policy = policy();

        assert!(policy.is_eligible(&event(2, chrono::Duration::hours(2), now), now));
        assert!(!policy.is_eligible(&event(3, chrono::Duration::hours(2), now), now));
        assert!(!policy.is_eligible(&event(0, chrono::Duration::minutes(59), now), now));
    }

    #[test]
    fn test_recent_attempt_is_not_eligible() {
        let now = Utc::now();
        let mut event = event(1, chrono::Duration::hours(2), now);
        event.last_attempt_at = Some(now - chrono::Duration::minutes(10));
        assert!(!policy().is_eligible(&event, now));

        event.last_attempt_at = Some(now - chrono::Duration::minutes(61));
        assert!(policy().is_eligible(&event, now));
    }

    #[test]
    fn test_settled_events_are_not_eligible() {
        let now = Utc::now();
        let mut failed = event(1, chrono::Duration::hours(2), now);
        failed.result = DeliveryResult::Failed;
        assert!(!policy().is_eligible(&failed, now));
    }
}
