//! Retry policy for records whose handler asked to be retried.
//!
//! Retry state lives in memory per stage loop; a restart forgets it and
//! every pending record becomes due again.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use vaultwork_core::config::RetryConfig;

/// Attempt limit and exponential backoff between handler retries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Handler attempts before giving up. 0 = unbounded.
    pub max_attempts: u32,
    pub backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
    /// Immediate re-reads when a record file can't be read.
    pub io_read_attempts: u32,
    pub io_retry_delay: Duration,
    /// Age after which a stale claim is treated as abandoned.
    pub claim_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff: Duration::from_secs(config.backoff_secs),
            multiplier: config.backoff_multiplier.max(1.0),
            max_backoff: Duration::from_secs(config.max_backoff_secs),
            io_read_attempts: config.io_read_attempts.max(1),
            io_retry_delay: Duration::from_millis(config.io_retry_delay_ms),
            claim_timeout: Duration::from_secs(config.claim_timeout_secs),
        }
    }

    /// Retry every tick, forever.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: 0,
            backoff: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Wait before attempt `failures + 1`: `backoff * multiplier^(failures-1)`,
    /// capped at `max_backoff`.
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures == 0 || self.backoff.is_zero() {
            return Duration::ZERO;
        }
        let exponent = (failures - 1).min(63) as i32;
        let secs = self.backoff.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_backoff.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_backoff)
    }

    /// True once `failures` attempts have used up the budget.
    pub fn exhausted(&self, failures: u32) -> bool {
        self.max_attempts > 0 && failures >= self.max_attempts
    }
}

/// What to do after a handler asked for a retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again once `delay` has passed.
    Wait { attempts: u32, delay: Duration },
    /// Budget exhausted; fail the record.
    GiveUp { attempts: u32 },
}

#[derive(Debug, Clone)]
struct RetryState {
    attempts: u32,
    next_due: Instant,
}

/// Per-record retry bookkeeping for one stage loop, keyed by file name.
#[derive(Debug, Default)]
pub struct RetryTracker {
    states: HashMap<String, RetryState>,
}

impl RetryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` may be attempted now.
    pub fn is_due(&self, key: &str) -> bool {
        self.is_due_at(key, Instant::now())
    }

    fn is_due_at(&self, key: &str, now: Instant) -> bool {
        self.states
            .get(key)
            .map(|state| state.next_due <= now)
            .unwrap_or(true)
    }

    /// Count a failed attempt and decide whether to keep going.
    pub fn record_retry(&mut self, key: &str, policy: &RetryPolicy) -> RetryDecision {
        let now = Instant::now();
        let state = self.states.entry(key.to_string()).or_insert(RetryState {
            attempts: 0,
            next_due: now,
        });
        state.attempts += 1;
        let attempts = state.attempts;

        if policy.exhausted(attempts) {
            self.states.remove(key);
            return RetryDecision::GiveUp { attempts };
        }

        let delay = policy.delay_for(attempts);
        state.next_due = now + delay;
        RetryDecision::Wait { attempts, delay }
    }

    /// Failed attempts so far for `key`.
    pub fn attempts(&self, key: &str) -> u32 {
        self.states.get(key).map(|s| s.attempts).unwrap_or(0)
    }

    /// Forget `key`, after it succeeded or failed for good.
    pub fn clear(&mut self, key: &str) {
        self.states.remove(key);
    }

    /// Drop state for keys not in `live`, e.g. records moved or deleted
    /// outside the loop.
    pub fn retain_listed<'a>(&mut self, live: impl IntoIterator<Item = &'a str>) {
        let live: HashSet<&str> = live.into_iter().collect();
        self.states.retain(|key, _| live.contains(key.as_str()));
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32, backoff_secs: u64) -> RetryPolicy {
        RetryPolicy::from_config(&RetryConfig {
            max_attempts,
            backoff_secs,
            backoff_multiplier: 2.0,
            max_backoff_secs: 60,
            ..RetryConfig::default()
        })
    }

    #[test]
    fn test_default_is_unbounded_without_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 0);
        assert!(!policy.exhausted(1_000));
        assert_eq!(policy.delay_for(5), Duration::ZERO);
        assert_eq!(policy.io_read_attempts, 3);
    }

    #[test]
    fn test_delay_grows_exponentially_and_caps() {
        let policy = policy(0, 5);
        assert_eq!(policy.delay_for(0), Duration::ZERO);
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(2), Duration::from_secs(10));
        assert_eq!(policy.delay_for(3), Duration::from_secs(20));
        assert_eq!(policy.delay_for(4), Duration::from_secs(40));
        assert_eq!(policy.delay_for(5), Duration::from_secs(60));
        assert_eq!(policy.delay_for(500), Duration::from_secs(60));
    }

    #[test]
    fn test_exhausted() {
        let policy = policy(3, 0);
        assert!(!policy.exhausted(2));
        assert!(policy.exhausted(3));
        assert!(policy.exhausted(4));
    }

    #[test]
    fn test_tracker_forgets_unlisted_keys() {
        let policy = policy(0, 30);
        let mut tracker = RetryTracker::new();
        tracker.record_retry("DRAFT_1.md", &policy);
        tracker.record_retry("DRAFT_2.md", &policy);

        tracker.retain_listed(["DRAFT_2.md", "DRAFT_3.md"]);
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.attempts("DRAFT_1.md"), 0);
        assert_eq!(tracker.attempts("DRAFT_2.md"), 1);

        tracker.retain_listed(std::iter::empty());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_tracker_gives_up_after_budget() {
        let policy = policy(2, 0);
        let mut tracker = RetryTracker::new();
        assert_eq!(
            tracker.record_retry("DRAFT_1.md", &policy),
            RetryDecision::Wait {
                attempts: 1,
                delay: Duration::ZERO
            }
        );
        assert!(tracker.is_due("DRAFT_1.md"));
        assert_eq!(
            tracker.record_retry("DRAFT_1.md", &policy),
            RetryDecision::GiveUp { attempts: 2 }
        );
        // State is dropped once we give up.
        assert_eq!(tracker.attempts("DRAFT_1.md"), 0);
    }

    #[test]
    fn test_tracker_backoff_defers() {
        let policy = policy(0, 30);
        let mut tracker = RetryTracker::new();
        let decision = tracker.record_retry("PLAN_1.md", &policy);
        assert_eq!(
            decision,
            RetryDecision::Wait {
                attempts: 1,
                delay: Duration::from_secs(30)
            }
        );
        assert!(!tracker.is_due("PLAN_1.md"));
        assert!(tracker.is_due_at("PLAN_1.md", Instant::now() + Duration::from_secs(31)));
        // Other records are unaffected.
        assert!(tracker.is_due("PLAN_2.md"));
    }

    #[test]
    fn test_tracker_clear() {
        let policy = RetryPolicy::unbounded();
        let mut tracker = RetryTracker::new();
        tracker.record_retry("a", &policy);
        tracker.record_retry("a", &policy);
        assert_eq!(tracker.attempts("a"), 2);
        tracker.clear("a");
        assert!(tracker.is_empty());
    }
}
