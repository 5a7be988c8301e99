//! Per-identity token accounting
//!
//! An [`Account`] is a continuous counter bounded by the policy capacity.
//! Refill is a time-proportional increment; admission is a guarded decrement.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::config::Policy;

/// Token accounting record for one identity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Account {
    /// Current token count, within `[0, capacity]`
    pub level: f64,

    /// Time of the last refill computation (ms since epoch)
    pub last_refill_ms: u64,

    /// Time of the last admission query of any outcome (ms since epoch)
    pub last_seen_ms: u64,

    /// Requests admitted
    pub accepted: u64,

    /// Requests rejected
    pub rejected: u64,
}

impl Account {
    /// Fresh account: empty, never refilled.
    ///
    /// The first refill credits the whole time since the epoch, so a new
    /// identity starts out full.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an admission query at `now_ms`
    pub fn touch(&mut self, now_ms: u64) {
        self.last_seen_ms = self.last_seen_ms.max(now_ms);
    }

    /// Bring the level up to date with `now_ms`
    pub fn refill(&mut self, policy: &Policy, now_ms: u64) {
        if policy.is_always_full() {
            self.level = policy.capacity;
            return;
        }

        let elapsed_ms = now_ms.saturating_sub(self.last_refill_ms);
        self.last_refill_ms = self.last_refill_ms.max(now_ms);

        // Multiply before dividing: 500ms * 10 / 1000ms is exactly 5
        let credit = elapsed_ms as f64 * policy.refill_rate / policy.refill_interval.millis();
        self.level = (self.level + credit).min(policy.capacity).max(0.0);

        tracing::trace!(
            elapsed_ms,
            credit,
            level = self.level,
            "Refilled account"
        );
    }

    /// Debit `count` tokens if available
    ///
    /// The caller refills first. A rejected debit leaves the level untouched.
    pub fn try_debit(&mut self, count: f64) -> bool {
        if count > self.level {
            self.rejected += 1;
            return false;
        }

        self.level -= count;
        self.accepted += 1;
        true
    }

    /// Time until `count` tokens will have dripped in, from the current level
    ///
    /// `None` when the bucket never refills by time decay.
    pub fn time_until_available(&self, policy: &Policy, count: f64) -> Option<Duration> {
        if count <= self.level {
            return Some(Duration::ZERO);
        }

        if policy.tokens_per_ms() <= 0.0 {
            return None;
        }

        let needed_ms =
            ((count - self.level) * policy.refill_interval.millis() / policy.refill_rate).ceil();
        Some(Duration::from_millis(needed_ms as u64))
    }

    /// Snapshot for inspection, tagged with its identity
    pub fn snapshot(&self, identity: &str) -> AccountSnapshot {
        AccountSnapshot {
            identity: identity.to_string(),
            level: self.level,
            last_refill_ms: self.last_refill_ms,
            last_seen_ms: self.last_seen_ms,
            accepted: self.accepted,
            rejected: self.rejected,
        }
    }
}

/// Point-in-time copy of an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Identity the account belongs to
    pub identity: String,

    /// Token level at the last refill or debit
    pub level: f64,

    /// Time of the last refill (ms since epoch)
    pub last_refill_ms: u64,

    /// Time of the last admission query (ms since epoch)
    pub last_seen_ms: u64,

    /// Requests admitted
    pub accepted: u64,

    /// Requests rejected
    pub rejected: u64,
}
