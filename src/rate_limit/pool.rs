//! Bucket Pool
//!
//! Central admission point: one rate policy, one account per identity.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::account::{Account, AccountSnapshot};
use super::clock::{Clock, SystemClock};
use super::config::{Policy, PoolConfig, RefillInterval};
use super::error::PoolError;
use super::store::AccountStore;

/// Who a request is accounted against
///
/// Only named identities share accounting. An anonymous request is checked
/// against a throwaway account that is never stored, so it can never be
/// limited by earlier anonymous requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    Named(String),
    Anonymous,
}

impl Identity {
    /// Named identity; an empty name is anonymous
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.is_empty() {
            Identity::Anonymous
        } else {
            Identity::Named(name)
        }
    }

    /// Account key, if any
    pub fn name(&self) -> Option<&str> {
        match self {
            Identity::Named(name) if !name.is_empty() => Some(name),
            _ => None,
        }
    }
}

impl From<&str> for Identity {
    fn from(name: &str) -> Self {
        Identity::named(name)
    }
}

impl From<String> for Identity {
    fn from(name: String) -> Self {
        Identity::named(name)
    }
}

impl From<&String> for Identity {
    fn from(name: &String) -> Self {
        Identity::named(name.as_str())
    }
}

impl<T: Into<Identity>> From<Option<T>> for Identity {
    fn from(name: Option<T>) -> Self {
        name.map_or(Identity::Anonymous, Into::into)
    }
}

/// Why a request was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Request is larger than the burst capacity and can never succeed
    ExceedsCapacity,
    /// Not enough tokens right now
    InsufficientTokens,
    /// Count is negative or not a number
    InvalidCount,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::ExceedsCapacity => f.write_str("request exceeds bucket capacity"),
            DenyReason::InsufficientTokens => f.write_str("insufficient tokens"),
            DenyReason::InvalidCount => f.write_str("invalid token count"),
        }
    }
}

/// Result of an admission check
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Whether the request is allowed
    pub allowed: bool,

    /// Tokens left in the account after this request
    pub remaining: f64,

    /// Time until the request could succeed (if not allowed and ever possible)
    pub retry_after: Option<Duration>,

    /// Reason for denial (if not allowed)
    pub reason: Option<DenyReason>,
}

impl Decision {
    /// Create an allowed decision
    pub fn allowed(remaining: f64) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after: None,
            reason: None,
        }
    }

    /// Create a denied decision
    pub fn denied(remaining: f64, retry_after: Option<Duration>, reason: DenyReason) -> Self {
        Self {
            allowed: false,
            remaining,
            retry_after,
            reason: Some(reason),
        }
    }
}

/// Token-bucket pool with per-identity accounting
#[derive(Debug)]
pub struct BucketPool<C = SystemClock> {
    /// Configuration
    config: PoolConfig,

    /// Account store
    store: AccountStore,

    /// Time source
    clock: C,
}

impl BucketPool<SystemClock> {
    /// Create a pool from capacity, refill rate and refill interval
    ///
    /// The interval is milliseconds (`u64`, `f64`, `Duration`) or a symbolic
    /// name such as `"second"` or `"hr"`.
    pub fn new<I>(capacity: f64, refill_rate: f64, refill_interval: I) -> Result<Self, PoolError>
    where
        I: TryInto<RefillInterval>,
        PoolError: From<I::Error>,
    {
        let policy = Policy::new(capacity, refill_rate, refill_interval.try_into()?);
        Self::with_config(PoolConfig::new(policy))
    }

    /// Create a pool from a full configuration
    pub fn with_config(config: PoolConfig) -> Result<Self, PoolError> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> BucketPool<C> {
    /// Create a pool reading time from `clock`
    pub fn with_clock(config: PoolConfig, clock: C) -> Result<Self, PoolError> {
        config.validate()?;

        let store = match config.max_accounts {
            Some(max) => AccountStore::bounded(max),
            None => AccountStore::new(),
        };

        info!(
            capacity = config.policy.capacity,
            refill_rate = config.policy.refill_rate,
            refill_interval = %config.policy.refill_interval,
            max_accounts = ?config.max_accounts,
            "Bucket pool created"
        );

        Ok(Self {
            config,
            store,
            clock,
        })
    }

    /// Admit or reject `count` tokens for `identity`
    pub fn accept(&self, count: f64, identity: impl Into<Identity>) -> bool {
        self.check(count, identity).allowed
    }

    /// Same as [`accept`](Self::accept), with the detail behind the answer
    pub fn check(&self, count: f64, identity: impl Into<Identity>) -> Decision {
        let identity = identity.into();
        match identity.name() {
            Some(name) => self
                .store
                .with_account(name, |account| self.admit(account, count, Some(name))),
            None => self.admit(&mut Account::new(), count, None),
        }
    }

    fn admit(&self, account: &mut Account, count: f64, identity: Option<&str>) -> Decision {
        let policy = &self.config.policy;
        let now_ms = self.clock.now_ms();
        account.touch(now_ms);

        if policy.is_unlimited() {
            return Decision::allowed(f64::INFINITY);
        }

        if count.is_nan() || count < 0.0 {
            account.rejected += 1;
            debug!(identity, count, "Rejected invalid token count");
            return Decision::denied(account.level, None, DenyReason::InvalidCount);
        }

        // Capacity is a static ceiling; no amount of refill can satisfy this
        if count > policy.capacity {
            account.rejected += 1;
            debug!(
                identity,
                count,
                capacity = policy.capacity,
                "Rejected request larger than capacity"
            );
            return Decision::denied(account.level, None, DenyReason::ExceedsCapacity);
        }

        account.refill(policy, now_ms);

        if account.try_debit(count) {
            Decision::allowed(account.level)
        } else {
            let retry_after = account.time_until_available(policy, count);
            debug!(
                identity,
                count,
                level = account.level,
                retry_after_ms = retry_after.map(|d| d.as_millis() as u64),
                "Rate limit exceeded"
            );
            Decision::denied(account.level, retry_after, DenyReason::InsufficientTokens)
        }
    }

    /// Remove accounts idle longer than the configured TTL
    ///
    /// Does nothing when no idle TTL is configured.
    pub fn sweep_stale(&self) -> usize {
        match self.config.idle_ttl_ms() {
            Some(ttl_ms) => self.sweep_idle_for(Duration::from_millis(ttl_ms)),
            None => 0,
        }
    }

    /// Remove accounts not queried within `max_idle`
    pub fn sweep_idle_for(&self, max_idle: Duration) -> usize {
        let max_idle_ms = u64::try_from(max_idle.as_millis()).unwrap_or(u64::MAX);
        let cutoff_ms = self.clock.now_ms().saturating_sub(max_idle_ms);
        let removed = self.store.remove_idle_since(cutoff_ms);

        if removed > 0 {
            info!(
                removed,
                remaining = self.store.len(),
                "Swept idle accounts"
            );
        }

        removed
    }

    /// Current level for `identity`, if tracked
    pub fn level(&self, identity: &str) -> Option<f64> {
        self.store.get(identity).map(|account| account.level)
    }

    /// Snapshot of one account
    pub fn snapshot(&self, identity: &str) -> Option<AccountSnapshot> {
        self.store
            .get(identity)
            .map(|account| account.snapshot(identity))
    }

    /// Snapshots of every tracked account
    pub fn snapshots(&self) -> Vec<AccountSnapshot> {
        self.store.snapshots()
    }

    /// Whether `identity` has an account
    pub fn contains(&self, identity: &str) -> bool {
        self.store.contains(identity)
    }

    /// Forget `identity`; its next request starts from a fresh account
    pub fn remove(&self, identity: &str) -> Option<AccountSnapshot> {
        self.store
            .remove(identity)
            .map(|account| account.snapshot(identity))
    }

    /// Forget every identity
    pub fn clear(&self) {
        self.store.clear();
    }

    /// Number of tracked identities
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether no identities are tracked
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Rate policy
    pub fn policy(&self) -> &Policy {
        &self.config.policy
    }

    /// Full configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

impl<C: Clock + 'static> BucketPool<C> {
    /// Run [`sweep_stale`](Self::sweep_stale) every `every` on the tokio runtime
    ///
    /// The task ends once the last `Arc` to the pool is dropped, or when the
    /// returned handle is aborted. A zero period is rejected.
    pub fn spawn_sweeper(pool: &Arc<Self>, every: Duration) -> Result<JoinHandle<()>, PoolError> {
        if every.is_zero() {
            return Err(PoolError::ZeroSweepPeriod);
        }

        let pool: Weak<Self> = Arc::downgrade(pool);

        Ok(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match pool.upgrade() {
                    Some(pool) => {
                        pool.sweep_stale();
                    }
                    None => {
                        debug!("Bucket pool dropped, stopping sweeper");
                        break;
                    }
                }
            }
        }))
    }
}
