//! Bucket Pool Configuration
//!
//! Rate policy and storage lifecycle settings for a [`BucketPool`](super::BucketPool).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::error::PoolError;

/// Milliseconds per symbolic duration
pub const SECOND_MS: f64 = 1_000.0;
pub const MINUTE_MS: f64 = 60_000.0;
pub const HOUR_MS: f64 = 3_600_000.0;
pub const DAY_MS: f64 = 86_400_000.0;

/// Duration over which `refill_rate` tokens are added
///
/// Deserializes from a JSON number (milliseconds) or a symbolic string.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawInterval", into = "RawInterval")]
pub enum RefillInterval {
    /// Literal millisecond count
    Millis(f64),
    Second,
    Minute,
    Hour,
    Day,
}

impl RefillInterval {
    /// Interval length in milliseconds
    pub fn millis(&self) -> f64 {
        match self {
            RefillInterval::Millis(ms) => *ms,
            RefillInterval::Second => SECOND_MS,
            RefillInterval::Minute => MINUTE_MS,
            RefillInterval::Hour => HOUR_MS,
            RefillInterval::Day => DAY_MS,
        }
    }

    /// Resolve a symbolic duration name
    pub fn symbolic(name: &str) -> Result<Self, PoolError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sec" | "second" => Ok(RefillInterval::Second),
            "min" | "minute" => Ok(RefillInterval::Minute),
            "hr" | "hour" => Ok(RefillInterval::Hour),
            "day" => Ok(RefillInterval::Day),
            _ => Err(PoolError::UnknownInterval(name.to_string())),
        }
    }
}

impl Default for RefillInterval {
    fn default() -> Self {
        RefillInterval::Millis(0.0)
    }
}

impl fmt::Display for RefillInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefillInterval::Millis(ms) => write!(f, "{}ms", ms),
            RefillInterval::Second => f.write_str("second"),
            RefillInterval::Minute => f.write_str("minute"),
            RefillInterval::Hour => f.write_str("hour"),
            RefillInterval::Day => f.write_str("day"),
        }
    }
}

/// Accepts either a bare millisecond count or a symbolic name.
impl FromStr for RefillInterval {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().parse::<f64>() {
            Ok(ms) => Ok(RefillInterval::Millis(ms)),
            Err(_) => RefillInterval::symbolic(s),
        }
    }
}

impl TryFrom<&str> for RefillInterval {
    type Error = PoolError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl TryFrom<String> for RefillInterval {
    type Error = PoolError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<u64> for RefillInterval {
    fn from(ms: u64) -> Self {
        RefillInterval::Millis(ms as f64)
    }
}

impl From<f64> for RefillInterval {
    fn from(ms: f64) -> Self {
        RefillInterval::Millis(ms)
    }
}

impl From<Duration> for RefillInterval {
    fn from(d: Duration) -> Self {
        RefillInterval::Millis(d.as_secs_f64() * 1_000.0)
    }
}

/// Wire form of [`RefillInterval`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawInterval {
    Millis(f64),
    Symbolic(String),
}

impl TryFrom<RawInterval> for RefillInterval {
    type Error = PoolError;

    fn try_from(raw: RawInterval) -> Result<Self, Self::Error> {
        match raw {
            RawInterval::Millis(ms) => Ok(RefillInterval::Millis(ms)),
            RawInterval::Symbolic(name) => RefillInterval::symbolic(&name),
        }
    }
}

impl From<RefillInterval> for RawInterval {
    fn from(interval: RefillInterval) -> Self {
        match interval {
            RefillInterval::Millis(ms) => RawInterval::Millis(ms),
            symbolic => RawInterval::Symbolic(symbolic.to_string()),
        }
    }
}

/// Rate policy shared by every account in a pool
///
/// Zero capacity means unlimited: every request is admitted without
/// accounting. Zero refill rate means the bucket is topped up to capacity on
/// every check instead of dripping.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Maximum tokens a bucket may hold (burst size)
    pub capacity: f64,

    /// Tokens added per `refill_interval`
    pub refill_rate: f64,

    /// Duration over which `refill_rate` tokens drip in
    pub refill_interval: RefillInterval,
}

impl Policy {
    /// Create a policy from its three parameters
    pub fn new(capacity: f64, refill_rate: f64, refill_interval: RefillInterval) -> Self {
        Self {
            capacity,
            refill_rate,
            refill_interval,
        }
    }

    /// Policy that admits everything
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Whether admission skips accounting entirely
    pub fn is_unlimited(&self) -> bool {
        self.capacity == 0.0
    }

    /// Whether the bucket is always full instead of dripping
    pub fn is_always_full(&self) -> bool {
        self.refill_rate == 0.0
    }

    /// Tokens added per millisecond of elapsed time
    pub fn tokens_per_ms(&self) -> f64 {
        if self.is_always_full() {
            return 0.0;
        }
        self.refill_rate / self.refill_interval.millis()
    }

    /// Reject values that would poison the level arithmetic
    pub fn validate(&self) -> Result<(), PoolError> {
        if !self.capacity.is_finite() || self.capacity < 0.0 {
            return Err(PoolError::InvalidCapacity(self.capacity));
        }

        if !self.refill_rate.is_finite() || self.refill_rate < 0.0 {
            return Err(PoolError::InvalidRefillRate(self.refill_rate));
        }

        let interval_ms = self.refill_interval.millis();
        if !interval_ms.is_finite() || interval_ms < 0.0 {
            return Err(PoolError::InvalidIntervalMillis(interval_ms));
        }

        if !self.is_always_full() && interval_ms == 0.0 {
            return Err(PoolError::ZeroInterval(self.refill_rate));
        }

        Ok(())
    }
}

/// Pool configuration: policy plus account lifecycle settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Rate policy
    #[serde(flatten)]
    pub policy: Policy,

    /// Upper bound on tracked identities (oldest evicted first)
    #[serde(default)]
    pub max_accounts: Option<usize>,

    /// Accounts idle for this many refill intervals are swept
    #[serde(default)]
    pub idle_ttl_intervals: Option<f64>,
}

impl PoolConfig {
    /// Create a configuration with no account bound and no idle TTL
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            max_accounts: None,
            idle_ttl_intervals: None,
        }
    }

    /// Bound the number of tracked identities
    pub fn with_max_accounts(mut self, max_accounts: usize) -> Self {
        self.max_accounts = Some(max_accounts);
        self
    }

    /// Sweep accounts idle for `intervals` refill intervals
    pub fn with_idle_ttl(mut self, intervals: f64) -> Self {
        self.idle_ttl_intervals = Some(intervals);
        self
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, PoolError> {
        let mut config = Self::default();

        if let Some(val) = env_var("BUCKET_POOL_CAPACITY") {
            config.policy.capacity = parse_env("BUCKET_POOL_CAPACITY", &val)?;
        }

        if let Some(val) = env_var("BUCKET_POOL_REFILL_RATE") {
            config.policy.refill_rate = parse_env("BUCKET_POOL_REFILL_RATE", &val)?;
        }

        if let Some(val) = env_var("BUCKET_POOL_REFILL_INTERVAL") {
            config.policy.refill_interval = val.parse()?;
        }

        if let Some(val) = env_var("BUCKET_POOL_MAX_ACCOUNTS") {
            config.max_accounts = Some(parse_env("BUCKET_POOL_MAX_ACCOUNTS", &val)?);
        }

        if let Some(val) = env_var("BUCKET_POOL_IDLE_TTL_INTERVALS") {
            config.idle_ttl_intervals = Some(parse_env("BUCKET_POOL_IDLE_TTL_INTERVALS", &val)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON document
    pub fn from_json(json: &str) -> Result<Self, PoolError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), PoolError> {
        self.policy.validate()?;

        if self.max_accounts == Some(0) {
            return Err(PoolError::ZeroMaxAccounts);
        }

        if let Some(ttl) = self.idle_ttl_intervals {
            if !ttl.is_finite() || ttl <= 0.0 {
                return Err(PoolError::InvalidIdleTtl(ttl));
            }

            // An unset interval would make the TTL zero and the sweep a no-op
            if self.policy.refill_interval.millis() == 0.0 {
                return Err(PoolError::IdleTtlWithoutInterval(ttl));
            }
        }

        Ok(())
    }

    /// Age after which an untouched account is considered stale
    pub fn idle_ttl_ms(&self) -> Option<u64> {
        let intervals = self.idle_ttl_intervals?;
        let ms = intervals * self.policy.refill_interval.millis();
        if ms > 0.0 {
            Some(ms.ceil() as u64)
        } else {
            None
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: FromStr>(var: &'static str, value: &str) -> Result<T, PoolError> {
    value.trim().parse().map_err(|_| PoolError::Env {
        var,
        value: value.to_string(),
    })
}
