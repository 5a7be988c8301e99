//! Bucket Pool Error Types
//!
//! Configuration defects detected when a pool is built. Admission itself never
//! fails; it only answers yes or no.

/// Error types for pool construction and configuration loading
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Capacity is negative or not a finite number
    #[error("Invalid capacity: {0} (must be a finite number >= 0)")]
    InvalidCapacity(f64),

    /// Refill rate is negative or not a finite number
    #[error("Invalid refill rate: {0} (must be a finite number >= 0)")]
    InvalidRefillRate(f64),

    /// Interval milliseconds are negative or not a finite number
    #[error("Invalid refill interval: {0}ms (must be a finite number >= 0)")]
    InvalidIntervalMillis(f64),

    /// Symbolic interval not in the duration table
    #[error("Unknown refill interval '{0}' (expected sec, second, min, minute, hr, hour or day)")]
    UnknownInterval(String),

    /// A non-zero rate needs a non-zero interval to divide by
    #[error("Refill rate {0} requires a non-zero refill interval")]
    ZeroInterval(f64),

    /// Idle TTL multiplier is negative or not a finite number
    #[error("Invalid idle TTL: {0} intervals (must be a finite number > 0)")]
    InvalidIdleTtl(f64),

    /// Idle TTL counted in intervals, but the interval is zero
    #[error("Idle TTL of {0} intervals requires a non-zero refill interval")]
    IdleTtlWithoutInterval(f64),

    /// Sweeper period of zero
    #[error("Sweep period must be greater than 0")]
    ZeroSweepPeriod,

    /// Account bound of zero would evict every identity on insert
    #[error("max_accounts must be greater than 0")]
    ZeroMaxAccounts,

    /// Environment variable present but unparsable
    #[error("Invalid value for {var}: '{value}'")]
    Env { var: &'static str, value: String },

    /// Malformed JSON configuration
    #[error("Configuration parse error: {0}")]
    Json(#[from] serde_json::Error),
}

// Lets infallible interval conversions share the fallible constructor path.
impl From<std::convert::Infallible> for PoolError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}
