//! Bucket Pool Library
//!
//! A token-bucket rate limiter for embedding in APIs, job queues and
//! connection handlers. One [`BucketPool`] holds a rate policy and answers
//! admission queries per caller identity.
//!
//! ```
//! use bucket_pool::BucketPool;
//!
//! let pool = BucketPool::new(5.0, 5.0, "second")?;
//! assert!(pool.accept(5.0, "u1"));
//! assert!(!pool.accept(1.0, "u1"));
//! # Ok::<(), bucket_pool::PoolError>(())
//! ```

pub mod rate_limit;

pub use rate_limit::{
    Account, AccountSnapshot, AccountStore, BucketPool, Clock, Decision, DenyReason, Identity,
    ManualClock, Policy, PoolConfig, PoolError, RefillInterval, SystemClock,
};
