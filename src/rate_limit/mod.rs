//! Token-Bucket Rate Limiting
//!
//! This module provides a pool of token buckets sharing one rate policy, with
//! one account per caller identity.
//!
//! # Features
//!
//! - Token bucket algorithm with fractional, time-proportional refill
//! - Per-identity accounting, created lazily on first use
//! - Accept-or-reject admission: no queueing, no waiting
//! - Optional account bound and idle sweep to keep memory in check
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Bucket Pool                          │
//! │          Policy (capacity, refill rate, interval)           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐          │
//! │  │ Account "a" │  │ Account "b" │  │ Account "c" │   ...    │
//! │  └─────────────┘  └─────────────┘  └─────────────┘          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │        Account Store (in-memory, per-account lock)  │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod account;
pub mod clock;
pub mod config;
pub mod error;
pub mod pool;
pub mod store;

pub use account::{Account, AccountSnapshot};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Policy, PoolConfig, RefillInterval};
pub use error::PoolError;
pub use pool::{BucketPool, Decision, DenyReason, Identity};
pub use store::AccountStore;
