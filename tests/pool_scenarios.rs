//! End-to-end admission scenarios against a manually driven clock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bucket_pool::{
    BucketPool, DenyReason, Identity, ManualClock, Policy, PoolConfig, RefillInterval,
};
use proptest::prelude::*;

const START: u64 = 1_700_000_000_000;

fn manual_pool(policy: Policy) -> anyhow::Result<(BucketPool<ManualClock>, ManualClock)> {
    let clock = ManualClock::new(START);
    let pool = BucketPool::with_clock(PoolConfig::new(policy), clock.clone())?;
    Ok((pool, clock))
}

#[test]
fn test_five_per_second_scenario() -> anyhow::Result<()> {
    let policy = Policy::new(5.0, 5.0, "second".parse()?);
    let (pool, clock) = manual_pool(policy)?;

    assert!(pool.accept(5.0, "u1"));
    assert_eq!(pool.level("u1"), Some(0.0));
    assert!(!pool.accept(1.0, "u1"));

    clock.advance(Duration::from_millis(1000));
    assert!(pool.accept(5.0, "u1"));
    assert!(!pool.accept(1.0, "u1"));

    Ok(())
}

#[test]
fn test_half_second_drip() -> anyhow::Result<()> {
    let (pool, clock) = manual_pool(Policy::new(10.0, 10.0, RefillInterval::Millis(1000.0)))?;

    assert!(pool.accept(10.0, "drain"));
    clock.advance(Duration::from_millis(500));

    let decision = pool.check(6.0, "drain");
    assert!(!decision.allowed);
    assert_eq!(decision.reason, Some(DenyReason::InsufficientTokens));
    assert_eq!(decision.remaining, 5.0);
    assert_eq!(decision.retry_after, Some(Duration::from_millis(100)));

    assert!(pool.accept(5.0, "drain"));
    Ok(())
}

#[test]
fn test_identities_do_not_share_tokens() -> anyhow::Result<()> {
    let (pool, _clock) = manual_pool(Policy::new(3.0, 1.0, RefillInterval::Minute))?;

    assert!(pool.accept(3.0, "alice"));
    assert!(!pool.accept(1.0, "alice"));
    assert!(pool.accept(3.0, "bob"));
    assert!(!pool.accept(1.0, "bob"));

    Ok(())
}

#[test]
fn test_anonymous_requests_are_independent() -> anyhow::Result<()> {
    let (pool, _clock) = manual_pool(Policy::new(3.0, 1.0, RefillInterval::Day))?;

    for _ in 0..50 {
        assert!(pool.accept(3.0, Identity::Anonymous));
    }
    assert!(!pool.accept(4.0, Identity::Anonymous));
    assert_eq!(pool.len(), 0);

    Ok(())
}

#[test]
fn test_unlimited_pool() -> anyhow::Result<()> {
    let pool = BucketPool::with_config(PoolConfig::new(Policy::unlimited()))?;
    for n in 1..500 {
        assert!(pool.accept(n as f64 * 1_000.0, format!("caller-{}", n % 7)));
    }
    Ok(())
}

#[test]
fn test_wall_clock_pool() -> anyhow::Result<()> {
    let pool = BucketPool::new(2.0, 1.0, "hour")?;
    assert!(pool.accept(2.0, "u1"));
    assert!(!pool.accept(1.0, "u1"));
    Ok(())
}

#[test]
fn test_concurrent_callers_never_over_admit() -> anyhow::Result<()> {
    let (pool, _clock) = manual_pool(Policy::new(100.0, 1.0, RefillInterval::Hour))?;
    let pool = Arc::new(pool);
    let admitted = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let admitted = Arc::clone(&admitted);
            thread::spawn(move || {
                for _ in 0..50 {
                    if pool.accept(1.0, "shared") {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker panicked");
    }

    assert_eq!(admitted.load(Ordering::SeqCst), 100);
    assert_eq!(pool.level("shared"), Some(0.0));

    let snapshot = pool.snapshot("shared").expect("account exists");
    assert_eq!(snapshot.accepted, 100);
    assert_eq!(snapshot.rejected, 700);
    Ok(())
}

#[test]
fn test_concurrent_distinct_identities() -> anyhow::Result<()> {
    let (pool, _clock) = manual_pool(Policy::new(10.0, 1.0, RefillInterval::Hour))?;
    let pool = Arc::new(pool);

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                let identity = format!("worker-{}", worker);
                (0..20)
                    .filter(|_| pool.accept(1.0, identity.as_str()))
                    .count()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().expect("worker panicked"), 10);
    }
    assert_eq!(pool.len(), 8);
    Ok(())
}

#[test]
fn test_config_driven_pool() -> anyhow::Result<()> {
    let config = PoolConfig::from_json(
        r#"{"capacity": 2, "refill_rate": 1, "refill_interval": "sec", "max_accounts": 1}"#,
    )?;
    let clock = ManualClock::new(START);
    let pool = BucketPool::with_clock(config, clock.clone())?;

    assert!(pool.accept(2.0, "a"));
    clock.advance(Duration::from_millis(1));
    assert!(pool.accept(2.0, "b"));

    // "a" was evicted to make room for "b" and comes back full
    assert_eq!(pool.len(), 1);
    assert!(!pool.contains("a"));
    clock.advance(Duration::from_millis(1));
    assert!(pool.accept(2.0, "a"));
    Ok(())
}

#[derive(Debug, Clone)]
struct Step {
    advance_ms: u64,
    count: f64,
    identity: u8,
}

fn step() -> impl Strategy<Value = Step> {
    (0u64..5_000, 0.0f64..12.0, 0u8..3).prop_map(|(advance_ms, count, identity)| Step {
        advance_ms,
        count,
        identity,
    })
}

proptest! {
    #[test]
    fn prop_level_stays_within_capacity(
        capacity in 1.0f64..50.0,
        rate in 0.0f64..20.0,
        interval_ms in 1u64..10_000,
        steps in prop::collection::vec(step(), 1..100),
    ) {
        let policy = Policy::new(capacity, rate, RefillInterval::Millis(interval_ms as f64));
        let (pool, clock) = manual_pool(policy).unwrap();

        for step in steps {
            clock.advance(Duration::from_millis(step.advance_ms));
            let identity = format!("id-{}", step.identity);
            pool.accept(step.count, identity.as_str());

            let level = pool.level(&identity).unwrap();
            prop_assert!(level >= 0.0, "level {} below zero", level);
            prop_assert!(level <= capacity, "level {} above capacity {}", level, capacity);
        }
    }

    #[test]
    fn prop_oversized_request_always_rejected(
        capacity in 1.0f64..100.0,
        excess in 0.001f64..100.0,
        waits in prop::collection::vec(0u64..1_000_000, 1..20),
    ) {
        let policy = Policy::new(capacity, capacity, RefillInterval::Second);
        let (pool, clock) = manual_pool(policy).unwrap();

        for wait in waits {
            clock.advance(Duration::from_millis(wait));
            prop_assert!(!pool.accept(capacity + excess, "big"));
        }
        prop_assert!(pool.accept(capacity, "big"));
    }

    #[test]
    fn prop_rejection_is_idempotent(
        capacity in 2.0f64..50.0,
        drained in 0.5f64..1.0,
    ) {
        let policy = Policy::new(capacity, 1.0, RefillInterval::Hour);
        let (pool, _clock) = manual_pool(policy).unwrap();

        prop_assert!(pool.accept(capacity * drained, "u"));
        let after_take = pool.level("u").unwrap();

        let ask = after_take + 0.25;
        prop_assert!(!pool.accept(ask, "u"));
        let first = pool.level("u").unwrap();
        prop_assert!(!pool.accept(ask, "u"));
        let second = pool.level("u").unwrap();

        prop_assert_eq!(first, after_take);
        prop_assert_eq!(first, second);
    }
}
