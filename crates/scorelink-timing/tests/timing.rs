//! Integration tests for backoff, refresh cadence, and task handles.
//!
//! Time-dependent tests use `start_paused` so the Tokio clock auto-advances
//! whenever every task is idle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::TimeDelta;
use scorelink_timing::{
    Backoff, ReconnectPolicy, RefreshPolicy, RefreshTicker, RetryDecision, TaskHandle,
};

// =========================================================================
// ReconnectPolicy
// =========================================================================

#[test]
fn test_default_reconnect_policy() {
    let p = ReconnectPolicy::default();
    assert_eq!(p.base_delay, Duration::from_secs(1));
    assert_eq!(p.max_attempts, 5);
}

#[test]
fn test_delay_for_doubles_per_attempt() {
    let p = ReconnectPolicy::default();
    assert_eq!(p.delay_for(1), Some(Duration::from_secs(1)));
    assert_eq!(p.delay_for(2), Some(Duration::from_secs(2)));
    assert_eq!(p.delay_for(3), Some(Duration::from_secs(4)));
    assert_eq!(p.delay_for(4), Some(Duration::from_secs(8)));
}

#[test]
fn test_delay_for_stops_at_max_attempts() {
    let p = ReconnectPolicy::default();
    assert_eq!(p.delay_for(5), None);
    assert_eq!(p.delay_for(6), None);
}

#[test]
fn test_validated_clamps_zero_values() {
    let p = ReconnectPolicy {
        base_delay: Duration::ZERO,
        max_attempts: 0,
    }
    .validated();
    assert_eq!(p.base_delay, Duration::from_millis(1));
    assert_eq!(p.max_attempts, 1);
}

#[test]
fn test_validated_caps_max_attempts() {
    let p = ReconnectPolicy {
        max_attempts: 1_000,
        ..Default::default()
    }
    .validated();
    assert_eq!(p.max_attempts, ReconnectPolicy::MAX_ATTEMPTS_LIMIT);
}

// =========================================================================
// Backoff
// =========================================================================

#[test]
fn test_backoff_five_failures_exhaust() {
    let mut b = Backoff::new(ReconnectPolicy::default());

    let mut delays = Vec::new();
    for _ in 0..4 {
        match b.record_failure() {
            RetryDecision::Retry { delay, .. } => delays.push(delay),
            other => panic!("expected retry, got {other:?}"),
        }
    }
    assert_eq!(
        delays,
        [1, 2, 4, 8].map(Duration::from_secs).to_vec(),
        "delays must follow base * 2^(attempt-1)"
    );

    assert_eq!(b.record_failure(), RetryDecision::Exhausted { attempts: 5 });
}

#[test]
fn test_backoff_reset_starts_over() {
    let mut b = Backoff::new(ReconnectPolicy::default());
    b.record_failure();
    b.record_failure();
    assert_eq!(b.attempts(), 2);

    b.reset();

    assert_eq!(b.attempts(), 0);
    assert_eq!(
        b.record_failure(),
        RetryDecision::Retry {
            attempt: 1,
            delay: Duration::from_secs(1)
        }
    );
}

// =========================================================================
// RefreshPolicy
// =========================================================================

#[test]
fn test_default_refresh_policy() {
    let p = RefreshPolicy::default();
    assert_eq!(p.interval, Duration::from_secs(900));
    assert_eq!(p.safety_margin, Duration::from_secs(300));
}

#[test]
fn test_renewal_due_inside_margin() {
    let p = RefreshPolicy::default();
    assert!(p.renewal_due(TimeDelta::minutes(4)));
    assert!(!p.renewal_due(TimeDelta::minutes(6)));
}

#[test]
fn test_renewal_due_when_already_expired() {
    let p = RefreshPolicy::default();
    assert!(p.renewal_due(TimeDelta::seconds(-30)));
}

#[test]
fn test_refresh_validated_clamps_interval() {
    let p = RefreshPolicy {
        interval: Duration::ZERO,
        ..Default::default()
    }
    .validated();
    assert_eq!(p.interval, RefreshPolicy::MIN_INTERVAL);
}

// =========================================================================
// RefreshTicker
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_ticker_first_tick_is_immediate() {
    let mut t = RefreshTicker::new(RefreshPolicy::default());

    let first = tokio::time::timeout(Duration::from_millis(1), t.wait_for_tick()).await;

    assert_eq!(first, Ok(1));
}

#[tokio::test(start_paused = true)]
async fn test_ticker_fires_every_interval() {
    let mut t = RefreshTicker::new(RefreshPolicy {
        interval: Duration::from_secs(60),
        ..Default::default()
    });
    let start = tokio::time::Instant::now();

    t.wait_for_tick().await;
    t.wait_for_tick().await;
    t.wait_for_tick().await;

    assert_eq!(t.tick_count(), 3);
    assert_eq!(start.elapsed(), Duration::from_secs(120));
}

// =========================================================================
// TaskHandle
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_loop() {
    let counter = Arc::new(AtomicU32::new(0));
    let c = counter.clone();
    let handle = TaskHandle::spawn("counter", async move {
        loop {
            c.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    });

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    handle.cancel().await;
    let seen = counter.load(Ordering::SeqCst);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(counter.load(Ordering::SeqCst), seen);
}

#[tokio::test]
async fn test_is_finished_after_task_returns() {
    let handle = TaskHandle::spawn("oneshot", async {});

    while !handle.is_finished() {
        tokio::task::yield_now().await;
    }

    assert_eq!(handle.name(), "oneshot");
    handle.cancel().await;
}
