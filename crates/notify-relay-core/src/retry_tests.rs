//! Tests for retry policy module

use super::*;
use std::time::Duration;

// ============================================================================
// RetryPolicy Tests
// ============================================================================

#[test]
fn test_retry_policy_default_values() {
    let policy = RetryPolicy::default();

    assert_eq!(policy.max_delivery_attempts, 3);
}

#[test]
fn test_default_policy_drops_on_third_attempt() {
    let policy = RetryPolicy::default();

    assert!(!policy.should_drop(1));
    assert!(!policy.should_drop(2));
    assert!(policy.should_drop(3));
    assert!(policy.should_drop(4));
}

#[test]
fn test_single_attempt_policy_drops_immediately() {
    let policy = RetryPolicy::new(1);

    assert!(policy.should_drop(1));
}

#[test]
fn test_larger_limit_allows_more_redeliveries() {
    let policy = RetryPolicy::new(10);

    assert!(!policy.should_drop(9));
    assert!(policy.should_drop(10));
}

/// Verify the bound: a message is never broadcast more than the limit.
#[test]
fn test_broadcasts_never_exceed_limit() {
    for limit in 1..=6 {
        let policy = RetryPolicy::new(limit);

        // Every attempt fails; count broadcasts until the message is dropped.
        let mut broadcasts = 0;
        for attempt in 1.. {
            broadcasts += 1;
            if policy.should_drop(attempt) {
                break;
            }
        }

        assert_eq!(broadcasts, limit);
    }
}

/// Verify that only messages past the limit count as exhausted.
#[test]
fn test_exhausted_only_beyond_limit() {
    let policy = RetryPolicy::default();

    assert!(!policy.is_exhausted(1));
    assert!(!policy.is_exhausted(3));
    assert!(policy.is_exhausted(4));
}

#[test]
fn test_retry_policy_deserializes_with_defaults() {
    let policy: RetryPolicy = serde_json::from_str("{}").unwrap();
    assert_eq!(policy, RetryPolicy::default());

    let policy: RetryPolicy = serde_json::from_str(r#"{"max_delivery_attempts": 5}"#).unwrap();
    assert_eq!(policy.max_delivery_attempts, 5);
}

// ============================================================================
// ReceiveBackoff Tests
// ============================================================================

#[test]
fn test_receive_backoff_default_values() {
    let backoff = ReceiveBackoff::default();

    assert_eq!(backoff.initial_delay, Duration::from_millis(250));
    assert_eq!(backoff.max_delay, Duration::from_secs(5));
    assert_eq!(backoff.backoff_multiplier, 2.0);
    assert!(backoff.use_jitter);
    assert_eq!(backoff.jitter_percent, 0.25);
}

#[test]
fn test_first_transient_failure_retries_immediately() {
    let backoff = ReceiveBackoff::default();

    assert_eq!(backoff.delay_for(1, true), Duration::ZERO);
}

#[test]
fn test_non_transient_failure_always_waits() {
    let backoff = ReceiveBackoff::default().without_jitter();

    assert_eq!(backoff.delay_for(1, false), Duration::from_millis(250));
    assert_eq!(backoff.delay_for(2, false), Duration::from_millis(250));
    assert_eq!(backoff.delay_for(3, false), Duration::from_millis(500));
}

#[test]
fn test_consecutive_failures_back_off_exponentially() {
    let backoff = ReceiveBackoff::default().without_jitter();

    // 250ms, 500ms, 1s, 2s, 4s, then capped at 5s
    assert_eq!(backoff.delay_for(2, true), Duration::from_millis(250));
    assert_eq!(backoff.delay_for(3, true), Duration::from_millis(500));
    assert_eq!(backoff.delay_for(4, true), Duration::from_secs(1));
    assert_eq!(backoff.delay_for(5, true), Duration::from_secs(2));
    assert_eq!(backoff.delay_for(6, true), Duration::from_secs(4));
    assert_eq!(backoff.delay_for(7, true), Duration::from_secs(5));
    assert_eq!(backoff.delay_for(1000, true), Duration::from_secs(5));
}

#[test]
fn test_zero_max_delay_is_busy_retry() {
    let backoff = ReceiveBackoff {
        max_delay: Duration::ZERO,
        ..ReceiveBackoff::default()
    };

    assert_eq!(backoff.delay_for(1, false), Duration::ZERO);
    assert_eq!(backoff.delay_for(50, true), Duration::ZERO);
}

#[test]
fn test_receive_backoff_with_jitter() {
    let backoff = ReceiveBackoff::new(Duration::from_secs(1), Duration::from_secs(10), 2.0);

    let mut delays = Vec::new();
    for _ in 0..10 {
        delays.push(backoff.calculate_delay(0));
    }

    // With 25% jitter, 1s base should be in range [0.75s, 1.25s]
    for delay in &delays {
        let secs = delay.as_secs_f64();
        assert!((0.75..=1.25).contains(&secs), "Delay {} out of range", secs);
    }

    let unique_delays: std::collections::HashSet<_> = delays.iter().collect();
    assert!(
        unique_delays.len() > 1,
        "Expected variation in jittered delays"
    );
}

#[test]
fn test_jitter_percent_clamped() {
    let backoff = ReceiveBackoff::default().with_jitter_percent(-0.5);
    assert_eq!(backoff.jitter_percent, 0.0);

    let backoff = ReceiveBackoff::default().with_jitter_percent(1.5);
    assert_eq!(backoff.jitter_percent, 1.0);
}

#[test]
fn test_zero_jitter_percent_is_exact() {
    let backoff = ReceiveBackoff::default().with_jitter_percent(0.0);

    assert_eq!(backoff.calculate_delay(1), Duration::from_millis(500));
}

#[test]
fn test_receive_backoff_deserializes_fractional_seconds() {
    let backoff: ReceiveBackoff = serde_json::from_str(
        r#"{"initial_delay": 0.1, "max_delay": 2.5, "use_jitter": false}"#,
    )
    .unwrap();

    assert_eq!(backoff.initial_delay, Duration::from_millis(100));
    assert_eq!(backoff.max_delay, Duration::from_millis(2500));
    assert_eq!(backoff.backoff_multiplier, 2.0);
    assert!(!backoff.use_jitter);
}

// ============================================================================
// FailureStreak Tests
// ============================================================================

#[test]
fn test_failure_streak_counts_and_resets() {
    let mut streak = FailureStreak::new();
    assert_eq!(streak.consecutive_failures(), 0);

    assert_eq!(streak.record_failure(), 1);
    assert_eq!(streak.record_failure(), 2);

    streak.reset();
    assert_eq!(streak.consecutive_failures(), 0);
    assert_eq!(streak.record_failure(), 1);
}

#[test]
fn test_failure_streak_delay_sequence() {
    let backoff = ReceiveBackoff::default().without_jitter();
    let mut streak = FailureStreak::new();

    let mut delays = Vec::new();
    for _ in 0..4 {
        streak.record_failure();
        delays.push(streak.delay(&backoff, true));
    }

    assert_eq!(
        delays,
        vec![
            Duration::ZERO,
            Duration::from_millis(250),
            Duration::from_millis(500),
            Duration::from_secs(1),
        ]
    );
}
