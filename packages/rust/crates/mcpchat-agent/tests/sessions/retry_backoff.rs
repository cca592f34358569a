use std::time::Duration;

use super::{MAX_RETRY_BACKOFF_MS, RetryPolicy, compute_retry_backoff_ms};

#[test]
fn backoff_doubles_per_attempt() {
    assert_eq!(compute_retry_backoff_ms(1_000, 1, 3), 1_000);
    assert_eq!(compute_retry_backoff_ms(1_000, 2, 3), 2_000);
    assert_eq!(compute_retry_backoff_ms(1_000, 3, 4), 4_000);
}

#[test]
fn backoff_is_capped() {
    assert_eq!(compute_retry_backoff_ms(10_000, 4, 10), MAX_RETRY_BACKOFF_MS);
    assert_eq!(compute_retry_backoff_ms(u64::MAX, 9, 10), MAX_RETRY_BACKOFF_MS);
}

#[test]
fn single_attempt_policy_never_waits() {
    assert_eq!(compute_retry_backoff_ms(1_000, 1, 1), 0);
    let policy = RetryPolicy::new(1, Duration::from_secs(1));
    assert_eq!(policy.delay_after(1), Duration::ZERO);
}

#[test]
fn zero_attempts_is_raised_to_one() {
    let policy = RetryPolicy::new(0, Duration::from_millis(10));
    assert_eq!(policy.max_attempts, 1);
}

#[test]
fn policy_delay_uses_base_backoff() {
    let policy = RetryPolicy::new(3, Duration::from_millis(250));
    assert_eq!(policy.delay_after(1), Duration::from_millis(250));
    assert_eq!(policy.delay_after(2), Duration::from_millis(500));
}
