//! Generic retry with exponential backoff and jitter.
//!
//! Returns a tagged outcome instead of erroring mid-loop so callers can keep
//! the last upstream error (status, body) for their own error types.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Minimum 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each attempt after that.
    pub base_delay: Duration,
    /// Uniform random extra delay in `0..=max_jitter` added per attempt.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(400),
            max_jitter: Duration::from_millis(400),
        }
    }
}

#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Ok { value: T, attempts: u32 },
    Exhausted { last_error: E, attempts: u32 },
}

/// Backoff for the given 1-based attempt number: `base * 2^(attempt-1)`,
/// plus jitter. Deterministic part is monotonically non-decreasing.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let factor = 1u32 << attempt.saturating_sub(1).min(16);
    let base = policy.base_delay.saturating_mul(factor);
    let jitter_ms = policy.max_jitter.as_millis() as u64;
    if jitter_ms == 0 {
        return base;
    }
    base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
}

/// Run `op` up to `policy.max_attempts` times, sleeping between failures.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> RetryOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => {
                return RetryOutcome::Ok {
                    value,
                    attempts: attempt,
                }
            }
            Err(e) => {
                if attempt >= max_attempts {
                    return RetryOutcome::Exhausted {
                        last_error: e,
                        attempts: attempt,
                    };
                }
                tokio::time::sleep(backoff_delay(policy, attempt)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_jitter: Duration::ZERO,
        }
    }

    #[test]
    fn backoff_doubles_and_never_decreases() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(400),
            max_jitter: Duration::ZERO,
        };
        let delays: Vec<Duration> = (1..=4).map(|a| backoff_delay(&policy, a)).collect();
        assert_eq!(delays[0], Duration::from_millis(400));
        assert_eq!(delays[1], Duration::from_millis(800));
        assert_eq!(delays[2], Duration::from_millis(1600));
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn jitter_stays_within_bound() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_jitter: Duration::from_millis(50),
        };
        for _ in 0..100 {
            let d = backoff_delay(&policy, 1);
            assert!(d >= Duration::from_millis(100));
            assert!(d <= Duration::from_millis(150));
        }
    }

    #[tokio::test]
    async fn succeeds_without_extra_attempts() {
        let calls = AtomicU32::new(0);
        let outcome = retry_with_backoff(&fast_policy(5), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, String>(42) }
        })
        .await;
        match outcome {
            RetryOutcome::Ok { value, attempts } => {
                assert_eq!(value, 42);
                assert_eq!(attempts, 1);
            }
            RetryOutcome::Exhausted { .. } => panic!("expected success"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let outcome = retry_with_backoff(&fast_policy(5), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<u32, _>("denied".to_string()) }
        })
        .await;
        match outcome {
            RetryOutcome::Exhausted {
                last_error,
                attempts,
            } => {
                assert_eq!(last_error, "denied");
                assert_eq!(attempts, 5);
            }
            RetryOutcome::Ok { .. } => panic!("expected exhaustion"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn recovers_midway() {
        let calls = AtomicU32::new(0);
        let outcome = retry_with_backoff(&fast_policy(5), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("transient".to_string())
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        match outcome {
            RetryOutcome::Ok { value, attempts } => {
                assert_eq!(value, 2);
                assert_eq!(attempts, 3);
            }
            RetryOutcome::Exhausted { .. } => panic!("expected recovery"),
        }
    }
}
