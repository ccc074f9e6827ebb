//! Retry with exponential back-off and jitter around calls to the completion API.
//!
//! [`retry_with_backoff`] wraps any fallible async operation and retries every
//! failure except authentication/authorization rejections (HTTP 401/403),
//! which are returned immediately. [`is_retryable`] is the broader transient
//! classifier for callers composing their own policy.

use std::future::Future;
use std::time::Duration;

use tlens_core::AppConfig;
use tokio_util::sync::CancellationToken;

/// Classification hooks an error type exposes to the retry controller.
pub trait RetrySignal {
    /// HTTP status associated with the failure, if any.
    fn status(&self) -> Option<u16>;

    /// `true` for network-level failures (timeouts, refused or reset connections).
    fn is_transport(&self) -> bool {
        false
    }
}

/// Marker converted into the caller's error type when a retry sequence is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Returns `true` for authentication/authorization failures, which are never retried.
pub fn is_fatal<E: RetrySignal + ?Sized>(err: &E) -> bool {
    matches!(err.status(), Some(401 | 403))
}

/// Returns `true` for errors that are worth retrying at all.
///
/// **Retryable:** transport failures and HTTP 408, 429, 500, 502, 503, 504.
/// Everything else is not.
pub fn is_retryable<E: RetrySignal + ?Sized>(err: &E) -> bool {
    err.is_transport() || matches!(err.status(), Some(408 | 429 | 500 | 502 | 503 | 504))
}

/// Back-off tuning for [`retry_with_backoff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Upper bound (exclusive) of the random jitter added to each delay.
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 10_000,
            jitter_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay_ms: config.retry_base_delay_ms,
            max_delay_ms: config.retry_max_delay_ms,
            ..Self::default()
        }
    }

    /// Delay before the retry that follows zero-based `attempt`:
    /// `min(base_delay_ms * 2^attempt + jitter, max_delay_ms)`.
    #[must_use]
    pub fn delay_ms(&self, attempt: u32, jitter: u64) -> u64 {
        self.base_delay_ms
            .saturating_mul(1u64 << attempt.min(62))
            .saturating_add(jitter)
            .min(self.max_delay_ms)
    }

    fn random_jitter(&self) -> u64 {
        if self.jitter_ms == 0 {
            0
        } else {
            rand::random_range(0..self.jitter_ms)
        }
    }
}

/// Runs `operation` up to `policy.max_retries + 1` times.
///
/// Back-off schedule with the default policy:
///
/// | Failed attempt | Sleep before next attempt                  |
/// |----------------|--------------------------------------------|
/// | 0              | min(1 000 ms × 2⁰ + jitter, 10 000 ms)     |
/// | 1              | min(1 000 ms × 2¹ + jitter, 10 000 ms)     |
/// | 2              | min(1 000 ms × 2² + jitter, 10 000 ms)     |
/// | 3              | none, the last error is returned           |
///
/// A 401/403 failure is returned immediately. When every attempt fails the
/// last error is returned. Cancelling `cancel` interrupts both the in-flight
/// attempt and the back-off sleep and yields `E::from(Cancelled)`.
///
/// # Errors
///
/// Returns the operation's last error, its first fatal error, or the
/// cancellation error.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, E>
where
    E: RetrySignal + From<Cancelled> + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(E::from(Cancelled));
        }

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(E::from(Cancelled)),
            outcome = operation() => outcome,
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if is_fatal(&err) {
            tracing::warn!(attempt, error = %err, "authorization failure; not retrying");
            return Err(err);
        }
        if attempt >= policy.max_retries {
            return Err(err);
        }

        let delay_ms = policy.delay_ms(attempt, policy.random_jitter());
        tracing::warn!(
            attempt,
            max_retries = policy.max_retries,
            delay_ms,
            error = %err,
            "completion call failed; retrying after back-off"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(E::from(Cancelled)),
            () = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Status(u16),
        Network,
        Cancelled,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl RetrySignal for TestError {
        fn status(&self) -> Option<u16> {
            match self {
                TestError::Status(s) => Some(*s),
                _ => None,
            }
        }

        fn is_transport(&self) -> bool {
            matches!(self, TestError::Network)
        }
    }

    impl From<Cancelled> for TestError {
        fn from(_: Cancelled) -> Self {
            TestError::Cancelled
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn retryable_statuses_are_classified() {
        for status in [408, 429, 500, 502, 503, 504] {
            assert!(is_retryable(&TestError::Status(status)), "{status}");
        }
        for status in [400, 401, 403, 404, 422, 501] {
            assert!(!is_retryable(&TestError::Status(status)), "{status}");
        }
        assert!(is_retryable(&TestError::Network));
    }

    #[test]
    fn only_auth_statuses_are_fatal() {
        assert!(is_fatal(&TestError::Status(401)));
        assert!(is_fatal(&TestError::Status(403)));
        assert!(!is_fatal(&TestError::Status(404)));
        assert!(!is_fatal(&TestError::Network));
    }

    #[test]
    fn delay_never_exceeds_cap_and_floor_is_non_decreasing() {
        let policy = RetryPolicy::default();
        let mut previous_floor = 0;
        for attempt in 0..policy.max_retries.max(8) {
            let floor = policy.delay_ms(attempt, 0);
            assert!(floor >= previous_floor, "floor decreased at {attempt}");
            previous_floor = floor;
            assert!(policy.delay_ms(attempt, 999) <= policy.max_delay_ms);
        }
        assert_eq!(policy.delay_ms(0, 0), 1_000);
        assert_eq!(policy.delay_ms(1, 250), 2_250);
        assert_eq!(policy.delay_ms(3, 500), 8_500);
        assert_eq!(policy.delay_ms(4, 0), 10_000);
    }

    #[test]
    fn delay_saturates_on_huge_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_ms(u32::MAX, 999), policy.max_delay_ms);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_immediately_on_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(&policy(3), &CancellationToken::new(), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, TestError>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_operation_runs_max_retries_plus_one_times() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(&policy(3), &CancellationToken::new(), || {
            let c = Arc::clone(&c);
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(TestError::Status(500 + u16::try_from(n).unwrap()))
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(result.unwrap_err(), TestError::Status(503), "last error wins");
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_statuses_are_still_retried_by_the_controller() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(&policy(2), &CancellationToken::new(), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(TestError::Status(400))
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.unwrap_err(), TestError::Status(400));
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_retry_unauthorized() {
        for status in [401, 403] {
            let calls = Arc::new(AtomicU32::new(0));
            let c = Arc::clone(&calls);
            let result = retry_with_backoff(&policy(5), &CancellationToken::new(), || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, _>(TestError::Status(status))
                }
            })
            .await;
            assert_eq!(
                calls.load(Ordering::SeqCst),
                1,
                "HTTP {status} must not be retried"
            );
            assert_eq!(result.unwrap_err(), TestError::Status(status));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(&policy(3), &CancellationToken::new(), || {
            let c = Arc::clone(&c);
            async move {
                let attempt = c.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt < 3 {
                    Err(TestError::Network)
                } else {
                    Ok(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99, "should succeed after retries");
        assert_eq!(
            calls.load(Ordering::SeqCst),
            3,
            "should have been called 3 times (2 failures + 1 success)"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_means_single_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(&policy(0), &CancellationToken::new(), || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(TestError::Network)
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err(), TestError::Network);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_token_stops_before_first_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(&policy(3), &cancel, || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, TestError>(1)
            }
        })
        .await;
        assert_eq!(result.unwrap_err(), TestError::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_stops_retrying() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let trigger = cancel.clone();
        let result = retry_with_backoff(&policy(5), &cancel, || {
            let c = Arc::clone(&c);
            let trigger = trigger.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                trigger.cancel();
                Err::<u32, _>(TestError::Status(503))
            }
        })
        .await;
        assert_eq!(result.unwrap_err(), TestError::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_in_flight_attempt() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let result = retry_with_backoff(&policy(3), &cancel, || async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<u32, TestError>(7)
        })
        .await;
        assert_eq!(result.unwrap_err(), TestError::Cancelled);
    }

    #[test]
    fn policy_reads_retry_tuning_from_config() {
        let config = AppConfig {
            env: tlens_core::Environment::Test,
            log_level: "info".into(),
            api_key: None,
            api_base_url: "http://localhost".into(),
            model: "m".into(),
            request_timeout_secs: 5,
            max_retries: 7,
            retry_base_delay_ms: 10,
            retry_max_delay_ms: 100,
            max_transcript_chars: 10,
            max_completion_tokens: 10,
            validation_mode: tlens_core::ValidationMode::Strict,
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_retries, 7);
        assert_eq!(policy.base_delay_ms, 10);
        assert_eq!(policy.max_delay_ms, 100);
        assert_eq!(policy.jitter_ms, 1_000);
    }
}
