use std::future::Future;

use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::config::settings::RetryConfig;
use crate::error::{Error, Result};
use crate::utils::constants::{
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_MAX_DELAY_MS,
};

#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
        }
    }
}

impl From<&Option<RetryConfig>> for RetrySettings {
    fn from(retry: &Option<RetryConfig>) -> Self {
        let defaults = RetrySettings::default();
        Self {
            attempts: retry.as_ref().and_then(|r| r.attempts).unwrap_or(defaults.attempts),
            base_delay_ms: retry.as_ref().and_then(|r| r.base_delay_ms).unwrap_or(defaults.base_delay_ms),
            max_delay_ms: retry.as_ref().and_then(|r| r.max_delay_ms).unwrap_or(defaults.max_delay_ms),
        }
    }
}

impl RetrySettings {
    /// Run `operation`, retrying transport failures with exponential backoff.
    /// Any other error is returned immediately. Cancellation drops the
    /// in-flight attempt.
    pub async fn run_with_retry<F, Fut, T>(&self, cancel: &CancellationToken, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.attempts.max(1);
        let mut delay = self.base_delay_ms;

        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let outcome = tokio::select! {
                outcome = operation() => outcome,
                _ = cancel.cancelled() => return Err(Error::Cancelled),
            };
            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!("Attempt {attempt}/{attempts} failed: {e}");
                    tokio::select! {
                        _ = sleep(Duration::from_millis(delay)) => {},
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                    }
                    delay = self.next_delay(delay);
                }
                Err(e) if e.is_retryable() => {
                    error!("all {attempt} attempts failed: {e}");
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        }
        unreachable!("Retry loop exhausted unexpectedly")
    }

    /// Backoff after `delay`: doubled, capped at `max_delay_ms`.
    fn next_delay(&self, delay: u64) -> u64 {
        delay.saturating_mul(2).min(self.max_delay_ms)
    }

    /// Longest time `run_with_retry` can take when every attempt runs into
    /// `attempt_timeout_ms`.
    pub fn worst_case_ms(&self, attempt_timeout_ms: u64) -> u64 {
        let attempts = self.attempts.max(1);
        let mut total = attempt_timeout_ms.saturating_mul(attempts as u64);
        let mut delay = self.base_delay_ms;
        for _ in 1..attempts {
            total = total.saturating_add(delay);
            delay = self.next_delay(delay);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast() -> RetrySettings {
        RetrySettings { attempts: 3, base_delay_ms: 10, max_delay_ms: 20 }
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let value = fast()
            .run_with_retry(&CancellationToken::new(), || async {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 | 1 => Err(Error::Transport("connection reset".into())),
                    _ => Ok(42),
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_give_up_after_attempts() {
        let calls = AtomicU32::new(0);
        let err = fast()
            .run_with_retry(&CancellationToken::new(), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::Transport("timeout".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn auth_and_decode_errors_are_not_retried() {
        for error in [Error::Auth("401".into()), Error::Decode("eof".into())] {
            let calls = AtomicU32::new(0);
            let reason = error.reason();
            let mut error = Some(error);
            let err = fast()
                .run_with_retry(&CancellationToken::new(), || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let e = error.take().unwrap_or(Error::Cancelled);
                    async move { Err::<(), _>(e) }
                })
                .await
                .unwrap_err();
            assert_eq!(err.reason(), reason);
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let settings = RetrySettings { attempts: 4, base_delay_ms: u64::MAX / 2 + 1, max_delay_ms: u64::MAX };
        assert_eq!(settings.next_delay(settings.base_delay_ms), u64::MAX);
        assert_eq!(settings.next_delay(u64::MAX), u64::MAX);
        assert_eq!(settings.worst_case_ms(u64::MAX), u64::MAX);
    }

    #[test]
    fn backoff_doubles_up_to_max() {
        let settings = RetrySettings { attempts: 4, base_delay_ms: 200, max_delay_ms: 500 };
        assert_eq!(settings.next_delay(200), 400);
        assert_eq!(settings.next_delay(400), 500);
        // 4 x 1000ms attempts plus 200 + 400 + 500 of backoff
        assert_eq!(settings.worst_case_ms(1000), 5_100);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_backoff() {
        let cancel = CancellationToken::new();
        let settings = RetrySettings { attempts: 5, base_delay_ms: 60_000, max_delay_ms: 60_000 };
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let err = settings
            .run_with_retry(&cancel, || async { Err::<(), _>(Error::Transport("down".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
