//! Exponential backoff retry for transient Git operations.
//!
//! Hand-rolled rather than pulled from a dedicated backoff crate — the
//! policy is a handful of lines and this keeps the dependency surface small.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::GitError;

/// Retries `op` up to `attempts` times with exponential backoff
/// (`base * 2^n`, capped at `cap`), a small jitter applied to each sleep.
/// Authentication failures never retry — they're propagated immediately.
pub async fn retry<F, Fut, T>(attempts: u32, base: Duration, cap: Duration, mut op: F) -> Result<T, GitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GitError>>,
{
    let mut last_err = None;
    for attempt in 0..attempts.max(1) {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !matches!(err, GitError::Transient(_)) || attempt + 1 == attempts {
                    return Err(err);
                }
                let delay = backoff_delay(attempt, base, cap);
                tracing::warn!(attempt, delay_ms = %delay.as_millis(), error = %err, "retrying git operation");
                tokio::time::sleep(delay).await;
                last_err = Some(err);
            }
        }
    }
    Err(last_err.unwrap_or(GitError::Transient("retry loop exhausted".to_string())))
}

fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let scaled = base.saturating_mul(1 << attempt.min(16));
    let capped = scaled.min(cap);
    let jitter_frac = rand::thread_rng().gen_range(0.8..1.2);
    Duration::from_secs_f64((capped.as_secs_f64() * jitter_frac).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = retry(3, Duration::from_millis(1), Duration::from_millis(10), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(GitError::Transient("blip".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn never_retries_auth_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<(), GitError> = retry(3, Duration::from_millis(1), Duration::from_millis(10), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(GitError::Authentication("bad key".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
