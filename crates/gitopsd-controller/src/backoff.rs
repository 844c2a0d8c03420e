//! Reconcile-failure backoff: base 5s, cap 5min, jittered +/-20%.
//!
//! Distinct from `gitopsd_git::backoff`, which retries individual Git calls
//! within one tick; this one paces the *next scheduled tick* after a whole
//! tick has failed. Hand-rolled rather than pulled from a backoff crate —
//! it's a handful of lines.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct ReconcileBackoff {
    base: Duration,
    cap: Duration,
    jitter: f64,
    failures: u32,
}

impl ReconcileBackoff {
    pub fn new(base: Duration, cap: Duration, jitter: f64) -> Self {
        Self { base, cap, jitter, failures: 0 }
    }

    /// Records a failed tick and returns the delay to wait before the next one.
    pub fn record_failure(&mut self) -> Duration {
        let delay = self.delay_for(self.failures);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    /// Clears accumulated failures after a successful tick.
    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    fn delay_for(&self, failures: u32) -> Duration {
        let scaled = self.base.saturating_mul(1u32.checked_shl(failures.min(16)).unwrap_or(u32::MAX));
        let capped = scaled.min(self.cap);
        let jitter_frac = rand::thread_rng().gen_range((1.0 - self.jitter)..(1.0 + self.jitter));
        Duration::from_secs_f64((capped.as_secs_f64() * jitter_frac).max(0.0))
    }
}

impl Default for ReconcileBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(5 * 60), 0.2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_then_caps() {
        let mut backoff = ReconcileBackoff::new(Duration::from_secs(5), Duration::from_secs(40), 0.0);
        let first = backoff.record_failure();
        let second = backoff.record_failure();
        let third = backoff.record_failure();
        assert!(first < second);
        assert!(second < third);
        // With jitter disabled (0.0), repeated failures must clamp at the cap.
        for _ in 0..10 {
            assert!(backoff.record_failure() <= Duration::from_secs(40));
        }
    }

    #[test]
    fn success_resets_failure_count() {
        let mut backoff = ReconcileBackoff::new(Duration::from_secs(5), Duration::from_secs(300), 0.0);
        backoff.record_failure();
        backoff.record_failure();
        backoff.record_success();
        // Back to the base delay after a reset.
        assert_eq!(backoff.record_failure(), Duration::from_secs(5));
    }
}
