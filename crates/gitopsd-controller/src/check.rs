//! Check providers backing `Test` and `Metric` promotion gates.
//!
//! A stubbed check that always returns success would make every gate of
//! those kinds vacuous. This module elevates them to explicit provider
//! traits instead: a real deployment wires in a CI-results lookup and a
//! Prometheus-style query client; absent that, [`UnconfiguredChecks`] fails
//! closed with a precise message rather than fabricating a pass.

use async_trait::async_trait;

use gitopsd_core::error::{Error, Result};

/// Reports whether a named test suite passed for a given revision. A real
/// implementation queries CI results — that pipeline glue is out of scope
/// for this crate, which only owns the interface.
#[async_trait]
pub trait TestCheckProvider: Send + Sync {
    async fn suite_passed(&self, suite: &str, revision: &str) -> Result<bool>;
}

/// Samples a named metric's current value. A real implementation queries a
/// metrics backend; this crate does not itself query Prometheus or any
/// other metrics system.
#[async_trait]
pub trait MetricCheckProvider: Send + Sync {
    async fn sample(&self, metric: &str) -> Result<f64>;
}

/// Fails every check closed with a descriptive message. This is the default
/// wiring when no provider has been configured — never a silent pass.
pub struct UnconfiguredChecks;

#[async_trait]
impl TestCheckProvider for UnconfiguredChecks {
    async fn suite_passed(&self, suite: &str, _revision: &str) -> Result<bool> {
        Err(Error::InvalidInput(format!("no test check provider configured to evaluate suite '{suite}'")))
    }
}

#[async_trait]
impl MetricCheckProvider for UnconfiguredChecks {
    async fn sample(&self, metric: &str) -> Result<f64> {
        Err(Error::InvalidInput(format!("no metric check provider configured to sample '{metric}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_test_provider_fails_closed() {
        let result = UnconfiguredChecks.suite_passed("smoke", "abc123").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unconfigured_metric_provider_fails_closed() {
        let result = UnconfiguredChecks.sample("error_rate").await;
        assert!(result.is_err());
    }
}
