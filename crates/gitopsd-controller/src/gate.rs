//! Promotion gate evaluation.
//!
//! Gates are evaluated in declaration order against every target-env gate,
//! without short-circuiting, so the caller sees every outcome at once.
//! `Manual` consults an [`ApprovalStore`]-backed [`ApprovalRequest`];
//! `Test`/`Metric` delegate to the pluggable providers in [`crate::check`];
//! `Time` is a pure function of elapsed duration.
//!
//! A failing [`GateResult`] carries `pending` to say whether it is still
//! waiting on an approver (a `Manual` gate with too few approvals so far) or
//! has terminally failed (rejected, timed out, or any non-manual gate).

use std::sync::Arc;

use chrono::{DateTime, Utc};

use gitopsd_core::ResourceId;
use gitopsd_core::approval::ApprovalRequest;
use gitopsd_core::promotion::{GateResult, PromotionGate};
use gitopsd_db::ApprovalStore;

use crate::check::{MetricCheckProvider, TestCheckProvider};

/// Everything a gate needs to know about the promotion it is guarding,
/// beyond the gate definition itself.
pub struct GateContext<'a> {
    pub promotion_id: ResourceId,
    pub candidate_revision: &'a str,
    /// When the candidate revision entered the source environment —
    /// required for `Time` gates, absent for immediate/manual promotions
    /// where no prior stability window is tracked.
    pub source_entered_at: Option<DateTime<Utc>>,
    pub auto: bool,
    pub now: DateTime<Utc>,
}

pub struct GateEvaluator {
    approvals: Arc<dyn ApprovalStore>,
    test_checks: Arc<dyn TestCheckProvider>,
    metric_checks: Arc<dyn MetricCheckProvider>,
}

impl GateEvaluator {
    pub fn new(
        approvals: Arc<dyn ApprovalStore>,
        test_checks: Arc<dyn TestCheckProvider>,
        metric_checks: Arc<dyn MetricCheckProvider>,
    ) -> Self {
        Self { approvals, test_checks, metric_checks }
    }

    /// Evaluates every gate in order, short-circuiting on nothing — composes
    /// *all* target-env gates into the results vector even once one has
    /// failed, so the caller can see everything at once.
    pub async fn evaluate_all(&self, gates: &[PromotionGate], ctx: &GateContext<'_>) -> Vec<GateResult> {
        let mut results = Vec::with_capacity(gates.len());
        for gate in gates {
            results.push(self.evaluate_one(gate, ctx).await);
        }
        results
    }

    async fn evaluate_one(&self, gate: &PromotionGate, ctx: &GateContext<'_>) -> GateResult {
        match gate {
            PromotionGate::Manual { approvers, min_approvals, timeout } => {
                self.evaluate_manual(ctx, approvers, *min_approvals, *timeout).await
            }
            PromotionGate::Test { suite } => self.evaluate_test(suite, ctx).await,
            PromotionGate::Metric { metric, op, threshold } => self.evaluate_metric(metric, *op, *threshold).await,
            PromotionGate::Time { min_soak } => self.evaluate_time(ctx, *min_soak),
        }
    }

    async fn evaluate_manual(
        &self,
        ctx: &GateContext<'_>,
        approvers: &[String],
        min_approvals: u32,
        timeout: Option<chrono::Duration>,
    ) -> GateResult {
        // minApprovals=0 is auto-satisfied iff auto=true. For a manual
        // promotion this is a fixed misconfiguration, not something waiting
        // on an approver, so it fails terminally rather than pending.
        if min_approvals == 0 {
            return GateResult {
                gate_type: "manual".to_string(),
                passed: ctx.auto,
                pending: false,
                message: if ctx.auto {
                    "no approvals required for automatic promotion".to_string()
                } else {
                    "manual promotions require at least one approval even when minApprovals=0".to_string()
                },
            };
        }

        let request = match self.approvals.get_by_promotion(ctx.promotion_id).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                let request = ApprovalRequest::new(
                    ctx.promotion_id,
                    format!("promotion {} requires approval", ctx.promotion_id),
                    approvers.to_vec(),
                    min_approvals,
                    timeout,
                );
                if let Err(err) = self.approvals.create(&request).await {
                    return GateResult {
                        gate_type: "manual".to_string(),
                        passed: false,
                        pending: false,
                        message: format!("failed to create approval request: {err}"),
                    };
                }
                request
            }
            Err(err) => {
                return GateResult {
                    gate_type: "manual".to_string(),
                    passed: false,
                    pending: false,
                    message: format!("failed to load approval request: {err}"),
                };
            }
        };

        if request.rejected {
            return GateResult {
                gate_type: "manual".to_string(),
                passed: false,
                pending: false,
                message: request.decision_reason.clone().unwrap_or_else(|| "rejected".to_string()),
            };
        }
        if request.is_timed_out(ctx.now) && !request.approved {
            return GateResult { gate_type: "manual".to_string(), passed: false, pending: false, message: "approval request timed out".to_string() };
        }
        if request.approved {
            return GateResult { gate_type: "manual".to_string(), passed: true, pending: false, message: "approved".to_string() };
        }

        let have = request.distinct_approval_count() as u32;
        let needed = min_approvals.saturating_sub(have);
        GateResult {
            gate_type: "manual".to_string(),
            passed: false,
            pending: true,
            message: format!("Needs {needed} more approvals (has {have}/{min_approvals})"),
        }
    }

    async fn evaluate_test(&self, suite: &str, ctx: &GateContext<'_>) -> GateResult {
        match self.test_checks.suite_passed(suite, ctx.candidate_revision).await {
            Ok(true) => GateResult { gate_type: "test".to_string(), passed: true, pending: false, message: format!("suite '{suite}' passed") },
            Ok(false) => GateResult { gate_type: "test".to_string(), passed: false, pending: false, message: format!("suite '{suite}' did not pass") },
            Err(err) => GateResult { gate_type: "test".to_string(), passed: false, pending: false, message: err.to_string() },
        }
    }

    async fn evaluate_metric(&self, metric: &str, op: gitopsd_core::promotion::ThresholdOp, threshold: f64) -> GateResult {
        match self.metric_checks.sample(metric).await {
            Ok(sampled) if op.evaluate(sampled, threshold) => {
                GateResult { gate_type: "metric".to_string(), passed: true, pending: false, message: format!("{metric}={sampled} honors threshold {threshold}") }
            }
            Ok(sampled) => GateResult {
                gate_type: "metric".to_string(),
                passed: false,
                pending: false,
                message: format!("{metric}={sampled} violates threshold {threshold}"),
            },
            Err(err) => GateResult { gate_type: "metric".to_string(), passed: false, pending: false, message: err.to_string() },
        }
    }

    fn evaluate_time(&self, ctx: &GateContext<'_>, min_soak: chrono::Duration) -> GateResult {
        let Some(entered_at) = ctx.source_entered_at else {
            return GateResult {
                gate_type: "time".to_string(),
                passed: false,
                pending: false,
                message: "no record of when the candidate entered the source environment".to_string(),
            };
        };
        let elapsed = ctx.now - entered_at;
        if elapsed >= min_soak {
            GateResult { gate_type: "time".to_string(), passed: true, pending: false, message: format!("soaked for {elapsed}") }
        } else {
            let remaining = min_soak - elapsed;
            GateResult { gate_type: "time".to_string(), passed: false, pending: false, message: format!("needs {remaining} more soak time") }
        }
    }

    pub fn approvals(&self) -> &Arc<dyn ApprovalStore> {
        &self.approvals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::UnconfiguredChecks;
    use gitopsd_core::promotion::ThresholdOp;
    use std::sync::Arc;

    struct NoopApprovals;
    #[async_trait::async_trait]
    impl ApprovalStore for NoopApprovals {
        async fn create(&self, _request: &ApprovalRequest) -> gitopsd_db::DbResult<()> {
            Ok(())
        }
        async fn get(&self, id: ResourceId) -> gitopsd_db::DbResult<ApprovalRequest> {
            Err(gitopsd_db::DbError::NotFound(id.to_string()))
        }
        async fn get_by_promotion(&self, _promotion_id: ResourceId) -> gitopsd_db::DbResult<Option<ApprovalRequest>> {
            Ok(None)
        }
        async fn with_lock(
            &self,
            id: ResourceId,
            _mutate: Box<dyn FnOnce(&mut ApprovalRequest) -> Result<(), String> + Send>,
        ) -> gitopsd_db::DbResult<ApprovalRequest> {
            Err(gitopsd_db::DbError::NotFound(id.to_string()))
        }
    }

    fn evaluator() -> GateEvaluator {
        GateEvaluator::new(Arc::new(NoopApprovals), Arc::new(UnconfiguredChecks), Arc::new(UnconfiguredChecks))
    }

    fn ctx(auto: bool) -> GateContext<'static> {
        GateContext { promotion_id: ResourceId::new(), candidate_revision: "abc123", source_entered_at: None, auto, now: Utc::now() }
    }

    #[tokio::test]
    async fn manual_gate_zero_min_approvals_auto_satisfied_only_when_auto() {
        let eval = evaluator();
        let gate = PromotionGate::Manual { approvers: vec![], min_approvals: 0, timeout: None };

        let manual_ctx = ctx(true);
        let result = eval.evaluate_one(&gate, &manual_ctx).await;
        assert!(result.passed);

        let non_auto_ctx = ctx(false);
        let result = eval.evaluate_one(&gate, &non_auto_ctx).await;
        assert!(!result.passed);
    }

    #[tokio::test]
    async fn manual_gate_reports_needed_approval_count_as_pending() {
        let eval = evaluator();
        let gate = PromotionGate::Manual { approvers: vec!["alice".into(), "bob".into()], min_approvals: 2, timeout: None };
        let c = ctx(false);
        let result = eval.evaluate_one(&gate, &c).await;
        assert!(!result.passed);
        assert!(result.pending, "insufficient approvals so far is a waiting state, not a terminal failure");
        assert!(result.message.contains("2 more approvals (has 0/2)"));
    }

    #[tokio::test]
    async fn manual_gate_rejection_is_not_pending() {
        struct RejectedApprovals;
        #[async_trait::async_trait]
        impl ApprovalStore for RejectedApprovals {
            async fn create(&self, _request: &ApprovalRequest) -> gitopsd_db::DbResult<()> {
                Ok(())
            }
            async fn get(&self, id: ResourceId) -> gitopsd_db::DbResult<ApprovalRequest> {
                Err(gitopsd_db::DbError::NotFound(id.to_string()))
            }
            async fn get_by_promotion(&self, promotion_id: ResourceId) -> gitopsd_db::DbResult<Option<ApprovalRequest>> {
                let mut request = ApprovalRequest::new(promotion_id, "needs approval", vec!["alice".into()], 1, None);
                request.reject("not ready").unwrap();
                Ok(Some(request))
            }
            async fn with_lock(
                &self,
                id: ResourceId,
                _mutate: Box<dyn FnOnce(&mut ApprovalRequest) -> Result<(), String> + Send>,
            ) -> gitopsd_db::DbResult<ApprovalRequest> {
                Err(gitopsd_db::DbError::NotFound(id.to_string()))
            }
        }

        let eval = GateEvaluator::new(Arc::new(RejectedApprovals), Arc::new(UnconfiguredChecks), Arc::new(UnconfiguredChecks));
        let gate = PromotionGate::Manual { approvers: vec!["alice".into()], min_approvals: 1, timeout: None };
        let c = ctx(false);
        let result = eval.evaluate_one(&gate, &c).await;
        assert!(!result.passed);
        assert!(!result.pending, "a rejected approval request is a terminal failure");
    }

    #[tokio::test]
    async fn time_gate_without_entry_timestamp_fails() {
        let eval = evaluator();
        let gate = PromotionGate::Time { min_soak: chrono::Duration::hours(1) };
        let c = ctx(false);
        let result = eval.evaluate_one(&gate, &c).await;
        assert!(!result.passed);
    }

    #[tokio::test]
    async fn time_gate_passes_once_soak_elapsed() {
        let eval = evaluator();
        let gate = PromotionGate::Time { min_soak: chrono::Duration::minutes(30) };
        let mut c = ctx(false);
        let entered = Utc::now() - chrono::Duration::hours(1);
        c.source_entered_at = Some(entered);
        let result = eval.evaluate_one(&gate, &c).await;
        assert!(result.passed);
    }

    #[tokio::test]
    async fn test_gate_fails_closed_without_a_configured_provider() {
        let eval = evaluator();
        let gate = PromotionGate::Test { suite: "smoke".to_string() };
        let c = ctx(false);
        let result = eval.evaluate_one(&gate, &c).await;
        assert!(!result.passed);
    }

    #[tokio::test]
    async fn metric_gate_fails_closed_without_a_configured_provider() {
        let eval = evaluator();
        let gate = PromotionGate::Metric { metric: "error_rate".to_string(), op: ThresholdOp::LessThan, threshold: 0.01 };
        let c = ctx(false);
        let result = eval.evaluate_one(&gate, &c).await;
        assert!(!result.passed);
    }
}
