//! Promotion graph, gates, in-flight requests, and history.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::id::ResourceId;

/// An edge `from -> to` in the promotion graph. The full set of policies on a
/// deployment must form a DAG over environment names — enforced by
/// [`crate::deployment::GitOpsDeployment::validate`] at admission, not
/// representable here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionPolicy {
    pub from: String,
    pub to: String,
    pub required_approvals: u32,
    /// If set, promotion is eligible once `from` has been stable this long
    /// without a prior promotion across this edge in the window.
    pub auto_promote_after: Option<Duration>,
}

/// A single comparison threshold for a `Metric` gate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdOp {
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl ThresholdOp {
    pub fn evaluate(&self, sampled: f64, threshold: f64) -> bool {
        match self {
            ThresholdOp::LessThan => sampled < threshold,
            ThresholdOp::LessThanOrEqual => sampled <= threshold,
            ThresholdOp::GreaterThan => sampled > threshold,
            ThresholdOp::GreaterThanOrEqual => sampled >= threshold,
        }
    }
}

/// A precondition that must hold before a promotion may enter its target
/// environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum PromotionGate {
    Manual {
        approvers: Vec<String>,
        min_approvals: u32,
        timeout: Option<Duration>,
    },
    Test {
        suite: String,
    },
    Metric {
        metric: String,
        op: ThresholdOp,
        threshold: f64,
    },
    Time {
        min_soak: Duration,
    },
}

impl PromotionGate {
    pub fn kind_name(&self) -> &'static str {
        match self {
            PromotionGate::Manual { .. } => "manual",
            PromotionGate::Test { .. } => "test",
            PromotionGate::Metric { .. } => "metric",
            PromotionGate::Time { .. } => "time",
        }
    }
}

/// The outcome of evaluating one gate against a candidate revision.
///
/// `pending` distinguishes, among failing results, a gate that is merely
/// still waiting on an external action (a `Manual` gate with insufficient
/// approvals so far) from one that has terminally failed (rejected, timed
/// out, or any non-manual gate that returned false). It is meaningless when
/// `passed` is `true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResult {
    pub gate_type: String,
    pub passed: bool,
    #[serde(default)]
    pub pending: bool,
    pub message: String,
}

/// Promotion strategy. Only `Direct` is implemented; the others are
/// pluggable extension points. A strategy an implementation cannot run is
/// rejected at admission rather than silently accepted and then failing
/// mid-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionStrategy {
    Direct,
    BlueGreen,
    Canary,
    Progressive,
}

impl PromotionStrategy {
    /// Only `Direct` has an implemented executor in this controller.
    pub fn is_implemented(&self) -> bool {
        matches!(self, PromotionStrategy::Direct)
    }
}

impl std::fmt::Display for PromotionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PromotionStrategy::Direct => write!(f, "direct"),
            PromotionStrategy::BlueGreen => write!(f, "blue_green"),
            PromotionStrategy::Canary => write!(f, "canary"),
            PromotionStrategy::Progressive => write!(f, "progressive"),
        }
    }
}

/// State machine for an in-flight or historical promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionPhase {
    Pending,
    PendingApproval,
    Progressing,
    Validating,
    RollingBack,
    Completed,
    Failed,
    Cancelled,
}

impl PromotionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PromotionPhase::Completed | PromotionPhase::Failed | PromotionPhase::Cancelled
        )
    }
}

/// An in-flight or historical promotion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionRequest {
    pub id: ResourceId,
    pub deployment_id: ResourceId,
    pub from_env: String,
    pub to_env: String,
    /// Revision to promote; if unset, resolved HEAD of `from_env`'s branch at
    /// the time the repository is opened.
    pub candidate_revision: Option<String>,
    pub requester: String,
    pub auto: bool,
    pub strategy: PromotionStrategy,
    pub phase: PromotionPhase,
    pub gate_results: Vec<GateResult>,
    pub from_revision: Option<String>,
    pub to_revision: Option<String>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PromotionRequest {
    pub fn new(
        deployment_id: ResourceId,
        from_env: impl Into<String>,
        to_env: impl Into<String>,
        requester: impl Into<String>,
        auto: bool,
        strategy: PromotionStrategy,
    ) -> Self {
        Self {
            id: ResourceId::new(),
            deployment_id,
            from_env: from_env.into(),
            to_env: to_env.into(),
            candidate_revision: None,
            requester: requester.into(),
            auto,
            strategy,
            phase: PromotionPhase::Pending,
            gate_results: Vec::new(),
            from_revision: None,
            to_revision: None,
            message: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.phase = PromotionPhase::Failed;
        self.message = Some(message.into());
        self.completed_at = Some(Utc::now());
    }

    pub fn complete(&mut self, to_revision: impl Into<String>) {
        self.phase = PromotionPhase::Completed;
        self.to_revision = Some(to_revision.into());
        self.completed_at = Some(Utc::now());
    }
}

/// Immutable record appended to a deployment's promotion history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub from: String,
    pub to: String,
    pub from_revision: String,
    pub to_revision: String,
    pub user: String,
    pub success: bool,
    pub message: String,
    pub gate_results: Vec<GateResult>,
}

/// Retention cap enforced per (from, to) edge: last 50 entries, oldest (by
/// timestamp, not insertion/iteration order) evicted beyond that.
pub const HISTORY_RETENTION_PER_EDGE: usize = 50;
