//! Approval requests backing `Manual` promotion gates.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::id::ResourceId;

/// The side-entity backing a `Manual` gate: tracks who has approved or
/// rejected a promotion out of the required approver set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: ResourceId,
    pub promotion_id: ResourceId,
    pub description: String,
    pub required_approvers: Vec<String>,
    pub min_approvals: u32,
    pub timeout: Option<Duration>,
    pub approvers: Vec<String>,
    pub approved: bool,
    pub rejected: bool,
    pub decision_at: Option<DateTime<Utc>>,
    pub decision_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ApprovalRequest {
    pub fn new(
        promotion_id: ResourceId,
        description: impl Into<String>,
        required_approvers: Vec<String>,
        min_approvals: u32,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            id: ResourceId::new(),
            promotion_id,
            description: description.into(),
            required_approvers,
            min_approvals,
            timeout,
            approvers: Vec::new(),
            approved: false,
            rejected: false,
            decision_at: None,
            decision_reason: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_timed_out(&self, now: DateTime<Utc>) -> bool {
        match self.timeout {
            Some(timeout) => now - self.created_at >= timeout,
            None => false,
        }
    }

    /// Count of distinct required approvers who have acted.
    pub fn distinct_approval_count(&self) -> usize {
        self.approvers
            .iter()
            .filter(|a| self.required_approvers.contains(a))
            .collect::<std::collections::HashSet<_>>()
            .len()
    }

    /// Record an approval from `approver`. Idempotent for repeat approvals from
    /// the same identity. Transitions to `approved` once the threshold is met.
    /// Returns an error if the request already has a decision recorded
    /// (approved ⊕ rejected is an invariant — never both).
    pub fn approve(&mut self, approver: impl Into<String>) -> Result<(), String> {
        if self.rejected {
            return Err("approval request was already rejected".into());
        }
        if self.approved {
            return Ok(());
        }
        let approver = approver.into();
        if !self.approvers.contains(&approver) {
            self.approvers.push(approver);
        }
        if self.distinct_approval_count() >= self.min_approvals as usize {
            self.approved = true;
            self.decision_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn reject(&mut self, reason: impl Into<String>) -> Result<(), String> {
        if self.approved {
            return Err("approval request was already approved".into());
        }
        self.rejected = true;
        self.decision_reason = Some(reason.into());
        self.decision_at = Some(Utc::now());
        Ok(())
    }
}
