//! Managed resources and drift records.
//!
//! `SyncStatus`/`HealthStatus` reuse the vocabulary of an ArgoCD-style Application
//! almost verbatim; `ResourceIdentity` is the `(group, version, kind, namespace,
//! name)` tuple resources are addressed by throughout this workspace.

use serde::{Deserialize, Serialize};

/// Overall sync status of a deployment, derived from its drift status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Synced,
    OutOfSync,
    Syncing,
    Unknown,
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus::Unknown
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Synced => write!(f, "synced"),
            SyncStatus::OutOfSync => write!(f, "out_of_sync"),
            SyncStatus::Syncing => write!(f, "syncing"),
            SyncStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Health status of a single managed resource or of a deployment as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Progressing,
    Degraded,
    Suspended,
    Missing,
    Unknown,
}

impl Default for HealthStatus {
    fn default() -> Self {
        HealthStatus::Unknown
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Progressing => write!(f, "progressing"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Suspended => write!(f, "suspended"),
            HealthStatus::Missing => write!(f, "missing"),
            HealthStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// The `(group, version, kind, namespace, name)` address of a Kubernetes object.
/// Resources are handled kind-agnostically throughout the controller — this is
/// the only identity the drift engine ever needs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceIdentity {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl std::fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}/{}/{}", self.version, self.kind, self.namespace, self.name)
        } else {
            write!(
                f,
                "{}/{}/{}/{}/{}",
                self.group, self.version, self.kind, self.namespace, self.name
            )
        }
    }
}

/// An item in a deployment's inventory: a resource the controller claims as
/// "managed" and is the exclusive writer of when remediating drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedResource {
    pub identity: ResourceIdentity,
    pub last_observed_health: HealthStatus,
}

/// The kind of divergence the drift engine found for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftType {
    /// In cluster but not in Git.
    Added,
    /// Differs from Git after normalization.
    Modified,
    /// In Git but not in cluster.
    Removed,
}

impl std::fmt::Display for DriftType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriftType::Added => write!(f, "added"),
            DriftType::Modified => write!(f, "modified"),
            DriftType::Removed => write!(f, "removed"),
        }
    }
}

/// One detected divergence between live and desired state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftRecord {
    pub resource: ResourceIdentity,
    pub drift_type: DriftType,
    /// Unified diff text, "Desired" vs "Actual", 3 lines of context.
    pub diff_text: String,
}

/// Outcome of attempting to remediate one drifted resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationOutcome {
    pub resource: ResourceIdentity,
    pub drift_type: DriftType,
    pub succeeded: bool,
    pub error: Option<String>,
}

/// Aggregate result of a remediation pass across every drifted resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemediationSummary {
    pub outcomes: Vec<RemediationOutcome>,
}

impl RemediationSummary {
    pub fn remediated_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.succeeded).count()
    }
}

/// Per-deployment drift status surfaced on `GitOpsDeployment.status`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriftStatus {
    pub detected: bool,
    pub last_check: Option<chrono::DateTime<chrono::Utc>>,
    pub drifted: Vec<DriftRecord>,
}
