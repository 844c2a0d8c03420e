//! Self-managed `GitOpsEngine`: reads desired state straight from the working
//! tree's parsed manifests and writes the cluster API directly. The only
//! engine variant this controller fully drives end to end; `ArgoCd`/`Flux`
//! variants are declared in `gitopsd_core::deployment::GitOpsEngineVariant`
//! but delegate their own sync loop and are out of scope here.

use std::collections::HashMap;

use async_trait::async_trait;
use kube::Client;
use serde_json::Value;

use gitopsd_core::deployment::GitOpsDeployment;
use gitopsd_core::engine::GitOpsEngine;
use gitopsd_core::error::Result;
use gitopsd_core::resource::{HealthStatus, ManagedResource, ResourceIdentity};

use crate::dynamic::api_for;

pub struct SelfManagedEngine {
    client: Client,
    desired: HashMap<ResourceIdentity, Value>,
}

impl SelfManagedEngine {
    pub fn new(client: Client, desired: HashMap<ResourceIdentity, Value>) -> Self {
        Self { client, desired }
    }
}

#[async_trait]
impl GitOpsEngine for SelfManagedEngine {
    fn name(&self) -> &'static str {
        "self-managed"
    }

    async fn list_managed_resources(&self, _deployment: &GitOpsDeployment) -> Result<Vec<ManagedResource>> {
        let mut resources = Vec::with_capacity(self.desired.len());
        for identity in self.desired.keys() {
            let health = observed_health(&self.client, identity).await;
            resources.push(ManagedResource { identity: identity.clone(), last_observed_health: health });
        }
        Ok(resources)
    }

    async fn get_desired_state(&self, _deployment: &GitOpsDeployment, resource: &ResourceIdentity) -> Result<Option<Value>> {
        Ok(self.desired.get(resource).cloned())
    }

    async fn trigger_sync(&self, _deployment: &GitOpsDeployment) -> Result<()> {
        // The controller is the sync loop; the next reconcile tick re-verifies.
        Ok(())
    }
}

/// Best-effort health derived from well-known status shapes. Resources this
/// controller doesn't recognize the status shape of report `Unknown` rather
/// than guessing.
async fn observed_health(client: &Client, identity: &ResourceIdentity) -> HealthStatus {
    let api = match api_for(client, identity).await {
        Ok(api) => api,
        Err(_) => return HealthStatus::Unknown,
    };
    let object = match api.get_opt(&identity.name).await {
        Ok(Some(object)) => object,
        Ok(None) => return HealthStatus::Missing,
        Err(_) => return HealthStatus::Unknown,
    };

    let Some(status) = object.data.get("status") else {
        return HealthStatus::Unknown;
    };

    if identity.kind == "Deployment" {
        let desired_replicas = status.get("replicas").and_then(Value::as_i64);
        let ready_replicas = status.get("readyReplicas").and_then(Value::as_i64).unwrap_or(0);
        return match desired_replicas {
            Some(desired) if ready_replicas >= desired && desired > 0 => HealthStatus::Healthy,
            Some(_) => HealthStatus::Progressing,
            None => HealthStatus::Unknown,
        };
    }

    if let Some(conditions) = status.get("conditions").and_then(Value::as_array) {
        let all_true = conditions.iter().all(|c| c.get("status").and_then(Value::as_str) == Some("True"));
        return if all_true { HealthStatus::Healthy } else { HealthStatus::Degraded };
    }

    HealthStatus::Unknown
}
