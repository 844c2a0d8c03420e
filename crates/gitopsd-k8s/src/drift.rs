//! Live-vs-desired comparison and remediation.

use std::collections::HashMap;

use kube::api::{DynamicObject, PostParams};
use kube::Client;
use serde_json::Value;

use gitopsd_core::resource::{DriftRecord, DriftType, RemediationOutcome, RemediationSummary};
use gitopsd_core::resource::ResourceIdentity;

use crate::diff::unified_diff;
use crate::dynamic::api_for;
use crate::error::K8sError;
use crate::normalize::{apply_ignore_fields, normalize};

/// Compares one resource's live and desired state and returns a `DriftRecord`
/// if they diverge, `None` if in sync.
pub async fn compare_one(
    client: &Client,
    identity: &ResourceIdentity,
    desired: Option<&Value>,
    ignore_fields: &[String],
) -> Result<Option<DriftRecord>, K8sError> {
    let api = api_for(client, identity).await?;
    let live = match api.get_opt(&identity.name).await? {
        Some(obj) => Some(serde_json::to_value(&obj).map_err(|e| K8sError::Malformed(e.to_string()))?),
        None => None,
    };

    let drift_type = match (&live, desired) {
        (Some(_), None) => DriftType::Added,
        (None, Some(_)) => DriftType::Removed,
        (None, None) => return Ok(None),
        (Some(live_value), Some(desired_value)) => {
            let mut live_norm = live_value.clone();
            let mut desired_norm = desired_value.clone();
            normalize(&mut live_norm);
            normalize(&mut desired_norm);
            apply_ignore_fields(&mut live_norm, ignore_fields);
            apply_ignore_fields(&mut desired_norm, ignore_fields);
            if live_norm == desired_norm {
                return Ok(None);
            }
            DriftType::Modified
        }
    };

    let (desired_side, actual_side) = (desired.cloned().unwrap_or(Value::Null), live.clone().unwrap_or(Value::Null));
    let diff_text = unified_diff(&desired_side, &actual_side);

    Ok(Some(DriftRecord { resource: identity.clone(), drift_type, diff_text }))
}

/// Detects drift across the full universe of resources a deployment is
/// responsible for: the union of its live inventory and its desired
/// manifests.
pub async fn detect_drift(
    client: &Client,
    universe: &[ResourceIdentity],
    desired: &HashMap<ResourceIdentity, Value>,
    ignore_fields: &[String],
) -> Vec<DriftRecord> {
    let mut records = Vec::new();
    for identity in universe {
        match compare_one(client, identity, desired.get(identity), ignore_fields).await {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(resource = %identity, error = %err, "failed to compare resource, skipping this tick");
            }
        }
    }
    records
}

/// Applies remediation for each drift record, gated by `auto_remediate` at
/// the call site and `remove_untracked_resources` for `Added` resources.
/// Per-resource failures are recorded, not propagated — the pass always
/// completes across every drifted resource.
pub async fn remediate(
    client: &Client,
    records: &[DriftRecord],
    desired: &HashMap<ResourceIdentity, Value>,
    remove_untracked_resources: bool,
) -> RemediationSummary {
    let mut outcomes = Vec::new();
    for record in records {
        let outcome = match record.drift_type {
            DriftType::Removed => remediate_removed(client, record, desired).await,
            DriftType::Modified => remediate_modified(client, record, desired).await,
            DriftType::Added => {
                if !remove_untracked_resources {
                    continue;
                }
                remediate_added(client, record).await
            }
        };
        outcomes.push(outcome);
    }
    RemediationSummary { outcomes }
}

async fn remediate_removed(client: &Client, record: &DriftRecord, desired: &HashMap<ResourceIdentity, Value>) -> RemediationOutcome {
    let result = async {
        let desired_value = desired
            .get(&record.resource)
            .ok_or_else(|| K8sError::Malformed("desired manifest disappeared before remediation".to_string()))?;
        let api = api_for(client, &record.resource).await?;
        let object: DynamicObject = serde_json::from_value(desired_value.clone()).map_err(|e| K8sError::Malformed(e.to_string()))?;
        api.create(&PostParams::default(), &object).await?;
        Ok::<(), K8sError>(())
    }
    .await;
    outcome_of(record, result)
}

async fn remediate_modified(client: &Client, record: &DriftRecord, desired: &HashMap<ResourceIdentity, Value>) -> RemediationOutcome {
    let result = remediate_modified_inner(client, record, desired).await;
    outcome_of(record, result)
}

async fn remediate_modified_inner(
    client: &Client,
    record: &DriftRecord,
    desired: &HashMap<ResourceIdentity, Value>,
) -> Result<(), K8sError> {
    let desired_value = desired
        .get(&record.resource)
        .ok_or_else(|| K8sError::Malformed("desired manifest disappeared before remediation".to_string()))?;
    let api = api_for(client, &record.resource).await?;

    // Preserve the live object's resourceVersion/uid so the write targets the
    // object the controller just observed; on optimistic-concurrency conflict,
    // refetch and retry exactly once.
    for attempt in 0..2 {
        let live = api.get(&record.resource.name).await?;
        let mut patched = desired_value.clone();
        if let Some(metadata) = patched.get_mut("metadata").and_then(Value::as_object_mut) {
            if let Some(rv) = live.metadata.resource_version.clone() {
                metadata.insert("resourceVersion".to_string(), Value::String(rv));
            }
            if let Some(uid) = live.metadata.uid.clone() {
                metadata.insert("uid".to_string(), Value::String(uid));
            }
        }
        let object: DynamicObject = serde_json::from_value(patched).map_err(|e| K8sError::Malformed(e.to_string()))?;
        match api.replace(&record.resource.name, &PostParams::default(), &object).await {
            Ok(_) => return Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 409 && attempt == 0 => continue,
            Err(err) => return Err(K8sError::Api(err)),
        }
    }
    Err(K8sError::Api(kube::Error::Api(kube::core::ErrorResponse {
        status: "Conflict".to_string(),
        message: "resourceVersion conflict persisted after one retry".to_string(),
        reason: "Conflict".to_string(),
        code: 409,
    })))
}

async fn remediate_added(client: &Client, record: &DriftRecord) -> RemediationOutcome {
    // Highest-risk remediation: emit an event before deleting, not after, so
    // the deletion is observable even if the API call itself fails.
    tracing::warn!(resource = %record.resource, "deleting untracked live resource (removeUntrackedResources=true)");
    let result = async {
        let api = api_for(client, &record.resource).await?;
        api.delete(&record.resource.name, &Default::default()).await?;
        Ok::<(), K8sError>(())
    }
    .await;
    outcome_of(record, result)
}

fn outcome_of(record: &DriftRecord, result: Result<(), K8sError>) -> RemediationOutcome {
    match result {
        Ok(()) => RemediationOutcome { resource: record.resource.clone(), drift_type: record.drift_type, succeeded: true, error: None },
        Err(err) => {
            tracing::warn!(resource = %record.resource, drift_type = %record.drift_type, error = %err, "remediation failed");
            RemediationOutcome { resource: record.resource.clone(), drift_type: record.drift_type, succeeded: false, error: Some(err.to_string()) }
        }
    }
}
