//! Static startup configuration for the controller daemon, in KDL.
//!
//! `GitOpsDeployment`/`GitOpsPromotion`/`ApprovalRequest` are cluster-declarative
//! resources represented as plain `serde` types elsewhere in the workspace —
//! they are not KDL documents. KDL here is reserved for the ambient daemon
//! config: listen address, credential-store backend, backoff tuning.

use std::time::Duration;

use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};

use crate::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Address the ambient HTTP surface (`/healthz`, `/readyz`, status reads) binds.
    pub listen_addr: String,
    pub credential_store: CredentialStoreConfig,
    pub reconcile: ReconcileConfig,
    pub git: GitRetryConfig,
    pub promotion: PromotionConfig,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            credential_store: CredentialStoreConfig::default(),
            reconcile: ReconcileConfig::default(),
            git: GitRetryConfig::default(),
            promotion: PromotionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialStoreConfig {
    pub backend: String,
}

impl Default for CredentialStoreConfig {
    fn default() -> Self {
        Self { backend: "kubernetes-secrets".to_string() }
    }
}

/// Backoff tuning for failed reconcile ticks: base 5s, cap 5min, +/-20% jitter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReconcileConfig {
    pub default_poll_interval: Duration,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub backoff_jitter: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            default_poll_interval: Duration::from_secs(30),
            backoff_base: Duration::from_secs(5),
            backoff_cap: Duration::from_secs(5 * 60),
            backoff_jitter: 0.2,
        }
    }
}

/// Git sync retry policy: 3 attempts, base 500ms, cap 8s.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GitRetryConfig {
    pub retry_attempts: u32,
    pub retry_base: Duration,
    pub retry_cap: Duration,
}

impl Default for GitRetryConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_base: Duration::from_millis(500),
            retry_cap: Duration::from_secs(8),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PromotionConfig {
    pub operation_timeout: Duration,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self { operation_timeout: Duration::from_secs(10 * 60) }
    }
}

/// Parse system configuration from KDL text, e.g.:
///
/// ```kdl
/// gitops-controller {
///     listen "0.0.0.0:8080"
///     credential-store backend="kubernetes-secrets"
///     reconcile {
///         default-poll-interval "30s"
///         backoff base="5s" cap="5m" jitter=0.2
///     }
///     git {
///         retry-attempts 3
///         retry-base "500ms"
///         retry-cap "8s"
///     }
///     promotion {
///         operation-timeout "10m"
///     }
/// }
/// ```
pub fn parse_system_config(kdl: &str) -> ConfigResult<SystemConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let root = doc
        .nodes()
        .iter()
        .find(|n| n.name().value() == "gitops-controller")
        .ok_or_else(|| ConfigError::MissingField("gitops-controller".to_string()))?;
    let children = root
        .children()
        .ok_or_else(|| ConfigError::MissingField("gitops-controller { ... }".to_string()))?;

    let mut cfg = SystemConfig::default();

    if let Some(node) = find_node(children, "listen") {
        cfg.listen_addr = first_string_arg(node, "listen")?;
    }
    if let Some(node) = find_node(children, "credential-store") {
        cfg.credential_store.backend = string_prop(node, "backend", "credential-store")?;
    }
    if let Some(node) = find_node(children, "reconcile") {
        let sub = node
            .children()
            .ok_or_else(|| ConfigError::MissingField("reconcile { ... }".to_string()))?;
        if let Some(n) = find_node(sub, "default-poll-interval") {
            cfg.reconcile.default_poll_interval = parse_duration(&first_string_arg(n, "default-poll-interval")?)?;
        }
        if let Some(n) = find_node(sub, "backoff") {
            cfg.reconcile.backoff_base = parse_duration(&string_prop(n, "base", "backoff")?)?;
            cfg.reconcile.backoff_cap = parse_duration(&string_prop(n, "cap", "backoff")?)?;
            cfg.reconcile.backoff_jitter = float_prop(n, "jitter", "backoff")?;
        }
    }
    if let Some(node) = find_node(children, "git") {
        let sub = node.children().ok_or_else(|| ConfigError::MissingField("git { ... }".to_string()))?;
        if let Some(n) = find_node(sub, "retry-attempts") {
            cfg.git.retry_attempts = int_arg(n, "retry-attempts")? as u32;
        }
        if let Some(n) = find_node(sub, "retry-base") {
            cfg.git.retry_base = parse_duration(&first_string_arg(n, "retry-base")?)?;
        }
        if let Some(n) = find_node(sub, "retry-cap") {
            cfg.git.retry_cap = parse_duration(&first_string_arg(n, "retry-cap")?)?;
        }
    }
    if let Some(node) = find_node(children, "promotion") {
        let sub = node
            .children()
            .ok_or_else(|| ConfigError::MissingField("promotion { ... }".to_string()))?;
        if let Some(n) = find_node(sub, "operation-timeout") {
            cfg.promotion.operation_timeout = parse_duration(&first_string_arg(n, "operation-timeout")?)?;
        }
    }

    Ok(cfg)
}

fn find_node<'a>(doc: &'a KdlDocument, name: &str) -> Option<&'a KdlNode> {
    doc.nodes().iter().find(|n| n.name().value() == name)
}

fn first_string_arg(node: &KdlNode, field: &str) -> ConfigResult<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(str::to_string)
        .ok_or_else(|| ConfigError::MissingField(field.to_string()))
}

fn string_prop(node: &KdlNode, prop: &str, field: &str) -> ConfigResult<String> {
    node.entries()
        .iter()
        .find(|e| e.name().map(|n| n.value()) == Some(prop))
        .and_then(|e| e.value().as_string())
        .map(str::to_string)
        .ok_or_else(|| ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("missing property '{prop}'"),
        })
}

fn float_prop(node: &KdlNode, prop: &str, field: &str) -> ConfigResult<f64> {
    node.entries()
        .iter()
        .find(|e| e.name().map(|n| n.value()) == Some(prop))
        .and_then(|e| e.value().as_float())
        .ok_or_else(|| ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("missing numeric property '{prop}'"),
        })
}

fn int_arg(node: &KdlNode, field: &str) -> ConfigResult<i64> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
        .ok_or_else(|| ConfigError::MissingField(field.to_string()))
}

/// Minimal duration-literal parser: an integer followed by `ms`, `s`, `m`, or `h`.
fn parse_duration(text: &str) -> ConfigResult<Duration> {
    let text = text.trim();
    let split_at = text.find(|c: char| !c.is_ascii_digit()).ok_or_else(|| ConfigError::InvalidValue {
        field: "duration".to_string(),
        message: format!("'{text}' has no unit suffix"),
    })?;
    let (number, unit) = text.split_at(split_at);
    let value: u64 = number.parse().map_err(|_| ConfigError::InvalidValue {
        field: "duration".to_string(),
        message: format!("'{number}' is not a valid integer"),
    })?;
    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        other => Err(ConfigError::InvalidValue {
            field: "duration".to_string(),
            message: format!("unknown duration unit '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        gitops-controller {
            listen "0.0.0.0:9090"
            credential-store backend="vault"
            reconcile {
                default-poll-interval "15s"
                backoff base="5s" cap="5m" jitter=0.2
            }
            git {
                retry-attempts 3
                retry-base "500ms"
                retry-cap "8s"
            }
            promotion {
                operation-timeout "10m"
            }
        }
    "#;

    #[test]
    fn parses_full_config() {
        let cfg = parse_system_config(SAMPLE).unwrap();
        assert_eq!(cfg.listen_addr, "0.0.0.0:9090");
        assert_eq!(cfg.credential_store.backend, "vault");
        assert_eq!(cfg.reconcile.default_poll_interval, Duration::from_secs(15));
        assert_eq!(cfg.reconcile.backoff_cap, Duration::from_secs(300));
        assert_eq!(cfg.git.retry_attempts, 3);
        assert_eq!(cfg.promotion.operation_timeout, Duration::from_secs(600));
    }

    #[test]
    fn missing_root_node_errors() {
        let err = parse_system_config("not-the-right-node {}").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));
    }

    #[test]
    fn defaults_when_sections_omitted() {
        let cfg = parse_system_config("gitops-controller { listen \"127.0.0.1:8080\" }").unwrap();
        assert_eq!(cfg.listen_addr, "127.0.0.1:8080");
        assert_eq!(cfg.reconcile.default_poll_interval, Duration::from_secs(30));
    }

    #[test]
    fn duration_parser_rejects_unknown_unit() {
        assert!(parse_duration("10x").is_err());
    }
}
