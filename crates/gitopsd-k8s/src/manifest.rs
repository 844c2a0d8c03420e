//! Parses desired-state manifests out of a working tree. Desired state
//! always comes from here, never from an external engine's cache.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use gitopsd_core::resource::ResourceIdentity;

use crate::error::{K8sError, K8sResult};

const DEFAULT_NAMESPACE: &str = "default";

/// Parses every `.yaml`/`.yml` file's documents (a file may hold several,
/// separated by `---`) into resources keyed by identity. Files without a
/// recognizable `apiVersion`/`kind`/`metadata.name` are rejected rather than
/// silently skipped — a malformed manifest should fail the tick loudly.
pub fn parse_manifests(files: &HashMap<String, Vec<u8>>) -> K8sResult<HashMap<ResourceIdentity, Value>> {
    let mut out = HashMap::new();
    for (path, bytes) in files {
        if !(path.ends_with(".yaml") || path.ends_with(".yml")) {
            continue;
        }
        let text = std::str::from_utf8(bytes).map_err(|e| K8sError::Manifest(format!("{path}: not valid UTF-8: {e}")))?;
        for document in serde_yaml::Deserializer::from_str(text) {
            let value = Value::deserialize(document).map_err(|e| K8sError::Manifest(format!("{path}: {e}")))?;
            if value.is_null() {
                continue;
            }
            let identity = identity_of(&value).map_err(|e| K8sError::Manifest(format!("{path}: {e}")))?;
            out.insert(identity, value);
        }
    }
    Ok(out)
}

fn identity_of(value: &Value) -> Result<ResourceIdentity, String> {
    let api_version = value
        .get("apiVersion")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing apiVersion".to_string())?;
    let kind = value.get("kind").and_then(Value::as_str).ok_or_else(|| "missing kind".to_string())?.to_string();
    let name = value
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
        .ok_or_else(|| "missing metadata.name".to_string())?
        .to_string();
    let namespace = value
        .get("metadata")
        .and_then(|m| m.get("namespace"))
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_NAMESPACE)
        .to_string();
    let (group, version) = match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    };
    Ok(ResourceIdentity { group, version, kind, namespace, name })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(contents: &str) -> HashMap<String, Vec<u8>> {
        let mut map = HashMap::new();
        map.insert("dev/deployment/app.yaml".to_string(), contents.as_bytes().to_vec());
        map
    }

    #[test]
    fn parses_core_v1_resource_with_no_group() {
        let files = file("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: app-config\n  namespace: dev\n");
        let parsed = parse_manifests(&files).unwrap();
        let identity = parsed.keys().next().unwrap();
        assert_eq!(identity.group, "");
        assert_eq!(identity.version, "v1");
        assert_eq!(identity.kind, "ConfigMap");
        assert_eq!(identity.namespace, "dev");
    }

    #[test]
    fn parses_grouped_resource_and_multiple_documents() {
        let files = file(
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: app\n  namespace: dev\n---\napiVersion: v1\nkind: Service\nmetadata:\n  name: app\n  namespace: dev\n",
        );
        let parsed = parse_manifests(&files).unwrap();
        assert_eq!(parsed.len(), 2);
        let deployment_identity = ResourceIdentity {
            group: "apps".to_string(),
            version: "v1".to_string(),
            kind: "Deployment".to_string(),
            namespace: "dev".to_string(),
            name: "app".to_string(),
        };
        assert!(parsed.contains_key(&deployment_identity));
    }

    #[test]
    fn defaults_missing_namespace_to_default() {
        let files = file("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: app-config\n");
        let parsed = parse_manifests(&files).unwrap();
        assert_eq!(parsed.keys().next().unwrap().namespace, "default");
    }

    #[test]
    fn missing_kind_is_an_error() {
        let files = file("apiVersion: v1\nmetadata:\n  name: app-config\n");
        assert!(parse_manifests(&files).is_err());
    }

    #[test]
    fn ignores_non_yaml_files() {
        let mut files = HashMap::new();
        files.insert("dev/README.md".to_string(), b"not a manifest".to_vec());
        assert!(parse_manifests(&files).unwrap().is_empty());
    }
}
