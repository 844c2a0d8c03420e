//! Normalization and user ignore-rules for drift comparison.

use serde_json::Value;

const SYSTEM_MANAGED_METADATA_FIELDS: &[&str] = &["uid", "resourceVersion", "generation", "creationTimestamp", "managedFields", "selfLink"];

const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// Strips fields the controller considers system-managed or noise, in place.
/// Idempotent: normalizing an already-normalized object is a no-op.
pub fn normalize(value: &mut Value) {
    if let Some(metadata) = value.get_mut("metadata").and_then(Value::as_object_mut) {
        for field in SYSTEM_MANAGED_METADATA_FIELDS {
            metadata.remove(*field);
        }
        if let Some(annotations) = metadata.get_mut("annotations").and_then(Value::as_object_mut) {
            annotations.remove(LAST_APPLIED_ANNOTATION);
        }
        drop_if_empty(metadata, "annotations");
        drop_if_empty(metadata, "labels");
    }
}

fn drop_if_empty(map: &mut serde_json::Map<String, Value>, key: &str) {
    let is_empty = matches!(map.get(key), Some(Value::Object(obj)) if obj.is_empty());
    if is_empty {
        map.remove(key);
    }
}

/// Removes each dot-separated path from `value`. A path that doesn't exist on
/// either side is a silent no-op.
pub fn apply_ignore_fields(value: &mut Value, paths: &[String]) {
    for path in paths {
        remove_path(value, path);
    }
}

fn remove_path(value: &mut Value, path: &str) {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    let mut current = value;
    for segment in parents {
        match current.get_mut(*segment) {
            Some(next) => current = next,
            None => return,
        }
    }
    if let Some(obj) = current.as_object_mut() {
        obj.remove(*last);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_system_managed_metadata_and_empty_maps() {
        let mut value = json!({
            "metadata": {
                "name": "app",
                "uid": "abc-123",
                "resourceVersion": "42",
                "generation": 3,
                "creationTimestamp": "2024-01-01T00:00:00Z",
                "managedFields": [{"manager": "kubectl"}],
                "selfLink": "/api/v1/...",
                "annotations": {"kubectl.kubernetes.io/last-applied-configuration": "{}"},
                "labels": {},
            },
            "spec": {"replicas": 3},
        });
        normalize(&mut value);
        assert_eq!(
            value,
            json!({
                "metadata": {"name": "app"},
                "spec": {"replicas": 3},
            })
        );
    }

    #[test]
    fn normalize_is_idempotent() {
        let mut value = json!({"metadata": {"name": "app", "uid": "x"}});
        normalize(&mut value);
        let once = value.clone();
        normalize(&mut value);
        assert_eq!(value, once);
    }

    #[test]
    fn ignore_fields_removes_nested_path_from_both_shapes() {
        let mut value = json!({"spec": {"replicas": 5, "template": {}}});
        apply_ignore_fields(&mut value, &["spec.replicas".to_string()]);
        assert_eq!(value, json!({"spec": {"template": {}}}));
    }

    #[test]
    fn ignore_fields_missing_path_is_a_no_op() {
        let mut value = json!({"spec": {"replicas": 5}});
        let before = value.clone();
        apply_ignore_fields(&mut value, &["spec.nonexistent.deep".to_string()]);
        assert_eq!(value, before);
    }
}
