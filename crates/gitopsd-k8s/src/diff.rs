//! Canonical serialization and unified diffing for drift reporting.

use similar::TextDiff;
use serde_json::Value;

/// Serializes `value` to a stable text form: object keys sorted, so two
/// structurally-equal JSON values always produce byte-identical text
/// regardless of field order.
pub fn canonical_text(value: &Value) -> String {
    let sorted = sort_keys(value);
    serde_yaml::to_string(&sorted).unwrap_or_else(|_| sorted.to_string())
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Produces a unified diff of the canonical text forms of `desired` and
/// `actual`, 3 lines of context, attributed by name in the diff header.
pub fn unified_diff(desired: &Value, actual: &Value) -> String {
    let desired_text = canonical_text(desired);
    let actual_text = canonical_text(actual);
    TextDiff::from_lines(&desired_text, &actual_text)
        .unified_diff()
        .context_radius(3)
        .header("Desired", "Actual")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_text_is_stable_under_key_reordering() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(canonical_text(&a), canonical_text(&b));
    }

    #[test]
    fn unified_diff_is_empty_text_for_equal_values() {
        let value = json!({"spec": {"replicas": 3}});
        let diff = unified_diff(&value, &value);
        assert!(diff.lines().all(|line| !line.starts_with('+') && !line.starts_with('-')));
    }

    #[test]
    fn unified_diff_reports_changed_scalar() {
        let desired = json!({"spec": {"replicas": 3}});
        let actual = json!({"spec": {"replicas": 5}});
        let diff = unified_diff(&desired, &actual);
        assert!(diff.contains("Desired"));
        assert!(diff.contains("Actual"));
        assert!(diff.contains('-'));
        assert!(diff.contains('+'));
    }
}
