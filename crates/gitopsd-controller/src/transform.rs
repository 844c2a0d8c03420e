//! Per-environment file transform.
//!
//! Deliberately syntactic substring replacement: it can match inside
//! comments or string literals. A structural (parse-then-rewrite) transform
//! would avoid that, but the textual contract is the one this controller
//! commits to, so that is what ships here.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use gitopsd_core::ResourceId;
use serde::Serialize;

pub const PROMOTION_METADATA_FILE: &str = ".promotion-metadata.yaml";

/// Rewrites one file's bytes from `from_env` to `to_env` per the three
/// documented substitutions. Non-UTF-8 files pass through unchanged — the
/// substitutions are textual and meaningless on binary content.
pub fn transform_file(bytes: &[u8], from_env: &str, to_env: &str) -> Vec<u8> {
    let Ok(text) = std::str::from_utf8(bytes) else {
        return bytes.to_vec();
    };
    let rewritten = text
        .replace(&format!("namespace: {from_env}"), &format!("namespace: {to_env}"))
        .replace(&format!("environment: {from_env}"), &format!("environment: {to_env}"))
        .replace(&format!("-{from_env}."), &format!("-{to_env}."));
    rewritten.into_bytes()
}

/// Applies [`transform_file`] to every file in `source`, keyed by its
/// relative path.
pub fn transform_files(source: &HashMap<String, Vec<u8>>, from_env: &str, to_env: &str) -> HashMap<String, Vec<u8>> {
    source.iter().map(|(path, bytes)| (path.clone(), transform_file(bytes, from_env, to_env))).collect()
}

#[derive(Debug, Serialize)]
struct PromotionMetadata {
    from: String,
    to: String,
    revision: String,
    #[serde(rename = "promotedBy")]
    promoted_by: String,
    #[serde(rename = "promotedAt")]
    promoted_at: DateTime<Utc>,
    deployment: String,
}

/// Renders `.promotion-metadata.yaml`, the provenance record stamped into
/// every promoted file set.
pub fn render_promotion_metadata(
    from: &str,
    to: &str,
    revision: &str,
    promoted_by: &str,
    promoted_at: DateTime<Utc>,
    deployment: ResourceId,
) -> Vec<u8> {
    let metadata = PromotionMetadata {
        from: from.to_string(),
        to: to.to_string(),
        revision: revision.to_string(),
        promoted_by: promoted_by.to_string(),
        promoted_at,
        deployment: deployment.to_string(),
    };
    serde_yaml::to_string(&metadata).unwrap_or_default().into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_namespace_environment_and_host_suffix() {
        let text = b"namespace: dev\nenvironment: dev\nhost: app-dev.example.com\n".to_vec();
        let rewritten = transform_file(&text, "dev", "staging");
        let rewritten = String::from_utf8(rewritten).unwrap();
        assert!(rewritten.contains("namespace: staging"));
        assert!(rewritten.contains("environment: staging"));
        assert!(rewritten.contains("app-staging.example.com"));
    }

    #[test]
    fn leaves_unrelated_text_untouched() {
        let text = b"kind: Deployment\nmetadata:\n  name: app\n".to_vec();
        let rewritten = transform_file(&text, "dev", "staging");
        assert_eq!(rewritten, text);
    }

    #[test]
    fn non_utf8_bytes_pass_through_unchanged() {
        let bytes = vec![0xff, 0xfe, 0x00, 0x01];
        let rewritten = transform_file(&bytes, "dev", "staging");
        assert_eq!(rewritten, bytes);
    }

    #[test]
    fn promotion_metadata_round_trips_through_yaml() {
        let bytes = render_promotion_metadata("dev", "staging", "abc123", "alice", Utc::now(), ResourceId::new());
        let parsed: serde_yaml::Value = serde_yaml::from_slice(&bytes).unwrap();
        assert_eq!(parsed["from"].as_str(), Some("dev"));
        assert_eq!(parsed["to"].as_str(), Some("staging"));
        assert_eq!(parsed["revision"].as_str(), Some("abc123"));
    }
}
