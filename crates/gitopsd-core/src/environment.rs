//! Environment pipeline: one entry per promotion stage.

use serde::{Deserialize, Serialize};

use crate::promotion::PromotionGate;

/// One entry in a deployment's linear (or DAG-shaped, via `PromotionPolicy`)
/// pipeline of promotion stages, e.g. `dev`, `staging`, `production`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    /// Unique within the pipeline.
    pub name: String,
    pub branch: String,
    /// Repository-relative subtree for this environment's manifests.
    pub path: String,
    pub auto_sync: bool,
    /// Gates that must pass to *enter* this environment via promotion.
    pub gates: Vec<PromotionGate>,
}

impl EnvironmentSpec {
    /// `path` must be repository-relative and must not escape the repository
    /// root.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("environment name must not be empty".into());
        }
        let normalized = std::path::Path::new(&self.path);
        if normalized.is_absolute() || normalized.components().any(|c| c.as_os_str() == "..") {
            return Err(format!(
                "environment '{}' path '{}' escapes the repository root",
                self.name, self.path
            ));
        }
        Ok(())
    }
}
