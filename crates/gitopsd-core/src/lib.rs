//! Core domain types and traits for the GitOps controller.
//!
//! This crate contains:
//! - Resource identifiers and the error taxonomy
//! - `GitOpsDeployment`, `EnvironmentSpec`, and the promotion graph
//! - Promotion requests/history and the approval side-entity
//! - Managed-resource inventory and drift records
//! - Credential modeling and the pluggable `GitOpsEngine` trait

pub mod approval;
pub mod credential;
pub mod deployment;
pub mod engine;
pub mod environment;
pub mod error;
pub mod id;
pub mod promotion;
pub mod resource;

pub use error::{Error, Result};
pub use id::ResourceId;
