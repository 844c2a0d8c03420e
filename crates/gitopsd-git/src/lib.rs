//! Repository Sync Engine.
//!
//! Materializes a Git revision into a working tree, authenticates to the
//! remote, and exposes the small capability set the Reconciler and Promotion
//! Manager build on: `clone`, `checkout`, `current_revision`, `files_at`,
//! `write_files`, `commit_and_push`.

pub mod backoff;
pub mod credentials;
pub mod error;
pub mod sync;

pub use error::{GitError, GitResult};
pub use sync::{GitRef, RetryConfig, WorkingTree, checkout, clone, commit_and_push, current_revision, files_at, write_files};
