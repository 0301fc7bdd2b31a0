//! The west update engine.
//!
//! Given a workspace and its resolved manifest, bring every selected
//! project's working tree to the manifest's pinned revision: clone if
//! missing (seeding from local caches when available), move the
//! internal `manifest-rev` ref (fetching only when the smart strategy
//! requires it), and reconcile checked-out branches by detaching,
//! rebasing, or keeping descendants. Also hosts the workspace bootstrap
//! used by `init`.

pub mod cache;
pub mod engine;
pub mod error;
pub mod init;
mod stats;

pub use cache::Caches;
pub use engine::{FetchStrategy, UpdateOptions, UpdateReport, Updater};
pub use error::UpdateError;
pub use init::{init_workspace, InitOptions};
