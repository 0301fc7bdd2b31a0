//! Core services for west workspaces.
//!
//! This crate holds the pieces everything else builds on: finding the
//! workspace topdir (the directory whose `.west/` marker defines the
//! workspace), the three-level configuration store, and the driver for
//! the external `git` binary.

pub mod config;
pub mod git;
pub mod paths;
pub mod workspace;

pub use config::{Config, ConfigError, ConfigScope};
pub use git::{Git, GitError};
pub use workspace::{Workspace, WorkspaceError, WEST_MARKER};
