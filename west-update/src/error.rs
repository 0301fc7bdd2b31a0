//! Error types for the update engine.

use std::path::PathBuf;

use west_core::{ConfigError, GitError, WorkspaceError};
use west_manifest::ManifestError;

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// One or more projects failed to update; the rest were still
    /// attempted.
    #[error("{}", format_failed(failed))]
    Projects { failed: Vec<String> },

    /// A logical failure already reported to the user.
    #[error("command exited with code {returncode}")]
    Command { returncode: i32 },

    /// Projects were named that only exist through manifest imports.
    #[error("refusing to update project{}: {}; only a plain update (no project list) can update \
             projects resolved through imports", if ids.len() == 1 { "" } else { "s" }, ids.join(", "))]
    ImportedProjects { ids: Vec<String> },

    /// Named projects are unknown, and the full manifest cannot be
    /// resolved to say more.
    #[error("project{} {} {} unknown or defined through imports; run a plain update first",
            if ids.len() == 1 { "" } else { "s" }, ids.join(", "),
            if ids.len() == 1 { "is" } else { "are" })]
    UnknownOrImported { ids: Vec<String> },

    /// A resolved project has no workspace location to update.
    #[error("project {name} has no workspace path")]
    NoProjectPath { name: String },

    #[error("{directory} is already inside the workspace at {topdir}")]
    AlreadyInWorkspace { directory: PathBuf, topdir: PathBuf },

    #[error("{path} already exists; move or delete it first")]
    DestinationExists { path: PathBuf },

    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

impl UpdateError {
    /// Exit status for a driving CLI: git failures propagate the git
    /// exit code, everything else is 1.
    pub fn returncode(&self) -> i32 {
        match self {
            UpdateError::Command { returncode } => *returncode,
            UpdateError::Git(err) => err.returncode(),
            UpdateError::Manifest(ManifestError::Git(err)) => err.returncode(),
            _ => 1,
        }
    }
}

// Short failure lists name every project; large ones get a summary
// (the per-project errors were already logged as they happened).
fn format_failed(failed: &[String]) -> String {
    if failed.len() < 20 {
        format!(
            "update failed for project{} {}",
            if failed.len() == 1 { "" } else { "s" },
            failed.join(", ")
        )
    } else {
        "update failed for multiple projects; see above".to_string()
    }
}
