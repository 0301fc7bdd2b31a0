//! Workspace discovery.
//!
//! A west workspace is identified by one thing only: a directory that
//! contains a `.west/` subdirectory. Discovery walks upward from a
//! starting directory until it finds that marker, falling back (once) to
//! `$ZEPHYR_BASE` if the walk reaches the filesystem root.

use std::path::{Path, PathBuf};

use crate::paths::canon_path;

/// Name of the marker directory that defines a workspace.
pub const WEST_MARKER: &str = ".west";

/// Environment variable consulted as a last-resort starting point.
pub const ZEPHYR_BASE_VAR: &str = "ZEPHYR_BASE";

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("could not find a west workspace in {start} or any parent directory")]
    NotFound { start: String },

    #[error("cannot determine the current directory: {source}")]
    NoCurrentDir { source: std::io::Error },
}

/// A located workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    topdir: PathBuf,
}

impl Workspace {
    /// Finds the workspace containing `start` (or the current directory).
    pub fn find(start: Option<&Path>) -> Result<Self, WorkspaceError> {
        west_topdir(start).map(|topdir| Workspace { topdir })
    }

    /// Wraps a known topdir without searching.
    ///
    /// The caller asserts that `topdir` contains the marker directory;
    /// this is used by code that just created the workspace.
    pub fn at(topdir: impl Into<PathBuf>) -> Self {
        Workspace { topdir: canon_path(&topdir.into()) }
    }

    /// The directory all project paths are relative to.
    pub fn topdir(&self) -> &Path {
        &self.topdir
    }

    /// The `.west/` marker directory.
    pub fn west_dir(&self) -> PathBuf {
        self.topdir.join(WEST_MARKER)
    }

    /// The local configuration file inside the marker directory.
    pub fn local_config_path(&self) -> PathBuf {
        self.west_dir().join("config")
    }
}

/// Returns the topdir of the workspace containing `start` (default: the
/// current directory).
pub fn west_topdir(start: Option<&Path>) -> Result<PathBuf, WorkspaceError> {
    let start = match start {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir()
            .map_err(|source| WorkspaceError::NoCurrentDir { source })?,
    };
    let fallback = std::env::var_os(ZEPHYR_BASE_VAR).map(PathBuf::from);
    find_topdir(&start, fallback.as_deref())
}

/// Like [`west_topdir`], but returns the `.west/` directory itself.
pub fn west_dir(start: Option<&Path>) -> Result<PathBuf, WorkspaceError> {
    west_topdir(start).map(|topdir| topdir.join(WEST_MARKER))
}

/// The topdir of the workspace containing `start`, if any, without the
/// `ZEPHYR_BASE` fallback. Used to refuse nested workspace creation.
pub fn enclosing_topdir(start: &Path) -> Option<PathBuf> {
    find_topdir(start, None).ok()
}

fn find_topdir(start: &Path, fallback: Option<&Path>) -> Result<PathBuf, WorkspaceError> {
    let canon_start = canon_path(start);
    let mut current = canon_start.clone();

    loop {
        if current.join(WEST_MARKER).is_dir() {
            return Ok(current);
        }
        if !current.pop() {
            // Ran out of parents. Retry once from the fallback, unless
            // that is where we already were.
            if let Some(base) = fallback {
                if !canon_start.starts_with(canon_path(base)) {
                    return find_topdir(base, None);
                }
            }
            return Err(WorkspaceError::NotFound {
                start: start.display().to_string(),
            });
        }
    }
}
