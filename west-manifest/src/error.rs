//! Error types for manifest loading and resolution.

use std::path::PathBuf;

use west_core::GitError;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// The manifest violates the schema or a semantic constraint.
    /// Carries every reason found in the offending document.
    #[error("malformed manifest: {}", reasons.join("; "))]
    Malformed { reasons: Vec<String> },

    /// The manifest requires a newer schema than this implementation
    /// supports. Raised before any other diagnostics for the document.
    #[error("manifest{} requires schema version {version}, but the maximum supported is {max}",
            file.as_ref().map(|f| format!(" {}", f.display())).unwrap_or_default())]
    Version {
        version: String,
        max: String,
        file: Option<PathBuf>,
    },

    /// A sub-manifest could not be read from a project (missing file,
    /// missing `manifest-rev`, or an uncloned repository).
    #[error("cannot import {file} from project {project}: {reason}")]
    ImportFailed {
        project: String,
        file: String,
        reason: String,
    },

    /// Import recursion exceeded the depth limit; almost certainly an
    /// import loop.
    #[error("import depth exceeded while importing {file} (limit {limit}); \
             manifest imports may contain a loop")]
    ImportDepth { file: String, limit: usize },

    /// One or more requested project names/paths are not in the manifest.
    #[error("unknown project{}: {}", if ids.len() == 1 { "" } else { "s" }, ids.join(", "))]
    UnknownProjects { ids: Vec<String> },

    /// A project's `manifest-rev` SHA could not be resolved while
    /// freezing.
    #[error("cannot freeze project {project}: {reason}")]
    CannotFreeze { project: String, reason: String },

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Config(#[from] west_core::ConfigError),
}

impl ManifestError {
    /// Shorthand for a single-reason [`ManifestError::Malformed`].
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        ManifestError::Malformed { reasons: vec![reason.into()] }
    }
}
