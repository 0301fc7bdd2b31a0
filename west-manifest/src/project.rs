//! The resolved project model.

use std::path::PathBuf;

use west_core::git::{Git, GitError};
use west_core::paths;

use crate::{MANIFEST_PROJECT_NAME, QUAL_MANIFEST_REV};

/// One project in a resolved manifest.
///
/// The first project in every resolved manifest is the *manifest
/// project*: the repository containing the manifest file itself. It has
/// the reserved name `manifest`, an empty URL, and the fixed revision
/// `HEAD`; its path may be unknown when the manifest was loaded from
/// bare data.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub name: String,
    pub url: String,
    pub revision: String,
    /// Workspace-relative path. `None` only for a manifest project whose
    /// location is unknown.
    pub path: Option<String>,
    pub topdir: Option<PathBuf>,
    /// Name for the convenience remote created on clone. Taken from the
    /// manifest remote the URL was derived from, `origin` otherwise.
    pub remote_name: String,
    pub clone_depth: Option<u32>,
    /// Workspace-relative files declaring extension commands; files
    /// inherited through imports come after the project's own.
    pub west_commands: Vec<String>,
    pub groups: Vec<String>,
    /// Opaque caller data, passed through unexamined.
    pub userdata: Option<serde_yaml::Value>,
    /// `true`, `false`, or a list; opaque to the core.
    pub submodules: Option<serde_yaml::Value>,
}

impl Project {
    pub(crate) fn manifest_project(path: Option<String>, topdir: Option<PathBuf>) -> Self {
        Project {
            name: MANIFEST_PROJECT_NAME.to_string(),
            url: String::new(),
            revision: "HEAD".to_string(),
            path,
            topdir,
            remote_name: "origin".to_string(),
            clone_depth: None,
            west_commands: Vec::new(),
            groups: Vec::new(),
            userdata: None,
            submodules: None,
        }
    }

    /// True for the manifest repository's own entry.
    pub fn is_manifest_project(&self) -> bool {
        self.name == MANIFEST_PROJECT_NAME
    }

    /// Absolute path of the working tree; requires a known topdir and
    /// path.
    pub fn abspath(&self) -> Option<PathBuf> {
        match (&self.topdir, &self.path) {
            (Some(topdir), Some(path)) => Some(paths::canon_path(&topdir.join(path))),
            _ => None,
        }
    }

    /// [`Project::abspath`] rendered with forward slashes.
    pub fn posixpath(&self) -> Option<String> {
        self.abspath().map(|p| paths::to_posix(&p))
    }

    /// `name (path)`, for messages.
    pub fn name_and_path(&self) -> String {
        match &self.path {
            Some(path) => format!("{} ({})", self.name, path),
            None => self.name.clone(),
        }
    }

    /// True if the project directory exists and is a git repository.
    pub fn is_cloned(&self, git: &Git) -> bool {
        self.abspath().is_some_and(|p| p.is_dir() && git.is_repo(&p))
    }

    /// Resolves `rev` to a SHA in the project repository.
    pub fn sha(&self, git: &Git, rev: &str) -> Result<String, GitError> {
        git.rev_parse(&self.must_abspath(), rev)
    }

    /// SHA of the internal `manifest-rev` ref.
    pub fn manifest_rev_sha(&self, git: &Git) -> Result<String, GitError> {
        self.sha(git, QUAL_MANIFEST_REV)
    }

    /// Reads a blob at `rev:path` from the project repository.
    pub fn read_at(&self, git: &Git, rev: &str, path: &str) -> Result<Vec<u8>, GitError> {
        git.read_blob_at(&self.must_abspath(), rev, path)
    }

    pub(crate) fn must_abspath(&self) -> PathBuf {
        // Callers check is_cloned()/abspath() first; fall back to the
        // name so a missing topdir surfaces as a git error, not a panic.
        self.abspath().unwrap_or_else(|| PathBuf::from(&self.name))
    }
}

/// A `remotes:` entry: a short name for a URL prefix. Remotes are local
/// to the document that declares them and never appear in resolved
/// output.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Remote {
    pub name: String,
    #[serde(rename = "url-base")]
    pub url_base: String,
}

/// Joins a remote's url-base with a project's repo-path or name.
pub(crate) fn remote_url(url_base: &str, tail: &str) -> String {
    format!("{}/{}", url_base.trim_end_matches('/'), tail)
}
