//! Workspace bootstrap.
//!
//! Creating a workspace clones the manifest repository into a temporary
//! directory inside the `.west/` marker, reads the manifest's
//! `self.path` to learn where the repository belongs, moves it there,
//! and records `manifest.path`/`manifest.file` in local configuration.
//! The temporary directory is removed whether or not any of that
//! succeeds.

use std::fs;
use std::path::Path;

use tracing::info;

use west_core::config::{Config, ConfigLocations, ConfigScope};
use west_core::git::Git;
use west_core::workspace::{self, Workspace};
use west_manifest::{ImportMode, LoadOptions, Manifest, DEFAULT_MANIFEST_FILE};

use crate::error::UpdateError;

/// How to create a workspace.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// URL of the manifest repository.
    pub manifest_url: String,
    /// Revision to check out; the clone's default branch otherwise.
    pub revision: Option<String>,
    /// Manifest file name inside the repository; `west.yml` otherwise.
    pub manifest_file: Option<String>,
}

/// Creates a workspace at `directory` by cloning the manifest
/// repository and seeding local configuration.
pub fn init_workspace(
    directory: &Path,
    git: &Git,
    opts: &InitOptions,
) -> Result<Workspace, UpdateError> {
    // Nested workspaces are never what anyone wants.
    if let Some(topdir) = workspace::enclosing_topdir(directory) {
        return Err(UpdateError::AlreadyInWorkspace {
            directory: directory.to_path_buf(),
            topdir,
        });
    }

    let west_dir = directory.join(workspace::WEST_MARKER);
    fs::create_dir_all(&west_dir).map_err(|source| UpdateError::Io {
        path: west_dir.clone(),
        source,
    })?;
    let tempdir = west_dir.join("manifest-tmp");
    if tempdir.exists() {
        // Leftover from an interrupted init.
        fs::remove_dir_all(&tempdir).map_err(|source| UpdateError::Io {
            path: tempdir.clone(),
            source,
        })?;
    }

    let result = bootstrap(directory, git, opts, &tempdir);
    if tempdir.exists() {
        // On success the clone was moved away; on failure this is the
        // partial clone.
        let _ = fs::remove_dir_all(&tempdir);
    }
    if result.is_err() {
        let _ = fs::remove_dir_all(&west_dir);
    }
    result?;
    Ok(Workspace::at(directory))
}

fn bootstrap(
    directory: &Path,
    git: &Git,
    opts: &InitOptions,
    tempdir: &Path,
) -> Result<(), UpdateError> {
    info!("cloning manifest repository from {}", opts.manifest_url);
    git.clone(&opts.manifest_url, tempdir)?;
    if let Some(revision) = &opts.revision {
        git.checkout_detach(tempdir, revision)?;
    }

    let manifest_file = opts.manifest_file.as_deref().unwrap_or(DEFAULT_MANIFEST_FILE);
    let manifest = Manifest::from_file(
        &tempdir.join(manifest_file),
        &LoadOptions { topdir: None, manifest_path: None, mode: ImportMode::Ignore },
    )?;

    // Where the manifest repository lives: its own self.path, or the
    // repository name from the URL.
    let manifest_path = manifest
        .manifest_project()
        .path
        .clone()
        .unwrap_or_else(|| repo_name(&opts.manifest_url));
    let destination = directory.join(&manifest_path);
    if destination.exists() {
        return Err(UpdateError::DestinationExists { path: destination });
    }
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|source| UpdateError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::rename(tempdir, &destination).map_err(|source| UpdateError::Io {
        path: destination.clone(),
        source,
    })?;
    info!("manifest repository placed at {}", destination.display());

    let mut config = Config::with_locations(ConfigLocations {
        local: Some(directory.join(workspace::WEST_MARKER).join("config")),
        ..ConfigLocations::default()
    })?;
    config.set("manifest.path", &manifest_path, ConfigScope::Local)?;
    config.set("manifest.file", manifest_file, ConfigScope::Local)?;
    Ok(())
}

// The final path component of a repository URL, sans any .git suffix.
fn repo_name(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let tail = trimmed.rsplit(['/', ':']).next().unwrap_or(trimmed);
    tail.strip_suffix(".git").unwrap_or(tail).to_string()
}
