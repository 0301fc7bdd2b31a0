//! Fetch caches: local seeds for first-time clones.
//!
//! Three kinds, consulted in priority order: a name cache (directories
//! named after projects), a path cache (mirroring workspace layout),
//! and an auto cache of bare mirrors that the engine itself maintains,
//! keyed by a hash of the fetch URL. Caches only seed the initial
//! clone; the configured remote URL is always the manifest URL and
//! later fetches go straight to it.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use west_core::git::Git;
use west_manifest::Project;

use crate::error::UpdateError;

/// The cache directories one update run may consult.
#[derive(Debug, Default, Clone)]
pub struct Caches {
    pub name_cache: Option<PathBuf>,
    pub path_cache: Option<PathBuf>,
    pub auto_cache: Option<PathBuf>,
}

impl Caches {
    /// Finds a local directory to seed `project`'s clone from, if any
    /// cache has one.
    pub(crate) fn seed_for(
        &self,
        git: &Git,
        project: &Project,
    ) -> Result<Option<PathBuf>, UpdateError> {
        if let Some(name_cache) = &self.name_cache {
            let candidate = name_cache.join(&project.name);
            if candidate.is_dir() {
                debug!(project = %project.name, cache = %candidate.display(), "name cache hit");
                return Ok(Some(candidate));
            }
        }
        if let Some(path_cache) = &self.path_cache {
            if let Some(path) = &project.path {
                let candidate = path_cache.join(path);
                if candidate.is_dir() {
                    debug!(project = %project.name, cache = %candidate.display(), "path cache hit");
                    return Ok(Some(candidate));
                }
            }
        }
        if let Some(auto_cache) = &self.auto_cache {
            return auto_cache_seed(git, auto_cache, project).map(Some);
        }
        Ok(None)
    }
}

// Returns the auto-cache mirror for the project's URL, creating or
// refreshing it as needed.
fn auto_cache_seed(git: &Git, dir: &Path, project: &Project) -> Result<PathBuf, UpdateError> {
    let key = url_hash(&project.url);
    let mirror = dir.join(&key);
    let info_file = dir.join(format!("{key}.info"));

    if mirror.is_dir() {
        debug!(project = %project.name, "refreshing auto cache mirror");
        git.remote_update(&mirror)?;
    } else {
        info!(project = %project.name, url = %project.url, "seeding auto cache mirror");
        fs::create_dir_all(dir).map_err(|source| UpdateError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        git.clone_mirror(&project.url, &mirror)?;
        // The sidecar records which URL the opaque key stands for.
        fs::write(&info_file, format!("{}\n", project.url)).map_err(|source| UpdateError::Io {
            path: info_file.clone(),
            source,
        })?;
    }
    Ok(mirror)
}

fn url_hash(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}
