//! The update engine.
//!
//! Brings each selected project's working tree into the state the
//! resolved manifest asks for: ensure the repository exists, point
//! `refs/heads/manifest-rev` at the target revision (fetching only when
//! necessary), then reconcile the working tree without clobbering user
//! branches.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, error, info, warn};

use west_core::config::Config;
use west_core::git::Git;
use west_manifest::{
    groups, read_project_manifest, ImportMode, ImportedContent, Manifest, ManifestError,
    ManifestImporter, Project, QUAL_MANIFEST_REV, QUAL_REFS_WEST,
};

use crate::cache::Caches;
use crate::error::UpdateError;
use crate::stats::Stats;

/// When to hit the network for a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchStrategy {
    /// Skip the fetch when the revision is a locally available tag or
    /// commit.
    #[default]
    Smart,
    /// Fetch unconditionally.
    Always,
}

impl FromStr for FetchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "smart" => Ok(FetchStrategy::Smart),
            "always" => Ok(FetchStrategy::Always),
            other => Err(format!("invalid fetch strategy \"{other}\"; choices: always, smart")),
        }
    }
}

/// Caller-selected behavior for one update run.
#[derive(Debug, Default, Clone)]
pub struct UpdateOptions {
    /// Fetch strategy; `None` falls back to the `update.fetch`
    /// configuration key, then to smart.
    pub fetch: Option<FetchStrategy>,
    /// Leave a checked-out branch in place when it descends from the
    /// new manifest-rev. Takes priority over `rebase`.
    pub keep_descendants: bool,
    /// Rebase a checked-out branch onto the new manifest-rev.
    pub rebase: bool,
    /// Projects (names or paths) to update; empty means all. Named
    /// projects must be defined in the manifest repository itself.
    pub projects: Vec<String>,
    /// Clone seed caches; entries missing here fall back to the
    /// `update.name-cache` / `update.path-cache` / `update.auto-cache`
    /// configuration keys.
    pub caches: Caches,
    /// Extra group-filter entries, applied after the configuration
    /// level's `manifest.group-filter`.
    pub group_filter_extras: Vec<String>,
    /// Record and log wall-clock statistics per pipeline step.
    pub stats: bool,
}

/// What an update run accomplished.
#[derive(Debug, Default)]
pub struct UpdateReport {
    /// Successfully updated projects, in update order.
    pub updated: Vec<String>,
}

/// One update run over a workspace.
pub struct Updater<'a> {
    topdir: &'a Path,
    config: &'a Config,
    git: &'a Git,
    opts: UpdateOptions,
    fetch: FetchStrategy,
    extras: Vec<String>,
    caches: Caches,
    attempted: HashSet<String>,
    succeeded: Vec<String>,
    failed: Vec<String>,
}

impl<'a> Updater<'a> {
    pub fn new(topdir: &'a Path, config: &'a Config, git: &'a Git, opts: UpdateOptions) -> Self {
        let fetch = opts.fetch.unwrap_or_else(|| fetch_from_config(config));
        let caches = Caches {
            name_cache: opts
                .caches
                .name_cache
                .clone()
                .or_else(|| config.get("update.name-cache").map(PathBuf::from)),
            path_cache: opts
                .caches
                .path_cache
                .clone()
                .or_else(|| config.get("update.path-cache").map(PathBuf::from)),
            auto_cache: opts
                .caches
                .auto_cache
                .clone()
                .or_else(|| config.get("update.auto-cache").map(PathBuf::from)),
        };
        let mut extras = config_group_filter(config);
        extras.extend(opts.group_filter_extras.iter().cloned());
        Updater {
            topdir,
            config,
            git,
            opts,
            fetch,
            extras,
            caches,
            attempted: HashSet::new(),
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Updates the selected projects, aggregating per-project failures.
    pub fn run(&mut self) -> Result<UpdateReport, UpdateError> {
        if self.opts.projects.is_empty() {
            self.update_all()
        } else {
            self.update_some()
        }
    }

    // Plain update: resolve with forced project imports so projects
    // that contribute manifests are updated before being read, then
    // update whatever remains.
    fn update_all(&mut self) -> Result<UpdateReport, UpdateError> {
        let topdir = self.topdir;
        let config = self.config;
        let manifest =
            Manifest::from_workspace_with(topdir, config, ImportMode::ForceProjects, Some(self))?;

        for project in manifest.projects.iter().skip(1) {
            if self.attempted.contains(&project.name) {
                continue;
            }
            if !manifest.is_active(project, &self.extras) {
                debug!(project = %project.name, "skipping inactive project");
                continue;
            }
            self.update_one(project);
        }
        self.finish()
    }

    // Update of explicitly named projects: they must be defined in the
    // manifest repository's own document.
    fn update_some(&mut self) -> Result<UpdateReport, UpdateError> {
        let ids = self.opts.projects.clone();
        let topdir = self.topdir;
        let config = self.config;

        let mr_only =
            Manifest::from_workspace_with(topdir, config, ImportMode::IgnoreProjects, None)?;
        let targets: Vec<Project> = match mr_only.get_projects(&ids) {
            Ok(projects) => projects.into_iter().cloned().collect(),
            Err(ManifestError::UnknownProjects { ids: unknown }) => {
                return Err(self.diagnose_unknown(&unknown));
            }
            Err(err) => return Err(err.into()),
        };

        for project in &targets {
            if project.is_manifest_project() {
                continue;
            }
            self.update_one(project);
        }
        self.finish()
    }

    // Named projects missing from the manifest repository's document
    // are either unknown outright or contributed by imports; figure out
    // which for a precise error.
    fn diagnose_unknown(&mut self, unknown: &[String]) -> UpdateError {
        let full = Manifest::from_workspace(
            self.topdir,
            self.config,
            self.git,
            ImportMode::Normal,
        );
        match full {
            Err(ManifestError::ImportFailed { .. }) => UpdateError::UnknownOrImported {
                ids: unknown.to_vec(),
            },
            Err(err) => err.into(),
            Ok(manifest) => match manifest.get_projects(unknown) {
                Err(err) => err.into(),
                Ok(_) => UpdateError::ImportedProjects { ids: unknown.to_vec() },
            },
        }
    }

    fn update_one(&mut self, project: &Project) {
        self.attempted.insert(project.name.clone());
        match self.update_project(project) {
            Ok(()) => self.succeeded.push(project.name.clone()),
            Err(err) => {
                error!(project = %project.name, "update failed: {err}");
                self.failed.push(project.name.clone());
            }
        }
    }

    fn finish(&mut self) -> Result<UpdateReport, UpdateError> {
        if self.failed.is_empty() {
            Ok(UpdateReport { updated: std::mem::take(&mut self.succeeded) })
        } else {
            Err(UpdateError::Projects { failed: std::mem::take(&mut self.failed) })
        }
    }

    // The per-project pipeline.
    fn update_project(&self, project: &Project) -> Result<(), UpdateError> {
        info!("updating {}:", project.name_and_path());
        let git = self.git;
        let mut stats = Stats::new(self.opts.stats);
        let Some(abspath) = project.abspath() else {
            return Err(UpdateError::NoProjectPath { name: project.name.clone() });
        };

        // 1. Make sure there is a repository to work with.
        let cloned = stats.time("check if cloned", || {
            Ok::<_, UpdateError>(project.is_cloned(git))
        })?;
        if !cloned {
            stats.time("init", || self.initialize(project, &abspath))?;
        }

        // 2. Point manifest-rev at the target, fetching if needed.
        let revision = project.revision.as_str();
        let skip_fetch = self.fetch == FetchStrategy::Smart
            && matches!(
                self.rev_type(&abspath, revision)?,
                RevType::Tag | RevType::Commit
            );
        if skip_fetch {
            debug!(project = %project.name, "skipping unnecessary fetch");
            stats.time("set manifest-rev", || {
                self.set_manifest_rev(&abspath, &format!("{revision}^{{commit}}"))
            })?;
        } else {
            stats.time("fetch and set manifest-rev", || self.fetch_rev(project, &abspath))?;
        }

        // 3. Clear the legacy scratch refs.
        stats.time("clean up refs/west/*", || self.clean_west_refs(&abspath))?;

        // 4. Make sure HEAD points at something; a fresh init leaves it
        //    on an unborn branch.
        let head_ok = stats.time("check HEAD is ok", || git.head_ok(&abspath))?;
        if !head_ok {
            stats.time("check out manifest-rev", || {
                git.checkout_detach(&abspath, QUAL_MANIFEST_REV)
            })?;
        }

        // 5. manifest-rev as a SHA.
        let sha = stats
            .time("get manifest-rev SHA", || git.rev_parse(&abspath, QUAL_MANIFEST_REV))
            .map_err(|err| {
                error!(
                    "no SHA for branch manifest-rev in {}; was the branch deleted?",
                    project.name_and_path()
                );
                UpdateError::from(err)
            })?;

        // 6. Reconcile the working tree with the new manifest-rev.
        let current_branch = git.rev_parse_abbrev_head(&abspath)?;
        if current_branch == "HEAD" {
            // Detached already; just move.
            stats.time("checkout new manifest-rev", || git.checkout_detach(&abspath, &sha))?;
            stats.report(&project.name);
            return Ok(());
        }

        let is_ancestor = stats.time("check if HEAD is ancestor of manifest-rev", || {
            git.is_ancestor(&abspath, &sha, &current_branch)
        })?;

        if self.opts.keep_descendants && is_ancestor {
            info!(
                "left descendant branch \"{current_branch}\" checked out; current status:"
            );
            let status = stats.time("get current status", || git.status(&abspath))?;
            info!("{status}");
        } else if self.opts.rebase {
            info!("rebasing {current_branch} onto manifest-rev {sha}");
            stats.time("rebase onto new manifest-rev", || {
                git.rebase(&abspath, QUAL_MANIFEST_REV)
            })?;
        } else {
            stats.time("checkout new manifest-rev", || git.checkout_detach(&abspath, &sha))?;
            post_checkout_help(project, &current_branch, &sha, is_ancestor);
        }
        stats.report(&project.name);
        Ok(())
    }

    fn initialize(&self, project: &Project, abspath: &Path) -> Result<(), UpdateError> {
        if let Some(seed) = self.caches.seed_for(self.git, project)? {
            info!("{}: cloning from cache {}", project.name, seed.display());
            self.git.clone(&seed, abspath)?;
            let remote = project.remote_name.as_str();
            if remote != "origin" {
                self.git.remote_rename(abspath, "origin", remote)?;
            }
            // The cache was only a seed; the remote must name the real
            // URL so later fetches bypass it.
            self.git.remote_set_url(abspath, remote, &project.url)?;
        } else {
            info!("{}: initializing", project.name);
            self.git.init(abspath)?;
            // A convenience for the user; fetches always use the URL.
            self.git.remote_add(abspath, &project.remote_name, &project.url)?;
        }
        Ok(())
    }

    fn fetch_rev(&self, project: &Project, abspath: &Path) -> Result<(), UpdateError> {
        let revision = project.revision.as_str();
        info!("{}: fetching, need revision {revision}", project.name);
        let (refspec, next_manifest_rev) = if maybe_sha(revision) {
            // Many hosts refuse to serve SHAs directly; fetch every
            // branch into the scratch namespace and hope the commit is
            // reachable from one of them.
            (format!("refs/heads/*:{QUAL_REFS_WEST}*"), revision.to_string())
        } else {
            // manifest-rev is set to FETCH_HEAD^{commit} rather than via
            // a <src>:<dst> refspec because annotated tags cannot be
            // peeled on the <src> side.
            (revision.to_string(), "FETCH_HEAD^{commit}".to_string())
        };
        self.git.fetch(
            abspath,
            &project.url,
            &[refspec.as_str()],
            project.clone_depth,
            true,
            true,
        )?;
        self.set_manifest_rev(abspath, &next_manifest_rev)
    }

    fn set_manifest_rev(&self, abspath: &Path, target: &str) -> Result<(), UpdateError> {
        self.git.update_ref(
            abspath,
            &format!("west update: moving to {target}"),
            QUAL_MANIFEST_REV,
            target,
        )?;
        Ok(())
    }

    fn clean_west_refs(&self, abspath: &Path) -> Result<(), UpdateError> {
        for reference in self.git.for_each_ref(abspath, &format!("{QUAL_REFS_WEST}**"))? {
            self.git.delete_ref(abspath, &reference)?;
        }
        Ok(())
    }

    // Refines a revision into the type that matters for smart fetches.
    // cat-file alone cannot tell branches from other commit-ishes, so
    // commits are disambiguated with rev-parse --symbolic-full-name.
    fn rev_type(&self, abspath: &Path, rev: &str) -> Result<RevType, UpdateError> {
        let Some(object_type) = self.git.cat_file_type(abspath, rev)? else {
            return Ok(RevType::Other);
        };
        let refined = match object_type.as_str() {
            "blob" => RevType::Blob,
            "tree" => RevType::Tree,
            "tag" => RevType::Tag,
            "commit" => match self.git.rev_parse_symbolic_full_name(abspath, rev)? {
                // Ambiguous refs fail to verify.
                None => RevType::Other,
                Some(name) if name.starts_with("refs/heads") => RevType::Branch,
                Some(name) if name.is_empty() => RevType::Commit,
                Some(_) => RevType::Other,
            },
            _ => RevType::Other,
        };
        Ok(refined)
    }
}

impl ManifestImporter for Updater<'_> {
    // FORCE_PROJECTS callback: update the project this import reads
    // from (once per run), then serve the file from its manifest-rev. A
    // missing file is reported and replaced with an empty manifest so
    // the rest of the update can proceed.
    fn import_from(
        &mut self,
        project: &Project,
        file: &str,
    ) -> Result<ImportedContent, ManifestError> {
        if !project.is_manifest_project() && !self.attempted.contains(&project.name) {
            self.update_one(project);
        }
        match read_project_manifest(self.git, project, file) {
            Ok(content) => Ok(content),
            Err(ManifestError::ImportFailed { project, file, reason }) => {
                warn!(
                    "can't import {file} from project {project}: {reason}\n\
                     expected to find {file} at revision {QUAL_MANIFEST_REV}\n\
                     hint: set the project's \"revision:\" to a ref containing the file \
                     at its URL, or remove the \"import:\""
                );
                Ok(ImportedContent::File("manifest:\n  projects: []\n".to_string()))
            }
            Err(other) => Err(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RevType {
    Branch,
    Tag,
    Tree,
    Blob,
    Commit,
    Other,
}

fn fetch_from_config(config: &Config) -> FetchStrategy {
    match config.get("update.fetch") {
        Some(value) => value.parse().unwrap_or_else(|_| {
            warn!("ignoring invalid config update.fetch={value}; choices: always, smart");
            FetchStrategy::Smart
        }),
        None => FetchStrategy::Smart,
    }
}

fn config_group_filter(config: &Config) -> Vec<String> {
    match config.get("manifest.group-filter") {
        Some(value) => groups::parse_filter_value(value).unwrap_or_else(|err| {
            warn!("ignoring invalid config manifest.group-filter: {err}");
            Vec::new()
        }),
        None => Vec::new(),
    }
}

/// True iff `rev` could be a commit SHA (hex, at most 40 characters).
fn maybe_sha(rev: &str) -> bool {
    !rev.is_empty() && rev.len() <= 40 && rev.bytes().all(|b| b.is_ascii_hexdigit())
}

fn post_checkout_help(project: &Project, branch: &str, sha: &str, is_ancestor: bool) {
    // The project may have just left a branch behind; say how to get
    // back to it.
    let path = project.path.as_deref().unwrap_or(&project.name);
    if is_ancestor {
        warn!(
            "left behind {} branch \"{branch}\"; to switch back to it (fast forward): \
             git -C {path} checkout {branch}",
            project.name
        );
        debug!("(to do this automatically in the future, use keep-descendants mode)");
    } else {
        warn!(
            "left behind {} branch \"{branch}\"; to rebase onto the new HEAD: \
             git -C {path} rebase {sha} {branch}",
            project.name
        );
        debug!("(to do this automatically in the future, use rebase mode)");
    }
}
