//! Shared fixtures: scratch git repositories and workspaces.
//!
//! Everything runs against a real local `git` binary; no network is
//! involved anywhere.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use west_core::config::{Config, ConfigLocations, ConfigScope};

/// Makes engine logging visible under `--nocapture`; safe to call from
/// every test.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("west_update=debug,west_manifest=debug,west_core=debug")
        }))
        .with_test_writer()
        .try_init();
}

/// Runs git for fixture setup, asserting success and returning stdout.
pub fn git_raw(cwd: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args([
            "-c",
            "user.name=test",
            "-c",
            "user.email=test@example.com",
            "-c",
            "protocol.file.allow=always",
        ])
        .args(args)
        .current_dir(cwd)
        .output()
        .expect("git must be installed for these tests");
    assert!(
        output.status.success(),
        "git {:?} in {} failed: {}",
        args,
        cwd.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Creates a repository with one initial commit on `master`.
pub fn create_repo(path: &Path) {
    fs::create_dir_all(path).unwrap();
    git_raw(path, &["init", "-q", "-b", "master"]);
    fs::write(path.join("README"), "fixture repository\n").unwrap();
    git_raw(path, &["add", "."]);
    git_raw(path, &["commit", "-q", "-m", "initial commit"]);
}

/// Writes `files` and commits them.
pub fn add_commit(repo: &Path, message: &str, files: &[(&str, &str)]) {
    for (name, contents) in files {
        let target = repo.join(name);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(target, contents).unwrap();
    }
    git_raw(repo, &["add", "."]);
    git_raw(repo, &["commit", "-q", "--allow-empty", "-m", message]);
}

pub fn rev_parse(repo: &Path, rev: &str) -> String {
    git_raw(repo, &["rev-parse", rev])
}

pub fn current_branch(repo: &Path) -> String {
    git_raw(repo, &["rev-parse", "--abbrev-ref", "HEAD"])
}

pub fn remote_url(repo: &Path, name: &str) -> String {
    git_raw(repo, &["remote", "get-url", name])
}

/// A scratch workspace with its manifest repository and isolated
/// configuration.
pub struct TestWorkspace {
    pub topdir: PathBuf,
    config_locations: ConfigLocations,
}

impl TestWorkspace {
    /// Creates `<root>/workspace` with a `.west/` marker, a manifest
    /// repository at `mp/`, and local configuration pointing at it.
    /// Configuration is fully isolated from the host system.
    pub fn create(root: &Path, manifest: &str) -> Self {
        init_logging();
        let topdir = root.join("workspace");
        fs::create_dir_all(topdir.join(".west")).unwrap();
        create_repo(&topdir.join("mp"));

        let locations = ConfigLocations {
            system: Some(root.join("no-system-config")),
            global: Some(root.join("no-global-config")),
            local: Some(topdir.join(".west").join("config")),
        };
        let mut config = Config::with_locations(locations.clone()).unwrap();
        config.set("manifest.path", "mp", ConfigScope::Local).unwrap();
        config.set("manifest.file", "west.yml", ConfigScope::Local).unwrap();

        let workspace = TestWorkspace { topdir, config_locations: locations };
        workspace.set_manifest(manifest);
        workspace
    }

    /// Rewrites the manifest file (uncommitted; resolution reads the
    /// working tree).
    pub fn set_manifest(&self, manifest: &str) {
        fs::write(self.topdir.join("mp").join("west.yml"), manifest).unwrap();
    }

    /// A fresh configuration snapshot for this workspace.
    pub fn config(&self) -> Config {
        Config::with_locations(self.config_locations.clone()).unwrap()
    }

    pub fn project_dir(&self, path: &str) -> PathBuf {
        self.topdir.join(path)
    }
}
