//! Driver for the external `git` binary.
//!
//! This is a capability surface, not a git client: every repository
//! operation shells out to `git` with arguments passed positionally (no
//! shell involved), captures output, and reports failures with the exit
//! code so callers can propagate it. The one exception is repository
//! *detection*, which asks libgit2 whether a directory opens as a
//! repository instead of spawning a process for it.

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::Path;
use std::process::Command;

use tracing::debug;

/// Builds an `&[&OsStr]`-compatible argument vector from mixed string
/// and path operands.
macro_rules! args {
    ($($arg:expr),* $(,)?) => {
        [$(AsRef::<OsStr>::as_ref($arg)),*]
    };
}

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git is not installed or could not be run: {source}")]
    Spawn { source: io::Error },

    #[error("`git {command}` in {cwd} exited with code {code}: {stderr}")]
    Failed {
        command: String,
        cwd: String,
        code: i32,
        stderr: String,
    },
}

impl GitError {
    /// The subprocess exit code, for propagation to the caller's own
    /// exit status. `-1` means the process died without one.
    pub fn returncode(&self) -> i32 {
        match self {
            GitError::Spawn { .. } => -1,
            GitError::Failed { code, .. } => *code,
        }
    }
}

/// Captured result of one git invocation.
#[derive(Debug)]
pub struct GitOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub code: i32,
    pub success: bool,
}

impl GitOutput {
    /// Stdout as trimmed UTF-8.
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }
}

/// Handle on the external git binary.
#[derive(Debug, Clone)]
pub struct Git {
    program: OsString,
}

impl Default for Git {
    fn default() -> Self {
        Git::new()
    }
}

impl Git {
    pub fn new() -> Self {
        Git { program: OsString::from("git") }
    }

    /// Uses a specific binary instead of `git` from `PATH`.
    pub fn with_program(program: impl Into<OsString>) -> Self {
        Git { program: program.into() }
    }

    /// Runs git with `args`, capturing output. A non-zero exit is not an
    /// error here; check [`GitOutput::success`].
    pub fn run(&self, cwd: Option<&Path>, args: &[&OsStr]) -> Result<GitOutput, GitError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        debug!(
            command = %render(args),
            cwd = %cwd.map(|c| c.display().to_string()).unwrap_or_else(|| ".".to_string()),
            "running git"
        );
        let output = cmd.output().map_err(|source| GitError::Spawn { source })?;
        Ok(GitOutput {
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            code: output.status.code().unwrap_or(-1),
            success: output.status.success(),
        })
    }

    /// Like [`Git::run`], but a non-zero exit becomes [`GitError::Failed`].
    pub fn run_checked(&self, cwd: Option<&Path>, args: &[&OsStr]) -> Result<GitOutput, GitError> {
        let output = self.run(cwd, args)?;
        if output.success {
            Ok(output)
        } else {
            Err(GitError::Failed {
                command: render(args),
                cwd: cwd
                    .map(|c| c.display().to_string())
                    .unwrap_or_else(|| ".".to_string()),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    /// True if `path` opens as a git repository (working tree or bare).
    pub fn is_repo(&self, path: &Path) -> bool {
        git2::Repository::open(path).is_ok()
    }

    pub fn init(&self, path: &Path) -> Result<(), GitError> {
        self.run_checked(None, &args!["init", path])?;
        Ok(())
    }

    pub fn init_bare(&self, path: &Path) -> Result<(), GitError> {
        self.run_checked(None, &args!["init", "--bare", path])?;
        Ok(())
    }

    pub fn clone(&self, src: impl AsRef<OsStr>, dest: &Path) -> Result<(), GitError> {
        self.run_checked(None, &args!["clone", &src, dest])?;
        Ok(())
    }

    /// Clones `src` as a bare mirror, for cache seeding.
    pub fn clone_mirror(&self, src: impl AsRef<OsStr>, dest: &Path) -> Result<(), GitError> {
        self.run_checked(None, &args!["clone", "--mirror", &src, dest])?;
        Ok(())
    }

    pub fn remote_add(&self, cwd: &Path, name: &str, url: &str) -> Result<(), GitError> {
        self.run_checked(Some(cwd), &args!["remote", "add", "--", name, url])?;
        Ok(())
    }

    pub fn remote_rename(&self, cwd: &Path, from: &str, to: &str) -> Result<(), GitError> {
        self.run_checked(Some(cwd), &args!["remote", "rename", from, to])?;
        Ok(())
    }

    pub fn remote_set_url(&self, cwd: &Path, name: &str, url: &str) -> Result<(), GitError> {
        self.run_checked(Some(cwd), &args!["remote", "set-url", name, url])?;
        Ok(())
    }

    /// Refreshes every remote-tracking ref, pruning stale ones. Used to
    /// keep cache mirrors current.
    pub fn remote_update(&self, cwd: &Path) -> Result<(), GitError> {
        self.run_checked(Some(cwd), &args!["remote", "update", "--prune"])?;
        Ok(())
    }

    /// Fetches `refspecs` from `url` directly (never through a named
    /// remote).
    pub fn fetch(
        &self,
        cwd: &Path,
        url: &str,
        refspecs: &[&str],
        depth: Option<u32>,
        tags: bool,
        force: bool,
    ) -> Result<(), GitError> {
        let mut argv: Vec<OsString> = vec![OsString::from("fetch")];
        if force {
            argv.push("-f".into());
        }
        if tags {
            argv.push("--tags".into());
        }
        if let Some(depth) = depth {
            argv.push("--depth".into());
            argv.push(depth.to_string().into());
        }
        argv.push("--".into());
        argv.push(url.into());
        for refspec in refspecs {
            argv.push(refspec.into());
        }
        let refs: Vec<&OsStr> = argv.iter().map(OsString::as_os_str).collect();
        self.run_checked(Some(cwd), &refs)?;
        Ok(())
    }

    /// True if `reference` exists in the repository.
    pub fn show_ref(&self, cwd: &Path, reference: &str) -> Result<bool, GitError> {
        let output = self.run(Some(cwd), &args!["show-ref", "--quiet", "--verify", reference])?;
        Ok(output.success)
    }

    /// True if HEAD points at something real.
    ///
    /// `show-ref --verify HEAD` misreports on some git versions, so this
    /// asks for HEAD plus an impossible reference (`/`): exit 0 then
    /// means exactly "HEAD is present".
    pub fn head_ok(&self, cwd: &Path) -> Result<bool, GitError> {
        let output = self.run(Some(cwd), &args!["show-ref", "--quiet", "--head", "/"])?;
        Ok(output.success)
    }

    pub fn rev_parse(&self, cwd: &Path, rev: &str) -> Result<String, GitError> {
        Ok(self.run_checked(Some(cwd), &args!["rev-parse", rev])?.stdout_str())
    }

    /// The checked-out branch name, or the literal string `HEAD` when
    /// detached.
    pub fn rev_parse_abbrev_head(&self, cwd: &Path) -> Result<String, GitError> {
        Ok(self
            .run_checked(Some(cwd), &args!["rev-parse", "--abbrev-ref", "HEAD"])?
            .stdout_str())
    }

    /// The object type of `rev` (`blob`, `tree`, `tag`, `commit`), or
    /// `None` if it does not resolve.
    pub fn cat_file_type(&self, cwd: &Path, rev: &str) -> Result<Option<String>, GitError> {
        let output = self.run(Some(cwd), &args!["cat-file", "-t", rev])?;
        if output.success {
            Ok(Some(output.stdout_str()))
        } else {
            Ok(None)
        }
    }

    /// The full symbolic name of `rev` (e.g. `refs/heads/main`).
    ///
    /// `Ok(Some(""))` means `rev` resolved but is not symbolic (a SHA);
    /// `Ok(None)` means git could not verify it (e.g. an ambiguous ref).
    pub fn rev_parse_symbolic_full_name(
        &self,
        cwd: &Path,
        rev: &str,
    ) -> Result<Option<String>, GitError> {
        let output = self.run(
            Some(cwd),
            &args!["rev-parse", "--verify", "--symbolic-full-name", rev],
        )?;
        if output.success {
            Ok(Some(output.stdout_str()))
        } else {
            Ok(None)
        }
    }

    pub fn update_ref(
        &self,
        cwd: &Path,
        message: &str,
        reference: &str,
        target: &str,
    ) -> Result<(), GitError> {
        self.run_checked(Some(cwd), &args!["update-ref", "-m", message, reference, target])?;
        Ok(())
    }

    pub fn delete_ref(&self, cwd: &Path, reference: &str) -> Result<(), GitError> {
        self.run_checked(Some(cwd), &args!["update-ref", "-d", reference])?;
        Ok(())
    }

    /// All refs matching `pattern`, one full refname per entry.
    pub fn for_each_ref(&self, cwd: &Path, pattern: &str) -> Result<Vec<String>, GitError> {
        let output = self.run_checked(
            Some(cwd),
            &args!["for-each-ref", "--format=%(refname)", "--", pattern],
        )?;
        Ok(output
            .stdout_str()
            .lines()
            .map(str::to_string)
            .filter(|line| !line.is_empty())
            .collect())
    }

    pub fn checkout_detach(&self, cwd: &Path, rev: &str) -> Result<(), GitError> {
        self.run_checked(Some(cwd), &args!["checkout", "--detach", rev])?;
        Ok(())
    }

    pub fn rebase(&self, cwd: &Path, onto: &str) -> Result<(), GitError> {
        self.run_checked(Some(cwd), &args!["rebase", onto])?;
        Ok(())
    }

    /// True if `ancestor` is an ancestor of `descendant`.
    pub fn is_ancestor(
        &self,
        cwd: &Path,
        ancestor: &str,
        descendant: &str,
    ) -> Result<bool, GitError> {
        let output = self.run(
            Some(cwd),
            &args!["merge-base", "--is-ancestor", ancestor, descendant],
        )?;
        match output.code {
            0 => Ok(true),
            1 => Ok(false),
            code => Err(GitError::Failed {
                command: format!("merge-base --is-ancestor {ancestor} {descendant}"),
                cwd: cwd.display().to_string(),
                code,
                stderr: output.stderr.trim().to_string(),
            }),
        }
    }

    /// Reads the blob at `rev:path`.
    pub fn read_blob_at(&self, cwd: &Path, rev: &str, path: &str) -> Result<Vec<u8>, GitError> {
        let spec = format!("{rev}:{path}");
        Ok(self.run_checked(Some(cwd), &args!["show", &spec])?.stdout)
    }

    /// Child entry names of the tree at `rev:path`, sorted.
    pub fn list_tree_at(&self, cwd: &Path, rev: &str, path: &str) -> Result<Vec<String>, GitError> {
        let treeish = if path.is_empty() {
            rev.to_string()
        } else {
            format!("{rev}:{path}")
        };
        let output = self.run_checked(Some(cwd), &args!["ls-tree", "--name-only", &treeish])?;
        let mut names: Vec<String> = output
            .stdout_str()
            .lines()
            .map(str::to_string)
            .filter(|line| !line.is_empty())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Captures `git status` output for display.
    pub fn status(&self, cwd: &Path) -> Result<String, GitError> {
        Ok(String::from_utf8_lossy(&self.run_checked(Some(cwd), &args!["status"])?.stdout)
            .into_owned())
    }
}

fn render(args: &[&OsStr]) -> String {
    args.iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process::Command;

    fn git() -> Git {
        Git::new()
    }

    // Fixture helper: raw git, outside the driver under test.
    fn raw(cwd: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output()
            .expect("git must be installed for these tests");
        assert!(status.status.success(), "git {args:?} failed");
    }

    fn commit_file(repo: &Path, name: &str, contents: &str, message: &str) {
        fs::write(repo.join(name), contents).unwrap();
        raw(repo, &["add", "."]);
        raw(
            repo,
            &[
                "-c", "user.name=test", "-c", "user.email=test@example.com",
                "commit", "-m", message,
            ],
        );
    }

    fn init_repo(path: &Path) {
        fs::create_dir_all(path).unwrap();
        raw(path, &["init", "-q", "-b", "master"]);
        commit_file(path, "README", "hello\n", "initial");
    }

    #[test]
    fn init_and_detection() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path().join("repo");
        assert!(!git().is_repo(&repo));
        git().init(&repo).unwrap();
        assert!(git().is_repo(&repo));
    }

    #[test]
    fn rev_parse_and_refs() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path().join("repo");
        init_repo(&repo);

        let sha = git().rev_parse(&repo, "HEAD").unwrap();
        assert_eq!(sha.len(), 40);

        assert!(git().show_ref(&repo, "refs/heads/master").unwrap());
        assert!(!git().show_ref(&repo, "refs/heads/no-such-branch").unwrap());

        git().update_ref(&repo, "test", "refs/west/scratch", &sha).unwrap();
        assert_eq!(
            git().for_each_ref(&repo, "refs/west/**").unwrap(),
            vec!["refs/west/scratch".to_string()]
        );
        git().delete_ref(&repo, "refs/west/scratch").unwrap();
        assert!(git().for_each_ref(&repo, "refs/west/**").unwrap().is_empty());
    }

    #[test]
    fn object_types_and_symbolic_names() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path().join("repo");
        init_repo(&repo);
        raw(&repo, &["tag", "light"]);
        raw(
            &repo,
            &[
                "-c", "user.name=test", "-c", "user.email=test@example.com",
                "tag", "-a", "annotated", "-m", "annotated tag",
            ],
        );

        let sha = git().rev_parse(&repo, "HEAD").unwrap();
        assert_eq!(git().cat_file_type(&repo, &sha).unwrap().as_deref(), Some("commit"));
        assert_eq!(git().cat_file_type(&repo, "annotated").unwrap().as_deref(), Some("tag"));
        assert_eq!(git().cat_file_type(&repo, "nope").unwrap(), None);

        assert_eq!(
            git().rev_parse_symbolic_full_name(&repo, "master").unwrap().as_deref(),
            Some("refs/heads/master")
        );
        assert_eq!(
            git().rev_parse_symbolic_full_name(&repo, &sha).unwrap().as_deref(),
            Some("")
        );
    }

    #[test]
    fn ancestor_checks() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path().join("repo");
        init_repo(&repo);
        let first = git().rev_parse(&repo, "HEAD").unwrap();
        commit_file(&repo, "second", "x\n", "second");
        let second = git().rev_parse(&repo, "HEAD").unwrap();

        assert!(git().is_ancestor(&repo, &first, &second).unwrap());
        assert!(!git().is_ancestor(&repo, &second, &first).unwrap());
    }

    #[test]
    fn blob_and_tree_reads() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path().join("repo");
        init_repo(&repo);
        fs::create_dir_all(repo.join("d")).unwrap();
        fs::write(repo.join("d/b.yml"), "b\n").unwrap();
        fs::write(repo.join("d/a.yml"), "a\n").unwrap();
        commit_file(&repo, "d/readme.txt", "ignored\n", "add directory");

        // The files come from the commit, not the working tree.
        fs::remove_dir_all(repo.join("d")).unwrap();

        let blob = git().read_blob_at(&repo, "HEAD", "d/a.yml").unwrap();
        assert_eq!(blob, b"a\n");
        assert_eq!(
            git().list_tree_at(&repo, "HEAD", "d").unwrap(),
            vec!["a.yml".to_string(), "b.yml".to_string(), "readme.txt".to_string()]
        );
        assert!(git().read_blob_at(&repo, "HEAD", "d/missing.yml").is_err());
    }

    #[test]
    fn head_and_detach() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path().join("repo");
        git().init(&repo).unwrap();
        // Fresh repository: HEAD points at an unborn branch.
        assert!(!git().head_ok(&repo).unwrap());

        commit_file(&repo, "f", "1\n", "initial");
        assert!(git().head_ok(&repo).unwrap());
        assert_ne!(git().rev_parse_abbrev_head(&repo).unwrap(), "HEAD");

        let sha = git().rev_parse(&repo, "HEAD").unwrap();
        git().checkout_detach(&repo, &sha).unwrap();
        assert_eq!(git().rev_parse_abbrev_head(&repo).unwrap(), "HEAD");
    }

    #[test]
    fn failed_commands_carry_exit_codes() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path().join("repo");
        init_repo(&repo);
        let err = git().rev_parse(&repo, "no-such-rev").unwrap_err();
        assert!(err.returncode() != 0);
    }
}
