//! Path canonicalization helpers.
//!
//! Project paths are compared in canonical form: absolute, with `.` and
//! `..` components folded away, and case-normalized on platforms with
//! case-insensitive filesystems. None of these helpers require the path
//! to exist.

use std::path::{Component, Path, PathBuf};

/// Returns a canonical version of `path`: absolute, component-normalized,
/// and case-normalized on Windows.
pub fn canon_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };
    normcase(&normalize(&absolute))
}

/// Folds `.` and `..` components without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // Never pop past a root or drive prefix.
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(windows)]
fn normcase(path: &Path) -> PathBuf {
    PathBuf::from(path.to_string_lossy().to_lowercase().replace('/', "\\"))
}

#[cfg(not(windows))]
fn normcase(path: &Path) -> PathBuf {
    path.to_path_buf()
}

/// Returns true if `path` is not inside `directory`.
///
/// Both paths are canonicalized first; equality counts as *inside*.
pub fn escapes_directory(path: &Path, directory: &Path) -> bool {
    let p = canon_path(path);
    let d = canon_path(directory);
    !p.starts_with(&d)
}

/// Renders `path` with forward slashes regardless of platform.
pub fn to_posix(path: &Path) -> String {
    let s = path.to_string_lossy();
    if cfg!(windows) {
        s.replace('\\', "/")
    } else {
        s.into_owned()
    }
}
