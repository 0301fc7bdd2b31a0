//! The polymorphic `import:` directive.
//!
//! An import value is one of five shapes: a boolean, one filename, a
//! list of filenames, a directory name, or a mapping carrying a file
//! plus allow/block filters and a path prefix. Directories are not
//! distinguishable syntactically; they reveal themselves when the named
//! path turns out to be a tree.

use std::path::{Path, PathBuf};

use glob::Pattern;
use serde_yaml::Value;

use crate::DEFAULT_MANIFEST_FILE;

/// A parsed `import:` value.
#[derive(Debug, Clone, PartialEq)]
pub enum Import {
    Bool(bool),
    /// A file (or directory) name.
    Path(String),
    /// Several files/directories, imported in order.
    Paths(Vec<String>),
    Map(ImportMap),
}

/// The mapping form of `import:`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImportMap {
    /// File or directory to import; defaults to `west.yml`.
    pub file: String,
    pub name_allowlist: Vec<String>,
    pub name_blocklist: Vec<String>,
    pub path_allowlist: Vec<String>,
    pub path_blocklist: Vec<String>,
    /// Prepended to the path of every project this import emits.
    pub path_prefix: String,
}

impl Import {
    /// Parses a raw YAML `import:` value; errors are appended to
    /// `reasons`.
    pub(crate) fn parse(value: &Value, reasons: &mut Vec<String>) -> Option<Import> {
        match value {
            Value::Bool(b) => Some(Import::Bool(*b)),
            Value::String(s) => Some(Import::Path(s.clone())),
            Value::Sequence(seq) => {
                let mut files = Vec::new();
                for item in seq {
                    match item {
                        Value::String(s) => files.push(s.clone()),
                        other => {
                            reasons.push(format!(
                                "import list contains a non-string entry: {}",
                                render(other)
                            ));
                            return None;
                        }
                    }
                }
                Some(Import::Paths(files))
            }
            Value::Mapping(mapping) => {
                let mut map = ImportMap {
                    file: DEFAULT_MANIFEST_FILE.to_string(),
                    ..ImportMap::default()
                };
                for (key, val) in mapping {
                    let Some(key) = key.as_str() else {
                        reasons.push("import map has a non-string key".to_string());
                        return None;
                    };
                    match key {
                        "file" => match val.as_str() {
                            Some(s) => map.file = s.to_string(),
                            None => {
                                reasons.push("import map \"file\" is not a string".to_string());
                                return None;
                            }
                        },
                        // The *-whitelist/*-blacklist spellings are
                        // legacy synonyms kept for old manifests.
                        "name-allowlist" | "name-whitelist" => {
                            map.name_allowlist = patterns(key, val, reasons)?
                        }
                        "name-blocklist" | "name-blacklist" => {
                            map.name_blocklist = patterns(key, val, reasons)?
                        }
                        "path-allowlist" | "path-whitelist" => {
                            map.path_allowlist = patterns(key, val, reasons)?
                        }
                        "path-blocklist" | "path-blacklist" => {
                            map.path_blocklist = patterns(key, val, reasons)?
                        }
                        "path-prefix" => match val.as_str() {
                            Some(s) => map.path_prefix = s.to_string(),
                            None => {
                                reasons
                                    .push("import map \"path-prefix\" is not a string".to_string());
                                return None;
                            }
                        },
                        other => {
                            reasons.push(format!("import map has unknown key \"{other}\""));
                            return None;
                        }
                    }
                }
                Some(Import::Map(map))
            }
            other => {
                reasons.push(format!("invalid import value: {}", render(other)));
                None
            }
        }
    }
}

// Allow/block lists accept a single pattern or a list of patterns.
fn patterns(key: &str, value: &Value, reasons: &mut Vec<String>) -> Option<Vec<String>> {
    match value {
        Value::String(s) => Some(vec![s.clone()]),
        Value::Sequence(seq) => {
            let mut out = Vec::new();
            for item in seq {
                match item.as_str() {
                    Some(s) => out.push(s.to_string()),
                    None => {
                        reasons.push(format!("import map \"{key}\" contains a non-string entry"));
                        return None;
                    }
                }
            }
            Some(out)
        }
        other => {
            reasons.push(format!("import map \"{key}\" is not a string or list: {}", render(other)));
            None
        }
    }
}

fn render(value: &Value) -> String {
    serde_yaml::to_string(value).unwrap_or_default().trim().to_string()
}

/// One import frame's filtering and prefixing effect, compiled for
/// evaluation against every project the frame emits.
#[derive(Debug, Default, Clone)]
pub(crate) struct Frame {
    name_allow: Vec<Pattern>,
    name_block: Vec<Pattern>,
    path_allow: Vec<Pattern>,
    path_block: Vec<Pattern>,
    pub(crate) prefix: PathBuf,
}

impl Frame {
    pub(crate) fn from_map(map: &ImportMap, reasons: &mut Vec<String>) -> Option<Frame> {
        Some(Frame {
            name_allow: compile(&map.name_allowlist, reasons)?,
            name_block: compile(&map.name_blocklist, reasons)?,
            path_allow: compile(&map.path_allowlist, reasons)?,
            path_block: compile(&map.path_blocklist, reasons)?,
            prefix: PathBuf::from(&map.path_prefix),
        })
    }

    /// Whether a project named `name` at workspace-relative `path`
    /// passes this frame.
    ///
    /// A block match always excludes. With allowlists present the
    /// project must match one; when both name- and path-allowlists
    /// exist, the name-allowlist alone decides.
    pub(crate) fn allows(&self, name: &str, path: &str) -> bool {
        if matches_any(&self.name_block, name) || matches_any(&self.path_block, path) {
            return false;
        }
        match (!self.name_allow.is_empty(), !self.path_allow.is_empty()) {
            (false, false) => true,
            (true, false) => matches_any(&self.name_allow, name),
            (false, true) => matches_any(&self.path_allow, path),
            (true, true) => matches_any(&self.name_allow, name),
        }
    }
}

fn compile(globs: &[String], reasons: &mut Vec<String>) -> Option<Vec<Pattern>> {
    let mut out = Vec::new();
    for g in globs {
        match Pattern::new(g) {
            Ok(p) => out.push(p),
            Err(err) => {
                reasons.push(format!("invalid glob pattern \"{g}\": {err}"));
                return None;
            }
        }
    }
    Some(out)
}

fn matches_any(patterns: &[Pattern], text: &str) -> bool {
    patterns.iter().any(|p| p.matches(text))
}

/// Renders a workspace-relative path with forward slashes for filter
/// matching and collision checks.
pub(crate) fn posix_rel(path: &Path) -> String {
    west_core::paths::to_posix(path)
}
