//! Raw manifest document parsing and validation.
//!
//! The manifest schema is fixed but polymorphic in places (`import:`
//! spans five shapes, several scalars may be YAML numbers), so the
//! document is walked as a `serde_yaml::Value` and validated by hand.
//! Every problem found is collected into one `Malformed` error, except
//! the schema-version gate, which fires before anything else.

use std::path::Path;

use serde_yaml::Value;
use tracing::warn;

use crate::error::ManifestError;
use crate::groups::{is_filter_item, is_group};
use crate::import::Import;
use crate::project::{remote_url, Remote};
use crate::{DEFAULT_REVISION, MANIFEST_PROJECT_NAME, SCHEMA_VERSION};

/// Schema versions this implementation knows about.
pub const VALID_SCHEMA_VERSIONS: &[&str] =
    &["0.6.99", "0.7", "0.8", "0.9", "0.10", "0.12", "0.13", "1.0"];

const EARLIEST_VERSION: (u32, u32, u32) = (0, 6, 99);
const MAX_VERSION: (u32, u32, u32) = (1, 0, 0);
const LEGACY_FILTER_VERSION: (u32, u32, u32) = (0, 9, 0);

/// One validated manifest document, before import resolution.
#[derive(Debug, Default)]
pub(crate) struct RawDocument {
    pub version: Option<String>,
    pub legacy_group_filter: bool,
    pub group_filter: Vec<String>,
    pub projects: Vec<RawProject>,
    pub self_path: Option<String>,
    pub self_west_commands: Vec<String>,
    pub self_import: Option<Import>,
}

/// One project entry with defaults applied and its URL resolved.
#[derive(Debug, Clone)]
pub(crate) struct RawProject {
    pub name: String,
    pub url: String,
    pub revision: String,
    pub path: String,
    pub remote_name: Option<String>,
    pub clone_depth: Option<u32>,
    pub west_commands: Vec<String>,
    pub import: Option<Import>,
    pub groups: Vec<String>,
    pub userdata: Option<Value>,
    pub submodules: Option<Value>,
}

/// Parses and validates one document. `source` is only used in error
/// messages.
pub(crate) fn parse_document(
    data: &str,
    source: Option<&Path>,
) -> Result<RawDocument, ManifestError> {
    let root: Value = serde_yaml::from_str(data)
        .map_err(|err| ManifestError::malformed(format!("invalid YAML: {err}")))?;

    let Value::Mapping(root) = root else {
        return Err(ManifestError::malformed("manifest data is not a mapping"));
    };

    let mut manifest_value = None;
    let mut reasons: Vec<String> = Vec::new();
    for (key, value) in &root {
        match key.as_str() {
            Some("manifest") => manifest_value = Some(value),
            Some("west") => {
                // Ancient manifests carried a "west" section; it has
                // been meaningless for a long time.
                warn!("ignoring deprecated top-level \"west\" section");
            }
            Some(other) => reasons.push(format!("unknown top-level key \"{other}\"")),
            None => reasons.push("non-string top-level key".to_string()),
        }
    }

    let manifest = match manifest_value {
        Some(Value::Mapping(m)) => m.clone(),
        Some(Value::Null) => serde_yaml::Mapping::new(),
        Some(other) => {
            return Err(ManifestError::malformed(format!(
                "\"manifest\" is not a mapping: {}",
                render(other)
            )));
        }
        None => return Err(ManifestError::malformed("missing top-level \"manifest\" key")),
    };

    // The version gate comes before every other diagnostic: a manifest
    // for a newer west must fail with the version error even if it uses
    // keys this implementation has never heard of.
    let version_value = manifest
        .iter()
        .find_map(|(k, v)| (k.as_str() == Some("version")).then_some(v));
    let version = check_version(version_value, source)?;
    let legacy_group_filter = version
        .as_ref()
        .is_some_and(|(_, tuple)| *tuple == LEGACY_FILTER_VERSION);

    let mut doc = RawDocument {
        version: version.map(|(s, _)| s),
        legacy_group_filter,
        ..RawDocument::default()
    };

    let mut defaults_remote: Option<String> = None;
    let mut defaults_revision: Option<String> = None;
    let mut remotes: Vec<Remote> = Vec::new();
    let mut projects_value: Option<&Value> = None;
    let mut self_value: Option<&Value> = None;

    for (key, value) in &manifest {
        match key.as_str() {
            Some("version") => {}
            Some("defaults") => {
                parse_defaults(value, &mut defaults_remote, &mut defaults_revision, &mut reasons)
            }
            Some("remotes") => remotes = parse_remotes(value, &mut reasons),
            Some("projects") => projects_value = Some(value),
            Some("self") => self_value = Some(value),
            Some("group-filter") => doc.group_filter = parse_group_filter(value, &mut reasons),
            Some(other) => reasons.push(format!("unknown manifest key \"{other}\"")),
            None => reasons.push("non-string manifest key".to_string()),
        }
    }

    if let Some(default_remote) = &defaults_remote {
        if !remotes.iter().any(|r| &r.name == default_remote) {
            reasons.push(format!("default remote \"{default_remote}\" is not defined"));
        }
    }

    if let Some(value) = projects_value {
        parse_projects(
            value,
            &remotes,
            defaults_remote.as_deref(),
            defaults_revision.as_deref(),
            &mut doc,
            &mut reasons,
        );
    }

    if let Some(value) = self_value {
        parse_self(value, &mut doc, &mut reasons);
    }

    if reasons.is_empty() {
        Ok(doc)
    } else {
        Err(ManifestError::Malformed { reasons })
    }
}

fn check_version(
    value: Option<&Value>,
    source: Option<&Path>,
) -> Result<Option<(String, (u32, u32, u32))>, ManifestError> {
    let Some(value) = value else { return Ok(None) };
    let text = scalar_to_string(value).ok_or_else(|| {
        ManifestError::malformed(format!("invalid manifest version: {}", render(value)))
    })?;

    let tuple = parse_version(&text).ok_or_else(|| {
        ManifestError::malformed(format!("invalid manifest version \"{text}\""))
    })?;

    if tuple > MAX_VERSION {
        return Err(ManifestError::Version {
            version: text,
            max: SCHEMA_VERSION.to_string(),
            file: source.map(Path::to_path_buf),
        });
    }
    if tuple < EARLIEST_VERSION {
        return Err(ManifestError::malformed(format!(
            "invalid manifest version \"{text}\": versions below 0.6.99 predate this feature"
        )));
    }
    if !VALID_SCHEMA_VERSIONS.iter().any(|v| parse_version(v) == Some(tuple)) {
        return Err(ManifestError::malformed(format!(
            "unknown manifest schema version \"{text}\""
        )));
    }
    Ok(Some((text, tuple)))
}

fn parse_version(text: &str) -> Option<(u32, u32, u32)> {
    let mut parts = text.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = match parts.next() {
        Some(p) => p.parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

fn parse_defaults(
    value: &Value,
    remote: &mut Option<String>,
    revision: &mut Option<String>,
    reasons: &mut Vec<String>,
) {
    let Value::Mapping(mapping) = value else {
        reasons.push("\"defaults\" is not a mapping".to_string());
        return;
    };
    for (key, val) in mapping {
        match key.as_str() {
            Some("remote") => match val.as_str() {
                Some(s) => *remote = Some(s.to_string()),
                None => reasons.push("defaults remote is not a string".to_string()),
            },
            Some("revision") => match scalar_to_string(val) {
                Some(s) => *revision = Some(s),
                None => reasons.push("defaults revision is not a scalar".to_string()),
            },
            Some(other) => reasons.push(format!("unknown defaults key \"{other}\"")),
            None => reasons.push("non-string defaults key".to_string()),
        }
    }
}

fn parse_remotes(value: &Value, reasons: &mut Vec<String>) -> Vec<Remote> {
    let parsed: Vec<Remote> = match serde_yaml::from_value(value.clone()) {
        Ok(remotes) => remotes,
        Err(err) => {
            reasons.push(format!("invalid \"remotes\": {err}"));
            return Vec::new();
        }
    };
    let mut remotes: Vec<Remote> = Vec::new();
    for remote in parsed {
        if remotes.iter().any(|r| r.name == remote.name) {
            reasons.push(format!("duplicate remote \"{}\"", remote.name));
        } else {
            remotes.push(remote);
        }
    }
    remotes
}

fn parse_group_filter(value: &Value, reasons: &mut Vec<String>) -> Vec<String> {
    let Value::Sequence(seq) = value else {
        reasons.push(format!("\"group-filter\" is not a list: {}", render(value)));
        return Vec::new();
    };
    if seq.is_empty() {
        reasons.push("\"group-filter\" may not be empty".to_string());
        return Vec::new();
    }
    let mut items = Vec::new();
    for entry in seq {
        match scalar_to_string(entry) {
            Some(item) if is_filter_item(&item) => items.push(item),
            Some(item) => {
                reasons.push(format!("\"group-filter\" contains invalid item \"{item}\""))
            }
            None => reasons.push(format!(
                "\"group-filter\" contains invalid item {}",
                render(entry)
            )),
        }
    }
    items
}

fn parse_projects(
    value: &Value,
    remotes: &[Remote],
    defaults_remote: Option<&str>,
    defaults_revision: Option<&str>,
    doc: &mut RawDocument,
    reasons: &mut Vec<String>,
) {
    let Value::Sequence(seq) = value else {
        reasons.push("\"projects\" is not a list".to_string());
        return;
    };
    for entry in seq {
        if let Some(project) =
            parse_project(entry, remotes, defaults_remote, defaults_revision, reasons)
        {
            if doc.projects.iter().any(|p| p.name == project.name) {
                reasons.push(format!("project \"{}\" is defined more than once", project.name));
            } else {
                doc.projects.push(project);
            }
        }
    }
}

fn parse_project(
    entry: &Value,
    remotes: &[Remote],
    defaults_remote: Option<&str>,
    defaults_revision: Option<&str>,
    reasons: &mut Vec<String>,
) -> Option<RawProject> {
    let Value::Mapping(mapping) = entry else {
        reasons.push(format!("project entry is not a mapping: {}", render(entry)));
        return None;
    };

    let mut name: Option<String> = None;
    let mut url: Option<String> = None;
    let mut remote: Option<String> = None;
    let mut repo_path: Option<String> = None;
    let mut revision: Option<String> = None;
    let mut path: Option<String> = None;
    let mut clone_depth: Option<u32> = None;
    let mut west_commands: Vec<String> = Vec::new();
    let mut import: Option<Import> = None;
    let mut groups: Vec<String> = Vec::new();
    let mut userdata: Option<Value> = None;
    let mut submodules: Option<Value> = None;

    for (key, val) in mapping {
        match key.as_str() {
            Some("name") => name = scalar_to_string(val),
            Some("url") => url = val.as_str().map(str::to_string),
            Some("remote") => remote = val.as_str().map(str::to_string),
            Some("repo-path") => repo_path = val.as_str().map(str::to_string),
            Some("revision") => match scalar_to_string(val) {
                Some(s) => revision = Some(s),
                None => reasons.push("project revision is not a scalar".to_string()),
            },
            Some("path") => path = val.as_str().map(str::to_string),
            Some("clone-depth") => match val.as_u64() {
                Some(depth) if depth > 0 && depth <= u64::from(u32::MAX) => {
                    clone_depth = Some(depth as u32)
                }
                _ => reasons.push(format!(
                    "clone-depth is not a positive integer: {}",
                    render(val)
                )),
            },
            Some("west-commands") => west_commands = parse_west_commands(val, reasons),
            Some("import") => import = Import::parse(val, reasons),
            Some("groups") => groups = parse_groups(val, reasons),
            Some("submodules") => match val {
                Value::Bool(_) | Value::Sequence(_) => submodules = Some(val.clone()),
                other => reasons.push(format!(
                    "\"submodules\" is not a boolean or list: {}",
                    render(other)
                )),
            },
            Some("userdata") => userdata = Some(val.clone()),
            Some(other) => reasons.push(format!("unknown project key \"{other}\"")),
            None => reasons.push("non-string project key".to_string()),
        }
    }

    let Some(name) = name else {
        reasons.push(format!("project is missing a name: {}", render(entry)));
        return None;
    };
    if name.is_empty() {
        reasons.push("project name may not be empty".to_string());
        return None;
    }
    if name == MANIFEST_PROJECT_NAME {
        reasons.push(format!(
            "the name \"{MANIFEST_PROJECT_NAME}\" is reserved and cannot be used as a project name"
        ));
        return None;
    }
    if name == "west" {
        warn!("a project is named \"west\"; this was once reserved");
    }

    if !groups.is_empty() && !matches!(import, None | Some(Import::Bool(false))) {
        reasons.push(format!(
            "project \"{name}\": \"groups\" cannot be combined with \"import\""
        ));
    }

    let url = resolve_url(&name, url, remote.as_deref(), repo_path, remotes, defaults_remote, reasons)?;

    if let Some(p) = &path {
        if p.is_empty() {
            reasons.push(format!("project \"{name}\": path may not be empty"));
            return None;
        }
        if Path::new(p).is_absolute() || escapes_relative(p) {
            reasons.push(format!(
                "project \"{name}\": path \"{p}\" escapes the workspace topdir"
            ));
            return None;
        }
    }

    Some(RawProject {
        path: path.unwrap_or_else(|| name.clone()),
        revision: revision
            .or_else(|| defaults_revision.map(str::to_string))
            .unwrap_or_else(|| DEFAULT_REVISION.to_string()),
        name,
        url: url.0,
        remote_name: url.1,
        clone_depth,
        west_commands,
        import,
        groups,
        userdata,
        submodules,
    })
}

// Resolves the fetch URL, returning it with the remote name it was
// derived from (if any).
fn resolve_url(
    name: &str,
    url: Option<String>,
    remote: Option<&str>,
    repo_path: Option<String>,
    remotes: &[Remote],
    defaults_remote: Option<&str>,
    reasons: &mut Vec<String>,
) -> Option<(String, Option<String>)> {
    if let Some(url) = url {
        if remote.is_some() || repo_path.is_some() {
            reasons.push(format!(
                "project \"{name}\": \"url\" cannot be combined with \"remote\" or \"repo-path\""
            ));
            return None;
        }
        return Some((url, None));
    }

    let remote_name = remote.or(defaults_remote);
    let Some(remote_name) = remote_name else {
        reasons.push(format!("project \"{name}\" has no \"url\" or \"remote\""));
        return None;
    };
    let Some(declared) = remotes.iter().find(|r| r.name == remote_name) else {
        reasons.push(format!("project \"{name}\": remote \"{remote_name}\" is not defined"));
        return None;
    };
    let tail = repo_path.unwrap_or_else(|| name.to_string());
    Some((remote_url(&declared.url_base, &tail), Some(declared.name.clone())))
}

fn parse_west_commands(value: &Value, reasons: &mut Vec<String>) -> Vec<String> {
    match value {
        // A bare filename means a one-element list.
        Value::String(s) => vec![s.clone()],
        Value::Sequence(seq) => {
            let mut out = Vec::new();
            for item in seq {
                match item.as_str() {
                    Some(s) => out.push(s.to_string()),
                    None => reasons.push(format!(
                        "\"west-commands\" contains a non-string entry: {}",
                        render(item)
                    )),
                }
            }
            out
        }
        other => {
            reasons.push(format!("\"west-commands\" is not a string or list: {}", render(other)));
            Vec::new()
        }
    }
}

fn parse_groups(value: &Value, reasons: &mut Vec<String>) -> Vec<String> {
    let Value::Sequence(seq) = value else {
        reasons.push(format!("\"groups\" is not a list: {}", render(value)));
        return Vec::new();
    };
    let mut out = Vec::new();
    for entry in seq {
        match scalar_to_string(entry) {
            Some(group) if is_group(&group) => out.push(group),
            Some(group) => reasons.push(format!("invalid group \"{group}\"")),
            None => reasons.push(format!("invalid group {}", render(entry))),
        }
    }
    out
}

fn parse_self(value: &Value, doc: &mut RawDocument, reasons: &mut Vec<String>) {
    let Value::Mapping(mapping) = value else {
        reasons.push("\"self\" is not a mapping".to_string());
        return;
    };
    for (key, val) in mapping {
        match key.as_str() {
            Some("path") => match val.as_str() {
                Some("") => reasons.push("self: path may not be empty".to_string()),
                Some(s) if Path::new(s).is_absolute() || escapes_relative(s) => {
                    reasons.push(format!("self: path \"{s}\" escapes the workspace topdir"))
                }
                Some(s) => doc.self_path = Some(s.to_string()),
                None => reasons.push("self: path is not a string".to_string()),
            },
            Some("west-commands") => doc.self_west_commands = parse_west_commands(val, reasons),
            Some("import") => {
                let import = Import::parse(val, reasons);
                if let Some(Import::Bool(_)) = import {
                    reasons.push(
                        "self: importing of boolean values is not supported".to_string(),
                    );
                } else {
                    doc.self_import = import;
                }
            }
            Some(other) => reasons.push(format!("unknown self key \"{other}\"")),
            None => reasons.push("non-string self key".to_string()),
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// True if a relative path climbs out of its root.
pub(crate) fn escapes_relative(path: &str) -> bool {
    let normalized = west_core::paths::normalize(Path::new(path));
    normalized.as_os_str().is_empty()
        || normalized.components().next() == Some(std::path::Component::ParentDir)
}

fn render(value: &Value) -> String {
    serde_yaml::to_string(value).unwrap_or_default().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(data: &str) -> Result<RawDocument, ManifestError> {
        parse_document(data, None)
    }

    #[test]
    fn minimal_documents() {
        let doc = parse("manifest: {}").unwrap();
        assert!(doc.projects.is_empty());
        assert!(doc.self_path.is_none());

        let doc = parse("manifest:\n  projects: []\n").unwrap();
        assert!(doc.projects.is_empty());
    }

    #[test]
    fn version_gate_beats_unknown_keys() {
        let data = "manifest:\n  version: \"99.0\"\n  brand-new-key: 1\n  projects: []\n";
        let err = parse(data).unwrap_err();
        assert!(matches!(err, ManifestError::Version { .. }));

        // A float version means the same thing.
        let err = parse("manifest:\n  version: 99.0\n  projects: []\n").unwrap_err();
        assert!(matches!(err, ManifestError::Version { .. }));
    }

    #[test]
    fn versions_below_the_floor_are_malformed() {
        for ver in ["0.0.1", "0.5.0", "\"0.6\"", "0.6.9", "0.6.98"] {
            let err = parse(&format!("manifest:\n  version: {ver}\n  projects: []\n"))
                .unwrap_err();
            assert!(matches!(err, ManifestError::Malformed { .. }), "version {ver}");
        }
    }

    #[test]
    fn known_versions_parse() {
        for ver in VALID_SCHEMA_VERSIONS {
            let doc = parse(&format!(
                "manifest:\n  version: \"{ver}\"\n  projects:\n  - name: foo\n    url: u\n"
            ))
            .unwrap();
            assert_eq!(doc.projects[0].name, "foo");
        }
    }

    #[test]
    fn legacy_flag_only_for_0_9() {
        assert!(parse("manifest:\n  version: \"0.9\"\n").unwrap().legacy_group_filter);
        assert!(!parse("manifest:\n  version: \"0.10\"\n").unwrap().legacy_group_filter);
        assert!(!parse("manifest: {}").unwrap().legacy_group_filter);
    }

    #[test]
    fn unknown_manifest_keys_are_errors() {
        let err = parse("manifest:\n  no-such-key: 1\n").unwrap_err();
        let ManifestError::Malformed { reasons } = err else { panic!() };
        assert!(reasons[0].contains("unknown manifest key"));
    }

    #[test]
    fn url_derivation() {
        let doc = parse(
            "
manifest:
  defaults:
    remote: r2
  remotes:
  - name: r1
    url-base: https://foo
  - name: r2
    url-base: https://bar
  projects:
  - name: A
    remote: r1
  - name: B
    remote: r1
    repo-path: bp3
  - name: C
  - name: D
    repo-path: sub/d5
",
        )
        .unwrap();
        let urls: Vec<&str> = doc.projects.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://foo/A", "https://foo/bp3", "https://bar/C", "https://bar/sub/d5"]
        );
        // repo-path affects the URL, never the filesystem path.
        assert_eq!(doc.projects[3].path, "D");
    }

    #[test]
    fn url_and_remote_are_exclusive() {
        let err = parse(
            "
manifest:
  remotes:
  - name: r
    url-base: https://foo
  projects:
  - name: p
    url: https://example.com/p
    remote: r
",
        )
        .unwrap_err();
        let ManifestError::Malformed { reasons } = err else { panic!() };
        assert!(reasons[0].contains("cannot be combined"));
    }

    #[test]
    fn missing_url_sources_are_malformed() {
        let err = parse("manifest:\n  projects:\n  - name: p\n").unwrap_err();
        let ManifestError::Malformed { reasons } = err else { panic!() };
        assert!(reasons[0].contains("no \"url\" or \"remote\""));

        let err = parse(
            "manifest:\n  defaults: {remote: nope}\n  projects:\n  - name: p\n",
        )
        .unwrap_err();
        let ManifestError::Malformed { reasons } = err else { panic!() };
        assert!(reasons.iter().any(|r| r.contains("is not defined")));
    }

    #[test]
    fn revision_and_path_defaults() {
        let doc = parse(
            "
manifest:
  defaults:
    revision: v2.0
  projects:
  - name: a
    url: u
  - name: b
    url: u
    revision: pinned
    path: here
",
        )
        .unwrap();
        assert_eq!(doc.projects[0].revision, "v2.0");
        assert_eq!(doc.projects[0].path, "a");
        assert_eq!(doc.projects[1].revision, "pinned");
        assert_eq!(doc.projects[1].path, "here");

        let doc = parse("manifest:\n  projects:\n  - name: a\n    url: u\n").unwrap();
        assert_eq!(doc.projects[0].revision, "master");
    }

    #[test]
    fn names_are_required_unique_and_unreserved() {
        assert!(parse("manifest:\n  projects:\n  - url: foo\n").is_err());
        assert!(parse(
            "manifest:\n  projects:\n  - name: foo\n    url: u1\n  - name: foo\n    url: u2\n"
        )
        .is_err());
        assert!(parse("manifest:\n  projects:\n  - name: manifest\n    url: u\n").is_err());
        // "west" is allowed (with a warning).
        assert!(parse("manifest:\n  projects:\n  - name: west\n    url: u\n").is_ok());
    }

    #[test]
    fn groups_validation() {
        let doc = parse(
            "manifest:\n  projects:\n  - name: p\n    url: u\n    groups: [1, hello-world, 3.14]\n",
        )
        .unwrap();
        assert_eq!(doc.projects[0].groups, vec!["1", "hello-world", "3.14"]);

        for bad in ["\"\"", "white space", "no,commas", "no:colons", "-noleadingdash"] {
            let err = parse(&format!(
                "manifest:\n  projects:\n  - name: p\n    url: u\n    groups:\n    - {bad}\n"
            ))
            .unwrap_err();
            let ManifestError::Malformed { reasons } = err else { panic!() };
            assert!(reasons[0].contains("invalid group"), "{bad}: {reasons:?}");
        }

        let err = parse("manifest:\n  projects:\n  - name: p\n    url: u\n    groups: hello\n")
            .unwrap_err();
        let ManifestError::Malformed { reasons } = err else { panic!() };
        assert!(reasons[0].contains("is not a list"));
    }

    #[test]
    fn groups_and_import_conflict() {
        let err = parse(
            "manifest:\n  projects:\n  - name: p\n    url: u\n    groups: [g]\n    import: true\n",
        )
        .unwrap_err();
        let ManifestError::Malformed { reasons } = err else { panic!() };
        assert!(reasons[0].contains("cannot be combined with \"import\""));

        // import: false is a no-op and does not conflict.
        assert!(parse(
            "manifest:\n  projects:\n  - name: p\n    url: u\n    groups: [g]\n    import: false\n"
        )
        .is_ok());
    }

    #[test]
    fn group_filter_validation() {
        let doc = parse("manifest:\n  projects: []\n  group-filter: [+ga, -gb]\n").unwrap();
        assert_eq!(doc.group_filter, vec!["+ga", "-gb"]);

        let err = parse("manifest:\n  projects: []\n  group-filter: []\n").unwrap_err();
        assert!(err.to_string().contains("may not be empty"));

        let err = parse("manifest:\n  projects: []\n  group-filter: hello\n").unwrap_err();
        assert!(err.to_string().contains("not a list"));

        let err =
            parse("manifest:\n  projects: []\n  group-filter: ['white space']\n").unwrap_err();
        assert!(err.to_string().contains("contains invalid item"));
    }

    #[test]
    fn west_commands_normalization() {
        let doc = parse(
            "manifest:\n  projects:\n  - name: p\n    url: u\n    west-commands: wc.yml\n",
        )
        .unwrap();
        assert_eq!(doc.projects[0].west_commands, vec!["wc.yml"]);

        let doc = parse(
            "manifest:\n  self:\n    west-commands: [a.yml, b.yml]\n  projects: []\n",
        )
        .unwrap();
        assert_eq!(doc.self_west_commands, vec!["a.yml", "b.yml"]);
    }

    #[test]
    fn self_section_validation() {
        let err = parse("manifest:\n  self:\n    path: ''\n").unwrap_err();
        assert!(err.to_string().contains("path may not be empty"));

        let err = parse("manifest:\n  self:\n    import: true\n").unwrap_err();
        assert!(err.to_string().contains("of boolean"));
        let err = parse("manifest:\n  self:\n    import: false\n").unwrap_err();
        assert!(err.to_string().contains("of boolean"));
    }

    #[test]
    fn escaping_paths_rejected() {
        let err = parse(
            "manifest:\n  projects:\n  - name: evil\n    url: u\n    path: ../outside\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("escapes"));

        let err =
            parse("manifest:\n  projects:\n  - name: evil\n    url: u\n    path: /abs\n")
                .unwrap_err();
        assert!(err.to_string().contains("escapes"));
    }

    #[test]
    fn userdata_and_submodules_pass_through() {
        let doc = parse(
            "
manifest:
  projects:
  - name: p
    url: u
    submodules: true
    userdata:
      answer: 42
",
        )
        .unwrap();
        assert_eq!(doc.projects[0].submodules, Some(Value::Bool(true)));
        assert!(doc.projects[0].userdata.is_some());

        let err = parse(
            "manifest:\n  projects:\n  - name: p\n    url: u\n    submodules: nope\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("boolean or list"));
    }

    #[test]
    fn clone_depth_must_be_positive() {
        let doc =
            parse("manifest:\n  projects:\n  - name: p\n    url: u\n    clone-depth: 1\n")
                .unwrap();
        assert_eq!(doc.projects[0].clone_depth, Some(1));

        for bad in ["0", "-4", "deep"] {
            assert!(parse(&format!(
                "manifest:\n  projects:\n  - name: p\n    url: u\n    clone-depth: {bad}\n"
            ))
            .is_err());
        }
    }
}
