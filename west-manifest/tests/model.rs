//! Model-level tests: project attributes, manifest-project behavior,
//! serialization details, and resolver flag handling.

use std::collections::HashMap;
use std::path::PathBuf;

use serde_yaml::Value;
use west_manifest::{
    ImportMode, ImportedContent, LoadOptions, Manifest, ManifestError, ManifestImporter, Project,
};

fn from_data(data: &str) -> Manifest {
    Manifest::from_data(data, &LoadOptions::default()).unwrap()
}

fn with_topdir(data: &str, topdir: &str) -> Manifest {
    Manifest::from_data(
        data,
        &LoadOptions {
            topdir: Some(PathBuf::from(topdir)),
            manifest_path: None,
            mode: ImportMode::Normal,
        },
    )
    .unwrap()
}

/// Importer that can also serve directory trees.
#[derive(Default)]
struct TreeImporter {
    files: HashMap<(String, String), String>,
    dirs: HashMap<(String, String), Vec<(String, String)>>,
}

impl TreeImporter {
    fn file(mut self, project: &str, path: &str, content: &str) -> Self {
        self.files
            .insert((project.to_string(), path.to_string()), content.to_string());
        self
    }

    fn dir(mut self, project: &str, path: &str, entries: &[(&str, &str)]) -> Self {
        self.dirs.insert(
            (project.to_string(), path.to_string()),
            entries
                .iter()
                .map(|(name, content)| (name.to_string(), content.to_string()))
                .collect(),
        );
        self
    }
}

impl ManifestImporter for TreeImporter {
    fn import_from(
        &mut self,
        project: &Project,
        file: &str,
    ) -> Result<ImportedContent, ManifestError> {
        let key = (project.name.clone(), file.to_string());
        if let Some(content) = self.files.get(&key) {
            return Ok(ImportedContent::File(content.clone()));
        }
        if let Some(entries) = self.dirs.get(&key) {
            return Ok(ImportedContent::Directory(entries.clone()));
        }
        Err(ManifestError::ImportFailed {
            project: project.name.clone(),
            file: file.to_string(),
            reason: "not in the test import map".to_string(),
        })
    }
}

#[test]
fn manifest_project_defaults() {
    let manifest = from_data(
        "
manifest:
  projects:
  - name: name
    url: url
",
    );
    let mp = manifest.manifest_project();
    assert_eq!(mp.name, "manifest");
    assert_eq!(mp.url, "");
    assert_eq!(mp.revision, "HEAD");
    assert_eq!(mp.path, None);
    assert_eq!(mp.topdir, None);
    assert_eq!(mp.abspath(), None);
    assert_eq!(mp.posixpath(), None);
}

#[test]
fn empty_projects_list_is_fine() {
    assert_eq!(from_data("manifest: {}").projects.len(), 1);
    assert_eq!(from_data("manifest:\n  self:\n    path: foo\n").projects.len(), 1);
}

#[test]
fn absolute_paths_require_a_topdir() {
    let manifest = with_topdir(
        "
manifest:
  remotes:
  - name: testremote
    url-base: https://example.com
  projects:
  - name: testproject
    remote: testremote
    path: sub/directory
",
        "/west_top",
    );
    let p = &manifest.projects[1];
    assert_eq!(p.path.as_deref(), Some("sub/directory"));
    assert_eq!(p.posixpath().unwrap(), "/west_top/sub/directory");
    assert_eq!(p.name_and_path(), "testproject (sub/directory)");
}

#[test]
fn revision_defaults_cascade() {
    let manifest = from_data(
        "
manifest:
  defaults:
    revision: defaulted
  projects:
  - name: a
    url: u
  - name: b
    url: u
    revision: explicit
",
    );
    assert_eq!(manifest.projects[1].revision, "defaulted");
    assert_eq!(manifest.projects[2].revision, "explicit");

    let manifest = from_data("manifest:\n  projects:\n  - name: a\n    url: u\n");
    assert_eq!(manifest.projects[1].revision, "master");
}

#[test]
fn numeric_revisions_are_coerced() {
    // A YAML float revision (like a misquoted "1.0" tag) still loads.
    let manifest = from_data(
        "
manifest:
  projects:
  - name: a
    url: u
    revision: 1.0
",
    );
    assert_eq!(manifest.projects[1].revision, "1.0");
}

#[test]
fn userdata_shapes_pass_through() {
    let manifest = from_data(
        "
manifest:
  projects:
  - name: scalar
    url: u
    userdata: hello
  - name: mapping
    url: u
    userdata:
      build: cmake
      flags: [a, b]
  - name: none
    url: u
",
    );
    assert_eq!(
        manifest.projects[1].userdata,
        Some(Value::String("hello".to_string()))
    );
    let Some(Value::Mapping(map)) = &manifest.projects[2].userdata else {
        panic!("expected mapping userdata");
    };
    assert_eq!(map.len(), 2);
    assert_eq!(manifest.projects[3].userdata, None);
}

#[test]
fn submodule_shapes_pass_through() {
    let manifest = from_data(
        "
manifest:
  projects:
  - name: all
    url: u
    submodules: true
  - name: some
    url: u
    submodules:
    - path: modules/inner
",
    );
    assert_eq!(manifest.projects[1].submodules, Some(Value::Bool(true)));
    assert!(matches!(manifest.projects[2].submodules, Some(Value::Sequence(_))));
}

#[test]
fn ignored_west_section_still_parses() {
    let manifest = from_data(
        "
west:
  url: https://gone
manifest:
  projects:
  - name: p
    url: u
",
    );
    assert_eq!(manifest.projects[1].name, "p");
}

#[test]
fn unknown_top_level_keys_are_rejected() {
    let err = Manifest::from_data(
        "
manifest:
  projects: []
mystery: 1
",
        &LoadOptions::default(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("unknown top-level key"));
}

#[test]
fn ignore_flag_parses_without_any_importer_or_files() {
    // IGNORE is the fast-validation mode: imports of both kinds are
    // present but nothing tries to read them.
    let manifest = Manifest::from_data(
        "
manifest:
  projects:
  - name: p
    url: u
    import: true
  self:
    import: submanifests
",
        &LoadOptions { mode: ImportMode::Ignore, ..LoadOptions::default() },
    )
    .unwrap();
    assert!(manifest.has_imports());
    assert_eq!(manifest.projects.len(), 2);
}

#[test]
fn ignore_projects_flag_skips_only_project_imports() {
    let manifest = Manifest::from_data_with(
        "
manifest:
  projects:
  - name: p
    url: u
    import: true
",
        &LoadOptions { mode: ImportMode::IgnoreProjects, ..LoadOptions::default() },
        None,
    )
    .unwrap();
    // No importer was needed even though the project import exists.
    assert_eq!(manifest.projects.len(), 2);
}

#[test]
fn validate_catches_document_errors_only() {
    assert!(Manifest::validate("manifest:\n  projects: []\n").is_ok());
    // Imports are not chased.
    assert!(Manifest::validate(
        "manifest:\n  projects:\n  - name: p\n    url: u\n    import: true\n"
    )
    .is_ok());
    assert!(Manifest::validate("manifest:\n  bad-key: 1\n").is_err());
    assert!(matches!(
        Manifest::validate("manifest:\n  version: \"99.0\"\n").unwrap_err(),
        ManifestError::Version { .. }
    ));
}

#[test]
fn directory_imports_from_projects() {
    // A project import naming a directory takes every *.yml inside, in
    // sorted order, from the project's pinned tree.
    let mut importer = TreeImporter::default().dir(
        "p1",
        "d",
        &[
            (
                "m1.yml",
                "manifest:\n  projects:\n  - name: p2\n    url: p2-url\n",
            ),
            (
                "m2.yml",
                "manifest:\n  projects:\n  - name: p3\n    url: p3-url\n",
            ),
        ],
    );
    let manifest = Manifest::from_data_with(
        "
manifest:
  projects:
  - name: p1
    url: p1-url
    import: d
  self:
    path: mp
",
        &LoadOptions { mode: ImportMode::ForceProjects, ..LoadOptions::default() },
        Some(&mut importer),
    )
    .unwrap();

    let names: Vec<&str> = manifest.projects.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["manifest", "p1", "p2", "p3"]);
}

#[test]
fn list_imports_resolve_in_declared_order() {
    let mut importer = TreeImporter::default()
        .file("p1", "m1.yml", "manifest:\n  projects:\n  - name: p2\n    url: p2-url\n")
        .file("p1", "m2.yml", "manifest:\n  projects:\n  - name: p3\n    url: p3-url\n");
    let manifest = Manifest::from_data_with(
        "
manifest:
  projects:
  - name: p1
    url: p1-url
    import:
    - m1.yml
    - m2.yml
",
        &LoadOptions { mode: ImportMode::ForceProjects, ..LoadOptions::default() },
        Some(&mut importer),
    )
    .unwrap();
    let names: Vec<&str> = manifest.projects.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["manifest", "p1", "p2", "p3"]);
}

#[test]
fn import_loops_between_projects_hit_the_depth_limit() {
    // p1's manifest defines p2 with an import, whose manifest defines
    // p1 again with an import. The duplicate definitions are dropped,
    // but their imports keep resolving until the depth limit trips.
    let mut importer = TreeImporter::default()
        .file(
            "p1",
            "west.yml",
            "manifest:\n  projects:\n  - name: p2\n    url: u2\n    import: true\n",
        )
        .file(
            "p2",
            "west.yml",
            "manifest:\n  projects:\n  - name: p1\n    url: u1\n    import: true\n",
        );
    let err = Manifest::from_data_with(
        "
manifest:
  projects:
  - name: p1
    url: u1
    import: true
",
        &LoadOptions { mode: ImportMode::ForceProjects, ..LoadOptions::default() },
        Some(&mut importer),
    )
    .unwrap_err();
    assert!(matches!(err, ManifestError::ImportDepth { .. }), "{err}");
}

#[test]
fn is_active_truth_table() {
    let manifest = from_data(
        "
manifest:
  defaults:
    remote: r
  remotes:
  - name: r
    url-base: u
  projects:
  - name: p1
    groups: [ga]
  - name: p2
    groups: [ga, gb]
  - name: p3
",
    );
    let get = |name: &str| manifest.projects.iter().find(|p| p.name == name).unwrap();
    let strs = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

    // No filter at all: everything is active.
    for name in ["p1", "p2", "p3"] {
        assert!(manifest.is_active(get(name), &[]));
    }

    // Single extra disables both of p2's groups only when it covers
    // them all.
    assert!(manifest.is_active(get("p2"), &strs(&["-ga"])));
    assert!(!manifest.is_active(get("p2"), &strs(&["-ga", "-gb"])));

    // Groupless projects ignore every filter.
    assert!(manifest.is_active(get("p3"), &strs(&["-ga", "-gb", "-gc"])));

    // Re-enabling and re-disabling obeys the last sign.
    assert!(manifest.is_active(get("p1"), &strs(&["-ga", "+ga"])));
    assert!(!manifest.is_active(get("p1"), &strs(&["+ga", "-ga"])));
}

#[test]
fn group_filter_output_is_simplified() {
    // Only disabled groups survive into the resolved filter.
    let manifest = from_data(
        "
manifest:
  projects: []
  group-filter: [+ga, -gb, +gc, -gb]
",
    );
    assert_eq!(manifest.group_filter, vec!["-gb"]);
}

#[test]
fn version_is_echoed_through_serialization() {
    let manifest = from_data(
        "
manifest:
  version: \"0.13\"
  projects:
  - name: p
    url: u
",
    );
    assert_eq!(manifest.schema_version, "0.13");
    let yaml = manifest.as_yaml();
    assert!(yaml.contains("0.13"));

    let reparsed = from_data(&yaml);
    assert_eq!(reparsed.schema_version, "0.13");
}

#[test]
fn west_commands_survive_serialization() {
    let manifest = from_data(
        "
manifest:
  projects:
  - name: p
    url: u
    west-commands: scripts/west-commands.yml
  self:
    path: mp
    west-commands: own-commands.yml
",
    );
    let yaml = manifest.as_yaml();
    let reparsed = from_data(&yaml);
    assert_eq!(
        reparsed.projects[1].west_commands,
        vec!["scripts/west-commands.yml"]
    );
    assert_eq!(reparsed.manifest_project().west_commands, vec!["own-commands.yml"]);
}
