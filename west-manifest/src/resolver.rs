//! Manifest loading and recursive import resolution.
//!
//! Resolution turns a root manifest document plus everything it imports
//! into one ordered projects list. The order is fully determined by the
//! input: the manifest project first, then projects from self-imports in
//! declared order, then the document's own projects in declared order,
//! each followed depth-first by whatever its own import contributes.
//! The first project emitted under a name wins; later same-named
//! projects are dropped silently.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use west_core::config::{Config, ConfigError, ConfigScope};
use west_core::git::Git;
use west_core::paths;

use crate::error::ManifestError;
use crate::groups;
use crate::import::{posix_rel, Frame, Import, ImportMap};
use crate::project::Project;
use crate::schema::{escapes_relative, parse_document, RawDocument, RawProject};
use crate::{DEFAULT_MANIFEST_FILE, MAX_IMPORT_DEPTH, QUAL_MANIFEST_REV, SCHEMA_VERSION};

/// How the resolver treats `import:` directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// Resolve every import.
    #[default]
    Normal,
    /// Skip all imports; only the root document's own contents count.
    Ignore,
    /// Resolve self-imports but skip project imports.
    IgnoreProjects,
    /// Resolve every import through the caller's importer, even for
    /// projects that are not fetched yet.
    ForceProjects,
}

impl ImportMode {
    fn follows_self_imports(self) -> bool {
        self != ImportMode::Ignore
    }

    fn follows_project_imports(self) -> bool {
        matches!(self, ImportMode::Normal | ImportMode::ForceProjects)
    }
}

/// Content handed back by a [`ManifestImporter`].
#[derive(Debug)]
pub enum ImportedContent {
    /// The named path was a manifest file.
    File(String),
    /// The named path was a directory: `(filename, content)` pairs for
    /// its `*.yml` files, in sorted filename order.
    Directory(Vec<(String, String)>),
}

/// Reads sub-manifests out of projects at their pinned revision.
///
/// The update engine supplies its own implementation which updates each
/// project before reading from it.
pub trait ManifestImporter {
    fn import_from(
        &mut self,
        project: &Project,
        file: &str,
    ) -> Result<ImportedContent, ManifestError>;
}

/// The default importer: reads `file` from the project's working tree at
/// `refs/heads/manifest-rev` via the git driver.
pub struct GitImporter<'a> {
    git: &'a Git,
}

impl<'a> GitImporter<'a> {
    pub fn new(git: &'a Git) -> Self {
        GitImporter { git }
    }
}

impl ManifestImporter for GitImporter<'_> {
    fn import_from(
        &mut self,
        project: &Project,
        file: &str,
    ) -> Result<ImportedContent, ManifestError> {
        read_project_manifest(self.git, project, file)
    }
}

/// Shared helper for importer implementations: reads `file` (a manifest
/// file or directory of them) from `project` at `manifest-rev`.
pub fn read_project_manifest(
    git: &Git,
    project: &Project,
    file: &str,
) -> Result<ImportedContent, ManifestError> {
    let fail = |reason: &str| ManifestError::ImportFailed {
        project: project.name.clone(),
        file: file.to_string(),
        reason: reason.to_string(),
    };

    let Some(abspath) = project.abspath() else {
        return Err(fail("project location is unknown (no workspace topdir)"));
    };
    if !project.is_cloned(git) {
        return Err(fail("project is not cloned"));
    }
    if !git.show_ref(&abspath, QUAL_MANIFEST_REV)? {
        return Err(fail("project has no manifest-rev ref (update it first)"));
    }

    let spec = format!("{QUAL_MANIFEST_REV}:{file}");
    match git.cat_file_type(&abspath, &spec)?.as_deref() {
        Some("blob") => {
            let bytes = git.read_blob_at(&abspath, QUAL_MANIFEST_REV, file)?;
            let content = String::from_utf8(bytes)
                .map_err(|_| fail("manifest file is not valid UTF-8"))?;
            Ok(ImportedContent::File(content))
        }
        Some("tree") => {
            let mut entries = Vec::new();
            for name in git.list_tree_at(&abspath, QUAL_MANIFEST_REV, file)? {
                if !name.ends_with(".yml") {
                    continue;
                }
                let child = if file.is_empty() {
                    name.clone()
                } else {
                    format!("{file}/{name}")
                };
                let bytes = git.read_blob_at(&abspath, QUAL_MANIFEST_REV, &child)?;
                let content = String::from_utf8(bytes)
                    .map_err(|_| fail("manifest file is not valid UTF-8"))?;
                entries.push((name, content));
            }
            Ok(ImportedContent::Directory(entries))
        }
        Some(_) => Err(fail("not a file or directory at manifest-rev")),
        None => Err(fail("not found at manifest-rev")),
    }
}

/// Where a manifest comes from and how to resolve it.
#[derive(Debug, Default, Clone)]
pub struct LoadOptions {
    pub topdir: Option<PathBuf>,
    /// Workspace-relative directory of the manifest repository; used as
    /// the manifest project's path when the document has no `self.path`,
    /// and to locate self-imports on the filesystem.
    pub manifest_path: Option<String>,
    pub mode: ImportMode,
}

/// A fully resolved manifest.
#[derive(Debug)]
pub struct Manifest {
    /// All resolved projects; the manifest project is always first.
    pub projects: Vec<Project>,
    /// The composed group filter, reduced to its disabled groups (or the
    /// root document's filter verbatim under the 0.9 schema).
    pub group_filter: Vec<String>,
    /// The schema version the root document asked for, or the current
    /// version if it did not.
    pub schema_version: String,
    pub topdir: Option<PathBuf>,
    /// Absolute path of the root manifest file, when loaded from one.
    pub path: Option<PathBuf>,
    has_imports: bool,
}

impl Manifest {
    /// Resolves manifest data that is not backed by a file.
    pub fn from_data(data: &str, opts: &LoadOptions) -> Result<Manifest, ManifestError> {
        Self::from_data_with(data, opts, None)
    }

    /// Like [`Manifest::from_data`], with a custom importer for project
    /// imports.
    pub fn from_data_with(
        data: &str,
        opts: &LoadOptions,
        importer: Option<&mut dyn ManifestImporter>,
    ) -> Result<Manifest, ManifestError> {
        resolve(data, None, None, opts, importer)
    }

    /// Loads and resolves a manifest file.
    pub fn from_file(file: &Path, opts: &LoadOptions) -> Result<Manifest, ManifestError> {
        Self::from_file_with(file, opts, None)
    }

    /// Like [`Manifest::from_file`], with a custom importer.
    pub fn from_file_with(
        file: &Path,
        opts: &LoadOptions,
        importer: Option<&mut dyn ManifestImporter>,
    ) -> Result<Manifest, ManifestError> {
        let file = paths::canon_path(file);
        let data = fs::read_to_string(&file).map_err(|source| ManifestError::Io {
            path: file.clone(),
            source,
        })?;
        let manifest_dir = file.parent().map(Path::to_path_buf);

        let mut opts = opts.clone();
        if opts.manifest_path.is_none() {
            opts.manifest_path = match (&opts.topdir, &manifest_dir) {
                (Some(topdir), Some(dir)) => dir
                    .strip_prefix(paths::canon_path(topdir))
                    .ok()
                    .map(|rel| posix_rel(rel)),
                _ => None,
            };
        }
        resolve(&data, Some(&file), manifest_dir, &opts, importer)
    }

    /// Loads the manifest of a workspace, locating it through the
    /// `manifest.path` and `manifest.file` configuration keys.
    pub fn from_workspace(
        topdir: &Path,
        config: &Config,
        git: &Git,
        mode: ImportMode,
    ) -> Result<Manifest, ManifestError> {
        let mut importer = GitImporter::new(git);
        Self::from_workspace_with(topdir, config, mode, Some(&mut importer))
    }

    /// Like [`Manifest::from_workspace`], with a custom importer.
    pub fn from_workspace_with(
        topdir: &Path,
        config: &Config,
        mode: ImportMode,
        importer: Option<&mut dyn ManifestImporter>,
    ) -> Result<Manifest, ManifestError> {
        let mpath = config.get("manifest.path").ok_or(ConfigError::KeyNotFound {
            key: "manifest.path".to_string(),
            scope: ConfigScope::Local,
        })?;
        let mfile = config.get("manifest.file").unwrap_or(DEFAULT_MANIFEST_FILE);
        let file = topdir.join(mpath).join(mfile);
        let opts = LoadOptions {
            topdir: Some(topdir.to_path_buf()),
            manifest_path: Some(mpath.to_string()),
            mode,
        };
        Self::from_file_with(&file, &opts, importer)
    }

    /// Validates manifest data without resolving imports.
    ///
    /// Catches schema violations, bad versions, and semantic errors in
    /// the document itself; whatever its imports contribute is not
    /// examined.
    pub fn validate(data: &str) -> Result<(), ManifestError> {
        let opts = LoadOptions { mode: ImportMode::Ignore, ..LoadOptions::default() };
        Self::from_data(data, &opts).map(|_| ())
    }

    /// The manifest repository's own entry (always the first project).
    pub fn manifest_project(&self) -> &Project {
        &self.projects[0]
    }

    /// True if any document in the tree had a non-trivial `import:`.
    pub fn has_imports(&self) -> bool {
        self.has_imports
    }

    /// Whether `project` is active under the manifest's group filter
    /// plus `extras` (configuration values and command-line additions,
    /// in that order).
    pub fn is_active(&self, project: &Project, extras: &[String]) -> bool {
        groups::is_active(&project.groups, &self.group_filter, extras)
    }

    /// Looks projects up by name or workspace-relative path, preserving
    /// the order of `ids`.
    pub fn get_projects(&self, ids: &[String]) -> Result<Vec<&Project>, ManifestError> {
        let mut found = Vec::new();
        let mut unknown = Vec::new();
        for id in ids {
            let hit = self.projects.iter().find(|p| {
                p.name == *id || p.path.as_deref() == Some(id.as_str())
            });
            match hit {
                Some(p) => found.push(p),
                None => unknown.push(id.clone()),
            }
        }
        if unknown.is_empty() {
            Ok(found)
        } else {
            Err(ManifestError::UnknownProjects { ids: unknown })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Root,
    SelfImport,
    ProjectImport,
}

#[derive(Debug, Clone, Copy)]
enum Source {
    /// The manifest repository's working tree.
    ManifestRepo,
    /// A project (by resolved index), read at its manifest-rev.
    Project(usize),
}

#[derive(Debug, Clone, Copy)]
struct Ctx {
    depth: usize,
    bucket: Bucket,
    source: Source,
    /// Project index that inherits `self: west-commands:` from imported
    /// documents (0 is the manifest project).
    sink: usize,
}

struct Resolver<'i> {
    topdir: Option<PathBuf>,
    manifest_dir: Option<PathBuf>,
    mode: ImportMode,
    importer: Option<&'i mut dyn ManifestImporter>,

    projects: Vec<Project>,
    by_name: HashMap<String, usize>,
    path_owners: HashMap<String, String>,

    top_filter: Vec<String>,
    self_filters: Vec<Vec<String>>,
    project_filters: Vec<Vec<String>>,
    legacy: bool,
    legacy_warned: bool,
    has_imports: bool,
}

fn resolve(
    data: &str,
    file: Option<&Path>,
    manifest_dir: Option<PathBuf>,
    opts: &LoadOptions,
    importer: Option<&mut dyn ManifestImporter>,
) -> Result<Manifest, ManifestError> {
    let doc = parse_document(data, file)?;

    // Self-imports read from the manifest repository's working tree:
    // next to the root file, or at the manifest project's path.
    let manifest_dir = manifest_dir.or_else(|| {
        let mp_path = doc.self_path.as_ref().or(opts.manifest_path.as_ref())?;
        let topdir = opts.topdir.as_ref()?;
        Some(paths::canon_path(&topdir.join(mp_path)))
    });

    let mut resolver = Resolver {
        topdir: opts.topdir.as_deref().map(paths::canon_path),
        manifest_dir,
        mode: opts.mode,
        importer,
        projects: Vec::new(),
        by_name: HashMap::new(),
        path_owners: HashMap::new(),
        top_filter: Vec::new(),
        self_filters: Vec::new(),
        project_filters: Vec::new(),
        legacy: doc.legacy_group_filter,
        legacy_warned: false,
        has_imports: false,
    };

    let version = doc.version.clone();
    resolver.resolve_root(doc, opts.manifest_path.clone())?;

    let group_filter = resolver.final_group_filter();
    Ok(Manifest {
        projects: resolver.projects,
        group_filter,
        schema_version: version.unwrap_or_else(|| SCHEMA_VERSION.to_string()),
        topdir: opts.topdir.clone(),
        path: file.map(Path::to_path_buf),
        has_imports: resolver.has_imports,
    })
}

impl Resolver<'_> {
    fn resolve_root(
        &mut self,
        doc: RawDocument,
        manifest_path_hint: Option<String>,
    ) -> Result<(), ManifestError> {
        self.top_filter = doc.group_filter.clone();
        if self.legacy && !self.top_filter.is_empty() {
            self.warn_legacy();
        }

        let mp_path = doc.self_path.clone().or(manifest_path_hint);
        let mut mp = Project::manifest_project(mp_path, self.topdir.clone());
        mp.west_commands = doc.self_west_commands.clone();
        if let Some(path) = &mp.path {
            self.path_owners.insert(path.clone(), mp.name.clone());
        }
        self.by_name.insert(mp.name.clone(), 0);
        self.projects.push(mp);

        let mut layers: Vec<Frame> = Vec::new();
        self.process_doc(
            doc,
            &mut layers,
            Ctx { depth: 0, bucket: Bucket::Root, source: Source::ManifestRepo, sink: 0 },
            true,
        )
    }

    fn process_doc(
        &mut self,
        doc: RawDocument,
        layers: &mut Vec<Frame>,
        ctx: Ctx,
        is_root: bool,
    ) -> Result<(), ManifestError> {
        if !is_root {
            self.record_imported_filter(doc.group_filter.clone(), ctx.bucket);
            // Extension-command files declared by an imported document
            // live in the repository it was imported from; credit them
            // to that project, after anything it already has.
            self.projects[ctx.sink]
                .west_commands
                .extend(doc.self_west_commands.iter().cloned());
        }

        if let Some(import) = &doc.self_import {
            self.has_imports = true;
            if self.mode.follows_self_imports() {
                let bucket = if ctx.bucket == Bucket::Root {
                    Bucket::SelfImport
                } else {
                    ctx.bucket
                };
                self.recurse_entries(import.clone(), layers, Ctx { bucket, ..ctx }, true)?;
            }
        }

        for raw in doc.projects {
            self.emit_project(raw, layers, &ctx)?;
        }
        Ok(())
    }

    fn emit_project(
        &mut self,
        raw: RawProject,
        layers: &mut Vec<Frame>,
        ctx: &Ctx,
    ) -> Result<(), ManifestError> {
        // A mapping import carries this project's own filter and prefix.
        let own_frame = match &raw.import {
            Some(Import::Map(map)) => {
                let mut reasons = Vec::new();
                match Frame::from_map(map, &mut reasons) {
                    Some(frame) => {
                        self.check_prefix(&map.path_prefix)?;
                        Some(frame)
                    }
                    None => return Err(ManifestError::Malformed { reasons }),
                }
            }
            _ => None,
        };

        // Work the path outward: the project's own prefix first, then
        // each enclosing frame's filter and prefix in turn.
        let mut rel = PathBuf::from(&raw.path);
        if let Some(frame) = &own_frame {
            rel = frame.prefix.join(&rel);
        }
        let mut allowed = true;
        for layer in layers.iter().rev() {
            if allowed && !layer.allows(&raw.name, &posix_rel(&rel)) {
                debug!(project = %raw.name, "filtered out by import frame");
                allowed = false;
            }
            rel = layer.prefix.join(&rel);
        }
        let full_path = posix_rel(&rel);
        self.check_escape(&raw.name, &full_path)?;

        let duplicate = self.by_name.contains_key(&raw.name);
        if duplicate {
            debug!(project = %raw.name, "skipping duplicate project");
        }

        if allowed && !duplicate {
            if let Some(owner) = self.path_owners.get(&full_path) {
                return Err(ManifestError::malformed(format!(
                    "projects \"{owner}\" and \"{}\" have the same path \"{full_path}\"",
                    raw.name
                )));
            }
            self.path_owners.insert(full_path.clone(), raw.name.clone());
            self.by_name.insert(raw.name.clone(), self.projects.len());
            self.projects.push(Project {
                name: raw.name.clone(),
                url: raw.url,
                revision: raw.revision,
                path: Some(full_path),
                topdir: self.topdir.clone(),
                remote_name: raw.remote_name.unwrap_or_else(|| "origin".to_string()),
                clone_depth: raw.clone_depth,
                west_commands: raw.west_commands,
                groups: raw.groups,
                userdata: raw.userdata,
                submodules: raw.submodules,
            });
        }

        if let Some(import) = raw.import {
            if !matches!(import, Import::Bool(false)) {
                self.has_imports = true;
                if self.mode.follows_project_imports() {
                    // Imports of a dropped duplicate still resolve, against
                    // the project that won the name.
                    let Some(&target) = self.by_name.get(&raw.name) else {
                        return Ok(());
                    };
                    self.recurse_entries(
                        import,
                        layers,
                        Ctx {
                            depth: ctx.depth,
                            bucket: Bucket::ProjectImport,
                            source: Source::Project(target),
                            sink: target,
                        },
                        false,
                    )?;
                }
            }
        }
        Ok(())
    }

    // Resolves one import value (any shape) into its documents and
    // recurses into each.
    fn recurse_entries(
        &mut self,
        import: Import,
        layers: &mut Vec<Frame>,
        ctx: Ctx,
        self_import: bool,
    ) -> Result<(), ManifestError> {
        let entries: Vec<(String, Option<ImportMap>)> = match import {
            Import::Bool(false) => return Ok(()),
            Import::Bool(true) => vec![(DEFAULT_MANIFEST_FILE.to_string(), None)],
            Import::Path(file) => vec![(file, None)],
            Import::Paths(files) => files.into_iter().map(|f| (f, None)).collect(),
            Import::Map(map) => vec![(map.file.clone(), Some(map))],
        };

        for (file, map) in entries {
            if ctx.depth + 1 > MAX_IMPORT_DEPTH {
                return Err(ManifestError::ImportDepth { file, limit: MAX_IMPORT_DEPTH });
            }
            let frame = match &map {
                Some(map) => {
                    let mut reasons = Vec::new();
                    let frame = Frame::from_map(map, &mut reasons)
                        .ok_or(ManifestError::Malformed { reasons })?;
                    self.check_prefix(&map.path_prefix)?;
                    frame
                }
                None => Frame::default(),
            };

            debug!(file = %file, depth = ctx.depth + 1, "resolving import");
            for (name, content) in self.read_entry(ctx.source, &file, self_import)? {
                let sub = parse_document(&content, Some(Path::new(&name)))?;
                layers.push(frame.clone());
                let result = self.process_doc(sub, layers, Ctx { depth: ctx.depth + 1, ..ctx }, false);
                layers.pop();
                result?;
            }
        }
        Ok(())
    }

    // Reads one import entry as a list of (name, content) documents.
    fn read_entry(
        &mut self,
        source: Source,
        file: &str,
        self_import: bool,
    ) -> Result<Vec<(String, String)>, ManifestError> {
        match source {
            Source::ManifestRepo if self_import => self.read_from_manifest_repo(file),
            Source::ManifestRepo => {
                // Project imports never read from the manifest repo; the
                // source is set per project before recursing.
                unreachable!("project imports always carry a project source")
            }
            Source::Project(index) => {
                let project = self.projects[index].clone();
                let Some(importer) = self.importer.as_deref_mut() else {
                    return Err(ManifestError::ImportFailed {
                        project: project.name,
                        file: file.to_string(),
                        reason: "no importer is available".to_string(),
                    });
                };
                match importer.import_from(&project, file)? {
                    ImportedContent::File(content) => Ok(vec![(file.to_string(), content)]),
                    ImportedContent::Directory(entries) => Ok(entries),
                }
            }
        }
    }

    fn read_from_manifest_repo(&self, file: &str) -> Result<Vec<(String, String)>, ManifestError> {
        let Some(dir) = &self.manifest_dir else {
            return Err(ManifestError::malformed(format!(
                "self: import: \"{file}\" cannot be resolved without a workspace"
            )));
        };
        let target = dir.join(file);
        if target.is_dir() {
            let mut names: Vec<String> = fs::read_dir(&target)
                .map_err(|source| ManifestError::Io { path: target.clone(), source })?
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.path().is_file())
                .filter_map(|entry| entry.file_name().into_string().ok())
                .filter(|name| name.ends_with(".yml"))
                .collect();
            names.sort();
            names
                .into_iter()
                .map(|name| {
                    let path = target.join(&name);
                    fs::read_to_string(&path)
                        .map(|content| (name, content))
                        .map_err(|source| ManifestError::Io { path, source })
                })
                .collect()
        } else if target.is_file() {
            let content = fs::read_to_string(&target)
                .map_err(|source| ManifestError::Io { path: target.clone(), source })?;
            Ok(vec![(file.to_string(), content)])
        } else {
            Err(ManifestError::malformed(format!(
                "self: import: file \"{file}\" not found in the manifest repository"
            )))
        }
    }

    fn check_prefix(&self, prefix: &str) -> Result<(), ManifestError> {
        if prefix.is_empty() {
            return Ok(());
        }
        if Path::new(prefix).is_absolute() || escapes_relative(prefix) {
            return Err(ManifestError::malformed(format!(
                "import path-prefix \"{prefix}\" escapes the workspace topdir"
            )));
        }
        Ok(())
    }

    fn check_escape(&self, name: &str, rel: &str) -> Result<(), ManifestError> {
        let escaped = match &self.topdir {
            Some(topdir) => paths::escapes_directory(&topdir.join(rel), topdir),
            None => escapes_relative(rel),
        };
        if escaped {
            Err(ManifestError::malformed(format!(
                "project \"{name}\": path \"{rel}\" escapes the workspace topdir"
            )))
        } else {
            Ok(())
        }
    }

    fn record_imported_filter(&mut self, filter: Vec<String>, bucket: Bucket) {
        if filter.is_empty() {
            return;
        }
        if self.legacy {
            // 0.9 semantics: only the root document's filter counts.
            self.warn_legacy();
            return;
        }
        match bucket {
            Bucket::SelfImport => self.self_filters.push(filter),
            Bucket::ProjectImport => self.project_filters.push(filter),
            Bucket::Root => {}
        }
    }

    fn warn_legacy(&mut self) {
        if !self.legacy_warned {
            warn!(
                "the 0.9 manifest schema ignores imported group-filter values; \
                 declare \"version: \\\"0.10\\\"\" or later for composed filters"
            );
            self.legacy_warned = true;
        }
    }

    // The composed filter is a last-sign-wins concatenation in
    // ascending precedence: later project imports, earlier project
    // imports, the root document, then self-imports the same way.
    fn final_group_filter(&self) -> Vec<String> {
        if self.legacy {
            return self.top_filter.clone();
        }
        let mut concatenated: Vec<Vec<String>> = Vec::new();
        concatenated.extend(self.project_filters.iter().rev().cloned());
        concatenated.push(self.top_filter.clone());
        concatenated.extend(self.self_filters.iter().rev().cloned());
        groups::simplify(&concatenated)
    }
}
