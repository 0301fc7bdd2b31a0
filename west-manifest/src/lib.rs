//! The west manifest model: parsing, import resolution, group filters,
//! and serialization.
//!
//! A manifest is a YAML document whose `manifest:` section declares
//! projects (git repositories pinned to revisions), remotes they fetch
//! from, an optional schema version, group filters, and imports pulling
//! in further manifests from files in the manifest repository or from
//! other projects at their pinned revision. Resolution flattens the
//! whole tree into one deterministic, ordered projects list.

pub mod error;
pub mod groups;
pub mod import;
pub mod project;
pub mod resolver;
pub mod schema;
mod serialize;

pub use error::ManifestError;
pub use import::{Import, ImportMap};
pub use project::{Project, Remote};
pub use resolver::{
    GitImporter, ImportMode, ImportedContent, LoadOptions, Manifest, ManifestImporter,
    read_project_manifest,
};

/// Reserved name of the manifest repository's own project entry.
pub const MANIFEST_PROJECT_NAME: &str = "manifest";

/// The branch each project's pinned revision is kept on.
pub const MANIFEST_REV_BRANCH: &str = "manifest-rev";

/// Fully qualified form of [`MANIFEST_REV_BRANCH`].
pub const QUAL_MANIFEST_REV: &str = "refs/heads/manifest-rev";

/// Legacy scratch ref namespace, cleared on every update.
pub const QUAL_REFS_WEST: &str = "refs/west/";

/// Default manifest file name, also what `import: true` means.
pub const DEFAULT_MANIFEST_FILE: &str = "west.yml";

/// Revision used when neither a project nor the defaults name one.
pub const DEFAULT_REVISION: &str = "master";

/// The manifest schema version this implementation supports.
pub const SCHEMA_VERSION: &str = "1.0";

/// Import recursion limit; exceeding it signals an import loop.
pub const MAX_IMPORT_DEPTH: usize = 8;
