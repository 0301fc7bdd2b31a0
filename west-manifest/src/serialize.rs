//! Serialization of resolved manifests.
//!
//! `as_dict`/`as_yaml` render the resolved, defaults-applied view with
//! stable key order. The frozen variants additionally pin every project
//! revision to its `manifest-rev` SHA, which requires every project to
//! be cloned.

use serde_yaml::{Mapping, Value};

use west_core::git::Git;

use crate::error::ManifestError;
use crate::project::Project;
use crate::resolver::Manifest;
use crate::SCHEMA_VERSION;

impl Manifest {
    /// The resolved manifest as an ordered mapping (the `manifest:`
    /// section only).
    pub fn as_dict(&self) -> Mapping {
        self.to_dict(None)
    }

    /// [`Manifest::as_dict`] serialized as YAML.
    pub fn as_yaml(&self) -> String {
        render(self.as_dict())
    }

    /// Like [`Manifest::as_dict`], with every project revision replaced
    /// by its `manifest-rev` SHA.
    pub fn as_frozen_dict(&self, git: &Git) -> Result<Mapping, ManifestError> {
        let mut frozen = Vec::new();
        for project in self.projects.iter().skip(1) {
            if !project.is_cloned(git) {
                return Err(ManifestError::CannotFreeze {
                    project: project.name.clone(),
                    reason: "project is not cloned".to_string(),
                });
            }
            let sha = project.manifest_rev_sha(git).map_err(|err| {
                ManifestError::CannotFreeze {
                    project: project.name.clone(),
                    reason: err.to_string(),
                }
            })?;
            frozen.push(sha);
        }
        Ok(self.to_dict(Some(&frozen)))
    }

    /// [`Manifest::as_frozen_dict`] serialized as YAML.
    pub fn as_frozen_yaml(&self, git: &Git) -> Result<String, ManifestError> {
        Ok(render(self.as_frozen_dict(git)?))
    }

    fn to_dict(&self, frozen_revisions: Option<&[String]>) -> Mapping {
        let mut manifest = Mapping::new();

        // Frozen output always records the schema version it was
        // produced under; plain output only echoes an explicit request.
        if frozen_revisions.is_some() {
            manifest.insert("version".into(), SCHEMA_VERSION.into());
        } else if self.schema_version != SCHEMA_VERSION {
            manifest.insert("version".into(), self.schema_version.clone().into());
        }

        if !self.group_filter.is_empty() {
            manifest.insert("group-filter".into(), str_seq(&self.group_filter));
        }

        let projects: Vec<Value> = self
            .projects
            .iter()
            .skip(1)
            .enumerate()
            .map(|(i, p)| project_dict(p, frozen_revisions.map(|shas| shas[i].as_str())))
            .collect();
        manifest.insert("projects".into(), Value::Sequence(projects));

        let mp = self.manifest_project();
        let mut self_map = Mapping::new();
        if let Some(path) = &mp.path {
            self_map.insert("path".into(), path.clone().into());
        }
        if !mp.west_commands.is_empty() {
            self_map.insert("west-commands".into(), str_seq(&mp.west_commands));
        }
        if !self_map.is_empty() {
            manifest.insert("self".into(), Value::Mapping(self_map));
        }

        let mut root = Mapping::new();
        root.insert("manifest".into(), Value::Mapping(manifest));
        root
    }
}

fn project_dict(project: &Project, frozen_revision: Option<&str>) -> Value {
    let mut map = Mapping::new();
    map.insert("name".into(), project.name.clone().into());
    map.insert("url".into(), project.url.clone().into());
    let revision = frozen_revision.unwrap_or(&project.revision);
    map.insert("revision".into(), revision.to_string().into());
    if let Some(path) = &project.path {
        map.insert("path".into(), path.clone().into());
    }
    if let Some(depth) = project.clone_depth {
        map.insert("clone-depth".into(), Value::from(depth));
    }
    if !project.west_commands.is_empty() {
        map.insert("west-commands".into(), str_seq(&project.west_commands));
    }
    if !project.groups.is_empty() {
        map.insert("groups".into(), str_seq(&project.groups));
    }
    if let Some(submodules) = &project.submodules {
        map.insert("submodules".into(), submodules.clone());
    }
    if let Some(userdata) = &project.userdata {
        map.insert("userdata".into(), userdata.clone());
    }
    Value::Mapping(map)
}

fn str_seq(items: &[String]) -> Value {
    Value::Sequence(items.iter().map(|s| Value::from(s.clone())).collect())
}

fn render(mapping: Mapping) -> String {
    serde_yaml::to_string(&Value::Mapping(mapping)).unwrap_or_default()
}
