use crate::domain::manifest::render_template;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const WORKSPACE_DIR: &str = ".stagehand";
pub const WORKSPACE_MANIFEST: &str = "stagehand.yaml";

pub const DEFAULT_WORKSPACE_MANIFEST: &str =
    "data-name: \"data.db\"\nservices-path: \"{{.ProjectDir}}/services\"\n";

/// Operator-level workspace settings, loaded from
/// `.stagehand/stagehand.yaml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct WorkspaceManifest {
    #[serde(skip)]
    manifest_dir: PathBuf,
    #[serde(skip)]
    project_dir: PathBuf,
    /// File name of the catalog database, relative to the workspace dir.
    pub data_name: String,
    /// Root of the service definitions tree. Template; may reference
    /// `{{.ProjectDir}}`.
    pub services_path: String,
}

impl Default for WorkspaceManifest {
    fn default() -> Self {
        Self {
            manifest_dir: PathBuf::new(),
            project_dir: PathBuf::new(),
            data_name: "data.db".to_string(),
            services_path: "{{.ProjectDir}}/services".to_string(),
        }
    }
}

impl WorkspaceManifest {
    /// Load from an already-read buffer. `path` is the manifest file
    /// path; the project dir defaults to the workspace dir's parent.
    pub fn loads(path: impl AsRef<Path>, data: &str) -> Result<Self> {
        let path = path.as_ref();
        let mut manifest: WorkspaceManifest = serde_yml::from_str(data)
            .with_context(|| format!("parsing workspace manifest {:?}", path))?;

        manifest.manifest_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        manifest.project_dir = manifest
            .manifest_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(manifest)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading workspace manifest {:?}", path))?;
        Self::loads(path, &data)
    }

    /// The `.stagehand` directory this manifest was loaded from.
    pub fn manifest_dir(&self) -> &Path {
        &self.manifest_dir
    }

    /// Path to the catalog database file.
    pub fn data_source(&self) -> PathBuf {
        self.manifest_dir.join(&self.data_name)
    }

    /// Resolve the service definitions root.
    pub fn services_path(&self) -> Result<PathBuf> {
        let context = HashMap::from([(
            "ProjectDir",
            self.project_dir.to_string_lossy().into_owned(),
        )]);
        let rendered = render_template(&self.services_path, &context)?;
        Ok(PathBuf::from(shellexpand::tilde(&rendered).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn services_path_renders_project_dir() {
        let manifest = WorkspaceManifest::loads(
            "/home/op/project/.stagehand/stagehand.yaml",
            DEFAULT_WORKSPACE_MANIFEST,
        )
        .unwrap();
        assert_eq!(
            manifest.services_path().unwrap(),
            PathBuf::from("/home/op/project/services")
        );
        assert_eq!(
            manifest.data_source(),
            PathBuf::from("/home/op/project/.stagehand/data.db")
        );
    }

    #[test]
    fn explicit_services_path_wins() {
        let manifest = WorkspaceManifest::loads(
            "/ws/.stagehand/stagehand.yaml",
            "data-name: catalog.db\nservices-path: /srv/services\n",
        )
        .unwrap();
        assert_eq!(manifest.services_path().unwrap(), PathBuf::from("/srv/services"));
        assert_eq!(manifest.data_source(), PathBuf::from("/ws/.stagehand/catalog.db"));
    }
}
