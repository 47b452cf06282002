use crate::domain::WorkspaceManifest;
use crate::domain::workspace::{DEFAULT_WORKSPACE_MANIFEST, WORKSPACE_DIR, WORKSPACE_MANIFEST};
use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Upward search state for locating the operator's `.stagehand`
/// workspace directory.
///
/// Holds the set of already-rejected directories and the hit, threaded
/// through calls instead of living in process-wide state.
#[derive(Debug, Default)]
pub struct DiscoveryContext {
    dead_paths: Vec<PathBuf>,
    found: Option<PathBuf>,
}

impl DiscoveryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn found(&self) -> Option<&Path> {
        self.found.as_deref()
    }

    fn is_dead(&self, path: &Path) -> bool {
        self.dead_paths.iter().any(|dead| dead == path)
    }

    /// Search `path` and its ancestors for a workspace directory.
    pub fn find_from_path(&mut self, path: &Path) -> Result<PathBuf> {
        let mut current = path.to_path_buf();
        loop {
            if !self.is_dead(&current) {
                let candidate = current.join(WORKSPACE_DIR);
                if candidate.is_dir() {
                    self.found = Some(candidate.clone());
                    return Ok(candidate);
                }
                debug!("no workspace in {:?}", current);
                self.dead_paths.push(current.clone());
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => bail!("no '{}' directory above {:?}", WORKSPACE_DIR, path),
            }
        }
    }

    /// Search each starting path in turn, first hit wins.
    pub fn find_from_paths(&mut self, paths: &[PathBuf]) -> Result<PathBuf> {
        for path in paths {
            if let Ok(found) = self.find_from_path(path) {
                return Ok(found);
            }
        }
        bail!("no '{}' directory in any of {:?}", WORKSPACE_DIR, paths)
    }

    /// Search upward from the working directory, then from the
    /// operator's home.
    pub fn find(&mut self) -> Result<PathBuf> {
        let mut starts = vec![std::env::current_dir().context("resolving working directory")?];
        if let Ok(home) = std::env::var("HOME") {
            starts.push(PathBuf::from(home));
        }
        self.find_from_paths(&starts)
    }
}

/// Create a fresh workspace under `parent` with the default manifest.
pub fn generate_workspace(parent: &Path) -> Result<PathBuf> {
    let workspace = parent.join(WORKSPACE_DIR);
    fs::create_dir_all(&workspace)
        .with_context(|| format!("creating workspace {:?}", workspace))?;

    let manifest = workspace.join(WORKSPACE_MANIFEST);
    fs::write(&manifest, DEFAULT_WORKSPACE_MANIFEST)
        .with_context(|| format!("writing {:?}", manifest))?;
    info!("generated workspace at {:?}", workspace);
    Ok(workspace)
}

/// Locate the workspace manifest, generating a default one in the
/// working directory when none is found.
pub fn load_or_init_workspace(ctx: &mut DiscoveryContext) -> Result<WorkspaceManifest> {
    let workspace = match ctx.find() {
        Ok(found) => found,
        Err(_) => {
            let cwd = std::env::current_dir().context("resolving working directory")?;
            generate_workspace(&cwd)?
        }
    };
    WorkspaceManifest::load(workspace.join(WORKSPACE_MANIFEST))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn finds_workspace_in_ancestor() {
        let tmp = TempDir::new().unwrap();
        let workspace = generate_workspace(tmp.path()).unwrap();
        let nested = tmp.path().join("services/demo");
        fs::create_dir_all(&nested).unwrap();

        let mut ctx = DiscoveryContext::new();
        let found = ctx.find_from_path(&nested).unwrap();
        assert_eq!(found, workspace);
        assert_eq!(ctx.found(), Some(workspace.as_path()));
        // The rejected intermediate directories are remembered.
        assert!(ctx.dead_paths.contains(&nested));
    }

    #[test]
    fn first_start_path_with_a_workspace_wins() {
        let tmp = TempDir::new().unwrap();
        let with = tmp.path().join("ws");
        fs::create_dir_all(&with).unwrap();
        let workspace = generate_workspace(&with).unwrap();

        let mut ctx = DiscoveryContext::new();
        let found = ctx.find_from_paths(&[with.clone(), tmp.path().to_path_buf()]).unwrap();
        assert_eq!(found, workspace);
    }

    #[test]
    fn generated_workspace_loads() {
        let tmp = TempDir::new().unwrap();
        let workspace = generate_workspace(tmp.path()).unwrap();
        let manifest = WorkspaceManifest::load(workspace.join(WORKSPACE_MANIFEST)).unwrap();
        assert_eq!(manifest.data_name, "data.db");
        assert_eq!(
            manifest.services_path().unwrap(),
            tmp.path().join("services")
        );
    }
}
