use crate::domain::{ContainerRecord, ContainerRuntime, ImageRecord, ServiceManifest};
use crate::infra::CatalogStore;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Operator-tunable knobs for creating a service container.
#[derive(Debug, Clone)]
pub struct ServiceBuildOpts {
    /// Explicit container name; derived from the manifest when unset.
    pub service_name: Option<String>,
    /// Requested image tag, matched as a substring of the resolved tags.
    pub tag_name: String,
}

impl Default for ServiceBuildOpts {
    fn default() -> Self {
        Self {
            service_name: None,
            tag_name: "latest".to_string(),
        }
    }
}

/// Build an image from a manifest and catalogue one record per
/// resolved tag.
///
/// The build log streams verbatim into `out`. The first failing step
/// aborts the remainder; records are only catalogued after every tag
/// resolved to a runtime image id.
pub fn build_image_from_manifest(
    runtime: &dyn ContainerRuntime,
    store: &CatalogStore,
    manifest: &ServiceManifest,
    out: &mut dyn Write,
) -> Result<Vec<ImageRecord>> {
    let request = manifest.build_request()?;
    info!(
        "building {:?} with tags {:?}",
        manifest.name, request.tags
    );

    runtime.build_image(&request, out)?;
    runtime.prune_images().context("pruning dangling images")?;

    let mut records = Vec::with_capacity(request.tags.len());
    for tag in &request.tags {
        let (name, tag_part) = split_reference(tag);
        let runtime_id = runtime
            .image_id(tag)
            .with_context(|| format!("resolving image id for '{tag}'"))?;
        records.push(ImageRecord::new(name, tag_part, runtime_id));
    }

    store.put(&records).context("cataloguing built images")?;
    Ok(records)
}

/// Create a service container from a manifest and catalogue it.
pub fn build_service_from_manifest(
    runtime: &dyn ContainerRuntime,
    store: &CatalogStore,
    manifest: &ServiceManifest,
    opts: &ServiceBuildOpts,
) -> Result<ContainerRecord> {
    let name = opts
        .service_name
        .clone()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| manifest.service_name());

    let config = manifest.container_config(&opts.tag_name)?;
    let host = manifest.host_config()?;

    let runtime_id = runtime
        .create_container(&name, &config, &host)
        .with_context(|| format!("creating container {name}"))?;
    info!("created container {} as {}", name, runtime_id);

    let record = ContainerRecord::new(name, runtime_id);
    store
        .put(std::slice::from_ref(&record))
        .context("cataloguing service container")?;
    Ok(record)
}

/// Render every `*.tmpl` asset in the manifest directory into its
/// suffix-stripped counterpart.
pub fn render_manifest_files(manifest: &ServiceManifest) -> Result<()> {
    for template in find_template_files(&manifest.manifest_dir())? {
        let data = fs::read_to_string(&template)
            .with_context(|| format!("reading template {:?}", template))?;
        let rendered = manifest
            .render(&data)
            .with_context(|| format!("rendering template {:?}", template))?;

        let target = strip_tmpl_suffix(&template);
        fs::write(&target, rendered).with_context(|| format!("writing {:?}", target))?;
        debug!("rendered {:?} -> {:?}", template, target);
    }
    Ok(())
}

fn find_template_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut templates = Vec::new();
    let entries = fs::read_dir(dir).with_context(|| format!("reading {:?}", dir))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "tmpl") {
            templates.push(path);
        }
    }
    templates.sort();
    Ok(templates)
}

fn strip_tmpl_suffix(path: &Path) -> PathBuf {
    path.with_extension("")
}

/// Split an image reference into `(repository, tag)`, defaulting the
/// tag to `latest`.
fn split_reference(reference: &str) -> (&str, &str) {
    match reference.split_once(':') {
        Some((name, tag)) => (name, tag),
        None => (reference, "latest"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_splits_with_default_tag() {
        assert_eq!(split_reference("demo:1.2"), ("demo", "1.2"));
        assert_eq!(split_reference("demo"), ("demo", "latest"));
    }

    #[test]
    fn tmpl_suffix_stripping() {
        assert_eq!(
            strip_tmpl_suffix(Path::new("/svc/server.properties.tmpl")),
            PathBuf::from("/svc/server.properties")
        );
    }
}
