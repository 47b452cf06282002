use crate::domain::{ContainerRecord, ContainerRuntime, ServiceManifest, WorkspaceManifest};
use crate::infra::{CatalogStore, ContainerQuery, DockerAdapter, ImageQuery};
use crate::services::archive::archive_service;
use crate::services::build::{
    ServiceBuildOpts, build_image_from_manifest, build_service_from_manifest,
    render_manifest_files,
};
use crate::services::scaffold::{ScaffoldOpts, generate_service};
use crate::services::watcher::{CancelToken, WatchConfig, WatchOutcome, watch_service};
use anyhow::{Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

/// Composes one runtime handle and one catalog handle behind a single
/// object. Every command implementation goes through here.
pub struct Broker {
    runtime: Arc<dyn ContainerRuntime>,
    store: CatalogStore,
}

impl Broker {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, store: CatalogStore) -> Self {
        Self { runtime, store }
    }

    /// Open a broker against the workspace's catalog and the local
    /// container runtime, creating the catalog tables if missing.
    pub fn open(workspace: &WorkspaceManifest) -> Result<Self> {
        let store = CatalogStore::open(workspace.data_source())
            .with_context(|| format!("opening catalog {:?}", workspace.data_source()))?;
        let broker = Self::new(Arc::new(DockerAdapter::new()), store);
        broker.init_catalog()?;
        Ok(broker)
    }

    pub fn init_catalog(&self) -> Result<()> {
        self.store
            .init_tables()
            .context("initializing catalog tables")
    }

    /// Render the manifest's template assets, then build and catalogue
    /// the image. The build log streams into `out`.
    pub fn build_image(&self, manifest: &ServiceManifest, out: &mut dyn Write) -> Result<()> {
        render_manifest_files(manifest)?;
        build_image_from_manifest(self.runtime.as_ref(), &self.store, manifest, out)?;
        Ok(())
    }

    /// Create a service container from the manifest, catalogue it, and
    /// report its name and runtime id on `out`.
    pub fn build_service(
        &self,
        manifest: &ServiceManifest,
        opts: &ServiceBuildOpts,
        out: &mut dyn Write,
    ) -> Result<ContainerRecord> {
        let record = build_service_from_manifest(self.runtime.as_ref(), &self.store, manifest, opts)?;

        write!(out, "{}", record.name)?;
        if !record.runtime_id.is_empty() {
            write!(out, " - {}", record.runtime_id)?;
        }
        writeln!(out)?;
        Ok(record)
    }

    /// Print every catalogued image, one tab-separated line per record.
    pub fn list_images(&self, out: &mut dyn Write, query: &ImageQuery) -> Result<()> {
        let records = self.store.find_images(query).context("listing images")?;
        for record in records {
            writeln!(
                out,
                "{}\t{}\t{}\t{}\t{}",
                record.uuid, record.name, record.tag, record.runtime_id, record.is_available
            )?;
        }
        Ok(())
    }

    /// Print catalogued containers with their live runtime status.
    pub fn list_services(&self, out: &mut dyn Write, query: &ContainerQuery) -> Result<()> {
        let records = self
            .store
            .find_containers(query)
            .context("listing services")?;
        for record in records {
            let status = self.container_status(&record);
            writeln!(
                out,
                "{}\t{}\t{}\t{}",
                record.uuid, record.name, record.runtime_id, status
            )?;
        }
        Ok(())
    }

    /// The live status of a catalogued container. A container the
    /// runtime cannot inspect reports as "unknown" rather than failing
    /// the whole listing.
    fn container_status(&self, record: &ContainerRecord) -> String {
        match self.runtime.inspect_container(&record.runtime_id) {
            Ok(status) => status.status,
            Err(_) => "unknown".to_string(),
        }
    }

    /// Supervise a catalogued container by name until it stops or the
    /// watch is cancelled.
    pub fn watch(
        &self,
        name: &str,
        token: &CancelToken,
        config: WatchConfig,
    ) -> Result<WatchOutcome> {
        watch_service(self.runtime.as_ref(), &self.store, name, token, config)
    }

    /// Generate a new service skeleton.
    pub fn new_service(&self, opts: &ScaffoldOpts) -> Result<PathBuf> {
        generate_service(opts)
    }

    /// Archive the manifest's declared targets.
    pub fn archive_service(&self, manifest: &ServiceManifest) -> Result<Vec<PathBuf>> {
        archive_service(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockRuntime, exited_err};
    use std::sync::Arc;

    fn broker_with(runtime: Arc<MockRuntime>) -> Broker {
        let store = CatalogStore::open_in_memory().unwrap();
        let broker = Broker::new(runtime, store);
        broker.init_catalog().unwrap();
        broker
    }

    #[test]
    fn build_service_reports_name_and_id() {
        let runtime = Arc::new(MockRuntime::new());
        let broker = broker_with(runtime.clone());

        let manifest = ServiceManifest::loads(
            "/services/demo/service.yaml",
            "name: demo\nversion: \"1.2\"\ntags: [\"{{.Name}}:latest\"]\n",
        )
        .unwrap();

        let mut out = Vec::new();
        let record = broker
            .build_service(&manifest, &ServiceBuildOpts::default(), &mut out)
            .unwrap();

        assert_eq!(record.name, "service-demo-1.2");
        let line = String::from_utf8(out).unwrap();
        assert_eq!(line, "service-demo-1.2 - ctr-1\n");
    }

    #[test]
    fn list_services_reports_unknown_on_inspect_failure() {
        let runtime = Arc::new(MockRuntime::new());
        let broker = broker_with(runtime.clone());

        let alive = ContainerRecord::new("alive", "ctr-alive");
        let gone = ContainerRecord::new("gone", "ctr-gone");
        broker.store.put(&[alive, gone]).unwrap();

        runtime.push_inspect("ctr-alive", exited_err("oom"));
        runtime.push_inspect_error("ctr-gone", "no such container");

        let mut out = Vec::new();
        broker
            .list_services(&mut out, &ContainerQuery::default())
            .unwrap();

        let listing = String::from_utf8(out).unwrap();
        assert!(listing.contains("alive\tctr-alive\texited"));
        assert!(listing.contains("gone\tctr-gone\tunknown"));
    }
}
