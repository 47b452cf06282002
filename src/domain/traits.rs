use anyhow::Result;
use std::fmt::Debug;
use std::io::Write;
use std::path::PathBuf;

/// Build request resolved from a service manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Directory whose tree forms the build context.
    pub context_dir: PathBuf,
    /// Dockerfile name, relative to the context directory.
    pub dockerfile: String,
    /// Fully resolved tags to apply to the built image.
    pub tags: Vec<String>,
    /// Rendered build arguments, in manifest declaration order.
    pub build_args: Vec<(String, String)>,
    /// Remove intermediate containers even on failure.
    pub force_remove: bool,
}

/// A single port mapping between the host and the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    pub host_port: Option<u16>,
    pub container_port: u16,
    pub protocol: String,
}

impl PortSpec {
    /// The exposed-port form, e.g. `25565/tcp`.
    pub fn exposed(&self) -> String {
        format!("{}/{}", self.container_port, self.protocol)
    }
}

/// Container configuration passed to the runtime's create call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerConfig {
    pub image: String,
    pub exposed_ports: Vec<PortSpec>,
}

/// Host-side configuration for a container create call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostConfig {
    /// Volume binds, as `host-path:container-path` pairs.
    pub binds: Vec<String>,
    pub port_bindings: Vec<PortSpec>,
}

/// Snapshot of a container's state as reported by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerStatus {
    pub status: String,
    pub running: bool,
    pub error: String,
}

impl ContainerStatus {
    /// The container exited on its own, without a recorded runtime error.
    pub fn is_stopped_ok(&self) -> bool {
        self.status == "exited" && self.error.is_empty()
    }

    /// The container exited with a recorded runtime error.
    pub fn is_stopped_err(&self) -> bool {
        self.status == "exited" && !self.error.is_empty()
    }
}

/// Trait for container runtime operations
pub trait ContainerRuntime: Send + Sync + Debug {
    /// Build an image from a request, streaming the build log to `out`
    fn build_image(&self, request: &BuildRequest, out: &mut dyn Write) -> Result<()>;

    /// Resolve the runtime-assigned image id for an exact tag reference
    fn image_id(&self, reference: &str) -> Result<String>;

    /// Create a container, returning the runtime-assigned identifier
    fn create_container(
        &self,
        name: &str,
        config: &ContainerConfig,
        host: &HostConfig,
    ) -> Result<String>;

    /// Inspect a container by runtime identifier
    fn inspect_container(&self, id: &str) -> Result<ContainerStatus>;

    /// Start a container
    fn start_container(&self, id: &str) -> Result<()>;

    /// Stop a container
    fn stop_container(&self, id: &str) -> Result<()>;

    /// Restart a container
    fn restart_container(&self, id: &str) -> Result<()>;

    /// Prune dangling images left over from prior builds
    fn prune_images(&self) -> Result<()>;
}
