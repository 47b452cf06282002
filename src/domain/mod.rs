pub mod manifest;
pub mod records;
pub mod traits;
pub mod workspace;

pub use manifest::{ArchiveTarget, ServiceManifest};
pub use records::{ContainerRecord, ImageRecord};
pub use traits::{
    BuildRequest, ContainerConfig, ContainerRuntime, ContainerStatus, HostConfig, PortSpec,
};
pub use workspace::WorkspaceManifest;
