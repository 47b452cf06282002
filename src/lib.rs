pub mod cli;
pub mod domain;
pub mod infra;
pub mod services;

// Make test_support available for integration tests
pub mod test_support;

pub use domain::{
    ContainerRecord, ContainerRuntime, ContainerStatus, ImageRecord, ServiceManifest,
    WorkspaceManifest,
};
pub use infra::{CatalogStore, ContainerQuery, DockerAdapter, ImageQuery};
pub use services::{Broker, CancelToken, WatchConfig, WatchOutcome};
