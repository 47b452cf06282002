pub mod discovery;
pub mod docker_adapter;
pub mod store;

pub use discovery::DiscoveryContext;
pub use docker_adapter::DockerAdapter;
pub use store::{CatalogStore, ContainerQuery, ImageQuery, StoreError};
