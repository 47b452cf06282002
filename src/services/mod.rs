pub mod archive;
pub mod broker;
pub mod build;
pub mod scaffold;
pub mod watcher;

pub use archive::{Archiver, archive_service};
pub use broker::Broker;
pub use build::{
    ServiceBuildOpts, build_image_from_manifest, build_service_from_manifest,
    render_manifest_files,
};
pub use scaffold::{ScaffoldOpts, generate_service};
pub use watcher::{CancelToken, WatchConfig, WatchOutcome, Watcher, watch_service};
