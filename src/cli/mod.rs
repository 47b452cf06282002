pub mod images;
pub mod services;

use crate::domain::{ServiceManifest, WorkspaceManifest};
use crate::infra::{DiscoveryContext, discovery};
use crate::services::{Broker, CancelToken, WatchConfig};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "stagehand",
    version,
    about = "Build, register, and supervise service containers from declarative manifests"
)]
pub struct Cli {
    /// Catalog file name inside the workspace directory
    #[arg(short = 'd', long, global = true)]
    data_name: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage service images
    Images(images::ImagesCommand),
    /// Manage service containers
    Services(services::ServicesCommand),
    /// Start and watch a service container, restarting it if failure
    /// is detected
    #[command(alias = "start")]
    Watch {
        /// Catalogued container name
        name: String,
    },
}

/// Flags selecting which service manifest a command operates on.
#[derive(Args)]
pub struct ManifestArgs {
    /// Service manifest path, relative to the services root
    #[arg(short = 'M', long, default_value = "")]
    manifest_path: String,

    /// Service manifest file name
    #[arg(short = 'm', long, default_value = "service.yaml")]
    manifest_name: String,

    /// Service definitions path, overriding the workspace setting
    #[arg(short = 'S', long)]
    services_path: Option<PathBuf>,
}

impl ManifestArgs {
    fn services_path(&self, workspace: &WorkspaceManifest) -> Result<PathBuf> {
        match &self.services_path {
            Some(path) => Ok(path.clone()),
            None => workspace.services_path(),
        }
    }

    fn load(&self, workspace: &WorkspaceManifest) -> Result<ServiceManifest> {
        let path = self
            .services_path(workspace)?
            .join(&self.manifest_path)
            .join(&self.manifest_name);
        ServiceManifest::load(path)
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut ctx = DiscoveryContext::new();
    let mut workspace = discovery::load_or_init_workspace(&mut ctx)?;
    if let Some(data_name) = cli.data_name {
        workspace.data_name = data_name;
    }

    match cli.command {
        Commands::Images(cmd) => images::run(cmd, &workspace),
        Commands::Services(cmd) => services::run(cmd, &workspace),
        Commands::Watch { name } => watch(&name, &workspace),
    }
}

fn watch(name: &str, workspace: &WorkspaceManifest) -> Result<()> {
    let broker = Broker::open(workspace)?;

    let token = CancelToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .context("installing interrupt handler")?;

    broker.watch(name, &token, WatchConfig::default())?;
    Ok(())
}
