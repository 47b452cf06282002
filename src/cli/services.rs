use crate::cli::ManifestArgs;
use crate::domain::WorkspaceManifest;
use crate::infra::ContainerQuery;
use crate::services::{Broker, ScaffoldOpts, ServiceBuildOpts};
use anyhow::Result;
use clap::{Args, Subcommand};
use std::io;
use uuid::Uuid;

#[derive(Args)]
pub struct ServicesCommand {
    #[command(subcommand)]
    command: ServicesAction,
}

#[derive(Subcommand)]
enum ServicesAction {
    /// Create a new service definition skeleton
    Init {
        /// Name of the service to be created
        #[arg(short = 'N', long)]
        name: String,

        /// Version the new service is meant for
        #[arg(short = 'X', long, default_value = "0.1.0")]
        service_version: String,

        /// Local volume path seeded into the starter manifest
        #[arg(short = 'v', long, default_value = ".")]
        local_volume: String,

        #[command(flatten)]
        manifest: ManifestArgs,
    },
    /// Build and register a container from a built image
    Build {
        #[command(flatten)]
        manifest: ManifestArgs,

        /// Name of the service to be created
        #[arg(short = 'N', long)]
        name: Option<String>,

        /// Additional ports to expose on service initialization
        #[arg(short = 'p', long = "publish")]
        publish: Vec<String>,

        /// Service image tag name to create the service from
        #[arg(short = 't', long, default_value = "latest")]
        image_tag: String,

        /// The output directory where service assets are managed
        #[arg(short = 'v', long, default_value = "server")]
        local_volume: String,
    },
    /// List catalogued service containers with their live status
    List {
        /// Container uuid
        #[arg(short = 'I', long)]
        uuid: Option<Uuid>,

        /// Name of the container
        #[arg(short = 'N', long)]
        name: Option<String>,

        /// Runtime id of the container
        #[arg(short = 'i', long)]
        id: Option<String>,

        /// Max number of items to return
        #[arg(short = 'l', long, default_value_t = 0)]
        limit: u32,
    },
    /// Archive the service's declared asset targets
    Archive {
        #[command(flatten)]
        manifest: ManifestArgs,
    },
}

pub fn run(cmd: ServicesCommand, workspace: &WorkspaceManifest) -> Result<()> {
    let broker = Broker::open(workspace)?;

    match cmd.command {
        ServicesAction::Init {
            name,
            service_version,
            local_volume,
            manifest,
        } => {
            let mut opts = ScaffoldOpts::new(&name, &service_version, manifest.services_path(workspace)?);
            opts.local_volume = local_volume;
            let dir = broker.new_service(&opts)?;
            println!("{}", dir.display());
            Ok(())
        }
        ServicesAction::Build {
            manifest,
            name,
            publish,
            image_tag,
            local_volume,
        } => {
            let mut manifest = manifest.load(workspace)?;
            manifest.ports.extend(publish);
            if manifest.local_volume.as_deref().unwrap_or_default().is_empty() {
                manifest.local_volume = Some(local_volume);
            }

            let opts = ServiceBuildOpts {
                service_name: name,
                tag_name: image_tag,
            };
            broker.build_service(&manifest, &opts, &mut io::stdout())?;
            Ok(())
        }
        ServicesAction::List {
            uuid,
            name,
            id,
            limit,
        } => {
            let query = ContainerQuery {
                uuid,
                name,
                runtime_id: id,
                limit,
            };
            broker.list_services(&mut io::stdout(), &query)
        }
        ServicesAction::Archive { manifest } => {
            let manifest = manifest.load(workspace)?;
            for written in broker.archive_service(&manifest)? {
                println!("{}", written.display());
            }
            Ok(())
        }
    }
}
