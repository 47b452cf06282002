use crate::cli::ManifestArgs;
use crate::domain::WorkspaceManifest;
use crate::infra::ImageQuery;
use crate::services::Broker;
use anyhow::Result;
use clap::{Args, Subcommand};
use std::io;
use uuid::Uuid;

#[derive(Args)]
pub struct ImagesCommand {
    #[command(subcommand)]
    command: ImagesAction,
}

#[derive(Subcommand)]
enum ImagesAction {
    /// Build a container image from its service manifest
    Build {
        #[command(flatten)]
        manifest: ManifestArgs,

        /// Build arguments, as <key>=<value> pairs, to pass at construction
        #[arg(short = 'b', long = "build-arg")]
        build_args: Vec<String>,

        /// Build properties, as <key>=<value> pairs, to pass at construction
        #[arg(short = 'P', long = "property")]
        properties: Vec<String>,
    },
    /// List catalogued service images
    List {
        /// Image uuid
        #[arg(short = 'I', long)]
        uuid: Option<Uuid>,

        /// Image name
        #[arg(short = 'N', long)]
        name: Option<String>,

        /// Image tag
        #[arg(short = 't', long)]
        tag: Option<String>,

        /// Max number of items to return
        #[arg(short = 'l', long, default_value_t = 0)]
        limit: u32,
    },
}

pub fn run(cmd: ImagesCommand, workspace: &WorkspaceManifest) -> Result<()> {
    let broker = Broker::open(workspace)?;

    match cmd.command {
        ImagesAction::Build {
            manifest,
            build_args,
            properties,
        } => {
            let mut manifest = manifest.load(workspace)?;
            manifest.apply_property_overrides(&properties);
            manifest.apply_arg_overrides(&build_args);
            broker.build_image(&manifest, &mut io::stdout())
        }
        ImagesAction::List {
            uuid,
            name,
            tag,
            limit,
        } => {
            let query = ImageQuery {
                uuid,
                name,
                tag,
                limit,
                ..ImageQuery::default()
            };
            broker.list_images(&mut io::stdout(), &query)
        }
    }
}
