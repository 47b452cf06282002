use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const STARTER_DOCKERFILE: &str = "\
# Default .Dockerfile
# Define how/what the service should do here.
FROM scratch
WORKDIR /opt/
COPY . .
CMD [ \"sh\", \"-c\", \"echo 'Hello, World!'\" ]
";

const STARTER_DOCKERIGNORE: &str = "\
*.Dockerfile
*service.yaml
*.tmpl
*.template
";

/// Inputs for generating a new service directory skeleton.
#[derive(Debug, Clone)]
pub struct ScaffoldOpts {
    pub service_name: String,
    pub service_version: String,
    pub services_path: PathBuf,
    pub local_volume: String,
}

impl ScaffoldOpts {
    pub fn new(name: &str, version: &str, services_path: impl Into<PathBuf>) -> Self {
        Self {
            service_name: name.to_string(),
            service_version: version.to_string(),
            services_path: services_path.into(),
            local_volume: ".".to_string(),
        }
    }

    pub fn service_dir(&self) -> PathBuf {
        self.services_path.join(&self.service_name)
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.service_dir().join("archive")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.service_dir().join("assets")
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.service_dir().join("templates")
    }

    fn starter_manifest(&self) -> String {
        format!(
            "\
# This is the name of the service. The name is used to
# construct service images and containers.
name: {name}
version: \"{version}\"
archive:
  - name: data
    target: assets
    include:
      - \"**\"
# Args are used at image build-time. Any declared
# \"ARG\" calls in the Dockerfile can be defined here.
args:
# The volume mount from the host filesystem. Volume
# mounts from the container point to /opt/.
local-volume: {volume}
ports:
# Properties can be any arbitrary value. Like args,
# except that they are not used at build time.
properties:
tags:
  - \"{{{{.Name}}}}:latest\"
  - \"{{{{.Name}}}}:{{{{.Version}}}}\"
",
            name = self.service_name,
            version = self.service_version,
            volume = self.local_volume,
        )
    }
}

type ScaffoldStep = fn(&ScaffoldOpts) -> Result<()>;

/// Generation steps in execution order. Each step is idempotent, so a
/// partially generated skeleton can be completed by rerunning.
fn scaffold_steps() -> Vec<(&'static str, ScaffoldStep)> {
    vec![
        ("service directory", generate_service_dir),
        ("archive directory", generate_archive_dir),
        ("assets directory", generate_assets_dir),
        ("templates directory", generate_templates_dir),
        ("dockerfile", generate_dockerfile),
        ("dockerignore", generate_dockerignore),
        ("service manifest", generate_manifest),
    ]
}

/// Generate a new service skeleton under the services path.
pub fn generate_service(opts: &ScaffoldOpts) -> Result<PathBuf> {
    for (what, step) in scaffold_steps() {
        step(opts).with_context(|| format!("generating {what} for '{}'", opts.service_name))?;
    }
    info!("generated service skeleton at {:?}", opts.service_dir());
    Ok(opts.service_dir())
}

fn generate_service_dir(opts: &ScaffoldOpts) -> Result<()> {
    create_dir(&opts.service_dir())
}

fn generate_archive_dir(opts: &ScaffoldOpts) -> Result<()> {
    create_dir(&opts.archive_dir())
}

fn generate_assets_dir(opts: &ScaffoldOpts) -> Result<()> {
    create_dir(&opts.assets_dir())
}

fn generate_templates_dir(opts: &ScaffoldOpts) -> Result<()> {
    create_dir(&opts.templates_dir())
}

fn generate_dockerfile(opts: &ScaffoldOpts) -> Result<()> {
    write_file(&opts.service_dir().join(".Dockerfile"), STARTER_DOCKERFILE)
}

fn generate_dockerignore(opts: &ScaffoldOpts) -> Result<()> {
    write_file(&opts.service_dir().join(".dockerignore"), STARTER_DOCKERIGNORE)
}

fn generate_manifest(opts: &ScaffoldOpts) -> Result<()> {
    write_file(
        &opts.service_dir().join("service.yaml"),
        &opts.starter_manifest(),
    )
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("creating {:?}", path))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("writing {:?}", path))
}
