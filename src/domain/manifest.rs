use crate::domain::{BuildRequest, ContainerConfig, HostConfig, PortSpec};
use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Default Dockerfile name when the manifest does not override it.
const DEFAULT_DOCKERFILE: &str = ".Dockerfile";

/// In-container mount point for the local volume.
const VOLUME_TARGET: &str = "/opt";

/// One archivable subtree of a service directory.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct ArchiveTarget {
    pub name: String,
    /// Directory to archive, relative to the service directory.
    pub target: String,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

/// Declarative description of a buildable service.
///
/// Loaded from a `service.yaml` under the operator's service tree. String
/// fields marked as templates may reference manifest values with
/// `{{.Field}}` placeholders, e.g. `"{{.Name}}:{{.Version}}"`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct ServiceManifest {
    #[serde(skip)]
    manifest_path: PathBuf,
    pub name: String,
    pub version: String,
    pub dockerfile: Option<String>,
    /// Build arguments, key to template string.
    pub args: BTreeMap<String, String>,
    /// Arbitrary values, like args but not passed at build time.
    pub properties: BTreeMap<String, String>,
    pub local_volume: Option<String>,
    pub ports: Vec<String>,
    /// Tag templates, rendered before any runtime call.
    pub tags: Vec<String>,
    pub archive: Vec<ArchiveTarget>,
}

impl ServiceManifest {
    /// Load a manifest from a file path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading manifest {:?}", path))?;
        Self::loads(path, &data)
    }

    /// Load a manifest from an already-read buffer.
    pub fn loads(path: impl Into<PathBuf>, data: &str) -> Result<Self> {
        let path = path.into();
        let mut manifest: ServiceManifest = serde_yml::from_str(data)
            .with_context(|| format!("parsing manifest {:?}", path))?;
        manifest.manifest_path = path;
        Ok(manifest)
    }

    /// The directory the manifest lives in. Doubles as the build context.
    pub fn manifest_dir(&self) -> PathBuf {
        self.manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Where this service keeps its generated archives.
    pub fn archive_dir(&self) -> PathBuf {
        self.manifest_dir().join("archive")
    }

    pub fn dockerfile(&self) -> &str {
        self.dockerfile.as_deref().unwrap_or(DEFAULT_DOCKERFILE)
    }

    /// The name a service container is created as, unless overridden.
    pub fn service_name(&self) -> String {
        format!("service-{}-{}", self.name, self.version)
    }

    /// Explicit key-value context templates are rendered against.
    fn template_context(&self) -> HashMap<&'static str, String> {
        HashMap::from([
            ("Name", self.name.clone()),
            ("Version", self.version.clone()),
            ("Dockerfile", self.dockerfile().to_string()),
            ("LocalVolume", self.local_volume.clone().unwrap_or_default()),
        ])
    }

    /// Render a template string against this manifest's field context.
    pub fn render(&self, template: &str) -> Result<String> {
        render_template(template, &self.template_context())
    }

    /// Render a value from the `args` map.
    pub fn render_arg(&self, key: &str) -> Result<String> {
        let value = self
            .args
            .get(key)
            .ok_or_else(|| anyhow!("no build arg '{}' in manifest", key))?;
        self.render(value)
    }

    /// Render a value from the `properties` map.
    pub fn render_property(&self, key: &str) -> Result<String> {
        let value = self
            .properties
            .get(key)
            .ok_or_else(|| anyhow!("no property '{}' in manifest", key))?;
        self.render(value)
    }

    /// Resolve every tag template. Any render failure is fatal: partial
    /// tag lists are never handed to the runtime.
    pub fn resolved_tags(&self) -> Result<Vec<String>> {
        self.tags
            .iter()
            .map(|tag| {
                self.render(tag)
                    .with_context(|| format!("rendering tag template {:?}", tag))
            })
            .collect()
    }

    /// Resolve the build request for this manifest.
    ///
    /// A build arg whose template fails to render is skipped; a tag
    /// template failure aborts the whole resolution.
    pub fn build_request(&self) -> Result<BuildRequest> {
        let tags = self.resolved_tags()?;

        let mut build_args = Vec::new();
        for key in self.args.keys() {
            match self.render_arg(key) {
                Ok(value) => build_args.push((key.clone(), value)),
                Err(err) => {
                    tracing::debug!("skipping build arg '{}': {:#}", key, err);
                }
            }
        }

        Ok(BuildRequest {
            context_dir: self.build_context()?,
            dockerfile: self.dockerfile().to_string(),
            tags,
            build_args,
            force_remove: true,
        })
    }

    /// Resolve the build context, failing early if the manifest
    /// directory cannot be read.
    pub fn build_context(&self) -> Result<PathBuf> {
        let dir = self.manifest_dir();
        fs::read_dir(&dir).with_context(|| format!("reading build context {:?}", dir))?;
        Ok(dir)
    }

    /// Parse the manifest's port specs into mappings.
    pub fn port_specs(&self) -> Result<Vec<PortSpec>> {
        self.ports.iter().map(|spec| parse_port_spec(spec)).collect()
    }

    /// Generate the container config used to create a service container.
    ///
    /// Selects the first resolved tag containing `tag_name` as a
    /// substring, in manifest declaration order.
    pub fn container_config(&self, tag_name: &str) -> Result<ContainerConfig> {
        let tags = self.resolved_tags()?;
        let image = tags
            .iter()
            .find(|tag| tag.contains(tag_name))
            .cloned()
            .ok_or_else(|| anyhow!("no container image available as '{}'", tag_name))?;

        Ok(ContainerConfig {
            image,
            exposed_ports: self.port_specs()?,
        })
    }

    /// Generate the host config used to create a service container.
    ///
    /// Creates the local volume directory if it is missing and binds it
    /// to the fixed in-container path.
    pub fn host_config(&self) -> Result<HostConfig> {
        let mut host = HostConfig::default();

        if let Some(volume) = self.local_volume.as_deref().filter(|v| !v.is_empty()) {
            let volume = shellexpand::tilde(volume).into_owned();
            let path = Path::new(&volume);
            if !path.exists() {
                fs::create_dir_all(path)
                    .with_context(|| format!("creating local volume {:?}", path))?;
            }
            host.binds.push(format!("{}:{}", volume, VOLUME_TARGET));
        }

        host.port_bindings = self.port_specs()?;
        Ok(host)
    }

    /// Apply `key=value` overrides to the `args` map.
    pub fn apply_arg_overrides(&mut self, pairs: &[String]) {
        for pair in pairs {
            let (key, value) = split_pair(pair);
            self.args.insert(key.to_string(), value.to_string());
        }
    }

    /// Apply `key=value` overrides to the `properties` map.
    pub fn apply_property_overrides(&mut self, pairs: &[String]) {
        for pair in pairs {
            let (key, value) = split_pair(pair);
            self.properties.insert(key.to_string(), value.to_string());
        }
    }
}

fn split_pair(pair: &str) -> (&str, &str) {
    match pair.split_once('=') {
        Some((key, value)) => (key, value),
        None => (pair, ""),
    }
}

/// Substitute `{{.Field}}` placeholders from a key-value context.
///
/// Unknown fields and malformed placeholders are errors; callers decide
/// whether that is fatal for the surrounding operation.
pub fn render_template(template: &str, context: &HashMap<&'static str, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| anyhow!("unterminated placeholder in template {:?}", template))?;
        let token = after[..end].trim();

        let Some(key) = token.strip_prefix('.') else {
            bail!("malformed placeholder '{}' in template {:?}", token, template);
        };
        let value = context
            .get(key)
            .ok_or_else(|| anyhow!("unknown template field '.{}'", key))?;

        out.push_str(value);
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Parse a port spec of the form `[host:]container[/protocol]`.
fn parse_port_spec(spec: &str) -> Result<PortSpec> {
    let (ports, protocol) = match spec.split_once('/') {
        Some((ports, protocol)) if !protocol.is_empty() => (ports, protocol),
        Some(_) => bail!("empty protocol in port spec '{}'", spec),
        None => (spec, "tcp"),
    };

    let (host_port, container_port) = match ports.split_once(':') {
        Some((host, container)) => {
            let host = host
                .parse::<u16>()
                .with_context(|| format!("bad host port in spec '{}'", spec))?;
            (Some(host), container)
        }
        None => (None, ports),
    };
    let container_port = container_port
        .parse::<u16>()
        .with_context(|| format!("bad container port in spec '{}'", spec))?;

    Ok(PortSpec {
        host_port,
        container_port,
        protocol: protocol.to_string(),
    })
}
