use crate::domain::{
    BuildRequest, ContainerConfig, ContainerRuntime, ContainerStatus, HostConfig,
};
use crate::services::CancelToken;
use anyhow::{Result, bail};
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::RwLock;

/// A scripted inspect observation.
#[derive(Debug, Clone)]
enum InspectStep {
    Status(ContainerStatus),
    Error(String),
}

#[derive(Debug, Clone)]
pub struct CreatedContainer {
    pub name: String,
    pub config: ContainerConfig,
    pub host: HostConfig,
}

/// In-memory container runtime for tests.
///
/// Records every call, serves scripted inspect observations per
/// container id, and supports targeted failure injection.
#[derive(Debug, Default)]
pub struct MockRuntime {
    commands: RwLock<Vec<String>>,
    fail_on: RwLock<Option<String>>,
    image_ids: RwLock<HashMap<String, String>>,
    created: RwLock<Vec<CreatedContainer>>,
    inspect_scripts: RwLock<HashMap<String, VecDeque<InspectStep>>>,
    idle_status: RwLock<HashMap<String, ContainerStatus>>,
    build_log: RwLock<Vec<u8>>,
    inspect_count: RwLock<u32>,
    cancel_after: RwLock<Option<(CancelToken, u32)>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `image_id(reference)` resolve to `id`.
    pub fn set_image_id(&self, reference: &str, id: &str) {
        self.image_ids
            .write()
            .unwrap()
            .insert(reference.to_string(), id.to_string());
    }

    pub fn set_fail_on(&self, operation: &str) {
        *self.fail_on.write().unwrap() = Some(operation.to_string());
    }

    /// Set the log bytes `build_image` streams into its sink.
    pub fn set_build_log(&self, log: &str) {
        *self.build_log.write().unwrap() = log.as_bytes().to_vec();
    }

    /// Queue a scripted inspect observation for a container id.
    pub fn push_inspect(&self, id: &str, status: ContainerStatus) {
        self.inspect_scripts
            .write()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .push_back(InspectStep::Status(status));
    }

    /// Queue a scripted inspect failure for a container id.
    pub fn push_inspect_error(&self, id: &str, message: &str) {
        self.inspect_scripts
            .write()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .push_back(InspectStep::Error(message.to_string()));
    }

    /// Status served once a container's script is exhausted. Defaults
    /// to running.
    pub fn set_idle_status(&self, id: &str, status: ContainerStatus) {
        self.idle_status
            .write()
            .unwrap()
            .insert(id.to_string(), status);
    }

    /// Trip `token` once the total number of inspect calls reaches `n`.
    pub fn cancel_after_inspects(&self, token: CancelToken, n: u32) {
        *self.cancel_after.write().unwrap() = Some((token, n));
    }

    pub fn get_commands(&self) -> Vec<String> {
        self.commands.read().unwrap().clone()
    }

    pub fn command_count(&self, prefix: &str) -> usize {
        self.commands
            .read()
            .unwrap()
            .iter()
            .filter(|cmd| cmd.starts_with(prefix))
            .count()
    }

    pub fn created_containers(&self) -> Vec<CreatedContainer> {
        self.created.read().unwrap().clone()
    }

    fn record_command(&self, cmd: &str) {
        self.commands.write().unwrap().push(cmd.to_string());
    }

    fn check_fail(&self, operation: &str) -> Result<()> {
        if let Some(ref fail_on) = *self.fail_on.read().unwrap() {
            if fail_on == operation {
                bail!("mock failure on: {}", operation);
            }
        }
        Ok(())
    }
}

impl ContainerRuntime for MockRuntime {
    fn build_image(&self, request: &BuildRequest, out: &mut dyn Write) -> Result<()> {
        self.record_command(&format!("build:{}", request.tags.join(",")));
        self.check_fail("build")?;
        out.write_all(&self.build_log.read().unwrap())?;
        Ok(())
    }

    fn image_id(&self, reference: &str) -> Result<String> {
        self.record_command(&format!("image_id:{}", reference));
        self.check_fail("image_id")?;

        match self.image_ids.read().unwrap().get(reference) {
            Some(id) => Ok(id.clone()),
            None => bail!("no image found for reference '{reference}'"),
        }
    }

    fn create_container(
        &self,
        name: &str,
        config: &ContainerConfig,
        host: &HostConfig,
    ) -> Result<String> {
        self.record_command(&format!("create:{}", name));
        self.check_fail("create")?;

        let mut created = self.created.write().unwrap();
        created.push(CreatedContainer {
            name: name.to_string(),
            config: config.clone(),
            host: host.clone(),
        });
        Ok(format!("ctr-{}", created.len()))
    }

    fn inspect_container(&self, id: &str) -> Result<ContainerStatus> {
        self.record_command(&format!("inspect:{}", id));

        let count = {
            let mut count = self.inspect_count.write().unwrap();
            *count += 1;
            *count
        };
        if let Some((token, threshold)) = self.cancel_after.read().unwrap().as_ref() {
            if count >= *threshold {
                token.cancel();
            }
        }

        self.check_fail("inspect")?;

        let step = self
            .inspect_scripts
            .write()
            .unwrap()
            .get_mut(id)
            .and_then(VecDeque::pop_front);

        match step {
            Some(InspectStep::Status(status)) => Ok(status),
            Some(InspectStep::Error(message)) => bail!("{}", message),
            None => Ok(self
                .idle_status
                .read()
                .unwrap()
                .get(id)
                .cloned()
                .unwrap_or(ContainerStatus {
                    status: "running".to_string(),
                    running: true,
                    error: String::new(),
                })),
        }
    }

    fn start_container(&self, id: &str) -> Result<()> {
        self.record_command(&format!("start:{}", id));
        self.check_fail("start")?;
        Ok(())
    }

    fn stop_container(&self, id: &str) -> Result<()> {
        self.record_command(&format!("stop:{}", id));
        self.check_fail("stop")?;
        Ok(())
    }

    fn restart_container(&self, id: &str) -> Result<()> {
        self.record_command(&format!("restart:{}", id));
        self.check_fail("restart")?;
        Ok(())
    }

    fn prune_images(&self) -> Result<()> {
        self.record_command("prune:images");
        self.check_fail("prune_images")?;
        Ok(())
    }
}

/// Shorthand builders for inspect observations.
pub fn running() -> ContainerStatus {
    ContainerStatus {
        status: "running".to_string(),
        running: true,
        error: String::new(),
    }
}

pub fn created() -> ContainerStatus {
    ContainerStatus {
        status: "created".to_string(),
        running: false,
        error: String::new(),
    }
}

pub fn exited_ok() -> ContainerStatus {
    ContainerStatus {
        status: "exited".to_string(),
        running: false,
        error: String::new(),
    }
}

pub fn exited_err(message: &str) -> ContainerStatus {
    ContainerStatus {
        status: "exited".to_string(),
        running: false,
        error: message.to_string(),
    }
}
