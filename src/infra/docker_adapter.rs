use crate::domain::{BuildRequest, ContainerConfig, ContainerRuntime, ContainerStatus, HostConfig};
use anyhow::{Context, Result, bail};
use std::ffi::{OsStr, OsString};
use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};

/// Container runtime backed by the `docker` CLI.
#[derive(Debug, Default)]
pub struct DockerAdapter;

impl DockerAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl ContainerRuntime for DockerAdapter {
    fn build_image(&self, request: &BuildRequest, out: &mut dyn Write) -> Result<()> {
        // The dockerfile is named relative to the build context.
        let dockerfile = request.context_dir.join(&request.dockerfile);
        let mut args: Vec<OsString> =
            vec!["build".into(), "-f".into(), dockerfile.into_os_string()];

        for tag in &request.tags {
            args.push("-t".into());
            args.push(tag.into());
        }
        for (key, value) in &request.build_args {
            args.push("--build-arg".into());
            args.push(format!("{key}={value}").into());
        }
        if request.force_remove {
            args.push("--force-rm".into());
        }
        args.push(request.context_dir.as_os_str().to_os_string());

        let context = format!("building image from {:?}", request.context_dir);
        let mut child = Command::new("docker")
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| context.clone())?;

        // Stream the build log verbatim as it arrives. The CLI splits
        // its log across stdout and stderr; stderr is drained on a side
        // thread and flushed to the sink once stdout closes.
        let mut stderr = child.stderr.take().expect("stderr piped");
        let drain = std::thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = stderr.read_to_end(&mut buffer);
            buffer
        });

        if let Some(mut stdout) = child.stdout.take() {
            std::io::copy(&mut stdout, out).with_context(|| context.clone())?;
        }
        let stderr_log = drain.join().unwrap_or_default();
        out.write_all(&stderr_log)?;

        let status = child.wait().with_context(|| context.clone())?;
        ensure_success(status, &context)
    }

    fn image_id(&self, reference: &str) -> Result<String> {
        let output = docker_output(
            [
                "images",
                "--filter",
                &format!("reference={reference}"),
                "--format",
                "{{.ID}}",
            ],
            &format!("listing images for {reference}"),
        )?;

        match output.lines().find(|line| !line.trim().is_empty()) {
            Some(id) => Ok(id.trim().to_string()),
            None => bail!("no image found for reference '{reference}'"),
        }
    }

    fn create_container(
        &self,
        name: &str,
        config: &ContainerConfig,
        host: &HostConfig,
    ) -> Result<String> {
        let mut args: Vec<String> = vec!["create".into(), "--name".into(), name.into()];

        for port in &host.port_bindings {
            match port.host_port {
                Some(host_port) => {
                    args.push("-p".into());
                    args.push(format!("{}:{}", host_port, port.exposed()));
                }
                None => {
                    args.push("--expose".into());
                    args.push(port.exposed());
                }
            }
        }
        for bind in &host.binds {
            args.push("-v".into());
            args.push(bind.clone());
        }
        args.push(config.image.clone());

        let id = docker_output(args, &format!("creating container {name}"))?;
        Ok(id.trim().to_string())
    }

    fn inspect_container(&self, id: &str) -> Result<ContainerStatus> {
        let output = docker_output(
            [
                "inspect",
                "--format",
                "{{.State.Status}}|{{.State.Running}}|{{.State.Error}}",
                id,
            ],
            &format!("inspecting container {id}"),
        )?;

        let mut parts = output.trim().splitn(3, '|');
        let status = parts.next().unwrap_or_default().to_string();
        let running = parts.next().unwrap_or_default() == "true";
        let error = parts.next().unwrap_or_default().to_string();
        Ok(ContainerStatus { status, running, error })
    }

    fn start_container(&self, id: &str) -> Result<()> {
        docker(["start", id], &format!("starting container {id}"))
    }

    fn stop_container(&self, id: &str) -> Result<()> {
        docker(["stop", id], &format!("stopping container {id}"))
    }

    fn restart_container(&self, id: &str) -> Result<()> {
        docker(["restart", id], &format!("restarting container {id}"))
    }

    fn prune_images(&self) -> Result<()> {
        docker(["image", "prune", "-f"], "pruning dangling images")
    }
}

fn docker<I, S>(args: I, context: &str) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let status = Command::new("docker")
        .args(args.into_iter().map(|item| item.as_ref().to_os_string()))
        .status()
        .with_context(|| context.to_string())?;
    ensure_success(status, context)
}

fn docker_output<I, S>(args: I, context: &str) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = Command::new("docker")
        .args(args.into_iter().map(|item| item.as_ref().to_os_string()))
        .stderr(Stdio::piped())
        .output()
        .with_context(|| context.to_string())?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("docker returned status {:?} ({context}): {}", output.status, stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn ensure_success(status: ExitStatus, context: &str) -> Result<()> {
    if status.success() {
        return Ok(());
    }

    bail!("docker returned status {:?} ({context})", status)
}
