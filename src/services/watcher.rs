use crate::domain::{ContainerRecord, ContainerRuntime, ContainerStatus};
use crate::infra::{CatalogStore, ContainerQuery};
use anyhow::{Context, Result, bail};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Cooperative cancellation flag shared with the operator-signal
/// listener. The listener's only job is to trip it; the watch loop
/// observes it once per poll iteration.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Timing and retry policy for one watch session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Consecutive inspect failures tolerated before aborting.
    pub retry_max: u32,
    /// Back-off between inspect retries.
    pub retry_delay: Duration,
    /// Interval between poll iterations.
    pub poll_delay: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            retry_max: 3,
            retry_delay: Duration::from_secs(10),
            poll_delay: Duration::from_millis(500),
        }
    }
}

/// How a watch session ended, short of a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The container exited normally; monitoring is over.
    Stopped,
    /// The operator requested cancellation; the container was stopped.
    Cancelled,
}

/// One invocation's state for polling and restarting a single
/// container. Not persisted across invocations.
pub struct Watcher<'a> {
    runtime: &'a dyn ContainerRuntime,
    target: ContainerRecord,
    config: WatchConfig,
    retry_budget: u32,
}

impl<'a> Watcher<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime, target: ContainerRecord, config: WatchConfig) -> Self {
        let retry_budget = config.retry_max;
        Self {
            runtime,
            target,
            config,
            retry_budget,
        }
    }

    /// Drive the container through wait-for-start and then monitor it
    /// until it stops normally, the watch is cancelled, or a fatal
    /// error occurs.
    pub fn run(&mut self, token: &CancelToken) -> Result<WatchOutcome> {
        let id = self.target.runtime_id.clone();

        info!("waiting for service {}...", self.target.name);
        self.runtime
            .start_container(&id)
            .with_context(|| format!("starting container {id}"))?;

        // Phase 1: wait until the runtime reports the container running.
        loop {
            if token.is_cancelled() {
                info!("watch cancelled");
                return Ok(WatchOutcome::Cancelled);
            }
            if self.inspect(&id)?.running {
                break;
            }
            thread::sleep(self.config.poll_delay);
        }
        info!("service {} running", self.target.name);

        // Phase 2: monitor, restarting on abnormal exit.
        loop {
            if token.is_cancelled() {
                info!("stopping service {}...", self.target.name);
                self.runtime
                    .stop_container(&id)
                    .with_context(|| format!("stopping container {id}"))?;
                return Ok(WatchOutcome::Cancelled);
            }

            let status = self.inspect(&id)?;
            if status.is_stopped_ok() {
                info!("service {} stopped", self.target.name);
                return Ok(WatchOutcome::Stopped);
            }
            if status.is_stopped_err() {
                warn!(
                    "service {} down: {}; restarting...",
                    self.target.name, status.error
                );
                self.runtime
                    .restart_container(&id)
                    .with_context(|| format!("restarting container {id}"))?;
            }

            thread::sleep(self.config.poll_delay);
        }
    }

    /// Inspect with a bounded retry for transient failures.
    ///
    /// Each failure consumes one unit of the budget after a back-off
    /// wait; a success restores the full budget. The budget is per
    /// failure streak, not per session.
    fn inspect(&mut self, id: &str) -> Result<ContainerStatus> {
        loop {
            match self.runtime.inspect_container(id) {
                Ok(status) => {
                    self.retry_budget = self.config.retry_max;
                    return Ok(status);
                }
                Err(err) if self.retry_budget > 0 => {
                    warn!("inspect failed: {err:#}");
                    thread::sleep(self.config.retry_delay);
                    self.retry_budget -= 1;
                }
                Err(err) => {
                    return Err(err.context("inspect retries exhausted"));
                }
            }
        }
    }
}

/// Resolve a container by its catalogued name and watch it.
pub fn watch_service(
    runtime: &dyn ContainerRuntime,
    store: &CatalogStore,
    name: &str,
    token: &CancelToken,
    config: WatchConfig,
) -> Result<WatchOutcome> {
    let matches = store
        .find_containers(&ContainerQuery::by_name(name))
        .with_context(|| format!("looking up container '{name}'"))?;

    let Some(target) = matches.into_iter().next() else {
        bail!("no catalogued container named '{name}'");
    };

    Watcher::new(runtime, target, config).run(token)
}
