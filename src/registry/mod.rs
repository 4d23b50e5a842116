// src/registry/mod.rs

//! Process lifecycle management.
//!
//! The registry owns every supervised instance. A deployment goes through
//! `Pending` (id reserved, provisioning in progress) before it is inserted
//! as a fully built `Running` record; a failure at any step releases the id
//! and leaves nothing behind in the registry. The work directory, however,
//! is kept on disk for inspection.
//!
//! - [`instance`] holds the tracking record and public views of it.
//! - [`monitor`] runs one task per child, owning its process handle.
//! - [`spawn`] builds the child command.

pub mod instance;
pub mod monitor;
pub mod spawn;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::env::{EnvSnapshot, EnvStore};
use crate::errors::{Result, SupervisorError};
use crate::provision::Provisioner;
use crate::types::{InstanceId, StopMode, StopOutcome};

pub use instance::{DeployProgress, Deployment, Instance, InstanceSummary};
pub use monitor::ExitState;
pub use spawn::LaunchSpec;

use monitor::{StopRequest, monitor_child, pump_output};

/// Prefix of every per-deployment directory name.
pub const WORK_DIR_PREFIX: &str = "bot_";

#[derive(Debug, Default)]
struct RegistryState {
    instances: HashMap<InstanceId, Instance>,
    /// Ids reserved by deployments that are still provisioning.
    pending: HashSet<InstanceId>,
}

#[derive(Debug)]
struct RegistryInner {
    state: RwLock<RegistryState>,
    provisioner: Provisioner,
    env: EnvStore,
    launch: LaunchSpec,
    workspace_root: PathBuf,
}

/// Cheaply clonable handle to the set of supervised instances.
#[derive(Debug, Clone)]
pub struct ProcessRegistry {
    inner: Arc<RegistryInner>,
}

impl ProcessRegistry {
    pub fn new(
        provisioner: Provisioner,
        env: EnvStore,
        launch: LaunchSpec,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                state: RwLock::new(RegistryState::default()),
                provisioner,
                env,
                launch,
                workspace_root: workspace_root.into(),
            }),
        }
    }

    pub fn work_dir_for(&self, id: &InstanceId) -> PathBuf {
        self.inner
            .workspace_root
            .join(format!("{WORK_DIR_PREFIX}{id}"))
    }

    /// Provision `source_ref` and start it as a new instance.
    ///
    /// Progress events are sent on `progress` if given; a closed receiver is
    /// ignored.
    pub async fn deploy(
        &self,
        source_ref: &str,
        progress: Option<mpsc::Sender<DeployProgress>>,
    ) -> Result<Deployment> {
        let reservation = self.reserve_id();
        let id = reservation.id.clone();
        let work_dir = self.work_dir_for(&id);
        let notify = |event: DeployProgress| {
            let progress = progress.clone();
            async move {
                if let Some(tx) = progress {
                    let _ = tx.send(event).await;
                }
            }
        };

        info!(id = %id, source_ref, work_dir = ?work_dir, "deploy started");

        let provisioner = &self.inner.provisioner;

        notify(DeployProgress::Fetching {
            id: id.clone(),
            source_ref: source_ref.to_string(),
        })
        .await;
        provisioner.materialize(source_ref, &work_dir).await?;

        if let Some(installer) = provisioner.installer_for(&work_dir) {
            notify(DeployProgress::Installing {
                id: id.clone(),
                manifest: installer.manifest.clone(),
            })
            .await;
            provisioner.run_installer(&work_dir, installer).await?;
        }

        let entry_point = provisioner.locate_entry_point(&work_dir)?;
        notify(DeployProgress::Starting {
            id: id.clone(),
            entry_point: entry_point.clone(),
        })
        .await;

        let env_snapshot = self.inner.env.snapshot();
        let mut child = self
            .inner
            .launch
            .spawn(&id, &work_dir, &entry_point, &env_snapshot)?;
        let pid = child.id();

        if let Some(out) = child.stdout.take() {
            pump_output(id.clone(), "stdout", out);
        }
        if let Some(err) = child.stderr.take() {
            pump_output(id.clone(), "stderr", err);
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(monitor_child(id.clone(), child, exit_tx, stop_rx));

        let instance = Instance {
            id: id.clone(),
            source_ref: source_ref.to_string(),
            work_dir: work_dir.clone(),
            entry_point: entry_point.clone(),
            pid,
            started_at: SystemTime::now(),
            env_snapshot,
            exit_rx,
            stop_tx: Some(stop_tx),
        };
        reservation.commit(instance);

        info!(id = %id, ?pid, entry_point = ?entry_point, "deploy finished");
        Ok(Deployment {
            id,
            work_dir,
            entry_point,
            pid,
        })
    }

    /// Run [`deploy`](Self::deploy) as an independent task so that slow
    /// fetches or installs never hold up other requests.
    pub fn spawn_deploy(
        &self,
        source_ref: impl Into<String>,
        progress: Option<mpsc::Sender<DeployProgress>>,
    ) -> JoinHandle<Result<Deployment>> {
        let registry = self.clone();
        let source_ref = source_ref.into();
        tokio::spawn(async move { registry.deploy(&source_ref, progress).await })
    }

    /// Remove `id` from the registry and terminate its process.
    ///
    /// The record is gone as soon as this is called; with
    /// `StopMode::Request` the child may still be shutting down when this
    /// returns.
    pub async fn stop(&self, id: &InstanceId, mode: StopMode) -> Result<StopOutcome> {
        let instance = self
            .write()
            .instances
            .remove(id)
            .ok_or_else(|| SupervisorError::instance_not_found(id.as_str()))?;

        let outcome = terminate(instance, mode).await;
        info!(id = %id, ?outcome, "instance removed from registry");
        Ok(outcome)
    }

    /// Summaries of all tracked instances, ordered by id.
    pub fn list(&self) -> Vec<InstanceSummary> {
        let mut out: Vec<InstanceSummary> =
            self.read().instances.values().map(Instance::summary).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn get(&self, id: &InstanceId) -> Result<InstanceSummary> {
        self.read()
            .instances
            .get(id)
            .map(Instance::summary)
            .ok_or_else(|| SupervisorError::instance_not_found(id.as_str()))
    }

    /// Environment the instance was started with.
    pub fn env_snapshot(&self, id: &InstanceId) -> Result<EnvSnapshot> {
        self.read()
            .instances
            .get(id)
            .map(|i| i.env_snapshot.clone())
            .ok_or_else(|| SupervisorError::instance_not_found(id.as_str()))
    }

    pub fn len(&self) -> usize {
        self.read().instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop every tracked instance, waiting up to `timeout` for each.
    pub async fn shutdown(&self, timeout: Duration) -> Vec<(InstanceId, StopOutcome)> {
        let drained: Vec<Instance> = self
            .write()
            .instances
            .drain()
            .map(|(_, instance)| instance)
            .collect();

        if drained.is_empty() {
            return Vec::new();
        }
        info!(count = drained.len(), "stopping all instances");

        let mut set = JoinSet::new();
        for instance in drained {
            set.spawn(async move {
                let id = instance.id.clone();
                let outcome = terminate(instance, StopMode::Confirm { timeout }).await;
                (id, outcome)
            });
        }

        let mut results = Vec::new();
        while let Some(res) = set.join_next().await {
            match res {
                Ok(pair) => results.push(pair),
                Err(e) => warn!(error = %e, "shutdown task failed"),
            }
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    fn reserve_id(&self) -> Reservation {
        let mut state = self.write();
        let fs = self.inner.provisioner.fs();
        let id = loop {
            let candidate = InstanceId::generate();
            if state.instances.contains_key(&candidate) || state.pending.contains(&candidate) {
                continue;
            }
            // A leftover directory from an earlier deployment with the same
            // id must not be reused.
            if fs.exists(&self.work_dir_for(&candidate)) {
                continue;
            }
            break candidate;
        };
        state.pending.insert(id.clone());
        debug!(id = %id, "reserved instance id");

        Reservation {
            registry: self.clone(),
            id,
            committed: false,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// An id held by an in-flight deployment. Dropping it without `commit`
/// releases the id.
struct Reservation {
    registry: ProcessRegistry,
    id: InstanceId,
    committed: bool,
}

impl Reservation {
    fn commit(mut self, instance: Instance) {
        let mut state = self.registry.write();
        state.pending.remove(&self.id);
        state.instances.insert(self.id.clone(), instance);
        self.committed = true;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.committed {
            self.registry.write().pending.remove(&self.id);
            debug!(id = %self.id, "released instance id after failed deploy");
        }
    }
}

async fn terminate(mut instance: Instance, mode: StopMode) -> StopOutcome {
    if let Some(exit) = instance.exit_state() {
        return StopOutcome::AlreadyExited {
            exit_code: exit.exit_code,
        };
    }

    let Some(stop_tx) = instance.stop_tx.take() else {
        return StopOutcome::AlreadyExited { exit_code: None };
    };

    let (reply_tx, reply_rx) = oneshot::channel();
    if stop_tx
        .send(StopRequest {
            mode,
            reply: reply_tx,
        })
        .is_err()
    {
        // The monitor finished between the liveness check above and the send.
        return already_exited(&instance);
    }

    match reply_rx.await {
        Ok(outcome) => outcome,
        Err(_) => already_exited(&instance),
    }
}

fn already_exited(instance: &Instance) -> StopOutcome {
    StopOutcome::AlreadyExited {
        exit_code: instance.exit_state().and_then(|e| e.exit_code),
    }
}
