// src/registry/instance.rs

use std::path::PathBuf;
use std::time::SystemTime;

use tokio::sync::{oneshot, watch};

use crate::env::EnvSnapshot;
use crate::registry::monitor::{ExitState, StopRequest};
use crate::types::{InstanceId, InstanceStatus};

/// Tracking record for one supervised child.
///
/// The OS handle itself lives in the instance's monitor task; the record
/// keeps the channels used to observe and stop it.
#[derive(Debug)]
pub struct Instance {
    pub id: InstanceId,
    pub source_ref: String,
    pub work_dir: PathBuf,
    pub entry_point: PathBuf,
    pub pid: Option<u32>,
    pub started_at: SystemTime,
    /// Environment the child was started with. Never changes after spawn.
    pub env_snapshot: EnvSnapshot,
    pub(crate) exit_rx: watch::Receiver<Option<ExitState>>,
    pub(crate) stop_tx: Option<oneshot::Sender<StopRequest>>,
}

impl Instance {
    /// Exit state published by the monitor task, if the child has exited.
    pub fn exit_state(&self) -> Option<ExitState> {
        *self.exit_rx.borrow()
    }

    pub fn status(&self) -> InstanceStatus {
        status_of(self.exit_state())
    }

    pub fn summary(&self) -> InstanceSummary {
        let exit = self.exit_state();
        InstanceSummary {
            id: self.id.clone(),
            source_ref: self.source_ref.clone(),
            work_dir: self.work_dir.clone(),
            pid: self.pid,
            status: status_of(exit),
            exit_code: exit.and_then(|e| e.exit_code),
        }
    }
}

fn status_of(exit: Option<ExitState>) -> InstanceStatus {
    match exit {
        None => InstanceStatus::Running,
        Some(_) => InstanceStatus::Crashed,
    }
}

/// Point-in-time view of an instance, as returned by `list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSummary {
    pub id: InstanceId,
    pub source_ref: String,
    pub work_dir: PathBuf,
    pub pid: Option<u32>,
    pub status: InstanceStatus,
    /// Set once the child has exited with a code.
    pub exit_code: Option<i32>,
}

/// Result of a successful deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub id: InstanceId,
    pub work_dir: PathBuf,
    pub entry_point: PathBuf,
    pub pid: Option<u32>,
}

/// Progress notifications emitted while a deployment runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployProgress {
    Fetching { id: InstanceId, source_ref: String },
    Installing { id: InstanceId, manifest: String },
    Starting { id: InstanceId, entry_point: PathBuf },
}
