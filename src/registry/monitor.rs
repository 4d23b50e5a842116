// src/registry/monitor.rs

//! Per-instance monitor task.
//!
//! Each spawned child is owned by exactly one monitor task. The task waits
//! for either the child to exit on its own, or a stop request from the
//! registry, and publishes the exit state on a `watch` channel so that
//! `list()` can check liveness without touching the process handle.

use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::process::Child;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::provision::runner::drain_lines;
use crate::types::{InstanceId, StopMode, StopOutcome};

/// How a child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitState {
    /// `None` when the child was terminated by a signal.
    pub exit_code: Option<i32>,
}

/// Sent by the registry to ask the monitor to terminate its child.
#[derive(Debug)]
pub(crate) struct StopRequest {
    pub mode: StopMode,
    pub reply: oneshot::Sender<StopOutcome>,
}

/// Run until the child exits or is stopped.
///
/// If the stop channel is dropped without a request (the registry itself was
/// dropped), the child is killed via `kill_on_drop`.
pub(crate) async fn monitor_child(
    id: InstanceId,
    mut child: Child,
    exit_tx: watch::Sender<Option<ExitState>>,
    mut stop_rx: oneshot::Receiver<StopRequest>,
) {
    tokio::select! {
        status_res = child.wait() => {
            let exit_code = match status_res {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(id = %id, error = %e, "failed waiting for instance process");
                    None
                }
            };
            warn!(id = %id, ?exit_code, "instance exited without a stop request");
            let _ = exit_tx.send(Some(ExitState { exit_code }));
        }

        request = &mut stop_rx => {
            match request {
                Ok(request) => handle_stop(&id, child, &exit_tx, request).await,
                Err(_) => {
                    debug!(id = %id, "stop channel closed; dropping process handle");
                }
            }
        }
    }
}

async fn handle_stop(
    id: &InstanceId,
    mut child: Child,
    exit_tx: &watch::Sender<Option<ExitState>>,
    request: StopRequest,
) {
    info!(id = %id, mode = ?request.mode, "stopping instance");

    if let Err(e) = request_termination(&mut child) {
        warn!(id = %id, error = %e, "failed to send termination signal");
    }

    match request.mode {
        StopMode::Request => {
            let _ = request.reply.send(StopOutcome::Requested);
            // Keep reaping in the background so the child does not linger
            // as a zombie once it exits.
            let exit_code = child.wait().await.ok().and_then(|s| s.code());
            debug!(id = %id, ?exit_code, "stopped instance exited");
            let _ = exit_tx.send(Some(ExitState { exit_code }));
        }
        StopMode::Confirm { timeout } => {
            let outcome = wait_or_kill(id, &mut child, timeout).await;
            let exit_code = match outcome {
                StopOutcome::Exited { exit_code } => exit_code,
                _ => None,
            };
            let _ = exit_tx.send(Some(ExitState { exit_code }));
            let _ = request.reply.send(outcome);
        }
    }
}

async fn wait_or_kill(id: &InstanceId, child: &mut Child, timeout: Duration) -> StopOutcome {
    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            info!(id = %id, exit_code = ?status.code(), "instance exited after termination signal");
            StopOutcome::Exited {
                exit_code: status.code(),
            }
        }
        Ok(Err(e)) => {
            warn!(id = %id, error = %e, "failed waiting for instance after termination signal");
            kill(id, child).await
        }
        Err(_) => {
            warn!(id = %id, ?timeout, "instance ignored termination signal; killing");
            kill(id, child).await
        }
    }
}

async fn kill(id: &InstanceId, child: &mut Child) -> StopOutcome {
    if let Err(e) = child.kill().await {
        warn!(id = %id, error = %e, "failed to kill instance process");
    }
    StopOutcome::Killed
}

/// Ask the child to shut down gracefully.
#[cfg(unix)]
fn request_termination(child: &mut Child) -> std::io::Result<()> {
    let Some(pid) = child.id() else {
        // Already reaped.
        return Ok(());
    };
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) -> std::io::Result<()> {
    child.start_kill()
}

/// Forward each line of a child's output stream to the log.
pub(crate) fn pump_output<R>(id: InstanceId, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        drain_lines(reader, |line| info!(id = %id, stream, "{}", line)).await;
        debug!(id = %id, stream, "instance output closed");
    });
}
