// src/registry/spawn.rs

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::info;

use crate::config::EntrySection;
use crate::env::EnvSnapshot;
use crate::errors::{Result, SupervisorError};
use crate::types::InstanceId;

/// How entry points are launched.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub interpreter: String,
    pub args: Vec<String>,
}

impl From<&EntrySection> for LaunchSpec {
    fn from(entry: &EntrySection) -> Self {
        Self {
            interpreter: entry.interpreter.clone(),
            args: entry.args.clone(),
        }
    }
}

impl LaunchSpec {
    /// Build the command for `entry_point`, run from `work_dir`.
    ///
    /// The child inherits the supervisor's environment with `env` laid on
    /// top, so snapshot keys win on conflict.
    pub fn command(&self, work_dir: &Path, entry_point: &Path, env: &EnvSnapshot) -> Command {
        let target: PathBuf = entry_point
            .strip_prefix(work_dir)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| entry_point.to_path_buf());

        let mut cmd = Command::new(&self.interpreter);
        cmd.args(&self.args)
            .arg(target)
            .current_dir(work_dir)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    pub fn spawn(
        &self,
        id: &InstanceId,
        work_dir: &Path,
        entry_point: &Path,
        env: &EnvSnapshot,
    ) -> Result<Child> {
        let child = self
            .command(work_dir, entry_point, env)
            .spawn()
            .map_err(|e| SupervisorError::Spawn {
                entry_point: entry_point.to_path_buf(),
                reason: format!("`{}`: {}", self.interpreter, e),
            })?;

        info!(
            id = %id,
            pid = ?child.id(),
            entry_point = ?entry_point,
            env_vars = env.len(),
            "spawned instance process"
        );
        Ok(child)
    }
}
