// src/supervisor.rs

//! The API a front-end talks to.
//!
//! `Supervisor` wires the env store, provisioner and registry together from a
//! `ConfigFile` and exposes the deploy/stop/list and config operations as
//! direct calls.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::ConfigFile;
use crate::env::{ConfigEntry, EnvStore, ImportReport};
use crate::errors::Result;
use crate::fs::{FileSystem, RealFileSystem};
use crate::provision::{Provisioner, RealToolRunner, ToolRunner};
use crate::registry::{
    DeployProgress, Deployment, InstanceSummary, LaunchSpec, ProcessRegistry,
};
use crate::types::{InstanceId, StopMode, StopOutcome};

#[derive(Debug, Clone)]
pub struct Supervisor {
    env: EnvStore,
    registry: ProcessRegistry,
    fs: Arc<dyn FileSystem>,
    env_file: PathBuf,
    stop_timeout: Duration,
}

impl Supervisor {
    /// Build a supervisor that uses the real filesystem and external tools.
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        Self::with_backends(cfg, Arc::new(RealFileSystem), Arc::new(RealToolRunner))
    }

    /// Build a supervisor on top of the given filesystem and tool runner.
    ///
    /// If `load_env_on_start` is set, the persisted env file is merged into
    /// the store before anything is deployed.
    pub fn with_backends(
        cfg: &ConfigFile,
        fs: Arc<dyn FileSystem>,
        tools: Arc<dyn ToolRunner>,
    ) -> Result<Self> {
        let sup = &cfg.supervisor;
        let env = EnvStore::new(sup.reserved_prefixes.iter().cloned());

        if sup.load_env_on_start {
            let report = env.load(fs.as_ref(), &sup.env_file)?;
            if report.applied > 0 || !report.skipped.is_empty() {
                info!(
                    path = ?sup.env_file,
                    applied = report.applied,
                    skipped = report.skipped.len(),
                    "loaded persisted env vars"
                );
            }
        }

        let provisioner = Provisioner::new(cfg, Arc::clone(&fs), tools)?;
        let registry = ProcessRegistry::new(
            provisioner,
            env.clone(),
            LaunchSpec::from(&cfg.entry),
            sup.workspace_root.clone(),
        );

        Ok(Self {
            env,
            registry,
            fs,
            env_file: sup.env_file.clone(),
            stop_timeout: sup.stop_timeout(),
        })
    }

    pub fn env(&self) -> &EnvStore {
        &self.env
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn env_file(&self) -> &Path {
        &self.env_file
    }

    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }

    // --- Instances ---

    pub async fn deploy(&self, source_ref: &str) -> Result<Deployment> {
        self.registry.deploy(source_ref, None).await
    }

    /// Deploy on its own task, reporting progress on `progress`.
    pub fn deploy_in_background(
        &self,
        source_ref: impl Into<String>,
        progress: Option<mpsc::Sender<DeployProgress>>,
    ) -> JoinHandle<Result<Deployment>> {
        self.registry.spawn_deploy(source_ref, progress)
    }

    /// Fire-and-forget stop.
    pub async fn stop(&self, id: &InstanceId) -> Result<StopOutcome> {
        self.registry.stop(id, StopMode::Request).await
    }

    /// Stop and wait for exit, killing the child after the configured
    /// stop timeout.
    pub async fn stop_confirmed(&self, id: &InstanceId) -> Result<StopOutcome> {
        self.registry
            .stop(
                id,
                StopMode::Confirm {
                    timeout: self.stop_timeout,
                },
            )
            .await
    }

    pub fn list(&self) -> Vec<InstanceSummary> {
        self.registry.list()
    }

    pub async fn shutdown(&self) -> Vec<(InstanceId, StopOutcome)> {
        self.registry.shutdown(self.stop_timeout).await
    }

    // --- Environment ---

    pub fn config_list(&self) -> Vec<ConfigEntry> {
        self.env.list()
    }

    pub fn config_set(&self, key: &str, value: &str) -> Result<()> {
        self.env.set(key, value)
    }

    pub fn config_update(&self, key: &str, value: &str) -> Result<()> {
        self.env.update(key, value)
    }

    pub fn config_delete(&self, key: &str) -> bool {
        self.env.delete(key)
    }

    pub fn config_bulk_import(&self, raw_text: &str) -> ImportReport {
        self.env.bulk_merge(raw_text)
    }

    /// Read an env file through the supervisor's filesystem and merge it.
    pub fn config_import_file(&self, path: &Path) -> Result<ImportReport> {
        let contents = self.fs.read_to_string(path)?;
        Ok(self.env.bulk_merge(&contents))
    }

    /// Write the store to the configured env file.
    pub fn persist_env(&self) -> Result<usize> {
        self.env.persist(self.fs.as_ref(), &self.env_file)
    }
}
