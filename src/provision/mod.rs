// src/provision/mod.rs

//! Turning a source reference into a ready-to-run working directory.
//!
//! - [`runner`] abstracts the external fetch/install tools.
//! - [`entry`] implements the entry-point selection heuristic: first file,
//!   in lexicographic order, whose name matches one of the entry patterns.

pub mod entry;
pub mod runner;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::model::{DIR_PLACEHOLDER, SOURCE_PLACEHOLDER};
use crate::config::{ConfigFile, FetchSection, InstallerConfig};
use crate::errors::{Result, SupervisorError};
use crate::fs::FileSystem;

pub use entry::{EntryMatcher, entry_candidates};
pub use runner::{RealToolRunner, ToolInvocation, ToolOutput, ToolRunner};

/// Materializes repositories and installs their dependencies.
#[derive(Clone)]
pub struct Provisioner {
    fs: Arc<dyn FileSystem>,
    tools: Arc<dyn ToolRunner>,
    fetch: FetchSection,
    installers: Vec<InstallerConfig>,
    matcher: EntryMatcher,
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("fetch", &self.fetch)
            .field("installers", &self.installers)
            .field("matcher", &self.matcher)
            .finish_non_exhaustive()
    }
}

impl Provisioner {
    pub fn new(
        cfg: &ConfigFile,
        fs: Arc<dyn FileSystem>,
        tools: Arc<dyn ToolRunner>,
    ) -> Result<Self> {
        let matcher = EntryMatcher::new(&cfg.entry.patterns)?;
        Ok(Self {
            fs,
            tools,
            fetch: cfg.fetch.clone(),
            installers: cfg.installer.clone(),
            matcher,
        })
    }

    /// Create `work_dir` and fetch `source_ref` into it.
    pub async fn materialize(&self, source_ref: &str, work_dir: &Path) -> Result<()> {
        let fetch_err = |reason: String| SupervisorError::Fetch {
            source_ref: source_ref.to_string(),
            reason,
        };

        self.fs
            .create_dir_all(work_dir)
            .map_err(|e| fetch_err(format!("{e:#}")))?;

        let invocation = self.fetch_invocation(source_ref, work_dir);
        info!(source_ref, work_dir = ?work_dir, tool = %invocation, "fetching repository");

        let output = self
            .tools
            .run(&invocation)
            .await
            .map_err(|e| fetch_err(format!("{e:#}")))?;

        if !output.success {
            return Err(fetch_err(output.failure_reason(&invocation)));
        }

        debug!(source_ref, "repository fetched");
        Ok(())
    }

    /// Run the installer for the first manifest found at the root of
    /// `work_dir`. Returns the manifest name, or `None` when there is
    /// nothing to install.
    pub async fn install_dependencies(&self, work_dir: &Path) -> Result<Option<String>> {
        match self.installer_for(work_dir) {
            Some(installer) => {
                self.run_installer(work_dir, installer).await?;
                Ok(Some(installer.manifest.clone()))
            }
            None => {
                debug!(work_dir = ?work_dir, "no dependency manifest; skipping install");
                Ok(None)
            }
        }
    }

    /// First configured installer whose manifest exists in `work_dir`.
    pub fn installer_for(&self, work_dir: &Path) -> Option<&InstallerConfig> {
        self.installers
            .iter()
            .find(|i| self.fs.is_file(&work_dir.join(&i.manifest)))
    }

    pub async fn run_installer(&self, work_dir: &Path, installer: &InstallerConfig) -> Result<()> {
        let invocation = ToolInvocation::new(&installer.program, installer.args.clone())
            .in_dir(work_dir);
        info!(
            work_dir = ?work_dir,
            manifest = %installer.manifest,
            tool = %invocation,
            "installing dependencies"
        );

        let install_err = |reason: String| SupervisorError::Install {
            work_dir: work_dir.to_path_buf(),
            reason,
        };

        let output = self
            .tools
            .run(&invocation)
            .await
            .map_err(|e| install_err(format!("{e:#}")))?;

        if !output.success {
            return Err(install_err(output.failure_reason(&invocation)));
        }
        Ok(())
    }

    /// Pick the program to run inside `work_dir`.
    pub fn locate_entry_point(&self, work_dir: &Path) -> Result<PathBuf> {
        let candidates = entry_candidates(self.fs.as_ref(), work_dir, &self.matcher)?;
        debug!(work_dir = ?work_dir, ?candidates, "entry point candidates");

        candidates
            .into_iter()
            .next()
            .ok_or_else(|| SupervisorError::NoEntryPoint {
                work_dir: work_dir.to_path_buf(),
            })
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    fn fetch_invocation(&self, source_ref: &str, work_dir: &Path) -> ToolInvocation {
        let dir = work_dir.to_string_lossy();
        let args = self
            .fetch
            .args
            .iter()
            .map(|a| {
                a.replace(SOURCE_PLACEHOLDER, source_ref)
                    .replace(DIR_PLACEHOLDER, &dir)
            })
            .collect();
        ToolInvocation::new(&self.fetch.program, args)
    }
}
