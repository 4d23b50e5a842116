#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use repovisor::config::{ConfigFile, InstallerConfig, RawConfigFile};
use repovisor::config::model::default_installers;
use repovisor::types::HumanDuration;

/// Builder for `ConfigFile` to simplify test setup.
///
/// Starts from the built-in defaults except for the entry section, which
/// runs `*.sh` files with `sh` so tests do not depend on a Python install.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        let mut config = RawConfigFile {
            installer: default_installers(),
            ..RawConfigFile::default()
        };
        config.entry.patterns = vec!["*.sh".to_string()];
        config.entry.interpreter = "sh".to_string();
        config.supervisor.stop_timeout = HumanDuration(Duration::from_secs(2));
        Self { config }
    }

    /// Put work dirs and the env file under `root`.
    pub fn in_dir(mut self, root: &Path) -> Self {
        self.config.supervisor.workspace_root = root.to_path_buf();
        self.config.supervisor.env_file = root.join("persistent.env");
        self
    }

    pub fn with_env_file(mut self, path: impl AsRef<Path>) -> Self {
        self.config.supervisor.env_file = path.as_ref().to_path_buf();
        self
    }

    pub fn with_reserved_prefixes(mut self, prefixes: &[&str]) -> Self {
        self.config.supervisor.reserved_prefixes =
            prefixes.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.config.supervisor.stop_timeout = HumanDuration(timeout);
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.config.supervisor.session_ttl = HumanDuration(ttl);
        self
    }

    pub fn load_env_on_start(mut self, val: bool) -> Self {
        self.config.supervisor.load_env_on_start = val;
        self
    }

    pub fn with_entry(mut self, patterns: &[&str], interpreter: &str) -> Self {
        self.config.entry.patterns = patterns.iter().map(|p| p.to_string()).collect();
        self.config.entry.interpreter = interpreter.to_string();
        self
    }

    pub fn with_installer(mut self, manifest: &str, program: &str, args: &[&str]) -> Self {
        self.config.installer.push(InstallerConfig {
            manifest: manifest.to_string(),
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        });
        self
    }

    pub fn without_installers(mut self) -> Self {
        self.config.installer.clear();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}
