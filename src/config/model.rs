// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::HumanDuration;

/// Placeholder in fetch arguments replaced by the source reference.
pub const SOURCE_PLACEHOLDER: &str = "{source}";
/// Placeholder in fetch arguments replaced by the target directory.
pub const DIR_PLACEHOLDER: &str = "{dir}";

/// Supervisor configuration as read from a TOML file, before validation.
///
/// ```toml
/// [supervisor]
/// workspace_root = "/srv/bots"
/// env_file = "persistent.env"
/// reserved_prefixes = ["RENDER_"]
///
/// [fetch]
/// program = "git"
/// args = ["clone", "{source}", "{dir}"]
///
/// [[installer]]
/// manifest = "requirements.txt"
/// program = "pip"
/// args = ["install", "-r", "requirements.txt"]
///
/// [entry]
/// patterns = ["*.py"]
/// interpreter = "python"
/// ```
///
/// Every section is optional.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub supervisor: SupervisorSection,

    #[serde(default)]
    pub fetch: FetchSection,

    /// Checked in order; the first manifest present at the repository root
    /// selects the installer.
    #[serde(default = "default_installers")]
    pub installer: Vec<InstallerConfig>,

    #[serde(default)]
    pub entry: EntrySection,
}

/// Validated configuration. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub supervisor: SupervisorSection,
    pub fetch: FetchSection,
    pub installer: Vec<InstallerConfig>,
    pub entry: EntrySection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            supervisor: raw.supervisor,
            fetch: raw.fetch,
            installer: raw.installer,
            entry: raw.entry,
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new_unchecked(RawConfigFile {
            installer: default_installers(),
            ..RawConfigFile::default()
        })
    }
}

/// `[supervisor]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorSection {
    /// Directory under which every deployment gets its own `bot_<id>` dir.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,

    /// Destination of `persist` and source of the start-up load.
    #[serde(default = "default_env_file")]
    pub env_file: PathBuf,

    /// Keys starting with any of these never leave the store.
    #[serde(default = "default_reserved_prefixes")]
    pub reserved_prefixes: Vec<String>,

    /// How long a confirmed stop waits before killing the child.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: HumanDuration,

    /// Idle time after which a half-finished edit conversation is dropped.
    #[serde(default = "default_session_ttl")]
    pub session_ttl: HumanDuration,

    /// Merge `env_file` into the store at start-up if it exists.
    #[serde(default = "default_true")]
    pub load_env_on_start: bool,
}

impl SupervisorSection {
    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout.get()
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl.get()
    }
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            env_file: default_env_file(),
            reserved_prefixes: default_reserved_prefixes(),
            stop_timeout: default_stop_timeout(),
            session_ttl: default_session_ttl(),
            load_env_on_start: true,
        }
    }
}

/// `[fetch]` section: the command that materializes a repository.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchSection {
    #[serde(default = "default_fetch_program")]
    pub program: String,

    /// `{source}` and `{dir}` are substituted per deployment.
    #[serde(default = "default_fetch_args")]
    pub args: Vec<String>,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            program: default_fetch_program(),
            args: default_fetch_args(),
        }
    }
}

/// `[[installer]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct InstallerConfig {
    /// File name looked up at the repository root, e.g. `requirements.txt`.
    pub manifest: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// `[entry]` section: how the program to run is chosen and launched.
#[derive(Debug, Clone, Deserialize)]
pub struct EntrySection {
    /// Globs matched against file names directly inside the work dir.
    #[serde(default = "default_entry_patterns")]
    pub patterns: Vec<String>,

    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Extra arguments placed before the entry point path.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for EntrySection {
    fn default() -> Self {
        Self {
            patterns: default_entry_patterns(),
            interpreter: default_interpreter(),
            args: Vec::new(),
        }
    }
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_env_file() -> PathBuf {
    PathBuf::from("persistent.env")
}

fn default_reserved_prefixes() -> Vec<String> {
    vec!["RENDER_".to_string()]
}

fn default_stop_timeout() -> HumanDuration {
    HumanDuration(Duration::from_secs(5))
}

fn default_session_ttl() -> HumanDuration {
    HumanDuration(Duration::from_secs(5 * 60))
}

fn default_true() -> bool {
    true
}

fn default_fetch_program() -> String {
    "git".to_string()
}

fn default_fetch_args() -> Vec<String> {
    vec![
        "clone".to_string(),
        SOURCE_PLACEHOLDER.to_string(),
        DIR_PLACEHOLDER.to_string(),
    ]
}

pub fn default_installers() -> Vec<InstallerConfig> {
    vec![InstallerConfig {
        manifest: "requirements.txt".to_string(),
        program: "pip".to_string(),
        args: vec![
            "install".to_string(),
            "-r".to_string(),
            "requirements.txt".to_string(),
        ],
    }]
}

fn default_entry_patterns() -> Vec<String> {
    vec!["*.py".to_string()]
}

fn default_interpreter() -> String {
    "python".to_string()
}
