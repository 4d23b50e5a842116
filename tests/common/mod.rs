#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

pub use repovisor_test_utils::builders::ConfigFileBuilder;
pub use repovisor_test_utils::fake_tools::FakeToolRunner;
pub use repovisor_test_utils::{init_tracing, wait_until, with_timeout};

use repovisor::config::ConfigFile;
use repovisor::fs::RealFileSystem;
use repovisor::supervisor::Supervisor;

/// Entry script that runs until signalled.
pub const LONG_RUNNING: &str = "exec sleep 30\n";

/// Entry script that exits immediately with status 3.
pub const CRASHING: &str = "exit 3\n";

/// Entry script that ignores SIGTERM once it has written `ready`.
pub const STUBBORN: &str = "trap '' TERM\ntouch ready\nwhile :; do sleep 0.05; done\n";

pub fn sh_config(root: &Path) -> ConfigFile {
    ConfigFileBuilder::new().in_dir(root).build()
}

/// Supervisor on the real filesystem, with fake fetch/install tools.
pub fn supervisor(cfg: &ConfigFile, tools: &FakeToolRunner) -> Supervisor {
    Supervisor::with_backends(cfg, Arc::new(RealFileSystem), Arc::new(tools.clone()))
        .expect("supervisor should build")
}
