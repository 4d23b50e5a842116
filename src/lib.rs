// src/lib.rs

pub mod cli;
pub mod config;
pub mod console;
pub mod env;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod provision;
pub mod registry;
pub mod session;
pub mod supervisor;
pub mod types;

use std::path::PathBuf;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::ConfigFile;
use crate::console::{Console, Reply};
use crate::supervisor::Supervisor;

/// Caller identity used for input read from stdin.
pub const CONSOLE_CALLER: &str = "console";

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the env store, provisioner and registry (via `Supervisor`)
/// - the console front-end on stdin/stdout
/// - Ctrl-C / EOF handling, which stops every instance before exiting
pub async fn run(args: CliArgs) -> Result<()> {
    let explicit = args.config.is_some();
    let config_path = args
        .config
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(config::default_config_path);
    let cfg = config::load_or_default(&config_path, explicit)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let supervisor = Supervisor::from_config(&cfg)?;

    let (outbox_tx, mut outbox_rx) = mpsc::channel::<Reply>(64);
    let printer = tokio::spawn(async move {
        while let Some(reply) = outbox_rx.recv().await {
            println!("{}\n", reply.text);
        }
    });

    let console = Console::new(
        supervisor.clone(),
        cfg.supervisor.session_ttl(),
        outbox_tx,
    );

    info!("supervisor ready; reading commands from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) if line.trim().is_empty() => continue,
                    Some(line) => console.handle(CONSOLE_CALLER, &line).await?,
                    None => {
                        debug!("stdin closed");
                        break;
                    }
                }
            }
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    warn!(error = %e, "failed to listen for Ctrl+C");
                }
                info!("shutdown requested");
                break;
            }
        }
    }

    for (id, outcome) in supervisor.shutdown().await {
        info!(id = %id, ?outcome, "instance stopped at shutdown");
    }

    // Deploys still in flight keep the outbox open; do not wait on them.
    drop(console);
    if tokio::time::timeout(supervisor.stop_timeout(), printer)
        .await
        .is_err()
    {
        debug!("reply printer still busy at exit");
    }
    Ok(())
}

/// Print the effective configuration.
fn print_dry_run(cfg: &ConfigFile) {
    let sup = &cfg.supervisor;
    println!("repovisor dry-run");
    println!("  supervisor.workspace_root = {}", sup.workspace_root.display());
    println!("  supervisor.env_file = {}", sup.env_file.display());
    println!("  supervisor.reserved_prefixes = {:?}", sup.reserved_prefixes);
    println!("  supervisor.stop_timeout = {:?}", sup.stop_timeout());
    println!("  supervisor.session_ttl = {:?}", sup.session_ttl());
    println!("  supervisor.load_env_on_start = {}", sup.load_env_on_start);
    println!();

    println!("fetch: {} {}", cfg.fetch.program, cfg.fetch.args.join(" "));

    println!("installers ({}):", cfg.installer.len());
    for installer in cfg.installer.iter() {
        println!(
            "  - {}: {} {}",
            installer.manifest,
            installer.program,
            installer.args.join(" ")
        );
    }

    println!("entry:");
    println!("  patterns: {:?}", cfg.entry.patterns);
    println!("  interpreter: {}", cfg.entry.interpreter);
    if !cfg.entry.args.is_empty() {
        println!("  args: {:?}", cfg.entry.args);
    }

    debug!("dry-run complete (no execution)");
}
