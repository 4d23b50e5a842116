// src/console/mod.rs

//! Text command front-end.
//!
//! Turns input lines from a caller into calls on the [`Supervisor`] and
//! sends plain-text replies to an outbox. Transport is up to the caller:
//! the binary feeds stdin lines and prints the outbox, but any chat bridge
//! could do the same.
//!
//! Deployments run in the background; their progress and result arrive on
//! the outbox later, so one slow clone never blocks other commands.

pub mod command;
pub mod render;

use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::registry::DeployProgress;
use crate::session::{PendingAction, Sessions};
use crate::supervisor::Supervisor;
use crate::types::InstanceId;

pub use command::Command;

/// A message addressed to one caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub caller: String,
    pub text: String,
}

pub struct Console {
    supervisor: Supervisor,
    sessions: Mutex<Sessions>,
    outbox: mpsc::Sender<Reply>,
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console")
            .field("supervisor", &self.supervisor)
            .finish_non_exhaustive()
    }
}

impl Console {
    pub fn new(supervisor: Supervisor, session_ttl: Duration, outbox: mpsc::Sender<Reply>) -> Self {
        Self {
            supervisor,
            sessions: Mutex::new(Sessions::new(session_ttl)),
            outbox,
        }
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Handle one input line from `caller`.
    ///
    /// Errors are only returned when the outbox is closed; everything else
    /// is reported to the caller as a reply.
    pub async fn handle(&self, caller: &str, line: &str) -> Result<()> {
        let command = Command::parse(line);
        debug!(caller, ?command, "console command");
        let now = Instant::now();

        let text = match command {
            Command::Start => render::start_text(),
            Command::Help => render::help_text(),
            Command::VarsMenu => render::vars_menu_text(),
            Command::ShowVars => render::vars(&self.supervisor.config_list()),

            Command::Host(None) => "Please provide a repository URL: /host <repo>".to_string(),
            Command::Host(Some(source_ref)) => {
                self.start_deploy(caller, source_ref);
                return Ok(());
            }

            Command::Stop(None) => "Provide an instance id (/list to see ids)".to_string(),
            Command::Stop(Some(id)) => {
                let id = InstanceId::from(id);
                match self.supervisor.stop(&id).await {
                    Ok(outcome) => render::stopped(&id, &outcome),
                    Err(e) => render::error(&e),
                }
            }

            Command::List => render::instances(&self.supervisor.list()),

            Command::EditVar => self.begin(
                caller,
                PendingAction::Edit,
                now,
                "Enter the variable to edit as VAR_NAME=new_value",
            ),
            Command::AddVar => self.begin(
                caller,
                PendingAction::Add,
                now,
                "Enter the new variable as VAR_NAME=value",
            ),
            Command::DelVar => self.begin(
                caller,
                PendingAction::Delete,
                now,
                "Enter the name of the variable to delete",
            ),
            Command::Cancel => {
                if self.sessions().cancel(caller, now) {
                    "Operation cancelled".to_string()
                } else {
                    "Nothing to cancel".to_string()
                }
            }

            Command::Import(None) => "Please provide a .env file: /import <file.env>".to_string(),
            Command::Import(Some(path)) => self.import(&path),
            Command::Save => match self.supervisor.persist_env() {
                Ok(count) => format!(
                    "Saved {count} variables to {}",
                    self.supervisor.env_file().display()
                ),
                Err(e) => render::error(&e),
            },

            Command::Unknown(name) => format!("Unknown command /{name}. Type /help"),
            Command::Text(text) => self.continue_session(caller, &text, now),
        };

        self.send(caller, text).await
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, Sessions> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, caller: &str, action: PendingAction, now: Instant, prompt: &str) -> String {
        let mut sessions = self.sessions();
        sessions.purge_expired(now);
        sessions.begin(caller, action, now);
        render::key_list(prompt, &self.supervisor.config_list())
    }

    fn continue_session(&self, caller: &str, text: &str, now: Instant) -> String {
        let action = self.sessions().take(caller, now);
        match action {
            None => "Unknown input. Type /help for available commands".to_string(),
            Some(PendingAction::Edit) => match text.split_once('=') {
                Some((key, value)) => {
                    let key = key.trim();
                    match self.supervisor.config_update(key, value) {
                        Ok(()) => self.with_persist(format!("Updated {key}")),
                        Err(e) => render::error(&e),
                    }
                }
                None => "Invalid format. Use: VAR_NAME=new_value".to_string(),
            },
            Some(PendingAction::Add) => match text.split_once('=') {
                Some((key, value)) => {
                    let key = key.trim();
                    match self.supervisor.config_set(key, value) {
                        Ok(()) => self.with_persist(format!("Added {key}")),
                        Err(e) => render::error(&e),
                    }
                }
                None => "Invalid format. Use: VAR_NAME=value".to_string(),
            },
            Some(PendingAction::Delete) => {
                let key = text.trim();
                let visible = !self.supervisor.env().is_reserved(key);
                if visible && self.supervisor.config_delete(key) {
                    self.with_persist(format!("Deleted {key}"))
                } else {
                    format!("Variable {key} not found")
                }
            }
        }
    }

    /// Persist after a successful edit and append any failure to `message`.
    fn with_persist(&self, message: String) -> String {
        match self.supervisor.persist_env() {
            Ok(_) => message,
            Err(e) => {
                warn!(error = %e, "persisting env after edit failed");
                format!("{message}\n{}", render::error(&e))
            }
        }
    }

    fn import(&self, path: &str) -> String {
        if !path.ends_with(".env") {
            return "Please provide a .env file".to_string();
        }
        match self.supervisor.config_import_file(Path::new(path)) {
            Ok(report) => render::import_report(&report),
            Err(e) => render::error(&e),
        }
    }

    fn start_deploy(&self, caller: &str, source_ref: String) {
        let (progress_tx, mut progress_rx) = mpsc::channel::<DeployProgress>(8);
        let handle = self
            .supervisor
            .deploy_in_background(source_ref, Some(progress_tx));

        let outbox = self.outbox.clone();
        let caller = caller.to_string();
        tokio::spawn(async move {
            while let Some(event) = progress_rx.recv().await {
                let reply = Reply {
                    caller: caller.clone(),
                    text: render::progress(&event),
                };
                if outbox.send(reply).await.is_err() {
                    return;
                }
            }

            // The progress sender is dropped once the deploy finishes.
            let text = match handle.await {
                Ok(Ok(deployment)) => render::deployed(&deployment),
                Ok(Err(e)) => render::error(&e),
                Err(e) => format!("Error: deploy task failed: {e}"),
            };
            let _ = outbox.send(Reply { caller, text }).await;
        });
    }

    async fn send(&self, caller: &str, text: String) -> Result<()> {
        self.outbox
            .send(Reply {
                caller: caller.to_string(),
                text,
            })
            .await
            .map_err(|e| anyhow::anyhow!("console outbox closed: {e}"))?;
        Ok(())
    }
}
