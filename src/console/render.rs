// src/console/render.rs

//! Plain-text rendering of replies.

use std::fmt::Write;
use std::path::Path;

use crate::env::{ConfigEntry, ImportReport};
use crate::errors::{NotFoundKind, SupervisorError};
use crate::registry::{DeployProgress, Deployment, InstanceSummary};
use crate::types::{InstanceId, StopOutcome};

pub fn start_text() -> String {
    "Repository process supervisor\n\
     \n\
     Host and manage programs from source repositories.\n\
     \n\
     /host <repo> - deploy a program\n\
     /stop <id> - stop a running instance\n\
     /list - show all instances\n\
     /vars - environment variables menu\n\
     \n\
     Need help? Type /help"
        .to_string()
}

pub fn help_text() -> String {
    "Help\n\
     \n\
     Instances:\n\
     /host <repo> - deploy from a repository\n\
     /stop <id> - stop an instance\n\
     /list - show instances\n\
     \n\
     Environment variables:\n\
     /vars - variable management menu\n\
     /show_vars - view all variables\n\
     /import <file.env> - bulk update from a .env file\n\
     /save - write variables to the persistent env file"
        .to_string()
}

pub fn vars_menu_text() -> String {
    "Variable management\n\
     \n\
     /show_vars - view all variables\n\
     /edit_var - modify an existing variable\n\
     /add_var - add a new variable\n\
     /del_var - delete a variable\n\
     /cancel - abort the current edit\n\
     \n\
     You can also /import a .env file"
        .to_string()
}

pub fn vars(entries: &[ConfigEntry]) -> String {
    if entries.is_empty() {
        return "No environment variables set".to_string();
    }
    let mut out = String::from("Environment variables\n");
    for e in entries {
        let _ = write!(out, "\n{}={}", e.key, e.value);
    }
    out
}

pub fn key_list(prompt: &str, entries: &[ConfigEntry]) -> String {
    let mut out = prompt.to_string();
    if entries.is_empty() {
        out.push_str("\n\n(no variables yet)");
        return out;
    }
    out.push_str("\n\nCurrent variables:");
    for e in entries {
        let _ = write!(out, "\n{}", e.key);
    }
    out
}

pub fn instances(list: &[InstanceSummary]) -> String {
    if list.is_empty() {
        return "No active instances".to_string();
    }
    let mut out = String::from("Instances\n");
    for inst in list {
        let _ = write!(
            out,
            "\nid: {}\nrepo: {}\nstatus: {}",
            inst.id, inst.source_ref, inst.status
        );
        if let Some(code) = inst.exit_code {
            let _ = write!(out, " (exit code {code})");
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

pub fn progress(event: &DeployProgress) -> String {
    match event {
        DeployProgress::Fetching { source_ref, .. } => format!("Cloning {source_ref}..."),
        DeployProgress::Installing { manifest, .. } => {
            format!("Installing dependencies from {manifest}...")
        }
        DeployProgress::Starting { entry_point, .. } => {
            format!("Starting {}...", display_name(entry_point))
        }
    }
}

pub fn deployed(deployment: &Deployment) -> String {
    format!(
        "Deployed!\n\nid: {}\ndir: {}",
        deployment.id,
        deployment.work_dir.display()
    )
}

pub fn stopped(id: &InstanceId, outcome: &StopOutcome) -> String {
    match outcome {
        StopOutcome::Requested => format!("Instance {id} stopping"),
        StopOutcome::Exited { .. } => format!("Instance {id} stopped"),
        StopOutcome::Killed => format!("Instance {id} killed after ignoring the stop signal"),
        StopOutcome::AlreadyExited { exit_code } => match exit_code {
            Some(code) => format!("Instance {id} had already exited (code {code}); removed"),
            None => format!("Instance {id} had already exited; removed"),
        },
    }
}

pub fn import_report(report: &ImportReport) -> String {
    let mut out = format!("Variables updated from file: {} applied", report.applied);
    if !report.skipped.is_empty() {
        let _ = write!(out, ", {} skipped", report.skipped.len());
        for line in &report.skipped {
            let _ = write!(out, "\n  line {}: {} ({})", line.line_no, line.line, line.reason);
        }
    }
    out
}

pub fn error(err: &SupervisorError) -> String {
    match err {
        SupervisorError::NotFound {
            kind: NotFoundKind::Instance,
            id,
        } => format!("Instance {id} not found"),
        SupervisorError::NotFound {
            kind: NotFoundKind::Variable,
            id,
        } => format!("Variable {id} not found"),
        other => format!("Error: {other}"),
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
