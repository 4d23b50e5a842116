// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Every variant names the thing that failed (source reference, directory,
//! instance id, key, path) so a front-end can render a specific message.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("failed to fetch '{source_ref}': {reason}")]
    Fetch { source_ref: String, reason: String },

    #[error("dependency install failed in {work_dir:?}: {reason}")]
    Install { work_dir: PathBuf, reason: String },

    #[error("no entry point found in {work_dir:?}")]
    NoEntryPoint { work_dir: PathBuf },

    #[error("failed to spawn {entry_point:?}: {reason}")]
    Spawn { entry_point: PathBuf, reason: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: NotFoundKind, id: String },

    #[error("failed to persist environment to {path:?}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid variable name '{key}': {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: &'static str },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// What kind of target a `NotFound` error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundKind {
    Instance,
    Variable,
}

impl std::fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotFoundKind::Instance => f.write_str("instance"),
            NotFoundKind::Variable => f.write_str("variable"),
        }
    }
}

impl SupervisorError {
    pub fn instance_not_found(id: impl Into<String>) -> Self {
        SupervisorError::NotFound {
            kind: NotFoundKind::Instance,
            id: id.into(),
        }
    }

    pub fn variable_not_found(key: impl Into<String>) -> Self {
        SupervisorError::NotFound {
            kind: NotFoundKind::Variable,
            id: key.into(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, SupervisorError>;
