// src/config/validate.rs

use globset::Glob;

use crate::config::model::{ConfigFile, DIR_PLACEHOLDER, RawConfigFile};
use crate::errors::{Result, SupervisorError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = SupervisorError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_supervisor(cfg)?;
    validate_fetch(cfg)?;
    validate_installers(cfg)?;
    validate_entry(cfg)?;
    Ok(())
}

fn validate_supervisor(cfg: &RawConfigFile) -> Result<()> {
    if cfg.supervisor.env_file.as_os_str().is_empty() {
        return Err(SupervisorError::ConfigError(
            "[supervisor].env_file must not be empty".to_string(),
        ));
    }

    if cfg.supervisor.reserved_prefixes.iter().any(|p| p.is_empty()) {
        return Err(SupervisorError::ConfigError(
            "[supervisor].reserved_prefixes must not contain an empty prefix".to_string(),
        ));
    }

    if cfg.supervisor.stop_timeout().is_zero() {
        return Err(SupervisorError::ConfigError(
            "[supervisor].stop_timeout must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_fetch(cfg: &RawConfigFile) -> Result<()> {
    if cfg.fetch.program.trim().is_empty() {
        return Err(SupervisorError::ConfigError(
            "[fetch].program must not be empty".to_string(),
        ));
    }

    if !cfg.fetch.args.iter().any(|a| a.contains(DIR_PLACEHOLDER)) {
        return Err(SupervisorError::ConfigError(format!(
            "[fetch].args must reference the target directory via {DIR_PLACEHOLDER}"
        )));
    }

    Ok(())
}

fn validate_installers(cfg: &RawConfigFile) -> Result<()> {
    for installer in cfg.installer.iter() {
        let manifest = installer.manifest.as_str();
        if manifest.is_empty() || manifest.contains('/') || manifest.contains('\\') {
            return Err(SupervisorError::ConfigError(format!(
                "installer manifest '{}' must be a plain file name",
                manifest
            )));
        }
        if installer.program.trim().is_empty() {
            return Err(SupervisorError::ConfigError(format!(
                "installer for '{}' has an empty program",
                manifest
            )));
        }
    }
    Ok(())
}

fn validate_entry(cfg: &RawConfigFile) -> Result<()> {
    if cfg.entry.patterns.is_empty() {
        return Err(SupervisorError::ConfigError(
            "[entry].patterns must contain at least one glob".to_string(),
        ));
    }

    for pattern in cfg.entry.patterns.iter() {
        Glob::new(pattern).map_err(|e| {
            SupervisorError::ConfigError(format!(
                "[entry].patterns has invalid glob '{}': {}",
                pattern, e
            ))
        })?;
    }

    if cfg.entry.interpreter.trim().is_empty() {
        return Err(SupervisorError::ConfigError(
            "[entry].interpreter must not be empty".to_string(),
        ));
    }

    Ok(())
}
