// src/env/store.rs

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

use crate::env::format::{self, MalformedReason, ParsedLine};
use crate::errors::{Result, SupervisorError};
use crate::fs::FileSystem;

/// One key/value pair as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
}

/// A line that was skipped during a bulk import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedLine {
    /// 1-based line number within the imported text.
    pub line_no: usize,
    pub line: String,
    pub reason: MalformedReason,
}

/// Summary of a bulk import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Number of lines applied with `set` semantics, duplicates included.
    pub applied: usize,
    pub skipped: Vec<MalformedLine>,
}

/// Frozen copy of the non-reserved entries, bound to one spawned instance.
pub type EnvSnapshot = BTreeMap<String, String>;

/// Shared, in-memory environment store.
///
/// Cloning is cheap and yields another handle to the same entries. Keys with
/// a reserved prefix may be stored, but never leave the store: they are
/// filtered out of `list`, `get`, `snapshot` and `persist`.
#[derive(Debug, Clone)]
pub struct EnvStore {
    entries: Arc<RwLock<BTreeMap<String, String>>>,
    reserved_prefixes: Arc<[String]>,
}

impl EnvStore {
    pub fn new<I, S>(reserved_prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
            reserved_prefixes: reserved_prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_reserved(&self, key: &str) -> bool {
        self.reserved_prefixes.iter().any(|p| key.starts_with(p.as_str()))
    }

    /// All non-reserved entries, ordered by key.
    pub fn list(&self) -> Vec<ConfigEntry> {
        self.read()
            .iter()
            .filter(|(k, _)| !self.is_reserved(k))
            .map(|(k, v)| ConfigEntry {
                key: k.clone(),
                value: v.clone(),
            })
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if self.is_reserved(key) {
            return None;
        }
        self.read().get(key).cloned()
    }

    /// Number of non-reserved entries.
    pub fn len(&self) -> usize {
        self.read().keys().filter(|k| !self.is_reserved(k)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create or overwrite `key`.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        check_entry(key, value)?;
        let previous = self.write().insert(key.to_string(), value.to_string());
        debug!(key, replaced = previous.is_some(), "env var set");
        Ok(())
    }

    /// Overwrite an existing, visible `key`; unknown keys are `NotFound`.
    pub fn update(&self, key: &str, value: &str) -> Result<()> {
        check_entry(key, value)?;
        if self.is_reserved(key) {
            return Err(SupervisorError::variable_not_found(key));
        }
        let mut entries = self.write();
        match entries.get_mut(key) {
            Some(slot) => {
                *slot = value.to_string();
                debug!(key, "env var updated");
                Ok(())
            }
            None => Err(SupervisorError::variable_not_found(key)),
        }
    }

    /// Remove `key`; returns whether it existed.
    pub fn delete(&self, key: &str) -> bool {
        let existed = self.write().remove(key).is_some();
        debug!(key, existed, "env var delete");
        existed
    }

    /// Copy of the non-reserved entries for injection into a child.
    pub fn snapshot(&self) -> EnvSnapshot {
        self.read()
            .iter()
            .filter(|(k, _)| !self.is_reserved(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Merge `key=value` lines into the store.
    ///
    /// Malformed lines are skipped and reported; the rest of the batch is
    /// still applied, in order, so the last occurrence of a key wins.
    pub fn bulk_merge(&self, source: &str) -> ImportReport {
        let mut report = ImportReport::default();
        let mut entries = self.write();

        for (idx, raw) in source.lines().enumerate() {
            match format::parse_line(raw) {
                ParsedLine::Blank | ParsedLine::Comment => {}
                ParsedLine::Entry { key, value } => {
                    entries.insert(key.to_string(), value.to_string());
                    report.applied += 1;
                }
                ParsedLine::Malformed(reason) => {
                    warn!(line_no = idx + 1, %reason, "skipping malformed env line");
                    report.skipped.push(MalformedLine {
                        line_no: idx + 1,
                        line: raw.to_string(),
                        reason,
                    });
                }
            }
        }

        info!(
            applied = report.applied,
            skipped = report.skipped.len(),
            "merged env vars"
        );
        report
    }

    /// Read `path` through `fs` and merge it. A missing file is not an error.
    pub fn load(&self, fs: &dyn FileSystem, path: &Path) -> Result<ImportReport> {
        if !fs.exists(path) {
            debug!(path = ?path, "no persisted env file to load");
            return Ok(ImportReport::default());
        }
        let contents = fs.read_to_string(path)?;
        Ok(self.bulk_merge(&contents))
    }

    /// Overwrite `path` with every non-reserved entry; returns how many
    /// entries were written.
    ///
    /// Mutations are blocked for the duration of the write. The write is not
    /// atomic: a crash mid-write can leave a truncated file behind.
    pub fn persist(&self, fs: &dyn FileSystem, path: &Path) -> Result<usize> {
        let entries = self.read();
        let visible: Vec<(&str, &str)> = entries
            .iter()
            .filter(|(k, _)| !self.is_reserved(k))
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let rendered = format::render(visible.iter().copied());
        fs.write(path, rendered.as_bytes())
            .map_err(|source| SupervisorError::Persist {
                path: path.to_path_buf(),
                source,
            })?;

        info!(path = ?path, entries = visible.len(), "persisted env vars");
        Ok(visible.len())
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, String>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, String>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn check_entry(key: &str, value: &str) -> Result<()> {
    format::validate_key(key).map_err(|reason| SupervisorError::InvalidKey {
        key: key.to_string(),
        reason,
    })?;
    format::validate_value(value).map_err(|reason| SupervisorError::InvalidValue {
        key: key.to_string(),
        reason,
    })
}
