// src/provision/entry.rs

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::fs::FileSystem;

/// Compiled file-name patterns that mark a file as a runnable candidate.
#[derive(Clone)]
pub struct EntryMatcher {
    patterns: Vec<String>,
    set: GlobSet,
}

impl fmt::Debug for EntryMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryMatcher")
            .field("patterns", &self.patterns)
            .finish_non_exhaustive()
    }
}

impl EntryMatcher {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern)
                .with_context(|| format!("invalid entry pattern '{}'", pattern))?;
            builder.add(glob);
        }
        let set = builder.build().context("building entry pattern set")?;
        Ok(Self {
            patterns: patterns.to_vec(),
            set,
        })
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.set.is_match(file_name)
    }
}

/// Candidate entry points directly inside `dir`, sorted by file name.
///
/// Subdirectories are not searched.
pub fn entry_candidates(
    fs: &dyn FileSystem,
    dir: &Path,
    matcher: &EntryMatcher,
) -> Result<Vec<PathBuf>> {
    let mut candidates: Vec<(String, PathBuf)> = fs
        .read_dir(dir)?
        .into_iter()
        .filter(|path| fs.is_file(path))
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?.to_string();
            matcher.matches(&name).then_some((name, path))
        })
        .collect();

    candidates.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(candidates.into_iter().map(|(_, path)| path).collect())
}
