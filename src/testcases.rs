use std::{
    fs::{self, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use anyhow::{Context, Result, anyhow};
use regex::Regex;

use crate::trace::{CORES, TraceScheme};

static NUMERIC_TRACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)_[0-3]\.trace$").expect("valid regex"));

pub const DEFAULT_DIR: &str = "header/Test_cases";

/// Outcome of allocating one placeholder trace quadruple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTraceSet {
    pub prefix: u64,
    pub created: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

/// Parses an explicit prefix argument.
pub fn parse_prefix(arg: &str) -> Result<u64> {
    arg.trim()
        .parse()
        .with_context(|| format!("Invalid prefix '{arg}', must be a non-negative integer."))
}

/// Highest numeric prefix among `<n>_<core>.trace` files, if any.
pub fn highest_prefix(dir: &Path) -> Result<Option<u64>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Unable to read {}", dir.display()))?;
    let mut highest = None;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        // Prefixes too large for u64 are ignored.
        if let Some(n) = NUMERIC_TRACE
            .captures(name)
            .and_then(|c| c[1].parse::<u64>().ok())
        {
            highest = highest.max(Some(n));
        }
    }
    Ok(highest)
}

pub fn next_prefix(dir: &Path) -> Result<u64> {
    match highest_prefix(dir)? {
        None => Ok(0),
        Some(n) => n
            .checked_add(1)
            .ok_or_else(|| anyhow!("No free prefix after {n} in {}", dir.display())),
    }
}

/// Creates empty `<prefix>_<core>.trace` files for cores 0-3 under `dir`,
/// creating `dir` if needed. Without an explicit prefix the next free
/// number is used. Existing files are skipped, never truncated.
///
/// Allocation is not atomic: two concurrent callers may pick the same prefix.
pub fn create(dir: &Path, prefix: Option<u64>) -> Result<NewTraceSet> {
    fs::create_dir_all(dir).with_context(|| format!("Unable to create {}", dir.display()))?;
    let prefix = match prefix {
        Some(prefix) => prefix,
        None => next_prefix(dir)?,
    };
    let stem = prefix.to_string();

    let mut created = Vec::new();
    let mut skipped = Vec::new();
    for core in CORES {
        let path = dir.join(TraceScheme::Indexed.file_name(&stem, core));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => created.push(path),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                tracing::warn!("{} already exists, skipping.", path.display());
                skipped.push(path);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Unable to create {}", path.display()));
            }
        }
    }
    Ok(NewTraceSet {
        prefix,
        created,
        skipped,
    })
}
