use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use anyhow::{Context, Result};
use regex::Regex;

pub const CORES: [u8; 4] = [0, 1, 2, 3];

static PROC_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)_proc[0-3]\.trace$").expect("valid regex"));
static INDEXED_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)_[0-3]\.trace$").expect("valid regex"));

/// The two per-core naming conventions a trace set may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceScheme {
    /// `<prefix>_proc<core>.trace`, the only one the simulator reads.
    Proc,
    /// `<prefix>_<core>.trace`
    Indexed,
}

impl TraceScheme {
    pub fn file_name(self, prefix: &str, core: u8) -> String {
        match self {
            TraceScheme::Proc => format!("{prefix}_proc{core}.trace"),
            TraceScheme::Indexed => format!("{prefix}_{core}.trace"),
        }
    }

    fn pattern(self) -> &'static Regex {
        match self {
            TraceScheme::Proc => &PROC_NAME,
            TraceScheme::Indexed => &INDEXED_NAME,
        }
    }
}

impl fmt::Display for TraceScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceScheme::Proc => write!(f, "proc"),
            TraceScheme::Indexed => write!(f, "indexed"),
        }
    }
}

/// A test-case directory plus the prefix its four per-core traces share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceSet {
    pub dir: PathBuf,
    pub prefix: String,
    pub scheme: TraceScheme,
}

impl TraceSet {
    /// Scans the immediate entries of `dir` for a trace prefix.
    ///
    /// Entries are visited in name order and every entry is tried against the
    /// proc scheme before the indexed scheme is considered, so a directory
    /// holding both yields the proc match. Only the naming is inspected; the
    /// presence of all four cores is not checked here.
    pub fn resolve(dir: impl AsRef<Path>) -> Result<Option<Self>> {
        let dir = dir.as_ref();
        let mut names: Vec<String> = fs::read_dir(dir)
            .with_context(|| format!("Unable to read test case dir {}", dir.display()))?
            .filter_map(|entry| {
                entry
                    .ok()
                    .and_then(|e| e.file_name().to_str().map(str::to_owned))
            })
            .collect();
        names.sort();
        tracing::debug!("Files in {}: {:?}", dir.display(), names);

        for scheme in [TraceScheme::Proc, TraceScheme::Indexed] {
            let found = names
                .iter()
                .find_map(|name| scheme.pattern().captures(name).map(|c| (name, c[1].to_string())));
            if let Some((name, prefix)) = found {
                tracing::debug!("Found {scheme} format: {name}");
                return Ok(Some(Self {
                    dir: dir.to_path_buf(),
                    prefix,
                    scheme,
                }));
            }
        }
        Ok(None)
    }

    pub fn path(&self, scheme: TraceScheme, core: u8) -> PathBuf {
        self.dir.join(scheme.file_name(&self.prefix, core))
    }

    /// Absolute `<dir>/<prefix>`, the value handed to the simulator's `-t`.
    pub fn simulator_prefix(&self) -> io::Result<PathBuf> {
        Ok(std::path::absolute(&self.dir)?.join(&self.prefix))
    }

    /// Cores whose proc-scheme file is absent.
    pub fn missing_cores(&self) -> Vec<u8> {
        CORES
            .into_iter()
            .filter(|&core| !self.path(TraceScheme::Proc, core).exists())
            .collect()
    }
}
