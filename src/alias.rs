use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{Mutex, OnceLock},
};

use crate::trace::{CORES, TraceScheme, TraceSet};

/// Alias files currently on disk, for the interrupt handler.
fn registry() -> &'static Mutex<Vec<PathBuf>> {
    static LIVE: OnceLock<Mutex<Vec<PathBuf>>> = OnceLock::new();
    LIVE.get_or_init(|| Mutex::new(Vec::new()))
}

fn register(path: &Path) {
    if let Ok(mut live) = registry().lock() {
        live.push(path.to_path_buf());
    }
}

fn unregister(path: &Path) {
    if let Ok(mut live) = registry().lock() {
        live.retain(|p| p != path);
    }
}

/// Removes every registered alias. Returns how many were removed.
pub fn remove_registered() -> usize {
    let paths = match registry().lock() {
        Ok(mut live) => std::mem::take(&mut *live),
        Err(_) => return 0,
    };
    paths.iter().filter(|p| fs::remove_file(p).is_ok()).count()
}

/// Installs a SIGINT handler that removes live aliases before exiting.
pub fn install_interrupt_cleanup() {
    if let Err(e) = ctrlc::set_handler(|| {
        let removed = remove_registered();
        eprintln!("Interrupted, removed {removed} alias file(s)");
        std::process::exit(130);
    }) {
        tracing::warn!("Could not install interrupt handler: {e}");
    }
}

#[cfg(unix)]
fn make_alias(src: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(std::path::absolute(src)?, dst)
}

#[cfg(not(unix))]
fn make_alias(src: &Path, dst: &Path) -> io::Result<()> {
    fs::copy(src, dst).map(|_| ())
}

/// Registers `dst` before it exists so an interrupt can never see an
/// unregistered alias; a failed creation is unregistered again.
fn create_registered(
    src: &Path,
    dst: &Path,
    make: impl FnOnce(&Path, &Path) -> io::Result<()>,
) -> io::Result<()> {
    register(dst);
    make(src, dst).inspect_err(|_| unregister(dst))
}

/// Proc-scheme files created for one test case's sweep.
///
/// Dropping the set deletes exactly the files it created, whatever happened
/// in between.
#[derive(Debug, Default)]
pub struct AliasSet {
    created: Vec<PathBuf>,
}

impl AliasSet {
    /// For each core with an indexed file but no proc file, creates the proc
    /// file as a symlink (copy where symlinks are unavailable). Existing proc
    /// files are left alone. Failures are logged and skipped.
    pub fn materialize(traces: &TraceSet) -> Self {
        let mut set = Self::default();
        for core in CORES {
            let src = traces.path(TraceScheme::Indexed, core);
            let dst = traces.path(TraceScheme::Proc, core);
            if !src.exists() || dst.symlink_metadata().is_ok() {
                continue;
            }
            tracing::info!("Creating link: {} -> {}", src.display(), dst.display());
            match create_registered(&src, &dst, make_alias) {
                Ok(()) => set.created.push(dst),
                Err(e) => tracing::warn!("Failed to create link {}: {e}", dst.display()),
            }
        }
        set
    }

    pub fn created(&self) -> &[PathBuf] {
        &self.created
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
    }
}

impl Drop for AliasSet {
    fn drop(&mut self) {
        for path in self.created.drain(..) {
            match fs::remove_file(&path) {
                Ok(()) => tracing::info!("Removed temporary file: {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove {}: {e}", path.display()),
            }
            unregister(&path);
        }
    }
}
