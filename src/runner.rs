use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use anyhow::{Context, Result, bail};
use tempfile::NamedTempFile;

use crate::{
    config::{CacheParams, Configuration},
    metric::{self, CycleCount, Stream},
};

/// Raw result of one simulator invocation.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub exit_code: Option<i32>, // None when killed by a signal
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// How one (test case, configuration) attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Exit 0 and a cycle count was found.
    Clean,
    /// Non-zero exit, but the output still held a cycle count.
    Salvaged,
    /// The simulator ran but no cycle count could be extracted.
    Unresolved,
    /// The simulator process could not be started.
    LaunchFailed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Clean => "ok",
            RunStatus::Salvaged => "salvaged",
            RunStatus::Unresolved => "unresolved",
            RunStatus::LaunchFailed => "launch failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub cycles: CycleCount,
    pub status: RunStatus,
}

/// Handle on the external simulator executable.
#[derive(Debug, Clone)]
pub struct Simulator {
    exe: PathBuf,
}

impl Simulator {
    /// Fails when `exe` does not exist, listing the working directory.
    pub fn locate(exe: impl AsRef<Path>) -> Result<Self> {
        let exe = exe.as_ref();
        if !exe.exists() {
            let cwd = env::current_dir().context("Unable to read current directory")?;
            let mut entries: Vec<String> = fs::read_dir(&cwd)
                .map(|rd| {
                    rd.filter_map(|e| e.ok())
                        .map(|e| e.file_name().to_string_lossy().into_owned())
                        .collect()
                })
                .unwrap_or_default();
            entries.sort();
            bail!(
                "Simulator not found at '{}'\nCurrent directory: {}\nFiles in directory: {:?}",
                exe.display(),
                cwd.display(),
                entries
            );
        }
        Ok(Self {
            exe: exe.to_path_buf(),
        })
    }

    /// Runs `<sim> --version`. Never fatal; the outcome is only logged.
    pub fn health_check(&self) {
        tracing::info!("Testing simulator...");
        match Command::new(&self.exe).arg("--version").output() {
            Ok(out) => tracing::info!(
                "Simulator test output: {}",
                String::from_utf8_lossy(&out.stdout).trim_end()
            ),
            Err(e) => tracing::warn!("Simulator test failed: {e}"),
        }
    }

    fn command(&self, trace_prefix: &Path, params: &CacheParams) -> Command {
        let mut cmd = Command::new(&self.exe);
        cmd.arg("-t")
            .arg(trace_prefix)
            .arg("-s")
            .arg(params.set_bits.to_string())
            .arg("-E")
            .arg(params.associativity.to_string())
            .arg("-b")
            .arg(params.block_bits.to_string());
        cmd
    }

    fn describe(&self, trace_prefix: &Path, params: &CacheParams) -> String {
        format!(
            "{} -t {} -s {} -E {} -b {}",
            self.exe.display(),
            trace_prefix.display(),
            params.set_bits,
            params.associativity,
            params.block_bits
        )
    }

    /// Blocks until the simulator exits. There is no timeout.
    pub fn run(&self, trace_prefix: &Path, params: &CacheParams) -> Result<RunOutput> {
        let output = self
            .command(trace_prefix, params)
            .output()
            .with_context(|| format!("Failed to launch {}", self.describe(trace_prefix, params)))?;
        Ok(RunOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Re-runs the command with stdout and stderr both sent to one temporary
    /// file and returns its contents.
    pub fn run_combined(&self, trace_prefix: &Path, params: &CacheParams) -> Result<String> {
        let artifact = NamedTempFile::new().context("Unable to create output capture file")?;
        let out = artifact.as_file().try_clone()?;
        let err = artifact.as_file().try_clone()?;
        self.command(trace_prefix, params)
            .stdout(Stdio::from(out))
            .stderr(Stdio::from(err))
            .status()
            .with_context(|| format!("Failed to launch {}", self.describe(trace_prefix, params)))?;
        let bytes = fs::read(artifact.path())
            .with_context(|| format!("Unable to read {}", artifact.path().display()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Runs one configuration and extracts its cycle count.
    ///
    /// A non-zero exit only produces a warning; extraction still runs on
    /// whatever was printed. A degenerate count (0, 1 or none) triggers one
    /// verification re-run whose result replaces it only if it finds a count.
    pub fn attempt(&self, trace_prefix: &Path, config: &Configuration) -> Attempt {
        let params = &config.params;
        tracing::info!("Running: {}", self.describe(trace_prefix, params));
        tracing::debug!("Parameters for {}: {}", config.label, params);

        let output = match self.run(trace_prefix, params) {
            Ok(output) => output,
            Err(e) => {
                tracing::error!("{}: {e:#}", config.label);
                return Attempt {
                    cycles: CycleCount::Unresolved,
                    status: RunStatus::LaunchFailed,
                };
            }
        };
        if !output.success() {
            match output.exit_code {
                Some(code) => tracing::warn!("Command returned non-zero exit code: {code}"),
                None => tracing::warn!("Command terminated by a signal"),
            }
            tracing::warn!("STDERR: {}", output.stderr);
        }
        tracing::debug!("--- STDOUT START ---\n{}\n--- STDOUT END ---", output.stdout);

        let mut cycles = metric::extract_from(&output.stdout, &output.stderr);
        if cycles.is_degenerate() {
            tracing::warn!("Still no meaningful cycle count, re-running with combined output");
            match self.run_combined(trace_prefix, params) {
                Ok(combined) => {
                    tracing::info!(
                        "--- DIRECT OUTPUT ---\n{}",
                        metric::tail(&combined, 1000)
                    );
                    let verified = metric::extract(&combined, Stream::Combined);
                    if verified.cycles().is_some() {
                        cycles = verified;
                    }
                }
                Err(e) => tracing::warn!("Verification run failed: {e:#}"),
            }
        }

        let status = match (cycles.cycles(), output.success()) {
            (None, _) => RunStatus::Unresolved,
            (Some(_), true) => RunStatus::Clean,
            (Some(_), false) => RunStatus::Salvaged,
        };
        tracing::info!(
            "  -> {} max cycles = {}",
            config.label,
            cycles.cycles().unwrap_or(0)
        );
        Attempt { cycles, status }
    }
}

#[cfg(all(test, unix))]
pub(crate) mod tests {
    use super::*;
    use crate::metric::Tier;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::{Mutex, MutexGuard};

    /// Tests that spawn processes hold this so no fork can inherit a script
    /// still open for writing (ETXTBSY).
    pub(crate) fn serial() -> MutexGuard<'static, ()> {
        static LOCK: Mutex<()> = Mutex::new(());
        LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Writes an executable shell script standing in for the simulator.
    pub(crate) fn fake_simulator(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("L1simulate");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn config() -> Configuration {
        crate::config::default_grid().remove(0)
    }

    #[test]
    fn missing_simulator_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = Simulator::locate(dir.path().join("nope")).unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("Simulator not found"));
        assert!(msg.contains("Current directory"));
    }

    #[test]
    fn passes_prefix_and_parameters() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        let sim = Simulator::locate(fake_simulator(dir.path(), r#"echo "$@""#)).unwrap();
        let out = sim
            .run(Path::new("/tmp/tc/foo"), &CacheParams::default())
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "-t /tmp/tc/foo -s 6 -E 2 -b 5");
    }

    #[test]
    fn clean_run() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        let sim = Simulator::locate(fake_simulator(
            dir.path(),
            r#"echo "Global Clock: 1234 cycles""#,
        ))
        .unwrap();
        let attempt = sim.attempt(Path::new("foo"), &config());
        assert_eq!(attempt.status, RunStatus::Clean);
        assert_eq!(attempt.cycles.cycles(), Some(1234));
    }

    #[test]
    fn non_zero_exit_is_salvaged() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        let sim = Simulator::locate(fake_simulator(
            dir.path(),
            "echo 'Total Execution Cycles: 512'\nexit 3",
        ))
        .unwrap();
        let attempt = sim.attempt(Path::new("foo"), &config());
        assert_eq!(attempt.status, RunStatus::Salvaged);
        assert_eq!(attempt.cycles.cycles(), Some(512));
    }

    #[test]
    fn count_on_stderr_is_used() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        let sim = Simulator::locate(fake_simulator(
            dir.path(),
            "echo 'Global Clock: 300 cycles' >&2",
        ))
        .unwrap();
        let attempt = sim.attempt(Path::new("foo"), &config());
        assert_eq!(
            attempt.cycles,
            CycleCount::Found {
                cycles: 300,
                tier: Tier::GlobalClockCycles,
                stream: Stream::Stderr
            }
        );
    }

    #[test]
    fn nothing_salvageable() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        let sim =
            Simulator::locate(fake_simulator(dir.path(), "echo 'trace missing'\nexit 1")).unwrap();
        let attempt = sim.attempt(Path::new("foo"), &config());
        assert_eq!(attempt.status, RunStatus::Unresolved);
        assert_eq!(attempt.cycles, CycleCount::Unresolved);
    }

    #[test]
    fn degenerate_count_is_verified_by_rerun() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran_once");
        // First run reports 1 cycle, the verification run reports the real count.
        let body = format!(
            "if [ -e {m} ]; then echo 'Global Clock: 900 cycles'; else touch {m}; echo 'Global Clock: 1 cycles'; fi",
            m = marker.display()
        );
        let sim = Simulator::locate(fake_simulator(dir.path(), &body)).unwrap();
        let attempt = sim.attempt(Path::new("foo"), &config());
        assert_eq!(
            attempt.cycles,
            CycleCount::Found {
                cycles: 900,
                tier: Tier::GlobalClockCycles,
                stream: Stream::Combined
            }
        );
    }

    #[test]
    fn degenerate_count_survives_fruitless_rerun() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        let sim =
            Simulator::locate(fake_simulator(dir.path(), "echo 'Global Clock: 0 cycles'")).unwrap();
        let attempt = sim.attempt(Path::new("foo"), &config());
        assert_eq!(attempt.cycles.cycles(), Some(0));
        assert_eq!(attempt.status, RunStatus::Clean);
    }

    #[test]
    fn combined_capture_holds_both_streams() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        let sim = Simulator::locate(fake_simulator(dir.path(), "echo out\necho err >&2")).unwrap();
        let text = sim
            .run_combined(Path::new("foo"), &CacheParams::default())
            .unwrap();
        assert!(text.contains("out"));
        assert!(text.contains("err"));
    }
}
