use std::path::Path;

use anyhow::Result;

use crate::{
    alias::AliasSet,
    config::{Configuration, SweepConfig},
    results::{ExperimentResult, ResultTable},
    runner::Simulator,
    trace::{CORES, TraceScheme, TraceSet},
};

/// Runs every configuration against every test case, strictly one
/// simulator process at a time.
///
/// Only a missing simulator is fatal. Test cases without a directory or a
/// trace prefix are skipped.
pub fn run_sweep(config: &SweepConfig) -> Result<ResultTable> {
    let simulator = Simulator::locate(&config.simulator)?;
    simulator.health_check();

    let mut table = ResultTable::new();
    for test_case in &config.test_cases {
        run_test_case(&simulator, config, test_case, &mut table);
    }
    Ok(table)
}

fn run_test_case(
    simulator: &Simulator,
    config: &SweepConfig,
    test_case: &str,
    table: &mut ResultTable,
) {
    let tc_dir = config.base_dir.join(test_case);
    if !tc_dir.is_dir() {
        tracing::warn!("Skipping missing directory {}", tc_dir.display());
        return;
    }
    tracing::info!("Looking for trace files in {}...", tc_dir.display());
    let traces = match TraceSet::resolve(&tc_dir) {
        Ok(Some(traces)) => traces,
        Ok(None) => {
            tracing::error!("No trace prefix in {}", tc_dir.display());
            return;
        }
        Err(e) => {
            tracing::error!("{e:#}");
            return;
        }
    };
    let trace_prefix = match traces.simulator_prefix() {
        Ok(prefix) => prefix,
        Err(e) => {
            tracing::error!("Unable to resolve {}: {e}", tc_dir.display());
            return;
        }
    };

    // Removed when dropped, on every path out of this function.
    let aliases = AliasSet::materialize(&traces);
    if !aliases.is_empty() {
        tracing::info!(
            "{test_case}: aliased {} {} trace file(s)",
            aliases.created().len(),
            traces.scheme
        );
    }
    tracing::info!(
        "{test_case}: running with trace prefix {}",
        trace_prefix.display()
    );
    for core in CORES {
        let path = traces.path(TraceScheme::Proc, core);
        tracing::debug!("    {} exists? {}", path.display(), path.exists());
    }
    let missing = traces.missing_cores();
    if !missing.is_empty() {
        tracing::warn!("{test_case}: no trace file for core(s) {missing:?}");
    }

    sweep_grid(simulator, test_case, &trace_prefix, &config.grid, table);
    drop(aliases);
}

fn sweep_grid(
    simulator: &Simulator,
    test_case: &str,
    trace_prefix: &Path,
    grid: &[Configuration],
    table: &mut ResultTable,
) {
    for config in grid {
        let attempt = simulator.attempt(trace_prefix, config);
        table.push(ExperimentResult {
            test_case: test_case.to_string(),
            label: config.label.clone(),
            cycles: attempt.cycles,
            status: attempt.status,
        });
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::{
        config::{CacheParams, default_grid},
        runner::{
            RunStatus,
            tests::{fake_simulator, serial},
        },
    };
    use std::{fs, fs::File, path::Path};

    // Fails unless all four proc files exist, else reports 1000*s + 10*E + b.
    const CHECKING_SIM: &str = r#"for c in 0 1 2 3; do
  [ -e "$2_proc$c.trace" ] || { echo "missing $2_proc$c.trace" >&2; exit 2; }
done
echo "Global Clock: $((1000 * $4 + 10 * $6 + $8)) cycles""#;

    fn layout(base: &Path) {
        let tc1 = base.join("tc_1");
        fs::create_dir_all(&tc1).unwrap();
        for core in CORES {
            File::create(tc1.join(format!("mix_{core}.trace"))).unwrap();
        }
        let tc3 = base.join("tc_3");
        fs::create_dir_all(&tc3).unwrap();
        File::create(tc3.join("README")).unwrap();
        let tc4 = base.join("tc_4");
        fs::create_dir_all(&tc4).unwrap();
        for core in CORES {
            File::create(tc4.join(format!("app_proc{core}.trace"))).unwrap();
        }
    }

    fn sweep_config(root: &Path) -> SweepConfig {
        SweepConfig {
            simulator: fake_simulator(root, CHECKING_SIM),
            base_dir: root.join("graph_tc"),
            csv_path: root.join("max_cycles.csv"),
            plot_dir: root.to_path_buf(),
            ..SweepConfig::default()
        }
    }

    #[test]
    fn one_row_per_configuration_in_sweep_order() {
        let _serial = serial();
        let root = tempfile::tempdir().unwrap();
        let config = sweep_config(root.path());
        layout(&config.base_dir);

        let table = run_sweep(&config).unwrap();
        let rows: Vec<_> = table
            .rows()
            .iter()
            .map(|r| (r.test_case.as_str(), r.label.as_str(), r.max_cycles()))
            .collect();
        assert_eq!(
            rows,
            [
                ("tc_1", "default", 6025),
                ("tc_1", "sets×2", 7025),
                ("tc_1", "block×2", 6026),
                ("tc_1", "assoc×2", 6045),
                ("tc_4", "default", 6025),
                ("tc_4", "sets×2", 7025),
                ("tc_4", "block×2", 6026),
                ("tc_4", "assoc×2", 6045),
            ]
        );
        assert!(table.rows().iter().all(|r| r.status == RunStatus::Clean));
    }

    #[test]
    fn aliases_do_not_outlive_the_sweep() {
        let _serial = serial();
        let root = tempfile::tempdir().unwrap();
        let config = sweep_config(root.path());
        layout(&config.base_dir);

        run_sweep(&config).unwrap();
        let tc1 = config.base_dir.join("tc_1");
        for core in CORES {
            assert!(tc1.join(format!("mix_{core}.trace")).exists());
            assert!(!tc1.join(format!("mix_proc{core}.trace")).exists());
        }
        // Proc files that were there from the start are untouched.
        assert!(config.base_dir.join("tc_4").join("app_proc0.trace").exists());
    }

    #[test]
    fn custom_grid_drives_row_count() {
        let _serial = serial();
        let root = tempfile::tempdir().unwrap();
        let mut config = sweep_config(root.path());
        layout(&config.base_dir);
        config.test_cases = vec!["tc_1".to_string()];
        config.grid = vec![
            Configuration {
                label: "tiny".to_string(),
                params: CacheParams {
                    set_bits: 1,
                    associativity: 1,
                    block_bits: 2,
                },
            },
            default_grid().remove(3),
        ];

        let table = run_sweep(&config).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].max_cycles(), 1012);
        assert_eq!(table.rows()[1].label, "assoc×2");
    }

    #[test]
    fn incomplete_trace_set_still_records_rows() {
        let _serial = serial();
        let root = tempfile::tempdir().unwrap();
        let config = SweepConfig {
            test_cases: vec!["tc_2".to_string()],
            ..sweep_config(root.path())
        };
        let tc2 = config.base_dir.join("tc_2");
        fs::create_dir_all(&tc2).unwrap();
        File::create(tc2.join("half_0.trace")).unwrap();
        File::create(tc2.join("half_1.trace")).unwrap();

        let table = run_sweep(&config).unwrap();
        assert_eq!(table.len(), 4);
        assert!(table.rows().iter().all(|r| r.status == RunStatus::Unresolved));
        assert!(table.rows().iter().all(|r| r.max_cycles() == 0));
        assert!(!tc2.join("half_proc0.trace").exists());
    }

    #[test]
    fn missing_simulator_aborts_before_any_test_case() {
        let root = tempfile::tempdir().unwrap();
        let config = SweepConfig {
            simulator: root.path().join("L1simulate"),
            base_dir: root.path().join("graph_tc"),
            ..SweepConfig::default()
        };
        layout(&config.base_dir);
        assert!(run_sweep(&config).is_err());
        assert!(!config.base_dir.join("tc_1").join("mix_proc0.trace").exists());
    }
}
