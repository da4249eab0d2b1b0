mod alias;
mod config;
mod experiments;
mod metric;
mod plot;
mod results;
mod runner;
mod testcases;
mod trace;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use config::{Configuration, SweepConfig};
use results::ResultTable;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "l1sweep")]
#[command(about = "Sweep the L1 cache simulator over test cases and cache configurations")]
#[command(version)]
struct Cli {
    /// More logging (debug level)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Less logging (warnings and errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configuration against every test case, then write CSV and charts
    Sweep(SweepArgs),

    /// Create four empty per-core trace files for a new test case
    NewTraceSet {
        /// Numeric prefix to use instead of the next free one
        prefix: Option<String>,

        /// Directory holding the test case traces
        #[arg(short, long, default_value = testcases::DEFAULT_DIR)]
        dir: PathBuf,
    },
}

#[derive(Args)]
struct SweepArgs {
    /// Simulator executable
    #[arg(long)]
    sim: Option<PathBuf>,

    /// Directory containing one sub-directory per test case
    #[arg(long, default_value = "graph_tc")]
    base_dir: PathBuf,

    /// Test case to run (repeatable, defaults to tc_1..tc_4)
    #[arg(short = 't', long = "test-case")]
    test_cases: Vec<String>,

    /// Cache configuration LABEL:S:E:B (repeatable, replaces the default grid)
    #[arg(short, long = "param")]
    params: Vec<Configuration>,

    /// CSV output file
    #[arg(long, default_value = "max_cycles.csv")]
    csv: PathBuf,

    /// Directory for the per-test-case charts
    #[arg(long, default_value = ".")]
    plot_dir: PathBuf,

    /// Skip chart rendering
    #[arg(long)]
    no_plot: bool,
}

impl SweepArgs {
    fn into_config(self) -> SweepConfig {
        let mut cfg = SweepConfig {
            base_dir: self.base_dir,
            csv_path: self.csv,
            plot_dir: self.plot_dir,
            plot: !self.no_plot,
            ..SweepConfig::default()
        };
        if let Some(sim) = self.sim {
            cfg.simulator = sim;
        }
        if !self.test_cases.is_empty() {
            cfg.test_cases = self.test_cases;
        }
        if !self.params.is_empty() {
            cfg.grid = self.params;
        }
        cfg
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Sweep(args) => sweep(&args.into_config()),
        Commands::NewTraceSet { prefix, dir } => new_trace_set(prefix.as_deref(), &dir),
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn sweep(cfg: &SweepConfig) -> Result<()> {
    alias::install_interrupt_cleanup();
    tracing::info!(
        "Sweeping {} test case(s) x {} configuration(s)",
        cfg.test_cases.len(),
        cfg.grid.len()
    );

    let table = experiments::run_sweep(cfg)?;
    if table.is_empty() {
        tracing::warn!("No test case produced results");
    }
    let unresolved = table
        .rows()
        .iter()
        .filter(|r| r.cycles.cycles().is_none())
        .count();
    if unresolved > 0 {
        tracing::warn!(
            "{unresolved} of {} result(s) have no cycle count and are recorded as 0",
            table.len()
        );
    }
    print_section(&table);

    table.write_csv(&cfg.csv_path)?;
    tracing::info!("Wrote {}", cfg.csv_path.display());

    if cfg.plot {
        plot::render_all(&table, &cfg.plot_dir);
    }
    Ok(())
}

fn print_section(table: &ResultTable) {
    println!("\n== Max Core Cycles ==");
    for (test_case, rows) in table.by_test_case() {
        println!("  {test_case}");
        for row in rows {
            println!(
                "    {:<14} {:>12} {}",
                row.label,
                row.max_cycles(),
                row.status
            );
        }
    }
}

fn new_trace_set(prefix: Option<&str>, dir: &Path) -> Result<()> {
    let prefix = prefix.map(testcases::parse_prefix).transpose()?;
    let set = testcases::create(dir, prefix)?;
    tracing::info!(
        "Trace set {}: {} created, {} skipped",
        set.prefix,
        set.created.len(),
        set.skipped.len()
    );
    if set.created.is_empty() {
        println!("No new files created.");
    } else {
        println!("Created test case files:");
        for path in &set.created {
            println!("  {}", path.display());
        }
    }
    Ok(())
}
