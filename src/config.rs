use std::{
    env::consts::EXE_SUFFIX,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result, bail};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheParams {
    pub set_bits: u32,      // s, log2(number of sets)
    pub associativity: u32, // E, lines per set
    pub block_bits: u32,    // b, log2(line size in Bytes)
}

impl Default for CacheParams {
    fn default() -> Self {
        Self {
            set_bits: 6,
            associativity: 2,
            block_bits: 5,
        }
    }
}

impl CacheParams {
    pub fn num_sets(&self) -> u64 {
        1u64 << self.set_bits
    }

    pub fn block_size(&self) -> u64 {
        1u64 << self.block_bits
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.num_sets() * self.associativity as u64 * self.block_size()
    }
}

impl fmt::Display for CacheParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "s={} E={} b={} ({} sets, {}B lines, {}B total)",
            self.set_bits,
            self.associativity,
            self.block_bits,
            self.num_sets(),
            self.block_size(),
            self.capacity_bytes()
        )
    }
}

/// One point of the sweep grid. Never mutated once the grid is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub label: String, // Label written to the CSV and the chart x-axis
    pub params: CacheParams,
}

impl FromStr for Configuration {
    type Err = anyhow::Error;

    /// Parses `LABEL:S:E:B`.
    fn from_str(spec: &str) -> Result<Self> {
        let parts: Vec<&str> = spec.split(':').collect();
        if parts.len() != 4 {
            bail!("Configuration '{}' must look like LABEL:S:E:B", spec);
        }
        let label = parts[0].trim();
        if label.is_empty() {
            bail!("Configuration '{}' has an empty label", spec);
        }
        let field = |idx: usize, name: &str| -> Result<u32> {
            parts[idx].trim().parse().with_context(|| {
                format!("Configuration '{}': invalid {} '{}'", spec, name, parts[idx])
            })
        };
        Ok(Self {
            label: label.to_string(),
            params: CacheParams {
                set_bits: field(1, "S")?,
                associativity: field(2, "E")?,
                block_bits: field(3, "B")?,
            },
        })
    }
}

pub fn baseline(base: &CacheParams) -> Configuration {
    Configuration {
        label: "default".to_string(),
        params: *base,
    }
}

pub fn doubled_sets(base: &CacheParams) -> Configuration {
    let mut params = *base;
    params.set_bits += 1;
    Configuration {
        label: "sets×2".to_string(),
        params,
    }
}

pub fn doubled_block(base: &CacheParams) -> Configuration {
    let mut params = *base;
    params.block_bits += 1;
    Configuration {
        label: "block×2".to_string(),
        params,
    }
}

pub fn doubled_assoc(base: &CacheParams) -> Configuration {
    let mut params = *base;
    params.associativity *= 2;
    Configuration {
        label: "assoc×2".to_string(),
        params,
    }
}

pub fn default_grid() -> Vec<Configuration> {
    let base = CacheParams::default();
    vec![
        baseline(&base),
        doubled_sets(&base),
        doubled_block(&base),
        doubled_assoc(&base),
    ]
}

/// `./L1simulate` with the platform executable suffix.
pub fn default_simulator() -> PathBuf {
    Path::new(".").join(format!("L1simulate{EXE_SUFFIX}"))
}

/// Everything the sweep needs, passed in rather than read from globals.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub simulator: PathBuf,
    pub base_dir: PathBuf,
    pub test_cases: Vec<String>,
    pub grid: Vec<Configuration>,
    pub csv_path: PathBuf,
    pub plot_dir: PathBuf,
    pub plot: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            simulator: default_simulator(),
            base_dir: PathBuf::from("graph_tc"),
            test_cases: (1..=4).map(|i| format!("tc_{i}")).collect(),
            grid: default_grid(),
            csv_path: PathBuf::from("max_cycles.csv"),
            plot_dir: PathBuf::from("."),
            plot: true,
        }
    }
}
