use std::{io, path::Path};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::{metric::CycleCount, runner::RunStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentResult {
    pub test_case: String,
    pub label: String, // Configuration label
    pub cycles: CycleCount,
    pub status: RunStatus,
}

impl ExperimentResult {
    /// Cycle count as persisted: an unresolved run is written as 0.
    pub fn max_cycles(&self) -> u64 {
        self.cycles.cycles().unwrap_or(0)
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    test_case: &'a str,
    parameter: &'a str,
    max_cycles: u64,
}

/// Results in sweep order: test cases outer, configurations inner.
#[derive(Debug, Default, Clone)]
pub struct ResultTable {
    rows: Vec<ExperimentResult>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: ExperimentResult) {
        self.rows.push(result);
    }

    pub fn rows(&self) -> &[ExperimentResult] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows grouped by test case, groups in first-seen order.
    pub fn by_test_case(&self) -> Vec<(&str, Vec<&ExperimentResult>)> {
        let mut groups: Vec<(&str, Vec<&ExperimentResult>)> = Vec::new();
        for row in &self.rows {
            match groups.iter_mut().find(|(tc, _)| *tc == row.test_case) {
                Some((_, members)) => members.push(row),
                None => groups.push((row.test_case.as_str(), vec![row])),
            }
        }
        groups
    }

    pub fn write_csv_to<W: io::Write>(&self, writer: W) -> Result<()> {
        // Header written by hand so an empty table still gets one.
        let mut csv = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        csv.write_record(["test_case", "parameter", "max_cycles"])?;
        for row in &self.rows {
            csv.serialize(CsvRow {
                test_case: &row.test_case,
                parameter: &row.label,
                max_cycles: row.max_cycles(),
            })?;
        }
        csv.flush()?;
        Ok(())
    }

    /// Writes the table to `path`, replacing any existing file.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = std::fs::File::create(path)
            .with_context(|| format!("Unable to create {}", path.display()))?;
        self.write_csv_to(file)
            .with_context(|| format!("Unable to write {}", path.display()))
    }
}
