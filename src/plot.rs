use std::{
    error::Error,
    path::{Path, PathBuf},
};

use anyhow::{Result, anyhow};
use plotters::prelude::*;

use crate::results::{ExperimentResult, ResultTable};

/// Bar colours, assigned by bar position rather than by label.
pub const PALETTE: [RGBColor; 4] = [
    RGBColor(0x4C, 0x72, 0xB0),
    RGBColor(0x55, 0xA8, 0x68),
    RGBColor(0xC4, 0x4E, 0x52),
    RGBColor(0x81, 0x72, 0xB3),
];

// 10x6 inches at 200 dpi
const CHART_SIZE: (u32, u32) = (2000, 1200);

pub fn bar_color(position: usize) -> RGBColor {
    PALETTE[position % PALETTE.len()]
}

pub fn chart_file_name(test_case: &str) -> String {
    format!("{test_case}_maxcycles.png")
}

/// Renders one chart per test case that has results. Returns the files
/// written; a chart that fails to render is logged and skipped.
pub fn render_all(table: &ResultTable, out_dir: &Path) -> Vec<PathBuf> {
    let mut written = Vec::new();
    for (test_case, rows) in table.by_test_case() {
        if rows.is_empty() {
            continue;
        }
        let path = out_dir.join(chart_file_name(test_case));
        match render_chart(&path, test_case, &rows) {
            Ok(()) => {
                tracing::info!("Saved plot {}", path.display());
                written.push(path);
            }
            Err(e) => tracing::error!("{e:#}"),
        }
    }
    written
}

pub fn render_chart(path: &Path, test_case: &str, rows: &[&ExperimentResult]) -> Result<()> {
    draw_bars(path, test_case, rows)
        .map_err(|e| anyhow!("Unable to render {}: {e}", path.display()))
}

fn draw_bars(
    path: &Path,
    test_case: &str,
    rows: &[&ExperimentResult],
) -> Result<(), Box<dyn Error>> {
    let labels: Vec<&str> = rows.iter().map(|r| r.label.as_str()).collect();
    let values: Vec<u64> = rows.iter().map(|r| r.max_cycles()).collect();
    let y_max = values.iter().copied().max().unwrap_or(0).max(1) as f64 * 1.1;
    // Integer ranges are inclusive once segmented.
    let last = rows.len().saturating_sub(1);

    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("{test_case}: Max Core Cycles vs Parameter"),
            ("sans-serif", 48),
        )
        .margin(30)
        .x_label_area_size(90)
        .y_label_area_size(160)
        .build_cartesian_2d((0..last).into_segmented(), 0f64..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .light_line_style(TRANSPARENT)
        .bold_line_style(BLACK.mix(0.15))
        .x_desc("Parameter Setting")
        .y_desc("Max Core Cycles")
        .axis_desc_style(("sans-serif", 32))
        .label_style(("sans-serif", 26))
        .x_label_formatter(&|v| match v {
            SegmentValue::CenterOf(i) => labels.get(*i).map(|l| l.to_string()).unwrap_or_default(),
            _ => String::new(),
        })
        .y_label_formatter(&|y| format!("{y:.0}"))
        .draw()?;

    chart.draw_series(values.iter().enumerate().map(|(i, &v)| {
        let mut bar = Rectangle::new(
            [
                (SegmentValue::Exact(i), 0.0),
                (SegmentValue::Exact(i + 1), v as f64),
            ],
            bar_color(i).filled(),
        );
        bar.set_margin(0, 0, 12, 12);
        bar
    }))?;

    root.present()?;
    Ok(())
}
