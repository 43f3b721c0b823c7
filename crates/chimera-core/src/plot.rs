use std::path::Path;

use plotters::prelude::*;

use crate::error::{ChimeraError, Result};
use crate::record::PhotometryRecord;

const PLOT_SIZE: (u32, u32) = (900, 600);

/// Render the normalized light curve (flux / mean flux vs elapsed
/// seconds) for one cube's records.
pub fn plot_light_curve(records: &[PhotometryRecord], kintime: f32, out: &Path) -> Result<()> {
    if records.is_empty() {
        return Err(ChimeraError::EmptySequence);
    }

    let mean: f32 = records.iter().map(|r| r.flux_adu).sum::<f32>() / records.len() as f32;
    let mean = if mean == 0.0 { 1.0 } else { mean };

    let points: Vec<(f32, f32)> = records
        .iter()
        .enumerate()
        .map(|(i, r)| (i as f32 * kintime, r.flux_adu / mean))
        .collect();

    let t_max = points.last().map(|p| p.0).unwrap_or(1.0).max(f32::EPSILON);
    let (mut y_min, mut y_max) = points.iter().fold((f32::MAX, f32::MIN), |(lo, hi), p| {
        (lo.min(p.1), hi.max(p.1))
    });
    if y_min == y_max {
        y_min -= 0.5;
        y_max += 0.5;
    }
    let margin = (y_max - y_min) * 0.05;

    let root = BitMapBackend::new(out, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| ChimeraError::Plot(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .build_cartesian_2d(0.0f32..t_max, (y_min - margin)..(y_max + margin))
        .map_err(|e| ChimeraError::Plot(e.to_string()))?;

    chart
        .draw_series(LineSeries::new(points, &RED))
        .map_err(|e| ChimeraError::Plot(e.to_string()))?;

    root.present().map_err(|e| ChimeraError::Plot(e.to_string()))?;
    Ok(())
}
