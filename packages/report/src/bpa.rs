//! Buffer Proportion Assessment scatter plot.
//!
//! Each species is a point at (proportion habitat in range, mean proportion
//! habitat in buffers) with a ±1 SD error bar. Marker size grows with the
//! number of records. Points above the y = x line did better than a random
//! placement of occurrences would.

use std::path::Path;

use hab_eval_evaluation_models::BpaSummary;
use plotters::prelude::*;
use plotters_svg::SVGBackend;

use crate::{ReportError, ensure_parent};

const FOREST_GREEN: RGBColor = RGBColor(34, 139, 34);
const DIM_GRAY: RGBColor = RGBColor(105, 105, 105);

/// Marker radius in pixels for a species with `records` occurrences.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn marker_radius(records: u64) -> i32 {
    ((records as f64).sqrt() / 2.0).clamp(3.0, 40.0) as i32
}

/// Renders a BPA scatter for one or many species to `path`.
///
/// # Errors
///
/// Returns [`ReportError`] if the file cannot be written.
pub fn render_bpa(path: &Path, title: &str, points: &[BpaSummary]) -> Result<(), ReportError> {
    ensure_parent(path)?;

    let root = SVGBackend::new(path, (800, 800)).into_drawing_area();
    root.fill(&WHITE).map_err(ReportError::plot)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Buffer Proportion Assessment - {title}"),
            ("sans-serif", 22),
        )
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0f64..1.0f64, 0.0f64..1.0f64)
        .map_err(ReportError::plot)?;

    chart
        .configure_mesh()
        .x_desc("Proportion Habitat in Range")
        .y_desc("Mean Proportion Habitat in Point Buffers")
        .draw()
        .map_err(ReportError::plot)?;

    chart
        .draw_series(LineSeries::new([(0.0, 0.0), (1.0, 1.0)], &DIM_GRAY))
        .map_err(ReportError::plot)?;

    if points.is_empty() {
        log::warn!("No species to plot in BPA figure {}", path.display());
    }

    chart
        .draw_series(points.iter().filter_map(|p| {
            let sd = p.std_dev?;
            Some(ErrorBar::new_vertical(
                p.expected_proportion,
                (p.mean - sd).max(0.0),
                p.mean,
                (p.mean + sd).min(1.0),
                FOREST_GREEN.stroke_width(1),
                8,
            ))
        }))
        .map_err(ReportError::plot)?;

    chart
        .draw_series(points.iter().map(|p| {
            Circle::new(
                (p.expected_proportion, p.mean),
                marker_radius(p.records),
                FOREST_GREEN.mix(0.5).filled(),
            )
        }))
        .map_err(ReportError::plot)?;

    if points.len() > 1 {
        chart
            .draw_series(points.iter().map(|p| {
                Text::new(
                    p.species.clone(),
                    (p.expected_proportion, p.mean),
                    ("sans-serif", 11).into_font().color(&BLACK),
                )
            }))
            .map_err(ReportError::plot)?;
    }

    root.present().map_err(ReportError::plot)?;
    log::info!("Saved BPA figure {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(species: &str, mean: f64, sd: Option<f64>, prop: f64, n: u64) -> BpaSummary {
        BpaSummary {
            species: species.to_string(),
            mean,
            std_dev: sd,
            expected_proportion: prop,
            records: n,
        }
    }

    #[test]
    fn marker_grows_with_records_within_bounds() {
        assert_eq!(marker_radius(0), 3);
        assert!(marker_radius(400) > marker_radius(100));
        assert_eq!(marker_radius(1_000_000), 40);
    }

    #[test]
    fn writes_svg_for_many_species() {
        let dir = std::env::temp_dir().join("hab_eval_report_bpa_test");
        let path = dir.join("All-Species-BPA.svg");
        let points = vec![
            summary("bhensx", 0.61, Some(0.2), 0.12, 240),
            summary("mgaprx", 0.35, None, 0.40, 1),
        ];
        render_bpa(&path, "All-Species", &points).unwrap();
        render_bpa(&path, "All-Species", &points).unwrap();

        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("Buffer Proportion Assessment - All-Species"));
        assert!(svg.contains("bhensx"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
