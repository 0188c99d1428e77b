//! Buffer Sensitivity Metric bar/line chart.
//!
//! Bars show the number of points and the true positives in each distance
//! bucket on a count axis whose upper bound is the next power of ten above
//! the largest bucket. The sensitivity line uses a secondary 0-1.1 axis.
//! Each bar is labelled with its binomial p-value.

use std::path::Path;

use hab_eval_evaluation_models::SensitivityRow;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters_svg::SVGBackend;

use crate::{ReportError, ensure_parent};

const STEEL_BLUE: RGBColor = RGBColor(70, 130, 180);
const LIGHT_BLUE: RGBColor = RGBColor(173, 216, 230);
const LINE_COLOR: RGBColor = RGBColor(255, 127, 14);

/// Upper bound of the count axis: `10^(floor(log10(max n)) + 1)`.
#[must_use]
pub fn count_axis_max(max_points: u64) -> f64 {
    if max_points == 0 {
        return 10.0;
    }
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let exponent = (max_points as f64).log10().floor() as i32;
    10f64.powi(exponent + 1)
}

/// Renders the sensitivity chart for one species to `path`.
///
/// # Errors
///
/// Returns [`ReportError`] if the file cannot be written.
#[allow(clippy::cast_precision_loss)]
pub fn render_bsm(path: &Path, species: &str, rows: &[SensitivityRow]) -> Result<(), ReportError> {
    ensure_parent(path)?;

    let root = SVGBackend::new(path, (1000, 800)).into_drawing_area();
    root.fill(&WHITE).map_err(ReportError::plot)?;

    let buckets = rows.len().max(1);
    let y_max = count_axis_max(rows.iter().map(|r| r.sample_size).max().unwrap_or(0));

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Sensitivity by Buffer Distance - {species}"),
            ("sans-serif", 22),
        )
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .right_y_label_area_size(60)
        .build_cartesian_2d((0..buckets).into_segmented(), 0.0f64..y_max)
        .map_err(ReportError::plot)?
        .set_secondary_coord((0..buckets).into_segmented(), 0.0f64..1.1f64);

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(buckets)
        .x_label_formatter(&|x| match x {
            SegmentValue::CenterOf(i) => rows
                .get(*i)
                .map(|r| r.threshold.to_string())
                .unwrap_or_default(),
            _ => String::new(),
        })
        .x_desc("Buffer Distance Category (m)")
        .y_desc("Number of Occurrence Points")
        .draw()
        .map_err(ReportError::plot)?;

    chart
        .configure_secondary_axes()
        .y_desc("Sensitivity")
        .draw()
        .map_err(ReportError::plot)?;

    chart
        .draw_series(rows.iter().enumerate().map(|(i, r)| {
            bar(i, r.sample_size as f64, STEEL_BLUE.filled())
        }))
        .map_err(ReportError::plot)?
        .label("Number of Points")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], STEEL_BLUE.filled()));

    chart
        .draw_series(rows.iter().enumerate().map(|(i, r)| {
            bar(i, r.true_positives as f64, LIGHT_BLUE.filled())
        }))
        .map_err(ReportError::plot)?
        .label("True Positives")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], LIGHT_BLUE.filled()));

    let label_style = ("sans-serif", 13)
        .into_font()
        .color(&BLACK)
        .pos(Pos::new(HPos::Center, VPos::Bottom));
    chart
        .draw_series(rows.iter().enumerate().map(|(i, r)| {
            Text::new(
                format!("p {}", r.p_value_display),
                (SegmentValue::CenterOf(i), r.sample_size as f64),
                label_style.clone(),
            )
        }))
        .map_err(ReportError::plot)?;

    chart
        .draw_secondary_series(LineSeries::new(
            rows.iter()
                .enumerate()
                .map(|(i, r)| (SegmentValue::CenterOf(i), r.sensitivity)),
            LINE_COLOR.stroke_width(2),
        ))
        .map_err(ReportError::plot)?
        .label("Sensitivity")
        .legend(|(x, y)| PathElement::new([(x, y), (x + 12, y)], LINE_COLOR.stroke_width(2)));

    chart
        .draw_secondary_series(rows.iter().enumerate().map(|(i, r)| {
            Circle::new(
                (SegmentValue::CenterOf(i), r.sensitivity),
                4,
                LINE_COLOR.filled(),
            )
        }))
        .map_err(ReportError::plot)?;

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(ReportError::plot)?;

    root.present().map_err(ReportError::plot)?;
    log::info!("Saved BSM figure {}", path.display());
    Ok(())
}

fn bar(index: usize, height: f64, style: ShapeStyle) -> Rectangle<(SegmentValue<usize>, f64)> {
    let mut rect = Rectangle::new(
        [
            (SegmentValue::Exact(index), 0.0),
            (SegmentValue::Exact(index + 1), height),
        ],
        style,
    );
    rect.set_margin(0, 0, 12, 12);
    rect
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(threshold: u32, tp: u64, n: u64, display: &str) -> SensitivityRow {
        #[allow(clippy::cast_precision_loss)]
        let sensitivity = if n == 0 { 0.0 } else { tp as f64 / n as f64 };
        SensitivityRow {
            threshold,
            true_positives: tp,
            false_negatives: n - tp,
            sensitivity,
            sample_size: n,
            p_value: 0.5,
            p_value_display: display.to_string(),
        }
    }

    #[test]
    fn count_axis_is_next_power_of_ten() {
        assert!((count_axis_max(0) - 10.0).abs() < f64::EPSILON);
        assert!((count_axis_max(7) - 10.0).abs() < f64::EPSILON);
        assert!((count_axis_max(10) - 100.0).abs() < f64::EPSILON);
        assert!((count_axis_max(999) - 1000.0).abs() < f64::EPSILON);
        assert!((count_axis_max(1203) - 10_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn writes_svg_with_p_value_labels() {
        let dir = std::env::temp_dir().join("hab_eval_report_bsm_test");
        let path = dir.join("bhensx-BSM.svg");
        let rows = vec![
            row(30, 10, 12, "= 0.0312"),
            row(100, 40, 52, "< 0.0001"),
            row(500, 40, 60, "< 0.0001"),
        ];
        render_bsm(&path, "bhensx", &rows).unwrap();

        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("Sensitivity by Buffer Distance - bhensx"));
        assert!(svg.contains("p = 0.0312"));
        assert!(svg.contains("p &lt; 0.0001") || svg.contains("p < 0.0001"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn empty_rows_still_render() {
        let dir = std::env::temp_dir().join("hab_eval_report_bsm_empty_test");
        let path = dir.join("x-BSM.svg");
        render_bsm(&path, "x", &[]).unwrap();
        assert!(path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
