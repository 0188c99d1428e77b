//! Point screening and the buffer/raster overlay loop.
//!
//! [`prepare_points`] applies the coordinate, uncertainty, and duplicate
//! rules before any geometry is built. [`overlay_points`] then buffers
//! each accepted point and masks the raster with it. A buffer outside the
//! raster is recorded as a non-overlap and the loop moves on.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use hab_eval_evaluation_models::{
    Anomaly, AnomalyKind, MissingUncertaintyPolicy, NonOverlap, OverlayStat,
};
use hab_eval_occurrence::progress::ProgressCallback;
use hab_eval_occurrence_models::OccurrencePoint;
use hab_eval_spatial::buffer::BufferBuilder;
use hab_eval_spatial::raster::{HabitatRaster, MaskOutcome};

use crate::EvaluationError;

/// A point that passed screening.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedPoint {
    pub point: OccurrencePoint,
    /// Usable uncertainty; `None` when buffered at the minimum distance
    /// because the record had none.
    pub uncertainty: Option<f64>,
}

impl PreparedPoint {
    /// Radius requested for the buffer before the minimum is applied.
    #[must_use]
    pub fn requested_radius(&self) -> f64 {
        self.uncertainty.unwrap_or(0.0)
    }
}

/// Points accepted for buffering, plus anomalies for the rest.
#[derive(Debug, Clone, Default)]
pub struct PreparedPoints {
    pub accepted: Vec<PreparedPoint>,
    pub anomalies: Vec<Anomaly>,
}

/// Screens loaded occurrences.
///
/// Invalid coordinates are dropped. Missing uncertainty either drops the
/// point or keeps it for a minimum-distance buffer, depending on `policy`;
/// both cases are recorded. With `dedupe`, only the point with the lowest
/// uncertainty survives at each exact coordinate pair, keeping the first
/// one seen on ties.
#[must_use]
pub fn prepare_points(
    points: Vec<OccurrencePoint>,
    policy: MissingUncertaintyPolicy,
    dedupe: bool,
) -> PreparedPoints {
    let mut prepared = PreparedPoints::default();

    for point in points {
        if !point.has_valid_coordinates() {
            let detail = format!(
                "longitude {} latitude {} is not a valid geographic coordinate",
                point.longitude, point.latitude
            );
            prepared
                .anomalies
                .push(Anomaly::new(&point.id, AnomalyKind::InvalidCoordinate, detail));
            continue;
        }

        let uncertainty = point.uncertainty();
        if uncertainty.is_none() {
            let (keep, detail) = match policy {
                MissingUncertaintyPolicy::Exclude => (false, "point excluded"),
                MissingUncertaintyPolicy::UseMinimum => (true, "buffered at minimum distance"),
            };
            prepared.anomalies.push(Anomaly::new(
                &point.id,
                AnomalyKind::MissingUncertainty,
                format!("coordinate uncertainty missing; {detail}"),
            ));
            if !keep {
                continue;
            }
        }

        prepared.accepted.push(PreparedPoint { point, uncertainty });
    }

    if dedupe {
        dedupe_coordinates(&mut prepared);
    }

    prepared
}

fn dedupe_coordinates(prepared: &mut PreparedPoints) {
    let rank = |p: &PreparedPoint| p.uncertainty.unwrap_or(f64::INFINITY);

    let mut best: BTreeMap<(u64, u64), usize> = BTreeMap::new();
    for (index, p) in prepared.accepted.iter().enumerate() {
        let key = (p.point.longitude.to_bits(), p.point.latitude.to_bits());
        best.entry(key)
            .and_modify(|kept| {
                if rank(p) < rank(&prepared.accepted[*kept]) {
                    *kept = index;
                }
            })
            .or_insert(index);
    }

    let keep: BTreeSet<usize> = best.values().copied().collect();
    let accepted = std::mem::take(&mut prepared.accepted);
    for (index, p) in accepted.iter().enumerate() {
        if keep.contains(&index) {
            continue;
        }
        let key = (p.point.longitude.to_bits(), p.point.latitude.to_bits());
        let kept_id = best
            .get(&key)
            .map(|&i| accepted[i].point.id.as_str())
            .unwrap_or_default();
        prepared.anomalies.push(Anomaly::new(
            &p.point.id,
            AnomalyKind::DuplicateCoordinate,
            format!("same coordinates as {kept_id}"),
        ));
    }

    let before = accepted.len();
    prepared.accepted = accepted
        .into_iter()
        .enumerate()
        .filter_map(|(index, p)| keep.contains(&index).then_some(p))
        .collect();
    log::debug!(
        "Dropped {} duplicate-coordinate points",
        before - prepared.accepted.len()
    );
}

/// Output of the overlay loop.
#[derive(Debug, Clone, Default)]
pub struct OverlayResults {
    pub stats: Vec<OverlayStat>,
    pub non_overlaps: Vec<NonOverlap>,
    pub anomalies: Vec<Anomaly>,
}

/// Buffers every point and counts raster cells under each buffer.
///
/// # Errors
///
/// Returns [`EvaluationError::Raster`] if a raster chunk cannot be read.
pub fn overlay_points(
    raster: &mut HabitatRaster,
    builder: &BufferBuilder,
    points: &[PreparedPoint],
    habitat_codes: &BTreeSet<i64>,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<OverlayResults, EvaluationError> {
    let mut results = OverlayResults::default();
    progress.set_total(points.len() as u64);

    for prepared in points {
        let buffer = builder.build(&prepared.point, prepared.requested_radius());

        match raster.mask(&buffer.polygon, habitat_codes)? {
            MaskOutcome::NoOverlap => {
                log::debug!(
                    "Buffer {} ({} m) lies outside the raster",
                    buffer.occ_id,
                    buffer.distance
                );
                results.non_overlaps.push(NonOverlap {
                    occ_id: buffer.occ_id,
                    buffer_distance: buffer.distance,
                });
            }
            MaskOutcome::Overlap(counts) => {
                if counts.footprint() == 0 {
                    results.anomalies.push(Anomaly::new(
                        &buffer.occ_id,
                        AnomalyKind::EmptyFootprint,
                        format!(
                            "no cell centre inside the {} m buffer ({} cells in window)",
                            buffer.distance, counts.window_cells
                        ),
                    ));
                }
                if !counts.unexpected_codes.is_empty() {
                    let codes = counts
                        .unexpected_codes
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ");
                    results.anomalies.push(Anomaly::new(
                        &buffer.occ_id,
                        AnomalyKind::UnexpectedCellCodes,
                        format!(
                            "{} cells with codes [{codes}] excluded from counts",
                            counts.other - counts.nodata
                        ),
                    ));
                }

                results.stats.push(OverlayStat::new(
                    buffer.occ_id,
                    buffer.distance,
                    counts.habitat,
                    counts.non_habitat,
                    counts.other,
                ));
            }
        }

        progress.inc(1);
    }

    progress.finish(format!(
        "{} buffers overlapped, {} outside raster",
        results.stats.len(),
        results.non_overlaps.len()
    ));
    Ok(results)
}

#[cfg(test)]
mod tests {
    use hab_eval_occurrence::progress::null_progress;
    use hab_eval_spatial::projection::AlbersEqualArea;
    use hab_eval_spatial::test_support::{LAT, LON, write_centered_gray8};

    use super::*;

    fn point(id: &str, lon: f64, lat: f64, unc: Option<f64>) -> OccurrencePoint {
        OccurrencePoint {
            id: id.to_string(),
            longitude: lon,
            latitude: lat,
            coordinate_uncertainty_m: unc,
        }
    }

    fn kinds(anomalies: &[Anomaly]) -> Vec<AnomalyKind> {
        anomalies.iter().map(|a| a.kind).collect()
    }

    #[test]
    fn invalid_and_missing_are_screened() {
        let points = vec![
            point("ok", -90.0, 35.0, Some(10.0)),
            point("bad", -190.0, 35.0, Some(10.0)),
            point("nounc", -90.0, 35.1, None),
            point("neg", -90.0, 35.2, Some(-4.0)),
        ];

        let excluded = prepare_points(points.clone(), MissingUncertaintyPolicy::Exclude, false);
        assert_eq!(excluded.accepted.len(), 1);
        assert_eq!(
            kinds(&excluded.anomalies),
            vec![
                AnomalyKind::InvalidCoordinate,
                AnomalyKind::MissingUncertainty,
                AnomalyKind::MissingUncertainty,
            ]
        );

        let kept = prepare_points(points, MissingUncertaintyPolicy::UseMinimum, false);
        assert_eq!(kept.accepted.len(), 3);
        assert_eq!(kept.anomalies.len(), 3);
        assert_eq!(kept.accepted[1].uncertainty, None);
        assert!(kept.accepted[1].requested_radius().abs() < f64::EPSILON);
    }

    #[test]
    fn dedupe_keeps_lowest_uncertainty() {
        let points = vec![
            point("a", -90.0, 35.0, Some(500.0)),
            point("b", -90.0, 35.0, Some(20.0)),
            point("c", -91.0, 35.0, Some(5.0)),
            point("d", -90.0, 35.0, Some(20.0)),
        ];
        let prepared = prepare_points(points, MissingUncertaintyPolicy::Exclude, true);
        let ids: Vec<&str> = prepared
            .accepted
            .iter()
            .map(|p| p.point.id.as_str())
            .collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(prepared.anomalies.len(), 2);
        assert!(
            prepared
                .anomalies
                .iter()
                .all(|a| a.kind == AnomalyKind::DuplicateCoordinate && a.detail.ends_with(" b"))
        );
    }

    #[test]
    fn overlay_separates_overlap_from_non_overlap() {
        // Codes: habitat 1 in the left half, non-habitat 0 in the right.
        let size = 40u32;
        let data: Vec<u8> = (0..size * size)
            .map(|i| u8::from(i % size < size / 2))
            .collect();
        let path = write_centered_gray8("overlay_split.tif", size, size, &data, None);
        let mut raster = HabitatRaster::open(&path).unwrap();
        let builder = BufferBuilder::new(AlbersEqualArea::default(), 30.0);

        let prepared = prepare_points(
            vec![
                point("inside", LON, LAT, Some(200.0)),
                point("far", LON + 5.0, LAT, Some(200.0)),
            ],
            MissingUncertaintyPolicy::Exclude,
            false,
        );
        let results = overlay_points(
            &mut raster,
            &builder,
            &prepared.accepted,
            &BTreeSet::from([1]),
            &null_progress(),
        )
        .unwrap();

        assert_eq!(results.stats.len(), 1);
        let stat = &results.stats[0];
        assert_eq!(stat.occ_id, "inside");
        assert!(stat.habitat_cells > 0 && stat.non_habitat_cells > 0);
        assert!((stat.habitat_proportion - 0.5).abs() < 0.1);
        assert_eq!(results.non_overlaps.len(), 1);
        assert_eq!(results.non_overlaps[0].occ_id, "far");
        assert!(results.anomalies.is_empty());
    }

    #[test]
    fn unexpected_codes_become_anomalies() {
        let size = 20u32;
        let data: Vec<u8> = (0..size * size).map(|i| if i % 2 == 0 { 1 } else { 3 }).collect();
        let path = write_centered_gray8("overlay_codes.tif", size, size, &data, None);
        let mut raster = HabitatRaster::open(&path).unwrap();
        let builder = BufferBuilder::new(AlbersEqualArea::default(), 30.0);

        let prepared = prepare_points(
            vec![point("mixed", LON, LAT, Some(100.0))],
            MissingUncertaintyPolicy::Exclude,
            false,
        );
        let results = overlay_points(
            &mut raster,
            &builder,
            &prepared.accepted,
            &BTreeSet::from([1]),
            &null_progress(),
        )
        .unwrap();

        assert_eq!(kinds(&results.anomalies), vec![AnomalyKind::UnexpectedCellCodes]);
        assert!(results.anomalies[0].detail.contains("[3]"));
        let stat = &results.stats[0];
        assert!(stat.other_cells > 0);
        assert_eq!(stat.non_habitat_cells, 0);
        assert!((stat.habitat_proportion - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unexpected_codes_are_listed_in_order() {
        let size = 21u32;
        let data: Vec<u8> = (0..size * size)
            .map(|i| match i % 3 {
                0 => 1,
                1 => 7,
                _ => 3,
            })
            .collect();
        let path = write_centered_gray8("overlay_two_codes.tif", size, size, &data, None);
        let mut raster = HabitatRaster::open(&path).unwrap();
        let builder = BufferBuilder::new(AlbersEqualArea::default(), 30.0);

        let prepared = prepare_points(
            vec![point("mixed", LON, LAT, Some(150.0))],
            MissingUncertaintyPolicy::Exclude,
            false,
        );
        let results = overlay_points(
            &mut raster,
            &builder,
            &prepared.accepted,
            &BTreeSet::from([1]),
            &null_progress(),
        )
        .unwrap();

        assert_eq!(kinds(&results.anomalies), vec![AnomalyKind::UnexpectedCellCodes]);
        assert!(results.anomalies[0].detail.contains("codes [3, 7]"));
    }

    #[test]
    fn unreadable_coordinates_are_anomalies_not_errors() {
        let points = vec![
            point("blank_lon", f64::NAN, 34.3, Some(50.0)),
            point("ok", LON, LAT, Some(50.0)),
        ];
        let prepared = prepare_points(points, MissingUncertaintyPolicy::Exclude, false);
        assert_eq!(prepared.accepted.len(), 1);
        assert_eq!(prepared.accepted[0].point.id, "ok");
        assert_eq!(kinds(&prepared.anomalies), vec![AnomalyKind::InvalidCoordinate]);
        assert_eq!(prepared.anomalies[0].occ_id, "blank_lon");
    }
}
