//! Circular buffers around occurrence points.
//!
//! Buffers are built in projected meters, never in degrees. The radius is
//! the point's coordinate uncertainty, floored at the configured minimum.

use geo::{Coord, LineString, Polygon};
use hab_eval_occurrence_models::OccurrencePoint;

use crate::projection::AlbersEqualArea;

/// Vertices used to approximate a circle.
pub const DEFAULT_SEGMENTS: usize = 64;

/// Returns the buffer radius for an uncertainty and minimum distance.
#[must_use]
pub fn buffer_distance(uncertainty: f64, min_distance: f64) -> f64 {
    if uncertainty >= min_distance {
        uncertainty
    } else {
        min_distance
    }
}

/// Builds a closed polygon approximating a circle of `radius` around
/// `center`.
#[must_use]
pub fn circle(center: Coord<f64>, radius: f64, segments: usize) -> Polygon<f64> {
    let segments = segments.max(8);
    #[allow(clippy::cast_precision_loss)]
    let step = std::f64::consts::TAU / segments as f64;

    let mut ring: Vec<Coord<f64>> = (0..segments)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let angle = step * i as f64;
            Coord {
                x: radius.mul_add(angle.cos(), center.x),
                y: radius.mul_add(angle.sin(), center.y),
            }
        })
        .collect();
    ring.push(ring[0]);

    Polygon::new(LineString::new(ring), vec![])
}

/// A buffer polygon derived from one occurrence.
#[derive(Debug, Clone)]
pub struct PointBuffer {
    /// Identifier of the source occurrence.
    pub occ_id: String,
    /// Buffer radius in meters.
    pub distance: f64,
    /// Projected point location.
    pub center: Coord<f64>,
    /// Buffer polygon in projected meters.
    pub polygon: Polygon<f64>,
}

/// Projects occurrences and buffers them.
#[derive(Debug, Clone, Copy)]
pub struct BufferBuilder {
    projection: AlbersEqualArea,
    min_distance: f64,
    segments: usize,
}

impl BufferBuilder {
    #[must_use]
    pub const fn new(projection: AlbersEqualArea, min_distance: f64) -> Self {
        Self {
            projection,
            min_distance,
            segments: DEFAULT_SEGMENTS,
        }
    }

    #[must_use]
    pub const fn with_segments(mut self, segments: usize) -> Self {
        self.segments = segments;
        self
    }

    #[must_use]
    pub const fn min_distance(&self) -> f64 {
        self.min_distance
    }

    /// Buffers `point` using `uncertainty` as the requested radius.
    ///
    /// The caller decides what uncertainty to use when the point has none.
    #[must_use]
    pub fn build(&self, point: &OccurrencePoint, uncertainty: f64) -> PointBuffer {
        let center = self.projection.forward(point.longitude, point.latitude);
        let distance = buffer_distance(uncertainty, self.min_distance);
        PointBuffer {
            occ_id: point.id.clone(),
            distance,
            center,
            polygon: circle(center, distance, self.segments),
        }
    }
}

#[cfg(test)]
mod tests {
    use geo::{Area, BoundingRect};

    use super::*;

    fn point(unc: Option<f64>) -> OccurrencePoint {
        OccurrencePoint {
            id: "occ-1".to_string(),
            longitude: -90.0,
            latitude: 35.0,
            coordinate_uncertainty_m: unc,
        }
    }

    #[test]
    fn radius_is_floored_at_minimum() {
        assert!((buffer_distance(5.0, 30.0) - 30.0).abs() < f64::EPSILON);
        assert!((buffer_distance(30.0, 30.0) - 30.0).abs() < f64::EPSILON);
        assert!((buffer_distance(412.0, 30.0) - 412.0).abs() < f64::EPSILON);
    }

    #[test]
    fn small_uncertainty_buffers_at_thirty_meters() {
        let builder = BufferBuilder::new(AlbersEqualArea::default(), 30.0);
        let buffer = builder.build(&point(Some(5.0)), 5.0);
        assert!((buffer.distance - 30.0).abs() < f64::EPSILON);

        let rect = buffer.polygon.bounding_rect().unwrap();
        assert!((rect.width() - 60.0).abs() < 0.1);
        assert!((rect.height() - 60.0).abs() < 0.1);
    }

    #[test]
    fn circle_is_closed_and_close_to_true_area() {
        let poly = circle(Coord { x: 100.0, y: -50.0 }, 1000.0, DEFAULT_SEGMENTS);
        let ring = poly.exterior();
        assert_eq!(ring.0.len(), DEFAULT_SEGMENTS + 1);
        assert_eq!(ring.0.first(), ring.0.last());

        let area = poly.unsigned_area();
        let true_area = std::f64::consts::PI * 1000.0 * 1000.0;
        assert!((area - true_area).abs() / true_area < 0.005);
    }
}
