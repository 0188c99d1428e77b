//! Albers Equal Area Conic projection on an ellipsoid.
//!
//! Formulas follow Snyder, *Map Projections: A Working Manual* (USGS
//! Professional Paper 1395), pp. 101-102. [`CONUS_ALBERS`] is the NAD83 /
//! Conus Albers grid (EPSG:5070) used by national land cover and habitat
//! rasters.

use geo::Coord;

/// EPSG code of the CONUS Albers grid.
pub const CONUS_ALBERS_EPSG: u16 = 5070;

/// NAD83 / Conus Albers (EPSG:5070) on the GRS80 ellipsoid.
pub const CONUS_ALBERS: AlbersParams = AlbersParams {
    semi_major: 6_378_137.0,
    inverse_flattening: 298.257_222_101,
    lat_origin: 23.0,
    lon_origin: -96.0,
    standard_parallel_1: 29.5,
    standard_parallel_2: 45.5,
    false_easting: 0.0,
    false_northing: 0.0,
};

/// Defining parameters of an Albers Equal Area projection. Angles are in
/// degrees, lengths in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlbersParams {
    pub semi_major: f64,
    pub inverse_flattening: f64,
    pub lat_origin: f64,
    pub lon_origin: f64,
    pub standard_parallel_1: f64,
    pub standard_parallel_2: f64,
    pub false_easting: f64,
    pub false_northing: f64,
}

/// A ready-to-use Albers projection with its derived constants.
#[derive(Debug, Clone, Copy)]
pub struct AlbersEqualArea {
    a: f64,
    e: f64,
    e2: f64,
    n: f64,
    c: f64,
    rho0: f64,
    lon0: f64,
    false_easting: f64,
    false_northing: f64,
}

impl Default for AlbersEqualArea {
    fn default() -> Self {
        Self::new(&CONUS_ALBERS)
    }
}

impl AlbersEqualArea {
    /// Derives the projection constants from `params`.
    #[must_use]
    pub fn new(params: &AlbersParams) -> Self {
        let a = params.semi_major;
        let f = 1.0 / params.inverse_flattening;
        let e2 = 2.0f64.mul_add(f, -(f * f));
        let e = e2.sqrt();

        let phi0 = params.lat_origin.to_radians();
        let phi1 = params.standard_parallel_1.to_radians();
        let phi2 = params.standard_parallel_2.to_radians();

        let m1 = m(phi1, e2);
        let m2 = m(phi2, e2);
        let q0 = q(phi0, e, e2);
        let q1 = q(phi1, e, e2);
        let q2 = q(phi2, e, e2);

        let n = if (phi1 - phi2).abs() < f64::EPSILON {
            phi1.sin()
        } else {
            (m1 * m1 - m2 * m2) / (q2 - q1)
        };
        let c = n.mul_add(q1, m1 * m1);
        let rho0 = a * n.mul_add(-q0, c).sqrt() / n;

        Self {
            a,
            e,
            e2,
            n,
            c,
            rho0,
            lon0: params.lon_origin.to_radians(),
            false_easting: params.false_easting,
            false_northing: params.false_northing,
        }
    }

    /// Projects geographic degrees to planar meters.
    #[must_use]
    pub fn forward(&self, lon: f64, lat: f64) -> Coord<f64> {
        let phi = lat.to_radians();
        let q = q(phi, self.e, self.e2);
        let rho = self.a * self.n.mul_add(-q, self.c).max(0.0).sqrt() / self.n;
        let theta = self.n * normalize_lon(lon.to_radians() - self.lon0);

        Coord {
            x: rho.mul_add(theta.sin(), self.false_easting),
            y: rho.mul_add(-theta.cos(), self.rho0) + self.false_northing,
        }
    }

    /// Converts planar meters back to geographic degrees.
    #[must_use]
    pub fn inverse(&self, x: f64, y: f64) -> Coord<f64> {
        let x = x - self.false_easting;
        let dy = self.rho0 - (y - self.false_northing);
        let sign = self.n.signum();
        let rho = x.hypot(dy) * sign;
        let theta = (x * sign).atan2(dy * sign);

        let q = (self.c - (rho * rho * self.n * self.n) / (self.a * self.a)) / self.n;
        let phi = self.latitude_from_q(q);
        let lambda = theta / self.n + self.lon0;

        Coord {
            x: normalize_lon(lambda).to_degrees(),
            y: phi.to_degrees(),
        }
    }

    /// Iterates Snyder eq. 3-16 to recover latitude from `q`.
    fn latitude_from_q(&self, q: f64) -> f64 {
        let mut phi = (q / 2.0).clamp(-1.0, 1.0).asin();
        for _ in 0..15 {
            let sin_phi = phi.sin();
            let es = self.e * sin_phi;
            let one_minus = (self.e2 * sin_phi).mul_add(-sin_phi, 1.0);
            let delta = one_minus * one_minus / (2.0 * phi.cos())
                * (q / (1.0 - self.e2) - sin_phi / one_minus
                    + (1.0 / (2.0 * self.e)) * ((1.0 - es) / (1.0 + es)).ln());
            phi += delta;
            if delta.abs() < 1e-12 {
                break;
            }
        }
        phi
    }
}

fn m(phi: f64, e2: f64) -> f64 {
    let sin_phi = phi.sin();
    phi.cos() / (e2 * sin_phi).mul_add(-sin_phi, 1.0).sqrt()
}

fn q(phi: f64, e: f64, e2: f64) -> f64 {
    let sin_phi = phi.sin();
    let es = e * sin_phi;
    (1.0 - e2)
        * (sin_phi / es.mul_add(-es, 1.0) - (1.0 / (2.0 * e)) * ((1.0 - es) / (1.0 + es)).ln())
}

fn normalize_lon(lambda: f64) -> f64 {
    use std::f64::consts::PI;
    let mut l = lambda;
    while l > PI {
        l -= 2.0 * PI;
    }
    while l < -PI {
        l += 2.0 * PI;
    }
    l
}
