//! Synthetic 8-bit EPSG:5070 GeoTIFFs for raster and overlay tests.
//!
//! Files land under `std::env::temp_dir()`. Every raster has square
//! [`CELL`] meter cells and the GeoKeys GDAL writes for CONUS Albers.

use std::path::{Path, PathBuf};

use geo::Coord;
use tiff::encoder::{TiffEncoder, colortype};

use crate::projection::AlbersEqualArea;
use crate::raster::{
    TAG_GDAL_NODATA, TAG_GEO_KEY_DIRECTORY, TAG_MODEL_PIXEL_SCALE, TAG_MODEL_TIEPOINT, tag,
};

/// Upper-left x of rasters written by [`write_gray8`].
pub const ORIGIN_X: f64 = 1_000_000.0;
/// Upper-left y of rasters written by [`write_gray8`].
pub const ORIGIN_Y: f64 = 1_500_000.0;
/// Cell size in meters.
pub const CELL: f64 = 30.0;
/// Longitude at the centre of rasters written by [`write_centered_gray8`].
pub const LON: f64 = -90.0;
/// Latitude at the centre of rasters written by [`write_centered_gray8`].
pub const LAT: f64 = 35.0;

const GEO_KEYS_5070: [u16; 16] = [1, 1, 0, 3, 1024, 0, 1, 1, 1025, 0, 1, 1, 3072, 0, 1, 5070];

/// Writes a raster whose upper-left corner is (`ORIGIN_X`, `ORIGIN_Y`).
///
/// # Panics
///
/// Panics if the file cannot be written.
#[must_use]
pub fn write_gray8(
    name: &str,
    width: u32,
    height: u32,
    data: &[u8],
    nodata: Option<&str>,
) -> PathBuf {
    let origin = Coord {
        x: ORIGIN_X,
        y: ORIGIN_Y,
    };
    write_at(name, origin, width, height, data, nodata)
}

/// Writes a raster centred on (`LON`, `LAT`).
///
/// # Panics
///
/// Panics if the file cannot be written.
#[must_use]
pub fn write_centered_gray8(
    name: &str,
    width: u32,
    height: u32,
    data: &[u8],
    nodata: Option<&str>,
) -> PathBuf {
    let center = AlbersEqualArea::default().forward(LON, LAT);
    let origin = Coord {
        x: (f64::from(width) / 2.0).mul_add(-CELL, center.x),
        y: (f64::from(height) / 2.0).mul_add(CELL, center.y),
    };
    write_at(name, origin, width, height, data, nodata)
}

fn write_at(
    name: &str,
    origin: Coord<f64>,
    width: u32,
    height: u32,
    data: &[u8],
    nodata: Option<&str>,
) -> PathBuf {
    let dir = std::env::temp_dir().join("hab_eval_test_rasters");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    encode(&path, origin, width, height, data, nodata);
    path
}

fn encode(
    path: &Path,
    origin: Coord<f64>,
    width: u32,
    height: u32,
    data: &[u8],
    nodata: Option<&str>,
) {
    let file = std::fs::File::create(path).unwrap();
    let mut encoder = TiffEncoder::new(file).unwrap();
    let mut image = encoder.new_image::<colortype::Gray8>(width, height).unwrap();
    image
        .encoder()
        .write_tag(tag(TAG_MODEL_PIXEL_SCALE), &[CELL, CELL, 0.0][..])
        .unwrap();
    image
        .encoder()
        .write_tag(
            tag(TAG_MODEL_TIEPOINT),
            &[0.0, 0.0, 0.0, origin.x, origin.y, 0.0][..],
        )
        .unwrap();
    image
        .encoder()
        .write_tag(tag(TAG_GEO_KEY_DIRECTORY), &GEO_KEYS_5070[..])
        .unwrap();
    if let Some(nodata) = nodata {
        image.encoder().write_tag(tag(TAG_GDAL_NODATA), nodata).unwrap();
    }
    image.write_data(data).unwrap();
}
