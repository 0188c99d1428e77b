//! Categorical habitat rasters stored as GeoTIFF.
//!
//! Only north-up single-band integer rasters are supported. Georeferencing
//! comes from the `ModelPixelScale` and `ModelTiepoint` tags, the CRS from
//! the GeoKey directory, and the nodata value from the `GDAL_NODATA` tag.
//!
//! Strips and tiles are decoded on demand and kept in a small cache, so
//! masking a polygon only reads the chunks under its bounding window.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use geo::{BoundingRect, Contains, Coord, Point, Polygon, Rect};
use tiff::ColorType;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

use crate::RasterError;
use crate::projection::CONUS_ALBERS_EPSG;

/// Decoded chunks kept in memory at once.
const CHUNK_CACHE_SIZE: usize = 256;

pub(crate) const TAG_MODEL_PIXEL_SCALE: u16 = 33_550;
pub(crate) const TAG_MODEL_TIEPOINT: u16 = 33_922;
pub(crate) const TAG_GEO_KEY_DIRECTORY: u16 = 34_735;
pub(crate) const TAG_GDAL_NODATA: u16 = 42_113;

const KEY_MODEL_TYPE: u32 = 1024;
const KEY_RASTER_TYPE: u32 = 1025;
const KEY_GEOGRAPHIC_TYPE: u32 = 2048;
const KEY_PROJECTED_CS_TYPE: u32 = 3072;

const MODEL_TYPE_GEOGRAPHIC: u32 = 2;
const RASTER_PIXEL_IS_POINT: u32 = 2;
const USER_DEFINED: u32 = 32_767;

/// Value counted as non-habitat.
pub const NON_HABITAT_CODE: i64 = 0;

/// Returns the TIFF tag for a numeric GeoTIFF/GDAL tag code.
#[must_use]
pub fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Cell tallies for one polygon footprint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellCounts {
    /// Footprint cells holding a habitat code.
    pub habitat: u64,
    /// Footprint cells holding [`NON_HABITAT_CODE`].
    pub non_habitat: u64,
    /// Footprint cells holding any other code, or nodata.
    pub other: u64,
    /// Of `other`, the cells equal to the nodata value.
    pub nodata: u64,
    /// Cells in the clipped bounding window.
    pub window_cells: u64,
    /// Distinct non-nodata codes found in `other` cells.
    pub unexpected_codes: BTreeSet<i64>,
}

impl CellCounts {
    /// Habitat plus non-habitat cells.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.habitat + self.non_habitat
    }

    /// Cells whose centre lies inside the polygon.
    #[must_use]
    pub const fn footprint(&self) -> u64 {
        self.habitat + self.non_habitat + self.other
    }
}

/// Result of masking a raster with one polygon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaskOutcome {
    /// The polygon's bounding box intersects the raster.
    Overlap(CellCounts),
    /// The polygon's bounding box lies entirely outside the raster extent.
    NoOverlap,
}

/// Affine placement of a north-up raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    /// X of the upper-left corner of the upper-left cell.
    pub origin_x: f64,
    /// Y of the upper-left corner of the upper-left cell.
    pub origin_y: f64,
    /// Cell width in CRS units.
    pub cell_width: f64,
    /// Cell height in CRS units (positive).
    pub cell_height: f64,
}

impl GeoTransform {
    /// Builds the transform from `ModelPixelScale` and one `ModelTiepoint`.
    fn from_tags(scale: &[f64], tiepoint: &[f64], pixel_is_point: bool) -> Result<Self, RasterError> {
        if scale.len() < 2 || tiepoint.len() < 6 {
            return Err(RasterError::Georeference {
                message: "ModelPixelScale or ModelTiepoint is too short".to_string(),
            });
        }
        let (sx, sy) = (scale[0], scale[1]);
        if !(sx > 0.0 && sy > 0.0 && sx.is_finite() && sy.is_finite()) {
            return Err(RasterError::Georeference {
                message: format!("invalid pixel scale ({sx}, {sy})"),
            });
        }
        let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
        let mut origin_x = i.mul_add(-sx, x);
        let mut origin_y = j.mul_add(sy, y);
        if pixel_is_point {
            origin_x -= sx / 2.0;
            origin_y += sy / 2.0;
        }
        Ok(Self {
            origin_x,
            origin_y,
            cell_width: sx,
            cell_height: sy,
        })
    }

    fn cell_center(&self, row: u32, col: u32) -> Point<f64> {
        Point::new(
            (f64::from(col) + 0.5).mul_add(self.cell_width, self.origin_x),
            (f64::from(row) + 0.5).mul_add(-self.cell_height, self.origin_y),
        )
    }
}

/// Descriptive metadata for an opened raster.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterMetadata {
    pub width: u32,
    pub height: u32,
    pub cell_width: f64,
    pub cell_height: f64,
    pub extent: Rect<f64>,
    /// EPSG code of the projected (or geographic) CRS, when declared.
    pub epsg: Option<u32>,
    pub nodata: Option<i64>,
}

struct Chunk {
    stride: usize,
    data: Vec<i64>,
}

impl Chunk {
    fn get(&self, local_row: usize, local_col: usize) -> Option<i64> {
        self.data.get(local_row * self.stride + local_col).copied()
    }
}

/// An opened GeoTIFF habitat raster.
///
/// The file handle is held for the lifetime of the value and closed on drop.
pub struct HabitatRaster {
    path: PathBuf,
    decoder: Decoder<BufReader<File>>,
    width: u32,
    height: u32,
    chunk_width: u32,
    chunk_height: u32,
    chunks_across: u32,
    transform: GeoTransform,
    epsg: Option<u32>,
    nodata: Option<i64>,
    cache: BTreeMap<u32, Chunk>,
    cache_order: VecDeque<u32>,
}

impl std::fmt::Debug for HabitatRaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HabitatRaster")
            .field("path", &self.path)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("transform", &self.transform)
            .field("epsg", &self.epsg)
            .field("nodata", &self.nodata)
            .finish_non_exhaustive()
    }
}

impl HabitatRaster {
    /// Opens a GeoTIFF and reads its georeferencing.
    ///
    /// # Errors
    ///
    /// Returns [`RasterError`] if the file cannot be opened, is not a
    /// single-band integer TIFF, lacks georeferencing tags, or is in a
    /// geographic (degree-based) CRS.
    pub fn open(path: &Path) -> Result<Self, RasterError> {
        let file = File::open(path).map_err(|source| RasterError::Open {
            path: path.display().to_string(),
            source,
        })?;
        let mut decoder = Decoder::new(BufReader::new(file))?.with_limits(Limits::unlimited());

        match decoder.colortype()? {
            ColorType::Gray(_) => {}
            other => {
                return Err(RasterError::Unsupported {
                    message: format!("expected a single-band raster, found {other:?}"),
                });
            }
        }

        let (width, height) = decoder.dimensions()?;
        let (chunk_width, chunk_height) = decoder.chunk_dimensions();
        let chunks_across = width.div_ceil(chunk_width.max(1));

        let geo_keys = read_geo_keys(&mut decoder)?;
        if geo_keys.get(&KEY_MODEL_TYPE) == Some(&MODEL_TYPE_GEOGRAPHIC) {
            return Err(RasterError::Unsupported {
                message: "raster is in a geographic CRS; buffers require projected meters"
                    .to_string(),
            });
        }
        let pixel_is_point = geo_keys.get(&KEY_RASTER_TYPE) == Some(&RASTER_PIXEL_IS_POINT);
        let epsg = geo_keys
            .get(&KEY_PROJECTED_CS_TYPE)
            .or_else(|| geo_keys.get(&KEY_GEOGRAPHIC_TYPE))
            .copied()
            .filter(|code| *code != USER_DEFINED);

        let scale = required_f64s(&mut decoder, TAG_MODEL_PIXEL_SCALE, "ModelPixelScale")?;
        let tiepoint = required_f64s(&mut decoder, TAG_MODEL_TIEPOINT, "ModelTiepoint")?;
        let transform = GeoTransform::from_tags(&scale, &tiepoint, pixel_is_point)?;

        let nodata = match decoder.find_tag(tag(TAG_GDAL_NODATA))? {
            Some(value) => parse_nodata(&value.into_string()?),
            None => None,
        };

        match epsg {
            Some(code) if code != u32::from(CONUS_ALBERS_EPSG) => log::warn!(
                "{} declares EPSG:{code}; buffers are built in EPSG:{CONUS_ALBERS_EPSG}",
                path.display()
            ),
            None => log::debug!(
                "{} has no EPSG code; assuming CONUS Albers",
                path.display()
            ),
            _ => {}
        }

        log::info!(
            "Opened habitat raster {} ({width}x{height}, {}m cells, {chunk_width}x{chunk_height} chunks, nodata {nodata:?})",
            path.display(),
            transform.cell_width,
        );

        Ok(Self {
            path: path.to_path_buf(),
            decoder,
            width,
            height,
            chunk_width,
            chunk_height,
            chunks_across,
            transform,
            epsg,
            nodata,
            cache: BTreeMap::new(),
            cache_order: VecDeque::new(),
        })
    }

    /// Returns descriptive metadata.
    #[must_use]
    pub fn metadata(&self) -> RasterMetadata {
        RasterMetadata {
            width: self.width,
            height: self.height,
            cell_width: self.transform.cell_width,
            cell_height: self.transform.cell_height,
            extent: self.extent(),
            epsg: self.epsg,
            nodata: self.nodata,
        }
    }

    /// Returns the raster's bounding rectangle in CRS units.
    #[must_use]
    pub fn extent(&self) -> Rect<f64> {
        let t = &self.transform;
        Rect::new(
            Coord {
                x: t.origin_x,
                y: f64::from(self.height).mul_add(-t.cell_height, t.origin_y),
            },
            Coord {
                x: f64::from(self.width).mul_add(t.cell_width, t.origin_x),
                y: t.origin_y,
            },
        )
    }

    /// Counts habitat, non-habitat and other cells under `polygon`.
    ///
    /// A cell belongs to the footprint when its centre lies inside the
    /// polygon. Nodata cells are tallied as `other` even if the nodata
    /// value is a habitat code or zero.
    ///
    /// # Errors
    ///
    /// Returns [`RasterError`] if a chunk cannot be decoded.
    pub fn mask(
        &mut self,
        polygon: &Polygon<f64>,
        habitat_codes: &BTreeSet<i64>,
    ) -> Result<MaskOutcome, RasterError> {
        let Some(bbox) = polygon.bounding_rect() else {
            return Ok(MaskOutcome::NoOverlap);
        };
        let extent = self.extent();
        if bbox.max().x <= extent.min().x
            || bbox.min().x >= extent.max().x
            || bbox.max().y <= extent.min().y
            || bbox.min().y >= extent.max().y
        {
            return Ok(MaskOutcome::NoOverlap);
        }

        let t = self.transform;
        let col_start = cell_index((bbox.min().x - t.origin_x) / t.cell_width, self.width, false);
        let col_end = cell_index((bbox.max().x - t.origin_x) / t.cell_width, self.width, true);
        let row_start = cell_index((t.origin_y - bbox.max().y) / t.cell_height, self.height, false);
        let row_end = cell_index((t.origin_y - bbox.min().y) / t.cell_height, self.height, true);

        let mut counts = CellCounts {
            window_cells: u64::from(col_end - col_start) * u64::from(row_end - row_start),
            ..CellCounts::default()
        };

        for row in row_start..row_end {
            for col in col_start..col_end {
                if !polygon.contains(&t.cell_center(row, col)) {
                    continue;
                }
                let value = self.value_at(row, col)?;
                self.classify(value, habitat_codes, &mut counts);
            }
        }

        Ok(MaskOutcome::Overlap(counts))
    }

    fn classify(&self, value: Option<i64>, habitat_codes: &BTreeSet<i64>, counts: &mut CellCounts) {
        match value {
            None => {
                counts.other += 1;
                counts.nodata += 1;
            }
            Some(v) if Some(v) == self.nodata => {
                counts.other += 1;
                counts.nodata += 1;
            }
            Some(v) if habitat_codes.contains(&v) => counts.habitat += 1,
            Some(NON_HABITAT_CODE) => counts.non_habitat += 1,
            Some(v) => {
                counts.other += 1;
                counts.unexpected_codes.insert(v);
            }
        }
    }

    /// Returns the cell value at (`row`, `col`), or `None` if the chunk is
    /// shorter than expected.
    fn value_at(&mut self, row: u32, col: u32) -> Result<Option<i64>, RasterError> {
        let chunk_row = row / self.chunk_height;
        let chunk_col = col / self.chunk_width;
        let index = chunk_row * self.chunks_across + chunk_col;
        let local_row = (row - chunk_row * self.chunk_height) as usize;
        let local_col = (col - chunk_col * self.chunk_width) as usize;

        if let Some(chunk) = self.cache.get(&index) {
            return Ok(chunk.get(local_row, local_col));
        }

        let chunk = self.load_chunk(index, chunk_col)?;
        let value = chunk.get(local_row, local_col);
        self.insert_chunk(index, chunk);
        Ok(value)
    }

    fn load_chunk(&mut self, index: u32, chunk_col: u32) -> Result<Chunk, RasterError> {
        let data = match self.decoder.read_chunk(index)? {
            DecodingResult::U8(v) => v.into_iter().map(i64::from).collect::<Vec<_>>(),
            DecodingResult::U16(v) => v.into_iter().map(i64::from).collect(),
            DecodingResult::U32(v) => v.into_iter().map(i64::from).collect(),
            DecodingResult::I8(v) => v.into_iter().map(i64::from).collect(),
            DecodingResult::I16(v) => v.into_iter().map(i64::from).collect(),
            DecodingResult::I32(v) => v.into_iter().map(i64::from).collect(),
            DecodingResult::I64(v) => v,
            DecodingResult::U64(v) => v
                .into_iter()
                .map(|x| i64::try_from(x).unwrap_or(i64::MAX))
                .collect(),
            _ => {
                return Err(RasterError::Unsupported {
                    message: "floating point rasters are not categorical".to_string(),
                });
            }
        };

        let full = self.chunk_width as usize * self.chunk_height as usize;
        let stride = if data.len() == full {
            self.chunk_width as usize
        } else {
            self.chunk_width
                .min(self.width - chunk_col * self.chunk_width) as usize
        };

        Ok(Chunk { stride, data })
    }

    fn insert_chunk(&mut self, index: u32, chunk: Chunk) {
        if self.cache.len() >= CHUNK_CACHE_SIZE
            && let Some(oldest) = self.cache_order.pop_front()
        {
            self.cache.remove(&oldest);
        }
        self.cache.insert(index, chunk);
        self.cache_order.push_back(index);
    }
}

/// Converts a fractional cell coordinate to a clamped index. Upper bounds
/// round up so partially covered cells are included in the window.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn cell_index(fractional: f64, limit: u32, round_up: bool) -> u32 {
    let v = if round_up {
        fractional.ceil()
    } else {
        fractional.floor()
    };
    v.clamp(0.0, f64::from(limit)) as u32
}

fn required_f64s(
    decoder: &mut Decoder<BufReader<File>>,
    code: u16,
    name: &str,
) -> Result<Vec<f64>, RasterError> {
    decoder
        .find_tag(tag(code))?
        .ok_or_else(|| RasterError::Georeference {
            message: format!("missing {name} tag"),
        })?
        .into_f64_vec()
        .map_err(RasterError::from)
}

/// Reads the GeoKey directory into a map of short-valued keys.
fn read_geo_keys(
    decoder: &mut Decoder<BufReader<File>>,
) -> Result<BTreeMap<u32, u32>, RasterError> {
    let Some(value) = decoder.find_tag(tag(TAG_GEO_KEY_DIRECTORY))? else {
        return Ok(BTreeMap::new());
    };
    let raw = value.into_u32_vec()?;
    let mut keys = BTreeMap::new();
    if raw.len() < 4 {
        return Ok(keys);
    }
    let count = raw[3] as usize;
    for entry in raw[4..].chunks_exact(4).take(count) {
        // Location 0 means the value is stored inline.
        if entry[1] == 0 {
            keys.insert(entry[0], entry[3]);
        }
    }
    Ok(keys)
}

/// Parses a `GDAL_NODATA` string. Non-integral values cannot match an
/// integer cell and are ignored.
fn parse_nodata(text: &str) -> Option<i64> {
    let value: f64 = text.trim_matches(|c: char| c == '\0' || c.is_whitespace()).parse().ok()?;
    #[allow(clippy::cast_possible_truncation)]
    let int = value as i64;
    #[allow(clippy::cast_precision_loss)]
    let exact = (int as f64 - value).abs() < f64::EPSILON;
    (value.is_finite() && exact).then_some(int)
}

#[cfg(test)]
mod tests {
    use geo::Coord;

    use crate::test_support::{CELL, ORIGIN_X, ORIGIN_Y, write_gray8};
    use super::*;
    use crate::buffer::circle;

    fn codes(values: &[i64]) -> BTreeSet<i64> {
        values.iter().copied().collect()
    }

    fn center_of_cell(row: u32, col: u32) -> Coord<f64> {
        Coord {
            x: ORIGIN_X + (f64::from(col) + 0.5) * CELL,
            y: ORIGIN_Y - (f64::from(row) + 0.5) * CELL,
        }
    }

    #[test]
    fn reads_georeferencing() {
        let path = write_gray8("meta.tif", 4, 3, &[0; 12], Some("255"));
        let raster = HabitatRaster::open(&path).unwrap();
        let meta = raster.metadata();
        assert_eq!((meta.width, meta.height), (4, 3));
        assert_eq!(meta.epsg, Some(5070));
        assert_eq!(meta.nodata, Some(255));
        assert!((meta.extent.min().x - ORIGIN_X).abs() < 1e-9);
        assert!((meta.extent.max().x - (ORIGIN_X + 120.0)).abs() < 1e-9);
        assert!((meta.extent.min().y - (ORIGIN_Y - 90.0)).abs() < 1e-9);
    }

    #[test]
    fn counts_only_cells_with_centres_inside() {
        // 10x10 raster: left half habitat (code 1), right half 0.
        let mut data = vec![0u8; 100];
        for row in 0..10 {
            for col in 0..5 {
                data[row * 10 + col] = 1;
            }
        }
        let path = write_gray8("halves.tif", 10, 10, &data, None);
        let mut raster = HabitatRaster::open(&path).unwrap();

        // Centre on the shared corner of cells (4,4),(4,5),(5,4),(5,5).
        let center = Coord {
            x: ORIGIN_X + 5.0 * CELL,
            y: ORIGIN_Y - 5.0 * CELL,
        };
        let polygon = circle(center, 30.0, 64);
        let MaskOutcome::Overlap(counts) = raster.mask(&polygon, &codes(&[1])).unwrap() else {
            panic!("expected overlap");
        };

        assert_eq!(counts.habitat, 2);
        assert_eq!(counts.non_habitat, 2);
        assert_eq!(counts.other, 0);
        assert!(counts.window_cells >= 4);
        assert!(counts.total() <= counts.window_cells);
    }

    #[test]
    fn other_codes_and_nodata_are_excluded() {
        // Single row: 1, 3, 0, 255, 7
        let path = write_gray8("mixed.tif", 5, 1, &[1, 3, 0, 255, 7], Some("255"));
        let mut raster = HabitatRaster::open(&path).unwrap();
        let polygon = geo::Polygon::new(
            geo::LineString::from(vec![
                (ORIGIN_X - 1.0, ORIGIN_Y + 1.0),
                (ORIGIN_X + 151.0, ORIGIN_Y + 1.0),
                (ORIGIN_X + 151.0, ORIGIN_Y - 31.0),
                (ORIGIN_X - 1.0, ORIGIN_Y - 31.0),
            ]),
            vec![],
        );

        let MaskOutcome::Overlap(counts) = raster.mask(&polygon, &codes(&[1])).unwrap() else {
            panic!("expected overlap");
        };
        assert_eq!(counts.habitat, 1);
        assert_eq!(counts.non_habitat, 1);
        assert_eq!(counts.other, 3);
        assert_eq!(counts.nodata, 1);
        assert_eq!(counts.unexpected_codes, codes(&[3, 7]));

        let MaskOutcome::Overlap(counts) = raster.mask(&polygon, &codes(&[1, 3])).unwrap() else {
            panic!("expected overlap");
        };
        assert_eq!(counts.habitat, 2);
        assert_eq!(counts.unexpected_codes, codes(&[7]));
    }

    #[test]
    fn polygon_outside_extent_is_no_overlap() {
        let path = write_gray8("outside.tif", 3, 3, &[1; 9], None);
        let mut raster = HabitatRaster::open(&path).unwrap();
        let far = Coord {
            x: ORIGIN_X - 10_000.0,
            y: ORIGIN_Y + 10_000.0,
        };
        let outcome = raster.mask(&circle(far, 500.0, 64), &codes(&[1])).unwrap();
        assert_eq!(outcome, MaskOutcome::NoOverlap);
    }

    #[test]
    fn partially_outside_polygon_counts_inside_cells() {
        let path = write_gray8("edge.tif", 3, 3, &[1; 9], None);
        let mut raster = HabitatRaster::open(&path).unwrap();
        let polygon = circle(center_of_cell(0, 0), 40.0, 64);
        let MaskOutcome::Overlap(counts) = raster.mask(&polygon, &codes(&[1])).unwrap() else {
            panic!("expected overlap");
        };
        // Cell (0,0) plus its right and lower neighbours; the rest of the
        // circle lies off the raster.
        assert_eq!(counts.habitat, 3);
        assert_eq!(counts.non_habitat, 0);
    }

    #[test]
    fn tiny_polygon_between_centres_has_empty_footprint() {
        let path = write_gray8("tiny.tif", 3, 3, &[1; 9], None);
        let mut raster = HabitatRaster::open(&path).unwrap();
        let corner = Coord {
            x: ORIGIN_X + CELL,
            y: ORIGIN_Y - CELL,
        };
        let MaskOutcome::Overlap(counts) = raster.mask(&circle(corner, 5.0, 16), &codes(&[1])).unwrap()
        else {
            panic!("expected overlap");
        };
        assert_eq!(counts.footprint(), 0);
        assert!(counts.window_cells > 0);
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let err = HabitatRaster::open(Path::new("/nonexistent/hab_eval/habitat.tif")).unwrap_err();
        assert!(matches!(err, RasterError::Open { .. }));
    }

    #[test]
    fn parses_nodata_strings() {
        assert_eq!(parse_nodata("255"), Some(255));
        assert_eq!(parse_nodata("-9999\0"), Some(-9999));
        assert_eq!(parse_nodata("nan"), None);
        assert_eq!(parse_nodata("0.5"), None);
    }
}
