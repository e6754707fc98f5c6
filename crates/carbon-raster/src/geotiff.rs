//! Single-band GeoTIFF rasters.

use crate::{RasterError, Result};
use geo::Rect;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tiff::decoder::{ChunkType, Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::{DirectoryEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;
use tiff::ColorType;
use tracing::debug;

// GeoTIFF and GDAL tag IDs (not in the tiff crate)
const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

// GeoKey IDs and values
const GT_MODEL_TYPE_KEY: u16 = 1024;
const GT_RASTER_TYPE_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_KEY: u16 = 3072;
const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const USER_DEFINED: u16 = 32767;

/// EPSG code assumed when a file carries no GeoKeys.
pub const DEFAULT_EPSG: u16 = 4326;

/// Decoder buffer limit. A 10-degree, 100 m biomass tile is about 126
/// million pixels, i.e. ~500 MB once widened to f32. Windowed reads only
/// decode the strips or tiles they touch.
const DECODE_LIMIT: usize = 1024 * 1024 * 1024;

/// Affine georeferencing of a north-up raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    /// X of the outer corner of pixel (0, 0).
    pub origin_x: f64,
    /// Y of the outer corner of pixel (0, 0).
    pub origin_y: f64,
    /// Pixel width in CRS units.
    pub pixel_width: f64,
    /// Pixel height in CRS units; positive, rows run south.
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Create a transform from the top-left corner and pixel size.
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// World coordinates of a pixel centre.
    pub fn pixel_center(&self, col: i64, row: i64) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y - (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Fractional pixel position of a world coordinate.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (self.origin_y - y) / self.pixel_height,
        )
    }

    /// Transform of a window whose first pixel is `(col, row)` of this grid.
    pub fn offset(&self, col: i64, row: i64) -> Self {
        Self {
            origin_x: self.origin_x + col as f64 * self.pixel_width,
            origin_y: self.origin_y - row as f64 * self.pixel_height,
            ..*self
        }
    }
}

/// A single-band raster held in memory as `f32`.
///
/// Pixels are stored row-major, north to south and west to east.
#[derive(Debug, Clone)]
pub struct RasterTile {
    data: Vec<f32>,
    width: u32,
    height: u32,
    transform: GeoTransform,
    epsg: u16,
    nodata: Option<f64>,
    path: Option<PathBuf>,
}

impl RasterTile {
    /// Build a raster from a pixel buffer.
    pub fn new(
        width: u32,
        height: u32,
        transform: GeoTransform,
        epsg: u16,
        data: Vec<f32>,
        nodata: Option<f64>,
    ) -> Result<Self> {
        if data.len() != width as usize * height as usize {
            return Err(RasterError::DimensionMismatch {
                width,
                height,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            transform,
            epsg,
            nodata,
            path: None,
        })
    }

    /// Load a raster from a single-band GeoTIFF file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        GeoTiffReader::open(path)?.read_all()
    }

    /// Pixel values, row-major.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Georeferencing.
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// EPSG code of the raster CRS.
    pub fn epsg(&self) -> u16 {
        self.epsg
    }

    /// Declared no-data value, if any.
    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    /// File the raster was loaded from.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Outer bounds in CRS units.
    pub fn bounds(&self) -> Rect<f64> {
        let t = &self.transform;
        Rect::new(
            (t.origin_x, t.origin_y - self.height as f64 * t.pixel_height),
            (t.origin_x + self.width as f64 * t.pixel_width, t.origin_y),
        )
    }

    /// Value at a pixel, `None` outside the raster.
    pub fn value(&self, col: i64, row: i64) -> Option<f32> {
        if col < 0 || row < 0 || col >= self.width as i64 || row >= self.height as i64 {
            return None;
        }
        self.data.get(row as usize * self.width as usize + col as usize).copied()
    }

    /// True if `value` is this raster's declared no-data value.
    pub fn is_nodata(&self, value: f32) -> bool {
        match self.nodata {
            Some(nodata) if nodata.is_nan() => value.is_nan(),
            Some(nodata) => value == nodata as f32,
            None => false,
        }
    }

    /// Write the raster as an uncompressed float32 GeoTIFF.
    pub fn write_geotiff<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut file = BufWriter::new(File::create(path)?);
        self.write_to(&mut file)?;
        file.flush()?;
        debug!(path = %path.display(), "Wrote raster");
        Ok(())
    }

    /// Encode the raster as a GeoTIFF into any seekable writer.
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<()> {
        let mut encoder = TiffEncoder::new(writer)?;
        let mut image = encoder.new_image::<Gray32Float>(self.width, self.height)?;
        self.write_geo_tags(image.encoder())?;
        image.write_data(&self.data)?;
        Ok(())
    }

    fn write_geo_tags<W: Write + Seek, K: TiffKind>(
        &self,
        dir: &mut DirectoryEncoder<W, K>,
    ) -> Result<()> {
        let t = &self.transform;
        let pixel_scale = [t.pixel_width, t.pixel_height, 0.0];
        dir.write_tag(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE), pixel_scale.as_slice())?;

        let tiepoint = [0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0];
        dir.write_tag(Tag::from_u16_exhaustive(MODEL_TIEPOINT), tiepoint.as_slice())?;

        let geokeys = geokey_directory(self.epsg);
        dir.write_tag(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY), geokeys.as_slice())?;

        if let Some(nodata) = self.nodata {
            dir.write_tag(Tag::from_u16_exhaustive(GDAL_NODATA), nodata.to_string().as_str())?;
        }
        Ok(())
    }
}

/// A rectangle of pixels: first column and row, then size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    /// First column.
    pub col: u32,
    /// First row.
    pub row: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl PixelWindow {
    fn cols(&self) -> Range<u32> {
        self.col..self.col + self.width
    }

    fn rows(&self) -> Range<u32> {
        self.row..self.row + self.height
    }
}

/// An open GeoTIFF whose header has been read but whose pixels have not.
///
/// [`GeoTiffReader::read_window`] decodes only the strips or tiles that
/// intersect the window, so a small boundary over a 10-degree tile does not
/// pay for the whole tile.
pub struct GeoTiffReader {
    decoder: Decoder<BufReader<File>>,
    path: PathBuf,
    width: u32,
    height: u32,
    transform: GeoTransform,
    epsg: u16,
    nodata: Option<f64>,
}

impl std::fmt::Debug for GeoTiffReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoTiffReader")
            .field("path", &self.path)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("epsg", &self.epsg)
            .finish()
    }
}

impl GeoTiffReader {
    /// Open a single-band GeoTIFF and read its georeferencing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = BufReader::new(File::open(path)?);
        let mut decoder = Decoder::new(file)?;

        let mut limits = Limits::default();
        limits.decoding_buffer_size = DECODE_LIMIT;
        limits.intermediate_buffer_size = DECODE_LIMIT;
        limits.ifd_value_size = DECODE_LIMIT;
        decoder = decoder.with_limits(limits);

        match decoder.colortype()? {
            ColorType::Gray(_) => {}
            other => {
                return Err(RasterError::UnsupportedDataType(format!(
                    "{}: expected a single band, found {:?}",
                    path.display(),
                    other
                )))
            }
        }

        let (width, height) = decoder.dimensions()?;
        let transform = read_transform(&mut decoder, path)?;
        let epsg = read_epsg(&mut decoder, path)?;
        let nodata = read_nodata(&mut decoder);

        Ok(Self {
            decoder,
            path: path.to_path_buf(),
            width,
            height,
            transform,
            epsg,
            nodata,
        })
    }

    /// EPSG code of the raster CRS.
    pub fn epsg(&self) -> u16 {
        self.epsg
    }

    /// Georeferencing of the full image.
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Image size in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Pixels covering `area` (in the raster CRS) plus a one-pixel margin,
    /// clamped to the image. `None` when the area misses the image.
    pub fn window_for(&self, area: &Rect<f64>) -> Option<PixelWindow> {
        let (left, top) = self.transform.world_to_pixel(area.min().x, area.max().y);
        let (right, bottom) = self.transform.world_to_pixel(area.max().x, area.min().y);
        if ![left, top, right, bottom].iter().all(|v| v.is_finite()) {
            return None;
        }

        let clamp = |v: f64, limit: u32| v.clamp(0.0, limit as f64) as u32;
        let col0 = clamp(left.floor() - 1.0, self.width);
        let row0 = clamp(top.floor() - 1.0, self.height);
        let col1 = clamp(right.ceil() + 1.0, self.width);
        let row1 = clamp(bottom.ceil() + 1.0, self.height);
        if col1 <= col0 || row1 <= row0 {
            return None;
        }
        Some(PixelWindow {
            col: col0,
            row: row0,
            width: col1 - col0,
            height: row1 - row0,
        })
    }

    /// Decode the whole image.
    pub fn read_all(self) -> Result<RasterTile> {
        let window = PixelWindow {
            col: 0,
            row: 0,
            width: self.width,
            height: self.height,
        };
        self.read_window(window)
    }

    /// Decode the pixels of `window`, which must lie inside the image.
    pub fn read_window(mut self, window: PixelWindow) -> Result<RasterTile> {
        if window.col + window.width > self.width || window.row + window.height > self.height {
            return Err(invalid(&self.path, "window extends past the image"));
        }

        let mut data = vec![0f32; window.width as usize * window.height as usize];
        if !data.is_empty() {
            self.copy_chunks(&window, &mut data)?;
        }

        debug!(
            path = %self.path.display(),
            col = window.col,
            row = window.row,
            width = window.width,
            height = window.height,
            full_width = self.width,
            full_height = self.height,
            epsg = self.epsg,
            nodata = ?self.nodata,
            "Loaded raster"
        );

        let transform = self.transform.offset(window.col as i64, window.row as i64);
        let mut raster = RasterTile::new(window.width, window.height, transform, self.epsg, data, self.nodata)?;
        raster.path = Some(self.path);
        Ok(raster)
    }

    /// Decode every strip or tile that touches `window` into `out`.
    fn copy_chunks(&mut self, window: &PixelWindow, out: &mut [f32]) -> Result<()> {
        let (chunk_width, chunk_height) = self.decoder.chunk_dimensions();
        if chunk_width == 0 || chunk_height == 0 {
            return Err(invalid(&self.path, "zero-sized strips or tiles"));
        }
        // Strips span the full width, so there is a single chunk column
        let chunks_across = match self.decoder.get_chunk_type() {
            ChunkType::Strip => 1,
            ChunkType::Tile => self.width.div_ceil(chunk_width),
        };

        let (cols, rows) = (window.cols(), window.rows());
        for chunk_row in rows.start / chunk_height..=(rows.end - 1) / chunk_height {
            for chunk_col in cols.start / chunk_width..=(cols.end - 1) / chunk_width {
                let index = chunk_row * chunks_across + chunk_col;
                let (data_width, data_height) = self.decoder.chunk_data_dimensions(index);
                let chunk = widen(self.decoder.read_chunk(index)?);

                let (x0, y0) = (chunk_col * chunk_width, chunk_row * chunk_height);
                let col_start = x0.max(cols.start);
                let col_end = (x0 + data_width).min(cols.end);
                if col_end <= col_start {
                    continue;
                }
                let run = (col_end - col_start) as usize;
                for row in y0.max(rows.start)..(y0 + data_height).min(rows.end) {
                    let src = ((row - y0) * data_width + (col_start - x0)) as usize;
                    let dst = ((row - rows.start) * window.width + (col_start - cols.start)) as usize;
                    let values = chunk
                        .get(src..src + run)
                        .ok_or_else(|| invalid(&self.path, "strip or tile shorter than declared"))?;
                    out[dst..dst + run].copy_from_slice(values);
                }
            }
        }
        Ok(())
    }
}

/// Read the georeferencing from ModelTiepoint + ModelPixelScale, or from
/// ModelTransformation.
fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>, path: &Path) -> Result<GeoTransform> {
    let tiepoint = decoder
        .find_tag(Tag::from_u16_exhaustive(MODEL_TIEPOINT))?
        .map(|v| v.into_f64_vec())
        .transpose()?;
    let scale = decoder
        .find_tag(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE))?
        .map(|v| v.into_f64_vec())
        .transpose()?;

    if let (Some(tiepoint), Some(scale)) = (tiepoint, scale) {
        if tiepoint.len() >= 6 && scale.len() >= 2 {
            // Tiepoint format: [i, j, k, x, y, z] ties raster (i, j) to world (x, y)
            let (i, j) = (tiepoint[0], tiepoint[1]);
            return Ok(GeoTransform::new(
                tiepoint[3] - i * scale[0],
                tiepoint[4] + j * scale[1],
                scale[0],
                scale[1],
            ));
        }
    }

    let matrix = decoder
        .find_tag(Tag::from_u16_exhaustive(MODEL_TRANSFORMATION))?
        .map(|v| v.into_f64_vec())
        .transpose()?;
    if let Some(m) = matrix {
        if m.len() >= 8 {
            if m[1] != 0.0 || m[4] != 0.0 {
                return Err(invalid(path, "rotated rasters are not supported"));
            }
            return Ok(GeoTransform::new(m[3], m[7], m[0], -m[5]));
        }
    }

    Err(invalid(path, "missing ModelTiepoint/ModelPixelScale or ModelTransformation"))
}

/// Read the EPSG code from the GeoKeyDirectory.
fn read_epsg<R: Read + Seek>(decoder: &mut Decoder<R>, path: &Path) -> Result<u16> {
    let Some(keys) = decoder.find_tag_unsigned_vec::<u16>(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY))? else {
        return Ok(DEFAULT_EPSG);
    };

    // Header is [version, revision, minor, count], then 4 shorts per key
    let key_value = |id: u16| {
        keys.get(4..)
            .unwrap_or_default()
            .chunks_exact(4)
            .find(|entry| entry[0] == id && entry[1] == 0)
            .map(|entry| entry[3])
    };

    match key_value(PROJECTED_CS_TYPE_KEY).or_else(|| key_value(GEOGRAPHIC_TYPE_KEY)) {
        Some(USER_DEFINED) => Err(invalid(path, "user-defined CRS is not supported")),
        Some(code) => Ok(code),
        None => Ok(DEFAULT_EPSG),
    }
}

/// Read the GDAL_NODATA tag, stored as ASCII.
fn read_nodata<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    decoder
        .get_tag_ascii_string(Tag::from_u16_exhaustive(GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

fn widen(result: DecodingResult) -> Vec<f32> {
    match result {
        DecodingResult::F32(data) => data,
        DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U16(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f32).collect(),
    }
}

/// GeoKeyDirectory for a geographic or projected EPSG code.
fn geokey_directory(epsg: u16) -> Vec<u16> {
    let geographic = (4000..5000).contains(&epsg);
    let (model, crs_key) = if geographic {
        (MODEL_TYPE_GEOGRAPHIC, GEOGRAPHIC_TYPE_KEY)
    } else {
        (MODEL_TYPE_PROJECTED, PROJECTED_CS_TYPE_KEY)
    };

    vec![
        1, 1, 0, 3, // version, revision, minor, number of keys
        GT_MODEL_TYPE_KEY, 0, 1, model,
        GT_RASTER_TYPE_KEY, 0, 1, RASTER_PIXEL_IS_AREA,
        crs_key, 0, 1, epsg,
    ]
}

fn invalid(path: &Path, reason: &str) -> RasterError {
    RasterError::InvalidGeoTiff {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}
