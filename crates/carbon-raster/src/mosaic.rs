//! In-memory mosaicking of tiles and clipping to a cutline.

use crate::geotiff::{GeoTiffReader, RasterTile};
use crate::rasterize::CutlineMask;
use crate::stats::{Histogram, RasterStats};
use crate::{RasterError, Result};
use carbon_area::{Boundary, Transformer, WGS84};
use geo::{BoundingRect, MultiPolygon, Rect};
use std::path::Path;
use std::time::Instant;
use tracing::debug;

/// Relative tolerance when comparing pixel sizes of tiles.
const PIXEL_SIZE_TOLERANCE: f64 = 1e-9;

/// Points sampled along each edge when reprojecting an area of interest.
const EDGE_SAMPLES: usize = 8;

/// One or more tiles sharing a CRS and pixel size.
///
/// Tiles are kept in the order given; where they overlap, later tiles win.
#[derive(Debug)]
pub struct Mosaic {
    tiles: Vec<RasterTile>,
}

impl Mosaic {
    /// Load every GeoTIFF in `paths`.
    pub fn open<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        if paths.is_empty() {
            return Err(RasterError::NoInputs);
        }
        let tiles = paths
            .iter()
            .map(RasterTile::from_file)
            .collect::<Result<Vec<_>>>()?;
        Self::from_tiles(tiles)
    }

    /// Load the part of each GeoTIFF in `paths` that covers `area`, given in
    /// WGS84 degrees.
    ///
    /// Tiles that miss the area are skipped. Fails with
    /// [`RasterError::NoOverlap`] when every tile is skipped.
    pub fn open_within<P: AsRef<Path>>(paths: &[P], area: &Rect<f64>) -> Result<Self> {
        if paths.is_empty() {
            return Err(RasterError::NoInputs);
        }
        let mut tiles = Vec::with_capacity(paths.len());
        for path in paths {
            let reader = GeoTiffReader::open(path)?;
            let local = area_in_crs(area, reader.epsg())?;
            match reader.window_for(&local) {
                Some(window) => tiles.push(reader.read_window(window)?),
                None => debug!(path = %path.as_ref().display(), "Tile misses the area of interest"),
            }
        }
        if tiles.is_empty() {
            return Err(RasterError::NoOverlap);
        }
        Self::from_tiles(tiles)
    }

    /// Build a mosaic from tiles already in memory.
    pub fn from_tiles(tiles: Vec<RasterTile>) -> Result<Self> {
        let reference = tiles.first().ok_or(RasterError::NoInputs)?;
        let reference_transform = *reference.transform();
        let epsg = reference.epsg();

        for tile in &tiles[1..] {
            let name = || {
                tile.path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "<in-memory>".to_string())
            };
            if tile.epsg() != epsg {
                return Err(RasterError::GridMismatch {
                    path: name(),
                    reason: format!("EPSG:{} differs from EPSG:{}", tile.epsg(), epsg),
                });
            }
            let t = tile.transform();
            if !close(t.pixel_width, reference_transform.pixel_width)
                || !close(t.pixel_height, reference_transform.pixel_height)
            {
                return Err(RasterError::GridMismatch {
                    path: name(),
                    reason: format!(
                        "pixel size {}x{} differs from {}x{}",
                        t.pixel_width,
                        t.pixel_height,
                        reference_transform.pixel_width,
                        reference_transform.pixel_height
                    ),
                });
            }
        }

        Ok(Self { tiles })
    }

    /// Tiles in paint order.
    pub fn tiles(&self) -> &[RasterTile] {
        &self.tiles
    }

    /// EPSG code shared by all tiles.
    pub fn epsg(&self) -> u16 {
        self.tiles.first().map_or(WGS84, RasterTile::epsg)
    }

    /// Clip the mosaic to a cutline.
    ///
    /// The output grid is aligned to the first tile and cropped to the
    /// cutline extent. Pixels whose centres fall outside the cutline, or that
    /// no tile covers with valid data, are set to `nodata`.
    pub fn clip(&self, cutline: &Boundary, nodata: f64) -> Result<MaskedRaster> {
        let started = Instant::now();
        let reference = self.tiles.first().ok_or(RasterError::NoInputs)?;
        let epsg = reference.epsg();

        let geometry = cutline_in_crs(cutline, epsg)?;
        let cut_bounds = geometry.bounding_rect().ok_or(RasterError::NoOverlap)?;

        let overlapping: Vec<&RasterTile> = self
            .tiles
            .iter()
            .filter(|tile| intersects(&tile.bounds(), &cut_bounds))
            .collect();
        if overlapping.is_empty() {
            return Err(RasterError::NoOverlap);
        }

        // Crop to the cutline, limited to the extent of the overlapping tiles
        let extent = overlapping
            .iter()
            .map(|tile| tile.bounds())
            .reduce(|a, b| union(&a, &b))
            .ok_or(RasterError::NoOverlap)?;
        let min_x = cut_bounds.min().x.max(extent.min().x);
        let max_x = cut_bounds.max().x.min(extent.max().x);
        let min_y = cut_bounds.min().y.max(extent.min().y);
        let max_y = cut_bounds.max().y.min(extent.max().y);

        let grid = reference.transform();
        let (left, top) = grid.world_to_pixel(min_x, max_y);
        let (right, bottom) = grid.world_to_pixel(max_x, min_y);
        let (col0, row0) = (left.floor() as i64, top.floor() as i64);
        let (col1, row1) = (right.ceil() as i64, bottom.ceil() as i64);
        if col1 <= col0 || row1 <= row0 {
            return Err(RasterError::NoOverlap);
        }
        let width = (col1 - col0) as usize;
        let height = (row1 - row0) as usize;
        let window = grid.offset(col0, row0);

        let mask = CutlineMask::rasterize(&geometry, &window, width, height);
        let mut data = vec![nodata as f32; width * height];

        for tile in &overlapping {
            let t = tile.transform();
            for row in 0..height {
                for col in 0..width {
                    if !mask.contains(col, row) {
                        continue;
                    }
                    let (x, y) = window.pixel_center(col as i64, row as i64);
                    let (tile_col, tile_row) = t.world_to_pixel(x, y);
                    if let Some(value) = tile.value(tile_col.floor() as i64, tile_row.floor() as i64) {
                        if !tile.is_nodata(value) {
                            data[row * width + col] = value;
                        }
                    }
                }
            }
        }

        debug!(
            tiles = overlapping.len(),
            width,
            height,
            inside = mask.count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Clipped mosaic to cutline"
        );

        let raster = RasterTile::new(
            width as u32,
            height as u32,
            window,
            epsg,
            data,
            Some(nodata),
        )?;
        Ok(MaskedRaster { raster, nodata })
    }
}

/// A raster clipped to a cutline, with everything outside set to a sentinel.
#[derive(Debug, Clone)]
pub struct MaskedRaster {
    raster: RasterTile,
    nodata: f64,
}

impl MaskedRaster {
    /// The clipped pixels and their georeferencing.
    pub fn raster(&self) -> &RasterTile {
        &self.raster
    }

    /// Sentinel marking excluded pixels.
    pub fn nodata(&self) -> f64 {
        self.nodata
    }

    /// Count, sum and mean of the pixels that are not the sentinel.
    pub fn stats(&self) -> RasterStats {
        RasterStats::from_values(self.raster.data(), self.nodata)
    }

    /// Fixed-width histogram of the valid pixels.
    pub fn histogram(&self, min: f64, max: f64, bins: usize) -> Histogram {
        Histogram::from_values(self.raster.data(), self.nodata, min, max, bins)
    }

    /// Write the clipped raster as a GeoTIFF.
    pub fn write_geotiff<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.raster.write_geotiff(path)
    }
}

/// Clip the rasters in `paths` to `cutline` and reduce them in one call.
pub fn mask_and_calculate<P: AsRef<Path>>(
    paths: &[P],
    cutline: &Boundary,
    nodata: f64,
) -> Result<RasterStats> {
    let mosaic = Mosaic::open(paths)?;
    Ok(mosaic.clip(cutline, nodata)?.stats())
}

/// The cutline geometry expressed in the raster CRS.
fn cutline_in_crs(cutline: &Boundary, epsg: u16) -> Result<MultiPolygon<f64>> {
    let geometry = cutline.geometry();
    if epsg == WGS84 {
        return Ok(geometry);
    }
    debug!("Reprojecting cutline to EPSG:{}", epsg);
    let transformer = Transformer::from_epsg(WGS84, epsg)?;
    Ok(transformer.transform_multi_polygon(&geometry)?)
}

/// Bounding box of a WGS84 rectangle in another CRS, from points sampled
/// along its edges.
fn area_in_crs(area: &Rect<f64>, epsg: u16) -> Result<Rect<f64>> {
    if epsg == WGS84 {
        return Ok(*area);
    }
    let transformer = Transformer::from_epsg(WGS84, epsg)?;
    let (min, max) = (area.min(), area.max());
    let mut bounds: Option<Rect<f64>> = None;
    for i in 0..=EDGE_SAMPLES {
        let t = i as f64 / EDGE_SAMPLES as f64;
        let x = min.x + t * (max.x - min.x);
        let y = min.y + t * (max.y - min.y);
        for (px, py) in [(x, min.y), (x, max.y), (min.x, y), (max.x, y)] {
            let (tx, ty) = transformer.transform_point(px, py)?;
            let point = Rect::new((tx, ty), (tx, ty));
            bounds = Some(match bounds {
                Some(b) => union(&b, &point),
                None => point,
            });
        }
    }
    bounds.ok_or(RasterError::NoOverlap)
}

fn intersects(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x < b.max().x && b.min().x < a.max().x && a.min().y < b.max().y && b.min().y < a.max().y
}

fn union(a: &Rect<f64>, b: &Rect<f64>) -> Rect<f64> {
    Rect::new(
        (a.min().x.min(b.min().x), a.min().y.min(b.min().y)),
        (a.max().x.max(b.max().x), a.max().y.max(b.max().y)),
    )
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= PIXEL_SIZE_TOLERANCE * a.abs().max(b.abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geotiff::GeoTransform;
    use approx::assert_abs_diff_eq;
    use geo::polygon;

    const NODATA: f64 = 65535.0;

    /// 10 x 10 tile of 1-degree pixels with its NW corner at (x, y).
    fn tile(x: f64, y: f64, value: f32, nodata: Option<f64>) -> RasterTile {
        RasterTile::new(
            10,
            10,
            GeoTransform::new(x, y, 1.0, 1.0),
            WGS84,
            vec![value; 100],
            nodata,
        )
        .unwrap()
    }

    fn square(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Boundary {
        Boundary::from_features(vec![MultiPolygon::new(vec![polygon![
            (x: min_x, y: min_y),
            (x: max_x, y: min_y),
            (x: max_x, y: max_y),
            (x: min_x, y: max_y),
        ]])])
    }

    #[test]
    fn test_no_inputs() {
        let paths: Vec<&Path> = Vec::new();
        assert!(matches!(Mosaic::open(&paths), Err(RasterError::NoInputs)));
        assert!(matches!(Mosaic::from_tiles(Vec::new()), Err(RasterError::NoInputs)));
    }

    #[test]
    fn test_clip_single_tile() {
        let mosaic = Mosaic::from_tiles(vec![tile(0.0, 10.0, 7.0, None)]).unwrap();
        let masked = mosaic.clip(&square(2.0, 2.0, 5.0, 6.0), NODATA).unwrap();

        assert_eq!(masked.raster().width(), 3);
        assert_eq!(masked.raster().height(), 4);
        let stats = masked.stats();
        assert_eq!(stats.count, 12);
        assert_abs_diff_eq!(stats.sum, 84.0);
        assert_abs_diff_eq!(stats.mean, 7.0);
    }

    #[test]
    fn test_clip_outside_cutline_is_nodata() {
        let mosaic = Mosaic::from_tiles(vec![tile(0.0, 10.0, 1.0, None)]).unwrap();
        let triangle = Boundary::from_features(vec![MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 0.0, y: 10.0),
        ]])]);
        let masked = mosaic.clip(&triangle, NODATA).unwrap();

        assert_eq!(masked.raster().data().len(), 100);
        assert_eq!(masked.stats().count, 45);
    }

    #[test]
    fn test_clip_across_two_tiles() {
        let mosaic = Mosaic::from_tiles(vec![
            tile(0.0, 10.0, 1.0, None),
            tile(10.0, 10.0, 3.0, None),
        ])
        .unwrap();
        let masked = mosaic.clip(&square(8.0, 0.0, 12.0, 1.0), NODATA).unwrap();

        let stats = masked.stats();
        assert_eq!(stats.count, 4);
        assert_abs_diff_eq!(stats.sum, 8.0);
        assert_abs_diff_eq!(stats.mean, 2.0);
    }

    #[test]
    fn test_later_tiles_paint_over_earlier() {
        let mosaic = Mosaic::from_tiles(vec![
            tile(0.0, 10.0, 1.0, None),
            tile(0.0, 10.0, 5.0, None),
        ])
        .unwrap();
        let stats = mosaic.clip(&square(0.0, 0.0, 2.0, 2.0), NODATA).unwrap().stats();
        assert_eq!(stats.count, 4);
        assert_abs_diff_eq!(stats.mean, 5.0);
    }

    #[test]
    fn test_source_nodata_never_paints() {
        let mosaic = Mosaic::from_tiles(vec![
            tile(0.0, 10.0, 1.0, None),
            tile(0.0, 10.0, -9999.0, Some(-9999.0)),
        ])
        .unwrap();
        let stats = mosaic.clip(&square(0.0, 0.0, 2.0, 2.0), NODATA).unwrap().stats();
        assert_abs_diff_eq!(stats.mean, 1.0);
    }

    #[test]
    fn test_all_nodata_tile_yields_zero_stats() {
        let mosaic = Mosaic::from_tiles(vec![tile(0.0, 10.0, -9999.0, Some(-9999.0))]).unwrap();
        let stats = mosaic.clip(&square(1.0, 1.0, 4.0, 4.0), -9999.0).unwrap().stats();
        assert_eq!(stats, RasterStats::default());
    }

    #[test]
    fn test_no_overlap_is_an_error() {
        let mosaic = Mosaic::from_tiles(vec![tile(0.0, 10.0, 1.0, None)]).unwrap();
        let result = mosaic.clip(&square(50.0, 50.0, 51.0, 51.0), NODATA);
        assert!(matches!(result, Err(RasterError::NoOverlap)));
    }

    #[test]
    fn test_grid_mismatch() {
        let coarse = RasterTile::new(
            5,
            5,
            GeoTransform::new(10.0, 10.0, 2.0, 2.0),
            WGS84,
            vec![0.0; 25],
            None,
        )
        .unwrap();
        let result = Mosaic::from_tiles(vec![tile(0.0, 10.0, 1.0, None), coarse]);
        assert!(matches!(result, Err(RasterError::GridMismatch { .. })));
    }

    #[test]
    fn test_mask_and_calculate_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.tif");
        tile(0.0, 10.0, 4.0, Some(NODATA)).write_geotiff(&path).unwrap();

        let stats = mask_and_calculate(&[&path], &square(0.0, 0.0, 3.0, 3.0), NODATA).unwrap();
        assert_eq!(stats.count, 9);
        assert_abs_diff_eq!(stats.sum, 36.0);
    }

    #[test]
    fn test_histogram_of_clip() {
        let mosaic = Mosaic::from_tiles(vec![tile(0.0, 10.0, 12.0, None)]).unwrap();
        let masked = mosaic.clip(&square(0.0, 0.0, 2.0, 2.0), NODATA).unwrap();
        let hist = masked.histogram(0.0, 50.0, 5);
        assert_eq!(hist.counts, vec![0, 4, 0, 0, 0]);
    }

    #[test]
    fn test_cutline_reprojected_into_utm_raster() {
        // 10 km square of 100 m pixels in UTM 19S around (-69, -2.5)
        let utm = RasterTile::new(
            100,
            100,
            GeoTransform::new(495_000.0, 9_728_000.0, 100.0, 100.0),
            32719,
            vec![1.0; 100 * 100],
            None,
        )
        .unwrap();
        let mosaic = Mosaic::from_tiles(vec![utm]).unwrap();
        assert_eq!(mosaic.epsg(), 32719);

        // About 2.2 x 2.2 km, i.e. ~490 pixels of 1 ha
        let masked = mosaic.clip(&square(-69.01, -2.51, -68.99, -2.49), NODATA).unwrap();
        let stats = masked.stats();
        assert!((440..=530).contains(&stats.count), "count {}", stats.count);
        assert_abs_diff_eq!(stats.mean, 1.0);
        assert_eq!(masked.raster().epsg(), 32719);
        assert!(masked.raster().transform().origin_x > 495_000.0);
    }

    #[test]
    fn test_open_within_reads_only_the_area() {
        let dir = tempfile::tempdir().unwrap();
        let west = dir.path().join("west.tif");
        let east = dir.path().join("east.tif");
        tile(0.0, 10.0, 2.0, Some(NODATA)).write_geotiff(&west).unwrap();
        tile(10.0, 10.0, 6.0, Some(NODATA)).write_geotiff(&east).unwrap();

        let area = Rect::new((2.0, 2.0), (5.0, 6.0));
        let mosaic = Mosaic::open_within(&[&west, &east], &area).unwrap();
        assert_eq!(mosaic.tiles().len(), 1);
        let window = &mosaic.tiles()[0];
        assert!(window.width() < 10 && window.height() < 10);

        let windowed = mosaic.clip(&square(2.0, 2.0, 5.0, 6.0), NODATA).unwrap().stats();
        let full = Mosaic::open(&[&west, &east])
            .unwrap()
            .clip(&square(2.0, 2.0, 5.0, 6.0), NODATA)
            .unwrap()
            .stats();
        assert_eq!(windowed, full);
        assert_eq!(windowed.count, 12);
    }

    #[test]
    fn test_open_within_disjoint_area() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.tif");
        tile(0.0, 10.0, 1.0, None).write_geotiff(&path).unwrap();

        let result = Mosaic::open_within(&[&path], &Rect::new((40.0, 40.0), (41.0, 41.0)));
        assert!(matches!(result, Err(RasterError::NoOverlap)));
        let none: Vec<&Path> = Vec::new();
        assert!(matches!(
            Mosaic::open_within(&none, &Rect::new((0.0, 0.0), (1.0, 1.0))),
            Err(RasterError::NoInputs)
        ));
    }

    #[test]
    fn test_area_in_utm() {
        let area = Rect::new((-69.01, -2.51), (-68.99, -2.49));
        let utm = area_in_crs(&area, 32719).unwrap();
        assert!(utm.min().x > 498_000.0 && utm.max().x < 502_000.0);
        assert!(utm.min().y > 9_720_000.0 && utm.max().y < 9_726_000.0);
        assert_eq!(area_in_crs(&area, WGS84).unwrap(), area);
    }
}
