//! The global 10-degree tile grid.
//!
//! Tiles are named by their north-west corner: a hemisphere letter and a
//! two-digit latitude, then a hemisphere letter and a three-digit longitude.
//! `N10W110` covers 0°N to 10°N and 110°W to 100°W.

use crate::{Result, TileError};
use std::fmt;
use std::str::FromStr;

/// Edge length of a grid cell in degrees.
pub const TILE_SIZE_DEG: i32 = 10;

/// Geographic bounding box in degrees (x = longitude, y = latitude).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// West edge.
    pub min_x: f64,
    /// South edge.
    pub min_y: f64,
    /// East edge.
    pub max_x: f64,
    /// North edge.
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a bounding box from `(min_x, min_y, max_x, max_y)`.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Check if a point is within the box (edges inclusive).
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

/// Identifier of one grid cell, stored as its named corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    /// Latitude of the northern edge (multiple of 10).
    pub lat: i32,
    /// Longitude of the western edge (multiple of 10).
    pub lon: i32,
}

impl TileId {
    /// Create a tile identifier, checking that it lies on the grid.
    pub fn new(lat: i32, lon: i32) -> Result<Self> {
        let on_grid = lat % TILE_SIZE_DEG == 0 && lon % TILE_SIZE_DEG == 0;
        if !on_grid || !(-90..=90).contains(&lat) || !(-180..=180).contains(&lon) {
            return Err(TileError::InvalidCoordinate { lat, lon });
        }
        Ok(Self { lat, lon })
    }

    /// Canonical tile name, e.g. `N10W110`.
    pub fn name(&self) -> String {
        format_tile_name(self.lat, self.lon)
    }

    /// The cell this tile covers.
    ///
    /// The name carries the northern latitude and the western longitude, so
    /// the cell extends one grid step south and one step east.
    pub fn cell(&self) -> BoundingBox {
        BoundingBox {
            min_x: self.lon as f64,
            min_y: (self.lat - TILE_SIZE_DEG) as f64,
            max_x: (self.lon + TILE_SIZE_DEG) as f64,
            max_y: self.lat as f64,
        }
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for TileId {
    type Err = TileError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || TileError::InvalidName(s.to_string());
        if s.len() != 7 || !s.is_ascii() {
            return Err(invalid());
        }

        let lat_sign = match &s[0..1] {
            "N" => 1,
            "S" => -1,
            _ => return Err(invalid()),
        };
        let lon_sign = match &s[3..4] {
            "E" => 1,
            "W" => -1,
            _ => return Err(invalid()),
        };
        let lat: i32 = s[1..3].parse().map_err(|_| invalid())?;
        let lon: i32 = s[4..7].parse().map_err(|_| invalid())?;

        TileId::new(lat_sign * lat, lon_sign * lon)
    }
}

/// Format a corner as a tile name.
///
/// Zero counts as northern/eastern. Magnitudes are zero-padded to two digits
/// for latitude and three for longitude.
pub fn format_tile_name(lat: i32, lon: i32) -> String {
    let lat_prefix = if lat >= 0 { 'N' } else { 'S' };
    let lon_prefix = if lon >= 0 { 'E' } else { 'W' };
    format!(
        "{}{:02}{}{:03}",
        lat_prefix,
        lat.unsigned_abs(),
        lon_prefix,
        lon.unsigned_abs()
    )
}

/// Enumerate the tiles covering a bounding box.
///
/// Longitudes are floored and latitudes ceiled to the grid, matching the
/// north-west corner naming. Output is row-major: latitude ascending in the
/// outer loop, longitude ascending in the inner loop.
///
/// A box that does not fit the geographic grid (for example projected
/// coordinates read as degrees) is rejected before any tile is listed.
pub fn tiles_covering(bounds: &BoundingBox) -> Result<Vec<TileId>> {
    let invalid = || TileError::InvalidBounds {
        min_x: bounds.min_x,
        min_y: bounds.min_y,
        max_x: bounds.max_x,
        max_y: bounds.max_y,
    };
    let step = TILE_SIZE_DEG as f64;
    let grid_line = |value: f64, round: fn(f64) -> f64, limit: f64| {
        let line = round(value / step) * step;
        if line.is_finite() && line.abs() <= limit {
            Ok(line as i32)
        } else {
            Err(invalid())
        }
    };

    let min_tile_x = grid_line(bounds.min_x, f64::floor, 180.0)?;
    let max_tile_x = grid_line(bounds.max_x, f64::floor, 180.0)?;
    let min_tile_y = grid_line(bounds.min_y, f64::ceil, 90.0)?;
    let max_tile_y = grid_line(bounds.max_y, f64::ceil, 90.0)?;
    if min_tile_x > max_tile_x || min_tile_y > max_tile_y {
        return Err(invalid());
    }

    let mut tiles = Vec::new();
    for lat in (min_tile_y..=max_tile_y).step_by(TILE_SIZE_DEG as usize) {
        for lon in (min_tile_x..=max_tile_x).step_by(TILE_SIZE_DEG as usize) {
            tiles.push(TileId::new(lat, lon)?);
        }
    }
    Ok(tiles)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(tiles: &[TileId]) -> Vec<String> {
        tiles.iter().map(TileId::name).collect()
    }

    #[test]
    fn test_format_tile_name() {
        assert_eq!(format_tile_name(10, -110), "N10W110");
        assert_eq!(format_tile_name(-5, 30), "S05E030");
        assert_eq!(format_tile_name(0, 0), "N00E000");
        assert_eq!(format_tile_name(-10, -70), "S10W070");
    }

    #[test]
    fn test_parse_tile_name() {
        let tile: TileId = "N10W110".parse().expect("Should parse name");
        assert_eq!(tile, TileId { lat: 10, lon: -110 });

        let tile: TileId = "S20E030".parse().expect("Should parse name");
        assert_eq!(tile, TileId { lat: -20, lon: 30 });
    }

    #[test]
    fn test_name_bijection_on_grid() {
        for lat in (-90..=90).step_by(10) {
            for lon in (-180..=180).step_by(10) {
                let tile = TileId::new(lat, lon).expect("On-grid tile");
                let parsed: TileId = tile.name().parse().expect("Should parse own name");
                assert_eq!(parsed, tile, "round trip failed for {}", tile);
            }
        }
    }

    #[test]
    fn test_invalid_names() {
        assert!("N10W11".parse::<TileId>().is_err());
        assert!("X10W110".parse::<TileId>().is_err());
        assert!("N10Q110".parse::<TileId>().is_err());
        assert!("N05W110".parse::<TileId>().is_err()); // off grid
        assert!("N95W110".parse::<TileId>().is_err()); // out of range
    }

    #[test]
    fn test_tile_id_rejects_off_grid() {
        assert!(TileId::new(5, 30).is_err());
        assert!(TileId::new(10, 35).is_err());
        assert!(TileId::new(100, 0).is_err());
        assert!(TileId::new(-10, -190).is_err());
    }

    #[test]
    fn test_single_cell_box() {
        let bounds = BoundingBox::new(-69.8, -3.1, -69.2, -2.9);
        assert_eq!(names(&tiles_covering(&bounds).unwrap()), vec!["N00W070"]);
    }

    #[test]
    fn test_box_straddling_meridian_line() {
        // -70.2 floors into the W080 column, -69.8 into W070.
        let bounds = BoundingBox::new(-70.2, -3.1, -69.8, -2.9);
        assert_eq!(names(&tiles_covering(&bounds).unwrap()), vec!["N00W080", "N00W070"]);
    }

    #[test]
    fn test_row_major_order() {
        let bounds = BoundingBox::new(-105.0, 15.0, -95.0, 25.0);
        assert_eq!(
            names(&tiles_covering(&bounds).unwrap()),
            vec!["N20W110", "N20W100", "N30W110", "N30W100"]
        );
    }

    #[test]
    fn test_coverage_property() {
        let boxes = [
            BoundingBox::new(-70.2, -3.1, -69.8, -2.9),
            BoundingBox::new(-118.5, 14.2, -86.7, 32.7),
            BoundingBox::new(-1.0, -1.0, 1.0, 1.0),
            BoundingBox::new(10.0, 20.0, 30.0, 40.0),
            BoundingBox::new(-179.9, -59.9, 179.9, 79.9),
        ];

        for bounds in boxes {
            let tiles = tiles_covering(&bounds).unwrap();
            let steps = 8;
            for i in 0..=steps {
                for j in 0..=steps {
                    let x = bounds.min_x + (bounds.max_x - bounds.min_x) * i as f64 / steps as f64;
                    let y = bounds.min_y + (bounds.max_y - bounds.min_y) * j as f64 / steps as f64;
                    assert!(
                        tiles.iter().any(|t| t.cell().contains(x, y)),
                        "point ({}, {}) not covered for {:?}",
                        x,
                        y,
                        bounds
                    );
                }
            }
        }
    }

    #[test]
    fn test_no_duplicates() {
        let bounds = BoundingBox::new(-118.5, 14.2, -86.7, 32.7);
        let mut tiles = tiles_covering(&bounds).unwrap();
        let total = tiles.len();
        tiles.sort();
        tiles.dedup();
        assert_eq!(tiles.len(), total);
    }

    #[test]
    fn test_projected_box_rejected() {
        // UTM metres read as degrees
        let bounds = BoundingBox::new(500000.0, 2100000.0, 510000.0, 2110000.0);
        assert!(matches!(
            tiles_covering(&bounds),
            Err(TileError::InvalidBounds { .. })
        ));

        let nan = BoundingBox::new(f64::NAN, 0.0, 1.0, 1.0);
        assert!(tiles_covering(&nan).is_err());
        let inverted = BoundingBox::new(30.0, 0.0, 10.0, 1.0);
        assert!(tiles_covering(&inverted).is_err());
    }

    #[test]
    fn test_box_touching_grid_limits() {
        let bounds = BoundingBox::new(170.5, 85.0, 180.0, 90.0);
        assert_eq!(names(&tiles_covering(&bounds).unwrap()), vec!["N90E170", "N90E180"]);
    }

    #[test]
    fn test_cell_bounds() {
        let cell = TileId::new(10, -110).expect("valid").cell();
        assert_eq!(cell, BoundingBox::new(-110.0, 0.0, -100.0, 10.0));
        assert!(cell.contains(-105.0, 5.0));
        assert!(!cell.contains(-105.0, 15.0));
    }
}
