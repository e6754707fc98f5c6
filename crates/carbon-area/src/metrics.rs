//! Planar area of a boundary in its local UTM zone.

use crate::crs::{Transformer, WGS84_PROJ};
use crate::{AreaError, Boundary, Result};
use geo::{Area, Rect};

/// Square metres per hectare.
const M2_PER_HECTARE: f64 = 10_000.0;

/// A UTM zone and hemisphere on the WGS84 datum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtmZone {
    /// Zone number, 1 to 60.
    pub zone: u8,
    /// Northern hemisphere when true.
    pub north: bool,
}

/// Zone number for a longitude: `floor((lon + 180) / 6) + 1`, clamped to 1..=60.
pub fn zone_for_longitude(lon: f64) -> u8 {
    let zone = ((lon + 180.0) / 6.0).floor() as i32 + 1;
    zone.clamp(1, 60) as u8
}

impl UtmZone {
    /// Zone containing a longitude, in the given hemisphere.
    pub fn for_longitude(lon: f64, north: bool) -> Self {
        Self {
            zone: zone_for_longitude(lon),
            north,
        }
    }

    /// Zone of the centre of a geographic bounding box.
    ///
    /// The hemisphere follows the sign of the mean latitude (zero is north).
    pub fn for_bounds(bounds: &Rect<f64>) -> Self {
        let central_lon = (bounds.min().x + bounds.max().x) / 2.0;
        let mean_lat = (bounds.min().y + bounds.max().y) / 2.0;
        Self::for_longitude(central_lon, mean_lat >= 0.0)
    }

    /// EPSG code of the WGS84 / UTM projection.
    pub fn epsg(&self) -> u16 {
        let base = if self.north { 32600 } else { 32700 };
        base + self.zone as u16
    }

    /// PROJ string of the projection.
    pub fn proj_string(&self) -> String {
        let south = if self.north { "" } else { " +south" };
        format!("+proj=utm +zone={}{} +datum=WGS84 +units=m +no_defs", self.zone, south)
    }
}

impl std::fmt::Display for UtmZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{} (EPSG:{})", self.zone, if self.north { 'N' } else { 'S' }, self.epsg())
    }
}

/// Area summary for a boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaReport {
    /// Zone used for the planar computation.
    pub zone: UtmZone,
    /// Area of each feature in hectares, rounded to 2 decimals.
    pub feature_hectares: Vec<f64>,
    /// Sum of the rounded feature areas.
    pub total_hectares: f64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Project every feature to its UTM zone and measure it.
pub fn area_report(boundary: &Boundary) -> Result<AreaReport> {
    let bounds = boundary
        .bounds()
        .ok_or_else(|| AreaError::EmptyBoundary(describe(boundary)))?;
    let zone = UtmZone::for_bounds(&bounds);
    let transformer = Transformer::from_proj_strings(WGS84_PROJ, &zone.proj_string())?;

    let feature_hectares = boundary
        .features()
        .iter()
        .map(|feature| {
            let projected = transformer.transform_multi_polygon(feature)?;
            Ok(round2(projected.unsigned_area() / M2_PER_HECTARE))
        })
        .collect::<Result<Vec<_>>>()?;
    let total_hectares = feature_hectares.iter().sum();

    Ok(AreaReport {
        zone,
        feature_hectares,
        total_hectares,
    })
}

/// Total area of a boundary in hectares.
pub fn area_hectares(boundary: &Boundary) -> Result<f64> {
    Ok(area_report(boundary)?.total_hectares)
}

fn describe(boundary: &Boundary) -> String {
    boundary
        .path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<in-memory>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use geo::{polygon, MultiPolygon};

    #[test]
    fn test_zone_for_longitude() {
        assert_eq!(zone_for_longitude(-75.0), 18);
        assert_eq!(zone_for_longitude(-180.0), 1);
        assert_eq!(zone_for_longitude(0.0), 31);
        assert_eq!(zone_for_longitude(-0.1), 30);
        assert_eq!(zone_for_longitude(13.4), 33);
        assert_eq!(zone_for_longitude(151.2), 56);
        assert_eq!(zone_for_longitude(-122.3), 10);
        assert_eq!(zone_for_longitude(179.9), 60);
        assert_eq!(zone_for_longitude(180.0), 60);
    }

    #[test]
    fn test_epsg_codes() {
        assert_eq!(UtmZone::for_longitude(-75.0, true).epsg(), 32618);
        assert_eq!(UtmZone::for_longitude(-75.0, false).epsg(), 32718);
        assert_eq!(UtmZone::for_longitude(151.2, false).epsg(), 32756);
    }

    #[test]
    fn test_zone_for_bounds_hemisphere() {
        let south = Rect::new((-70.2, -3.1), (-69.8, -2.9));
        assert_eq!(UtmZone::for_bounds(&south), UtmZone { zone: 19, north: false });

        let north = Rect::new((-99.5, 19.0), (-99.0, 19.5));
        assert_eq!(UtmZone::for_bounds(&north), UtmZone { zone: 14, north: true });
    }

    #[test]
    fn test_proj_string() {
        let zone = UtmZone { zone: 19, north: false };
        assert_eq!(
            zone.proj_string(),
            "+proj=utm +zone=19 +south +datum=WGS84 +units=m +no_defs"
        );
    }

    #[test]
    fn test_area_of_small_equatorial_square() {
        // 0.01 x 0.01 degrees centred on the zone 31 meridian.
        let square = polygon![
            (x: 2.995, y: 0.0),
            (x: 3.005, y: 0.0),
            (x: 3.005, y: 0.01),
            (x: 2.995, y: 0.01),
            (x: 2.995, y: 0.0),
        ];
        let boundary = Boundary::from_features(vec![MultiPolygon::new(vec![square])]);

        let report = area_report(&boundary).unwrap();
        assert_eq!(report.zone, UtmZone { zone: 31, north: true });
        assert_eq!(report.feature_hectares.len(), 1);
        // 1113.2 m x 1105.7 m, shrunk by the 0.9996 scale factor
        assert_abs_diff_eq!(report.total_hectares, 123.0, epsilon = 0.5);
    }

    #[test]
    fn test_area_is_sum_of_rounded_features() {
        let a = polygon![(x: 3.0, y: 0.0), (x: 3.001, y: 0.0), (x: 3.001, y: 0.001), (x: 3.0, y: 0.0)];
        let b = polygon![(x: 3.01, y: 0.0), (x: 3.012, y: 0.0), (x: 3.012, y: 0.002), (x: 3.01, y: 0.0)];
        let boundary = Boundary::from_features(vec![
            MultiPolygon::new(vec![a]),
            MultiPolygon::new(vec![b]),
        ]);

        let report = area_report(&boundary).unwrap();
        let expected: f64 = report.feature_hectares.iter().sum();
        assert_eq!(report.total_hectares, expected);
        for ha in &report.feature_hectares {
            assert_eq!(*ha, round2(*ha));
        }
        assert_abs_diff_eq!(area_hectares(&boundary).unwrap(), expected);
    }

    #[test]
    fn test_empty_boundary_has_no_area() {
        let boundary = Boundary::from_features(Vec::new());
        assert!(matches!(area_report(&boundary), Err(AreaError::EmptyBoundary(_))));
    }
}
