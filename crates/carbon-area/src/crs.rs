//! Coordinate reference system lookups and transforms (pure Rust, proj4rs).

use crate::{AreaError, Result};
use geo::{Coord, MapCoords, MultiPolygon};
use proj4rs::proj::Proj;

/// EPSG code of geographic WGS84.
pub const WGS84: u16 = 4326;

/// PROJ string of geographic WGS84.
pub const WGS84_PROJ: &str = "+proj=longlat +datum=WGS84 +no_defs";

/// Look up the PROJ string for an EPSG code.
pub fn proj_string(epsg: u16) -> Result<&'static str> {
    if epsg == WGS84 {
        return Ok(WGS84_PROJ);
    }
    crs_definitions::from_code(epsg)
        .map(|def| def.proj4)
        .ok_or(AreaError::UnknownCrs(epsg))
}

/// Parse a GeoJSON `crs` name such as `EPSG:32618`,
/// `urn:ogc:def:crs:EPSG::32618` or `urn:ogc:def:crs:OGC:1.3:CRS84`.
pub fn parse_crs_name(name: &str) -> Result<u16> {
    let trimmed = name.trim();
    if trimmed.ends_with("CRS84") {
        return Ok(WGS84);
    }

    if !trimmed.to_ascii_uppercase().contains("EPSG") {
        return Err(AreaError::UnrecognizedCrs(name.to_string()));
    }

    // The code is the last segment; URNs may carry a version in between.
    trimmed
        .rsplit(':')
        .next()
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| AreaError::UnrecognizedCrs(name.to_string()))
}

/// A reusable transform between two coordinate systems.
///
/// Geographic coordinates go in and come out in degrees.
pub struct Transformer {
    source: Proj,
    target: Proj,
    source_geographic: bool,
    target_geographic: bool,
    label: String,
}

impl std::fmt::Debug for Transformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformer").field("label", &self.label).finish()
    }
}

impl Transformer {
    /// Build a transform between two EPSG codes.
    pub fn from_epsg(source: u16, target: u16) -> Result<Self> {
        let mut transformer = Self::from_proj_strings(proj_string(source)?, proj_string(target)?)?;
        transformer.label = format!("EPSG:{} -> EPSG:{}", source, target);
        Ok(transformer)
    }

    /// Build a transform between two PROJ strings.
    pub fn from_proj_strings(source: &str, target: &str) -> Result<Self> {
        let source_proj = Proj::from_proj_string(source)
            .map_err(|e| AreaError::Projection(format!("Invalid source projection {}: {:?}", source, e)))?;
        let target_proj = Proj::from_proj_string(target)
            .map_err(|e| AreaError::Projection(format!("Invalid target projection {}: {:?}", target, e)))?;

        Ok(Self {
            source_geographic: source_proj.is_latlong(),
            target_geographic: target_proj.is_latlong(),
            source: source_proj,
            target: target_proj,
            label: format!("{} -> {}", source, target),
        })
    }

    /// Transform one point.
    pub fn transform_point(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        // proj4rs works in radians for geographic coordinates
        let mut point = if self.source_geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };

        proj4rs::transform::transform(&self.source, &self.target, &mut point)
            .map_err(|e| AreaError::Projection(format!("{} failed at ({}, {}): {:?}", self.label, x, y, e)))?;

        if self.target_geographic {
            Ok((point.0.to_degrees(), point.1.to_degrees()))
        } else {
            Ok((point.0, point.1))
        }
    }

    fn transform_coord(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        let (x, y) = self.transform_point(coord.x, coord.y)?;
        Ok(Coord { x, y })
    }

    /// Transform every vertex of a multipolygon.
    pub fn transform_multi_polygon(&self, geometry: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
        geometry.try_map_coords(|coord| self.transform_coord(coord))
    }
}
