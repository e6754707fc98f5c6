//! Project boundaries loaded from GeoJSON.

use crate::crs::{parse_crs_name, Transformer, WGS84};
use crate::{AreaError, Result};
use geo::{BoundingRect, Geometry, MultiPolygon, Polygon, Rect};
use geojson::{GeoJson, JsonObject};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A set of polygon features in geographic WGS84.
///
/// Boundaries are read-only after loading. Each feature keeps its own
/// multipolygon so that per-feature areas can be reported.
#[derive(Debug, Clone)]
pub struct Boundary {
    /// File the boundary was read from, if any.
    path: Option<PathBuf>,
    /// One multipolygon per input feature, in EPSG:4326.
    features: Vec<MultiPolygon<f64>>,
    /// CRS declared by the source file.
    source_epsg: u16,
}

impl Boundary {
    /// Load a boundary file, reprojecting it to WGS84 if needed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut boundary = Self::from_geojson_str(&text)
            .map_err(|e| match e {
                AreaError::EmptyBoundary(_) => AreaError::EmptyBoundary(path.display().to_string()),
                other => other,
            })?;
        boundary.path = Some(path.to_path_buf());
        debug!(path = %path.display(), features = boundary.features.len(), "Loaded boundary");
        Ok(boundary)
    }

    /// Parse a boundary from GeoJSON text.
    ///
    /// Accepts a FeatureCollection, a Feature or a bare Geometry. Features
    /// without geometry are skipped. Coordinates beyond x/y are dropped.
    pub fn from_geojson_str(text: &str) -> Result<Self> {
        let geojson: GeoJson = text.parse()?;

        let (geometries, foreign_members) = match geojson {
            GeoJson::FeatureCollection(collection) => (
                collection
                    .features
                    .into_iter()
                    .filter_map(|feature| feature.geometry)
                    .collect::<Vec<_>>(),
                collection.foreign_members,
            ),
            GeoJson::Feature(feature) => {
                (feature.geometry.into_iter().collect(), feature.foreign_members)
            }
            GeoJson::Geometry(geometry) => {
                let foreign_members = geometry.foreign_members.clone();
                (vec![geometry], foreign_members)
            }
        };

        let source_epsg = match declared_crs(foreign_members.as_ref()) {
            Some(name) => parse_crs_name(&name)?,
            None => WGS84,
        };

        let mut features = Vec::with_capacity(geometries.len());
        for geometry in geometries {
            let geometry = Geometry::<f64>::try_from(geometry)?;
            let polygons = collect_polygons(geometry)?;
            if !polygons.is_empty() {
                features.push(MultiPolygon::new(polygons));
            }
        }

        if features.is_empty() {
            return Err(AreaError::EmptyBoundary("<geojson>".to_string()));
        }

        if source_epsg != WGS84 {
            info!("Reprojecting boundary from EPSG:{} to WGS 84", source_epsg);
            let transformer = Transformer::from_epsg(source_epsg, WGS84)?;
            features = features
                .iter()
                .map(|feature| transformer.transform_multi_polygon(feature))
                .collect::<Result<_>>()?;
        }

        let boundary = Self {
            path: None,
            features,
            source_epsg,
        };
        boundary.check_geographic_range()?;
        Ok(boundary)
    }

    /// Reject boundaries whose extent cannot be longitude/latitude.
    fn check_geographic_range(&self) -> Result<()> {
        let Some(bounds) = self.bounds() else {
            return Ok(());
        };
        for (x, y) in [(bounds.min().x, bounds.min().y), (bounds.max().x, bounds.max().y)] {
            if !(-180.0..=180.0).contains(&x) || !(-90.0..=90.0).contains(&y) {
                return Err(AreaError::OutOfRange { x, y });
            }
        }
        Ok(())
    }

    /// Build a boundary from WGS84 multipolygons.
    pub fn from_features(features: Vec<MultiPolygon<f64>>) -> Self {
        Self {
            path: None,
            features,
            source_epsg: WGS84,
        }
    }

    /// File the boundary was read from.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Per-feature geometries in WGS84.
    pub fn features(&self) -> &[MultiPolygon<f64>] {
        &self.features
    }

    /// CRS declared by the source file.
    pub fn source_epsg(&self) -> u16 {
        self.source_epsg
    }

    /// All polygons of all features as a single multipolygon.
    pub fn geometry(&self) -> MultiPolygon<f64> {
        MultiPolygon::new(
            self.features
                .iter()
                .flat_map(|feature| feature.0.iter().cloned())
                .collect(),
        )
    }

    /// Total bounds of all features, `None` when the boundary is empty.
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.features
            .iter()
            .filter_map(|feature| feature.bounding_rect())
            .reduce(|a, b| {
                Rect::new(
                    (a.min().x.min(b.min().x), a.min().y.min(b.min().y)),
                    (a.max().x.max(b.max().x), a.max().y.max(b.max().y)),
                )
            })
    }
}

/// Read the legacy `crs` member: `{"type": "name", "properties": {"name": ...}}`.
fn declared_crs(foreign_members: Option<&JsonObject>) -> Option<String> {
    foreign_members?
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()
        .map(str::to_string)
}

fn collect_polygons(geometry: Geometry<f64>) -> Result<Vec<Polygon<f64>>> {
    match geometry {
        Geometry::Polygon(polygon) => Ok(vec![polygon]),
        Geometry::MultiPolygon(multi) => Ok(multi.0),
        Geometry::Rect(rect) => Ok(vec![rect.to_polygon()]),
        Geometry::GeometryCollection(collection) => {
            let mut polygons = Vec::new();
            for inner in collection.0 {
                polygons.extend(collect_polygons(inner)?);
            }
            Ok(polygons)
        }
        other => Err(AreaError::UnsupportedGeometry(geometry_kind(&other).to_string())),
    }
}

fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const SQUARE_3D: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"name": "block A"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-69.5, -2.5, 12.0], [-69.4, -2.5, 12.0], [-69.4, -2.4, 12.0], [-69.5, -2.4, 12.0], [-69.5, -2.5, 12.0]]]
                }
            },
            {
                "type": "Feature",
                "properties": {"name": "no geometry"},
                "geometry": null
            }
        ]
    }"#;

    #[test]
    fn test_feature_collection_drops_z() {
        let boundary = Boundary::from_geojson_str(SQUARE_3D).expect("Should parse");
        assert_eq!(boundary.features().len(), 1);
        assert_eq!(boundary.source_epsg(), WGS84);

        let bounds = boundary.bounds().unwrap();
        assert_abs_diff_eq!(bounds.min().x, -69.5);
        assert_abs_diff_eq!(bounds.max().y, -2.4);
    }

    #[test]
    fn test_bare_multipolygon() {
        let text = r#"{
            "type": "MultiPolygon",
            "coordinates": [
                [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]],
                [[[5.0, 5.0], [6.0, 5.0], [6.0, 6.0], [5.0, 5.0]]]
            ]
        }"#;
        let boundary = Boundary::from_geojson_str(text).expect("Should parse");
        assert_eq!(boundary.features().len(), 1);
        assert_eq!(boundary.geometry().0.len(), 2);

        let bounds = boundary.bounds().unwrap();
        assert_abs_diff_eq!(bounds.min().x, 0.0);
        assert_abs_diff_eq!(bounds.max().x, 6.0);
        assert_abs_diff_eq!(bounds.max().y, 6.0);
    }

    #[test]
    fn test_rejects_line_boundary() {
        let text = r#"{"type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]]}"#;
        let err = Boundary::from_geojson_str(text).unwrap_err();
        assert!(matches!(err, AreaError::UnsupportedGeometry(kind) if kind == "LineString"));
    }

    #[test]
    fn test_empty_collection() {
        let text = r#"{"type": "FeatureCollection", "features": []}"#;
        assert!(matches!(
            Boundary::from_geojson_str(text),
            Err(AreaError::EmptyBoundary(_))
        ));
    }

    #[test]
    fn test_reprojects_declared_utm() {
        // 1 km square just east of the zone 18 central meridian, on the equator.
        let text = r#"{
            "type": "FeatureCollection",
            "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::32618"}},
            "features": [{
                "type": "Feature",
                "properties": {},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[500000.0, 0.0], [501000.0, 0.0], [501000.0, 1000.0], [500000.0, 1000.0], [500000.0, 0.0]]]
                }
            }]
        }"#;
        let boundary = Boundary::from_geojson_str(text).expect("Should parse");
        assert_eq!(boundary.source_epsg(), 32618);

        let bounds = boundary.bounds().unwrap();
        assert_abs_diff_eq!(bounds.min().x, -75.0, epsilon = 1e-6);
        assert_abs_diff_eq!(bounds.min().y, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(bounds.max().x, -74.991, epsilon = 1e-3);
        assert_abs_diff_eq!(bounds.max().y, 0.00904, epsilon = 1e-4);
    }

    #[test]
    fn test_undeclared_projected_coordinates_rejected() {
        // UTM metres with no `crs` member would otherwise read as degrees
        let text = r#"{
            "type": "Polygon",
            "coordinates": [[[500000.0, 2100000.0], [510000.0, 2100000.0], [510000.0, 2110000.0], [500000.0, 2100000.0]]]
        }"#;
        let err = Boundary::from_geojson_str(text).unwrap_err();
        assert!(matches!(err, AreaError::OutOfRange { x, .. } if x == 500000.0));
    }

    #[test]
    fn test_from_file_missing() {
        let err = Boundary::from_file("does/not/exist.geojson").unwrap_err();
        assert!(matches!(err, AreaError::Io(_)));
    }

    #[test]
    fn test_from_file_records_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aa.geojson");
        std::fs::write(&path, SQUARE_3D).unwrap();

        let boundary = Boundary::from_file(&path).expect("Should load");
        assert_eq!(boundary.path(), Some(path.as_path()));
    }
}
