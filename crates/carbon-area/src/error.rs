//! Error types for the area crate.

use thiserror::Error;

/// Errors that can occur when loading or measuring boundaries.
#[derive(Debug, Error)]
pub enum AreaError {
    /// I/O error reading a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid GeoJSON.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// Geometry type that cannot act as an area boundary.
    #[error("Unsupported boundary geometry: {0}")]
    UnsupportedGeometry(String),

    /// EPSG code missing from the CRS database.
    #[error("Unknown CRS EPSG:{0}")]
    UnknownCrs(u16),

    /// A `crs` member that does not name an EPSG code.
    #[error("Unrecognized CRS name: {0}")]
    UnrecognizedCrs(String),

    /// Coordinate transformation failed.
    #[error("Projection error: {0}")]
    Projection(String),

    /// Coordinates that cannot be longitude/latitude, typically a projected
    /// file without a `crs` member.
    #[error("Coordinates ({x}, {y}) are outside longitude [-180, 180] / latitude [-90, 90]")]
    OutOfRange { x: f64, y: f64 },

    /// The file holds no polygons.
    #[error("Boundary has no polygon features: {0}")]
    EmptyBoundary(String),
}
