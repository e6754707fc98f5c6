//! Error types for the tile crate.

use thiserror::Error;

/// Errors that can occur when locating or fetching tiles.
#[derive(Debug, Error)]
pub enum TileError {
    /// I/O error writing a tile to the cache directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client or transfer error.
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// Tile corner is not on the 10-degree grid or is out of range.
    #[error("Invalid tile coordinate ({lat}, {lon})")]
    InvalidCoordinate {
        /// Requested latitude in degrees.
        lat: i32,
        /// Requested longitude in degrees.
        lon: i32,
    },

    /// Bounding box that is not in geographic degrees.
    #[error("Bounding box ({min_x}, {min_y}, {max_x}, {max_y}) is outside the geographic grid")]
    InvalidBounds {
        /// West edge.
        min_x: f64,
        /// South edge.
        min_y: f64,
        /// East edge.
        max_x: f64,
        /// North edge.
        max_y: f64,
    },

    /// Tile name does not follow the `N10W110` convention.
    #[error("Invalid tile name: {0}")]
    InvalidName(String),

    /// Server answered with a non-success status.
    #[error("Failed to download tile {tile} for {year}: {reason}")]
    DownloadFailed {
        /// Canonical tile name.
        tile: String,
        /// Product year.
        year: u16,
        /// Reason for failure.
        reason: String,
    },
}
