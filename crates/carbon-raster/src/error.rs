//! Error types for the raster crate.

use thiserror::Error;

/// Errors that can occur when reading, masking or reducing rasters.
#[derive(Debug, Error)]
pub enum RasterError {
    /// I/O error reading or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF decoding or encoding error.
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// Invalid GeoTIFF - missing or inconsistent georeferencing.
    #[error("Invalid GeoTIFF {path}: {reason}")]
    InvalidGeoTiff {
        /// File being read.
        path: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Unsupported data layout in the TIFF file.
    #[error("Unsupported TIFF data type: {0}")]
    UnsupportedDataType(String),

    /// Pixel buffer does not match the raster dimensions.
    #[error("Raster data has {actual} pixels, expected {width} x {height}")]
    DimensionMismatch {
        /// Raster width.
        width: u32,
        /// Raster height.
        height: u32,
        /// Length of the supplied buffer.
        actual: usize,
    },

    /// A mosaic was requested from an empty list of tiles.
    #[error("No input rasters to mosaic")]
    NoInputs,

    /// Tiles of one mosaic disagree on CRS or pixel size.
    #[error("Tile {path} does not match the mosaic grid: {reason}")]
    GridMismatch {
        /// Offending tile.
        path: String,
        /// What differs.
        reason: String,
    },

    /// The cutline does not intersect any input raster.
    #[error("Cutline does not overlap the input rasters")]
    NoOverlap,

    /// Cutline could not be loaded or reprojected.
    #[error("Cutline error: {0}")]
    Area(#[from] carbon_area::AreaError),
}
