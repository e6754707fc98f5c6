//! Error types for the pipeline runner.

use crate::config::SourceId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Tile error: {0}")]
    Tiles(#[from] carbon_tiles::TileError),

    #[error("Boundary error: {0}")]
    Area(#[from] carbon_area::AreaError),

    #[error("Expected an activity area and a project area as GeoJSON (.geojson or .json) in {dir}, found {found} boundary file(s)")]
    MissingBoundaries { dir: PathBuf, found: usize },

    /// A configured single raster does not exist.
    #[error("Raster '{label}' not found at {path}")]
    MissingRaster { label: String, path: PathBuf },

    #[error("No no-data value configured for source {0}")]
    MissingNoData(SourceId),

    #[error("Failed to export {path}: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: carbon_raster::RasterError,
    },

    /// Opening, clipping or reducing a raster failed. Fatal for the whole run.
    #[error("Masking {source_id} rasters{} failed while {stage}: {source}", .year.map(|y| format!(" ({})", y)).unwrap_or_default())]
    Masking {
        source_id: SourceId,
        stage: &'static str,
        year: Option<u16>,
        #[source]
        source: carbon_raster::RasterError,
    },
}
