//! # carbon-tiles
//!
//! Lookup and acquisition of tiles from a global 10-degree raster grid, such
//! as the ESA CCI above-ground biomass product.
//!
//! ## Overview
//!
//! Tiles are named by their north-west corner: `N10W110` covers 0°N to 10°N
//! and 110°W to 100°W. [`tiles_covering`] turns a bounding box into the list of
//! tiles that covers it, and [`TileFetcher`] downloads each tile for a given
//! product year into a local cache directory, skipping files that are
//! already present.
//!
//! ## Example
//!
//! ```no_run
//! use carbon_tiles::{tiles_covering, BoundingBox, TileFetcher, TileSource};
//!
//! let bounds = BoundingBox::new(-70.2, -3.1, -69.8, -2.9);
//! let tiles = tiles_covering(&bounds)?;
//!
//! let fetcher = TileFetcher::new("Projects/ESA", TileSource::default())?;
//! let paths = fetcher.fetch_year(&tiles, 2020);
//! println!("{} of {} tiles available", paths.len(), tiles.len());
//! # Ok::<(), carbon_tiles::TileError>(())
//! ```

mod error;
mod fetcher;
mod grid;

pub use error::TileError;
pub use fetcher::{
    DownloadStats, TileFetcher, TileFile, TileSource,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_FILENAME_TEMPLATE, DEFAULT_TIMEOUT, DEFAULT_URL_TEMPLATE,
};
pub use grid::{format_tile_name, tiles_covering, BoundingBox, TileId, TILE_SIZE_DEG};

/// Result type for tile operations.
pub type Result<T> = std::result::Result<T, TileError>;
