//! # carbon-raster
//!
//! Masked statistics over biomass rasters.
//!
//! ## Overview
//!
//! A [`Mosaic`] holds one or more single-band GeoTIFF tiles on a common grid.
//! [`Mosaic::clip`] warps them into one in-memory raster cropped to a cutline
//! [`Boundary`](carbon_area::Boundary), with every pixel outside the cutline
//! set to a no-data sentinel. [`MaskedRaster::stats`] then reduces the
//! remaining pixels to a [`RasterStats`] (count, sum, mean).
//!
//! Sentinels differ between products (65535 for ESA CCI biomass, -9999 for
//! GEDI and CONAFOR rasters), so the sentinel is always passed in by the
//! caller. A clip in which every pixel is excluded reduces to `(0, 0, 0)`.
//!
//! [`Mosaic::open_within`] reads only the part of each tile around an area of
//! interest, which keeps memory bounded when a small project sits on a
//! 10-degree tile.
//!
//! ## Example
//!
//! ```no_run
//! use carbon_area::Boundary;
//! use carbon_raster::Mosaic;
//!
//! let cutline = Boundary::from_file("Projects/CAR-Mexico/1234/activity_area.geojson")?;
//! let mosaic = Mosaic::open(&["Projects/ESA/N20W100_ESACCI-BIOMASS-L4-AGB-MERGED-100m-2020-fv5.0.tif"])?;
//! let stats = mosaic.clip(&cutline, 65535.0)?.stats();
//! println!("{} pixels, sum {}, mean {}", stats.count, stats.sum, stats.mean);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod geotiff;
mod mosaic;
mod rasterize;
mod stats;

pub use error::RasterError;
pub use geotiff::{GeoTiffReader, GeoTransform, PixelWindow, RasterTile, DEFAULT_EPSG};
pub use mosaic::{mask_and_calculate, MaskedRaster, Mosaic};
pub use rasterize::CutlineMask;
pub use stats::{is_valid, Histogram, RasterStats};

/// Result type for raster operations.
pub type Result<T> = std::result::Result<T, RasterError>;
