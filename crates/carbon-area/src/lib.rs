//! # carbon-area
//!
//! Loading of project boundaries and measurement of their area.
//!
//! - [`Boundary::from_file`] reads a GeoJSON boundary and reprojects it to
//!   geographic WGS84 when the file declares another CRS.
//! - [`area_report`] projects the boundary into the UTM zone of its centre and
//!   reports the planar area of each feature in hectares.
//! - [`Transformer`] is the shared proj4rs-backed coordinate transform, also
//!   used to bring cutlines into a raster's CRS.
//!
//! ```no_run
//! use carbon_area::{area_hectares, Boundary};
//!
//! let boundary = Boundary::from_file("Projects/CAR-Mexico/1234/project_area.geojson")?;
//! println!("Project area size: {} ha", area_hectares(&boundary)?);
//! # Ok::<(), carbon_area::AreaError>(())
//! ```

mod boundary;
pub mod crs;
mod error;
mod metrics;

pub use boundary::Boundary;
pub use crs::{Transformer, WGS84};
pub use error::AreaError;
pub use metrics::{area_hectares, area_report, zone_for_longitude, AreaReport, UtmZone};

/// Result type for area operations.
pub type Result<T> = std::result::Result<T, AreaError>;
