//! # carbon-runner
//!
//! Above-ground biomass statistics for carbon projects.
//!
//! A project is a directory holding two GeoJSON boundary files: the activity
//! area and the project area. For every configured year the [`Orchestrator`]
//! downloads the ESA CCI biomass tiles covering the project area, clips them
//! to each boundary and records the pixel sum and mean in a
//! [`ResultsTable`]. The table is written once per project as CSV; an
//! existing table is never overwritten. Pre-supplied GEDI and CONAFOR
//! rasters are reduced the same way afterwards.
//!
//! ```no_run
//! use carbon_runner::{Orchestrator, PipelineConfig};
//!
//! let config = PipelineConfig::load("carbon-stats.yaml")?;
//! let report = Orchestrator::new(config)?.run("1234")?;
//! println!("{}", report.table);
//! # Ok::<(), carbon_runner::RunError>(())
//! ```

mod config;
mod error;
mod orchestrator;
mod project;
mod results;

pub use config::{AlternateSource, HistogramConfig, PipelineConfig, SourceId};
pub use error::RunError;
pub use orchestrator::{AlternateStats, BoundaryRole, HistogramRow, Orchestrator, RunReport};
pub use project::ProjectInputs;
pub use results::{ResultsTable, WriteOutcome, YearStats};

/// Result type for pipeline runs.
pub type Result<T> = std::result::Result<T, RunError>;
