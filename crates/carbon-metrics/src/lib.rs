//! Metric declarations for the carbon statistics pipeline.
//!
//! Every metric the pipeline records is declared once here as a [`Metric`]
//! constant so that call sites never spell a metric name by hand. The crate
//! re-exports `metrics`; when no recorder is installed all recording calls are
//! no-ops.
//!
//! # Example
//!
//! ```rust
//! use carbon_metrics::{metric_defs, StatsLabels};
//!
//! let labels = StatsLabels::new("esa_cci", "project_area").with_year(2020);
//! carbon_metrics::metrics::counter!(metric_defs::STATS_CALLS.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

impl MetricKind {
    /// Returns the kind as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
///
/// ```rust
/// use carbon_metrics::{Metric, MetricKind};
/// use carbon_metrics::metrics::Unit;
///
/// const TILES: Metric = Metric::counter("carbon.tiles.example")
///     .with_description("Example counter")
///     .with_unit(Unit::Count)
///     .with_labels(&["year"]);
///
/// assert_eq!(TILES.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "carbon.tiles.downloaded").
    pub name: &'static str,
    /// The kind of metric.
    pub kind: MetricKind,
    /// Human-readable description.
    pub description: &'static str,
    /// The unit of measurement, if any.
    pub unit: Option<Unit>,
    /// Expected label keys.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn with_kind(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new counter metric with the given name.
    pub const fn counter(name: &'static str) -> Self {
        Self::with_kind(name, MetricKind::Counter)
    }

    /// Creates a new gauge metric with the given name.
    pub const fn gauge(name: &'static str) -> Self {
        Self::with_kind(name, MetricKind::Gauge)
    }

    /// Creates a new histogram metric with the given name.
    pub const fn histogram(name: &'static str) -> Self {
        Self::with_kind(name, MetricKind::Histogram)
    }

    /// Sets the description for the metric.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit for the metric.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets the expected label keys for the metric.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// All metric definitions for the pipeline.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Labels attached to raster statistics metrics.
    pub const STATS_LABELS: &[&str] = &["source", "boundary", "year"];

    // ========================================================================
    // Tile acquisition
    // ========================================================================

    /// Tiles downloaded from the remote archive.
    pub const TILES_DOWNLOADED: Metric = Metric::counter("carbon.tiles.downloaded")
        .with_description("Tiles downloaded from the remote archive")
        .with_unit(Unit::Count)
        .with_labels(&["year"]);

    /// Tiles served from the local cache directory.
    pub const TILE_CACHE_HITS: Metric = Metric::counter("carbon.tiles.cache_hits")
        .with_description("Tiles already present in the local cache")
        .with_unit(Unit::Count)
        .with_labels(&["year"]);

    /// Tiles whose download failed and were left out of the working set.
    pub const TILE_DOWNLOAD_FAILURES: Metric = Metric::counter("carbon.tiles.download_failures")
        .with_description("Tile downloads that failed or timed out")
        .with_unit(Unit::Count)
        .with_labels(&["year"]);

    /// Bytes written to the tile cache.
    pub const BYTES_DOWNLOADED: Metric = Metric::counter("carbon.tiles.bytes_downloaded")
        .with_description("Bytes downloaded into the tile cache")
        .with_unit(Unit::Bytes);

    // ========================================================================
    // Boundaries
    // ========================================================================

    /// Planar area of the last boundary read, per role.
    pub const AREA_HECTARES: Metric = Metric::gauge("carbon.area.hectares")
        .with_description("Area of a project boundary in its UTM zone")
        .with_labels(&["boundary"]);

    // ========================================================================
    // Raster statistics
    // ========================================================================

    /// Statistics computations performed.
    pub const STATS_CALLS: Metric = Metric::counter("carbon.stats.calls")
        .with_description("Masked raster statistics computed")
        .with_unit(Unit::Count)
        .with_labels(STATS_LABELS);

    /// Valid (non-sentinel) pixels reduced.
    pub const VALID_PIXELS: Metric = Metric::counter("carbon.stats.valid_pixels")
        .with_description("Pixels remaining after no-data exclusion")
        .with_unit(Unit::Count)
        .with_labels(STATS_LABELS);

    /// Time spent clipping a mosaic to a cutline.
    pub const MASK_DURATION: Metric = Metric::histogram("carbon.stats.mask_duration_ms")
        .with_description("Time spent clipping rasters to a cutline")
        .with_unit(Unit::Milliseconds)
        .with_labels(STATS_LABELS);

    /// Every metric above, for bulk registration.
    pub const ALL: &[Metric] = &[
        TILES_DOWNLOADED,
        TILE_CACHE_HITS,
        TILE_DOWNLOAD_FAILURES,
        BYTES_DOWNLOADED,
        AREA_HECTARES,
        STATS_CALLS,
        VALID_PIXELS,
        MASK_DURATION,
    ];
}

/// Label set for one statistics computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsLabels {
    /// Raster source identifier (e.g. "esa_cci").
    pub source: String,
    /// Boundary role (e.g. "activity_area").
    pub boundary: String,
    /// Product year, when the source is yearly.
    pub year: Option<u16>,
}

impl StatsLabels {
    /// Creates labels for a source and boundary.
    pub fn new(source: impl Into<String>, boundary: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            boundary: boundary.into(),
            year: None,
        }
    }

    /// Attaches a product year.
    pub fn with_year(mut self, year: u16) -> Self {
        self.year = Some(year);
        self
    }

    /// Converts to the `(key, value)` form taken by the `metrics` macros.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        let mut labels = vec![
            ("source", self.source.clone()),
            ("boundary", self.boundary.clone()),
        ];
        if let Some(year) = self.year {
            labels.push(("year", year.to_string()));
        }
        labels
    }
}

/// Describes all metrics used by the pipeline.
///
/// Call once at startup, after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_labels_without_year() {
        let labels = StatsLabels::new("gedi", "activity_area").to_labels();
        assert_eq!(labels.len(), 2);
        assert!(labels.contains(&("source", "gedi".to_string())));
        assert!(labels.contains(&("boundary", "activity_area".to_string())));
    }

    #[test]
    fn test_stats_labels_with_year() {
        let labels = StatsLabels::new("esa_cci", "project_area")
            .with_year(2018)
            .to_labels();
        assert_eq!(labels.len(), 3);
        assert!(labels.contains(&("year", "2018".to_string())));
    }

    #[test]
    fn test_metric_definitions() {
        assert_eq!(metric_defs::TILES_DOWNLOADED.name, "carbon.tiles.downloaded");
        assert_eq!(metric_defs::TILES_DOWNLOADED.kind, MetricKind::Counter);
        assert_eq!(metric_defs::BYTES_DOWNLOADED.unit, Some(Unit::Bytes));
        assert_eq!(metric_defs::MASK_DURATION.kind, MetricKind::Histogram);
        assert_eq!(metric_defs::AREA_HECTARES.kind, MetricKind::Gauge);
        assert_eq!(metric_defs::VALID_PIXELS.labels, metric_defs::STATS_LABELS);
    }

    #[test]
    fn test_all_metrics_unique() {
        let mut names: Vec<_> = metric_defs::ALL.iter().map(|m| m.name).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
        assert_eq!(total, 8);
    }

    #[test]
    fn test_metric_minimal() {
        const MINIMAL: Metric = Metric::gauge("minimal");

        assert_eq!(MINIMAL.name, "minimal");
        assert_eq!(MINIMAL.kind, MetricKind::Gauge);
        assert_eq!(MINIMAL.description, "");
        assert_eq!(MINIMAL.unit, None);
        assert_eq!(MINIMAL.labels, &[] as &[&str]);
    }

    #[test]
    fn test_describe_without_recorder() {
        describe_metrics();
    }
}
