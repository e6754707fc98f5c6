//! Pipeline configuration.
//!
//! Every field has a default matching the Mexico CAR project layout, so an
//! empty YAML document (or no file at all) gives a working configuration.
//!
//! ```yaml
//! years: [2018, 2019, 2020]
//! project_root: Projects/CAR-Mexico
//! no_data_by_source:
//!   esa_cci: 65535
//!   gedi: -9999
//! alternate_sources: []
//! histogram: { min: 0, max: 450, bins: 45 }
//! ```
//!
//! Boundary files are GeoJSON (`.geojson` or `.json`); shapefiles must be
//! converted first, e.g. with `ogr2ogr -f GeoJSON`.

use crate::{Result, RunError};
use carbon_tiles::{TileSource, DEFAULT_FILENAME_TEMPLATE, DEFAULT_URL_TEMPLATE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A raster product with its own no-data convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    /// ESA CCI above-ground biomass tiles.
    EsaCci,
    /// GEDI L4B gridded biomass.
    Gedi,
    /// CONAFOR national biomass map.
    Conafor,
}

impl SourceId {
    /// Configuration key of the source.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SourceId::EsaCci => "esa_cci",
            SourceId::Gedi => "gedi",
            SourceId::Conafor => "conafor",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single pre-supplied raster reduced over both boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlternateSource {
    /// Name used in logs and reports (e.g. "GEDI mean AGBD").
    pub label: String,
    /// Product, selecting the no-data value.
    pub source: SourceId,
    /// Raster file.
    pub path: PathBuf,
}

impl AlternateSource {
    fn new(label: &str, source: SourceId, path: PathBuf) -> Self {
        Self {
            label: label.to_string(),
            source,
            path,
        }
    }
}

/// Fixed-width histogram of each clip's valid pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistogramConfig {
    /// Lower edge of the first bin.
    pub min: f64,
    /// Upper edge of the last bin.
    pub max: f64,
    /// Number of bins.
    pub bins: usize,
}

impl Default for HistogramConfig {
    /// Biomass range used for additionality plots, in Mg/ha.
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 450.0,
            bins: 45,
        }
    }
}

/// Configuration of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Product years to process, in order.
    pub years: Vec<u16>,
    /// No-data sentinel per raster product.
    pub no_data_by_source: BTreeMap<SourceId, f64>,
    /// Tile URL template (`{tile}`, `{year}`, `{filename}`).
    pub tile_url_template: String,
    /// Tile file-name template (`{tile}`, `{year}`).
    pub tile_filename_template: String,
    /// Directory tiles are downloaded into.
    pub tile_cache_dir: PathBuf,
    /// Directory holding one sub-directory of GeoJSON boundary files per project.
    pub project_root: PathBuf,
    /// Output table path template (`{root}`, `{pid}`).
    pub output_path: String,
    /// Connect timeout for tile downloads, in seconds.
    pub connect_timeout_secs: u64,
    /// Whole-transfer timeout for tile downloads, in seconds.
    pub download_timeout_secs: u64,
    /// Single-raster lookups run after the yearly table.
    pub alternate_sources: Vec<AlternateSource>,
    /// When set, every clipped raster is also written here as a GeoTIFF.
    pub export_dir: Option<PathBuf>,
    /// When set, every clip is also binned into a histogram.
    pub histogram: Option<HistogramConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let cache = PathBuf::from("Projects/ESA");
        let alternate_sources = vec![
            AlternateSource::new(
                "GEDI mean AGBD",
                SourceId::Gedi,
                cache.join("GEDI04_B_MW019MW223_02_002_02_R01000M_MU.tif"),
            ),
            AlternateSource::new(
                "GEDI SE",
                SourceId::Gedi,
                cache.join("GEDI04_B_MW019MW223_02_002_02_R01000M_SE.tif"),
            ),
            AlternateSource::new("CONAFOR AGBD", SourceId::Conafor, cache.join("CONAFOR.tif")),
        ];

        Self {
            years: vec![2010, 2015, 2016, 2017, 2018, 2019, 2020, 2021],
            no_data_by_source: BTreeMap::from([
                (SourceId::EsaCci, 65535.0),
                (SourceId::Gedi, -9999.0),
                (SourceId::Conafor, -9999.0),
            ]),
            tile_url_template: DEFAULT_URL_TEMPLATE.to_string(),
            tile_filename_template: DEFAULT_FILENAME_TEMPLATE.to_string(),
            tile_cache_dir: cache,
            project_root: PathBuf::from("Projects/CAR-Mexico"),
            output_path: "{root}/{pid}_out.csv".to_string(),
            connect_timeout_secs: 10,
            download_timeout_secs: 300,
            alternate_sources,
            export_dir: None,
            histogram: None,
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Parse a configuration from YAML text. Missing fields take defaults.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// No-data sentinel of a source.
    pub fn nodata(&self, source: SourceId) -> Result<f64> {
        self.no_data_by_source
            .get(&source)
            .copied()
            .ok_or(RunError::MissingNoData(source))
    }

    /// Directory holding the boundary files of a project.
    pub fn project_dir(&self, pid: &str) -> PathBuf {
        self.project_root.join(pid)
    }

    /// Output table path of a project.
    pub fn output_path(&self, pid: &str) -> PathBuf {
        PathBuf::from(
            self.output_path
                .replace("{root}", &self.project_root.to_string_lossy())
                .replace("{pid}", pid),
        )
    }

    /// Tile URL and file-name templates.
    pub fn tile_source(&self) -> TileSource {
        TileSource::new(&self.tile_url_template, &self.tile_filename_template)
    }

    /// Connect timeout for tile downloads.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Whole-transfer timeout for tile downloads.
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}
