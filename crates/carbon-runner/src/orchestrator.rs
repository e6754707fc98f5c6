//! The yearly fetch-then-reduce pipeline.

use crate::config::{PipelineConfig, SourceId};
use crate::project::ProjectInputs;
use crate::results::{ResultsTable, WriteOutcome, YearStats};
use crate::{Result, RunError};
use carbon_area::{area_report, AreaReport, Boundary};
use carbon_metrics::metric_defs;
use carbon_metrics::metrics::{counter, gauge, histogram};
use carbon_metrics::StatsLabels;
use carbon_raster::{Histogram, MaskedRaster, Mosaic, RasterError, RasterStats};
use carbon_tiles::{tiles_covering, BoundingBox, TileFetcher};
use geo::Rect;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Which of the two project boundaries a statistic refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryRole {
    /// Area where project activities take place.
    ActivityArea,
    /// Full project area.
    ProjectArea,
}

impl BoundaryRole {
    /// Label used in metrics and export file names.
    pub const fn as_str(&self) -> &'static str {
        match self {
            BoundaryRole::ActivityArea => "activity_area",
            BoundaryRole::ProjectArea => "project_area",
        }
    }

    const fn clip_stage(&self) -> &'static str {
        match self {
            BoundaryRole::ActivityArea => "clipping to the activity area",
            BoundaryRole::ProjectArea => "clipping to the project area",
        }
    }
}

/// Histogram of one clip, when histograms are configured.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramRow {
    /// Raster product.
    pub source: SourceId,
    /// Boundary the clip was cut to.
    pub boundary: BoundaryRole,
    /// Product year, for yearly sources.
    pub year: Option<u16>,
    /// Bin counts of the valid pixels.
    pub histogram: Histogram,
}

/// Statistics of a single pre-supplied raster over both boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct AlternateStats {
    /// Label from the configuration.
    pub label: String,
    /// Raster product.
    pub source: SourceId,
    /// Statistics over the activity area.
    pub activity_area: RasterStats,
    /// Statistics over the project area.
    pub project_area: RasterStats,
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Boundary files used.
    pub inputs: ProjectInputs,
    /// Area of the activity area.
    pub activity_area: AreaReport,
    /// Area of the project area.
    pub project_area: AreaReport,
    /// Per-year biomass statistics.
    pub table: ResultsTable,
    /// Where the table lives.
    pub output_path: PathBuf,
    /// Whether this run wrote the table.
    pub write_outcome: WriteOutcome,
    /// Alternate-source lookups, in configuration order.
    pub alternates: Vec<AlternateStats>,
    /// One histogram per clip, in processing order; empty unless configured.
    pub histograms: Vec<HistogramRow>,
}

/// Runs the pipeline for one project at a time.
#[derive(Debug)]
pub struct Orchestrator {
    config: PipelineConfig,
    fetcher: TileFetcher,
}

impl Orchestrator {
    /// Create an orchestrator with a tile fetcher built from `config`.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let fetcher = TileFetcher::with_timeouts(
            &config.tile_cache_dir,
            config.tile_source(),
            config.connect_timeout(),
            config.download_timeout(),
        )?;
        Ok(Self::with_fetcher(config, fetcher))
    }

    /// Create an orchestrator around an existing fetcher.
    pub fn with_fetcher(config: PipelineConfig, fetcher: TileFetcher) -> Self {
        Self { config, fetcher }
    }

    /// The configuration in use.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The tile fetcher in use.
    pub fn fetcher(&self) -> &TileFetcher {
        &self.fetcher
    }

    /// Run the whole pipeline for a project.
    ///
    /// Tile download failures only shorten a year's tile list. Any masking
    /// failure aborts the run. The results table is written before the
    /// alternate rasters are looked at, so a failing alternate leaves it in
    /// place.
    pub fn run(&self, pid: &str) -> Result<RunReport> {
        let inputs = ProjectInputs::resolve(&self.config, pid)?;

        info!("Reading project area...");
        let activity = Boundary::from_file(&inputs.activity_area)?;
        let activity_report = area_report(&activity)?;
        info!("Activity Area path: {}", inputs.activity_area.display());
        info!("Activity area size: {} ha", activity_report.total_hectares);
        gauge!(metric_defs::AREA_HECTARES.name, "boundary" => BoundaryRole::ActivityArea.as_str())
            .set(activity_report.total_hectares);

        let project = Boundary::from_file(&inputs.project_area)?;
        let project_report = area_report(&project)?;
        info!("Project Area path: {}", inputs.project_area.display());
        info!("Project area size: {} ha", project_report.total_hectares);
        gauge!(metric_defs::AREA_HECTARES.name, "boundary" => BoundaryRole::ProjectArea.as_str())
            .set(project_report.total_hectares);

        let area = area_of_interest(pid, &activity, &project)?;
        let mut histograms = Vec::new();
        let table = self.yearly_table(pid, &activity, &project, &area, &mut histograms)?;

        let output_path = self.config.output_path(pid);
        let write_outcome = table.write_once(&output_path)?;
        match write_outcome {
            WriteOutcome::Written => {
                info!("Exported results to csv, please find it: {}", output_path.display())
            }
            WriteOutcome::AlreadyExists => {
                info!("Results already exist, please find them: {}", output_path.display())
            }
        }
        info!("Results for project {}:\n{}", pid, table);

        let alternates = self.alternate_lookups(pid, &activity, &project, &area, &mut histograms)?;

        Ok(RunReport {
            inputs,
            activity_area: activity_report,
            project_area: project_report,
            table,
            output_path,
            write_outcome,
            alternates,
            histograms,
        })
    }

    /// Fetch and reduce every configured year.
    fn yearly_table(
        &self,
        pid: &str,
        activity: &Boundary,
        project: &Boundary,
        area: &Rect<f64>,
        histograms: &mut Vec<HistogramRow>,
    ) -> Result<ResultsTable> {
        let nodata = self.config.nodata(SourceId::EsaCci)?;
        let bounds = project
            .bounds()
            .ok_or_else(|| carbon_area::AreaError::EmptyBoundary(pid.to_string()))?;
        let bbox = BoundingBox::new(bounds.min().x, bounds.min().y, bounds.max().x, bounds.max().y);
        let tiles = tiles_covering(&bbox)?;
        info!(
            "Project area needs {} tile(s): {}",
            tiles.len(),
            tiles.iter().map(|t| t.name()).collect::<Vec<_>>().join(", ")
        );

        let mut table = ResultsTable::new();
        for &year in &self.config.years {
            info!("Year: {}", year);
            info!("Finding and downloading tiles...");
            let paths = self.fetcher.fetch_year(&tiles, year);
            if paths.len() < tiles.len() {
                warn!(year, available = paths.len(), needed = tiles.len(), "Continuing with a partial tile set");
            }

            info!("Extracting AGB values from images");
            let mosaic = Mosaic::open_within(&paths, area).map_err(|source| RunError::Masking {
                source_id: SourceId::EsaCci,
                stage: "opening the tile mosaic",
                year: Some(year),
                source,
            })?;

            let clip = Clip {
                source: SourceId::EsaCci,
                nodata,
                year: Some(year),
                pid,
            };
            let activity_stats = self.clip_and_reduce(&mosaic, activity, BoundaryRole::ActivityArea, &clip, histograms)?;
            info!(
                "Year: {}, total AGB in AA: {}, mean value: {}",
                year, activity_stats.sum, activity_stats.mean
            );

            let project_stats = self.clip_and_reduce(&mosaic, project, BoundaryRole::ProjectArea, &clip, histograms)?;
            info!(
                "Year: {}, total AGB in PA: {}, mean value: {}",
                year, project_stats.sum, project_stats.mean
            );

            table.insert(YearStats {
                year,
                activity_area: activity_stats,
                project_area: project_stats,
            });
        }
        Ok(table)
    }

    /// Reduce each configured single raster over both boundaries.
    fn alternate_lookups(
        &self,
        pid: &str,
        activity: &Boundary,
        project: &Boundary,
        area: &Rect<f64>,
        histograms: &mut Vec<HistogramRow>,
    ) -> Result<Vec<AlternateStats>> {
        let mut results = Vec::with_capacity(self.config.alternate_sources.len());
        for alternate in &self.config.alternate_sources {
            info!("Using {} for biomass mapping", alternate.label);
            if !alternate.path.is_file() {
                return Err(RunError::MissingRaster {
                    label: alternate.label.clone(),
                    path: alternate.path.clone(),
                });
            }
            let nodata = self.config.nodata(alternate.source)?;
            let mosaic = Mosaic::open_within(&[&alternate.path], area).map_err(|source| match source {
                RasterError::Io(e) => RunError::Io(e),
                source => RunError::Masking {
                    source_id: alternate.source,
                    stage: "opening the raster",
                    year: None,
                    source,
                },
            })?;

            let clip = Clip {
                source: alternate.source,
                nodata,
                year: None,
                pid,
            };
            let activity_stats = self.clip_and_reduce(&mosaic, activity, BoundaryRole::ActivityArea, &clip, histograms)?;
            info!(
                "{}: {} pixels used, mean value in AA: {}",
                alternate.label, activity_stats.count, activity_stats.mean
            );
            let project_stats = self.clip_and_reduce(&mosaic, project, BoundaryRole::ProjectArea, &clip, histograms)?;
            info!(
                "{}: {} pixels used, mean value in PA: {}",
                alternate.label, project_stats.count, project_stats.mean
            );

            results.push(AlternateStats {
                label: alternate.label.clone(),
                source: alternate.source,
                activity_area: activity_stats,
                project_area: project_stats,
            });
        }
        Ok(results)
    }

    /// Clip, reduce, record metrics and optionally bin and export.
    fn clip_and_reduce(
        &self,
        mosaic: &Mosaic,
        cutline: &Boundary,
        role: BoundaryRole,
        clip: &Clip<'_>,
        histograms: &mut Vec<HistogramRow>,
    ) -> Result<RasterStats> {
        let Clip { source, nodata, year, pid } = *clip;
        let masking_error = |e: RasterError| RunError::Masking {
            source_id: source,
            stage: role.clip_stage(),
            year,
            source: e,
        };

        let started = Instant::now();
        let masked = mosaic.clip(cutline, nodata).map_err(masking_error)?;
        let elapsed = started.elapsed();
        let stats = masked.stats();

        let mut labels = StatsLabels::new(source.as_str(), role.as_str());
        if let Some(year) = year {
            labels = labels.with_year(year);
        }
        let labels = labels.to_labels();
        counter!(metric_defs::STATS_CALLS.name, &labels).increment(1);
        counter!(metric_defs::VALID_PIXELS.name, &labels).increment(stats.count);
        histogram!(metric_defs::MASK_DURATION.name, &labels).record(elapsed.as_secs_f64() * 1000.0);

        if stats.is_empty() {
            warn!(source = %source, boundary = role.as_str(), ?year, "No valid pixels found in the masked raster");
        }

        if let Some(bins) = &self.config.histogram {
            histograms.push(HistogramRow {
                source,
                boundary: role,
                year,
                histogram: masked.histogram(bins.min, bins.max, bins.bins),
            });
        }

        if let Some(dir) = &self.config.export_dir {
            let name = match year {
                Some(year) => format!("{}_{}_{}_{}.tif", pid, source, role.as_str(), year),
                None => format!("{}_{}_{}.tif", pid, source, role.as_str()),
            };
            export(&masked, dir, &name)?;
        }

        Ok(stats)
    }
}

/// What a mosaic is being reduced for.
#[derive(Clone, Copy)]
struct Clip<'a> {
    source: SourceId,
    nodata: f64,
    year: Option<u16>,
    pid: &'a str,
}

/// WGS84 box around both boundaries; tiles are only read inside it.
fn area_of_interest(pid: &str, activity: &Boundary, project: &Boundary) -> Result<Rect<f64>> {
    let empty = || carbon_area::AreaError::EmptyBoundary(pid.to_string());
    let a = activity.bounds().ok_or_else(empty)?;
    let p = project.bounds().ok_or_else(empty)?;
    Ok(Rect::new(
        (a.min().x.min(p.min().x), a.min().y.min(p.min().y)),
        (a.max().x.max(p.max().x), a.max().y.max(p.max().y)),
    ))
}

fn export(masked: &MaskedRaster, dir: &Path, name: &str) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(name);
    masked
        .write_geotiff(&path)
        .map_err(|source| RunError::Export {
            path: path.clone(),
            source,
        })?;
    info!("Exported masked raster to {}", path.display());
    Ok(())
}
