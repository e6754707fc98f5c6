//! Command-line entry point for the biomass statistics pipeline.

use carbon_runner::{Orchestrator, PipelineConfig, RunReport, WriteOutcome};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "carbon-stats", version, about = "Per-year above-ground biomass statistics for a carbon project")]
struct Cli {
    /// Project identifier; the activity and project area boundaries are the
    /// first two GeoJSON files (`.geojson`/`.json`, sorted by name) in
    /// `<project_root>/<pid>`. Convert shapefiles to GeoJSON first.
    #[arg(long)]
    pid: String,

    /// YAML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    carbon_metrics::describe_metrics();

    match run(&cli) {
        Ok(report) => {
            print_report(&report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::builder().from_env_lossy()
    } else {
        EnvFilter::builder().parse_lossy(level)
    };
    let _ = tracing_subscriber::fmt::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .try_init();
}

fn run(cli: &Cli) -> carbon_runner::Result<RunReport> {
    let config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            PipelineConfig::load(path)?
        }
        None => PipelineConfig::default(),
    };
    Orchestrator::new(config)?.run(&cli.pid)
}

fn print_report(report: &RunReport) {
    println!("Project {}", report.inputs.pid);
    println!(
        "Activity area: {} ha (UTM zone {})",
        report.activity_area.total_hectares, report.activity_area.zone
    );
    println!(
        "Project area:  {} ha (UTM zone {})",
        report.project_area.total_hectares, report.project_area.zone
    );
    match report.write_outcome {
        WriteOutcome::Written => println!("Wrote {}", report.output_path.display()),
        WriteOutcome::AlreadyExists => {
            println!("{} already exists and was left unchanged", report.output_path.display())
        }
    }

    for alt in &report.alternates {
        println!(
            "\n{} ({}): AA {} px, mean {:.4}; PA {} px, mean {:.4}",
            alt.label,
            alt.source,
            alt.activity_area.count,
            alt.activity_area.mean,
            alt.project_area.count,
            alt.project_area.mean
        );
    }

    for row in &report.histograms {
        let year = row.year.map(|y| format!(" {}", y)).unwrap_or_default();
        println!(
            "\n{} {}{} histogram [{}, {}]: {:?}",
            row.source,
            row.boundary.as_str(),
            year,
            row.histogram.min,
            row.histogram.max,
            row.histogram.counts
        );
    }
}
