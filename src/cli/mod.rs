//! Command-line interface for the CSI angle/delay estimation pipeline.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::core::loaders::load_batch_json;
use crate::core::storage::{JsonFileStore, SpectrumStore};
use crate::core::writers::{write_clusters_csv, write_peaks_csv, write_report_json};
use crate::pipeline::Pipeline;
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "csi-aoa-pipeline")]
#[command(about = "Angle of arrival and time of flight estimation from Wi-Fi CSI", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate multipath clusters for a batch of CSI records
    Analyze {
        /// Batch JSON file with CSI records
        batch: PathBuf,
        /// Output directory for report.json, peaks.csv and clusters.csv
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Directory used to cache spectra and peaks by record key
        #[arg(long)]
        cache_dir: Option<PathBuf>,
        /// Override the number of MUSIC worker threads
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Write the default configuration as YAML
    ConfigTemplate {
        /// Output YAML path
        path: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    let result = match cli.command {
        Commands::Analyze {
            batch,
            output_dir,
            cache_dir,
            workers,
        } => cmd_analyze(&batch, output_dir, cache_dir, workers, config),
        Commands::ConfigTemplate { path } => cmd_config_template(&path, &config),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn cmd_analyze(
    batch_path: &Path,
    output_dir: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    workers: Option<usize>,
    mut config: PipelineConfig,
) -> Result<()> {
    let start = Instant::now();

    if let Some(workers) = workers {
        config.music.workers = workers;
    }

    // Default output directory to same as input
    let effective_output_dir = output_dir.unwrap_or_else(|| {
        batch_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    });

    let batch = load_batch_json(batch_path)
        .with_context(|| format!("failed to load batch {}", batch_path.display()))?;
    let pipeline = Pipeline::new(config).context("invalid pipeline configuration")?;
    let store = cache_dir.as_ref().map(JsonFileStore::new);

    println!("Input: {}", batch_path.display());
    println!("Records: {}", batch.len());
    println!("Output directory: {}", effective_output_dir.display());
    if let Some(dir) = &cache_dir {
        println!("Cache directory: {}", dir.display());
    }

    let spinner = create_spinner("Estimating angle of arrival and time of flight...");
    let result = pipeline.run(&batch, store.as_ref().map(|s| s as &dyn SpectrumStore));
    spinner.finish_and_clear();
    let report = result.context("batch processing failed")?;

    let report_path = effective_output_dir.join("report.json");
    let peaks_path = effective_output_dir.join("peaks.csv");
    let clusters_path = effective_output_dir.join("clusters.csv");
    write_report_json(&report_path, &report)?;
    write_peaks_csv(&peaks_path, &report)?;
    write_clusters_csv(&clusters_path, &report)?;

    let best = report
        .best_cluster()
        .map(|c| {
            format!(
                "{:.1} deg, {:.2} ns",
                c.stats.mean_theta.to_degrees(),
                c.stats.mean_tau * 1e9
            )
        })
        .unwrap_or_else(|| "none".to_string());

    print_summary(
        "Analysis Complete",
        &[
            ("Calibration", report.calibration.0.to_string()),
            ("Records", report.records.len().to_string()),
            ("Failed records", report.failed_records().to_string()),
            ("Filtered peaks", report.filtered_peaks.len().to_string()),
            ("Removed peaks", report.removed_peaks.len().to_string()),
            ("Clusters", report.clusters.len().to_string()),
            ("Best cluster", best),
            ("Report", report_path.display().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}

fn cmd_config_template(path: &Path, config: &PipelineConfig) -> Result<()> {
    config
        .to_yaml(path)
        .map_err(|e| anyhow::anyhow!("failed to write {}: {}", path.display(), e))?;
    println!("Wrote configuration to {}", path.display());
    Ok(())
}
