//! Angle of arrival and time of flight estimation from Wi-Fi channel state information.
//!
//! This crate provides tools for:
//! - Removing the sampling time offset from raw 3-antenna CSI
//! - Spatial smoothing into a 30-element virtual array
//! - MUSIC pseudo-spectra over an (angle, delay) grid (parallelized)
//! - Peak detection, outlier filtering and Gaussian mixture clustering
//! - Caching spectra and peaks by record key
//!
//! # Example
//!
//! ```no_run
//! use csi_aoa_pipeline::{core::loaders::load_batch_json, Pipeline, PipelineConfig};
//!
//! let batch = load_batch_json("capture.json").unwrap();
//! let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
//! let report = pipeline.run(&batch, None).unwrap();
//! if let Some(best) = report.best_cluster() {
//!     println!("{:.1} deg", best.stats.mean_theta.to_degrees());
//! }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod pipeline;
pub mod processors;

pub use config::{ClusteringConfig, GridConfig, PipelineConfig, ScalingConfig};
pub use core::csi::{CalibrationId, CsiBatch, CsiRecord, RecordKey};
pub use error::PipelineError;
pub use pipeline::{BatchReport, Pipeline, RecordReport, RecordStatus};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
