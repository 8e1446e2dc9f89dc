//! Batch loader for CSI captures stored as JSON.
//!
//! Expected layout:
//!
//! ```json
//! {
//!   "calibration": 3,
//!   "lookup_keys": ["capture_0", "capture_1"],
//!   "storage_keys": ["capture_0", "capture_1"],
//!   "records": [
//!     { "csi_matrix": [[{"real": 1.0, "imag": 0.5}, ...], ...] }
//!   ]
//! }
//! ```
//!
//! `calibration` and both key lists are optional. Every `csi_matrix` must be
//! 3 antennas × 30 subcarriers.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use num_complex::Complex64;
use serde::Deserialize;
use thiserror::Error;

use super::csi::{CalibrationId, CsiBatch, CsiRecord, RecordKey};

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No records in file: {0}")]
    EmptyFile(PathBuf),

    #[error("Invalid record {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

#[derive(Debug, Deserialize)]
struct ComplexEntry {
    real: f64,
    imag: f64,
}

#[derive(Debug, Deserialize)]
struct RecordEntry {
    csi_matrix: Vec<Vec<ComplexEntry>>,
}

#[derive(Debug, Deserialize)]
struct BatchFile {
    #[serde(default)]
    calibration: i64,
    #[serde(default)]
    lookup_keys: Vec<RecordKey>,
    #[serde(default)]
    storage_keys: Vec<RecordKey>,
    records: Vec<RecordEntry>,
}

/// Parses a batch from a JSON string.
pub fn parse_batch(json: &str) -> Result<CsiBatch> {
    let file: BatchFile = serde_json::from_str(json)?;
    into_batch(file)
}

fn into_batch(file: BatchFile) -> Result<CsiBatch> {
    let records = file
        .records
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let rows = entry
                .csi_matrix
                .into_iter()
                .map(|row| row.into_iter().map(|c| Complex64::new(c.real, c.imag)).collect())
                .collect();
            CsiRecord::from_rows(rows).map_err(|e| LoaderError::InvalidRecord {
                index,
                reason: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CsiBatch::new(CalibrationId(file.calibration), records)
        .with_lookup_keys(file.lookup_keys)
        .with_storage_keys(file.storage_keys))
}

/// Loads a batch file from disk.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid JSON, holds no
/// records, or contains a record of the wrong shape.
pub fn load_batch_json<P: AsRef<Path>>(path: P) -> Result<CsiBatch> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let file: BatchFile = serde_json::from_reader(reader)?;
    if file.records.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    let batch = into_batch(file)?;
    log::info!(
        "loaded {} records from {}",
        batch.len(),
        path.display()
    );
    Ok(batch)
}
