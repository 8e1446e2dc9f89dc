//! Report writers for JSON and CSV formats.
//!
//! - JSON with the full batch report
//! - CSV with one row per detected peak
//! - CSV with one row per scored cluster

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use csv::Writer;
use thiserror::Error;

use crate::pipeline::BatchReport;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// JSON serialization error.
    #[error("JSON write error for '{path}': {source}")]
    JsonError {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a buffered writer for the given path.
fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    ensure_parent_dirs(path)?;
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

/// Writes CSV rows under a header, mapping errors to the file path.
fn write_csv_rows<I>(path: &Path, header: &[&str], rows: I) -> Result<()>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut csv_writer = Writer::from_writer(create_buffered_writer(path)?);
    let path_str = path.display().to_string();

    csv_writer
        .write_record(header)
        .map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;

    for row in rows {
        csv_writer
            .write_record(&row)
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })
}

/// Write the full batch report as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if:
/// - Parent directories cannot be created
/// - File cannot be created or written to
pub fn write_report_json(path: &Path, report: &BatchReport) -> Result<()> {
    let mut writer = create_buffered_writer(path)?;
    serde_json::to_writer_pretty(&mut writer, report).map_err(|e| WriteError::JsonError {
        path: path.display().to_string(),
        source: e,
    })?;
    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })
}

/// Write every detected peak with its origin record and filter outcome.
///
/// Columns: `record,key,rank,theta_rad,tau_s,magnitude_db,retained`.
pub fn write_peaks_csv(path: &Path, report: &BatchReport) -> Result<()> {
    let rows = report.records.iter().flat_map(|record| {
        let key = record.key.as_ref().map(|k| k.to_string()).unwrap_or_default();
        record
            .detected_peaks
            .iter()
            .enumerate()
            .map(move |(rank, peak)| {
                vec![
                    record.index.to_string(),
                    key.clone(),
                    rank.to_string(),
                    format!("{:.6}", peak.theta),
                    format!("{:.6e}", peak.tau),
                    format!("{:.6}", peak.magnitude),
                    record.retained_peaks.contains(peak).to_string(),
                ]
            })
    });

    write_csv_rows(
        path,
        &["record", "key", "rank", "theta_rad", "tau_s", "magnitude_db", "retained"],
        rows,
    )
}

/// Write scored clusters, most plausible first.
pub fn write_clusters_csv(path: &Path, report: &BatchReport) -> Result<()> {
    let rows = report.clusters.iter().enumerate().map(|(rank, cluster)| {
        let stats = &cluster.stats;
        vec![
            rank.to_string(),
            format!("{:.6}", stats.mean_theta),
            format!("{:.3}", stats.mean_theta.to_degrees()),
            format!("{:.6e}", stats.mean_tau),
            format!("{:.6e}", stats.covariance[0][0]),
            format!("{:.6e}", stats.covariance[0][1]),
            format!("{:.6e}", stats.covariance[1][1]),
            format!("{:.6}", stats.weight),
            format!("{:.6}", stats.height),
            format!("{:.6e}", cluster.likelihood),
        ]
    });

    write_csv_rows(
        path,
        &[
            "rank",
            "mean_theta_rad",
            "mean_theta_deg",
            "mean_tau_s",
            "var_theta",
            "cov_theta_tau",
            "var_tau",
            "weight",
            "height_db",
            "likelihood",
        ],
        rows,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::csi::{CalibrationId, RecordKey};
    use crate::core::spectrum::Peak;
    use crate::pipeline::{RecordReport, RecordStatus};
    use crate::processors::{Cluster, ClusterStats};
    use tempfile::tempdir;

    fn create_test_report() -> BatchReport {
        let kept = Peak::new(0.5, 5e-9, 12.0);
        let dropped = Peak::new(-1.0, 2e-8, 3.0);
        BatchReport {
            calibration: CalibrationId(1),
            records: vec![
                RecordReport {
                    index: 0,
                    key: Some(RecordKey::from("cap0")),
                    status: RecordStatus::Ok,
                    computed_paths: Some(2),
                    detected_peaks: vec![kept, dropped],
                    retained_peaks: vec![kept],
                },
                RecordReport {
                    index: 1,
                    key: None,
                    status: RecordStatus::Failed("degenerate".to_string()),
                    computed_paths: None,
                    detected_peaks: Vec::new(),
                    retained_peaks: Vec::new(),
                },
            ],
            filtered_peaks: vec![kept],
            removed_peaks: vec![dropped],
            clusters: vec![Cluster {
                stats: ClusterStats {
                    mean_theta: 0.5,
                    mean_tau: 5e-9,
                    covariance: [[1e-4, 0.0], [0.0, 1e-20]],
                    weight: 1.0,
                    height: 12.0,
                },
                likelihood: 2.5,
            }],
        }
    }

    #[test]
    fn test_write_peaks_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("peaks.csv");

        write_peaks_csv(&path, &create_test_report()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "record,key,rank,theta_rad,tau_s,magnitude_db,retained");
        assert_eq!(lines[1], "0,cap0,0,0.500000,5.000000e-9,12.000000,true");
        assert!(lines[2].ends_with(",false"));
    }

    #[test]
    fn test_write_clusters_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("clusters.csv");

        write_clusters_csv(&path, &create_test_report()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("rank,mean_theta_rad,mean_theta_deg"));
        assert!(lines[1].starts_with("0,0.500000,28.648,5.000000e-9"));
    }

    #[test]
    fn test_write_report_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");

        write_report_json(&path, &create_test_report()).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["calibration"], 1);
        assert_eq!(value["records"][0]["status"], "ok");
        assert_eq!(value["records"][1]["status"]["failed"], "degenerate");
        assert_eq!(value["clusters"][0]["likelihood"], 2.5);
        assert_eq!(value["clusters"][0]["mean_theta"], 0.5);
        assert_eq!(value["removed_peaks"][0][0], -1.0);
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("subdir").join("nested").join("report.json");

        write_report_json(&path, &create_test_report()).unwrap();

        assert!(path.exists());
    }
}
