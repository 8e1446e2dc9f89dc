//! Core data types and I/O operations.

pub mod csi;
pub mod loaders;
pub mod spectrum;
pub mod storage;
pub mod writers;

pub use csi::{CalibrationId, CsiBatch, CsiRecord, RecordKey};
pub use loaders::{load_batch_json, LoaderError};
pub use spectrum::{AngleDelayGrid, Peak, Spectrum};
pub use storage::{JsonFileStore, MemoryStore, SpectrumStore, StorageError};
pub use writers::{write_clusters_csv, write_peaks_csv, write_report_json, WriteError};
