//! Channel state information records and batch input types.

use std::fmt;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Number of receive antennas in the physical array.
pub const ANTENNA_COUNT: usize = 3;

/// Number of subcarriers used per antenna.
pub const SUBCARRIER_COUNT: usize = 30;

/// Subcarriers covered by one spatial smoothing window.
pub const WINDOW_WIDTH: usize = 16;

/// Window offsets per antenna pair (stride 1 over the subcarriers).
pub const WINDOW_COUNT: usize = SUBCARRIER_COUNT - WINDOW_WIDTH + 1;

/// Antenna pairs combined into the virtual array (0-1 and 1-2).
pub const ANTENNA_PAIRS: usize = ANTENNA_COUNT - 1;

/// Dimension of the virtual array seen by MUSIC: 2 antennas × 15 subcarrier offsets.
pub const VIRTUAL_ARRAY_DIM: usize = ANTENNA_PAIRS * WINDOW_COUNT;

/// Identifier for a record in the spectrum cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKey(pub String);

impl RecordKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// Calibration selector; carried through to the report for labeling only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationId(pub i64);

/// One CSI measurement: complex channel response per antenna and subcarrier.
#[derive(Debug, Clone, PartialEq)]
pub struct CsiRecord {
    data: [[Complex64; SUBCARRIER_COUNT]; ANTENNA_COUNT],
}

impl CsiRecord {
    /// Creates a record from a fixed-size matrix.
    pub fn from_array(data: [[Complex64; SUBCARRIER_COUNT]; ANTENNA_COUNT]) -> Self {
        Self { data }
    }

    /// Creates a record from nested rows, validating the 3×30 shape.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Precondition` if the antenna or subcarrier
    /// count differs from the fixed array model.
    pub fn from_rows(rows: Vec<Vec<Complex64>>) -> Result<Self> {
        if rows.len() != ANTENNA_COUNT {
            return Err(PipelineError::Precondition(format!(
                "expected {} antennas, got {}",
                ANTENNA_COUNT,
                rows.len()
            )));
        }

        let mut data = [[Complex64::new(0.0, 0.0); SUBCARRIER_COUNT]; ANTENNA_COUNT];
        for (antenna, row) in rows.into_iter().enumerate() {
            if row.len() != SUBCARRIER_COUNT {
                return Err(PipelineError::Precondition(format!(
                    "antenna {}: expected {} subcarriers, got {}",
                    antenna,
                    SUBCARRIER_COUNT,
                    row.len()
                )));
            }
            data[antenna].copy_from_slice(&row);
        }

        Ok(Self { data })
    }

    /// Complex response of all subcarriers at one antenna.
    #[inline]
    pub fn antenna(&self, antenna: usize) -> &[Complex64; SUBCARRIER_COUNT] {
        &self.data[antenna]
    }

    #[inline]
    pub fn get(&self, antenna: usize, subcarrier: usize) -> Complex64 {
        self.data[antenna][subcarrier]
    }

    /// Iterates over the antenna rows.
    pub fn rows(&self) -> impl Iterator<Item = &[Complex64; SUBCARRIER_COUNT]> {
        self.data.iter()
    }
}

/// Records of one estimation run plus their optional cache keys.
#[derive(Debug, Clone, Default)]
pub struct CsiBatch {
    pub calibration: CalibrationId,
    pub records: Vec<CsiRecord>,
    /// Keys used to look up cached spectra; ignored unless one per record
    pub lookup_keys: Vec<RecordKey>,
    /// Keys used to store computed spectra; ignored unless one per record
    pub storage_keys: Vec<RecordKey>,
}

impl CsiBatch {
    pub fn new(calibration: CalibrationId, records: Vec<CsiRecord>) -> Self {
        Self {
            calibration,
            records,
            lookup_keys: Vec::new(),
            storage_keys: Vec::new(),
        }
    }

    pub fn with_lookup_keys(mut self, keys: Vec<RecordKey>) -> Self {
        self.lookup_keys = keys;
        self
    }

    pub fn with_storage_keys(mut self, keys: Vec<RecordKey>) -> Self {
        self.storage_keys = keys;
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Cache lookup is only enabled when there is exactly one key per record.
    pub fn lookup_enabled(&self) -> bool {
        !self.records.is_empty() && self.lookup_keys.len() == self.records.len()
    }

    /// Cache storage is only enabled when there is exactly one key per record.
    pub fn storage_enabled(&self) -> bool {
        !self.records.is_empty() && self.storage_keys.len() == self.records.len()
    }
}
