//! Spatial smoothing of a 3-antenna CSI record into a virtual array.
//!
//! A 16-subcarrier window slides across the 30 subcarriers (15 offsets). For
//! each offset and each adjacent antenna pair (0-1, 1-2) the two antennas'
//! windows are concatenated into one row, giving 30 rows of 32 samples. Row
//! `pair * 15 + offset` carries the phase progression of virtual element
//! (antenna `pair`, subcarrier `offset`), which is how the MUSIC steering
//! vector is laid out.

use nalgebra::DMatrix;
use num_complex::Complex64;

use crate::core::csi::{CsiRecord, ANTENNA_PAIRS, VIRTUAL_ARRAY_DIM, WINDOW_COUNT, WINDOW_WIDTH};

/// Virtual array snapshot matrix, `VIRTUAL_ARRAY_DIM` rows × `2 * WINDOW_WIDTH` columns.
pub type VirtualArrayMatrix = DMatrix<Complex64>;

/// Number of samples in one virtual array row.
pub const SNAPSHOT_WIDTH: usize = 2 * WINDOW_WIDTH;

/// Builds the smoothed virtual array matrix.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpatialSmoother;

impl SpatialSmoother {
    pub fn new() -> Self {
        Self
    }

    pub fn smooth(&self, record: &CsiRecord) -> VirtualArrayMatrix {
        DMatrix::from_fn(VIRTUAL_ARRAY_DIM, SNAPSHOT_WIDTH, |row, col| {
            let pair = row / WINDOW_COUNT;
            let offset = row % WINDOW_COUNT;
            debug_assert!(pair < ANTENNA_PAIRS);

            let antenna = pair + col / WINDOW_WIDTH;
            record.get(antenna, offset + col % WINDOW_WIDTH)
        })
    }
}
