//! Sampling-time-offset removal for raw CSI.
//!
//! A timing offset between transmitter and receiver adds a phase ramp that
//! is linear in the subcarrier index and identical on every antenna. The
//! sanitizer unwraps each antenna's phase, fits one least-squares line to the
//! (subcarrier index, phase) pairs of all antennas jointly and subtracts the
//! fitted slope, leaving amplitudes untouched.

use std::f64::consts::PI;

use num_complex::Complex64;

use crate::config::SanitizerConfig;
use crate::core::csi::{CsiRecord, ANTENNA_COUNT, SUBCARRIER_COUNT};

/// Unwrap a phase sequence in place so consecutive samples never jump by more than π.
pub fn unwrap_phase(phase: &mut [f64]) {
    if phase.len() < 2 {
        return;
    }

    let mut correction = 0.0;
    let mut previous = phase[0];

    for value in phase.iter_mut().skip(1) {
        let raw = *value;
        let diff = raw - previous;
        previous = raw;

        if diff.abs() >= PI {
            let mut wrapped = (diff + PI).rem_euclid(2.0 * PI) - PI;
            if wrapped == -PI && diff > 0.0 {
                wrapped = PI;
            }
            correction += wrapped - diff;
        }

        *value = raw + correction;
    }
}

/// Least-squares slope of `ys` against `xs`.
fn fit_slope(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        sxy += (x - mean_x) * (y - mean_y);
        sxx += (x - mean_x) * (x - mean_x);
    }

    if sxx == 0.0 {
        0.0
    } else {
        sxy / sxx
    }
}

/// Removes the sampling-time-offset phase ramp from CSI records.
#[derive(Debug, Clone)]
pub struct CsiSanitizer {
    remove_linear_phase: bool,
}

impl CsiSanitizer {
    pub fn new(config: &SanitizerConfig) -> Self {
        Self {
            remove_linear_phase: config.remove_linear_phase,
        }
    }

    /// Unwrapped phase per antenna.
    pub fn unwrapped_phases(record: &CsiRecord) -> [[f64; SUBCARRIER_COUNT]; ANTENNA_COUNT] {
        let mut phases = [[0.0; SUBCARRIER_COUNT]; ANTENNA_COUNT];
        for (antenna, row) in record.rows().enumerate() {
            for (subcarrier, value) in row.iter().enumerate() {
                phases[antenna][subcarrier] = value.arg();
            }
            unwrap_phase(&mut phases[antenna]);
        }
        phases
    }

    /// Phase slope per subcarrier shared by all antennas (the time offset
    /// estimate, in radians per subcarrier).
    pub fn estimate_time_offset(phases: &[[f64; SUBCARRIER_COUNT]; ANTENNA_COUNT]) -> f64 {
        let mut xs = Vec::with_capacity(ANTENNA_COUNT * SUBCARRIER_COUNT);
        let mut ys = Vec::with_capacity(ANTENNA_COUNT * SUBCARRIER_COUNT);
        for row in phases {
            for (subcarrier, &phase) in row.iter().enumerate() {
                xs.push((subcarrier + 1) as f64);
                ys.push(phase);
            }
        }
        fit_slope(&xs, &ys)
    }

    /// Removes the phase ramp shared by all antennas.
    ///
    /// The slope is fitted by least squares over the unwrapped phases of every
    /// antenna against the subcarrier index, then subtracted from each phase.
    /// Amplitudes are left untouched. When `remove_linear_phase` is off the
    /// slope is taken as zero.
    ///
    /// # Arguments
    ///
    /// * `record` - Raw CSI of one packet
    ///
    /// # Returns
    ///
    /// A record of the same shape with the common phase ramp removed
    pub fn sanitize(&self, record: &CsiRecord) -> CsiRecord {
        let phases = Self::unwrapped_phases(record);
        let slope = if self.remove_linear_phase {
            Self::estimate_time_offset(&phases)
        } else {
            0.0
        };
        log::debug!("sanitizer: time offset slope {:.6} rad/subcarrier", slope);

        let mut data = [[Complex64::new(0.0, 0.0); SUBCARRIER_COUNT]; ANTENNA_COUNT];
        for antenna in 0..ANTENNA_COUNT {
            for subcarrier in 0..SUBCARRIER_COUNT {
                let phase = phases[antenna][subcarrier] - subcarrier as f64 * slope;
                let magnitude = record.get(antenna, subcarrier).norm();
                data[antenna][subcarrier] = Complex64::from_polar(magnitude, phase);
            }
        }

        CsiRecord::from_array(data)
    }
}

impl Default for CsiSanitizer {
    fn default() -> Self {
        Self::new(&SanitizerConfig::default())
    }
}
