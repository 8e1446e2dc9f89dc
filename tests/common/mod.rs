//! Synthetic CSI shared by the integration tests.

use std::f64::consts::PI;

use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use csi_aoa_pipeline::config::{ArrayConfig, SPEED_OF_LIGHT};
use csi_aoa_pipeline::core::csi::{ANTENNA_COUNT, SUBCARRIER_COUNT};
use csi_aoa_pipeline::{CsiRecord, PipelineConfig};

/// One propagation path: angle (radians), delay (seconds), complex gain.
#[derive(Debug, Clone, Copy)]
pub struct Path {
    pub theta: f64,
    pub tau: f64,
    pub gain: Complex64,
}

impl Path {
    pub fn new(theta_deg: f64, tau_ns: f64) -> Self {
        Self {
            theta: theta_deg.to_radians(),
            tau: tau_ns * 1e-9,
            gain: Complex64::new(1.0, 0.0),
        }
    }
}

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Circular complex Gaussian sample with the given standard deviation.
fn complex_noise(rng: &mut StdRng, sigma: f64) -> Complex64 {
    let u1: f64 = rng.gen_range(f64::MIN_POSITIVE..1.0);
    let u2: f64 = rng.gen();
    let radius = sigma * (-2.0 * u1.ln()).sqrt() / 2f64.sqrt();
    Complex64::from_polar(radius, 2.0 * PI * u2)
}

/// CSI of a sum of plane waves plus white noise.
pub fn synthetic_record(array: &ArrayConfig, paths: &[Path], sigma: f64, rng: &mut StdRng) -> CsiRecord {
    let mut data = [[Complex64::new(0.0, 0.0); SUBCARRIER_COUNT]; ANTENNA_COUNT];
    for (antenna, row) in data.iter_mut().enumerate() {
        for (subcarrier, value) in row.iter_mut().enumerate() {
            let mut sample = complex_noise(rng, sigma);
            for path in paths {
                let aoa = -2.0 * PI * array.antenna_spacing_m * path.theta.sin()
                    * array.channel_frequency_hz
                    / SPEED_OF_LIGHT;
                let tof = -2.0 * PI * array.subcarrier_spacing_hz * path.tau;
                sample += path.gain
                    * Complex64::from_polar(1.0, antenna as f64 * aoa + subcarrier as f64 * tof);
            }
            *value = sample;
        }
    }
    CsiRecord::from_array(data)
}

/// Half-wavelength array searched over the front half-plane only, so a
/// single path has exactly one spectrum maximum.
pub fn unambiguous_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.array.antenna_spacing_m = config.array.wavelength() / 2.0;
    config.grid.theta_min = -PI / 2.0;
    config.grid.theta_max = PI / 2.0;
    config.sanitizer.remove_linear_phase = false;
    config
}
