//! MUSIC spectrum, search grid and peak types.

use serde::{Deserialize, Serialize};

use crate::config::{GridConfig, SPEED_OF_LIGHT};
use crate::error::{PipelineError, Result};

/// Evenly spaced samples over `[start, end]`, both ends included.
pub fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (count - 1) as f64;
            (0..count).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Angle (radians) and delay (seconds) sample positions of a spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct AngleDelayGrid {
    pub theta: Vec<f64>,
    pub tau: Vec<f64>,
}

impl AngleDelayGrid {
    pub fn new(theta: Vec<f64>, tau: Vec<f64>) -> Self {
        Self { theta, tau }
    }

    /// Builds the grid described by the configuration.
    pub fn from_config(config: &GridConfig) -> Self {
        let tau_limit = config.tau_extent_m / SPEED_OF_LIGHT;
        Self {
            theta: linspace(config.theta_min, config.theta_max, config.theta_samples),
            tau: linspace(-tau_limit, tau_limit, config.tau_samples),
        }
    }

    /// Returns (theta samples, tau samples).
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.theta.len(), self.tau.len())
    }
}

/// Real-valued pseudo-spectrum in dB, row-major over (theta, tau).
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    theta_count: usize,
    tau_count: usize,
    values: Vec<f64>,
}

impl Spectrum {
    /// Wraps row-major values.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Precondition` if `values` does not hold
    /// exactly `theta_count * tau_count` entries.
    pub fn new(theta_count: usize, tau_count: usize, values: Vec<f64>) -> Result<Self> {
        if values.len() != theta_count * tau_count {
            return Err(PipelineError::Precondition(format!(
                "spectrum of {}x{} needs {} values, got {}",
                theta_count,
                tau_count,
                theta_count * tau_count,
                values.len()
            )));
        }
        Ok(Self {
            theta_count,
            tau_count,
            values,
        })
    }

    /// Builds a spectrum from nested rows (one row per theta sample).
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let theta_count = rows.len();
        let tau_count = rows.first().map_or(0, |r| r.len());
        if rows.iter().any(|r| r.len() != tau_count) {
            return Err(PipelineError::Precondition(
                "spectrum rows have unequal lengths".to_string(),
            ));
        }
        let values = rows.into_iter().flatten().collect();
        Self::new(theta_count, tau_count, values)
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.theta_count, self.tau_count)
    }

    #[inline]
    pub fn get(&self, theta_idx: usize, tau_idx: usize) -> f64 {
        self.values[theta_idx * self.tau_count + tau_idx]
    }

    /// All delay samples of one angle.
    #[inline]
    pub fn row(&self, theta_idx: usize) -> &[f64] {
        let start = theta_idx * self.tau_count;
        &self.values[start..start + self.tau_count]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.theta_count).map(|i| self.row(i).to_vec()).collect()
    }

    /// Whether this spectrum was sampled on a grid of the given shape.
    pub fn matches(&self, grid: &AngleDelayGrid) -> bool {
        self.shape() == grid.shape()
    }
}

/// A local maximum of the spectrum: angle (radians), delay (seconds), height (dB).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Peak {
    pub theta: f64,
    pub tau: f64,
    pub magnitude: f64,
}

impl Peak {
    pub fn new(theta: f64, tau: f64, magnitude: f64) -> Self {
        Self {
            theta,
            tau,
            magnitude,
        }
    }
}

impl From<[f64; 3]> for Peak {
    fn from(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl From<Peak> for [f64; 3] {
    fn from(p: Peak) -> Self {
        [p.theta, p.tau, p.magnitude]
    }
}
