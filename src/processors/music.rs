//! MUSIC pseudo-spectrum over the (angle, delay) grid.
//!
//! The angle axis is split into `workers` contiguous blocks which are evaluated
//! on a bounded rayon pool. Blocks only read the noise subspace and the grid,
//! and the results are concatenated in block order.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::f64::consts::PI;

use super::subspace::NoiseSubspace;
use crate::config::{ArrayConfig, MusicConfig, SPEED_OF_LIGHT};
use crate::core::csi::{RecordKey, SUBCARRIER_COUNT, VIRTUAL_ARRAY_DIM, WINDOW_COUNT};
use crate::core::spectrum::{AngleDelayGrid, Spectrum};
use crate::core::storage::SpectrumStore;
use crate::error::{PipelineError, Result};

/// Store plus the keys a record is looked up and persisted under.
#[derive(Clone, Copy)]
pub struct SpectrumCache<'a> {
    pub store: &'a dyn SpectrumStore,
    pub lookup_key: Option<&'a RecordKey>,
    pub storage_key: Option<&'a RecordKey>,
}

/// Evaluates MUSIC spectra on a fixed-size worker pool.
pub struct MusicSpectrumEvaluator {
    array: ArrayConfig,
    workers: usize,
    pool: ThreadPool,
}

impl MusicSpectrumEvaluator {
    /// Builds the evaluator and its worker pool.
    ///
    /// # Errors
    ///
    /// `Precondition` for a zero worker count or an odd subcarrier count,
    /// `WorkerPool` if the threads cannot be spawned.
    pub fn new(array: &ArrayConfig, music: &MusicConfig) -> Result<Self> {
        if music.workers == 0 {
            return Err(PipelineError::Precondition(
                "MUSIC worker count must be positive".to_string(),
            ));
        }
        if SUBCARRIER_COUNT % 2 != 0 {
            return Err(PipelineError::Precondition(format!(
                "steering vectors need an even subcarrier count, got {}",
                SUBCARRIER_COUNT
            )));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(music.workers)
            .thread_name(|i| format!("music-{}", i))
            .build()?;

        Ok(Self {
            array: array.clone(),
            workers: music.workers,
            pool,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Phase rotation between adjacent antennas for a wave arriving at `theta`.
    pub fn phase_shift_due_to_aoa(&self, theta: f64) -> Complex64 {
        let phase = -2.0
            * PI
            * self.array.antenna_spacing_m
            * theta.sin()
            * self.array.channel_frequency_hz
            / SPEED_OF_LIGHT;
        Complex64::from_polar(1.0, phase)
    }

    /// Phase rotation between adjacent subcarriers for a path delayed by `tau` seconds.
    pub fn phase_shift_due_to_tof(&self, tau: f64) -> Complex64 {
        Complex64::from_polar(1.0, -2.0 * PI * self.array.subcarrier_spacing_hz * tau)
    }

    /// Virtual array response for one (angle, delay) hypothesis.
    ///
    /// Element `a * 15 + s` is `aoa^a * tof^s`, matching the row layout of the
    /// smoothed matrix.
    pub fn steering_vector(&self, theta: f64, tau: f64) -> DVector<Complex64> {
        let aoa = self.phase_shift_due_to_aoa(theta);
        let tof = self.phase_shift_due_to_tof(tau);

        let mut vector = DVector::from_element(VIRTUAL_ARRAY_DIM, Complex64::new(0.0, 0.0));
        let mut antenna_term = Complex64::new(1.0, 0.0);
        for pair in 0..VIRTUAL_ARRAY_DIM / WINDOW_COUNT {
            let mut element = antenna_term;
            for offset in 0..WINDOW_COUNT {
                vector[pair * WINDOW_COUNT + offset] = element;
                element *= tof;
            }
            antenna_term *= aoa;
        }
        vector
    }

    /// Pseudo-spectrum value in dB given the adjoint of the noise basis.
    fn value_db(&self, basis_adjoint: &DMatrix<Complex64>, theta: f64, tau: f64) -> f64 {
        let steering = self.steering_vector(theta, tau);
        let denominator = (basis_adjoint * steering).norm_squared().max(f64::MIN_POSITIVE);
        10.0 * (1.0 / denominator).log10()
    }

    /// Computes the spectrum for every grid point.
    ///
    /// # Errors
    ///
    /// `Precondition` if the angle count is not divisible by the worker count
    /// or the subspace dimension differs from the steering vector length;
    /// `NumericalDegenerate` if any value is not finite.
    pub fn evaluate(&self, subspace: &NoiseSubspace, grid: &AngleDelayGrid) -> Result<Spectrum> {
        let (theta_count, tau_count) = grid.shape();
        if theta_count == 0 || theta_count % self.workers != 0 {
            return Err(PipelineError::Precondition(format!(
                "{} angle samples cannot be split into {} equal blocks",
                theta_count, self.workers
            )));
        }
        if subspace.dim() != VIRTUAL_ARRAY_DIM {
            return Err(PipelineError::Precondition(format!(
                "noise subspace has {} rows, steering vectors have {}",
                subspace.dim(),
                VIRTUAL_ARRAY_DIM
            )));
        }

        let basis_adjoint = subspace.basis.adjoint();
        let block_len = theta_count / self.workers;
        let blocks: Vec<&[f64]> = grid.theta.chunks(block_len).collect();

        let results: Vec<Vec<f64>> = self.pool.install(|| {
            blocks
                .par_iter()
                .map(|thetas| {
                    let mut values = Vec::with_capacity(thetas.len() * tau_count);
                    for &theta in thetas.iter() {
                        for &tau in &grid.tau {
                            values.push(self.value_db(&basis_adjoint, theta, tau));
                        }
                    }
                    values
                })
                .collect()
        });

        let values: Vec<f64> = results.into_iter().flatten().collect();
        if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
            return Err(PipelineError::NumericalDegenerate(format!(
                "spectrum value at ({}, {}) is not finite",
                idx / tau_count,
                idx % tau_count
            )));
        }

        Spectrum::new(theta_count, tau_count, values)
    }

    /// Like [`evaluate`](Self::evaluate), but consults the cache first and
    /// persists freshly computed spectra.
    ///
    /// Unreadable or mis-shaped cached spectra are treated as misses. Failing
    /// to persist is logged and does not fail the record.
    pub fn evaluate_cached(
        &self,
        subspace: &NoiseSubspace,
        grid: &AngleDelayGrid,
        cache: Option<SpectrumCache<'_>>,
    ) -> Result<Spectrum> {
        let Some(cache) = cache else {
            return self.evaluate(subspace, grid);
        };

        if let Some(key) = cache.lookup_key {
            match cache.store.get(key) {
                Ok(Some(spectrum)) if spectrum.matches(grid) => {
                    log::debug!("spectrum cache hit for '{}'", key);
                    return Ok(spectrum);
                }
                Ok(Some(spectrum)) => {
                    log::warn!(
                        "cached spectrum for '{}' has shape {:?}, grid is {:?}; recomputing",
                        key,
                        spectrum.shape(),
                        grid.shape()
                    );
                }
                Ok(None) => log::debug!("spectrum cache miss for '{}'", key),
                Err(e) => log::warn!("spectrum cache read failed for '{}': {}; recomputing", key, e),
            }
        }

        let spectrum = self.evaluate(subspace, grid)?;

        if let Some(key) = cache.storage_key {
            if let Err(e) = cache.store.put(key, &spectrum) {
                log::warn!("failed to store spectrum for '{}': {}", key, e);
            }
        }

        Ok(spectrum)
    }
}
