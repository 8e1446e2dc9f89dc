//! Gaussian mixture clustering of filtered peaks.
//!
//! Peaks are mapped onto unitless axes with [`ScaleTransform`], a full-covariance
//! mixture is fitted by expectation-maximization, and the per-component
//! statistics are mapped back to radians and seconds.

use std::collections::HashSet;
use std::f64::consts::PI;

use nalgebra::{Matrix2, Vector2};
use serde::Serialize;

use crate::config::{ClusteringConfig, ScalingConfig};
use crate::core::spectrum::Peak;
use crate::error::{PipelineError, Result};

/// Linear per-axis scaling between physical (theta, tau) and clustering space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleTransform {
    pub theta_scale: f64,
    pub tau_scale: f64,
}

impl ScaleTransform {
    pub fn new(scaling: &ScalingConfig) -> Self {
        Self {
            theta_scale: scaling.theta_scale,
            tau_scale: scaling.tau_scale,
        }
    }

    #[inline]
    fn factors(&self) -> Vector2<f64> {
        Vector2::new(self.theta_scale, self.tau_scale)
    }

    pub fn scale_point(&self, theta: f64, tau: f64) -> Vector2<f64> {
        Vector2::new(theta * self.theta_scale, tau * self.tau_scale)
    }

    pub fn scale_mean(&self, mean: &Vector2<f64>) -> Vector2<f64> {
        mean.component_mul(&self.factors())
    }

    pub fn unscale_mean(&self, mean: &Vector2<f64>) -> Vector2<f64> {
        mean.component_div(&self.factors())
    }

    /// `cov(aX, bY) = a·b·cov(X, Y)`
    pub fn scale_covariance(&self, cov: &Matrix2<f64>) -> Matrix2<f64> {
        let f = self.factors();
        cov.component_mul(&(f * f.transpose()))
    }

    pub fn unscale_covariance(&self, cov: &Matrix2<f64>) -> Matrix2<f64> {
        let f = self.factors();
        cov.component_div(&(f * f.transpose()))
    }
}

/// One mixture component in clustering space.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianComponent {
    /// Mixing proportion
    pub proportion: f64,
    pub mean: Vector2<f64>,
    pub covariance: Matrix2<f64>,
}

impl GaussianComponent {
    fn log_density(&self, point: &Vector2<f64>) -> Result<f64> {
        let det = self.covariance.determinant();
        let inverse = self.covariance.try_inverse().filter(|_| det > 0.0 && det.is_finite());
        let Some(inverse) = inverse else {
            return Err(PipelineError::NumericalDegenerate(format!(
                "component covariance is singular (det = {:e})",
                det
            )));
        };

        let diff = point - self.mean;
        let mahalanobis = (diff.transpose() * inverse * diff)[(0, 0)];
        Ok(-(2.0 * PI).ln() - 0.5 * det.ln() - 0.5 * mahalanobis)
    }
}

/// Full-covariance 2-D Gaussian mixture fitted by EM.
#[derive(Debug, Clone)]
pub struct GaussianMixture {
    components: Vec<GaussianComponent>,
    mean_log_likelihood: f64,
    iterations: usize,
}

impl GaussianMixture {
    /// Fits `k` full-covariance Gaussian components to `points`.
    ///
    /// # Arguments
    ///
    /// * `points` - Samples in the scaled (theta, tau) plane
    /// * `k` - Number of components
    /// * `config` - Iteration limit, tolerance and covariance regularization
    ///
    /// # Returns
    ///
    /// The converged mixture
    ///
    /// Initialization is deterministic: farthest-point seeding followed by
    /// Lloyd iterations, whose hard assignment seeds the first M-step.
    ///
    /// # Errors
    ///
    /// `Precondition` if `k` is zero or exceeds the point count,
    /// `NumericalDegenerate` if EM does not converge within
    /// `config.max_iterations` or produces unusable parameters.
    pub fn fit(points: &[Vector2<f64>], k: usize, config: &ClusteringConfig) -> Result<Self> {
        if k == 0 || k > points.len() {
            return Err(PipelineError::Precondition(format!(
                "cannot fit {} components to {} points",
                k,
                points.len()
            )));
        }

        let labels = kmeans_labels(points, k, config.max_iterations);
        let mut resp: Vec<Vec<f64>> = labels
            .iter()
            .map(|&label| (0..k).map(|c| if c == label { 1.0 } else { 0.0 }).collect())
            .collect();

        let mut mixture = Self {
            components: Vec::with_capacity(k),
            mean_log_likelihood: f64::NEG_INFINITY,
            iterations: 0,
        };
        mixture.m_step(points, &resp, config.covariance_regularization);

        let mut converged = false;
        for iteration in 1..=config.max_iterations {
            let previous = mixture.mean_log_likelihood;
            let (log_resp, mean_ll) = mixture.e_step(points)?;
            resp = log_resp
                .into_iter()
                .map(|row| row.into_iter().map(f64::exp).collect())
                .collect();
            mixture.m_step(points, &resp, config.covariance_regularization);
            mixture.mean_log_likelihood = mean_ll;
            mixture.iterations = iteration;

            if (mean_ll - previous).abs() < config.tolerance {
                converged = true;
                break;
            }
        }

        if !converged {
            return Err(PipelineError::NumericalDegenerate(format!(
                "mixture fit did not converge in {} iterations",
                config.max_iterations
            )));
        }

        log::debug!(
            "mixture of {} components converged after {} iterations (mean log-likelihood {:.4})",
            k,
            mixture.iterations,
            mixture.mean_log_likelihood
        );
        Ok(mixture)
    }

    pub fn components(&self) -> &[GaussianComponent] {
        &self.components
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn mean_log_likelihood(&self) -> f64 {
        self.mean_log_likelihood
    }

    /// Posterior probability of each component for each point (rows sum to 1).
    pub fn predict_proba(&self, points: &[Vector2<f64>]) -> Result<Vec<Vec<f64>>> {
        let (log_resp, _) = self.e_step(points)?;
        Ok(log_resp
            .into_iter()
            .map(|row| row.into_iter().map(f64::exp).collect())
            .collect())
    }

    /// Log responsibilities and the mean log-likelihood of the data.
    fn e_step(&self, points: &[Vector2<f64>]) -> Result<(Vec<Vec<f64>>, f64)> {
        let mut total = 0.0;
        let mut log_resp = Vec::with_capacity(points.len());

        for point in points {
            let mut row = Vec::with_capacity(self.components.len());
            for component in &self.components {
                row.push(component.proportion.ln() + component.log_density(point)?);
            }
            let norm = log_sum_exp(&row);
            if !norm.is_finite() {
                return Err(PipelineError::NumericalDegenerate(
                    "point has zero likelihood under every component".to_string(),
                ));
            }
            row.iter_mut().for_each(|v| *v -= norm);
            total += norm;
            log_resp.push(row);
        }

        Ok((log_resp, total / points.len() as f64))
    }

    fn m_step(&mut self, points: &[Vector2<f64>], resp: &[Vec<f64>], regularization: f64) {
        let n = points.len() as f64;
        let k = resp.first().map_or(0, |r| r.len());

        self.components = (0..k)
            .map(|c| {
                let nk = resp.iter().map(|r| r[c]).sum::<f64>() + 10.0 * f64::EPSILON;
                let mean = points
                    .iter()
                    .zip(resp)
                    .fold(Vector2::zeros(), |acc, (p, r)| acc + p * r[c])
                    / nk;
                let mut covariance = points
                    .iter()
                    .zip(resp)
                    .fold(Matrix2::zeros(), |acc, (p, r)| {
                        let d = p - mean;
                        acc + d * d.transpose() * r[c]
                    })
                    / nk;
                covariance[(0, 0)] += regularization;
                covariance[(1, 1)] += regularization;

                GaussianComponent {
                    proportion: nk / n,
                    mean,
                    covariance,
                }
            })
            .collect();
    }
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Hard k-means labels with farthest-point seeding.
fn kmeans_labels(points: &[Vector2<f64>], k: usize, max_iterations: usize) -> Vec<usize> {
    let mut centers = vec![points[0]];
    while centers.len() < k {
        let farthest = points
            .iter()
            .map(|p| {
                centers
                    .iter()
                    .map(|c| (p - c).norm_squared())
                    .fold(f64::INFINITY, f64::min)
            })
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, d)| if d > best.1 { (i, d) } else { best });
        centers.push(points[farthest.0]);
    }

    let nearest = |p: &Vector2<f64>, centers: &[Vector2<f64>]| {
        centers
            .iter()
            .enumerate()
            .map(|(i, c)| (i, (p - c).norm_squared()))
            .fold((0, f64::INFINITY), |best, (i, d)| if d < best.1 { (i, d) } else { best })
            .0
    };

    let mut labels: Vec<usize> = points.iter().map(|p| nearest(p, &centers)).collect();
    for _ in 0..max_iterations {
        for (c, center) in centers.iter_mut().enumerate() {
            let members: Vec<&Vector2<f64>> = points
                .iter()
                .zip(&labels)
                .filter(|(_, &l)| l == c)
                .map(|(p, _)| p)
                .collect();
            // An emptied cluster keeps its previous center
            if !members.is_empty() {
                *center = members.iter().fold(Vector2::zeros(), |acc, p| acc + *p)
                    / members.len() as f64;
            }
        }

        let next: Vec<usize> = points.iter().map(|p| nearest(p, &centers)).collect();
        if next == labels {
            break;
        }
        labels = next;
    }

    labels
}

/// Per-cluster statistics in physical units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterStats {
    /// Mean angle of arrival (radians)
    pub mean_theta: f64,
    /// Mean time of flight (seconds)
    pub mean_tau: f64,
    /// Covariance over (theta, tau), row-major
    pub covariance: [[f64; 2]; 2],
    /// Sum of responsibilities, not normalized
    pub weight: f64,
    /// Responsibility-weighted mean peak magnitude (dB)
    pub height: f64,
}

/// Fits mixture clusters over filtered peaks.
#[derive(Debug, Clone)]
pub struct ClusterEstimator {
    config: ClusteringConfig,
    transform: ScaleTransform,
}

impl ClusterEstimator {
    pub fn new(config: &ClusteringConfig, scaling: &ScalingConfig) -> Self {
        Self {
            config: config.clone(),
            transform: ScaleTransform::new(scaling),
        }
    }

    pub fn transform(&self) -> &ScaleTransform {
        &self.transform
    }

    /// Number of components fitted for these peaks.
    ///
    /// Bounded by the number of distinct (theta, tau) positions rather than the
    /// raw peak count, so that duplicated peaks yield a single cluster.
    pub fn component_count(&self, peaks: &[Peak]) -> usize {
        let distinct: HashSet<(u64, u64)> = peaks
            .iter()
            .map(|p| (p.theta.to_bits(), p.tau.to_bits()))
            .collect();
        self.config.max_components.min(distinct.len())
    }

    /// # Errors
    ///
    /// `Precondition` for an empty peak set, `NumericalDegenerate` when the
    /// mixture cannot be fitted.
    pub fn estimate(&self, peaks: &[Peak]) -> Result<Vec<ClusterStats>> {
        if peaks.is_empty() {
            return Err(PipelineError::Precondition(
                "cannot cluster an empty peak set".to_string(),
            ));
        }

        let points: Vec<Vector2<f64>> = peaks
            .iter()
            .map(|p| self.transform.scale_point(p.theta, p.tau))
            .collect();
        let k = self.component_count(peaks);
        let mixture = GaussianMixture::fit(&points, k, &self.config)?;
        let resp = mixture.predict_proba(&points)?;

        let mut clusters = Vec::with_capacity(k);
        for (c, component) in mixture.components().iter().enumerate() {
            let weight: f64 = resp.iter().map(|r| r[c]).sum();
            if weight <= 0.0 {
                log::warn!("mixture component {} has no support; skipping", c);
                continue;
            }
            let height = resp
                .iter()
                .zip(peaks)
                .map(|(r, p)| r[c] * p.magnitude)
                .sum::<f64>()
                / weight;

            let mean = self.transform.unscale_mean(&component.mean);
            let cov = self.transform.unscale_covariance(&component.covariance);
            let stats = ClusterStats {
                mean_theta: mean[0],
                mean_tau: mean[1],
                covariance: [[cov[(0, 0)], cov[(0, 1)]], [cov[(1, 0)], cov[(1, 1)]]],
                weight,
                height,
            };

            let finite = [stats.mean_theta, stats.mean_tau, stats.weight, stats.height]
                .iter()
                .chain(stats.covariance.iter().flatten())
                .all(|v| v.is_finite());
            if !finite {
                return Err(PipelineError::NumericalDegenerate(format!(
                    "cluster {} has non-finite statistics",
                    c
                )));
            }
            clusters.push(stats);
        }

        log::info!("clustering: {} peaks -> {} clusters", peaks.len(), clusters.len());
        Ok(clusters)
    }
}
