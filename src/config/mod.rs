//! Configuration types for the AoA/ToF estimation pipeline.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::Path;

/// Speed of light in vacuum (m/s).
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Physical parameters of the receiving antenna array and channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayConfig {
    /// Channel center frequency in Hz
    #[serde(default = "default_channel_frequency")]
    pub channel_frequency_hz: f64,

    /// Distance between adjacent antennas in meters
    #[serde(default = "default_antenna_spacing")]
    pub antenna_spacing_m: f64,

    /// Frequency spacing between adjacent reported subcarriers in Hz
    #[serde(default = "default_subcarrier_spacing")]
    pub subcarrier_spacing_hz: f64,
}

fn default_channel_frequency() -> f64 {
    2.437e9 // channel 6
}

fn default_antenna_spacing() -> f64 {
    0.084
}

fn default_subcarrier_spacing() -> f64 {
    312.5e3
}

impl Default for ArrayConfig {
    fn default() -> Self {
        Self {
            channel_frequency_hz: default_channel_frequency(),
            antenna_spacing_m: default_antenna_spacing(),
            subcarrier_spacing_hz: default_subcarrier_spacing(),
        }
    }
}

impl ArrayConfig {
    /// Carrier wavelength in meters.
    pub fn wavelength(&self) -> f64 {
        SPEED_OF_LIGHT / self.channel_frequency_hz
    }
}

/// Angle/delay search grid for the MUSIC pseudo-spectrum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Number of angle samples
    #[serde(default = "default_theta_samples")]
    pub theta_samples: usize,

    /// Lowest angle in radians
    #[serde(default = "default_theta_min")]
    pub theta_min: f64,

    /// Highest angle in radians (inclusive)
    #[serde(default = "default_theta_max")]
    pub theta_max: f64,

    /// Number of delay samples
    #[serde(default = "default_tau_samples")]
    pub tau_samples: usize,

    /// Delay half-extent expressed as a path length in meters; the grid
    /// spans `[-extent / c, extent / c]` seconds
    #[serde(default = "default_tau_extent")]
    pub tau_extent_m: f64,
}

fn default_theta_samples() -> usize {
    92
}

fn default_theta_min() -> f64 {
    -PI
}

fn default_theta_max() -> f64 {
    PI
}

fn default_tau_samples() -> usize {
    100
}

fn default_tau_extent() -> f64 {
    20.0
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            theta_samples: default_theta_samples(),
            theta_min: default_theta_min(),
            theta_max: default_theta_max(),
            tau_samples: default_tau_samples(),
            tau_extent_m: default_tau_extent(),
        }
    }
}

/// CSI phase sanitization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizerConfig {
    /// Whether to remove the linear phase slope caused by the sampling time offset
    #[serde(default = "default_true")]
    pub remove_linear_phase: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            remove_linear_phase: true,
        }
    }
}

/// Noise subspace estimation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubspaceConfig {
    /// Upper bound on the number of multipath components considered
    #[serde(default = "default_max_paths")]
    pub max_paths: usize,

    /// Relative tolerance for imaginary residue / asymmetry of the covariance
    #[serde(default = "default_hermitian_tolerance")]
    pub hermitian_tolerance: f64,
}

fn default_max_paths() -> usize {
    9
}

fn default_hermitian_tolerance() -> f64 {
    1e-9
}

impl Default for SubspaceConfig {
    fn default() -> Self {
        Self {
            max_paths: default_max_paths(),
            hermitian_tolerance: default_hermitian_tolerance(),
        }
    }
}

/// MUSIC spectrum evaluation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicConfig {
    /// Worker threads; the angle grid is split into this many contiguous blocks
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_workers() -> usize {
    4
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

/// Normalization factors mapping (theta, tau) onto comparable unitless axes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScalingConfig {
    /// Multiplier applied to theta (radians)
    #[serde(default = "default_theta_scale")]
    pub theta_scale: f64,

    /// Multiplier applied to tau (seconds)
    #[serde(default = "default_tau_scale")]
    pub tau_scale: f64,
}

fn default_theta_scale() -> f64 {
    1.0 / (2.0 * PI)
}

fn default_tau_scale() -> f64 {
    SPEED_OF_LIGHT / 40.0
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            theta_scale: default_theta_scale(),
            tau_scale: default_tau_scale(),
        }
    }
}

/// Outlier removal settings for pooled peaks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeakFilterConfig {
    /// Maximum distance in theta to the nearest other peak
    #[serde(default = "default_individual_theta_limit")]
    pub individual_theta_limit: f64,

    /// Maximum distance in tau (seconds) to the nearest other peak
    #[serde(default = "default_individual_tau_limit")]
    pub individual_tau_limit: f64,

    /// Scaled Manhattan distance below which two peaks support each other
    #[serde(default = "default_spread_distance_limit")]
    pub spread_distance_limit: f64,

    /// Number of diffusion rounds in the spread filter
    #[serde(default = "default_diffusion_rounds")]
    pub diffusion_rounds: usize,
}

fn default_individual_theta_limit() -> f64 {
    20.0
}

fn default_individual_tau_limit() -> f64 {
    2.0 / SPEED_OF_LIGHT
}

fn default_spread_distance_limit() -> f64 {
    0.2
}

fn default_diffusion_rounds() -> usize {
    3
}

impl Default for PeakFilterConfig {
    fn default() -> Self {
        Self {
            individual_theta_limit: default_individual_theta_limit(),
            individual_tau_limit: default_individual_tau_limit(),
            spread_distance_limit: default_spread_distance_limit(),
            diffusion_rounds: default_diffusion_rounds(),
        }
    }
}

/// Gaussian mixture clustering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Upper bound on mixture components
    #[serde(default = "default_max_components")]
    pub max_components: usize,

    /// Maximum EM iterations before the fit is declared non-convergent
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Convergence threshold on the change of mean log-likelihood
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Value added to covariance diagonals to keep them invertible
    #[serde(default = "default_covariance_regularization")]
    pub covariance_regularization: f64,
}

fn default_max_components() -> usize {
    5
}

fn default_max_iterations() -> usize {
    100
}

fn default_tolerance() -> f64 {
    1e-3
}

fn default_covariance_regularization() -> f64 {
    1e-6
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            max_components: default_max_components(),
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
            covariance_regularization: default_covariance_regularization(),
        }
    }
}

/// Weights of the cluster likelihood heuristic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LikelihoodConfig {
    #[serde(default = "default_weight_points")]
    pub weight_points: f64,

    #[serde(default = "default_weight_theta_variance")]
    pub weight_theta_variance: f64,

    #[serde(default = "default_weight_tau_variance")]
    pub weight_tau_variance: f64,

    /// Penalty per second of mean time of flight
    #[serde(default = "default_weight_small_tof")]
    pub weight_small_tof: f64,
}

fn default_weight_points() -> f64 {
    200.0
}

fn default_weight_theta_variance() -> f64 {
    30000.0 / (2.0 * PI)
}

fn default_weight_tau_variance() -> f64 {
    SPEED_OF_LIGHT / 20.0
}

fn default_weight_small_tof() -> f64 {
    SPEED_OF_LIGHT / 20.0 * 20.0
}

impl Default for LikelihoodConfig {
    fn default() -> Self {
        Self {
            weight_points: default_weight_points(),
            weight_theta_variance: default_weight_theta_variance(),
            weight_tau_variance: default_weight_tau_variance(),
            weight_small_tof: default_weight_small_tof(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub array: ArrayConfig,

    #[serde(default)]
    pub grid: GridConfig,

    #[serde(default)]
    pub sanitizer: SanitizerConfig,

    #[serde(default)]
    pub subspace: SubspaceConfig,

    #[serde(default)]
    pub music: MusicConfig,

    #[serde(default)]
    pub scaling: ScalingConfig,

    #[serde(default)]
    pub peak_filter: PeakFilterConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub likelihood: LikelihoodConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
