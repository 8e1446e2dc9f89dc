//! Processing stages from raw CSI to scored clusters.

pub mod clustering;
pub mod filtering;
pub mod likelihood;
pub mod music;
pub mod peaks;
pub mod sanitizer;
pub mod smoothing;
pub mod subspace;

// Re-export key types for convenience
pub use clustering::{ClusterEstimator, ClusterStats, GaussianMixture, ScaleTransform};
pub use filtering::{Partition, PeakFilter};
pub use likelihood::{Cluster, LikelihoodScorer};
pub use music::{MusicSpectrumEvaluator, SpectrumCache};
pub use peaks::PeakDetector;
pub use sanitizer::{unwrap_phase, CsiSanitizer};
pub use smoothing::{SpatialSmoother, VirtualArrayMatrix};
pub use subspace::{NoiseSubspace, NoiseSubspaceEstimator};
