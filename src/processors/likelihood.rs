//! Heuristic plausibility score for clusters.

use serde::Serialize;

use super::clustering::ClusterStats;
use crate::config::LikelihoodConfig;

/// A cluster together with its score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    #[serde(flatten)]
    pub stats: ClusterStats,
    pub likelihood: f64,
}

/// Scores clusters by support, compactness and time of flight.
///
/// `exp(w_points·weight/N − w_theta·var_theta − w_tau·var_tau − w_tof·mean_tau)`
/// where `N` is the number of filtered peaks. The score only ranks clusters
/// of one batch; it is not a probability.
#[derive(Debug, Clone)]
pub struct LikelihoodScorer {
    config: LikelihoodConfig,
}

impl LikelihoodScorer {
    pub fn new(config: &LikelihoodConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn score(&self, stats: &ClusterStats, total_peaks: usize) -> f64 {
        let support = if total_peaks == 0 {
            0.0
        } else {
            stats.weight / total_peaks as f64
        };

        (self.config.weight_points * support
            - self.config.weight_theta_variance * stats.covariance[0][0]
            - self.config.weight_tau_variance * stats.covariance[1][1]
            - self.config.weight_small_tof * stats.mean_tau)
            .exp()
    }

    /// Scores every cluster and orders them by likelihood, highest first.
    pub fn rank(&self, clusters: Vec<ClusterStats>, total_peaks: usize) -> Vec<Cluster> {
        let mut scored: Vec<Cluster> = clusters
            .into_iter()
            .map(|stats| {
                let likelihood = self.score(&stats, total_peaks);
                Cluster { stats, likelihood }
            })
            .collect();
        scored.sort_by(|a, b| b.likelihood.total_cmp(&a.likelihood));
        scored
    }
}

impl Default for LikelihoodScorer {
    fn default() -> Self {
        Self::new(&LikelihoodConfig::default())
    }
}
