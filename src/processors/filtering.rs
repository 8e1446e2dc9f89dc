//! Outlier removal for peaks pooled across a batch.
//!
//! Two independent stages, each partitioning its input by index:
//! - the individual filter drops peaks with no near neighbor in theta or tau
//! - the spread filter diffuses a unit value over a proximity graph and drops
//!   peaks that end below the mean

use serde::Serialize;

use crate::config::{PeakFilterConfig, ScalingConfig};
use crate::core::spectrum::Peak;

/// Indices of an input sequence split into kept and dropped entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub retained: Vec<usize>,
    pub removed: Vec<usize>,
}

impl Partition {
    fn from_mask(removed_mask: &[bool]) -> Self {
        let mut partition = Self::default();
        for (idx, &removed) in removed_mask.iter().enumerate() {
            if removed {
                partition.removed.push(idx);
            } else {
                partition.retained.push(idx);
            }
        }
        partition
    }

    /// Re-expresses indices local to `subset` as indices of the parent sequence.
    fn lift(self, subset: &[usize]) -> Self {
        Self {
            retained: self.retained.into_iter().map(|i| subset[i]).collect(),
            removed: self.removed.into_iter().map(|i| subset[i]).collect(),
        }
    }

    /// Picks the given indices out of `items`.
    pub fn select<T: Clone>(indices: &[usize], items: &[T]) -> Vec<T> {
        indices.iter().map(|&i| items[i].clone()).collect()
    }
}

/// Two-stage peak outlier filter.
#[derive(Debug, Clone)]
pub struct PeakFilter {
    config: PeakFilterConfig,
    scaling: ScalingConfig,
}

impl PeakFilter {
    pub fn new(config: &PeakFilterConfig, scaling: &ScalingConfig) -> Self {
        Self {
            config: config.clone(),
            scaling: *scaling,
        }
    }

    /// Removes peaks whose nearest other peak is too far in theta or in tau.
    ///
    /// A lone peak has no neighbor at all and is always removed.
    pub fn individual_filter(&self, peaks: &[Peak]) -> Partition {
        let mask: Vec<bool> = peaks
            .iter()
            .enumerate()
            .map(|(i, peak)| {
                let mut nearest_theta = f64::INFINITY;
                let mut nearest_tau = f64::INFINITY;
                for (j, other) in peaks.iter().enumerate() {
                    if i == j {
                        continue;
                    }
                    nearest_theta = nearest_theta.min((peak.theta - other.theta).abs());
                    nearest_tau = nearest_tau.min((peak.tau - other.tau).abs());
                }
                nearest_theta > self.config.individual_theta_limit
                    || nearest_tau > self.config.individual_tau_limit
            })
            .collect();

        Partition::from_mask(&mask)
    }

    /// Manhattan distance on the scaled axes.
    pub fn scaled_distance(&self, a: &Peak, b: &Peak) -> f64 {
        (a.theta - b.theta).abs() * self.scaling.theta_scale
            + (a.tau - b.tau).abs() * self.scaling.tau_scale
    }

    /// Value each peak holds after the diffusion rounds.
    ///
    /// Every peak starts with 1.0. In each round it keeps half of its value and
    /// sends the other half, times the edge weight, to each neighbor closer than
    /// `spread_distance_limit`. The weight of edge `i -> j` is
    /// `(max_i - d_ij) / max_i`, where `max_i` is the largest distance from `i`
    /// to any peak.
    ///
    /// # Arguments
    ///
    /// * `peaks` - Peaks to diffuse over
    ///
    /// # Returns
    ///
    /// One value per input peak, in input order
    pub fn diffusion_values(&self, peaks: &[Peak]) -> Vec<f64> {
        let n = peaks.len();
        let distances: Vec<Vec<f64>> = peaks
            .iter()
            .map(|a| peaks.iter().map(|b| self.scaled_distance(a, b)).collect())
            .collect();

        // Row i holds the share of peak i's outgoing value sent to each neighbor
        let weights: Vec<Vec<f64>> = distances
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let max_distance = row.iter().copied().fold(0.0, f64::max);
                let proximity: Vec<f64> = row
                    .iter()
                    .enumerate()
                    .map(|(j, &d)| {
                        if i != j && d < self.config.spread_distance_limit {
                            max_distance - d
                        } else {
                            0.0
                        }
                    })
                    .collect();

                // Scaled by the largest attainable proximity, a neighbor at distance 0
                if proximity.iter().sum::<f64>() > 0.0 {
                    proximity.iter().map(|p| p / max_distance).collect()
                } else {
                    vec![0.0; n]
                }
            })
            .collect();

        let mut values = vec![1.0; n];
        for _ in 0..self.config.diffusion_rounds {
            let halved: Vec<f64> = values.iter().map(|v| v / 2.0).collect();
            let mut next = halved.clone();
            for (i, row) in weights.iter().enumerate() {
                for (j, w) in row.iter().enumerate() {
                    next[j] += halved[i] * w;
                }
            }
            values = next;
        }

        log::debug!("spread filter values: {:?}", values);
        values
    }

    /// Removes peaks whose diffused value ends strictly below the mean.
    pub fn spread_filter(&self, peaks: &[Peak]) -> Partition {
        if peaks.is_empty() {
            return Partition::default();
        }

        let values = self.diffusion_values(peaks);
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let mask: Vec<bool> = values.iter().map(|&v| v < mean).collect();
        Partition::from_mask(&mask)
    }

    /// Runs the individual filter, then the spread filter on its survivors.
    ///
    /// # Arguments
    ///
    /// * `peaks` - Peaks pooled from every successful record of a batch
    ///
    /// # Returns
    ///
    /// A partition whose indices refer to `peaks`. Removed indices of both
    /// stages are merged and sorted.
    pub fn filter(&self, peaks: &[Peak]) -> Partition {
        let individual = self.individual_filter(peaks);
        let survivors = Partition::select(&individual.retained, peaks);
        let spread = self.spread_filter(&survivors).lift(&individual.retained);

        let mut removed = individual.removed;
        removed.extend(spread.removed);
        removed.sort_unstable();

        log::info!(
            "peak filter: {} in, {} retained, {} removed",
            peaks.len(),
            spread.retained.len(),
            removed.len()
        );

        Partition {
            retained: spread.retained,
            removed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SPEED_OF_LIGHT;

    fn filter() -> PeakFilter {
        PeakFilter::new(&PeakFilterConfig::default(), &ScalingConfig::default())
    }

    fn filter_with_theta_limit(limit: f64) -> PeakFilter {
        PeakFilter::new(
            &PeakFilterConfig {
                individual_theta_limit: limit,
                ..PeakFilterConfig::default()
            },
            &ScalingConfig::default(),
        )
    }

    fn ns(t: f64) -> f64 {
        t * 1e-9
    }

    #[test]
    fn test_isolated_theta_point_removed() {
        let peaks = vec![
            Peak::new(0.50, ns(5.0), 10.0),
            Peak::new(0.52, ns(5.1), 10.0),
            Peak::new(0.49, ns(4.9), 10.0),
            Peak::new(2.50, ns(5.0), 10.0),
        ];
        let partition = filter_with_theta_limit(0.5).individual_filter(&peaks);
        assert_eq!(partition.removed, vec![3]);
        assert_eq!(partition.retained, vec![0, 1, 2]);
    }

    #[test]
    fn test_isolated_tau_point_removed() {
        let limit = 2.0 / SPEED_OF_LIGHT;
        let peaks = vec![
            Peak::new(0.1, 0.0, 1.0),
            Peak::new(0.1, limit * 0.5, 1.0),
            Peak::new(0.1, limit * 4.0, 1.0),
        ];
        let partition = filter().individual_filter(&peaks);
        assert_eq!(partition.removed, vec![2]);
    }

    #[test]
    fn test_single_peak_is_isolated() {
        let partition = filter().individual_filter(&[Peak::new(0.0, 0.0, 1.0)]);
        assert_eq!(partition.removed, vec![0]);
        assert!(partition.retained.is_empty());
    }

    #[test]
    fn test_duplicate_peaks_support_each_other() {
        let peak = Peak::new(0.3, ns(2.0), 4.0);
        let partition = filter().individual_filter(&[peak, peak]);
        assert_eq!(partition.retained, vec![0, 1]);
    }

    #[test]
    fn test_spread_filter_empty() {
        assert_eq!(filter().spread_filter(&[]), Partition::default());
    }

    #[test]
    fn test_spread_filter_keeps_dense_group() {
        // Peaks 0-3 all lie within the spread limit of each other; peak 4 only
        // reaches peak 3
        let peaks = vec![
            Peak::new(0.00, 0.0, 1.0),
            Peak::new(0.05, 0.0, 1.0),
            Peak::new(0.10, 0.0, 1.0),
            Peak::new(1.00, 0.0, 1.0),
            Peak::new(1.90, 0.0, 1.0),
        ];
        let values = filter().diffusion_values(&peaks);
        let expected = [3.2330, 3.3153, 3.3373, 2.7006, 0.2738];
        for (value, expected) in values.iter().zip(expected) {
            assert!((value - expected).abs() < 1e-3, "{} vs {}", value, expected);
        }

        let partition = filter().spread_filter(&peaks);
        assert_eq!(partition.removed, vec![4]);
        assert_eq!(partition.retained, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_diffusion_values_three_peaks() {
        // Scaled distances: 0-1 is within the limit, 2 is out of reach of both.
        // Weights: w01 = (3.0 - 0.5) / 3.0, w10 = (2.5 - 0.5) / 2.5
        let peaks = vec![
            Peak::new(0.0, 0.0, 1.0),
            Peak::new(0.5, 0.0, 1.0),
            Peak::new(3.0, 0.0, 1.0),
        ];
        let values = filter().diffusion_values(&peaks);
        assert!((values[0] - 89.0 / 120.0).abs() < 1e-12);
        assert!((values[1] - 109.0 / 144.0).abs() < 1e-12);
        assert!((values[2] - 0.125).abs() < 1e-12);

        let partition = filter().spread_filter(&peaks);
        assert_eq!(partition.removed, vec![2]);
    }

    #[test]
    fn test_spread_filter_without_neighbors_retains_all() {
        let peaks = vec![
            Peak::new(0.0, 0.0, 1.0),
            Peak::new(3.0, 0.0, 1.0),
            Peak::new(6.0, 0.0, 1.0),
        ];
        let values = filter().diffusion_values(&peaks);
        assert!(values.iter().all(|v| (v - 0.125).abs() < 1e-12));
        assert_eq!(filter().spread_filter(&peaks).retained, vec![0, 1, 2]);
    }

    #[test]
    fn test_filter_indices_refer_to_input() {
        let peaks = vec![
            Peak::new(0.50, ns(5.0), 10.0),
            Peak::new(2.50, ns(5.0), 10.0),
            Peak::new(0.52, ns(5.1), 10.0),
            Peak::new(0.49, ns(4.9), 10.0),
        ];
        let partition = filter_with_theta_limit(0.5).filter(&peaks);

        assert!(partition.removed.contains(&1));
        assert!(!partition.retained.contains(&1));
        let mut all: Vec<usize> = partition
            .retained
            .iter()
            .chain(&partition.removed)
            .copied()
            .collect();
        all.sort_unstable();
        assert_eq!(all, vec![0, 1, 2, 3]);
    }
}
