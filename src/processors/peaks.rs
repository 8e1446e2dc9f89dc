//! Local maximum detection on a MUSIC spectrum.

use crate::core::spectrum::{AngleDelayGrid, Peak, Spectrum};
use crate::error::{PipelineError, Result};

/// Offsets of the 8-connected neighborhood.
const NEIGHBORS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Finds the strongest interior local maxima of a spectrum.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeakDetector;

impl PeakDetector {
    pub fn new() -> Self {
        Self
    }

    /// Grid indices of candidate peaks in row-major order.
    ///
    /// A cell is a candidate when it equals the maximum of its 3×3
    /// neighborhood, unless it belongs to an all-zero (unset) region. Border
    /// cells never qualify.
    pub fn local_maxima(&self, spectrum: &Spectrum) -> Vec<(usize, usize)> {
        let (rows, cols) = spectrum.shape();
        let mut candidates = Vec::new();
        if rows < 3 || cols < 3 {
            return candidates;
        }

        for i in 1..rows - 1 {
            for j in 1..cols - 1 {
                let value = spectrum.get(i, j);
                let neighbors = NEIGHBORS.iter().map(|&(di, dj)| {
                    spectrum.get((i as isize + di) as usize, (j as isize + dj) as usize)
                });

                let mut is_max = true;
                let mut all_zero = value == 0.0;
                for n in neighbors {
                    if n > value {
                        is_max = false;
                    }
                    if n != 0.0 {
                        all_zero = false;
                    }
                }

                if is_max ^ all_zero {
                    candidates.push((i, j));
                }
            }
        }

        candidates
    }

    /// Finds the strongest local maxima of a spectrum.
    ///
    /// # Arguments
    ///
    /// * `spectrum` - MUSIC spectrum in dB
    /// * `grid` - Grid the spectrum was sampled on
    /// * `count` - Maximum number of peaks, normally the estimated path count
    ///
    /// # Returns
    ///
    /// At most `count` peaks as `(theta, tau, magnitude)`, strongest first
    ///
    /// # Errors
    ///
    /// `Precondition` if the spectrum was not sampled on `grid`.
    pub fn detect(&self, spectrum: &Spectrum, grid: &AngleDelayGrid, count: usize) -> Result<Vec<Peak>> {
        if !spectrum.matches(grid) {
            return Err(PipelineError::Precondition(format!(
                "spectrum shape {:?} does not match grid {:?}",
                spectrum.shape(),
                grid.shape()
            )));
        }

        let mut peaks: Vec<Peak> = self
            .local_maxima(spectrum)
            .into_iter()
            .map(|(i, j)| Peak::new(grid.theta[i], grid.tau[j], spectrum.get(i, j)))
            .collect();

        peaks.sort_by(|a, b| b.magnitude.total_cmp(&a.magnitude));
        peaks.truncate(count);
        Ok(peaks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::spectrum::linspace;

    fn grid(rows: usize, cols: usize) -> AngleDelayGrid {
        AngleDelayGrid::new(linspace(0.0, 1.0, rows), linspace(0.0, 1e-8, cols))
    }

    /// Spectrum sloping down from `floor` at the origin, with bumps at the given cells.
    fn bumpy(rows: usize, cols: usize, floor: f64, bumps: &[(usize, usize, f64)]) -> Spectrum {
        let mut values: Vec<f64> = (0..rows * cols)
            .map(|idx| floor - 0.01 * (idx / cols + idx % cols) as f64)
            .collect();
        for &(i, j, v) in bumps {
            values[i * cols + j] = v;
        }
        Spectrum::new(rows, cols, values).unwrap()
    }

    #[test]
    fn test_returns_strongest_first() {
        let spectrum = bumpy(8, 8, -20.0, &[(2, 2, 5.0), (5, 5, 9.0), (2, 5, 7.0)]);
        let peaks = PeakDetector::new().detect(&spectrum, &grid(8, 8), 10).unwrap();

        let magnitudes: Vec<f64> = peaks.iter().map(|p| p.magnitude).collect();
        assert_eq!(magnitudes, vec![9.0, 7.0, 5.0]);
        for pair in peaks.windows(2) {
            assert!(pair[0].magnitude > pair[1].magnitude);
        }
    }

    #[test]
    fn test_count_bound() {
        let spectrum = bumpy(8, 8, -20.0, &[(2, 2, 5.0), (5, 5, 9.0), (2, 5, 7.0)]);
        let peaks = PeakDetector::new().detect(&spectrum, &grid(8, 8), 2).unwrap();
        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[0].magnitude, 9.0);

        let none = PeakDetector::new().detect(&spectrum, &grid(8, 8), 0).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_border_maxima_are_ignored() {
        let spectrum = bumpy(6, 6, -10.0, &[(0, 3, 50.0), (5, 5, 40.0), (3, 0, 30.0), (2, 3, 1.0)]);
        let peaks = PeakDetector::new().detect(&spectrum, &grid(6, 6), 10).unwrap();

        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].magnitude, 1.0);
    }

    #[test]
    fn test_peak_coordinates_come_from_grid() {
        let g = grid(5, 7);
        let spectrum = bumpy(5, 7, -3.0, &[(3, 4, 2.0)]);
        let peaks = PeakDetector::new().detect(&spectrum, &g, 1).unwrap();
        assert_eq!(peaks, vec![Peak::new(g.theta[3], g.tau[4], 2.0)]);
    }

    #[test]
    fn test_flat_zero_region_is_background() {
        let spectrum = Spectrum::new(6, 6, vec![0.0; 36]).unwrap();
        assert!(PeakDetector::new().local_maxima(&spectrum).is_empty());
    }

    #[test]
    fn test_zero_valued_peak_over_negative_floor() {
        let spectrum = bumpy(5, 5, -4.0, &[(2, 2, 0.0)]);
        assert_eq!(PeakDetector::new().local_maxima(&spectrum), vec![(2, 2)]);
    }

    #[test]
    fn test_small_spectrum_has_no_interior() {
        let spectrum = bumpy(2, 9, 1.0, &[(1, 4, 3.0)]);
        assert!(PeakDetector::new().local_maxima(&spectrum).is_empty());
    }

    #[test]
    fn test_grid_mismatch() {
        let spectrum = bumpy(4, 4, 0.0, &[]);
        let result = PeakDetector::new().detect(&spectrum, &grid(5, 4), 3);
        assert!(matches!(result, Err(PipelineError::Precondition(_))));
    }
}
