//! Batch orchestration: CSI records in, scored multipath clusters out.
//!
//! Each record runs sanitize → smooth → noise subspace → MUSIC → peak
//! detection on its own. Peaks of all successful records are pooled, filtered
//! and clustered once per batch.

use serde::Serialize;

use crate::config::PipelineConfig;
use crate::core::csi::{CalibrationId, CsiBatch, CsiRecord, RecordKey};
use crate::core::spectrum::{AngleDelayGrid, Peak, Spectrum};
use crate::core::storage::SpectrumStore;
use crate::error::{PipelineError, Result};
use crate::processors::{
    Cluster, ClusterEstimator, CsiSanitizer, LikelihoodScorer, MusicSpectrumEvaluator,
    NoiseSubspaceEstimator, Partition, PeakDetector, PeakFilter, SpatialSmoother, SpectrumCache,
};

/// Outcome of one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Ok,
    Failed(String),
}

/// Per-record part of the batch report.
#[derive(Debug, Clone, Serialize)]
pub struct RecordReport {
    pub index: usize,
    pub key: Option<RecordKey>,
    pub status: RecordStatus,
    pub computed_paths: Option<usize>,
    /// Peaks found in this record's spectrum, strongest first
    pub detected_peaks: Vec<Peak>,
    /// Subset of `detected_peaks` that survived batch filtering
    pub retained_peaks: Vec<Peak>,
}

impl RecordReport {
    pub fn is_ok(&self) -> bool {
        self.status == RecordStatus::Ok
    }
}

/// Everything a batch run produces.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub calibration: CalibrationId,
    pub records: Vec<RecordReport>,
    pub filtered_peaks: Vec<Peak>,
    pub removed_peaks: Vec<Peak>,
    /// Sorted by likelihood, highest first
    pub clusters: Vec<Cluster>,
}

impl BatchReport {
    pub fn failed_records(&self) -> usize {
        self.records.iter().filter(|r| !r.is_ok()).count()
    }

    /// Most plausible cluster, if any.
    pub fn best_cluster(&self) -> Option<&Cluster> {
        self.clusters.first()
    }
}

/// Intermediate results of a single record.
#[derive(Debug, Clone)]
pub struct RecordAnalysis {
    pub computed_paths: usize,
    pub spectrum: Spectrum,
    pub peaks: Vec<Peak>,
}

/// All processing stages built from one configuration.
pub struct Pipeline {
    config: PipelineConfig,
    grid: AngleDelayGrid,
    sanitizer: CsiSanitizer,
    smoother: SpatialSmoother,
    subspace: NoiseSubspaceEstimator,
    music: MusicSpectrumEvaluator,
    detector: PeakDetector,
    filter: PeakFilter,
    clusterer: ClusterEstimator,
    scorer: LikelihoodScorer,
}

impl Pipeline {
    /// Builds every stage, including the MUSIC worker pool.
    ///
    /// # Errors
    ///
    /// `Precondition` if the grid cannot be split across the workers,
    /// `WorkerPool` if the pool cannot be created.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let grid = AngleDelayGrid::from_config(&config.grid);
        let (theta_count, tau_count) = grid.shape();
        if theta_count == 0 || tau_count == 0 {
            return Err(PipelineError::Precondition(
                "search grid must have at least one angle and one delay sample".to_string(),
            ));
        }
        if config.music.workers == 0 || theta_count % config.music.workers != 0 {
            return Err(PipelineError::Precondition(format!(
                "{} angle samples are not divisible by {} workers",
                theta_count, config.music.workers
            )));
        }

        let music = MusicSpectrumEvaluator::new(&config.array, &config.music)?;

        Ok(Self {
            sanitizer: CsiSanitizer::new(&config.sanitizer),
            smoother: SpatialSmoother::new(),
            subspace: NoiseSubspaceEstimator::new(&config.subspace),
            music,
            detector: PeakDetector::new(),
            filter: PeakFilter::new(&config.peak_filter, &config.scaling),
            clusterer: ClusterEstimator::new(&config.clustering, &config.scaling),
            scorer: LikelihoodScorer::new(&config.likelihood),
            grid,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn grid(&self) -> &AngleDelayGrid {
        &self.grid
    }

    /// Runs the per-record stages.
    pub fn analyze_record(
        &self,
        record: &CsiRecord,
        cache: Option<SpectrumCache<'_>>,
    ) -> Result<RecordAnalysis> {
        let sanitized = self.sanitizer.sanitize(record);
        let smoothed = self.smoother.smooth(&sanitized);
        let subspace = self.subspace.estimate(&smoothed)?;
        let spectrum = self.music.evaluate_cached(&subspace, &self.grid, cache)?;
        let peaks = self
            .detector
            .detect(&spectrum, &self.grid, subspace.computed_paths)?;

        Ok(RecordAnalysis {
            computed_paths: subspace.computed_paths,
            spectrum,
            peaks,
        })
    }

    /// Processes a batch.
    ///
    /// Records failing with a numerical error are reported as failed and left
    /// out of the pooled peaks. Precondition errors, and any clustering
    /// failure, fail the whole batch.
    pub fn run(&self, batch: &CsiBatch, store: Option<&dyn SpectrumStore>) -> Result<BatchReport> {
        let lookup = store.is_some() && batch.lookup_enabled();
        let storage = store.is_some() && batch.storage_enabled();
        if store.is_some() && !batch.lookup_keys.is_empty() && !lookup {
            log::warn!(
                "{} lookup keys for {} records; spectrum lookup disabled",
                batch.lookup_keys.len(),
                batch.len()
            );
        }
        if store.is_some() && !batch.storage_keys.is_empty() && !storage {
            log::warn!(
                "{} storage keys for {} records; spectrum storage disabled",
                batch.storage_keys.len(),
                batch.len()
            );
        }

        log::info!(
            "processing {} records (calibration {})",
            batch.len(),
            batch.calibration.0
        );

        let mut records = Vec::with_capacity(batch.len());
        // (record index, peak) for every detected peak of a successful record
        let mut pooled: Vec<(usize, Peak)> = Vec::new();

        for (index, record) in batch.records.iter().enumerate() {
            let lookup_key = lookup.then(|| &batch.lookup_keys[index]);
            let storage_key = storage.then(|| &batch.storage_keys[index]);
            let cache = store.map(|store| SpectrumCache {
                store,
                lookup_key,
                storage_key,
            });
            let key = lookup_key.or(storage_key).cloned();

            match self.analyze_record(record, cache) {
                Ok(analysis) => {
                    log::info!(
                        "record {}: {} paths, {} peaks",
                        index,
                        analysis.computed_paths,
                        analysis.peaks.len()
                    );
                    if let (Some(store), Some(key)) = (store, storage_key) {
                        if let Err(e) = store.put_peaks(key, &analysis.peaks) {
                            log::warn!("failed to store peaks for '{}': {}", key, e);
                        }
                    }
                    pooled.extend(analysis.peaks.iter().map(|p| (index, *p)));
                    records.push(RecordReport {
                        index,
                        key,
                        status: RecordStatus::Ok,
                        computed_paths: Some(analysis.computed_paths),
                        detected_peaks: analysis.peaks,
                        retained_peaks: Vec::new(),
                    });
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::warn!("record {} failed: {}", index, e);
                    records.push(RecordReport {
                        index,
                        key,
                        status: RecordStatus::Failed(e.to_string()),
                        computed_paths: None,
                        detected_peaks: Vec::new(),
                        retained_peaks: Vec::new(),
                    });
                }
            }
        }

        let peaks: Vec<Peak> = pooled.iter().map(|(_, p)| *p).collect();
        let partition = self.filter.filter(&peaks);
        for &i in &partition.retained {
            let (origin, peak) = pooled[i];
            records[origin].retained_peaks.push(peak);
        }

        let filtered_peaks = Partition::select(&partition.retained, &peaks);
        let removed_peaks = Partition::select(&partition.removed, &peaks);

        let stats = self.clusterer.estimate(&filtered_peaks)?;
        let clusters = self.scorer.rank(stats, filtered_peaks.len());

        if let Some(best) = clusters.first() {
            log::info!(
                "best cluster: theta {:.4} rad, tau {:.3e} s, likelihood {:.3e}",
                best.stats.mean_theta,
                best.stats.mean_tau,
                best.likelihood
            );
        }

        Ok(BatchReport {
            calibration: batch.calibration,
            records,
            filtered_peaks,
            removed_peaks,
            clusters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::MemoryStore;
    use num_complex::Complex64;

    #[test]
    fn test_rejects_indivisible_grid() {
        let mut config = PipelineConfig::default();
        config.grid.theta_samples = 90;
        assert!(matches!(
            Pipeline::new(config),
            Err(PipelineError::Precondition(_))
        ));
    }

    #[test]
    fn test_default_pipeline_builds() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        assert_eq!(pipeline.grid().shape(), (92, 100));
        assert_eq!(pipeline.config().music.workers, 4);
    }

    #[test]
    fn test_empty_batch_fails_at_clustering() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let batch = CsiBatch::new(CalibrationId(0), Vec::new());
        let err = pipeline.run(&batch, None).unwrap_err();
        assert!(matches!(err, PipelineError::Precondition(_)));
    }

    #[test]
    fn test_degenerate_records_are_reported() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let zero = CsiRecord::from_array([[Complex64::new(0.0, 0.0); 30]; 3]);
        let batch = CsiBatch::new(CalibrationId(2), vec![zero.clone(), zero]);
        let store = MemoryStore::new();
        let cache: &dyn SpectrumStore = &store;

        // Every record fails, so nothing reaches clustering
        let err = pipeline.run(&batch, Some(cache)).unwrap_err();
        assert!(matches!(err, PipelineError::Precondition(_)));
        assert!(store.is_empty());
    }
}
