//! Error taxonomy shared by the processing stages.

use thiserror::Error;

/// Errors raised while turning CSI into multipath estimates.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input shape or configuration makes the computation meaningless.
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// A numerical stage produced values that cannot be used downstream.
    #[error("numerically degenerate result: {0}")]
    NumericalDegenerate(String),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl PipelineError {
    /// Whether the error must abort the whole batch rather than a single record.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Precondition(_) | Self::WorkerPool(_))
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality() {
        assert!(PipelineError::Precondition("x".into()).is_fatal());
        assert!(!PipelineError::NumericalDegenerate("x".into()).is_fatal());
    }

    #[test]
    fn test_display() {
        let err = PipelineError::NumericalDegenerate("eigenvalue 3 is NaN".into());
        assert_eq!(
            err.to_string(),
            "numerically degenerate result: eigenvalue 3 is NaN"
        );
    }
}
