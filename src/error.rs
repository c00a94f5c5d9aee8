//! Error taxonomy of the robust estimation engine.

use thiserror::Error;

/// Errors raised by [`RobustEstimator`](crate::robust::RobustEstimator) and the
/// high-level [`api`](crate::api) functions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimatorError {
    /// A configuration value was outside its admissible range.
    #[error("invalid {name}: {value} (expected {expected})")]
    InvalidSetting {
        /// Name of the rejected setting.
        name: &'static str,
        /// Value that was rejected.
        value: f64,
        /// Human readable description of the admissible range.
        expected: &'static str,
    },

    /// Fewer correspondences than a minimal sample needs.
    #[error("at least {required} correspondences are required, got {actual}")]
    TooFewCorrespondences { required: usize, actual: usize },

    /// Fewer quality scores than a minimal sample needs.
    #[error("at least {required} quality scores are required, got {actual}")]
    TooFewQualityScores { required: usize, actual: usize },

    /// A mutator or a nested `estimate()` was invoked while a run is in progress.
    #[error("estimator is locked while an estimation is running")]
    Locked,

    /// Required inputs are missing or inconsistent.
    #[error("estimator is not ready: {0}")]
    NotReady(NotReadyReason),

    /// The iteration budget was exhausted without an admissible model.
    #[error("robust estimation failed: {0}")]
    Failed(EstimationFailure),
}

/// Why an estimator refused to start.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotReadyReason {
    #[error("{required} correspondences are required, {actual} were provided")]
    MissingCorrespondences { required: usize, actual: usize },

    #[error("quality scores are required by this method but were not provided")]
    MissingQualityScores,

    #[error("{scores} quality scores were provided for {points} correspondences")]
    QualityScoresMismatch { scores: usize, points: usize },
}

/// Why a run ended without a model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EstimationFailure {
    #[error("no model with a non-empty consensus set after {iterations} iterations")]
    NoConsensus { iterations: usize },

    #[error("no valid minimal sample found in {attempts} consecutive attempts")]
    DegenerateSamples { attempts: usize },
}

impl From<NotReadyReason> for EstimatorError {
    fn from(reason: NotReadyReason) -> Self {
        EstimatorError::NotReady(reason)
    }
}

impl From<EstimationFailure> for EstimatorError {
    fn from(failure: EstimationFailure) -> Self {
        EstimatorError::Failed(failure)
    }
}
