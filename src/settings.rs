//! Configuration of a robust estimation run.
//!
//! [`RobustMethod`] selects the sampling/consensus strategy and
//! [`RobustSettings`] holds the numeric knobs shared by all of them. Setters on
//! [`RobustEstimator`](crate::robust::RobustEstimator) validate each value
//! individually; [`RobustSettings::validate`] checks a whole struct at once.

use crate::error::EstimatorError;

/// Sampling/consensus strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RobustMethod {
    /// Uniform sampling, inlier-count scoring.
    Ransac,
    /// Uniform sampling, least-median scoring.
    Lmeds,
    /// Uniform sampling, truncated-quadratic scoring.
    Msac,
    /// Quality-ordered progressive sampling, inlier-count scoring.
    Prosac,
    /// Quality-ordered progressive sampling, least-median scoring.
    Promeds,
}

impl RobustMethod {
    /// All methods, in declaration order.
    pub const ALL: [RobustMethod; 5] = [
        RobustMethod::Ransac,
        RobustMethod::Lmeds,
        RobustMethod::Msac,
        RobustMethod::Prosac,
        RobustMethod::Promeds,
    ];

    /// Whether per-point quality scores must be provided.
    pub fn requires_quality_scores(self) -> bool {
        matches!(self, RobustMethod::Prosac | RobustMethod::Promeds)
    }

    /// Whether the inlier threshold is derived from the median residual
    /// instead of configured.
    pub fn is_median_based(self) -> bool {
        matches!(self, RobustMethod::Lmeds | RobustMethod::Promeds)
    }
}

/// PROSAC growth and stopping parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProsacSettings {
    /// Probability that an incorrect model supports a random point.
    pub beta: f64,
    /// Accepted probability that a consensus set is random.
    pub psi: f64,
    /// Number of draws after which sampling falls back to uniform RANSAC
    /// (`T_N` of the growth function).
    pub convergence_iterations: usize,
}

impl Default for ProsacSettings {
    fn default() -> Self {
        Self {
            beta: 0.05,
            psi: 0.05,
            convergence_iterations: 100_000,
        }
    }
}

/// Numeric configuration of a robust run.
#[derive(Debug, Clone, PartialEq)]
pub struct RobustSettings {
    /// Inlier cutoff on residuals. Unused for scoring by median-based methods.
    pub threshold: f64,
    /// Desired probability of drawing at least one outlier-free sample, in (0, 1].
    pub confidence: f64,
    /// Hard cap on sampling iterations.
    pub max_iterations: usize,
    /// Progress notification granularity, in \[0, 1\].
    pub progress_delta: f32,
    /// Re-fit the best model on all its inliers.
    pub result_refined: bool,
    /// Derive a parameter covariance from the refinement.
    pub keep_covariance: bool,
    /// Median-based methods stop once the best median residual is at or below
    /// this value. It also floors their derived threshold.
    pub stop_threshold: f64,
    /// Consecutive degenerate draws tolerated within one iteration.
    pub max_sample_retries: usize,
    /// RNG seed. `None` seeds from OS entropy.
    pub seed: Option<u64>,
    pub prosac: ProsacSettings,
}

impl Default for RobustSettings {
    fn default() -> Self {
        Self {
            threshold: 1.5,
            confidence: 0.99,
            max_iterations: 5000,
            progress_delta: 0.05,
            result_refined: true,
            keep_covariance: false,
            stop_threshold: 1e-9,
            max_sample_retries: 100,
            seed: None,
            prosac: ProsacSettings::default(),
        }
    }
}

impl RobustSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_progress_delta(mut self, progress_delta: f32) -> Self {
        self.progress_delta = progress_delta;
        self
    }

    pub fn with_result_refined(mut self, result_refined: bool) -> Self {
        self.result_refined = result_refined;
        self
    }

    pub fn with_keep_covariance(mut self, keep_covariance: bool) -> Self {
        self.keep_covariance = keep_covariance;
        self
    }

    pub fn with_stop_threshold(mut self, stop_threshold: f64) -> Self {
        self.stop_threshold = stop_threshold;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_max_sample_retries(mut self, max_sample_retries: usize) -> Self {
        self.max_sample_retries = max_sample_retries;
        self
    }

    pub fn with_prosac(mut self, prosac: ProsacSettings) -> Self {
        self.prosac = prosac;
        self
    }

    /// Check every field, reporting the first invalid one.
    pub fn validate(&self) -> Result<(), EstimatorError> {
        check_threshold(self.threshold)?;
        check_confidence(self.confidence)?;
        check_max_iterations(self.max_iterations)?;
        check_progress_delta(self.progress_delta)?;
        check_stop_threshold(self.stop_threshold)?;
        check_max_sample_retries(self.max_sample_retries)?;
        check_prosac(&self.prosac)
    }
}

pub(crate) fn check_threshold(threshold: f64) -> Result<(), EstimatorError> {
    if threshold.is_finite() && threshold > 0.0 {
        Ok(())
    } else {
        Err(EstimatorError::InvalidSetting {
            name: "threshold",
            value: threshold,
            expected: "a finite value > 0",
        })
    }
}

pub(crate) fn check_confidence(confidence: f64) -> Result<(), EstimatorError> {
    if confidence > 0.0 && confidence <= 1.0 {
        Ok(())
    } else {
        Err(EstimatorError::InvalidSetting {
            name: "confidence",
            value: confidence,
            expected: "a value in (0, 1]",
        })
    }
}

pub(crate) fn check_max_iterations(max_iterations: usize) -> Result<(), EstimatorError> {
    if max_iterations >= 1 {
        Ok(())
    } else {
        Err(EstimatorError::InvalidSetting {
            name: "max_iterations",
            value: max_iterations as f64,
            expected: "at least 1",
        })
    }
}

pub(crate) fn check_progress_delta(progress_delta: f32) -> Result<(), EstimatorError> {
    if (0.0..=1.0).contains(&progress_delta) {
        Ok(())
    } else {
        Err(EstimatorError::InvalidSetting {
            name: "progress_delta",
            value: f64::from(progress_delta),
            expected: "a value in [0, 1]",
        })
    }
}

pub(crate) fn check_stop_threshold(stop_threshold: f64) -> Result<(), EstimatorError> {
    if stop_threshold.is_finite() && stop_threshold >= 0.0 {
        Ok(())
    } else {
        Err(EstimatorError::InvalidSetting {
            name: "stop_threshold",
            value: stop_threshold,
            expected: "a finite value >= 0",
        })
    }
}

pub(crate) fn check_max_sample_retries(retries: usize) -> Result<(), EstimatorError> {
    if retries >= 1 {
        Ok(())
    } else {
        Err(EstimatorError::InvalidSetting {
            name: "max_sample_retries",
            value: retries as f64,
            expected: "at least 1",
        })
    }
}

pub(crate) fn check_prosac(prosac: &ProsacSettings) -> Result<(), EstimatorError> {
    if !(prosac.beta > 0.0 && prosac.beta < 1.0) {
        return Err(EstimatorError::InvalidSetting {
            name: "prosac.beta",
            value: prosac.beta,
            expected: "a value in (0, 1)",
        });
    }
    if !(prosac.psi > 0.0 && prosac.psi < 1.0) {
        return Err(EstimatorError::InvalidSetting {
            name: "prosac.psi",
            value: prosac.psi,
            expected: "a value in (0, 1)",
        });
    }
    if prosac.convergence_iterations == 0 {
        return Err(EstimatorError::InvalidSetting {
            name: "prosac.convergence_iterations",
            value: 0.0,
            expected: "at least 1",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let cfg = RobustSettings::default();
        assert!(cfg.validate().is_ok());
        assert!((cfg.threshold - 1.5).abs() < 1e-12);
        assert!((cfg.confidence - 0.99).abs() < 1e-12);
        assert_eq!(cfg.max_iterations, 5000);
        assert!(cfg.result_refined);
        assert!(!cfg.keep_covariance);
        assert_eq!(cfg.seed, None);
        assert_eq!(cfg.prosac, ProsacSettings::default());
    }

    #[test]
    fn builder_helpers_set_fields() {
        let cfg = RobustSettings::new()
            .with_threshold(0.25)
            .with_confidence(0.95)
            .with_max_iterations(10)
            .with_progress_delta(0.5)
            .with_keep_covariance(true)
            .with_seed(3)
            .with_max_sample_retries(12)
            .with_prosac(ProsacSettings {
                convergence_iterations: 50,
                ..ProsacSettings::default()
            });
        assert_eq!(cfg.threshold, 0.25);
        assert_eq!(cfg.confidence, 0.95);
        assert_eq!(cfg.max_iterations, 10);
        assert_eq!(cfg.progress_delta, 0.5);
        assert!(cfg.keep_covariance);
        assert_eq!(cfg.seed, Some(3));
        assert_eq!(cfg.max_sample_retries, 12);
        assert_eq!(cfg.prosac.convergence_iterations, 50);
        assert_eq!(cfg.prosac.beta, 0.05);
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        assert!(RobustSettings::new().with_threshold(0.0).validate().is_err());
        assert!(RobustSettings::new().with_threshold(f64::NAN).validate().is_err());
        assert!(RobustSettings::new().with_confidence(0.0).validate().is_err());
        assert!(RobustSettings::new().with_confidence(1.01).validate().is_err());
        assert!(RobustSettings::new().with_confidence(1.0).validate().is_ok());
        assert!(RobustSettings::new().with_max_iterations(0).validate().is_err());
        assert!(RobustSettings::new().with_progress_delta(-0.1).validate().is_err());
        assert!(RobustSettings::new().with_progress_delta(1.5).validate().is_err());
        assert!(RobustSettings::new().with_stop_threshold(-1.0).validate().is_err());
        assert!(RobustSettings::new().with_max_sample_retries(0).validate().is_err());

        let mut cfg = RobustSettings::new();
        cfg.prosac.beta = 1.0;
        assert!(matches!(
            cfg.validate(),
            Err(EstimatorError::InvalidSetting { name: "prosac.beta", .. })
        ));
    }

    #[test]
    fn methods_requiring_quality_scores() {
        let progressive: Vec<_> = RobustMethod::ALL
            .iter()
            .filter(|m| m.requires_quality_scores())
            .collect();
        assert_eq!(progressive, vec![&RobustMethod::Prosac, &RobustMethod::Promeds]);
        assert!(RobustMethod::Lmeds.is_median_based());
        assert!(!RobustMethod::Msac.is_median_based());
    }
}
