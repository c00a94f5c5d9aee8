//! Runtime wrappers selecting the sampler and scoring strategy of a
//! [`RobustMethod`] while the sampling loop stays generic over the
//! [`Sampler`] and [`Scoring`] traits.

use crate::core::{Sampler, Scoring};
use crate::samplers::{ProsacSampler, UniformRandomSampler};
use crate::scoring::{LmedsScoring, MsacScoring, RansacScoring, Score};
use crate::settings::{RobustMethod, RobustSettings};
use crate::utils::UniformRandomGenerator;

/// Runtime sampler selection.
pub enum SamplerChoice {
    Uniform(UniformRandomSampler),
    Prosac(ProsacSampler),
}

impl SamplerChoice {
    /// Sampler used by `method`.
    ///
    /// `quality_scores` must be present for progressive methods; uniform
    /// methods ignore it.
    pub fn for_method(
        method: RobustMethod,
        settings: &RobustSettings,
        sample_size: usize,
        quality_scores: Option<&[f64]>,
    ) -> Option<Self> {
        let rng = UniformRandomGenerator::from_optional_seed(settings.seed);
        if method.requires_quality_scores() {
            let scores = quality_scores?;
            Some(SamplerChoice::Prosac(ProsacSampler::new(
                scores,
                sample_size,
                settings.prosac.convergence_iterations,
                rng,
            )))
        } else {
            Some(SamplerChoice::Uniform(UniformRandomSampler::with_rng(rng)))
        }
    }
}

impl Sampler for SamplerChoice {
    fn sample(&mut self, point_count: usize, sample_size: usize, out_indices: &mut [usize]) -> bool {
        match self {
            SamplerChoice::Uniform(s) => s.sample(point_count, sample_size, out_indices),
            SamplerChoice::Prosac(s) => s.sample(point_count, sample_size, out_indices),
        }
    }

    fn active_points(&self) -> Option<&[usize]> {
        match self {
            SamplerChoice::Uniform(s) => s.active_points(),
            SamplerChoice::Prosac(s) => s.active_points(),
        }
    }
}

/// Runtime scoring selection.
pub enum ScoringChoice {
    Ransac(RansacScoring),
    Msac(MsacScoring),
    Median(LmedsScoring),
}

impl ScoringChoice {
    /// Scoring used by `method`.
    pub fn for_method(method: RobustMethod, settings: &RobustSettings, sample_size: usize) -> Self {
        match method {
            RobustMethod::Ransac | RobustMethod::Prosac => {
                ScoringChoice::Ransac(RansacScoring::new(settings.threshold))
            }
            RobustMethod::Msac => ScoringChoice::Msac(MsacScoring::new(settings.threshold)),
            RobustMethod::Lmeds | RobustMethod::Promeds => {
                ScoringChoice::Median(LmedsScoring::new(sample_size, settings.stop_threshold))
            }
        }
    }
}

impl Scoring for ScoringChoice {
    fn score(&mut self, residuals: &[f64]) -> Score {
        match self {
            ScoringChoice::Ransac(s) => s.score(residuals),
            ScoringChoice::Msac(s) => s.score(residuals),
            ScoringChoice::Median(s) => s.score(residuals),
        }
    }

    fn is_conclusive(&self, score: &Score) -> bool {
        match self {
            ScoringChoice::Ransac(s) => s.is_conclusive(score),
            ScoringChoice::Msac(s) => s.is_conclusive(score),
            ScoringChoice::Median(s) => s.is_conclusive(score),
        }
    }

    fn max_inlier_ratio(&self) -> f64 {
        match self {
            ScoringChoice::Ransac(s) => s.max_inlier_ratio(),
            ScoringChoice::Msac(s) => s.max_inlier_ratio(),
            ScoringChoice::Median(s) => s.max_inlier_ratio(),
        }
    }
}
