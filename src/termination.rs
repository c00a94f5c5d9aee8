//! Iteration control: adaptive iteration bound, progress reporting and the
//! PROSAC non-randomness stopping rule.

use std::collections::HashMap;

use crate::settings::{ProsacSettings, RobustSettings};
use crate::utils::binomial_tail_quantile;

/// Number of iterations needed to draw an all-inlier sample of size
/// `sample_size` with probability `confidence`, given inlier ratio `inlier_ratio`.
///
/// Follows `N = log(1 − confidence) / log(1 − w^k)`, clamped to
/// `[1, max_iterations]`.
pub fn required_iterations(
    confidence: f64,
    inlier_ratio: f64,
    sample_size: usize,
    max_iterations: usize,
) -> usize {
    let max_iterations = max_iterations.max(1);
    let inlier_ratio = inlier_ratio.clamp(0.0, 1.0);
    if confidence >= 1.0 || inlier_ratio <= 0.0 {
        return max_iterations;
    }
    if inlier_ratio >= 1.0 {
        return 1;
    }

    let p_good_sample = inlier_ratio.powi(sample_size as i32);
    let log_one_minus_p = (1.0 - p_good_sample).ln();
    if !log_one_minus_p.is_finite() || log_one_minus_p >= 0.0 {
        // p_good_sample underflowed to 0 or rounded to 1.
        return if p_good_sample >= 1.0 { 1 } else { max_iterations };
    }

    let required = ((1.0 - confidence).ln() / log_one_minus_p).ceil();
    if !required.is_finite() || required >= max_iterations as f64 {
        max_iterations
    } else {
        (required as usize).max(1)
    }
}

/// Tracks the adaptive iteration bound and progress notifications of a run.
#[derive(Debug, Clone)]
pub struct IterationController {
    confidence: f64,
    max_iterations: usize,
    sample_size: usize,
    progress_delta: f32,
    bound: usize,
    last_progress: f32,
}

impl IterationController {
    pub fn new(settings: &RobustSettings, sample_size: usize) -> Self {
        Self {
            confidence: settings.confidence,
            max_iterations: settings.max_iterations.max(1),
            sample_size,
            progress_delta: settings.progress_delta,
            bound: settings.max_iterations.max(1),
            last_progress: 0.0,
        }
    }

    /// Current iteration bound.
    pub fn bound(&self) -> usize {
        self.bound
    }

    /// Bound implied by a best-so-far inlier ratio.
    pub fn adaptive_bound(&self, inlier_ratio: f64) -> usize {
        required_iterations(
            self.confidence,
            inlier_ratio,
            self.sample_size,
            self.max_iterations,
        )
    }

    /// Recompute the bound after a better model was found.
    pub fn update(&mut self, inlier_ratio: f64) -> usize {
        self.bound = self.adaptive_bound(inlier_ratio);
        self.bound
    }

    pub fn should_continue(&self, iteration: usize) -> bool {
        iteration < self.bound
    }

    /// Progress to report after `iteration` completed iterations, if it advanced
    /// by at least `progress_delta` since the last report.
    pub fn progress_update(&mut self, iteration: usize) -> Option<f32> {
        let progress = (iteration as f32 / self.bound as f32).min(1.0);
        if progress - self.last_progress >= self.progress_delta && progress > self.last_progress {
            self.last_progress = progress;
            Some(progress)
        } else {
            None
        }
    }
}

/// PROSAC termination: stop once the consensus among the active points is
/// unlikely to be random (non-randomness) and enough draws were made from
/// the active set to trust it (maximality).
#[derive(Debug, Clone)]
pub struct ProsacStoppingRule {
    sample_size: usize,
    beta: f64,
    psi: f64,
    confidence: f64,
    max_iterations: usize,
    max_inlier_ratio: f64,
    minimum_inliers: HashMap<usize, usize>,
}

impl ProsacStoppingRule {
    pub fn new(settings: &RobustSettings, sample_size: usize) -> Self {
        let ProsacSettings { beta, psi, .. } = settings.prosac;
        Self {
            sample_size,
            beta,
            psi,
            confidence: settings.confidence,
            max_iterations: settings.max_iterations.max(1),
            max_inlier_ratio: 1.0,
            minimum_inliers: HashMap::new(),
        }
    }

    /// Cap the inlier ratio used by the maximality check.
    pub fn with_max_inlier_ratio(mut self, max_inlier_ratio: f64) -> Self {
        self.max_inlier_ratio = max_inlier_ratio;
        self
    }

    /// Smallest inlier count among `active_size` points that a random model is
    /// unlikely (probability below `psi`) to reach.
    pub fn minimum_inliers(&mut self, active_size: usize) -> usize {
        let (k, beta, psi) = (self.sample_size, self.beta, self.psi);
        *self.minimum_inliers.entry(active_size).or_insert_with(|| {
            let free = active_size.saturating_sub(k);
            k + binomial_tail_quantile(free, beta, psi)
        })
    }

    /// Whether sampling can stop, given `active_inliers` inliers of the best
    /// model among the `active_size` points and `iteration` completed draws.
    pub fn should_stop(&mut self, active_inliers: usize, active_size: usize, iteration: usize) -> bool {
        if active_size == 0 || active_inliers < self.minimum_inliers(active_size) {
            return false;
        }
        let ratio = (active_inliers as f64 / active_size as f64).min(self.max_inlier_ratio);
        let needed = required_iterations(self.confidence, ratio, self.sample_size, self.max_iterations);
        iteration >= needed
    }
}
