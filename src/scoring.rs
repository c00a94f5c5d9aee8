//! Consensus scoring.
//!
//! Every strategy maps the residual vector of a candidate model to a
//! [`Score`] whose `cost` is minimized. Inlier-count scoring stores the
//! negated count so that "more inliers" compares as "lower cost".

use std::cmp::{Ordering, Reverse};

use ordered_float::OrderedFloat;

use crate::core::Scoring;
use crate::utils::median_in_place;

/// Normalization constant making the median absolute deviation a consistent
/// estimator of a Gaussian standard deviation.
const MAD_TO_SIGMA: f64 = 1.4826;

/// Score of a candidate model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    /// Method-specific cost; lower is better.
    pub cost: f64,
    /// Number of residuals strictly below `threshold`.
    pub inlier_count: usize,
    /// Threshold used for membership; derived for median-based scoring.
    pub threshold: f64,
}

impl Score {
    pub fn new(cost: f64, inlier_count: usize, threshold: f64) -> Self {
        Self {
            cost,
            inlier_count,
            threshold,
        }
    }

    fn key(&self) -> (OrderedFloat<f64>, Reverse<usize>) {
        (OrderedFloat(self.cost), Reverse(self.inlier_count))
    }

    /// Total order on scores: lower cost first, then more inliers.
    pub fn compare(&self, other: &Score) -> Ordering {
        self.key().cmp(&other.key())
    }

    pub fn is_better_than(&self, other: &Score) -> bool {
        self.compare(other) == Ordering::Less
    }
}

fn count_below(residuals: &[f64], threshold: f64) -> usize {
    residuals.iter().filter(|&&r| r < threshold).count()
}

/// RANSAC scoring: cost is the negated number of inliers.
#[derive(Debug, Clone)]
pub struct RansacScoring {
    threshold: f64,
}

impl RansacScoring {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Scoring for RansacScoring {
    fn score(&mut self, residuals: &[f64]) -> Score {
        let inlier_count = count_below(residuals, self.threshold);
        Score::new(-(inlier_count as f64), inlier_count, self.threshold)
    }
}

/// MSAC scoring: truncated quadratic loss `Σ min(r², t²)`.
#[derive(Debug, Clone)]
pub struct MsacScoring {
    threshold: f64,
}

impl MsacScoring {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Scoring for MsacScoring {
    fn score(&mut self, residuals: &[f64]) -> Score {
        let threshold_sq = self.threshold * self.threshold;
        let mut cost = 0.0;
        let mut inlier_count = 0;
        for &r in residuals {
            if r < self.threshold {
                inlier_count += 1;
            }
            cost += (r * r).min(threshold_sq);
        }
        Score::new(cost, inlier_count, self.threshold)
    }
}

/// Share of the points a least-median threshold admits regardless of the
/// model: the breakdown point of the median.
const MEDIAN_BREAKDOWN: f64 = 0.5;

/// Least-median scoring used by LMedS and PROMedS.
///
/// The cost is the median squared residual. The membership threshold is the
/// robust scale estimate `1.4826 · (1 + 5/(N − k)) · sqrt(median r²)`, in
/// residual units, floored at the stop threshold.
#[derive(Debug, Clone)]
pub struct LmedsScoring {
    sample_size: usize,
    stop_threshold: f64,
    scratch: Vec<f64>,
}

impl LmedsScoring {
    pub fn new(sample_size: usize, stop_threshold: f64) -> Self {
        Self {
            sample_size,
            stop_threshold,
            scratch: Vec::new(),
        }
    }

    /// Inlier threshold derived from the median squared residual over
    /// `point_count` points.
    pub fn derived_threshold(&self, median_squared: f64, point_count: usize) -> f64 {
        let redundancy = point_count.saturating_sub(self.sample_size).max(1) as f64;
        let scale = MAD_TO_SIGMA * (1.0 + 5.0 / redundancy) * median_squared.max(0.0).sqrt();
        scale.max(self.stop_threshold)
    }
}

impl Scoring for LmedsScoring {
    fn score(&mut self, residuals: &[f64]) -> Score {
        self.scratch.clear();
        self.scratch.extend(residuals.iter().map(|r| r * r));
        let Some(median_squared) = median_in_place(&mut self.scratch) else {
            return Score::new(f64::INFINITY, 0, self.stop_threshold);
        };
        let threshold = self.derived_threshold(median_squared, residuals.len());
        Score::new(median_squared, count_below(residuals, threshold), threshold)
    }

    /// The median residual reached the stop threshold.
    fn is_conclusive(&self, score: &Score) -> bool {
        score.cost.sqrt() <= self.stop_threshold
    }

    fn max_inlier_ratio(&self) -> f64 {
        MEDIAN_BREAKDOWN
    }
}
