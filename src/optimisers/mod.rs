//! Post-consensus refinement of the best model and parameter covariance.

use std::cmp::Reverse;

use log::{debug, warn};
use nalgebra::DMatrix;
use ordered_float::OrderedFloat;

use crate::core::{Estimator, NormalEquations, Refinement};
use crate::types::Covariance;

/// Relative cutoff below which a singular direction of `JᵀJ` is treated as
/// unobservable.
const SINGULAR_TOLERANCE: f64 = 1e-12;

/// Least-squares refiner that re-fits a model on all of its inliers.
///
/// This requires the estimator to provide a full solver through
/// [`Estimator::estimate_model_nonminimal`]. The refined model replaces the
/// consensus model only when it keeps at least as many inliers under the same
/// threshold.
pub struct LeastSquaresRefiner<'a, E>
where
    E: Estimator,
{
    estimator: &'a E,
}

impl<'a, E> LeastSquaresRefiner<'a, E>
where
    E: Estimator,
{
    pub fn new(estimator: &'a E) -> Self {
        Self { estimator }
    }

    /// Re-fit on `inliers`, accepting the result only if its consensus over
    /// `data` with `threshold` is not smaller than `consensus_count`.
    pub fn refine(
        &self,
        data: &[E::Point],
        inliers: &[usize],
        threshold: f64,
        consensus_count: usize,
    ) -> Option<Refinement<E::Model>> {
        if inliers.len() < self.estimator.sample_size() {
            debug!(
                "skipping refinement: {} inliers, {} required",
                inliers.len(),
                self.estimator.sample_size()
            );
            return None;
        }

        let Some(refinement) = self.estimator.estimate_model_nonminimal(data, inliers) else {
            warn!("full solver failed on {} inliers, keeping consensus model", inliers.len());
            return None;
        };

        let refined_count = data
            .iter()
            .filter(|p| self.estimator.residual(&refinement.model, p) < threshold)
            .count();
        if refined_count < consensus_count {
            warn!(
                "refined model supports {refined_count} points, consensus model {consensus_count}; keeping consensus model"
            );
            return None;
        }
        Some(refinement)
    }
}

/// Parameter covariance `σ² · (JᵀJ)⁺` of a least-squares fit.
///
/// The `gauge_dimensions` weakest directions of `JᵀJ` are excluded from the
/// pseudo-inverse, as are numerically null ones. The residual variance is
/// `σ² = RSS / max(observations − (parameters − gauge), 1)`.
pub fn covariance(normal: &NormalEquations) -> Option<Covariance> {
    let p = normal.parameter_count();
    if p == 0 || normal.information.nrows() != p || normal.gauge_dimensions >= p {
        return None;
    }
    if !normal.residual_sum_squares.is_finite() || normal.information.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let free = p - normal.gauge_dimensions;
    let dof = normal.observations.saturating_sub(free).max(1);
    let sigma_sq = normal.residual_sum_squares / dof as f64;

    let svd = normal.information.clone().svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let singular = svd.singular_values;

    let mut order: Vec<usize> = (0..p).collect();
    order.sort_by_key(|&i| Reverse(OrderedFloat(singular[i])));
    let largest = singular[order[0]];
    if largest <= 0.0 {
        return None;
    }

    let mut pinv = DMatrix::<f64>::zeros(p, p);
    for &i in &order[..free] {
        let s = singular[i];
        if s <= largest * SINGULAR_TOLERANCE {
            continue;
        }
        pinv += v_t.row(i).transpose() * u.column(i).transpose() / s;
    }
    Some(pinv * sigma_sq)
}
