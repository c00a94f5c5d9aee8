//! Callbacks notified synchronously while a robust estimation runs.

use crate::core::Estimator;
use crate::robust::RobustEstimator;

/// Observer of a [`RobustEstimator`] run.
///
/// All callbacks execute on the thread calling
/// [`estimate`](RobustEstimator::estimate), inside the sampling loop. The
/// estimator is locked for their whole duration: any setter invoked from a
/// callback returns [`EstimatorError::Locked`](crate::error::EstimatorError::Locked).
pub trait EstimatorListener<E: Estimator> {
    /// Called once before the first iteration.
    fn on_estimate_start(&self, _estimator: &RobustEstimator<E>) {}

    /// Called once when a started run finishes, successfully or not.
    fn on_estimate_end(&self, _estimator: &RobustEstimator<E>) {}

    /// Called after every iteration, once its samples were drawn and scored.
    /// `iteration` counts completed iterations from 1.
    fn on_estimate_next_iteration(&self, _estimator: &RobustEstimator<E>, _iteration: usize) {}

    /// Called whenever progress advanced by the configured delta.
    fn on_estimate_progress_change(&self, _estimator: &RobustEstimator<E>, _progress: f32) {}
}
