//! High-level fitting functions.
//!
//! Each function builds a [`RobustEstimator`] for one reference estimator,
//! applies `settings` (defaults when `None`), attaches the optional quality
//! scores and runs it once.

use nalgebra::{Point2, Point3};

use crate::core::Estimator;
use crate::error::EstimatorError;
use crate::estimators::{
    ConicEstimator, HomographyEstimator, LineEstimator, PinholeCameraEstimator, PlaneEstimator,
};
use crate::models::{Conic, Homography, Line2D, PinholeCamera, Plane};
use crate::robust::RobustEstimator;
use crate::settings::{RobustMethod, RobustSettings};
use crate::types::{Correspondence2D, RobustEstimate, WorldImageCorrespondence};

fn fit<E: Estimator>(
    estimator: E,
    points: &[E::Point],
    method: RobustMethod,
    settings: Option<RobustSettings>,
    quality_scores: Option<&[f64]>,
) -> Result<RobustEstimate<E::Model>, EstimatorError>
where
    E::Point: Clone,
{
    let robust = RobustEstimator::with_settings(estimator, method, settings.unwrap_or_default())?;
    robust.set_points(points.to_vec())?;
    if let Some(scores) = quality_scores {
        robust.set_quality_scores(Some(scores.to_vec()))?;
    }
    robust.estimate()
}

/// Fit a conic to 2D points.
///
/// # Arguments
/// * `points` - Points on the conic, possibly with outliers
/// * `method` - Robust method; PROSAC and PROMedS need `quality_scores`
/// * `settings` - Optional settings (uses defaults if None)
/// * `quality_scores` - Optional per-point quality, higher is better
pub fn fit_conic(
    points: &[Point2<f64>],
    method: RobustMethod,
    settings: Option<RobustSettings>,
    quality_scores: Option<&[f64]>,
) -> Result<RobustEstimate<Conic>, EstimatorError> {
    fit(ConicEstimator, points, method, settings, quality_scores)
}

/// Fit a 2D line; the residual is the point-line distance.
pub fn fit_line(
    points: &[Point2<f64>],
    method: RobustMethod,
    settings: Option<RobustSettings>,
    quality_scores: Option<&[f64]>,
) -> Result<RobustEstimate<Line2D>, EstimatorError> {
    fit(LineEstimator, points, method, settings, quality_scores)
}

/// Fit a plane to 3D points; the residual is the point-plane distance.
pub fn fit_plane(
    points: &[Point3<f64>],
    method: RobustMethod,
    settings: Option<RobustSettings>,
    quality_scores: Option<&[f64]>,
) -> Result<RobustEstimate<Plane>, EstimatorError> {
    fit(PlaneEstimator, points, method, settings, quality_scores)
}

/// Fit a homography to image correspondences; the residual is the symmetric
/// transfer error in pixels.
pub fn fit_homography(
    correspondences: &[Correspondence2D],
    method: RobustMethod,
    settings: Option<RobustSettings>,
    quality_scores: Option<&[f64]>,
) -> Result<RobustEstimate<Homography>, EstimatorError> {
    fit(HomographyEstimator, correspondences, method, settings, quality_scores)
}

/// Fit a projective camera to world/image correspondences; the residual is
/// the reprojection error in pixels.
pub fn fit_camera(
    correspondences: &[WorldImageCorrespondence],
    method: RobustMethod,
    settings: Option<RobustSettings>,
    quality_scores: Option<&[f64]>,
) -> Result<RobustEstimate<PinholeCamera>, EstimatorError> {
    fit(PinholeCameraEstimator, correspondences, method, settings, quality_scores)
}
