//! Reference estimators for the geometric models in [`models`](crate::models).
//!
//! - [`ConicEstimator`]: conics from 2D points (5-point fit)
//! - [`LineEstimator`]: 2D lines (2-point fit)
//! - [`PlaneEstimator`]: 3D planes (3-point fit)
//! - [`HomographyEstimator`]: planar homographies (4-point fit)
//! - [`PinholeCameraEstimator`]: projective cameras (6-point DLT)
//!
//! Every estimator provides a full solver for refinement, reporting normal
//! equations whose gauge is the scale of the homogeneous parameter vector.

pub mod camera;
pub mod conic;
pub mod homography;
pub mod line;
pub mod plane;

pub use camera::PinholeCameraEstimator;
pub use conic::ConicEstimator;
pub use homography::HomographyEstimator;
pub use line::LineEstimator;
pub use plane::PlaneEstimator;

/// Whether `sample` holds pairwise distinct indices.
pub(crate) fn has_distinct_indices(sample: &[usize]) -> bool {
    sample
        .iter()
        .enumerate()
        .all(|(i, a)| sample[i + 1..].iter().all(|b| a != b))
}
