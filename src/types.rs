//! Shared data types: correspondences consumed by the reference estimators and
//! the outputs of a robust run.

use bitvec::vec::BitVec;
use nalgebra::{DMatrix, Point2, Point3};

/// Covariance of the model parameters, in the parametrization reported by the
/// estimator's normal equations.
pub type Covariance = DMatrix<f64>;

/// A point observed in two images, related by a planar homography.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence2D {
    pub source: Point2<f64>,
    pub target: Point2<f64>,
}

impl Correspondence2D {
    pub fn new(source: Point2<f64>, target: Point2<f64>) -> Self {
        Self { source, target }
    }
}

/// A world point and its observed projection, as consumed by camera resection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldImageCorrespondence {
    pub world: Point3<f64>,
    pub image: Point2<f64>,
}

impl WorldImageCorrespondence {
    pub fn new(world: Point3<f64>, image: Point2<f64>) -> Self {
        Self { world, image }
    }
}

/// Consensus information for the returned model.
#[derive(Debug, Clone, PartialEq)]
pub struct InliersData {
    /// Inlier membership, one bit per correspondence.
    pub inliers: BitVec,
    /// Residual of every correspondence against the returned model.
    pub residuals: Vec<f64>,
    /// Threshold used for membership. For median-based methods it is derived
    /// from the data rather than configured.
    pub estimated_threshold: f64,
    /// Number of set bits in `inliers`.
    pub inlier_count: usize,
}

impl InliersData {
    /// Classify `residuals` with `residual < threshold`.
    pub fn from_residuals(residuals: Vec<f64>, threshold: f64) -> Self {
        let inliers: BitVec = residuals.iter().map(|&r| r < threshold).collect();
        let inlier_count = inliers.count_ones();
        Self {
            inliers,
            residuals,
            estimated_threshold: threshold,
            inlier_count,
        }
    }

    pub fn is_inlier(&self, index: usize) -> bool {
        self.inliers.get(index).map(|bit| *bit).unwrap_or(false)
    }

    /// Indices of the inliers in increasing order.
    pub fn indices(&self) -> Vec<usize> {
        self.inliers.iter_ones().collect()
    }

    pub fn inlier_ratio(&self) -> f64 {
        if self.residuals.is_empty() {
            0.0
        } else {
            self.inlier_count as f64 / self.residuals.len() as f64
        }
    }
}

/// Outcome of a successful robust estimation.
#[derive(Debug, Clone)]
pub struct RobustEstimate<M> {
    /// Best model, refined on its inliers when refinement was enabled and
    /// accepted.
    pub model: M,
    /// Consensus of `model` over all correspondences.
    pub inliers: InliersData,
    /// Parameter covariance, present when requested and the refinement
    /// produced normal equations.
    pub covariance: Option<Covariance>,
    /// Number of sampling iterations performed.
    pub iterations: usize,
    /// Whether `model` is the result of the refinement step.
    pub refined: bool,
}
