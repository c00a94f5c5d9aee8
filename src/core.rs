//! Core traits connecting the robust estimation loop to its collaborators.
//!
//! - [`Estimator`] is implemented once per geometric type. It bundles the
//!   minimal solver, the optional full (over-determined) solver and the
//!   residual function.
//! - [`Sampler`] draws minimal index subsets.
//! - [`Scoring`] turns a residual vector into a comparable [`Score`].
//!
//! The loop itself lives in [`RobustEstimator`](crate::robust::RobustEstimator).

use nalgebra::{DMatrix, DVector};

pub use crate::scoring::Score;

/// Geometric estimator: minimal solver, full solver and residual function.
pub trait Estimator {
    /// Correspondence type consumed by the solvers.
    type Point;
    /// Model type produced by the solvers.
    type Model: Clone;

    /// Size of a minimal sample.
    fn sample_size(&self) -> usize;

    /// Cheap geometric pre-check of a sample before the minimal solver runs.
    fn is_valid_sample(&self, _data: &[Self::Point], _sample: &[usize]) -> bool {
        true
    }

    /// Fit candidate models from a minimal sample.
    ///
    /// An empty vector signals a degenerate sample.
    fn estimate_model(&self, data: &[Self::Point], sample: &[usize]) -> Vec<Self::Model>;

    /// Fit a model to an over-determined set of points.
    ///
    /// The default implementation reports that no full solver exists, which
    /// disables refinement.
    fn estimate_model_nonminimal(
        &self,
        _data: &[Self::Point],
        _sample: &[usize],
    ) -> Option<Refinement<Self::Model>> {
        None
    }

    /// Non-negative residual of `point` under `model`.
    fn residual(&self, model: &Self::Model, point: &Self::Point) -> f64;
}

/// Output of a full solver.
#[derive(Debug, Clone)]
pub struct Refinement<M> {
    pub model: M,
    /// Linearized system of the fit, used to derive a parameter covariance.
    pub normal_equations: Option<NormalEquations>,
}

impl<M> Refinement<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            normal_equations: None,
        }
    }

    pub fn with_normal_equations(mut self, normal_equations: NormalEquations) -> Self {
        self.normal_equations = Some(normal_equations);
        self
    }
}

/// Normal equations `JᵀJ` of a least-squares fit and its residual.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalEquations {
    /// Information matrix `JᵀJ` (parameters × parameters).
    pub information: DMatrix<f64>,
    /// Sum of squared residuals of the fit.
    pub residual_sum_squares: f64,
    /// Number of scalar observations (rows of `J`).
    pub observations: usize,
    /// Number of unobservable directions, e.g. 1 for the scale of a
    /// homogeneous parameter vector.
    pub gauge_dimensions: usize,
}

impl NormalEquations {
    /// Build from a design matrix `j` whose rows are linear residuals of the
    /// parameter vector `params`.
    pub fn from_design(j: &DMatrix<f64>, params: &DVector<f64>, gauge_dimensions: usize) -> Self {
        let residuals = j * params;
        Self {
            information: j.transpose() * j,
            residual_sum_squares: residuals.norm_squared(),
            observations: j.nrows(),
            gauge_dimensions,
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.information.ncols()
    }
}

/// Draws minimal samples of correspondence indices.
pub trait Sampler {
    /// Fill `out_indices[..sample_size]` with distinct indices in `[0, point_count)`.
    ///
    /// Returns `false` if no sample can be drawn with these sizes.
    fn sample(&mut self, point_count: usize, sample_size: usize, out_indices: &mut [usize]) -> bool;

    /// Indices currently eligible for sampling, when the sampler restricts
    /// draws to a growing prefix of a quality ordering.
    fn active_points(&self) -> Option<&[usize]> {
        None
    }
}

/// Scoring strategy turning per-point residuals into a model score.
pub trait Scoring {
    /// Score a model from the residual of every correspondence.
    fn score(&mut self, residuals: &[f64]) -> Score;

    /// Whether `score` is good enough to stop sampling right away.
    fn is_conclusive(&self, _score: &Score) -> bool {
        false
    }

    /// Largest inlier ratio the iteration bound may be driven with.
    ///
    /// Scorings whose threshold is derived from the candidate itself return
    /// less than 1, since such a threshold always admits a fixed share of
    /// the points.
    fn max_inlier_ratio(&self) -> f64 {
        1.0
    }
}
