//! Line estimator for 2D line fitting.

use nalgebra::{DMatrix, DVector, Matrix2, Point2, Vector2};

use crate::core::{Estimator, NormalEquations, Refinement};
use crate::models::Line2D;

use super::has_distinct_indices;

/// Line estimator for 2D line fitting.
///
/// Estimates lines `ax + by + c = 0` with `a² + b² = 1`; the residual is the
/// point-line distance.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineEstimator;

impl LineEstimator {
    pub fn new() -> Self {
        Self
    }
}

impl Estimator for LineEstimator {
    type Point = Point2<f64>;
    type Model = Line2D;

    fn sample_size(&self) -> usize {
        2
    }

    fn is_valid_sample(&self, data: &[Point2<f64>], sample: &[usize]) -> bool {
        sample.len() == 2
            && has_distinct_indices(sample)
            && (data[sample[0]] - data[sample[1]]).norm_squared() > 1e-20
    }

    fn estimate_model(&self, data: &[Point2<f64>], sample: &[usize]) -> Vec<Line2D> {
        Line2D::through(&data[sample[0]], &data[sample[1]])
            .into_iter()
            .collect()
    }

    /// Total least squares: the normal is the eigenvector of the scatter
    /// matrix with the smallest eigenvalue.
    fn estimate_model_nonminimal(
        &self,
        data: &[Point2<f64>],
        sample: &[usize],
    ) -> Option<Refinement<Line2D>> {
        if sample.len() < 2 {
            return None;
        }
        let n = sample.len() as f64;
        let centroid = sample
            .iter()
            .fold(Vector2::zeros(), |acc, &i| acc + data[i].coords)
            / n;
        let scatter = sample.iter().fold(Matrix2::zeros(), |acc, &i| {
            let d = data[i].coords - centroid;
            acc + d * d.transpose()
        });

        let eigen = scatter.symmetric_eigen();
        let weakest = eigen.eigenvalues.imin();
        let normal = eigen.eigenvectors.column(weakest).into_owned();
        let line = Line2D::new(normal.x, normal.y, -normal.dot(&centroid))?;

        let mut j = DMatrix::zeros(sample.len(), 3);
        for (row, &i) in sample.iter().enumerate() {
            j[(row, 0)] = data[i].x;
            j[(row, 1)] = data[i].y;
            j[(row, 2)] = 1.0;
        }
        let params = DVector::from_vec(vec![line.a, line.b, line.c]);
        let normal_equations = NormalEquations::from_design(&j, &params, 1);
        Some(Refinement::new(line).with_normal_equations(normal_equations))
    }

    fn residual(&self, model: &Line2D, point: &Point2<f64>) -> f64 {
        model.distance(point)
    }
}
