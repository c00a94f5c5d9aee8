//! Conic estimator: 5-point fit of a general conic to 2D points.

use nalgebra::{DMatrix, DVector, Matrix3, Point2};

use crate::core::{Estimator, NormalEquations, Refinement};
use crate::models::Conic;
use crate::utils::{normalizing_transform_2d, null_vector};

use super::has_distinct_indices;

/// Fits conics `a x² + b xy + c y² + d x + e y + f = 0`.
///
/// Both solvers work on normalized coordinates and return the conic in the
/// original frame. The residual is the absolute algebraic distance with
/// unit-norm coefficients.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConicEstimator;

impl ConicEstimator {
    pub fn new() -> Self {
        Self
    }

    fn fit(&self, data: &[Point2<f64>], sample: &[usize]) -> Option<Conic> {
        let points: Vec<Point2<f64>> = sample.iter().map(|&i| data[i]).collect();
        let t = normalizing_transform_2d(&points)?;
        let normalized: Vec<Point2<f64>> = points.iter().map(|p| t.transform_point(p)).collect();

        let v = null_vector(&design_matrix(&normalized))?;
        let c_normalized = Conic::new(v.fixed_rows::<6>(0).into_owned())?.matrix();
        let c: Matrix3<f64> = t.transpose() * c_normalized * t;
        Conic::from_matrix(&c)
    }
}

/// One row `[x², xy, y², x, y, 1]` per point.
fn design_matrix(points: &[Point2<f64>]) -> DMatrix<f64> {
    let mut a = DMatrix::zeros(points.len(), 6);
    for (row, p) in points.iter().enumerate() {
        let (x, y) = (p.x, p.y);
        a[(row, 0)] = x * x;
        a[(row, 1)] = x * y;
        a[(row, 2)] = y * y;
        a[(row, 3)] = x;
        a[(row, 4)] = y;
        a[(row, 5)] = 1.0;
    }
    a
}

impl Estimator for ConicEstimator {
    type Point = Point2<f64>;
    type Model = Conic;

    fn sample_size(&self) -> usize {
        5
    }

    fn is_valid_sample(&self, _data: &[Point2<f64>], sample: &[usize]) -> bool {
        sample.len() == 5 && has_distinct_indices(sample)
    }

    fn estimate_model(&self, data: &[Point2<f64>], sample: &[usize]) -> Vec<Conic> {
        self.fit(data, sample).into_iter().collect()
    }

    fn estimate_model_nonminimal(
        &self,
        data: &[Point2<f64>],
        sample: &[usize],
    ) -> Option<Refinement<Conic>> {
        if sample.len() < 5 {
            return None;
        }
        let conic = self.fit(data, sample)?;
        let points: Vec<Point2<f64>> = sample.iter().map(|&i| data[i]).collect();
        let params = DVector::from_column_slice(conic.coefficients().as_slice());
        let normal_equations = NormalEquations::from_design(&design_matrix(&points), &params, 1);
        Some(Refinement::new(conic).with_normal_equations(normal_equations))
    }

    fn residual(&self, model: &Conic, point: &Point2<f64>) -> f64 {
        model.evaluate(point).abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::TAU;

    fn ellipse_point(t: f64) -> Point2<f64> {
        // Axis-aligned ellipse centred at (4, -2), rotated by 30 degrees.
        let (s, c) = (TAU / 12.0).sin_cos();
        let (x, y) = (5.0 * t.cos(), 2.0 * t.sin());
        Point2::new(4.0 + c * x - s * y, -2.0 + s * x + c * y)
    }

    #[test]
    fn five_points_define_the_conic() {
        let data: Vec<_> = (0..5).map(|i| ellipse_point(i as f64 * 1.1)).collect();
        let models = ConicEstimator.estimate_model(&data, &[0, 1, 2, 3, 4]);
        assert_eq!(models.len(), 1);

        for i in 0..50 {
            let p = ellipse_point(i as f64 * TAU / 50.0);
            assert!(ConicEstimator.residual(&models[0], &p) < 1e-9);
        }
        assert!(ConicEstimator.residual(&models[0], &Point2::new(4.0, -2.0)) > 1e-3);
    }

    #[test]
    fn recovers_a_circle() {
        let truth = Conic::circle(Point2::new(1.0, 2.0), 3.0).unwrap();
        let data: Vec<_> = [0.1, 1.3, 2.0, 3.7, 5.1]
            .iter()
            .map(|t: &f64| Point2::new(1.0 + 3.0 * t.cos(), 2.0 + 3.0 * t.sin()))
            .collect();
        let model = &ConicEstimator.estimate_model(&data, &[0, 1, 2, 3, 4])[0];
        let sign = model.coefficients().dot(truth.coefficients()).signum();
        assert_relative_eq!(model.coefficients() * sign, *truth.coefficients(), epsilon = 1e-9);
    }

    #[test]
    fn degenerate_samples_yield_no_model() {
        // Four collinear points leave a two-dimensional family of conics.
        let data = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(2.0, 2.0),
            Point2::new(3.0, 3.0),
            Point2::new(0.0, 5.0),
        ];
        assert!(ConicEstimator.estimate_model(&data, &[0, 1, 2, 3, 4]).is_empty());
        assert!(!ConicEstimator.is_valid_sample(&data, &[0, 1, 2, 3, 3]));
    }

    #[test]
    fn full_fit_reports_algebraic_residuals() {
        let data: Vec<_> = (0..40).map(|i| ellipse_point(i as f64 * TAU / 40.0)).collect();
        let sample: Vec<usize> = (0..40).collect();
        let refinement = ConicEstimator.estimate_model_nonminimal(&data, &sample).unwrap();
        assert!(data.iter().all(|p| ConicEstimator.residual(&refinement.model, p) < 1e-9));

        let normal = refinement.normal_equations.unwrap();
        assert_eq!(normal.parameter_count(), 6);
        assert_eq!(normal.gauge_dimensions, 1);
        assert!(normal.residual_sum_squares < 1e-16);
    }
}
