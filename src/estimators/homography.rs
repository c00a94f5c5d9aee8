//! Homography estimator: 4-point Gaussian elimination and normalized DLT.

use nalgebra::{DMatrix, DVector, Matrix3, Point2};

use crate::core::{Estimator, NormalEquations, Refinement};
use crate::models::Homography;
use crate::types::Correspondence2D;
use crate::utils::{gauss_elimination, normalizing_transform_2d, null_vector};

use super::has_distinct_indices;

/// Estimates planar homographies from point correspondences.
///
/// The residual is the symmetric transfer error: the root mean square of the
/// forward distance `‖t − H s‖` and the backward distance `‖s − H⁻¹ t‖`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HomographyEstimator;

impl HomographyEstimator {
    pub fn new() -> Self {
        Self
    }

    /// Minimal model with `h₃₃ = 1`, solved by Gaussian elimination on
    /// normalized coordinates.
    fn estimate_minimal_model(&self, data: &[Correspondence2D], sample: &[usize]) -> Option<Homography> {
        let (src, dst) = split(data, sample);
        let t1 = normalizing_transform_2d(&src)?;
        let t2 = normalizing_transform_2d(&dst)?;

        let mut augmented = DMatrix::<f64>::zeros(8, 9);
        for (i, (s, d)) in src.iter().zip(&dst).enumerate() {
            let s = t1.transform_point(s);
            let d = t2.transform_point(d);
            let (x1, y1, x2, y2) = (s.x, s.y, d.x, d.y);

            let r = 2 * i;
            augmented[(r, 0)] = -x1;
            augmented[(r, 1)] = -y1;
            augmented[(r, 2)] = -1.0;
            augmented[(r, 6)] = x2 * x1;
            augmented[(r, 7)] = x2 * y1;
            augmented[(r, 8)] = -x2;

            augmented[(r + 1, 3)] = -x1;
            augmented[(r + 1, 4)] = -y1;
            augmented[(r + 1, 5)] = -1.0;
            augmented[(r + 1, 6)] = y2 * x1;
            augmented[(r + 1, 7)] = y2 * y1;
            augmented[(r + 1, 8)] = -y2;
        }

        let mut h = DVector::<f64>::zeros(8);
        if !gauss_elimination(&mut augmented, &mut h) || h.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let h_normalized = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
        denormalize(&h_normalized, &t1, &t2)
    }
}

fn split(data: &[Correspondence2D], sample: &[usize]) -> (Vec<Point2<f64>>, Vec<Point2<f64>>) {
    sample.iter().map(|&i| (data[i].source, data[i].target)).unzip()
}

fn denormalize(h: &Matrix3<f64>, t1: &Matrix3<f64>, t2: &Matrix3<f64>) -> Option<Homography> {
    let t2_inv = t2.try_inverse()?;
    Homography::new(t2_inv * h * t1)
}

/// Two DLT rows per correspondence, linear in the row-major entries of `H`.
fn design_matrix(src: &[Point2<f64>], dst: &[Point2<f64>]) -> DMatrix<f64> {
    let mut a = DMatrix::zeros(2 * src.len(), 9);
    for (i, (s, d)) in src.iter().zip(dst).enumerate() {
        let x = [s.x, s.y, 1.0];
        for k in 0..3 {
            a[(2 * i, k)] = x[k];
            a[(2 * i, 6 + k)] = -d.x * x[k];
            a[(2 * i + 1, 3 + k)] = x[k];
            a[(2 * i + 1, 6 + k)] = -d.y * x[k];
        }
    }
    a
}

impl Estimator for HomographyEstimator {
    type Point = Correspondence2D;
    type Model = Homography;

    fn sample_size(&self) -> usize {
        4
    }

    fn is_valid_sample(&self, _data: &[Correspondence2D], sample: &[usize]) -> bool {
        sample.len() == 4 && has_distinct_indices(sample)
    }

    fn estimate_model(&self, data: &[Correspondence2D], sample: &[usize]) -> Vec<Homography> {
        self.estimate_minimal_model(data, sample).into_iter().collect()
    }

    fn estimate_model_nonminimal(
        &self,
        data: &[Correspondence2D],
        sample: &[usize],
    ) -> Option<Refinement<Homography>> {
        if sample.len() < 4 {
            return None;
        }
        let (src, dst) = split(data, sample);
        let t1 = normalizing_transform_2d(&src)?;
        let t2 = normalizing_transform_2d(&dst)?;
        let src_n: Vec<_> = src.iter().map(|p| t1.transform_point(p)).collect();
        let dst_n: Vec<_> = dst.iter().map(|p| t2.transform_point(p)).collect();

        let v = null_vector(&design_matrix(&src_n, &dst_n))?;
        let homography = denormalize(&Matrix3::from_row_slice(v.as_slice()), &t1, &t2)?;

        let h = homography.matrix();
        let params = DVector::from_row_slice(&[
            h[(0, 0)],
            h[(0, 1)],
            h[(0, 2)],
            h[(1, 0)],
            h[(1, 1)],
            h[(1, 2)],
            h[(2, 0)],
            h[(2, 1)],
            h[(2, 2)],
        ]);
        let normal_equations = NormalEquations::from_design(&design_matrix(&src, &dst), &params, 1);
        Some(Refinement::new(homography).with_normal_equations(normal_equations))
    }

    fn residual(&self, model: &Homography, point: &Correspondence2D) -> f64 {
        let (Some(forward), Some(backward)) = (
            model.transform(&point.source),
            model.inverse_transform(&point.target),
        ) else {
            return f64::INFINITY;
        };
        let f = (forward - point.target).norm_squared();
        let b = (backward - point.source).norm_squared();
        (0.5 * (f + b)).sqrt()
    }
}
