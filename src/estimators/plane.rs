//! Plane estimator for 3D point clouds.

use nalgebra::{DMatrix, DVector, Matrix3, Point3, Vector3};

use crate::core::{Estimator, NormalEquations, Refinement};
use crate::models::Plane;

use super::has_distinct_indices;

/// Fits planes `n · x + d = 0` to 3D points; the residual is the point-plane
/// distance.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaneEstimator;

impl PlaneEstimator {
    pub fn new() -> Self {
        Self
    }
}

impl Estimator for PlaneEstimator {
    type Point = Point3<f64>;
    type Model = Plane;

    fn sample_size(&self) -> usize {
        3
    }

    fn is_valid_sample(&self, _data: &[Point3<f64>], sample: &[usize]) -> bool {
        sample.len() == 3 && has_distinct_indices(sample)
    }

    fn estimate_model(&self, data: &[Point3<f64>], sample: &[usize]) -> Vec<Plane> {
        Plane::through(&data[sample[0]], &data[sample[1]], &data[sample[2]])
            .into_iter()
            .collect()
    }

    fn estimate_model_nonminimal(
        &self,
        data: &[Point3<f64>],
        sample: &[usize],
    ) -> Option<Refinement<Plane>> {
        if sample.len() < 3 {
            return None;
        }
        let n = sample.len() as f64;
        let centroid = sample
            .iter()
            .fold(Vector3::zeros(), |acc, &i| acc + data[i].coords)
            / n;
        let scatter = sample.iter().fold(Matrix3::zeros(), |acc, &i| {
            let d = data[i].coords - centroid;
            acc + d * d.transpose()
        });

        let eigen = scatter.symmetric_eigen();
        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));
        // Collinear points leave two directions without spread.
        if eigen.eigenvalues[order[1]] <= eigen.eigenvalues[order[2]] * 1e-12 {
            return None;
        }
        let normal = eigen.eigenvectors.column(order[0]).into_owned();
        let plane = Plane::new(normal, -normal.dot(&centroid))?;

        let mut j = DMatrix::zeros(sample.len(), 4);
        for (row, &i) in sample.iter().enumerate() {
            let p = data[i];
            j[(row, 0)] = p.x;
            j[(row, 1)] = p.y;
            j[(row, 2)] = p.z;
            j[(row, 3)] = 1.0;
        }
        let params = DVector::from_vec(vec![plane.normal.x, plane.normal.y, plane.normal.z, plane.d]);
        let normal_equations = NormalEquations::from_design(&j, &params, 1);
        Some(Refinement::new(plane).with_normal_equations(normal_equations))
    }

    fn residual(&self, model: &Plane, point: &Point3<f64>) -> f64 {
        model.distance(point)
    }
}
