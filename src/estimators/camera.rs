//! Pinhole camera resection with the normalized direct linear transform.

use nalgebra::{DMatrix, DVector, Matrix3x4, Point2, Point3};

use crate::core::{Estimator, NormalEquations, Refinement};
use crate::models::PinholeCamera;
use crate::types::WorldImageCorrespondence;
use crate::utils::{normalizing_transform_2d, normalizing_transform_3d, null_vector};

use super::has_distinct_indices;

/// Estimates a 3×4 projective camera from world/image correspondences.
///
/// Six correspondences determine the 11 degrees of freedom of `P`. The
/// residual is the reprojection error in image units; points projecting to
/// infinity get an infinite residual.
#[derive(Debug, Clone, Copy, Default)]
pub struct PinholeCameraEstimator;

impl PinholeCameraEstimator {
    pub fn new() -> Self {
        Self
    }

    fn fit(&self, data: &[WorldImageCorrespondence], sample: &[usize]) -> Option<PinholeCamera> {
        let (world, image): (Vec<Point3<f64>>, Vec<Point2<f64>>) =
            sample.iter().map(|&i| (data[i].world, data[i].image)).unzip();
        let t3 = normalizing_transform_3d(&world)?;
        let t2 = normalizing_transform_2d(&image)?;
        let world_n: Vec<_> = world.iter().map(|p| t3.transform_point(p)).collect();
        let image_n: Vec<_> = image.iter().map(|p| t2.transform_point(p)).collect();

        let v = null_vector(&design_matrix(&world_n, &image_n))?;
        let p_normalized = Matrix3x4::from_row_slice(v.as_slice());
        PinholeCamera::new(t2.try_inverse()? * p_normalized * t3)
    }
}

/// Rows `[Xᵀ, 0, −u Xᵀ]` and `[0, Xᵀ, −v Xᵀ]`, linear in the row-major entries of `P`.
fn design_matrix(world: &[Point3<f64>], image: &[Point2<f64>]) -> DMatrix<f64> {
    let mut a = DMatrix::zeros(2 * world.len(), 12);
    for (i, (w, x)) in world.iter().zip(image).enumerate() {
        let h = [w.x, w.y, w.z, 1.0];
        for k in 0..4 {
            a[(2 * i, k)] = h[k];
            a[(2 * i, 8 + k)] = -x.x * h[k];
            a[(2 * i + 1, 4 + k)] = h[k];
            a[(2 * i + 1, 8 + k)] = -x.y * h[k];
        }
    }
    a
}

impl Estimator for PinholeCameraEstimator {
    type Point = WorldImageCorrespondence;
    type Model = PinholeCamera;

    fn sample_size(&self) -> usize {
        6
    }

    fn is_valid_sample(&self, _data: &[WorldImageCorrespondence], sample: &[usize]) -> bool {
        sample.len() == 6 && has_distinct_indices(sample)
    }

    fn estimate_model(&self, data: &[WorldImageCorrespondence], sample: &[usize]) -> Vec<PinholeCamera> {
        self.fit(data, sample).into_iter().collect()
    }

    fn estimate_model_nonminimal(
        &self,
        data: &[WorldImageCorrespondence],
        sample: &[usize],
    ) -> Option<Refinement<PinholeCamera>> {
        if sample.len() < 6 {
            return None;
        }
        let camera = self.fit(data, sample)?;
        let (world, image): (Vec<Point3<f64>>, Vec<Point2<f64>>) =
            sample.iter().map(|&i| (data[i].world, data[i].image)).unzip();
        let params = DVector::from_row_slice(camera.matrix().transpose().as_slice());
        let normal_equations = NormalEquations::from_design(&design_matrix(&world, &image), &params, 1);
        Some(Refinement::new(camera).with_normal_equations(normal_equations))
    }

    fn residual(&self, model: &PinholeCamera, point: &WorldImageCorrespondence) -> f64 {
        model
            .project(&point.world)
            .map_or(f64::INFINITY, |x| (x - point.image).norm())
    }
}
