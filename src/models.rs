//! Geometric models fitted by the reference estimators.
//!
//! Homogeneous models (conic, homography, camera) are stored with unit
//! Frobenius norm so that algebraic residuals are comparable across fits.

use nalgebra::{Matrix3, Matrix3x4, Point2, Point3, Vector3, Vector4, Vector6};

/// Below this norm a homogeneous coordinate or coefficient vector is treated as zero.
const EPS: f64 = 1e-12;

/// Conic `a x² + b xy + c y² + d x + e y + f = 0` with unit-norm coefficients.
#[derive(Clone, Debug, PartialEq)]
pub struct Conic {
    coefficients: Vector6<f64>,
}

impl Conic {
    /// Conic from `(a, b, c, d, e, f)`; `None` for the zero vector.
    pub fn new(coefficients: Vector6<f64>) -> Option<Self> {
        let norm = coefficients.norm();
        if !norm.is_finite() || norm < EPS {
            return None;
        }
        Some(Self {
            coefficients: coefficients / norm,
        })
    }

    /// Circle `(x − cx)² + (y − cy)² = r²`.
    pub fn circle(center: Point2<f64>, radius: f64) -> Option<Self> {
        let (cx, cy) = (center.x, center.y);
        Self::new(Vector6::new(
            1.0,
            0.0,
            1.0,
            -2.0 * cx,
            -2.0 * cy,
            cx * cx + cy * cy - radius * radius,
        ))
    }

    /// Conic of the symmetric part of `m`.
    pub fn from_matrix(m: &Matrix3<f64>) -> Option<Self> {
        let s = (m + m.transpose()) * 0.5;
        Self::new(Vector6::new(
            s[(0, 0)],
            2.0 * s[(0, 1)],
            s[(1, 1)],
            2.0 * s[(0, 2)],
            2.0 * s[(1, 2)],
            s[(2, 2)],
        ))
    }

    pub fn coefficients(&self) -> &Vector6<f64> {
        &self.coefficients
    }

    /// Symmetric matrix `C` with `[x y 1] C [x y 1]ᵀ` equal to [`evaluate`](Self::evaluate).
    pub fn matrix(&self) -> Matrix3<f64> {
        let k = &self.coefficients;
        let (a, b, c, d, e, f) = (k[0], k[1], k[2], k[3], k[4], k[5]);
        Matrix3::new(
            a,
            b / 2.0,
            d / 2.0,
            b / 2.0,
            c,
            e / 2.0,
            d / 2.0,
            e / 2.0,
            f,
        )
    }

    /// Algebraic value of the conic equation at `p`.
    pub fn evaluate(&self, p: &Point2<f64>) -> f64 {
        let (x, y) = (p.x, p.y);
        let k = &self.coefficients;
        k[0] * x * x + k[1] * x * y + k[2] * y * y + k[3] * x + k[4] * y + k[5]
    }

    /// Whether `p` lies on the conic up to `threshold` in algebraic distance.
    pub fn is_locus(&self, p: &Point2<f64>, threshold: f64) -> bool {
        self.evaluate(p).abs() < threshold
    }
}

/// Line `a x + b y + c = 0` with `a² + b² = 1`.
#[derive(Clone, Debug, PartialEq)]
pub struct Line2D {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Line2D {
    /// Normalizes the direction; `None` when `a = b = 0`.
    pub fn new(a: f64, b: f64, c: f64) -> Option<Self> {
        let norm = a.hypot(b);
        if !norm.is_finite() || norm < EPS {
            return None;
        }
        Some(Self {
            a: a / norm,
            b: b / norm,
            c: c / norm,
        })
    }

    /// Line through two distinct points.
    pub fn through(p: &Point2<f64>, q: &Point2<f64>) -> Option<Self> {
        let l = Vector3::new(p.x, p.y, 1.0).cross(&Vector3::new(q.x, q.y, 1.0));
        Self::new(l.x, l.y, l.z)
    }

    /// Euclidean distance from `p` to the line.
    pub fn distance(&self, p: &Point2<f64>) -> f64 {
        (self.a * p.x + self.b * p.y + self.c).abs()
    }
}

/// Plane `n · x + d = 0` with unit normal `n`.
#[derive(Clone, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vector3<f64>,
    pub d: f64,
}

impl Plane {
    /// Normalizes `(normal, d)`; `None` for a zero normal.
    pub fn new(normal: Vector3<f64>, d: f64) -> Option<Self> {
        let norm = normal.norm();
        if !norm.is_finite() || norm < EPS {
            return None;
        }
        Some(Self {
            normal: normal / norm,
            d: d / norm,
        })
    }

    /// Plane through three non-collinear points.
    pub fn through(p: &Point3<f64>, q: &Point3<f64>, r: &Point3<f64>) -> Option<Self> {
        let normal = (q - p).cross(&(r - p));
        Self::new(normal, -normal.dot(&p.coords))
    }

    pub fn distance(&self, p: &Point3<f64>) -> f64 {
        (self.normal.dot(&p.coords) + self.d).abs()
    }
}

/// Planar projective transformation, stored with its inverse.
#[derive(Clone, Debug, PartialEq)]
pub struct Homography {
    h: Matrix3<f64>,
    h_inv: Matrix3<f64>,
}

impl Homography {
    /// Homography from a non-singular matrix.
    pub fn new(h: Matrix3<f64>) -> Option<Self> {
        let norm = h.norm();
        if !norm.is_finite() || norm < EPS {
            return None;
        }
        let h = h / norm;
        let h_inv = h.try_inverse()?;
        if h_inv.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(Self { h, h_inv })
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.h
    }

    pub fn inverse_matrix(&self) -> &Matrix3<f64> {
        &self.h_inv
    }

    /// Map `p` from the source to the target image; `None` at infinity.
    pub fn transform(&self, p: &Point2<f64>) -> Option<Point2<f64>> {
        apply(&self.h, p)
    }

    /// Map `p` from the target back to the source image.
    pub fn inverse_transform(&self, p: &Point2<f64>) -> Option<Point2<f64>> {
        apply(&self.h_inv, p)
    }
}

fn apply(m: &Matrix3<f64>, p: &Point2<f64>) -> Option<Point2<f64>> {
    let q = m * Vector3::new(p.x, p.y, 1.0);
    if q.z.abs() < EPS {
        return None;
    }
    Some(Point2::new(q.x / q.z, q.y / q.z))
}

/// Projective camera `x ~ P X` with a 3×4 matrix `P`.
#[derive(Clone, Debug, PartialEq)]
pub struct PinholeCamera {
    p: Matrix3x4<f64>,
}

impl PinholeCamera {
    /// Camera from a projection matrix whose left 3×3 block is non-singular.
    pub fn new(p: Matrix3x4<f64>) -> Option<Self> {
        let norm = p.norm();
        if !norm.is_finite() || norm < EPS {
            return None;
        }
        let p = p / norm;
        if p.fixed_view::<3, 3>(0, 0).determinant().abs() < EPS {
            return None;
        }
        Some(Self { p })
    }

    pub fn matrix(&self) -> &Matrix3x4<f64> {
        &self.p
    }

    /// Image of `x`; `None` for points on the principal plane.
    pub fn project(&self, x: &Point3<f64>) -> Option<Point2<f64>> {
        let q = self.p * Vector4::new(x.x, x.y, x.z, 1.0);
        if q.z.abs() < EPS {
            return None;
        }
        Some(Point2::new(q.x / q.z, q.y / q.z))
    }

    /// Optical center, the right null vector of `P`.
    pub fn center(&self) -> Point3<f64> {
        let m = self.p.fixed_view::<3, 3>(0, 0).into_owned();
        let p4 = self.p.column(3).into_owned();
        // M c + p4 = 0; M is non-singular by construction.
        let c = m.lu().solve(&(-p4)).unwrap_or_else(Vector3::zeros);
        Point3::from(c)
    }
}
