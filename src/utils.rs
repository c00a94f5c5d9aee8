//! Numerical and random-number helpers shared by the engine and the reference
//! estimators.

use nalgebra::{DMatrix, DVector, Matrix3, Matrix4, Point2, Point3};
use ordered_float::OrderedFloat;
use rand::distributions::uniform::SampleUniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Uniform integer generator drawing sets of distinct values.
///
/// Seeded explicitly for reproducible runs, or from OS entropy otherwise.
pub struct UniformRandomGenerator {
    rng: StdRng,
}

impl Default for UniformRandomGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl UniformRandomGenerator {
    /// Construct with an entropy-seeded RNG.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Construct with a fixed seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seeded when `seed` is set, entropy-seeded otherwise.
    pub fn from_optional_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::from_seed(seed),
            None => Self::new(),
        }
    }

    /// Draw a single value in `[min, max]`.
    pub fn next_in<T>(&mut self, min: T, max: T) -> T
    where
        T: SampleUniform + PartialOrd,
    {
        self.rng.gen_range(min..=max)
    }

    /// Fill `out` with distinct values drawn uniformly from `[min, max]`.
    ///
    /// Rejection sampling; intended for minimal-sample sizes, which are much
    /// smaller than the range. The range must hold at least `out.len()` values.
    pub fn gen_unique<T>(&mut self, out: &mut [T], min: T, max: T)
    where
        T: SampleUniform + PartialOrd + Copy,
    {
        for i in 0..out.len() {
            loop {
                let candidate = self.rng.gen_range(min..=max);
                if out[..i].iter().all(|&v| v != candidate) {
                    out[i] = candidate;
                    break;
                }
            }
        }
    }
}

/// Median of `values`, reordering the slice in place.
///
/// For an even count the two middle values are averaged. Returns `None` for an
/// empty slice.
pub fn median_in_place(values: &mut [f64]) -> Option<f64> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    let mid = n / 2;
    let (lower, upper, _) = values.select_nth_unstable_by_key(mid, |v| OrderedFloat(*v));
    let upper = *upper;
    if n % 2 == 1 {
        return Some(upper);
    }
    let below = lower
        .iter()
        .copied()
        .max_by_key(|v| OrderedFloat(*v))
        .unwrap_or(upper);
    Some(0.5 * (below + upper))
}

// Lanczos approximation of ln Γ(x) for x > 0.
pub(crate) fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return pi.ln() - (pi * x).sin().ln() - ln_gamma(1.0 - x);
    }
    let z = x - 1.0;
    let mut sum = COEFFS[0];
    for (i, c) in COEFFS.iter().enumerate().skip(1) {
        sum += c / (z + i as f64);
    }
    let t = z + 7.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (z + 0.5) * t.ln() - t + sum.ln()
}

/// Natural logarithm of the binomial probability `P(X = k)`, `X ~ Bin(n, p)`.
pub(crate) fn ln_binomial_pmf(n: usize, k: usize, p: f64) -> f64 {
    if k > n {
        return f64::NEG_INFINITY;
    }
    let (nf, kf) = (n as f64, k as f64);
    let ln_choose = ln_gamma(nf + 1.0) - ln_gamma(kf + 1.0) - ln_gamma(nf - kf + 1.0);
    let ln_p = if k == 0 { 0.0 } else { kf * p.ln() };
    let ln_q = if k == n { 0.0 } else { (nf - kf) * (1.0 - p).ln() };
    ln_choose + ln_p + ln_q
}

/// Smallest `j` such that `P(X >= j) < psi` for `X ~ Bin(n, p)`.
///
/// Returns `n + 1` when even `P(X >= n)` is not below `psi`.
pub(crate) fn binomial_tail_quantile(n: usize, p: f64, psi: f64) -> usize {
    let mut tail = 0.0;
    for j in (0..=n).rev() {
        tail += ln_binomial_pmf(n, j, p).exp();
        if tail >= psi {
            return j + 1;
        }
    }
    0
}

/// Unit-norm vector spanning the (approximate) null space of `a`.
///
/// `a` is padded with zero rows when it has fewer rows than columns so that the
/// SVD yields a full right basis. Returns `None` when the SVD fails or the two
/// smallest singular values are both negligible, i.e. the null space is not
/// one-dimensional.
pub fn null_vector(a: &DMatrix<f64>) -> Option<DVector<f64>> {
    let cols = a.ncols();
    if cols == 0 {
        return None;
    }
    let padded = if a.nrows() < cols {
        let mut m = DMatrix::<f64>::zeros(cols, cols);
        m.rows_mut(0, a.nrows()).copy_from(a);
        m
    } else {
        a.clone()
    };

    let svd = padded.svd(false, true);
    let v_t = svd.v_t?;
    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by_key(|&i| OrderedFloat(svd.singular_values[i]));

    let largest = svd.singular_values.max();
    if cols > 1 && svd.singular_values[order[1]] <= largest * 1e-10 {
        return None;
    }

    let v = v_t.row(order[0]).transpose();
    let norm = v.norm();
    if !norm.is_finite() || norm < f64::EPSILON {
        return None;
    }
    Some(v / norm)
}

/// Similarity transform moving the centroid of `points` to the origin and
/// scaling their mean distance from it to `sqrt(2)`.
pub fn normalizing_transform_2d(points: &[Point2<f64>]) -> Option<Matrix3<f64>> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let centroid = points.iter().fold(nalgebra::Vector2::zeros(), |acc, p| acc + p.coords) / n;
    let mean_dist = points.iter().map(|p| (p.coords - centroid).norm()).sum::<f64>() / n;
    if mean_dist < f64::EPSILON {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    Some(Matrix3::new(
        s,
        0.0,
        -s * centroid.x,
        0.0,
        s,
        -s * centroid.y,
        0.0,
        0.0,
        1.0,
    ))
}

/// 3D analogue of [`normalizing_transform_2d`] with target mean distance `sqrt(3)`.
pub fn normalizing_transform_3d(points: &[Point3<f64>]) -> Option<Matrix4<f64>> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let centroid = points.iter().fold(nalgebra::Vector3::zeros(), |acc, p| acc + p.coords) / n;
    let mean_dist = points.iter().map(|p| (p.coords - centroid).norm()).sum::<f64>() / n;
    if mean_dist < f64::EPSILON {
        return None;
    }
    let s = 3.0_f64.sqrt() / mean_dist;
    let mut t = Matrix4::identity() * s;
    t[(3, 3)] = 1.0;
    t[(0, 3)] = -s * centroid.x;
    t[(1, 3)] = -s * centroid.y;
    t[(2, 3)] = -s * centroid.z;
    Some(t)
}

/// Gaussian elimination with partial pivoting solving `A * x = b`.
///
/// `augmented` is `[A | b]` with `A` square. Returns `false` for a (numerically)
/// singular system.
pub fn gauss_elimination(augmented: &mut DMatrix<f64>, result: &mut DVector<f64>) -> bool {
    let n = augmented.nrows();
    if augmented.ncols() != n + 1 || n != result.len() {
        return false;
    }

    for i in 0..n {
        let mut max_row = i;
        let mut max_val = augmented[(i, i)].abs();
        for k in (i + 1)..n {
            let val = augmented[(k, i)].abs();
            if val > max_val {
                max_val = val;
                max_row = k;
            }
        }
        if max_row != i {
            augmented.swap_rows(i, max_row);
        }

        if augmented[(i, i)].abs() < 1e-10 {
            return false;
        }

        for k in (i + 1)..n {
            let factor = augmented[(k, i)] / augmented[(i, i)];
            for j in i..=n {
                augmented[(k, j)] -= factor * augmented[(i, j)];
            }
        }
    }

    for i in (0..n).rev() {
        let mut value = augmented[(i, n)];
        for j in (i + 1)..n {
            value -= augmented[(i, j)] * result[j];
        }
        result[i] = value / augmented[(i, i)];
    }

    true
}
