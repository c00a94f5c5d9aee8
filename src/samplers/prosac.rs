//! PROSAC sampler: progressively grows the subset of high-quality points.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;

use crate::core::Sampler;
use crate::utils::UniformRandomGenerator;

/// PROSAC sampler: progressively grows the subset of high-quality points.
///
/// Correspondences are ranked once by decreasing quality. Draw `t` samples from
/// the `n(t)` best-ranked points, where `n(t)` follows the PROSAC growth
/// function `T'_n`. While the draw count has not passed `T'_n`, the sample
/// holds the newest point of the active set and `k − 1` points from the
/// ones before it. After `convergence_iterations` draws sampling degrades to
/// uniform RANSAC over all points.
pub struct ProsacSampler {
    rng: UniformRandomGenerator,
    ordering: Vec<usize>,
    growth_function: Vec<usize>,
    ranks: Vec<usize>,
    sample_size: usize,
    convergence_iterations: usize,
    kth_sample_number: usize,
    subset_size: usize,
}

impl ProsacSampler {
    /// Build a sampler for `quality_scores.len()` points, higher score first.
    pub fn new(
        quality_scores: &[f64],
        sample_size: usize,
        convergence_iterations: usize,
        rng: UniformRandomGenerator,
    ) -> Self {
        let point_number = quality_scores.len();
        let mut ordering: Vec<usize> = (0..point_number).collect();
        ordering.sort_by_key(|&i| Reverse(OrderedFloat(quality_scores[i])));

        let mut sampler = Self {
            rng,
            ordering,
            growth_function: Vec::new(),
            ranks: vec![0; sample_size],
            sample_size,
            convergence_iterations,
            kth_sample_number: 0,
            subset_size: sample_size.min(point_number),
        };
        sampler.initialize_growth_function();
        sampler
    }

    /// Construct from a fixed RNG seed.
    pub fn from_seed(
        quality_scores: &[f64],
        sample_size: usize,
        convergence_iterations: usize,
        seed: u64,
    ) -> Self {
        Self::new(
            quality_scores,
            sample_size,
            convergence_iterations,
            UniformRandomGenerator::from_seed(seed),
        )
    }

    fn initialize_growth_function(&mut self) {
        let point_number = self.ordering.len();
        let sample_size = self.sample_size;
        self.growth_function = vec![0; point_number];
        if sample_size == 0 || sample_size > point_number {
            return;
        }

        // T_n for n = sample_size, starting from T_N = convergence_iterations.
        let mut t_n = self.convergence_iterations as f64;
        for i in 0..sample_size {
            t_n *= (sample_size - i) as f64 / (point_number - i) as f64;
        }

        let mut t_n_prime: usize = 1;
        for i in 0..point_number {
            if i < sample_size {
                self.growth_function[i] = t_n_prime;
                continue;
            }
            let t_n_plus1 = (i + 1) as f64 * t_n / (i + 1 - sample_size) as f64;
            self.growth_function[i] = t_n_prime + (t_n_plus1 - t_n).ceil() as usize;
            t_n = t_n_plus1;
            t_n_prime = self.growth_function[i];
        }
    }

    /// Point indices ranked by decreasing quality.
    pub fn ordering(&self) -> &[usize] {
        &self.ordering
    }

    /// Current size `n(t)` of the active set.
    pub fn subset_size(&self) -> usize {
        if self.has_converged() {
            self.ordering.len()
        } else {
            self.subset_size
        }
    }

    /// `T'_n` for every active-set size `n = 1..=N` (index `n − 1`).
    pub fn growth_function(&self) -> &[usize] {
        &self.growth_function
    }

    fn has_converged(&self) -> bool {
        self.kth_sample_number > self.convergence_iterations
    }
}

impl Sampler for ProsacSampler {
    fn sample(&mut self, point_count: usize, sample_size: usize, out_indices: &mut [usize]) -> bool {
        let n = self.ordering.len();
        if sample_size == 0
            || sample_size != self.sample_size
            || point_count != n
            || sample_size > n
            || out_indices.len() < sample_size
        {
            return false;
        }

        self.kth_sample_number += 1;

        if self.has_converged() {
            self.rng.gen_unique(&mut self.ranks[..], 0, n - 1);
        } else {
            if self.kth_sample_number > self.growth_function[self.subset_size - 1]
                && self.subset_size < n
            {
                self.subset_size += 1;
            }

            if self.kth_sample_number <= self.growth_function[self.subset_size - 1] {
                // Semi-random sample: the newest point plus k - 1 earlier ones.
                let newest = self.subset_size - 1;
                if sample_size > 1 {
                    self.rng
                        .gen_unique(&mut self.ranks[..sample_size - 1], 0, newest - 1);
                }
                self.ranks[sample_size - 1] = newest;
            } else {
                self.rng
                    .gen_unique(&mut self.ranks[..], 0, self.subset_size - 1);
            }
        }

        for (out, &rank) in out_indices.iter_mut().zip(self.ranks.iter()) {
            *out = self.ordering[rank];
        }
        true
    }

    fn active_points(&self) -> Option<&[usize]> {
        Some(&self.ordering[..self.subset_size()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descending_scores(n: usize) -> Vec<f64> {
        (0..n).map(|i| 1.0 - i as f64 / n as f64).collect()
    }

    #[test]
    fn ranks_points_by_decreasing_quality() {
        let scores = [0.2, 0.9, 0.5, 0.9, 0.1];
        let sampler = ProsacSampler::from_seed(&scores, 2, 1000, 1);
        // Stable on ties: index 1 precedes index 3.
        assert_eq!(sampler.ordering(), &[1, 3, 2, 0, 4]);
    }

    #[test]
    fn first_sample_is_the_best_ranked_points() {
        let scores = [0.1, 0.8, 0.3, 0.9, 0.7, 0.2];
        let mut sampler = ProsacSampler::from_seed(&scores, 3, 1000, 2);
        let mut sample = [0usize; 3];
        assert!(sampler.sample(6, 3, &mut sample));
        let mut sorted = sample.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 3, 4]);
    }

    #[test]
    fn growth_function_is_monotonic() {
        let sampler = ProsacSampler::from_seed(&descending_scores(200), 4, 100_000, 3);
        let growth = sampler.growth_function();
        assert_eq!(growth.len(), 200);
        assert!(growth[..4].iter().all(|&g| g == 1));
        assert!(growth.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn active_set_grows_and_samples_stay_inside_it() {
        let n = 50;
        let mut sampler = ProsacSampler::from_seed(&descending_scores(n), 3, 2000, 4);
        let mut sample = [0usize; 3];
        let mut previous = sampler.subset_size();
        for _ in 0..500 {
            assert!(sampler.sample(n, 3, &mut sample));
            let active = sampler.active_points().unwrap().to_vec();
            assert!(sampler.subset_size() >= previous);
            previous = sampler.subset_size();
            assert!(sample.iter().all(|i| active.contains(i)));
            let mut sorted = sample.to_vec();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), 3);
        }
        assert!(previous > 3);
    }

    #[test]
    fn every_point_eventually_becomes_active() {
        let n = 30;
        let mut sampler = ProsacSampler::from_seed(&descending_scores(n), 2, 100, 5);
        let mut sample = [0usize; 2];
        let mut seen = vec![false; n];
        for _ in 0..2000 {
            assert!(sampler.sample(n, 2, &mut sample));
            for &i in &sample {
                seen[i] = true;
            }
        }
        assert_eq!(sampler.subset_size(), n);
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn rejects_mismatched_sizes() {
        let mut sampler = ProsacSampler::from_seed(&descending_scores(10), 3, 100, 6);
        let mut sample = [0usize; 3];
        assert!(!sampler.sample(9, 3, &mut sample));
        assert!(!sampler.sample(10, 2, &mut sample));
    }
}
