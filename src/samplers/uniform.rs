//! Uniform random sampler drawing minimal samples without replacement.

use crate::core::Sampler;
use crate::utils::UniformRandomGenerator;

/// Uniform random sampler drawing minimal samples without replacement.
pub struct UniformRandomSampler {
    rng: UniformRandomGenerator,
}

impl Default for UniformRandomSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl UniformRandomSampler {
    /// Construct a new sampler with a random seed.
    pub fn new() -> Self {
        Self {
            rng: UniformRandomGenerator::new(),
        }
    }

    /// Construct a sampler from a fixed seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: UniformRandomGenerator::from_seed(seed),
        }
    }

    pub fn with_rng(rng: UniformRandomGenerator) -> Self {
        Self { rng }
    }
}

impl Sampler for UniformRandomSampler {
    fn sample(&mut self, point_count: usize, sample_size: usize, out_indices: &mut [usize]) -> bool {
        if sample_size == 0 || sample_size > point_count || out_indices.len() < sample_size {
            return false;
        }

        self.rng
            .gen_unique(&mut out_indices[..sample_size], 0, point_count - 1);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draws_distinct_indices_in_range() {
        let mut sampler = UniformRandomSampler::from_seed(5);
        let mut sample = [0usize; 4];
        for _ in 0..100 {
            assert!(sampler.sample(10, 4, &mut sample));
            assert!(sample.iter().all(|&i| i < 10));
            let mut sorted = sample.to_vec();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), 4);
        }
    }

    #[test]
    fn rejects_impossible_sizes() {
        let mut sampler = UniformRandomSampler::from_seed(5);
        let mut sample = [0usize; 4];
        assert!(!sampler.sample(3, 4, &mut sample));
        assert!(!sampler.sample(10, 0, &mut sample));
        assert!(!sampler.sample(10, 5, &mut sample));
        assert!(sampler.active_points().is_none());
    }

    #[test]
    fn same_seed_same_samples() {
        let mut a = UniformRandomSampler::from_seed(11);
        let mut b = UniformRandomSampler::from_seed(11);
        let (mut sa, mut sb) = ([0usize; 3], [0usize; 3]);
        for _ in 0..10 {
            a.sample(50, 3, &mut sa);
            b.sample(50, 3, &mut sb);
            assert_eq!(sa, sb);
        }
    }
}
