//! Minimal-sample drawing strategies.
//!
//! - [`UniformRandomSampler`] backs RANSAC, LMedS and MSAC.
//! - [`ProsacSampler`] backs PROSAC and PROMedS. It draws from a growing prefix
//!   of the correspondences ordered by decreasing quality.

pub mod prosac;
pub mod uniform;

pub use prosac::ProsacSampler;
pub use uniform::UniformRandomSampler;
