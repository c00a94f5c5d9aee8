//! # consensus-fit - robust fitting of geometric models
//!
//! `consensus-fit` estimates geometric models (conics, lines, planes,
//! homographies, projective cameras) from data contaminated by outliers. One
//! generic engine, [`RobustEstimator`](robust::RobustEstimator), implements
//! RANSAC, LMedS, MSAC, PROSAC and PROMedS on top of any [`Estimator`].
//!
//! ## Quick Start
//!
//! The easiest way in is through the high-level [`api`] functions:
//!
//! ```rust
//! use consensus_fit::{fit_conic, RobustMethod, RobustSettings};
//! use nalgebra::Point2;
//!
//! // Points on the circle centred at (1, 2) with radius 3, plus one outlier.
//! let mut points: Vec<Point2<f64>> = (0..40)
//!     .map(|i| {
//!         let t = i as f64 * std::f64::consts::TAU / 40.0;
//!         Point2::new(1.0 + 3.0 * t.cos(), 2.0 + 3.0 * t.sin())
//!     })
//!     .collect();
//! points.push(Point2::new(10.0, 10.0));
//!
//! let settings = RobustSettings::default().with_threshold(1e-6).with_seed(42);
//! let estimate = fit_conic(&points, RobustMethod::Ransac, Some(settings), None).unwrap();
//! assert_eq!(estimate.inliers.inlier_count, 40);
//! assert!(!estimate.inliers.is_inlier(40));
//! ```
//!
//! ## Extending the Library
//!
//! Implement [`Estimator`] for a new geometric type: a minimal solver, an
//! optional full solver used for refinement, and a residual function.
//!
//! ```rust
//! use consensus_fit::core::Estimator;
//! use consensus_fit::robust::RobustEstimator;
//! use consensus_fit::settings::RobustMethod;
//!
//! /// Fits a constant to scalar observations.
//! struct Constant;
//!
//! impl Estimator for Constant {
//!     type Point = f64;
//!     type Model = f64;
//!
//!     fn sample_size(&self) -> usize {
//!         1
//!     }
//!
//!     fn estimate_model(&self, data: &[f64], sample: &[usize]) -> Vec<f64> {
//!         vec![data[sample[0]]]
//!     }
//!
//!     fn residual(&self, model: &f64, point: &f64) -> f64 {
//!         (model - point).abs()
//!     }
//! }
//!
//! let estimator = RobustEstimator::new(Constant, RobustMethod::Lmeds);
//! estimator.set_points(vec![2.0, 2.0, 2.0, 9.0, 2.0]).unwrap();
//! estimator.set_seed(Some(1)).unwrap();
//! let estimate = estimator.estimate().unwrap();
//! assert_eq!(estimate.model, 2.0);
//! ```
//!
//! ## Modules
//!
//! - **[`api`]**: high-level fitting functions
//! - **[`robust`]**: the robust estimator and its run state machine
//! - **[`core`]**: the [`Estimator`], [`Sampler`] and [`Scoring`] traits
//! - **[`samplers`]**: uniform and PROSAC sampling
//! - **[`scoring`]**: RANSAC, MSAC and least-median scoring
//! - **[`termination`]**: adaptive iteration bound and PROSAC stopping rule
//! - **[`optimisers`]**: refinement and covariance
//! - **[`estimators`]** and **[`models`]**: reference geometric estimators
//! - **[`settings`]**: configuration types

pub mod api;
pub mod choices;
pub mod core;
pub mod error;
pub mod estimators;
pub mod listener;
pub mod models;
pub mod optimisers;
pub mod robust;
pub mod samplers;
pub mod scoring;
pub mod settings;
pub mod termination;
pub mod types;
pub mod utils;

// Re-export high-level API
pub use api::{fit_camera, fit_conic, fit_homography, fit_line, fit_plane};

// Re-export core traits for easy access
pub use crate::core::{Estimator, Sampler, Scoring};

pub use error::EstimatorError;
pub use listener::EstimatorListener;
pub use robust::RobustEstimator;
pub use settings::{RobustMethod, RobustSettings};
pub use types::{InliersData, RobustEstimate};
