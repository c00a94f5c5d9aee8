//! The robust estimation loop and its `Idle`/`Running` state machine.

use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;

use log::{debug, trace, warn};

use crate::choices::{SamplerChoice, ScoringChoice};
use crate::core::{Estimator, Sampler, Score, Scoring};
use crate::error::{EstimationFailure, EstimatorError, NotReadyReason};
use crate::listener::EstimatorListener;
use crate::optimisers::{self, LeastSquaresRefiner};
use crate::settings::{
    check_confidence, check_max_iterations, check_max_sample_retries, check_progress_delta,
    check_prosac, check_stop_threshold, check_threshold, ProsacSettings, RobustMethod,
    RobustSettings,
};
use crate::termination::{IterationController, ProsacStoppingRule};
use crate::types::{InliersData, RobustEstimate};

/// Run state of a [`RobustEstimator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorState {
    Idle,
    Running,
}

/// Holds the estimator in `Running` and restores `Idle` when dropped.
struct RunGuard<'a> {
    state: &'a Cell<EstimatorState>,
}

impl<'a> RunGuard<'a> {
    fn acquire(state: &'a Cell<EstimatorState>) -> Result<Self, EstimatorError> {
        if state.get() == EstimatorState::Running {
            return Err(EstimatorError::Locked);
        }
        state.set(EstimatorState::Running);
        Ok(Self { state })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.state.set(EstimatorState::Idle);
    }
}

/// Best hypothesis found so far.
struct Hypothesis<M> {
    model: M,
    score: Score,
    residuals: Vec<f64>,
}

/// Robust estimator generic over the geometric [`Estimator`].
///
/// One type covers RANSAC, LMedS, MSAC, PROSAC and PROMedS; the
/// [`RobustMethod`] picks the sampler and the scoring. Configuration, data and
/// listener live behind interior mutability so that setters take `&self`.
/// While [`estimate`](Self::estimate) runs, every setter, and `estimate`
/// itself, return [`EstimatorError::Locked`].
///
/// ```
/// use consensus_fit::estimators::LineEstimator;
/// use consensus_fit::robust::RobustEstimator;
/// use consensus_fit::settings::RobustMethod;
/// use nalgebra::Point2;
///
/// let mut points: Vec<Point2<f64>> = (0..20).map(|i| Point2::new(i as f64, 2.0 * i as f64 + 1.0)).collect();
/// points.push(Point2::new(3.0, -40.0));
///
/// let estimator = RobustEstimator::new(LineEstimator, RobustMethod::Ransac);
/// estimator.set_threshold(1e-3)?;
/// estimator.set_seed(Some(7))?;
/// estimator.set_points(points)?;
///
/// let estimate = estimator.estimate()?;
/// assert_eq!(estimate.inliers.inlier_count, 20);
/// assert!(!estimate.inliers.is_inlier(20));
/// # Ok::<(), consensus_fit::error::EstimatorError>(())
/// ```
pub struct RobustEstimator<E: Estimator> {
    estimator: E,
    method: Cell<RobustMethod>,
    state: Cell<EstimatorState>,
    settings: RefCell<RobustSettings>,
    points: RefCell<Vec<E::Point>>,
    quality_scores: RefCell<Option<Vec<f64>>>,
    listener: RefCell<Option<Rc<dyn EstimatorListener<E>>>>,
}

impl<E: Estimator> RobustEstimator<E> {
    /// Estimator with default settings and no data.
    pub fn new(estimator: E, method: RobustMethod) -> Self {
        Self {
            estimator,
            method: Cell::new(method),
            state: Cell::new(EstimatorState::Idle),
            settings: RefCell::new(RobustSettings::default()),
            points: RefCell::new(Vec::new()),
            quality_scores: RefCell::new(None),
            listener: RefCell::new(None),
        }
    }

    /// Estimator with validated `settings`.
    pub fn with_settings(
        estimator: E,
        method: RobustMethod,
        settings: RobustSettings,
    ) -> Result<Self, EstimatorError> {
        settings.validate()?;
        let robust = Self::new(estimator, method);
        robust.settings.replace(settings);
        Ok(robust)
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    pub fn method(&self) -> RobustMethod {
        self.method.get()
    }

    pub fn sample_size(&self) -> usize {
        self.estimator.sample_size()
    }

    pub fn state(&self) -> EstimatorState {
        self.state.get()
    }

    pub fn is_locked(&self) -> bool {
        self.state.get() == EstimatorState::Running
    }

    /// Whether [`estimate`](Self::estimate) would pass its readiness check.
    pub fn is_ready(&self) -> bool {
        self.readiness().is_ok()
    }

    /// Snapshot of the current settings.
    pub fn settings(&self) -> RobustSettings {
        self.settings.borrow().clone()
    }

    pub fn threshold(&self) -> f64 {
        self.settings.borrow().threshold
    }

    pub fn confidence(&self) -> f64 {
        self.settings.borrow().confidence
    }

    pub fn max_iterations(&self) -> usize {
        self.settings.borrow().max_iterations
    }

    pub fn progress_delta(&self) -> f32 {
        self.settings.borrow().progress_delta
    }

    pub fn is_result_refined(&self) -> bool {
        self.settings.borrow().result_refined
    }

    pub fn is_covariance_kept(&self) -> bool {
        self.settings.borrow().keep_covariance
    }

    pub fn stop_threshold(&self) -> f64 {
        self.settings.borrow().stop_threshold
    }

    pub fn seed(&self) -> Option<u64> {
        self.settings.borrow().seed
    }

    pub fn max_sample_retries(&self) -> usize {
        self.settings.borrow().max_sample_retries
    }

    pub fn prosac_settings(&self) -> ProsacSettings {
        self.settings.borrow().prosac
    }

    pub fn points(&self) -> Ref<'_, [E::Point]> {
        Ref::map(self.points.borrow(), |points| points.as_slice())
    }

    pub fn quality_scores(&self) -> Option<Ref<'_, [f64]>> {
        Ref::filter_map(self.quality_scores.borrow(), |scores| scores.as_deref()).ok()
    }

    pub fn listener(&self) -> Option<Rc<dyn EstimatorListener<E>>> {
        self.listener.borrow().clone()
    }

    fn ensure_unlocked(&self) -> Result<(), EstimatorError> {
        if self.is_locked() {
            Err(EstimatorError::Locked)
        } else {
            Ok(())
        }
    }

    pub fn set_method(&self, method: RobustMethod) -> Result<(), EstimatorError> {
        self.ensure_unlocked()?;
        self.method.set(method);
        Ok(())
    }

    /// Replace every setting at once. Nothing changes if one value is invalid.
    pub fn set_settings(&self, settings: RobustSettings) -> Result<(), EstimatorError> {
        self.ensure_unlocked()?;
        settings.validate()?;
        self.settings.replace(settings);
        Ok(())
    }

    pub fn set_threshold(&self, threshold: f64) -> Result<(), EstimatorError> {
        self.ensure_unlocked()?;
        check_threshold(threshold)?;
        self.settings.borrow_mut().threshold = threshold;
        Ok(())
    }

    pub fn set_confidence(&self, confidence: f64) -> Result<(), EstimatorError> {
        self.ensure_unlocked()?;
        check_confidence(confidence)?;
        self.settings.borrow_mut().confidence = confidence;
        Ok(())
    }

    pub fn set_max_iterations(&self, max_iterations: usize) -> Result<(), EstimatorError> {
        self.ensure_unlocked()?;
        check_max_iterations(max_iterations)?;
        self.settings.borrow_mut().max_iterations = max_iterations;
        Ok(())
    }

    pub fn set_progress_delta(&self, progress_delta: f32) -> Result<(), EstimatorError> {
        self.ensure_unlocked()?;
        check_progress_delta(progress_delta)?;
        self.settings.borrow_mut().progress_delta = progress_delta;
        Ok(())
    }

    pub fn set_result_refined(&self, result_refined: bool) -> Result<(), EstimatorError> {
        self.ensure_unlocked()?;
        self.settings.borrow_mut().result_refined = result_refined;
        Ok(())
    }

    pub fn set_keep_covariance(&self, keep_covariance: bool) -> Result<(), EstimatorError> {
        self.ensure_unlocked()?;
        self.settings.borrow_mut().keep_covariance = keep_covariance;
        Ok(())
    }

    pub fn set_stop_threshold(&self, stop_threshold: f64) -> Result<(), EstimatorError> {
        self.ensure_unlocked()?;
        check_stop_threshold(stop_threshold)?;
        self.settings.borrow_mut().stop_threshold = stop_threshold;
        Ok(())
    }

    pub fn set_seed(&self, seed: Option<u64>) -> Result<(), EstimatorError> {
        self.ensure_unlocked()?;
        self.settings.borrow_mut().seed = seed;
        Ok(())
    }

    /// Degenerate draws tolerated within one iteration.
    pub fn set_max_sample_retries(&self, max_sample_retries: usize) -> Result<(), EstimatorError> {
        self.ensure_unlocked()?;
        check_max_sample_retries(max_sample_retries)?;
        self.settings.borrow_mut().max_sample_retries = max_sample_retries;
        Ok(())
    }

    /// PROSAC growth and stopping parameters, used by PROSAC and PROMedS.
    pub fn set_prosac_settings(&self, prosac: ProsacSettings) -> Result<(), EstimatorError> {
        self.ensure_unlocked()?;
        check_prosac(&prosac)?;
        self.settings.borrow_mut().prosac = prosac;
        Ok(())
    }

    /// Replace the correspondences. At least one minimal sample is required.
    pub fn set_points(&self, points: Vec<E::Point>) -> Result<(), EstimatorError> {
        self.ensure_unlocked()?;
        let required = self.sample_size();
        if points.len() < required {
            return Err(EstimatorError::TooFewCorrespondences {
                required,
                actual: points.len(),
            });
        }
        self.points.replace(points);
        Ok(())
    }

    /// Replace the per-point quality scores, higher meaning more trusted.
    ///
    /// `None` clears them. Their length is matched against the points when
    /// [`estimate`](Self::estimate) starts.
    pub fn set_quality_scores(&self, quality_scores: Option<Vec<f64>>) -> Result<(), EstimatorError> {
        self.ensure_unlocked()?;
        if let Some(scores) = &quality_scores {
            let required = self.sample_size();
            if scores.len() < required {
                return Err(EstimatorError::TooFewQualityScores {
                    required,
                    actual: scores.len(),
                });
            }
        }
        self.quality_scores.replace(quality_scores);
        Ok(())
    }

    pub fn set_listener(
        &self,
        listener: Option<Rc<dyn EstimatorListener<E>>>,
    ) -> Result<(), EstimatorError> {
        self.ensure_unlocked()?;
        self.listener.replace(listener);
        Ok(())
    }

    fn readiness(&self) -> Result<(), NotReadyReason> {
        let required = self.sample_size();
        let points = self.points.borrow().len();
        if points < required {
            return Err(NotReadyReason::MissingCorrespondences {
                required,
                actual: points,
            });
        }
        if self.method().requires_quality_scores() {
            match self.quality_scores.borrow().as_ref() {
                None => return Err(NotReadyReason::MissingQualityScores),
                Some(scores) if scores.len() != points => {
                    return Err(NotReadyReason::QualityScoresMismatch {
                        scores: scores.len(),
                        points,
                    })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Run the robust estimation on the current points.
    ///
    /// Fails with [`EstimatorError::Locked`] when called while a run is in
    /// progress, with [`EstimatorError::NotReady`] before any callback when the
    /// inputs are incomplete, and with [`EstimatorError::Failed`] when no model
    /// gathered any support. The estimator is `Idle` again on return.
    pub fn estimate(&self) -> Result<RobustEstimate<E::Model>, EstimatorError> {
        let _guard = RunGuard::acquire(&self.state)?;
        self.readiness()?;

        let settings = self.settings.borrow().clone();
        let points = self.points.borrow();
        let quality_scores = self.quality_scores.borrow();
        let listener = self.listener();

        if let Some(listener) = &listener {
            listener.on_estimate_start(self);
        }
        let result = self.run(&settings, &points, quality_scores.as_deref(), listener.as_deref());
        if let Some(listener) = &listener {
            listener.on_estimate_end(self);
        }
        result
    }

    fn run(
        &self,
        settings: &RobustSettings,
        points: &[E::Point],
        quality_scores: Option<&[f64]>,
        listener: Option<&dyn EstimatorListener<E>>,
    ) -> Result<RobustEstimate<E::Model>, EstimatorError> {
        let method = self.method();
        let point_count = points.len();
        let sample_size = self.sample_size();

        let mut sampler = SamplerChoice::for_method(method, settings, sample_size, quality_scores)
            .ok_or(NotReadyReason::MissingQualityScores)?;
        let mut scoring = ScoringChoice::for_method(method, settings, sample_size);
        let mut controller = IterationController::new(settings, sample_size);
        let max_inlier_ratio = scoring.max_inlier_ratio();
        let mut prosac_rule = method
            .requires_quality_scores()
            .then(|| {
                ProsacStoppingRule::new(settings, sample_size).with_max_inlier_ratio(max_inlier_ratio)
            });

        debug!(
            "{method:?}: {point_count} points, sample size {sample_size}, at most {} iterations",
            settings.max_iterations
        );

        let mut sample = vec![0usize; sample_size];
        let mut residuals = vec![0.0; point_count];
        let mut best: Option<Hypothesis<E::Model>> = None;
        // Inliers of the best model among the active PROSAC points, keyed by
        // the active set size.
        let mut active_support: Option<(usize, usize)> = None;
        let mut iteration = 0;

        while controller.should_continue(iteration) {
            let models = match self.draw_models(&mut sampler, points, &mut sample, settings.max_sample_retries) {
                Ok(models) => models,
                Err(failure) if best.is_some() => {
                    warn!("{failure} after {iteration} iterations, keeping best model");
                    break;
                }
                Err(failure) => return Err(failure.into()),
            };
            iteration += 1;

            for model in models {
                for (residual, point) in residuals.iter_mut().zip(points) {
                    *residual = self.estimator.residual(&model, point);
                }
                let score = scoring.score(&residuals);
                if score.inlier_count == 0 {
                    continue;
                }
                let improves = best
                    .as_ref()
                    .map_or(true, |current| score.is_better_than(&current.score));
                if improves {
                    let ratio = score.inlier_count as f64 / point_count as f64;
                    let bound = controller.update(ratio.min(max_inlier_ratio));
                    trace!(
                        "iteration {iteration}: cost {:.6e}, {} inliers, bound {bound}",
                        score.cost,
                        score.inlier_count
                    );
                    match best.as_mut() {
                        Some(current) => {
                            current.model = model;
                            current.score = score;
                            current.residuals.copy_from_slice(&residuals);
                        }
                        None => {
                            best = Some(Hypothesis {
                                model,
                                score,
                                residuals: residuals.clone(),
                            })
                        }
                    }
                    active_support = None;
                }
            }

            if let Some(listener) = listener {
                listener.on_estimate_next_iteration(self, iteration);
                if let Some(progress) = controller.progress_update(iteration) {
                    listener.on_estimate_progress_change(self, progress);
                }
            }

            let Some(current) = &best else {
                continue;
            };
            if scoring.is_conclusive(&current.score) {
                debug!("median residual {:.3e} reached the stop threshold", current.score.cost);
                break;
            }
            if let (Some(rule), Some(active)) = (prosac_rule.as_mut(), sampler.active_points()) {
                let support = match active_support {
                    Some((size, support)) if size == active.len() => support,
                    _ => {
                        let threshold = current.score.threshold;
                        let support = active
                            .iter()
                            .filter(|&&i| current.residuals[i] < threshold)
                            .count();
                        active_support = Some((active.len(), support));
                        support
                    }
                };
                if rule.should_stop(support, active.len(), iteration) {
                    debug!(
                        "non-random support {support} among {} active points after {iteration} iterations",
                        active.len()
                    );
                    break;
                }
            }
        }

        let Some(best) = best else {
            return Err(EstimationFailure::NoConsensus {
                iterations: iteration,
            }
            .into());
        };
        let threshold = best.score.threshold;
        let consensus = InliersData::from_residuals(best.residuals, threshold);

        let mut model = best.model;
        let mut inliers = consensus;
        let mut covariance = None;
        let mut refined = false;
        if settings.result_refined {
            let refiner = LeastSquaresRefiner::new(&self.estimator);
            if let Some(refinement) =
                refiner.refine(points, &inliers.indices(), threshold, inliers.inlier_count)
            {
                if settings.keep_covariance {
                    covariance = refinement
                        .normal_equations
                        .as_ref()
                        .and_then(optimisers::covariance);
                    if covariance.is_none() {
                        warn!("covariance unavailable for the refined model");
                    }
                }
                model = refinement.model;
                let residuals = points
                    .iter()
                    .map(|point| self.estimator.residual(&model, point))
                    .collect();
                inliers = InliersData::from_residuals(residuals, threshold);
                refined = true;
            }
        } else if settings.keep_covariance {
            warn!("covariance requires refinement, which is disabled");
        }

        debug!(
            "{method:?} finished after {iteration} iterations: {}/{point_count} inliers (threshold {threshold:.3e}), refined: {refined}",
            inliers.inlier_count
        );

        Ok(RobustEstimate {
            model,
            inliers,
            covariance,
            iterations: iteration,
            refined,
        })
    }

    /// Draw samples until the minimal solver yields at least one model.
    fn draw_models(
        &self,
        sampler: &mut impl Sampler,
        points: &[E::Point],
        sample: &mut [usize],
        max_retries: usize,
    ) -> Result<Vec<E::Model>, EstimationFailure> {
        let sample_size = sample.len();
        for _ in 0..max_retries {
            if !sampler.sample(points.len(), sample_size, sample) {
                continue;
            }
            if !self.estimator.is_valid_sample(points, sample) {
                continue;
            }
            let models = self.estimator.estimate_model(points, sample);
            if !models.is_empty() {
                return Ok(models);
            }
        }
        Err(EstimationFailure::DegenerateSamples {
            attempts: max_retries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{NormalEquations, Refinement};
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;
    use std::panic::{self, AssertUnwindSafe};

    /// Fits a constant to scalar observations.
    struct ConstantEstimator;

    impl Estimator for ConstantEstimator {
        type Point = f64;
        type Model = f64;

        fn sample_size(&self) -> usize {
            1
        }

        fn estimate_model(&self, data: &[f64], sample: &[usize]) -> Vec<f64> {
            vec![data[sample[0]]]
        }

        fn estimate_model_nonminimal(&self, data: &[f64], sample: &[usize]) -> Option<Refinement<f64>> {
            let n = sample.len() as f64;
            let mean = sample.iter().map(|&i| data[i]).sum::<f64>() / n;
            let rss = sample.iter().map(|&i| (data[i] - mean).powi(2)).sum();
            Some(Refinement::new(mean).with_normal_equations(NormalEquations {
                information: DMatrix::from_element(1, 1, n),
                residual_sum_squares: rss,
                observations: sample.len(),
                gauge_dimensions: 0,
            }))
        }

        fn residual(&self, model: &f64, point: &f64) -> f64 {
            (model - point).abs()
        }
    }

    /// Never produces a model.
    struct DegenerateEstimator;

    impl Estimator for DegenerateEstimator {
        type Point = f64;
        type Model = f64;

        fn sample_size(&self) -> usize {
            2
        }

        fn estimate_model(&self, _data: &[f64], _sample: &[usize]) -> Vec<f64> {
            Vec::new()
        }

        fn residual(&self, model: &f64, point: &f64) -> f64 {
            (model - point).abs()
        }
    }

    #[derive(Default)]
    struct Recorder {
        starts: Cell<usize>,
        ends: Cell<usize>,
        iterations: Cell<usize>,
        progress: RefCell<Vec<f32>>,
        call_setters: bool,
        setter_results: RefCell<Vec<Result<(), EstimatorError>>>,
        locked_seen: Cell<bool>,
        panic_on_iteration: bool,
    }

    impl<E: Estimator> EstimatorListener<E> for Recorder {
        fn on_estimate_start(&self, estimator: &RobustEstimator<E>) {
            self.starts.set(self.starts.get() + 1);
            self.locked_seen.set(estimator.is_locked());
        }

        fn on_estimate_end(&self, _estimator: &RobustEstimator<E>) {
            self.ends.set(self.ends.get() + 1);
        }

        fn on_estimate_next_iteration(&self, estimator: &RobustEstimator<E>, _iteration: usize) {
            self.iterations.set(self.iterations.get() + 1);
            if self.panic_on_iteration {
                panic!("listener failure");
            }
            if self.call_setters && self.setter_results.borrow().is_empty() {
                let mut setter_results = self.setter_results.borrow_mut();
                setter_results.push(estimator.set_threshold(0.1));
                setter_results.push(estimator.set_confidence(0.5));
                setter_results.push(estimator.set_max_iterations(3));
                setter_results.push(estimator.set_progress_delta(0.5));
                setter_results.push(estimator.set_result_refined(false));
                setter_results.push(estimator.set_keep_covariance(true));
                setter_results.push(estimator.set_stop_threshold(0.0));
                setter_results.push(estimator.set_seed(None));
                setter_results.push(estimator.set_max_sample_retries(1));
                setter_results.push(estimator.set_prosac_settings(ProsacSettings::default()));
                setter_results.push(estimator.set_points(Vec::new()));
                setter_results.push(estimator.set_quality_scores(None));
                setter_results.push(estimator.set_listener(None));
                setter_results.push(estimator.set_method(RobustMethod::Msac));
                setter_results.push(estimator.set_settings(RobustSettings::default()));
                setter_results.push(estimator.estimate().map(|_| ()));
            }
        }

        fn on_estimate_progress_change(&self, _estimator: &RobustEstimator<E>, progress: f32) {
            self.progress.borrow_mut().push(progress);
        }
    }

    fn observations() -> Vec<f64> {
        let mut data = vec![5.0; 20];
        data.extend((0..5).map(|i| 100.0 + 10.0 * i as f64));
        data
    }

    fn descending_quality(n: usize) -> Vec<f64> {
        (0..n).map(|i| 1.0 / (1.0 + i as f64)).collect()
    }

    fn constant_estimator(method: RobustMethod) -> RobustEstimator<ConstantEstimator> {
        let estimator = RobustEstimator::new(ConstantEstimator, method);
        estimator.set_threshold(0.5).unwrap();
        estimator.set_seed(Some(11)).unwrap();
        estimator.set_points(observations()).unwrap();
        if method.requires_quality_scores() {
            estimator
                .set_quality_scores(Some(descending_quality(25)))
                .unwrap();
        }
        estimator
    }

    #[test]
    fn every_method_recovers_the_constant() {
        for method in RobustMethod::ALL {
            let estimator = constant_estimator(method);
            assert!(estimator.is_ready());
            let estimate = estimator.estimate().unwrap();

            assert_relative_eq!(estimate.model, 5.0, epsilon = 1e-12);
            assert_eq!(estimate.inliers.inlier_count, 20, "{method:?}");
            assert_eq!(estimate.inliers.indices(), (0..20).collect::<Vec<_>>());
            assert!(estimate.refined);
            assert!(estimate.iterations >= 1);
            assert!(!estimator.is_locked());
        }
    }

    #[test]
    fn median_methods_report_derived_threshold() {
        for method in [RobustMethod::Lmeds, RobustMethod::Promeds] {
            let estimator = constant_estimator(method);
            let estimate = estimator.estimate().unwrap();
            // Exact inliers give a zero median, floored by the stop threshold.
            assert_eq!(estimate.inliers.estimated_threshold, estimator.stop_threshold());
        }
        let estimate = constant_estimator(RobustMethod::Msac).estimate().unwrap();
        assert_eq!(estimate.inliers.estimated_threshold, 0.5);
    }

    #[test]
    fn not_ready_without_points() {
        let estimator = RobustEstimator::new(ConstantEstimator, RobustMethod::Ransac);
        let recorder = Rc::new(Recorder::default());
        estimator.set_listener(Some(recorder.clone())).unwrap();

        assert!(!estimator.is_ready());
        assert_eq!(
            estimator.estimate().unwrap_err(),
            EstimatorError::NotReady(NotReadyReason::MissingCorrespondences {
                required: 1,
                actual: 0
            })
        );
        assert_eq!(recorder.starts.get(), 0);
        assert_eq!(recorder.ends.get(), 0);
        assert!(!estimator.is_locked());
    }

    #[test]
    fn progressive_methods_need_matching_quality_scores() {
        for method in [RobustMethod::Prosac, RobustMethod::Promeds] {
            let estimator = RobustEstimator::new(ConstantEstimator, method);
            let recorder = Rc::new(Recorder::default());
            estimator.set_listener(Some(recorder.clone())).unwrap();
            estimator.set_points(observations()).unwrap();

            assert_eq!(
                estimator.estimate().unwrap_err(),
                EstimatorError::NotReady(NotReadyReason::MissingQualityScores)
            );

            estimator
                .set_quality_scores(Some(descending_quality(24)))
                .unwrap();
            assert_eq!(
                estimator.estimate().unwrap_err(),
                EstimatorError::NotReady(NotReadyReason::QualityScoresMismatch {
                    scores: 24,
                    points: 25
                })
            );
            assert_eq!(recorder.iterations.get(), 0);
            assert_eq!(recorder.starts.get(), 0);

            estimator
                .set_quality_scores(Some(descending_quality(25)))
                .unwrap();
            assert!(estimator.is_ready());
        }
    }

    #[test]
    fn setters_are_locked_during_estimation() {
        let estimator = constant_estimator(RobustMethod::Ransac);
        let recorder = Rc::new(Recorder {
            call_setters: true,
            ..Recorder::default()
        });
        estimator.set_listener(Some(recorder.clone())).unwrap();
        let before = estimator.settings();

        estimator.estimate().unwrap();

        assert!(recorder.locked_seen.get());
        let setter_results = recorder.setter_results.borrow();
        assert_eq!(setter_results.len(), 16);
        assert!(setter_results.iter().all(|p| *p == Err(EstimatorError::Locked)));
        assert!(!estimator.is_locked());
        assert_eq!(estimator.settings(), before);
        assert_eq!(estimator.method(), RobustMethod::Ransac);
        assert_eq!(estimator.points().len(), 25);
        assert!(estimator.listener().is_some());

        // Unlocked again: setters work.
        estimator.set_threshold(0.25).unwrap();
        assert_eq!(estimator.threshold(), 0.25);
    }

    #[test]
    fn degenerate_data_fails_and_unlocks() {
        let estimator = RobustEstimator::new(DegenerateEstimator, RobustMethod::Ransac);
        let recorder = Rc::new(Recorder::default());
        estimator.set_listener(Some(recorder.clone())).unwrap();
        estimator.set_points(vec![1.0, 2.0, 3.0]).unwrap();

        let err = estimator.estimate().unwrap_err();
        assert_eq!(
            err,
            EstimatorError::Failed(EstimationFailure::DegenerateSamples { attempts: 100 })
        );
        assert_eq!(recorder.starts.get(), 1);
        assert_eq!(recorder.ends.get(), 1);
        assert!(!estimator.is_locked());
    }

    /// Produces models far away from every observation.
    struct ShiftedEstimator;

    impl Estimator for ShiftedEstimator {
        type Point = f64;
        type Model = f64;

        fn sample_size(&self) -> usize {
            1
        }

        fn estimate_model(&self, data: &[f64], sample: &[usize]) -> Vec<f64> {
            vec![data[sample[0]] + 1000.0]
        }

        fn residual(&self, model: &f64, point: &f64) -> f64 {
            (model - point).abs()
        }
    }

    #[test]
    fn no_consensus_when_nothing_is_supported() {
        let estimator = RobustEstimator::new(ShiftedEstimator, RobustMethod::Ransac);
        let recorder = Rc::new(Recorder::default());
        estimator.set_listener(Some(recorder.clone())).unwrap();
        estimator.set_points(vec![0.0, 10.0, 20.0]).unwrap();
        estimator.set_max_iterations(5).unwrap();
        estimator.set_seed(Some(1)).unwrap();

        assert_eq!(
            estimator.estimate().unwrap_err(),
            EstimatorError::Failed(EstimationFailure::NoConsensus { iterations: 5 })
        );
        assert_eq!(recorder.ends.get(), 1);
        assert!(!estimator.is_locked());
        assert_eq!(estimator.max_iterations(), 5);
    }

    #[test]
    fn panicking_listener_leaves_estimator_idle() {
        let estimator = constant_estimator(RobustMethod::Msac);
        let recorder = Rc::new(Recorder {
            panic_on_iteration: true,
            ..Recorder::default()
        });
        estimator.set_listener(Some(recorder.clone())).unwrap();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| estimator.estimate()));
        assert!(outcome.is_err());
        assert!(!estimator.is_locked());
        assert_eq!(estimator.state(), EstimatorState::Idle);

        estimator.set_listener(None).unwrap();
        assert!(estimator.estimate().is_ok());
    }

    #[test]
    fn rejected_setters_leave_state_unchanged() {
        let estimator = constant_estimator(RobustMethod::Prosac);
        let before = estimator.settings();

        assert!(estimator.set_threshold(-1.0).is_err());
        assert!(estimator.set_confidence(0.0).is_err());
        assert!(estimator.set_max_iterations(0).is_err());
        assert!(estimator.set_progress_delta(2.0).is_err());
        assert!(estimator.set_stop_threshold(f64::NAN).is_err());
        assert!(estimator.set_max_sample_retries(0).is_err());
        assert!(estimator
            .set_prosac_settings(ProsacSettings {
                beta: 1.5,
                ..ProsacSettings::default()
            })
            .is_err());
        assert!(estimator
            .set_settings(RobustSettings::default().with_confidence(3.0))
            .is_err());
        assert_eq!(estimator.settings(), before);

        assert_eq!(
            estimator.set_points(Vec::new()),
            Err(EstimatorError::TooFewCorrespondences {
                required: 1,
                actual: 0
            })
        );
        assert_eq!(estimator.points().len(), 25);

        assert_eq!(
            estimator.set_quality_scores(Some(Vec::new())),
            Err(EstimatorError::TooFewQualityScores {
                required: 1,
                actual: 0
            })
        );
        assert_eq!(estimator.quality_scores().map(|s| s.len()), Some(25));
    }

    #[test]
    fn listener_sees_one_start_and_end_and_monotonic_progress() {
        let estimator = constant_estimator(RobustMethod::Ransac);
        estimator.set_progress_delta(0.0).unwrap();
        let recorder = Rc::new(Recorder::default());
        estimator.set_listener(Some(recorder.clone())).unwrap();

        let estimate = estimator.estimate().unwrap();

        assert_eq!(recorder.starts.get(), 1);
        assert_eq!(recorder.ends.get(), 1);
        assert_eq!(recorder.iterations.get(), estimate.iterations);
        let progress = recorder.progress.borrow();
        assert!(!progress.is_empty());
        assert!(progress.windows(2).all(|w| w[0] < w[1]));
        assert!(progress.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let a = constant_estimator(RobustMethod::Msac).estimate().unwrap();
        let b = constant_estimator(RobustMethod::Msac).estimate().unwrap();
        assert_eq!(a.iterations, b.iterations);
        assert_eq!(a.model, b.model);
        assert_eq!(a.inliers, b.inliers);
    }

    #[test]
    fn covariance_follows_refinement() {
        let mut data = vec![4.9, 5.1, 5.0, 4.8, 5.2];
        data.push(50.0);
        let estimator = RobustEstimator::new(ConstantEstimator, RobustMethod::Ransac);
        estimator.set_points(data).unwrap();
        estimator.set_threshold(0.5).unwrap();
        estimator.set_seed(Some(3)).unwrap();
        estimator.set_keep_covariance(true).unwrap();

        let estimate = estimator.estimate().unwrap();
        assert_relative_eq!(estimate.model, 5.0, epsilon = 1e-12);
        let covariance = estimate.covariance.unwrap();
        // rss = 0.1, five observations, one parameter.
        assert_relative_eq!(covariance[(0, 0)], 0.1 / 4.0 / 5.0, epsilon = 1e-12);

        estimator.set_result_refined(false).unwrap();
        let estimate = estimator.estimate().unwrap();
        assert!(!estimate.refined);
        assert!(estimate.covariance.is_none());
    }

    #[test]
    fn unrefined_results_keep_consensus_model() {
        let estimator = constant_estimator(RobustMethod::Ransac);
        estimator.set_result_refined(false).unwrap();
        let estimate = estimator.estimate().unwrap();
        assert_eq!(estimate.model, 5.0);
        assert!(!estimate.refined);
        assert_eq!(estimate.inliers.inlier_count, 20);
    }

    #[test]
    fn retry_and_prosac_setters_round_trip() {
        let estimator = constant_estimator(RobustMethod::Promeds);
        estimator.set_max_sample_retries(7).unwrap();
        let prosac = ProsacSettings {
            beta: 0.1,
            psi: 0.01,
            convergence_iterations: 500,
        };
        estimator.set_prosac_settings(prosac).unwrap();

        assert_eq!(estimator.max_sample_retries(), 7);
        assert_eq!(estimator.prosac_settings(), prosac);
        assert_eq!(estimator.settings().prosac, prosac);
        assert!(estimator.estimate().is_ok());
    }

    #[test]
    fn degenerate_retry_cap_follows_setting() {
        let estimator = RobustEstimator::new(DegenerateEstimator, RobustMethod::Msac);
        estimator.set_points(vec![1.0, 2.0, 3.0]).unwrap();
        estimator.set_max_sample_retries(9).unwrap();
        assert_eq!(
            estimator.estimate().unwrap_err(),
            EstimatorError::Failed(EstimationFailure::DegenerateSamples { attempts: 9 })
        );
    }

    /// Returns `first` for its first minimal fit, then the sampled value.
    struct WrongFirstEstimator {
        first: f64,
        calls: Cell<usize>,
    }

    impl Estimator for WrongFirstEstimator {
        type Point = f64;
        type Model = f64;

        fn sample_size(&self) -> usize {
            1
        }

        fn estimate_model(&self, data: &[f64], sample: &[usize]) -> Vec<f64> {
            let call = self.calls.get();
            self.calls.set(call + 1);
            if call == 0 {
                vec![self.first]
            } else {
                vec![data[sample[0]]]
            }
        }

        fn residual(&self, model: &f64, point: &f64) -> f64 {
            (model - point).abs()
        }
    }

    #[test]
    fn median_methods_keep_sampling_after_a_wrong_first_model() {
        for method in [RobustMethod::Lmeds, RobustMethod::Promeds] {
            let estimator = RobustEstimator::new(
                WrongFirstEstimator {
                    first: 9.0,
                    calls: Cell::new(0),
                },
                method,
            );
            estimator.set_points(vec![2.0, 2.0, 2.0, 9.0, 2.0]).unwrap();
            estimator.set_seed(Some(1)).unwrap();
            if method.requires_quality_scores() {
                estimator.set_quality_scores(Some(vec![1.0; 5])).unwrap();
            }

            // The outlier's own threshold covers every point; that support
            // must not end the run after one iteration.
            let estimate = estimator.estimate().unwrap();
            assert_eq!(estimate.model, 2.0, "{method:?}");
            assert!(estimate.iterations >= 2, "{method:?}");
            assert_eq!(estimate.inliers.indices(), vec![0, 1, 2, 4], "{method:?}");
        }
    }

    #[derive(Default)]
    struct IterationLog {
        seen: RefCell<Vec<usize>>,
    }

    impl<E: Estimator> EstimatorListener<E> for IterationLog {
        fn on_estimate_next_iteration(&self, _estimator: &RobustEstimator<E>, iteration: usize) {
            self.seen.borrow_mut().push(iteration);
        }
    }

    #[test]
    fn iteration_callback_counts_completed_iterations() {
        let estimator = constant_estimator(RobustMethod::Lmeds);
        let log = Rc::new(IterationLog::default());
        estimator.set_listener(Some(log.clone())).unwrap();

        let estimate = estimator.estimate().unwrap();
        let seen = log.seen.borrow();
        assert_eq!(*seen, (1..=estimate.iterations).collect::<Vec<_>>());
    }
}
