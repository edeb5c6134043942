//! Walk-forward iteration controller.
//!
//! Each iteration:
//! 1. Trains one model per horizon on rows dated before the cutoff
//! 2. Predicts every trading day in `(cutoff, latest]` for every symbol
//! 3. Resolves the predictions whose target day is available
//! 4. Scores accuracy and calibration
//! 5. Persists the iteration and decides whether to continue
//!
//! Per-symbol work runs on a bounded rayon pool and is merged in symbol
//! order, so the thread count never changes the results.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::{debug, info, warn};

use crate::artifacts::ArtifactStore;
use crate::config::EngineConfig;
use crate::data::{business_days_between, sub_business_days, HistoricalDataAccessor, PriceSeries};
use crate::error::{EngineError, InsufficientDataError};
use crate::metrics::{AccuracyAggregator, CalibrationCheck};
use crate::retry::RetryPolicy;
use crate::training::{HorizonModel, HorizonTrainer, ModelRegistry, TrainingSet, FEATURE_WARMUP};

use super::predictor::{ForwardPredictor, Prediction};
use super::progress::{CancellationToken, NoopProgress, Phase, ProgressEvent, ProgressSink};
use super::resolver::{Outcome, OutcomeResolver};
use super::summary::{
    IterationArtifacts, IterationCounts, IterationSummary, RunManifest, RunOutcome, StopReason,
};
use super::window::TrainingWindow;

/// Share of an iteration's progress spent on loading and row building.
const TRAINING_SHARE: f64 = 0.45;
/// Share spent on fitting models.
const FITTING_SHARE: f64 = 0.10;

/// Per-symbol result of the training phase.
struct SymbolRows {
    symbol: String,
    series: Option<PriceSeries>,
    rows: Vec<(u32, TrainingSet)>,
}

/// Per-symbol result of the prediction phase.
struct SymbolPredictions {
    predictions: Vec<Prediction>,
    outcomes: Vec<Outcome>,
    pending: usize,
}

/// Drives the walk-forward loop.
pub struct IterationController {
    accessor: Arc<dyn HistoricalDataAccessor>,
    store: Arc<dyn ArtifactStore>,
    progress: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
    registry: Arc<ModelRegistry>,
    symbols: Option<Vec<String>>,
    run_id: Option<String>,
}

impl IterationController {
    pub fn new(accessor: Arc<dyn HistoricalDataAccessor>, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            accessor,
            store,
            progress: Arc::new(NoopProgress),
            cancel: CancellationToken::new(),
            registry: Arc::new(ModelRegistry::new()),
            symbols: None,
            run_id: None,
        }
    }

    /// Send progress events to `sink`.
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Restrict the run to `symbols` instead of every symbol the accessor has.
    pub fn with_symbols(mut self, symbols: Vec<String>) -> Self {
        self.symbols = Some(symbols);
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Share an existing registry.
    pub fn with_registry(mut self, registry: Arc<ModelRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> Arc<ModelRegistry> {
        Arc::clone(&self.registry)
    }

    /// Run the loop until a stop rule fires.
    pub fn run(&self, config: &EngineConfig) -> Result<RunOutcome, EngineError> {
        config.validate()?;
        let started_at = Utc::now();
        let retry = config.retry_policy();

        let symbols = self.resolve_symbols(&retry)?;
        let latest = retry
            .run("latest date lookup", || self.accessor.latest_date(&symbols))?
            .ok_or_else(|| EngineError::NoData("no price history for any symbol".to_string()))?;

        let run_id = self
            .run_id
            .clone()
            .unwrap_or_else(|| format!("run_{}", started_at.format("%Y%m%d_%H%M%S")));

        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(threads) = config.worker_threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder.build()?;

        let initial_cutoff = sub_business_days(latest, config.initial_lookback_days);
        let policy = config.window.build(initial_cutoff, config.step_days);
        let mut window = TrainingWindow::first(symbols.clone(), policy.as_ref());

        info!(
            "Run {}: {} symbols, latest date {}, initial cutoff {}, horizons {:?}",
            run_id,
            symbols.len(),
            latest,
            initial_cutoff,
            config.sorted_horizons()
        );

        let mut summaries: Vec<IterationSummary> = Vec::new();
        let mut latest_artifacts: Option<IterationArtifacts> = None;
        let mut previous_average: Option<f64> = None;

        let stop_reason = loop {
            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }

            let iteration = window.iteration;
            self.progress
                .notify(ProgressEvent::new(iteration, 0.0, Phase::Started));

            if business_days_between(window.cutoff, latest).is_empty() {
                info!(
                    "Iteration {}/{}: no business days after cutoff {}",
                    iteration, config.max_iterations, window.cutoff
                );
                let summary = IterationSummary::no_data(iteration, window.cutoff, window.start, latest);
                retry.run("write summary", || self.store.write_summary(&run_id, &summary))?;
                summaries.push(summary);
                break StopReason::NoValidationData;
            }

            info!(
                "Iteration {}/{}: cutoff {}, validating through {}",
                iteration, config.max_iterations, window.cutoff, latest
            );

            let Some((mut summary, artifacts)) = self.run_iteration(&pool, config, &window, latest)
            else {
                warn!("Iteration {} cancelled, discarding partial results", iteration);
                break StopReason::Cancelled;
            };

            summary.improvement_vs_previous = improvement(summary.average_accuracy, previous_average);
            let stop = decide_stop(
                config,
                iteration,
                summary.average_accuracy,
                summary.improvement_vs_previous,
                previous_average.is_some(),
            );
            summary.stop_reason = stop;

            self.persist(&retry, config, &run_id, &summary, &artifacts)?;
            self.registry.publish(iteration, artifacts.models.iter().cloned());

            info!("{}", summary.one_line());
            for horizon in &summary.calibration_drift {
                if let Some(report) = summary.calibration.get(horizon) {
                    warn!(
                        "Calibration drift at {}D: mean probability {:.3} vs positive rate {:.3} ({} samples)",
                        horizon, report.mean_probability, report.positive_rate, report.samples
                    );
                }
            }
            self.progress
                .notify(ProgressEvent::new(iteration, 1.0, Phase::Completed));

            if summary.average_accuracy.is_some() {
                previous_average = summary.average_accuracy;
            }
            summaries.push(summary);
            latest_artifacts = Some(artifacts);

            if let Some(reason) = stop {
                break reason;
            }
            window = window.advance(policy.as_ref());
        };

        info!(
            "Run {} finished after {} iterations: {}",
            run_id,
            summaries.len(),
            stop_reason.as_str()
        );

        let manifest = RunManifest {
            run_id: run_id.clone(),
            config: config.clone(),
            symbols,
            latest_date: latest,
            initial_cutoff,
            iterations: summaries.len(),
            stop_reason,
            registry_version: self.registry.version(),
            started_at,
            finished_at: Utc::now(),
        };
        retry.run("write manifest", || self.store.write_manifest(&manifest))?;

        Ok(RunOutcome {
            run_id,
            summaries,
            stop_reason,
            latest: latest_artifacts,
        })
    }

    fn resolve_symbols(&self, retry: &RetryPolicy) -> Result<Vec<String>, EngineError> {
        let mut symbols = match &self.symbols {
            Some(symbols) => symbols.clone(),
            None => retry.run("symbol listing", || self.accessor.symbols())?,
        };
        symbols.sort();
        symbols.dedup();
        if symbols.is_empty() {
            return Err(EngineError::NoData("no symbols to train on".to_string()));
        }
        Ok(symbols)
    }

    /// Train, predict, resolve and score one window. `None` when cancelled.
    fn run_iteration(
        &self,
        pool: &ThreadPool,
        config: &EngineConfig,
        window: &TrainingWindow,
        latest: NaiveDate,
    ) -> Option<(IterationSummary, IterationArtifacts)> {
        let iteration = window.iteration;
        let horizons = config.sorted_horizons();
        let retry = config.retry_policy();
        let trainer = HorizonTrainer::new(config.label_threshold, config.learner)
            .with_min_samples(config.min_training_samples)
            .with_window_start(window.start);

        // Load and build training rows per symbol
        let total = window.symbols.len().max(1);
        let done = AtomicUsize::new(0);
        let load_until = latest + Duration::days(1);

        let symbol_rows: Vec<Option<SymbolRows>> = pool.install(|| {
            window
                .symbols
                .par_iter()
                .map(|symbol| {
                    if self.cancel.is_cancelled() {
                        return None;
                    }
                    let loaded = retry.run(&format!("load {}", symbol), || {
                        self.accessor.load_until(symbol, load_until)
                    });

                    let result = match loaded {
                        Ok(series) => {
                            let rows = horizons
                                .iter()
                                .map(|&h| (h, trainer.symbol_rows(&series, window.cutoff, h)))
                                .collect();
                            SymbolRows {
                                symbol: symbol.clone(),
                                series: Some(series),
                                rows,
                            }
                        }
                        Err(e) => {
                            warn!("Skipping {} for iteration {}: {}", symbol, iteration, e);
                            SymbolRows {
                                symbol: symbol.clone(),
                                series: None,
                                rows: Vec::new(),
                            }
                        }
                    };

                    let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                    self.progress.notify(
                        ProgressEvent::new(iteration, TRAINING_SHARE * n as f64 / total as f64, Phase::Training)
                            .with_symbol(symbol),
                    );
                    Some(result)
                })
                .collect()
        });

        if symbol_rows.iter().any(|r| r.is_none()) || self.cancel.is_cancelled() {
            return None;
        }
        let mut symbol_rows: Vec<SymbolRows> = symbol_rows.into_iter().flatten().collect();
        symbol_rows.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        // Symbols without any usable row take no further part
        let mut counts = IterationCounts::default();
        let mut active: Vec<(String, PriceSeries)> = Vec::new();
        let mut pooled: BTreeMap<u32, TrainingSet> = BTreeMap::new();
        for entry in symbol_rows {
            let usable: usize = entry.rows.iter().map(|(_, set)| set.len()).sum();
            match entry.series {
                Some(series) if usable > 0 => {
                    for (h, set) in entry.rows {
                        pooled.entry(h).or_default().extend(set);
                    }
                    active.push((entry.symbol, series));
                }
                Some(series) => {
                    let err = InsufficientDataError {
                        symbol: Some(entry.symbol.clone()),
                        horizon: None,
                        available: series.len(),
                        required: FEATURE_WARMUP + 1,
                    };
                    debug!("Excluding from iteration {}: {}", iteration, err);
                    counts.failed_symbols += 1;
                }
                None => counts.failed_symbols += 1,
            }
        }
        counts.symbols = active.len();

        // Fit one model per horizon
        let mut models: BTreeMap<u32, Arc<HorizonModel>> = BTreeMap::new();
        for (i, &horizon) in horizons.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return None;
            }
            let set = pooled.remove(&horizon).unwrap_or_default();
            counts.training_samples_by_horizon.insert(horizon, set.len());

            match trainer.fit(set, window.cutoff, horizon) {
                Ok(model) => {
                    models.insert(horizon, Arc::new(model));
                }
                Err(e) => {
                    warn!("Iteration {}: {}", iteration, e);
                    counts.skipped_horizons.push(horizon);
                }
            }

            let fraction = TRAINING_SHARE + FITTING_SHARE * (i + 1) as f64 / horizons.len() as f64;
            self.progress.notify(
                ProgressEvent::new(iteration, fraction, Phase::Fitting).with_horizon(horizon),
            );
        }

        // Predict and resolve per symbol
        let predictor = ForwardPredictor;
        let resolver = OutcomeResolver::new(config.label_threshold);
        let total = active.len().max(1);
        let done = AtomicUsize::new(0);
        let predict_start = TRAINING_SHARE + FITTING_SHARE;

        let per_symbol: Vec<Option<SymbolPredictions>> = pool.install(|| {
            active
                .par_iter()
                .map(|(symbol, series)| {
                    if self.cancel.is_cancelled() {
                        return None;
                    }
                    let predictions = predictor.predict_window(&models, series, window.cutoff, latest);
                    let (outcomes, pending) = resolver.resolve_all(&predictions, series, latest);

                    let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                    self.progress.notify(
                        ProgressEvent::new(
                            iteration,
                            predict_start + (0.95 - predict_start) * n as f64 / total as f64,
                            Phase::Predicting,
                        )
                        .with_symbol(symbol),
                    );

                    Some(SymbolPredictions {
                        predictions,
                        outcomes,
                        pending: pending.len(),
                    })
                })
                .collect()
        });

        if per_symbol.iter().any(|r| r.is_none()) || self.cancel.is_cancelled() {
            return None;
        }

        // `active` is sorted by symbol and each symbol's output by date then
        // horizon, so concatenation is already in (symbol, date, horizon) order
        let mut predictions = Vec::new();
        let mut outcomes = Vec::new();
        for part in per_symbol.into_iter().flatten() {
            predictions.extend(part.predictions);
            outcomes.extend(part.outcomes);
            counts.pending += part.pending;
        }
        counts.predictions = predictions.len();
        counts.resolved = outcomes.len();

        self.progress
            .notify(ProgressEvent::new(iteration, 0.95, Phase::Scoring));

        let aggregator = AccuracyAggregator::new(config.blend_alpha)
            .with_weighting(config.horizon_weighting.clone());
        let horizon_accuracy = aggregator.aggregate(&outcomes);
        let average_accuracy = aggregator.overall(&horizon_accuracy);

        let calibration = CalibrationCheck::new(config.calibration_tolerance, config.min_calibration_samples)
            .check_all(&outcomes);
        let calibration_drift: Vec<u32> = calibration
            .values()
            .filter(|r| r.drift)
            .map(|r| r.horizon)
            .collect();

        let validation_start = business_days_between(window.cutoff, latest).first().copied();

        let summary = IterationSummary {
            iteration_index: iteration,
            cutoff_date: window.cutoff,
            window_start: window.start,
            validation_start,
            validation_end: latest,
            accuracy_by_horizon: horizon_accuracy
                .iter()
                .map(|(h, a)| (*h, a.blended_accuracy))
                .collect(),
            horizon_accuracy,
            average_accuracy,
            improvement_vs_previous: None,
            counts,
            calibration,
            calibration_drift,
            stop_reason: None,
            completed_at: Utc::now(),
        };

        let artifacts = IterationArtifacts {
            iteration_index: iteration,
            predictions,
            outcomes,
            models: models.into_values().map(|m| (*m).clone()).collect(),
        };

        Some((summary, artifacts))
    }

    /// Write detail records first and the summary last.
    fn persist(
        &self,
        retry: &RetryPolicy,
        config: &EngineConfig,
        run_id: &str,
        summary: &IterationSummary,
        artifacts: &IterationArtifacts,
    ) -> Result<(), EngineError> {
        let iteration = summary.iteration_index;
        retry.run("write predictions", || {
            self.store
                .write_predictions(run_id, iteration, &artifacts.predictions)
        })?;
        retry.run("write outcomes", || {
            self.store.write_outcomes(run_id, iteration, &artifacts.outcomes)
        })?;
        if config.persist_models {
            for model in &artifacts.models {
                retry.run("write model", || self.store.write_model(run_id, iteration, model))?;
            }
        }
        retry.run("write summary", || self.store.write_summary(run_id, summary))?;
        Ok(())
    }
}

/// Change from the last defined average; the first defined average counts
/// as its own improvement.
pub fn improvement(average: Option<f64>, previous: Option<f64>) -> Option<f64> {
    match (average, previous) {
        (Some(avg), Some(prev)) => Some(avg - prev),
        (Some(avg), None) => Some(avg),
        (None, _) => None,
    }
}

/// Stop rule for a completed iteration.
///
/// The improvement rule needs an earlier defined average to compare against.
pub fn decide_stop(
    config: &EngineConfig,
    iteration: usize,
    average: Option<f64>,
    improvement: Option<f64>,
    has_previous: bool,
) -> Option<StopReason> {
    if average.is_some_and(|avg| avg >= config.target_accuracy) {
        return Some(StopReason::TargetReached);
    }
    if iteration > 1
        && has_previous
        && improvement.is_some_and(|imp| imp < config.min_accuracy_improvement)
    {
        return Some(StopReason::InsufficientImprovement);
    }
    if iteration >= config.max_iterations {
        return Some(StopReason::MaxIterations);
    }
    None
}
