//! DDD Controller
//!
//! Diversity for Dealing with Drifts. Four ensemble populations are kept:
//! new/old crossed with low/high diversity. Before any drift only the new
//! low-diversity population answers. After a drift the previous populations
//! are kept as "old" and the system votes between new-low, old-low and
//! old-high, weighted by their prequential accuracy, until either the new
//! population catches up or the old high-diversity one proves the drift was
//! a false alarm.
//!
//! Reference: Minku & Yao, "DDD: A New Ensemble Approach for Dealing with
//! Concept Drift", IEEE TKDE 24(4), 2012.

use crate::algo::drift_detector::DriftDetector;
use crate::algo::prequential::PrequentialMetrics;
use crate::config::{DddConfig, PopulationConfig};
use crate::error::{DddError, Result};
use crate::learner::{Label, OnlineLearner, Scores, validate_batch, validate_features};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace};

// ============================================================================
// CORE ABSTRACTIONS
// ============================================================================

/// Controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Only the new low-diversity population predicts
    BeforeDrift,
    /// Weighted vote of new-low, old-low and old-high
    AfterDrift,
}

/// Population slot tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Population {
    NewLow,
    NewHigh,
    OldLow,
    OldHigh,
}

impl Population {
    pub const ALL: [Population; 4] = [
        Population::NewLow,
        Population::NewHigh,
        Population::OldLow,
        Population::OldHigh,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Population::NewLow => "new-low",
            Population::NewHigh => "new-high",
            Population::OldLow => "old-low",
            Population::OldHigh => "old-high",
        }
    }
}

/// An ensemble and the accuracy tracker describing it. Moves as a unit.
#[derive(Debug, Clone)]
struct Slot<E> {
    learner: E,
    metrics: PrequentialMetrics,
}

/// Normalized voting weights used after a drift
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VotingWeights {
    pub new_low: f64,
    pub old_low: f64,
    pub old_high: f64,
}

impl VotingWeights {
    /// `acc_nl : w·acc_ol : acc_oh`, normalized to sum to one.
    /// Equal weights when every accuracy is zero.
    pub fn from_accuracies(acc_nl: f64, acc_ol: f64, acc_oh: f64, w: f64) -> Self {
        let sum = acc_nl + w * acc_ol + acc_oh;
        if sum > 0.0 {
            Self {
                new_low: acc_nl / sum,
                old_low: w * acc_ol / sum,
                old_high: acc_oh / sum,
            }
        } else {
            Self {
                new_low: 1.0 / 3.0,
                old_low: 1.0 / 3.0,
                old_high: 1.0 / 3.0,
            }
        }
    }
}

/// Builds an ensemble from a population configuration.
pub type EnsembleFactory<E> = Box<dyn Fn(&PopulationConfig) -> Result<E>>;

/// Snapshot for monitoring
#[derive(Debug, Clone, Serialize)]
pub struct DddStats {
    pub mode: Mode,
    pub steps: u64,
    pub drift_count: u64,
    pub last_drift: bool,
    pub weights: Option<VotingWeights>,
    pub new_low: Option<PrequentialMetrics>,
    pub new_high: Option<PrequentialMetrics>,
    pub old_low: Option<PrequentialMetrics>,
    pub old_high: Option<PrequentialMetrics>,
}

// ============================================================================
// CONTROLLER
// ============================================================================

pub struct Ddd<E, D> {
    config: DddConfig,
    detector: D,
    factory: EnsembleFactory<E>,
    /// Derives a distinct seed for every population built
    seeder: StdRng,
    mode: Mode,
    /// Detector output of the previous drift-detection step
    drift: bool,
    slots: [Option<Slot<E>>; 4],
    /// System prediction awaiting its labels
    y_pred: Option<Vec<Label>>,
    weights: Option<VotingWeights>,
    drift_count: u64,
    steps: u64,
}

fn spawn_population<E>(
    factory: &EnsembleFactory<E>,
    seeder: &mut StdRng,
    base: &PopulationConfig,
) -> Result<Slot<E>> {
    let mut config = base.clone();
    config.seed = Some(seeder.random());
    Ok(Slot {
        learner: factory(&config)?,
        metrics: PrequentialMetrics::new(),
    })
}

fn not_ready(population: Population) -> DddError {
    error!(
        population = population.name(),
        "Population slot is empty; controller invariant broken"
    );
    DddError::NotReady(format!("{} population is missing", population.name()))
}

impl<E, D> Ddd<E, D>
where
    E: OnlineLearner + Clone,
    D: DriftDetector,
{
    /// Create a controller with fresh new-low and new-high populations.
    pub fn new<DF, EF>(detector_factory: DF, ensemble_factory: EF, config: DddConfig) -> Result<Self>
    where
        DF: FnOnce() -> D,
        EF: Fn(&PopulationConfig) -> Result<E> + 'static,
    {
        config.validate()?;
        let factory: EnsembleFactory<E> = Box::new(ensemble_factory);
        let mut seeder = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let new_low = spawn_population(&factory, &mut seeder, &config.low)?;
        let new_high = spawn_population(&factory, &mut seeder, &config.high)?;

        debug!(
            w = config.w,
            lambda_low = config.low.lambda_diversity,
            lambda_high = config.high.lambda_diversity,
            classes = config.classes().len(),
            "DDD controller created"
        );

        Ok(Self {
            detector: detector_factory(),
            factory,
            seeder,
            mode: Mode::BeforeDrift,
            drift: false,
            slots: [Some(new_low), Some(new_high), None, None],
            y_pred: None,
            weights: None,
            drift_count: 0,
            steps: 0,
            config,
        })
    }

    fn slot(&self, population: Population) -> Result<&Slot<E>> {
        self.slots[population.index()]
            .as_ref()
            .ok_or_else(|| not_ready(population))
    }

    fn slot_mut(&mut self, population: Population) -> Result<&mut Slot<E>> {
        self.slots[population.index()]
            .as_mut()
            .ok_or_else(|| not_ready(population))
    }

    fn take(&mut self, population: Population) -> Result<Slot<E>> {
        self.slots[population.index()]
            .take()
            .ok_or_else(|| not_ready(population))
    }

    fn put(&mut self, population: Population, slot: Slot<E>) {
        self.slots[population.index()] = Some(slot);
    }

    fn spawn(&mut self, base: &PopulationConfig) -> Result<Slot<E>> {
        spawn_population(&self.factory, &mut self.seeder, base)
    }

    // ------------------------------------------------------------------------
    // Prediction
    // ------------------------------------------------------------------------

    /// Predict labels for a batch and remember them for the next `update`.
    pub fn predict(&mut self, x: &[Vec<f64>]) -> Result<Vec<Label>> {
        validate_features(x)?;

        let y_pred = match self.mode {
            Mode::BeforeDrift => self.slot(Population::NewLow)?.learner.predict(x)?,
            Mode::AfterDrift => {
                let (labels, weights) = self.weighted_majority(x)?;
                self.weights = Some(weights);
                labels
            }
        };

        self.y_pred = Some(y_pred.clone());
        Ok(y_pred)
    }

    /// Weighted vote of new-low, old-low and old-high. New-high is left out:
    /// it has not yet had time to learn the new concept.
    fn weighted_majority(&self, x: &[Vec<f64>]) -> Result<(Vec<Label>, VotingWeights)> {
        let nl = self.slot(Population::NewLow)?;
        let ol = self.slot(Population::OldLow)?;
        let oh = self.slot(Population::OldHigh)?;

        let weights = VotingWeights::from_accuracies(
            nl.metrics.acc,
            ol.metrics.acc,
            oh.metrics.acc,
            self.config.w,
        );
        debug!(
            w_nl = weights.new_low,
            w_ol = weights.old_low,
            w_oh = weights.old_high,
            "Voting weights"
        );

        let s_nl = nl.learner.predict_proba(x)?;
        let s_ol = ol.learner.predict_proba(x)?;
        let s_oh = oh.learner.predict_proba(x)?;
        let combined = Scores::weighted_sum(&[
            (weights.new_low, &s_nl),
            (weights.old_low, &s_ol),
            (weights.old_high, &s_oh),
        ])?;

        Ok((combined.to_labels(self.config.classes())?, weights))
    }

    // ------------------------------------------------------------------------
    // Learning
    // ------------------------------------------------------------------------

    /// Consume the true labels of a batch: run drift detection against the
    /// pending prediction (if any), then train the active populations.
    ///
    /// The pending prediction is consumed, so a second `update` without an
    /// intervening `predict` only trains and does not run detection again.
    pub fn update(&mut self, x: &[Vec<f64>], y_true: &[Label]) -> Result<()> {
        validate_batch(x, y_true)?;
        self.steps += 1;

        if let Some(y_pred) = self.y_pred.take() {
            self.detect_drift(x, y_true, &y_pred)?;
        }

        for population in [Population::NewLow, Population::NewHigh] {
            self.slot_mut(population)?.learner.update(x, y_true)?;
        }
        if self.mode == Mode::AfterDrift {
            for population in [Population::OldLow, Population::OldHigh] {
                self.slot_mut(population)?.learner.update(x, y_true)?;
            }
        }

        trace!(step = self.steps, mode = ?self.mode, batch = x.len(), "Populations updated");
        Ok(())
    }

    fn detect_drift(&mut self, x: &[Vec<f64>], y_true: &[Label], y_pred: &[Label]) -> Result<()> {
        if y_pred.len() != y_true.len() {
            return Err(DddError::InvalidInput(format!(
                "pending prediction covers {} samples but {} labels were given",
                y_pred.len(),
                y_true.len()
            )));
        }

        // The metrics see the previous step's drift flag.
        let lagged = self.drift;

        let nh_pred = self.slot(Population::NewHigh)?.learner.predict(x)?;
        let old_preds = match self.mode {
            Mode::AfterDrift => Some((
                self.slot(Population::OldHigh)?.learner.predict(x)?,
                self.slot(Population::OldLow)?.learner.predict(x)?,
            )),
            Mode::BeforeDrift => None,
        };

        self.slot_mut(Population::NewLow)?
            .metrics
            .update(y_pred, y_true, lagged)?;
        self.slot_mut(Population::NewHigh)?
            .metrics
            .update(&nh_pred, y_true, lagged)?;
        if let Some((oh_pred, ol_pred)) = old_preds {
            self.slot_mut(Population::OldHigh)?
                .metrics
                .update(&oh_pred, y_true, lagged)?;
            self.slot_mut(Population::OldLow)?
                .metrics
                .update(&ol_pred, y_true, lagged)?;
        }

        self.drift = self.detector.detect(y_true, y_pred);
        if self.drift {
            self.on_drift()?;
        }
        if self.mode == Mode::AfterDrift {
            self.check_recovery()?;
        }
        Ok(())
    }

    /// Rotate populations: the better low-diversity candidate becomes old-low,
    /// new-high becomes old-high, and fresh new populations are built.
    fn on_drift(&mut self) -> Result<()> {
        let low = self.config.low.clone();
        let high = self.config.high.clone();
        let fresh_low = self.spawn(&low)?;
        let fresh_high = self.spawn(&high)?;

        let promote_new_low = match self.mode {
            Mode::BeforeDrift => true,
            Mode::AfterDrift => {
                self.slot(Population::NewLow)?.metrics.acc
                    > self.slot(Population::OldHigh)?.metrics.acc
            }
        };

        let old_low = if promote_new_low {
            self.take(Population::NewLow)?
        } else {
            self.take(Population::OldHigh)?
        };
        let old_high = self.take(Population::NewHigh)?;

        self.put(Population::OldLow, old_low);
        self.put(Population::OldHigh, old_high);
        self.put(Population::NewLow, fresh_low);
        self.put(Population::NewHigh, fresh_high);

        self.drift_count += 1;
        let old_low_from = if promote_new_low {
            Population::NewLow
        } else {
            Population::OldHigh
        };
        info!(
            step = self.steps,
            drifts = self.drift_count,
            was = ?self.mode,
            old_low_from = old_low_from.name(),
            "Drift detected; populations rotated"
        );
        self.mode = Mode::AfterDrift;
        Ok(())
    }

    /// Leave the after-drift mode when the new low-diversity population is
    /// the most accurate, or when old-high is significantly better than both
    /// low-diversity populations (the drift is then treated as a false alarm).
    fn check_recovery(&mut self) -> Result<()> {
        let nl = self.slot(Population::NewLow)?.metrics.clone();
        let ol = self.slot(Population::OldLow)?.metrics.clone();
        let oh = self.slot(Population::OldHigh)?.metrics.clone();

        if nl.acc > oh.acc && nl.acc > ol.acc {
            self.mode = Mode::BeforeDrift;
            self.weights = None;
            info!(
                step = self.steps,
                acc_nl = nl.acc,
                acc_ol = ol.acc,
                acc_oh = oh.acc,
                "New low-diversity population recovered"
            );
        } else if oh.lower_bound() > nl.upper_bound() && oh.lower_bound() > ol.upper_bound() {
            let reverted = self.slot(Population::OldHigh)?.clone();
            self.put(Population::NewLow, reverted);
            self.mode = Mode::BeforeDrift;
            self.weights = None;
            info!(
                step = self.steps,
                acc_oh = oh.acc,
                std_oh = oh.std,
                "Old high-diversity population dominates; reverting"
            );
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Output of the most recent drift-detection step.
    pub fn last_drift(&self) -> bool {
        self.drift
    }

    pub fn drift_count(&self) -> u64 {
        self.drift_count
    }

    /// Weights of the last after-drift prediction; cleared on return to
    /// `BeforeDrift`.
    pub fn weights(&self) -> Option<VotingWeights> {
        self.weights
    }

    pub fn population(&self, population: Population) -> Option<&E> {
        self.slots[population.index()].as_ref().map(|s| &s.learner)
    }

    pub fn metrics(&self, population: Population) -> Option<&PrequentialMetrics> {
        self.slots[population.index()].as_ref().map(|s| &s.metrics)
    }

    pub fn config(&self) -> &DddConfig {
        &self.config
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn get_stats(&self) -> DddStats {
        let metrics = |p: Population| self.metrics(p).cloned();
        DddStats {
            mode: self.mode,
            steps: self.steps,
            drift_count: self.drift_count,
            last_drift: self.drift,
            weights: self.weights,
            new_low: metrics(Population::NewLow),
            new_high: metrics(Population::NewHigh),
            old_low: metrics(Population::OldLow),
            old_high: metrics(Population::OldHigh),
        }
    }
}
