//! Concept Drift Detection
//!
//! Detectors watch the stream of prediction errors and raise a signal when the
//! error rate rises significantly above the best level seen so far.
//!
//! Methods implemented:
//! - DDM (Drift Detection Method) over the per-sample error indicator

use crate::learner::Label;
use serde::{Deserialize, Serialize};

/// Stateful drift signal over batches of (true, predicted) labels.
pub trait DriftDetector {
    /// Feed one labelled batch; `true` when a drift is detected.
    fn detect(&mut self, y_true: &[Label], y_pred: &[Label]) -> bool;
}

/// Zone the monitored error rate currently sits in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriftLevel {
    /// Error rate within the normal band
    Stable,
    /// Error rate past the warning band
    Warning,
    /// Error rate past the drift band
    Drift,
}

/// DDM: tracks the error rate `p` and its deviation `s = sqrt(p(1-p)/n)`,
/// remembers the minimum of `p + s`, and signals when the current value
/// exceeds that minimum by `drift_level` deviations.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Ddm {
    /// Observations required before testing
    min_samples: u64,
    /// Warning multiplier on `s_min`
    warning_level: f64,
    /// Drift multiplier on `s_min`
    drift_level: f64,
    /// Observations since the last reset
    n: u64,
    /// Errors since the last reset
    errors: u64,
    /// Error rate at the minimum of `p + s`
    p_min: f64,
    /// Deviation at the minimum of `p + s`
    s_min: f64,
    level: DriftLevel,
    /// Drifts signalled over the detector lifetime
    drift_count: u64,
}

impl Default for Ddm {
    fn default() -> Self {
        Self::new()
    }
}

impl Ddm {
    pub fn new() -> Self {
        Self {
            min_samples: 30,
            warning_level: 2.0,
            drift_level: 3.0,
            n: 0,
            errors: 0,
            p_min: f64::MAX,
            s_min: f64::MAX,
            level: DriftLevel::Stable,
            drift_count: 0,
        }
    }

    pub fn with_min_samples(mut self, n: u64) -> Self {
        self.min_samples = n.max(1);
        self
    }

    pub fn with_levels(mut self, warning: f64, drift: f64) -> Self {
        self.warning_level = warning.max(0.0);
        self.drift_level = drift.max(self.warning_level);
        self
    }

    /// Add one prediction outcome.
    pub fn add_element(&mut self, error: bool) -> DriftLevel {
        self.n += 1;
        if error {
            self.errors += 1;
        }

        if self.n < self.min_samples {
            self.level = DriftLevel::Stable;
            return self.level;
        }

        let n = self.n as f64;
        let p = self.errors as f64 / n;
        let s = (p * (1.0 - p) / n).sqrt();

        if p + s < self.p_min + self.s_min {
            self.p_min = p;
            self.s_min = s;
        }

        // strict: a constant error rate (s = 0) must never signal
        self.level = if p + s > self.p_min + self.drift_level * self.s_min {
            DriftLevel::Drift
        } else if p + s > self.p_min + self.warning_level * self.s_min {
            DriftLevel::Warning
        } else {
            DriftLevel::Stable
        };

        if self.level == DriftLevel::Drift {
            self.drift_count += 1;
            self.reset_window();
            return DriftLevel::Drift;
        }
        self.level
    }

    fn reset_window(&mut self) {
        self.n = 0;
        self.errors = 0;
        self.p_min = f64::MAX;
        self.s_min = f64::MAX;
        self.level = DriftLevel::Stable;
    }

    /// Forget everything, including the lifetime drift count.
    pub fn reset(&mut self) {
        self.reset_window();
        self.drift_count = 0;
    }

    pub fn level(&self) -> DriftLevel {
        self.level
    }

    pub fn drift_count(&self) -> u64 {
        self.drift_count
    }

    /// (observations, error rate, level)
    pub fn get_stats(&self) -> (u64, f64, DriftLevel) {
        let rate = if self.n == 0 {
            0.0
        } else {
            self.errors as f64 / self.n as f64
        };
        (self.n, rate, self.level)
    }
}

impl DriftDetector for Ddm {
    fn detect(&mut self, y_true: &[Label], y_pred: &[Label]) -> bool {
        let mut drift = false;
        for (t, p) in y_true.iter().zip(y_pred) {
            if self.add_element(t != p) == DriftLevel::Drift {
                drift = true;
            }
        }
        drift
    }
}
