//! Prequential Accuracy Estimator
//!
//! Running accuracy of one learner population since the last drift, with the
//! binomial variance of that estimate. The average restarts from the batch
//! accuracy whenever a drift is signalled, so no history has to be stored.

use crate::error::{DddError, Result};
use crate::learner::Label;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PrequentialMetrics {
    /// Accuracy since the last drift
    pub acc: f64,
    /// Variance of `acc`
    pub var: f64,
    /// Always `sqrt(var)`
    pub std: f64,
    /// Cumulative samples seen
    pub t: u64,
    /// Value of `t` at the last drift reset
    pub t_drift: u64,
}

impl Default for PrequentialMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PrequentialMetrics {
    pub fn new() -> Self {
        Self {
            acc: 1.0,
            var: 0.0,
            std: 0.0,
            t: 0,
            t_drift: 0,
        }
    }

    /// Fold one labelled batch into the estimate.
    ///
    /// With `drift` set the estimate restarts at the batch accuracy;
    /// otherwise it moves toward it by `1 / (t - t_drift + 1)`.
    pub fn update(&mut self, y_pred: &[Label], y_true: &[Label], drift: bool) -> Result<()> {
        let n = y_pred.len();
        if n == 0 {
            return Err(DddError::InvalidInput(
                "cannot score an empty batch".to_string(),
            ));
        }
        if n != y_true.len() {
            return Err(DddError::InvalidInput(format!(
                "{} predictions but {} labels",
                n,
                y_true.len()
            )));
        }

        self.t += n as u64;
        let correct = y_pred.iter().zip(y_true).filter(|(p, t)| p == t).count();
        let batch_acc = correct as f64 / n as f64;

        if drift {
            self.acc = batch_acc;
            self.var = self.acc * (1.0 - self.acc) / n as f64;
            self.t_drift = self.t;
        } else {
            // t_drift <= t, so denom >= 1
            let denom = (self.t - self.t_drift + 1) as f64;
            self.acc += (batch_acc - self.acc) / denom;
            self.var = self.acc * (1.0 - self.acc) / denom;
        }

        self.std = self.var.sqrt();
        Ok(())
    }

    /// `acc - std`
    pub fn lower_bound(&self) -> f64 {
        self.acc - self.std
    }

    /// `acc + std`
    pub fn upper_bound(&self) -> f64 {
        self.acc + self.std
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let m = PrequentialMetrics::new();
        assert_eq!(m.acc, 1.0);
        assert_eq!(m.var, 0.0);
        assert_eq!(m.std, 0.0);
        assert_eq!((m.t, m.t_drift), (0, 0));
    }

    #[test]
    fn test_drift_reset_uses_batch_accuracy() {
        let mut m = PrequentialMetrics::new();
        m.update(&[0, 1, 1, 0], &[0, 1, 0, 0], false).unwrap();
        m.update(&[1, 1, 0, 0], &[1, 0, 1, 0], true).unwrap();

        assert_eq!(m.acc, 0.5, "Accuracy after reset should equal batch accuracy");
        assert_eq!(m.var, 0.25 / 4.0);
        assert_eq!(m.t, 8);
        assert_eq!(m.t_drift, 8, "t_drift should follow t on reset");
        assert_eq!(m.std, m.var.sqrt());
    }

    #[test]
    fn test_perfect_batch_with_drift() {
        let mut m = PrequentialMetrics::new();
        m.update(&[0, 1], &[0, 1], true).unwrap();

        assert_eq!(m.acc, 1.0);
        assert_eq!(m.var, 0.0);
        assert_eq!(m.t, 2);
        assert_eq!(m.t_drift, 2);
    }

    #[test]
    fn test_running_average() {
        let mut m = PrequentialMetrics::new();
        // denom = 2 - 0 + 1 = 3
        m.update(&[0, 0], &[1, 1], false).unwrap();
        let expected = 1.0 + (0.0 - 1.0) / 3.0;
        assert!((m.acc - expected).abs() < 1e-12);
        assert!((m.var - expected * (1.0 - expected) / 3.0).abs() < 1e-12);

        // denom = 4 - 0 + 1 = 5
        m.update(&[1, 1], &[1, 1], false).unwrap();
        let expected = expected + (1.0 - expected) / 5.0;
        assert!((m.acc - expected).abs() < 1e-12);
    }

    #[test]
    fn test_std_tracks_variance() {
        let mut m = PrequentialMetrics::new();
        let batches: [(&[Label], &[Label], bool); 4] = [
            (&[0, 1, 1], &[0, 0, 1], false),
            (&[1], &[0], false),
            (&[1, 1, 1, 1], &[1, 0, 1, 1], true),
            (&[0, 0], &[0, 1], false),
        ];
        for (pred, truth, drift) in batches {
            m.update(pred, truth, drift).unwrap();
            assert_eq!(m.std, m.var.sqrt(), "std must equal sqrt(var)");
            assert!(m.t_drift <= m.t);
            assert!((0.0..=1.0).contains(&m.acc));
        }
    }

    #[test]
    fn test_rejects_bad_batches() {
        let mut m = PrequentialMetrics::new();
        assert!(matches!(
            m.update(&[], &[], false),
            Err(DddError::InvalidInput(_))
        ));
        assert!(matches!(
            m.update(&[0, 1], &[0], true),
            Err(DddError::InvalidInput(_))
        ));
        assert_eq!(m, PrequentialMetrics::new(), "Failed update must not mutate");
    }
}
