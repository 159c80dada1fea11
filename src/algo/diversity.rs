//! Diversity Wrapper
//!
//! Wraps a base learner and trains it on a Poisson-resampled view of every
//! batch. The resampling rate controls how much the members of an ensemble
//! disagree: `lambda = 1` behaves like online bootstrap (low diversity),
//! `lambda = 0.1` trains each member on a sparse subset (high diversity).

use crate::error::{DddError, Result};
use crate::learner::{Label, OnlineLearner, Scores, validate_batch};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Poisson};
use tracing::trace;

#[derive(Clone, Debug)]
pub struct DiversityWrapper<L> {
    learner: L,
    lambda_diversity: f64,
    poisson: Poisson<f64>,
    classes: Vec<Label>,
    rng: StdRng,
    fitted: bool,
}

impl<L: OnlineLearner> DiversityWrapper<L> {
    /// Wrap `learner` with a resampling rate and the full label set.
    pub fn new(learner: L, lambda_diversity: f64, classes: Vec<Label>, seed: u64) -> Result<Self> {
        let poisson = Poisson::new(lambda_diversity).map_err(|e| {
            DddError::InvalidConfig(format!("lambda_diversity {}: {}", lambda_diversity, e))
        })?;

        Ok(Self {
            learner,
            lambda_diversity,
            poisson,
            classes,
            rng: StdRng::seed_from_u64(seed),
            fitted: false,
        })
    }

    pub fn lambda_diversity(&self) -> f64 {
        self.lambda_diversity
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    pub fn learner(&self) -> &L {
        &self.learner
    }

    /// Draw a Poisson count per sample and replicate each sample that many
    /// times, one pass per unit of count. Redraws until at least one sample
    /// is selected.
    fn resample(&mut self, x: &[Vec<f64>], y: &[Label]) -> (Vec<Vec<f64>>, Vec<Label>) {
        let poisson = &self.poisson;
        let rng = &mut self.rng;
        let mut counts: Vec<u64> = loop {
            let draw: Vec<u64> = (0..x.len())
                .map(|_| poisson.sample(&mut *rng) as u64)
                .collect();
            if draw.iter().any(|&k| k > 0) {
                break draw;
            }
        };

        let total: u64 = counts.iter().sum();
        let mut x_train = Vec::with_capacity(total as usize);
        let mut y_train = Vec::with_capacity(total as usize);

        while counts.iter().any(|&k| k > 0) {
            for (i, k) in counts.iter_mut().enumerate() {
                if *k > 0 {
                    x_train.push(x[i].clone());
                    y_train.push(y[i]);
                    *k -= 1;
                }
            }
        }

        (x_train, y_train)
    }

    /// Append one all-zero row for each known class absent from `y`.
    fn cover_classes(&self, x: &mut Vec<Vec<f64>>, y: &mut Vec<Label>, dim: usize) -> usize {
        let missing: Vec<Label> = self
            .classes
            .iter()
            .copied()
            .filter(|c| !y.contains(c))
            .collect();

        for &class in &missing {
            x.push(vec![0.0; dim]);
            y.push(class);
        }
        missing.len()
    }

    /// Build the training set the wrapped learner would see for this batch.
    pub fn training_set(&mut self, x: &[Vec<f64>], y: &[Label]) -> Result<(Vec<Vec<f64>>, Vec<Label>)> {
        validate_batch(x, y)?;
        let (mut x_train, mut y_train) = self.resample(x, y);
        let drawn = y_train.len();
        let synthesized = self.cover_classes(&mut x_train, &mut y_train, x[0].len());

        trace!(
            batch = x.len(),
            drawn,
            synthesized,
            lambda = self.lambda_diversity,
            "Resampled batch for diversity"
        );
        Ok((x_train, y_train))
    }
}

impl<L: OnlineLearner> OnlineLearner for DiversityWrapper<L> {
    fn update(&mut self, x: &[Vec<f64>], y: &[Label]) -> Result<()> {
        let (x_train, y_train) = self.training_set(x, y)?;
        self.learner.update(&x_train, &y_train)?;
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<Label>> {
        if !self.fitted {
            return Err(DddError::NotFitted("diversity wrapper".to_string()));
        }
        self.learner.predict(x)
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Scores> {
        if !self.fitted {
            return Err(DddError::NotFitted("diversity wrapper".to_string()));
        }
        self.learner.predict_proba(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records every training set it is fitted on.
    #[derive(Clone, Default)]
    struct Recorder {
        seen: Rc<RefCell<Vec<(Vec<Vec<f64>>, Vec<Label>)>>>,
    }

    impl OnlineLearner for Recorder {
        fn update(&mut self, x: &[Vec<f64>], y: &[Label]) -> Result<()> {
            self.seen.borrow_mut().push((x.to_vec(), y.to_vec()));
            Ok(())
        }

        fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<Label>> {
            Ok(vec![0; x.len()])
        }

        fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Scores> {
            Ok(Scores::Binary(vec![-1.0; x.len()]))
        }
    }

    fn batch() -> (Vec<Vec<f64>>, Vec<Label>) {
        let x = (0..20).map(|i| vec![i as f64 + 1.0, 0.5]).collect();
        let y = (0..20).map(|i| (i % 2) as Label).collect();
        (x, y)
    }

    #[test]
    fn test_predict_before_update_fails() {
        let wrapper = DiversityWrapper::new(Recorder::default(), 1.0, vec![0, 1], 7).unwrap();
        assert!(matches!(
            wrapper.predict(&[vec![1.0]]),
            Err(DddError::NotFitted(_))
        ));
        assert!(matches!(
            wrapper.predict_proba(&[vec![1.0]]),
            Err(DddError::NotFitted(_))
        ));
    }

    #[test]
    fn test_rejects_non_positive_lambda() {
        let result = DiversityWrapper::new(Recorder::default(), 0.0, vec![0, 1], 7);
        assert!(matches!(result, Err(DddError::InvalidConfig(_))));
    }

    #[test]
    fn test_training_set_covers_all_classes() {
        let recorder = Recorder::default();
        let seen = recorder.seen.clone();
        let mut wrapper = DiversityWrapper::new(recorder, 0.1, vec![0, 1, 2], 42).unwrap();
        let (x, y) = batch();

        for _ in 0..50 {
            wrapper.update(&x, &y).unwrap();
        }

        let seen = seen.borrow();
        assert_eq!(seen.len(), 50);
        for (x_train, y_train) in seen.iter() {
            assert_eq!(x_train.len(), y_train.len());
            for class in [0, 1, 2] {
                assert!(y_train.contains(&class), "Class {} missing", class);
            }
            // class 2 never occurs in the batch, so it is always a synthetic zero row
            let pos = y_train.iter().position(|&c| c == 2).unwrap();
            assert_eq!(x_train[pos], vec![0.0, 0.0]);
        }
        assert!(wrapper.is_fitted());
    }

    #[test]
    fn test_resampling_is_round_robin() {
        let mut wrapper = DiversityWrapper::new(Recorder::default(), 1.0, vec![0, 1], 3).unwrap();
        let (x, y) = batch();

        let (x_train, y_train) = wrapper.training_set(&x, &y).unwrap();
        assert_eq!(x_train.len(), y_train.len());

        // Real rows carry ids 1..=20; synthetic rows are all zero.
        let ids: Vec<f64> = x_train.iter().map(|row| row[0]).filter(|&v| v > 0.0).collect();
        assert!(!ids.is_empty(), "At least one sample must be drawn");

        // Split into passes: each pass lists samples in batch order.
        let mut passes: Vec<Vec<f64>> = vec![vec![ids[0]]];
        for pair in ids.windows(2) {
            if pair[1] > pair[0] {
                passes.last_mut().unwrap().push(pair[1]);
            } else {
                passes.push(vec![pair[1]]);
            }
        }
        for pair in passes.windows(2) {
            assert!(
                pair[1].iter().all(|id| pair[0].contains(id)),
                "A later pass may only repeat samples from the previous pass"
            );
        }
        for (row, label) in x_train.iter().zip(&y_train).filter(|(row, _)| row[0] > 0.0) {
            let original = row[0] as usize - 1;
            assert_eq!(*label, y[original], "Labels must stay paired with their rows");
        }
    }

    #[test]
    fn test_sparse_rate_always_trains() {
        let recorder = Recorder::default();
        let seen = recorder.seen.clone();
        let mut wrapper = DiversityWrapper::new(recorder, 0.01, vec![0, 1], 11).unwrap();

        for _ in 0..20 {
            wrapper.update(&[vec![5.0]], &[1]).unwrap();
        }

        for (x_train, y_train) in seen.borrow().iter() {
            assert!(y_train.iter().filter(|&&c| c == 1).count() >= 1);
            assert!(x_train.iter().any(|row| row[0] == 5.0), "Real sample must be drawn");
        }
    }

    #[test]
    fn test_seeded_resampling_is_reproducible() {
        let (x, y) = batch();
        let mut a = DiversityWrapper::new(Recorder::default(), 1.0, vec![0, 1], 99).unwrap();
        let mut b = DiversityWrapper::new(Recorder::default(), 1.0, vec![0, 1], 99).unwrap();

        assert_eq!(a.training_set(&x, &y).unwrap(), b.training_set(&x, &y).unwrap());
    }
}
