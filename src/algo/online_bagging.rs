//! Online Bagging Ensemble
//!
//! A population of diversity-wrapped base learners. Every member sees its own
//! Poisson-resampled copy of each batch; the population answers with a
//! majority vote (hard labels) or the mean of member scores.

use crate::algo::diversity::DiversityWrapper;
use crate::config::PopulationConfig;
use crate::error::{DddError, Result};
use crate::learner::{Label, OnlineLearner, Scores};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Clone, Debug)]
pub struct OnlineBagging<L> {
    members: Vec<DiversityWrapper<L>>,
    classes: Vec<Label>,
}

impl<L: OnlineLearner> OnlineBagging<L> {
    /// Build `config.n_estimators` members around learners from `base`.
    ///
    /// Member seeds are derived from `config.seed`, or from OS entropy when
    /// no seed is configured.
    pub fn new<F>(config: &PopulationConfig, base: F) -> Result<Self>
    where
        F: Fn() -> L,
    {
        config.validate()?;
        let mut seeder = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let members = (0..config.n_estimators)
            .map(|_| {
                DiversityWrapper::new(
                    base(),
                    config.lambda_diversity,
                    config.classes.clone(),
                    seeder.random(),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            members,
            classes: config.classes.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn members(&self) -> &[DiversityWrapper<L>] {
        &self.members
    }

    pub fn is_fitted(&self) -> bool {
        self.members.iter().all(|m| m.is_fitted())
    }
}

impl<L: OnlineLearner> OnlineLearner for OnlineBagging<L> {
    fn update(&mut self, x: &[Vec<f64>], y: &[Label]) -> Result<()> {
        for member in &mut self.members {
            member.update(x, y)?;
        }
        Ok(())
    }

    /// Majority vote; ties go to the class listed first.
    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<Label>> {
        let mut votes = vec![vec![0usize; self.classes.len()]; x.len()];

        for member in &self.members {
            let labels = member.predict(x)?;
            if labels.len() != x.len() {
                return Err(DddError::ShapeMismatch {
                    expected: format!("{} labels", x.len()),
                    actual: format!("{} labels", labels.len()),
                });
            }
            for (row, label) in votes.iter_mut().zip(&labels) {
                if let Some(idx) = self.classes.iter().position(|c| c == label) {
                    row[idx] += 1;
                }
            }
        }

        Ok(votes
            .iter()
            .map(|row| {
                let mut best = 0;
                for (i, &count) in row.iter().enumerate() {
                    if count > row[best] {
                        best = i;
                    }
                }
                self.classes[best]
            })
            .collect())
    }

    /// Unweighted mean of member scores.
    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Scores> {
        let scores = self
            .members
            .iter()
            .map(|m| m.predict_proba(x))
            .collect::<Result<Vec<_>>>()?;

        let weight = 1.0 / scores.len() as f64;
        let parts: Vec<(f64, &Scores)> = scores.iter().map(|s| (weight, s)).collect();
        Scores::weighted_sum(&parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Predicts a fixed label with a one-hot score row.
    #[derive(Clone)]
    struct Constant {
        label: Label,
        classes: Vec<Label>,
    }

    impl OnlineLearner for Constant {
        fn update(&mut self, _x: &[Vec<f64>], _y: &[Label]) -> Result<()> {
            Ok(())
        }

        fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<Label>> {
            Ok(vec![self.label; x.len()])
        }

        fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Scores> {
            let row: Vec<f64> = self
                .classes
                .iter()
                .map(|&c| if c == self.label { 1.0 } else { 0.0 })
                .collect();
            Ok(Scores::Multi(vec![row; x.len()]))
        }
    }

    fn config(n: usize) -> PopulationConfig {
        PopulationConfig::low_diversity(vec![0, 1, 2])
            .with_estimators(n)
            .with_seed(5)
    }

    #[test]
    fn test_creates_configured_members() {
        let ensemble = OnlineBagging::new(&config(4), || Constant {
            label: 1,
            classes: vec![0, 1, 2],
        })
        .unwrap();

        assert_eq!(ensemble.len(), 4);
        assert!(!ensemble.is_fitted());
        assert!(ensemble.members().iter().all(|m| m.lambda_diversity() == 1.0));
    }

    #[test]
    fn test_predict_before_update_fails() {
        let ensemble = OnlineBagging::new(&config(2), || Constant {
            label: 1,
            classes: vec![0, 1, 2],
        })
        .unwrap();

        assert!(matches!(
            ensemble.predict(&[vec![0.0]]),
            Err(DddError::NotFitted(_))
        ));
    }

    #[test]
    fn test_majority_vote_and_mean_scores() {
        let labels = std::cell::Cell::new(0);
        let picks = [2, 2, 0];
        let mut ensemble = OnlineBagging::new(&config(3), || {
            let i = labels.get();
            labels.set(i + 1);
            Constant {
                label: picks[i],
                classes: vec![0, 1, 2],
            }
        })
        .unwrap();

        ensemble.update(&[vec![1.0], vec![2.0]], &[0, 2]).unwrap();
        assert!(ensemble.is_fitted());

        let x = [vec![3.0]];
        assert_eq!(ensemble.predict(&x).unwrap(), vec![2]);

        match ensemble.predict_proba(&x).unwrap() {
            Scores::Multi(m) => {
                assert!((m[0][0] - 1.0 / 3.0).abs() < 1e-12);
                assert_eq!(m[0][1], 0.0);
                assert!((m[0][2] - 2.0 / 3.0).abs() < 1e-12);
            }
            other => panic!("Expected multiclass scores, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        let bad = PopulationConfig::low_diversity(vec![0, 1]).with_estimators(0);
        let result = OnlineBagging::new(&bad, || Constant {
            label: 0,
            classes: vec![0, 1],
        });
        assert!(matches!(result, Err(DddError::InvalidConfig(_))));
    }
}
