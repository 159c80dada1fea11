//! Online Learner Capability
//!
//! The contract shared by base learners and by the ensembles built on top of
//! them. Anything that can be fitted incrementally on a batch and queried for
//! hard labels or class scores can be plugged into the controller.

use crate::error::{DddError, Result};

/// Integer class label.
pub type Label = i64;

/// Class scores for a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Scores {
    /// One signed margin per sample; positive selects the second known class.
    Binary(Vec<f64>),
    /// `n_samples × n_classes` score matrix.
    Multi(Vec<Vec<f64>>),
}

impl Scores {
    /// Number of samples scored.
    pub fn len(&self) -> usize {
        match self {
            Scores::Binary(v) => v.len(),
            Scores::Multi(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn shape(&self) -> String {
        match self {
            Scores::Binary(v) => format!("binary[{}]", v.len()),
            Scores::Multi(m) => {
                let cols = m.first().map(|r| r.len()).unwrap_or(0);
                format!("multi[{}x{}]", m.len(), cols)
            }
        }
    }

    /// Element-wise weighted sum `Σ w_i · s_i`.
    ///
    /// Every part must have the same variant and shape as the first one.
    pub fn weighted_sum(parts: &[(f64, &Scores)]) -> Result<Scores> {
        let (first_weight, first) = parts
            .first()
            .ok_or_else(|| DddError::InvalidInput("no scores to combine".to_string()))?;

        let mut acc = match first {
            Scores::Binary(v) => Scores::Binary(v.iter().map(|s| s * first_weight).collect()),
            Scores::Multi(m) => Scores::Multi(
                m.iter()
                    .map(|row| row.iter().map(|s| s * first_weight).collect())
                    .collect(),
            ),
        };

        for (weight, part) in &parts[1..] {
            match (&mut acc, part) {
                (Scores::Binary(total), Scores::Binary(v)) if total.len() == v.len() => {
                    total.iter_mut().zip(v).for_each(|(t, s)| *t += weight * s);
                }
                (Scores::Multi(total), Scores::Multi(m))
                    if total.len() == m.len()
                        && total.iter().zip(m).all(|(a, b)| a.len() == b.len()) =>
                {
                    for (t_row, row) in total.iter_mut().zip(m) {
                        t_row.iter_mut().zip(row).for_each(|(t, s)| *t += weight * s);
                    }
                }
                _ => {
                    return Err(DddError::ShapeMismatch {
                        expected: first.shape(),
                        actual: part.shape(),
                    });
                }
            }
        }

        Ok(acc)
    }

    /// Convert scores to hard labels drawn from `classes`.
    ///
    /// Binary margins are thresholded at zero; matrices use the arg-max column
    /// (first maximum on ties).
    pub fn to_labels(&self, classes: &[Label]) -> Result<Vec<Label>> {
        match self {
            Scores::Binary(v) => {
                if classes.len() != 2 {
                    return Err(DddError::ShapeMismatch {
                        expected: format!("{} classes", classes.len()),
                        actual: self.shape(),
                    });
                }
                Ok(v
                    .iter()
                    .map(|&s| if s > 0.0 { classes[1] } else { classes[0] })
                    .collect())
            }
            Scores::Multi(m) => m
                .iter()
                .map(|row| {
                    if row.len() != classes.len() {
                        return Err(DddError::ShapeMismatch {
                            expected: format!("{} classes", classes.len()),
                            actual: format!("{} columns", row.len()),
                        });
                    }
                    let mut best = 0;
                    for (i, &s) in row.iter().enumerate() {
                        if s > row[best] {
                            best = i;
                        }
                    }
                    Ok(classes[best])
                })
                .collect(),
        }
    }
}

/// Incrementally trainable classifier.
pub trait OnlineLearner {
    /// Fit on one more batch.
    fn update(&mut self, x: &[Vec<f64>], y: &[Label]) -> Result<()>;

    /// Hard labels for a batch.
    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<Label>>;

    /// Class scores for a batch.
    fn predict_proba(&self, x: &[Vec<f64>]) -> Result<Scores>;
}

/// Reject empty batches, label/feature length mismatches and ragged rows.
pub fn validate_batch(x: &[Vec<f64>], y: &[Label]) -> Result<()> {
    validate_features(x)?;
    if x.len() != y.len() {
        return Err(DddError::InvalidInput(format!(
            "{} feature rows but {} labels",
            x.len(),
            y.len()
        )));
    }
    Ok(())
}

/// Reject empty or ragged feature batches.
pub fn validate_features(x: &[Vec<f64>]) -> Result<()> {
    let dim = match x.first() {
        Some(row) => row.len(),
        None => return Err(DddError::InvalidInput("empty batch".to_string())),
    };
    if let Some(pos) = x.iter().position(|row| row.len() != dim) {
        return Err(DddError::InvalidInput(format!(
            "row {} has dimension {}, expected {}",
            pos,
            x[pos].len(),
            dim
        )));
    }
    Ok(())
}
