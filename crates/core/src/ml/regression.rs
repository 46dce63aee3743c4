//! From-scratch logistic regression.
//!
//! Mini-batch gradient descent with L2 regularization, a seeded shuffle for
//! reproducible runs, a validation holdout, and early stopping that
//! restores the best-validation-loss weights. All predictions are
//! deterministic; a serialized model deserializes to bit-identical output.

use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::model::{CalibrationBin, EvaluationMetrics, FeatureImportance};

/// Logits beyond this magnitude saturate the sigmoid anyway.
const LOGIT_CLAMP: f64 = 500.0;
/// Probability clip applied before any `ln` call.
const PROB_EPSILON: f64 = 1e-15;
const CALIBRATION_BINS: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainOptions {
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub l2: f64,
    pub validation_fraction: f64,
    /// Non-improving validation epochs tolerated before stopping.
    pub patience: usize,
    pub seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            epochs: 300,
            batch_size: 32,
            l2: 0.01,
            validation_fraction: 0.2,
            patience: 10,
            seed: 42,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum RegressionError {
    #[error("cannot train on an empty sample set")]
    EmptyTrainingSet,
    #[error("label count {labels} does not match sample count {samples}")]
    SampleCountMismatch { labels: usize, samples: usize },
    #[error("sample weight count {weights} does not match sample count {samples}")]
    WeightCountMismatch { weights: usize, samples: usize },
    #[error("feature vector has {actual} elements but the model expects {expected}")]
    FeatureLengthMismatch { expected: usize, actual: usize },
}

/// Trained coefficients. Flat and serializable; everything needed to
/// reproduce a prediction lives here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub weights: Vec<f64>,
    pub bias: f64,
    pub feature_count: usize,
}

impl LogisticModel {
    pub fn predict(&self, x: &[f64]) -> Result<f64, RegressionError> {
        if x.len() != self.feature_count {
            return Err(RegressionError::FeatureLengthMismatch {
                expected: self.feature_count,
                actual: x.len(),
            });
        }
        let logit: f64 =
            self.weights.iter().zip(x.iter()).map(|(w, xi)| w * xi).sum::<f64>() + self.bias;
        Ok(sigmoid(logit))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrainedModel {
    pub model: LogisticModel,
    pub best_validation_loss: f64,
    pub epochs_run: usize,
}

fn sigmoid(logit: f64) -> f64 {
    let logit = logit.clamp(-LOGIT_CLAMP, LOGIT_CLAMP);
    1.0 / (1.0 + (-logit).exp())
}

fn validate_shapes(
    x: &[Vec<f64>],
    y: &[f64],
    sample_weights: Option<&[f64]>,
) -> Result<usize, RegressionError> {
    if x.is_empty() {
        return Err(RegressionError::EmptyTrainingSet);
    }
    if x.len() != y.len() {
        return Err(RegressionError::SampleCountMismatch { labels: y.len(), samples: x.len() });
    }
    if let Some(weights) = sample_weights {
        if weights.len() != x.len() {
            return Err(RegressionError::WeightCountMismatch {
                weights: weights.len(),
                samples: x.len(),
            });
        }
    }
    let feature_count = x[0].len();
    for row in x {
        if row.len() != feature_count {
            return Err(RegressionError::FeatureLengthMismatch {
                expected: feature_count,
                actual: row.len(),
            });
        }
    }
    Ok(feature_count)
}

/// Train a classifier over pre-featurized rows. `sample_weights` scales
/// each sample's gradient and loss contribution (the training pipeline
/// uses this to down-weight synthetic counterfactuals).
pub fn train(
    x: &[Vec<f64>],
    y: &[f64],
    sample_weights: Option<&[f64]>,
    options: &TrainOptions,
) -> Result<TrainedModel, RegressionError> {
    let feature_count = validate_shapes(x, y, sample_weights)?;
    let weight_of = |index: usize| sample_weights.map_or(1.0, |weights| weights[index]);

    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut indices: Vec<usize> = (0..x.len()).collect();
    indices.shuffle(&mut rng);

    let holdout = ((x.len() as f64) * options.validation_fraction).floor() as usize;
    let holdout = holdout.min(x.len().saturating_sub(1));
    let (validation_indices, train_indices) = indices.split_at(holdout);
    // Tiny sets get no holdout; early stopping then tracks training loss.
    let validation_indices: Vec<usize> = if validation_indices.is_empty() {
        train_indices.to_vec()
    } else {
        validation_indices.to_vec()
    };
    let mut train_indices = train_indices.to_vec();

    let mut weights = vec![0.0; feature_count];
    let mut bias = 0.0;
    let mut best_weights = weights.clone();
    let mut best_bias = bias;
    let mut best_loss = f64::INFINITY;
    let mut stale_epochs = 0;
    let mut epochs_run = 0;

    let batch_size = options.batch_size.max(1);

    for _ in 0..options.epochs {
        epochs_run += 1;
        train_indices.shuffle(&mut rng);

        for batch in train_indices.chunks(batch_size) {
            let mut grad_w = vec![0.0; feature_count];
            let mut grad_b = 0.0;

            for &index in batch {
                let logit: f64 = weights
                    .iter()
                    .zip(x[index].iter())
                    .map(|(w, xi)| w * xi)
                    .sum::<f64>()
                    + bias;
                let error = (sigmoid(logit) - y[index]) * weight_of(index);
                for (gradient, xi) in grad_w.iter_mut().zip(x[index].iter()) {
                    *gradient += error * xi;
                }
                grad_b += error;
            }

            let batch_len = batch.len() as f64;
            for (gradient, weight) in grad_w.iter_mut().zip(weights.iter()) {
                *gradient = *gradient / batch_len + options.l2 * weight;
            }
            grad_b /= batch_len;

            for (weight, gradient) in weights.iter_mut().zip(grad_w.iter()) {
                *weight -= options.learning_rate * gradient;
            }
            bias -= options.learning_rate * grad_b;
        }

        let validation_loss = weighted_log_loss(
            &weights,
            bias,
            x,
            y,
            &validation_indices,
            &weight_of,
        );
        if validation_loss < best_loss {
            best_loss = validation_loss;
            best_weights.copy_from_slice(&weights);
            best_bias = bias;
            stale_epochs = 0;
        } else {
            stale_epochs += 1;
            if stale_epochs >= options.patience {
                break;
            }
        }
    }

    Ok(TrainedModel {
        model: LogisticModel { weights: best_weights, bias: best_bias, feature_count },
        best_validation_loss: best_loss,
        epochs_run,
    })
}

fn weighted_log_loss(
    weights: &[f64],
    bias: f64,
    x: &[Vec<f64>],
    y: &[f64],
    indices: &[usize],
    weight_of: &impl Fn(usize) -> f64,
) -> f64 {
    let mut loss = 0.0;
    let mut total_weight = 0.0;
    for &index in indices {
        let logit: f64 =
            weights.iter().zip(x[index].iter()).map(|(w, xi)| w * xi).sum::<f64>() + bias;
        let predicted = sigmoid(logit).clamp(PROB_EPSILON, 1.0 - PROB_EPSILON);
        let sample_weight = weight_of(index);
        loss -= sample_weight
            * (y[index] * predicted.ln() + (1.0 - y[index]) * (1.0 - predicted).ln());
        total_weight += sample_weight;
    }
    if total_weight > 0.0 {
        loss / total_weight
    } else {
        0.0
    }
}

/// Evaluate a model against labeled rows: log-loss, 0.5-threshold
/// accuracy, rank-based AUC, and ten equal-width calibration bins.
pub fn evaluate(
    model: &LogisticModel,
    x: &[Vec<f64>],
    y: &[f64],
) -> Result<EvaluationMetrics, RegressionError> {
    validate_shapes(x, y, None)?;

    let mut predictions = Vec::with_capacity(x.len());
    for row in x {
        predictions.push(model.predict(row)?);
    }

    let count = predictions.len() as f64;
    let log_loss = predictions
        .iter()
        .zip(y.iter())
        .map(|(&predicted, &label)| {
            let predicted = predicted.clamp(PROB_EPSILON, 1.0 - PROB_EPSILON);
            -(label * predicted.ln() + (1.0 - label) * (1.0 - predicted).ln())
        })
        .sum::<f64>()
        / count;

    let correct = predictions
        .iter()
        .zip(y.iter())
        .filter(|(&predicted, &label)| (predicted >= 0.5) == (label >= 0.5))
        .count();
    let accuracy = correct as f64 / count;

    Ok(EvaluationMetrics {
        auc: auc(&predictions, y),
        log_loss,
        accuracy,
        calibration: calibration_bins(&predictions, y),
    })
}

/// Area under the ROC curve via trapezoidal integration over the ranked
/// predictions. Equal scores advance as one group so ties are handled
/// exactly. Degenerate label sets (no positives or no negatives) score
/// 0.5.
pub fn auc(predictions: &[f64], labels: &[f64]) -> f64 {
    let positives = labels.iter().filter(|&&label| label >= 0.5).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return 0.5;
    }

    let mut order: Vec<usize> = (0..predictions.len()).collect();
    order.sort_by(|&a, &b| {
        predictions[b].partial_cmp(&predictions[a]).unwrap_or(Ordering::Equal)
    });

    let mut area = 0.0;
    let mut true_positives = 0usize;
    let mut false_positives = 0usize;
    let mut prev_tpr = 0.0;
    let mut prev_fpr = 0.0;

    let mut cursor = 0;
    while cursor < order.len() {
        let score = predictions[order[cursor]];
        while cursor < order.len() && predictions[order[cursor]] == score {
            if labels[order[cursor]] >= 0.5 {
                true_positives += 1;
            } else {
                false_positives += 1;
            }
            cursor += 1;
        }

        let tpr = true_positives as f64 / positives as f64;
        let fpr = false_positives as f64 / negatives as f64;
        area += (fpr - prev_fpr) * (tpr + prev_tpr) / 2.0;
        prev_tpr = tpr;
        prev_fpr = fpr;
    }

    area
}

fn calibration_bins(predictions: &[f64], labels: &[f64]) -> Vec<CalibrationBin> {
    let width = 1.0 / CALIBRATION_BINS as f64;
    let mut bins: Vec<CalibrationBin> = (0..CALIBRATION_BINS)
        .map(|index| CalibrationBin {
            lower: index as f64 * width,
            upper: (index + 1) as f64 * width,
            mean_predicted: 0.0,
            mean_actual: 0.0,
            count: 0,
        })
        .collect();

    for (&predicted, &label) in predictions.iter().zip(labels.iter()) {
        let index = ((predicted / width) as usize).min(CALIBRATION_BINS - 1);
        let bin = &mut bins[index];
        bin.mean_predicted += predicted;
        bin.mean_actual += label;
        bin.count += 1;
    }

    for bin in &mut bins {
        if bin.count > 0 {
            bin.mean_predicted /= bin.count as f64;
            bin.mean_actual /= bin.count as f64;
        }
    }

    bins
}

/// Features ranked by absolute weight, descending.
pub fn feature_importance(model: &LogisticModel, names: &[&str]) -> Vec<FeatureImportance> {
    let mut ranking: Vec<FeatureImportance> = model
        .weights
        .iter()
        .enumerate()
        .map(|(index, &weight)| FeatureImportance {
            feature: names.get(index).copied().unwrap_or("unknown").to_owned(),
            weight,
        })
        .collect();
    ranking.sort_by(|a, b| {
        b.weight.abs().partial_cmp(&a.weight.abs()).unwrap_or(Ordering::Equal)
    });
    ranking
}
