use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Population mean and standard deviation per continuous feature.
/// Computed by the training pipeline, consumed verbatim at inference so
/// both sides normalize identically. A constant feature carries std 1.0
/// (never 0).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormStats {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl NormStats {
    /// Neutral stats: mean 0, std 1 for `count` features. Normalization
    /// with these is the identity, which is what the rule-based path uses
    /// before any model exists.
    pub fn identity(count: usize) -> Self {
        Self { mean: vec![0.0; count], std: vec![1.0; count] }
    }
}

/// Predicted-vs-actual agreement for one of ten equal-width bins.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBin {
    pub lower: f64,
    pub upper: f64,
    pub mean_predicted: f64,
    pub mean_actual: f64,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub auc: f64,
    pub log_loss: f64,
    pub accuracy: f64,
    pub calibration: Vec<CalibrationBin>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub weight: f64,
}

/// The trained artifact. Created wholesale by a training run, read many
/// times between trainings; the persistence boundary swaps it atomically.
/// JSON round-trips must reproduce bit-identical predictions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelPackage {
    pub version: String,
    pub trained_at: DateTime<Utc>,
    pub weights: Vec<f64>,
    pub bias: f64,
    pub feature_count: usize,
    pub norm_stats: NormStats,
    pub metrics: EvaluationMetrics,
    /// Ranked by absolute weight, descending.
    pub feature_importance: Vec<FeatureImportance>,
    /// Real (non-synthetic) deals the model was trained on.
    pub training_deals: usize,
    /// sha256 over the canonical training input.
    pub input_checksum: String,
}

#[cfg(test)]
mod tests {
    use super::NormStats;

    #[test]
    fn identity_stats_are_neutral() {
        let stats = NormStats::identity(8);
        assert_eq!(stats.mean, vec![0.0; 8]);
        assert_eq!(stats.std, vec![1.0; 8]);
    }
}
