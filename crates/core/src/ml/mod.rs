//! Model training and inference internals: feature engineering, the
//! from-scratch logistic regression engine, and the customer training
//! pipeline.

pub mod features;
pub mod regression;
pub mod training;

use crate::domain::model::ModelPackage;
use regression::LogisticModel;

/// Rehydrate the predictor stored inside a package. The package is the
/// persisted artifact; this is the only way weights leave it.
pub fn model_from_package(package: &ModelPackage) -> LogisticModel {
    LogisticModel {
        weights: package.weights.clone(),
        bias: package.bias,
        feature_count: package.feature_count,
    }
}
