//! Model-backed margin sweep.
//!
//! With a trained package in hand, inference walks candidate margins from
//! 5% to 35% in half-point steps, scores each through the regression
//! model, and reports the expected-gross-profit-maximizing choice plus
//! conservative and aggressive operating points.

use rust_decimal::Decimal;

use crate::domain::deal::DealContext;
use crate::domain::margin::{FractionMargin, PercentMargin};
use crate::domain::model::ModelPackage;
use crate::domain::recommendation::price_at_margin;
use crate::errors::ApplicationError;
use crate::ml::features::{featurize, FeatureInput, FEATURE_NAMES};
use crate::ml::model_from_package;

pub const SWEEP_START_PCT: f64 = 5.0;
pub const SWEEP_END_PCT: f64 = 35.0;
pub const SWEEP_STEP_PCT: f64 = 0.5;

const CONSERVATIVE_MIN_WIN: f64 = 0.70;
const AGGRESSIVE_MIN_WIN: f64 = 0.45;
const KEY_DRIVER_COUNT: usize = 5;

#[derive(Clone, Debug, PartialEq)]
pub struct OperatingPoint {
    pub margin_pct: PercentMargin,
    pub price: Decimal,
    pub win_probability: f64,
    pub expected_gross_profit: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InferenceResult {
    /// Global expected-GP maximum.
    pub optimal: OperatingPoint,
    /// Highest margin that still clears a 70% win chance.
    pub conservative: OperatingPoint,
    /// Highest margin that still clears a 45% win chance.
    pub aggressive: OperatingPoint,
    pub confidence: f64,
    pub key_drivers: Vec<String>,
}

/// Score every candidate margin in the sweep range.
pub fn sweep(
    deal: &DealContext,
    package: &ModelPackage,
) -> Result<Vec<OperatingPoint>, ApplicationError> {
    let model = model_from_package(package);
    let cost = deal.oem_cost_f64();
    let steps = ((SWEEP_END_PCT - SWEEP_START_PCT) / SWEEP_STEP_PCT).round() as usize;

    let mut points = Vec::with_capacity(steps + 1);
    for step in 0..=steps {
        let margin_pct = SWEEP_START_PCT + step as f64 * SWEEP_STEP_PCT;
        let margin = PercentMargin(margin_pct).as_fraction();

        let vector = featurize(
            &FeatureInput { deal, margin: Some(margin) },
            &package.norm_stats,
        );
        let win_probability = model.predict(&vector)?;

        let gross_profit = cost * margin.value() / (1.0 - margin.value());
        points.push(OperatingPoint {
            margin_pct: PercentMargin(margin_pct),
            price: price_at_margin(deal.oem_cost, margin),
            win_probability,
            expected_gross_profit: gross_profit * win_probability,
        });
    }

    Ok(points)
}

/// Choose optimal, conservative, and aggressive margins for a deal using a
/// trained model package.
pub fn recommend_margin(
    deal: &DealContext,
    package: &ModelPackage,
) -> Result<InferenceResult, ApplicationError> {
    let points = sweep(deal, package)?;

    let optimal = points
        .iter()
        .max_by(|a, b| {
            a.expected_gross_profit
                .partial_cmp(&b.expected_gross_profit)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .cloned()
        .ok_or_else(|| {
            ApplicationError::Configuration("margin sweep produced no candidates".to_owned())
        })?;

    // Highest qualifying margin, since points ascend through the range.
    let conservative = points
        .iter()
        .rev()
        .find(|point| point.win_probability >= CONSERVATIVE_MIN_WIN)
        .cloned()
        .unwrap_or_else(|| {
            points
                .iter()
                .max_by(|a, b| {
                    a.win_probability
                        .partial_cmp(&b.win_probability)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .cloned()
                .unwrap_or_else(|| optimal.clone())
        });

    let aggressive = points
        .iter()
        .rev()
        .find(|point| point.win_probability >= AGGRESSIVE_MIN_WIN)
        .cloned()
        .unwrap_or_else(|| optimal.clone());

    let data_factor = (package.training_deals as f64 / 500.0).min(1.0);
    let confidence = ((package.metrics.auc - 0.5) * 2.0 * data_factor).clamp(0.1, 0.95);

    let key_drivers = key_driver_sentences(deal, package, optimal.margin_pct.as_fraction());

    Ok(InferenceResult { optimal, conservative, aggressive, confidence, key_drivers })
}

/// Plain-language read on the strongest features, using each feature's
/// actual normalized value times its weight as the signed contribution.
fn key_driver_sentences(
    deal: &DealContext,
    package: &ModelPackage,
    margin: FractionMargin,
) -> Vec<String> {
    let vector = featurize(&FeatureInput { deal, margin: Some(margin) }, &package.norm_stats);

    package
        .feature_importance
        .iter()
        .take(KEY_DRIVER_COUNT)
        .map(|importance| {
            let index = FEATURE_NAMES
                .iter()
                .position(|name| *name == importance.feature)
                .unwrap_or(0);
            let contribution = vector.get(index).copied().unwrap_or(0.0) * importance.weight;
            let direction = if contribution >= 0.0 { "raises" } else { "lowers" };
            format!(
                "{} {} the win odds ({:+.3})",
                feature_label(&importance.feature),
                direction,
                contribution
            )
        })
        .collect()
}

fn feature_label(feature: &str) -> &'static str {
    match feature {
        "log_oem_cost" => "Deal size",
        "proposed_margin" => "The proposed margin",
        "price_sensitivity" => "Buyer price sensitivity",
        "loyalty" => "Customer loyalty",
        "urgency" => "Buyer urgency",
        "differentiation" => "Solution differentiation",
        "competitor_count" => "Competitor count",
        "bom_line_count" => "Bill-of-materials size",
        "new_logo" => "New-logo status",
        "services_attached" => "Attached services",
        "quarter_end" => "Quarter-end timing",
        "displacement" => "Displacing an incumbent",
        "category_hardware" => "Hardware-led mix",
        "category_software" => "Software-led mix",
        "category_cloud" => "Cloud-led mix",
        "category_services" => "Services-led mix",
        "segment_smb" => "SMB segment",
        "segment_mid_market" => "Mid-market segment",
        "relationship_new" => "A brand-new relationship",
        "relationship_developing" => "A developing relationship",
        "relationship_established" => "An established relationship",
        "registration_not_registered" => "No deal registration",
        "registration_registered" => "Standard deal registration",
        "value_add_none" => "No value-add",
        "value_add_basic" => "Basic value-add",
        "value_add_moderate" => "Moderate value-add",
        "complexity_commodity" => "Commodity scope",
        "complexity_standard" => "Standard scope",
        "complexity_complex" => "Complex scope",
        _ => "This attribute",
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{recommend_margin, sweep, SWEEP_END_PCT, SWEEP_START_PCT};
    use crate::domain::deal::{DealContext, DealInput};
    use crate::domain::model::{
        CalibrationBin, EvaluationMetrics, ModelPackage, NormStats,
    };
    use crate::errors::ApplicationError;
    use crate::ml::features::{FEATURE_COUNT, FEATURE_NAMES};
    use crate::ml::regression::{feature_importance, LogisticModel};

    fn deal() -> DealContext {
        DealContext::from_input(DealInput {
            oem_cost: Decimal::new(100_000_00, 2),
            ..DealInput::default()
        })
    }

    /// A package whose only real signal is "higher margin loses": strongly
    /// negative weight on the proposed-margin feature.
    fn margin_averse_package(auc: f64, training_deals: usize) -> ModelPackage {
        let mut weights = vec![0.0; FEATURE_COUNT];
        weights[1] = -14.0;
        let model =
            LogisticModel { weights: weights.clone(), bias: 2.4, feature_count: FEATURE_COUNT };

        ModelPackage {
            version: "test-package".to_owned(),
            trained_at: Utc::now(),
            weights,
            bias: 2.4,
            feature_count: FEATURE_COUNT,
            norm_stats: NormStats::identity(8),
            metrics: EvaluationMetrics {
                auc,
                log_loss: 0.4,
                accuracy: 0.8,
                calibration: vec![
                    CalibrationBin {
                        lower: 0.0,
                        upper: 1.0,
                        mean_predicted: 0.5,
                        mean_actual: 0.5,
                        count: 10
                    };
                    10
                ],
            },
            feature_importance: feature_importance(&model, &FEATURE_NAMES),
            training_deals,
            input_checksum: "0".repeat(64),
        }
    }

    #[test]
    fn sweep_covers_sixty_one_points() {
        let points = sweep(&deal(), &margin_averse_package(0.8, 300)).expect("sweep");
        assert_eq!(points.len(), 61);
        assert_eq!(points[0].margin_pct.value(), SWEEP_START_PCT);
        assert_eq!(points.last().expect("non-empty").margin_pct.value(), SWEEP_END_PCT);
    }

    #[test]
    fn win_probability_falls_as_margin_rises() {
        let points = sweep(&deal(), &margin_averse_package(0.8, 300)).expect("sweep");
        for pair in points.windows(2) {
            assert!(pair[1].win_probability <= pair[0].win_probability);
        }
    }

    #[test]
    fn operating_points_are_ordered_by_risk_appetite() {
        let result = recommend_margin(&deal(), &margin_averse_package(0.8, 300)).expect("infer");

        // With monotonically falling win odds, the aggressive point can
        // push at least as high a margin as the conservative one.
        assert!(result.aggressive.margin_pct.value() >= result.conservative.margin_pct.value());
        assert!(result.conservative.win_probability >= result.aggressive.win_probability);
        assert!(result.optimal.expected_gross_profit >= result.conservative.expected_gross_profit);
    }

    #[test]
    fn confidence_scales_with_auc_and_data_volume() {
        let modest = recommend_margin(&deal(), &margin_averse_package(0.75, 250)).expect("infer");
        assert!((modest.confidence - 0.25).abs() < 1e-9);

        let strong = recommend_margin(&deal(), &margin_averse_package(0.9, 1_000)).expect("infer");
        assert!((strong.confidence - 0.8).abs() < 1e-9);

        let weak = recommend_margin(&deal(), &margin_averse_package(0.5, 50)).expect("infer");
        assert_eq!(weak.confidence, 0.1);
    }

    #[test]
    fn key_drivers_name_the_margin_feature() {
        let result = recommend_margin(&deal(), &margin_averse_package(0.8, 300)).expect("infer");
        assert_eq!(result.key_drivers.len(), 5);
        assert!(result.key_drivers[0].contains("proposed margin"));
    }

    #[test]
    fn mismatched_feature_count_is_a_descriptive_error() {
        let mut package = margin_averse_package(0.8, 300);
        package.feature_count = 12;
        package.weights.truncate(12);

        let error = recommend_margin(&deal(), &package).expect_err("must reject");
        assert!(matches!(error, ApplicationError::Domain(_)));
    }
}
