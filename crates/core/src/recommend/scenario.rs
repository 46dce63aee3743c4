//! Planned-vs-recommended scenario comparison.

use rust_decimal::Decimal;

use crate::domain::deal::DealContext;
use crate::domain::margin::{FractionMargin, PercentMargin};
use crate::domain::model::ModelPackage;
use crate::domain::recommendation::price_at_margin;
use crate::errors::ApplicationError;
use crate::ml::features::{featurize, FeatureInput};
use crate::ml::model_from_package;
use crate::recommend::rules::rule_based_recommendation;
use crate::recommend::sweep::recommend_margin;
use crate::recommend::winprob::win_probability_fraction;

#[derive(Clone, Debug, PartialEq)]
pub struct ScenarioPoint {
    pub margin_pct: PercentMargin,
    pub price: Decimal,
    pub win_probability: f64,
    pub expected_gross_profit: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScenarioComparison {
    pub planned: ScenarioPoint,
    pub recommended: ScenarioPoint,
    /// Recommended minus planned expected gross profit.
    pub gross_profit_delta: f64,
    /// Recommended minus planned win probability.
    pub win_probability_delta: f64,
}

fn scenario_point(
    deal: &DealContext,
    margin: FractionMargin,
    model: Option<&ModelPackage>,
) -> Result<ScenarioPoint, ApplicationError> {
    let win_probability = match model {
        Some(package) => {
            let vector = featurize(
                &FeatureInput { deal, margin: Some(margin) },
                &package.norm_stats,
            );
            model_from_package(package).predict(&vector)?
        }
        None => win_probability_fraction(deal, margin),
    };

    let cost = deal.oem_cost_f64();
    let gross_profit = cost * margin.value() / (1.0 - margin.value()).max(0.01);
    Ok(ScenarioPoint {
        margin_pct: margin.as_percent(),
        price: price_at_margin(deal.oem_cost, margin),
        win_probability,
        expected_gross_profit: gross_profit * win_probability,
    })
}

/// Diff the seller's planned margin against what the engine would
/// recommend, using the trained model when one is available.
pub fn compare_scenarios(
    deal: &DealContext,
    planned_margin: PercentMargin,
    model: Option<&ModelPackage>,
) -> Result<ScenarioComparison, ApplicationError> {
    let planned = scenario_point(deal, planned_margin.as_fraction(), model)?;

    let recommended = match model {
        Some(package) => {
            let inference = recommend_margin(deal, package)?;
            ScenarioPoint {
                margin_pct: inference.optimal.margin_pct,
                price: inference.optimal.price,
                win_probability: inference.optimal.win_probability,
                expected_gross_profit: inference.optimal.expected_gross_profit,
            }
        }
        None => {
            let recommendation = rule_based_recommendation(deal, None);
            scenario_point(deal, recommendation.suggested_margin_pct.as_fraction(), None)?
        }
    };

    Ok(ScenarioComparison {
        gross_profit_delta: recommended.expected_gross_profit - planned.expected_gross_profit,
        win_probability_delta: recommended.win_probability - planned.win_probability,
        planned,
        recommended,
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::compare_scenarios;
    use crate::domain::deal::{DealContext, DealInput};
    use crate::domain::margin::PercentMargin;

    fn deal() -> DealContext {
        DealContext::from_input(DealInput {
            oem_cost: Decimal::new(80_000_00, 2),
            ..DealInput::default()
        })
    }

    #[test]
    fn deltas_are_recommended_minus_planned() {
        let comparison =
            compare_scenarios(&deal(), PercentMargin(35.0), None).expect("compare");

        let expected_gp_delta = comparison.recommended.expected_gross_profit
            - comparison.planned.expected_gross_profit;
        assert!((comparison.gross_profit_delta - expected_gp_delta).abs() < 1e-9);

        // A 35% plan sits far above the rule recommendation, so the
        // recommended scenario wins more often.
        assert!(comparison.win_probability_delta > 0.0);
    }

    #[test]
    fn planned_point_reflects_the_planned_margin() {
        let comparison =
            compare_scenarios(&deal(), PercentMargin(12.0), None).expect("compare");
        assert_eq!(comparison.planned.margin_pct, PercentMargin(12.0));
        assert!(comparison.planned.price > Decimal::ZERO);
    }
}
