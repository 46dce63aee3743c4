use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::margin::{FractionMargin, PercentMargin};

/// One signed heuristic contribution to a recommendation, in margin
/// fraction. The ordered list doubles as the explanation surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub name: String,
    pub value: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationMethod {
    RuleBased,
    RuleBasedWithNeighbors,
    TrainedModel,
    ExternalModel,
}

/// The recommendation handed back across the API boundary. Constructed
/// once, never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub suggested_margin_pct: PercentMargin,
    pub suggested_price: Decimal,
    /// Estimated win chance at the suggested margin, 0-1.
    pub win_probability: f64,
    /// Top contributions by absolute value, at most six.
    pub drivers: Vec<Driver>,
    pub policy_floor: FractionMargin,
    pub confidence: f64,
    pub method: RecommendationMethod,
}

/// Sell price implied by a cost and a margin-on-price:
/// `price = cost / (1 - margin)`, rounded to cents.
pub fn price_at_margin(cost: Decimal, margin: FractionMargin) -> Decimal {
    let cost_f64: f64 = cost.try_into().unwrap_or(0.0);
    let denominator = (1.0 - margin.value()).max(0.01);
    Decimal::from_f64(cost_f64 / denominator).unwrap_or(Decimal::ZERO).round_dp(2)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::price_at_margin;
    use crate::domain::margin::FractionMargin;

    #[test]
    fn price_at_margin_uses_margin_on_price() {
        // 20% margin on price: 80 cost -> 100 price.
        let price = price_at_margin(Decimal::new(80_00, 2), FractionMargin(0.20));
        assert_eq!(price, Decimal::new(100_00, 2));
    }

    #[test]
    fn degenerate_margin_stays_finite() {
        let price = price_at_margin(Decimal::new(100_00, 2), FractionMargin(1.0));
        assert!(price > Decimal::ZERO);
    }
}
