//! Request-time recommendation orchestration.

pub mod neighbors;
pub mod rules;
pub mod scenario;
pub mod sweep;
pub mod winprob;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::domain::deal::{DealContext, HistoricalDeal};
use crate::domain::recommendation::{RecommendationMethod, RecommendationResult};
use crate::external::ModelService;
use neighbors::{top_k_neighbors, DEFAULT_NEIGHBOR_K};
use rules::rule_based_recommendation;

pub struct RecommendOptions<'a> {
    /// Remote scoring model, when one is configured. Any failure falls
    /// back to the deterministic path; the fallback is mandatory.
    pub model_service: Option<&'a dyn ModelService>,
    pub neighbor_k: usize,
    /// Reference instant for time-decay weighting.
    pub as_of: DateTime<Utc>,
}

impl RecommendOptions<'_> {
    pub fn new() -> Self {
        Self { model_service: None, neighbor_k: DEFAULT_NEIGHBOR_K, as_of: Utc::now() }
    }
}

impl Default for RecommendOptions<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Produce a recommendation for one deal. Attempts the external model
/// first when configured; otherwise (and on any external failure) blends
/// the rule scorer with nearest-neighbor evidence from the supplied
/// history.
pub fn compute_recommendation(
    deal: &DealContext,
    history: &[HistoricalDeal],
    options: &RecommendOptions<'_>,
) -> RecommendationResult {
    if let Some(service) = options.model_service {
        match service.score_deal(deal) {
            Ok(mut result) => {
                result.method = RecommendationMethod::ExternalModel;
                return result;
            }
            Err(error) => {
                warn!(%error, "external model service failed; falling back to rule scorer");
            }
        }
    }

    let neighbor_summary = if history.is_empty() {
        None
    } else {
        Some(top_k_neighbors(deal, history, options.neighbor_k, options.as_of))
    };

    rule_based_recommendation(deal, neighbor_summary.as_ref())
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{compute_recommendation, RecommendOptions};
    use crate::domain::deal::{DealContext, DealInput};
    use crate::domain::margin::{FractionMargin, PercentMargin};
    use crate::domain::recommendation::{
        RecommendationMethod, RecommendationResult,
    };
    use crate::errors::ApplicationError;
    use crate::external::ModelService;

    fn deal() -> DealContext {
        DealContext::from_input(DealInput {
            oem_cost: Decimal::new(25_000_00, 2),
            ..DealInput::default()
        })
    }

    struct FailingService;

    impl ModelService for FailingService {
        fn score_deal(
            &self,
            _deal: &DealContext,
        ) -> Result<RecommendationResult, ApplicationError> {
            Err(ApplicationError::ExternalService("connection timed out".to_owned()))
        }
    }

    struct CannedService;

    impl ModelService for CannedService {
        fn score_deal(
            &self,
            deal: &DealContext,
        ) -> Result<RecommendationResult, ApplicationError> {
            Ok(RecommendationResult {
                suggested_margin_pct: PercentMargin(21.5),
                suggested_price: deal.oem_cost,
                win_probability: 0.61,
                drivers: Vec::new(),
                policy_floor: FractionMargin(0.03),
                confidence: 0.9,
                method: RecommendationMethod::RuleBased,
            })
        }
    }

    #[test]
    fn external_failure_falls_back_to_rules() {
        let service = FailingService;
        let options = RecommendOptions {
            model_service: Some(&service),
            ..RecommendOptions::new()
        };

        let result = compute_recommendation(&deal(), &[], &options);
        assert_eq!(result.method, RecommendationMethod::RuleBased);
    }

    #[test]
    fn external_success_is_labelled_as_external() {
        let service = CannedService;
        let options = RecommendOptions {
            model_service: Some(&service),
            ..RecommendOptions::new()
        };

        let result = compute_recommendation(&deal(), &[], &options);
        assert_eq!(result.method, RecommendationMethod::ExternalModel);
        assert_eq!(result.suggested_margin_pct, PercentMargin(21.5));
    }

    #[test]
    fn no_history_means_rules_only() {
        let result = compute_recommendation(&deal(), &[], &RecommendOptions::new());
        assert_eq!(result.method, RecommendationMethod::RuleBased);
        assert_eq!(result.confidence, 0.4);
    }
}
