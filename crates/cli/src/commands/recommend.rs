use std::path::Path;

use dealwise_core::config::EngineConfig;
use dealwise_core::external::ModelService;
use dealwise_core::{
    compute_recommendation, DealContext, DealInput, HistoricalDeal, RecommendOptions,
};

use super::{load_json, to_value, CommandResult};

pub fn run(config: &EngineConfig, deal_path: &Path, history_path: Option<&Path>) -> CommandResult {
    let input: DealInput = match load_json(deal_path) {
        Ok(input) => input,
        Err(error) => return CommandResult::failure("recommend", "input", format!("{error:#}"), 2),
    };
    let history: Vec<HistoricalDeal> = match history_path {
        Some(path) => match load_json(path) {
            Ok(history) => history,
            Err(error) => {
                return CommandResult::failure("recommend", "input", format!("{error:#}"), 2)
            }
        },
        None => Vec::new(),
    };

    let model_service = match config.model_service_client() {
        Ok(client) => client,
        Err(error) => {
            return CommandResult::failure("recommend", "configuration", error.to_string(), 2)
        }
    };

    let deal = DealContext::from_input(input);
    let options = RecommendOptions {
        model_service: model_service.as_ref().map(|client| client as &dyn ModelService),
        ..RecommendOptions::new()
    };
    let recommendation = compute_recommendation(&deal, &history, &options);

    CommandResult::success(
        "recommend",
        format!(
            "suggested margin {:.1}% at {:.0}% win probability",
            recommendation.suggested_margin_pct.value(),
            recommendation.win_probability * 100.0
        ),
        to_value(&recommendation),
    )
}
