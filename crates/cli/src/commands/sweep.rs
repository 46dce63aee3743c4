use std::path::Path;

use dealwise_core::{recommend_margin, DealContext, DealInput, ModelPackage};

use super::{load_json, to_value, CommandResult};

pub fn run(deal_path: &Path, model_path: &Path) -> CommandResult {
    let input: DealInput = match load_json(deal_path) {
        Ok(input) => input,
        Err(error) => return CommandResult::failure("sweep", "input", format!("{error:#}"), 2),
    };
    let package: ModelPackage = match load_json(model_path) {
        Ok(package) => package,
        Err(error) => return CommandResult::failure("sweep", "input", format!("{error:#}"), 2),
    };

    let deal = DealContext::from_input(input);
    let result = match recommend_margin(&deal, &package) {
        Ok(result) => result,
        Err(error) => return CommandResult::failure("sweep", "inference", error.to_string(), 1),
    };

    let data = serde_json::json!({
        "optimal": {
            "margin_pct": result.optimal.margin_pct.value(),
            "price": to_value(&result.optimal.price),
            "win_probability": result.optimal.win_probability,
            "expected_gross_profit": result.optimal.expected_gross_profit,
        },
        "conservative": {
            "margin_pct": result.conservative.margin_pct.value(),
            "win_probability": result.conservative.win_probability,
        },
        "aggressive": {
            "margin_pct": result.aggressive.margin_pct.value(),
            "win_probability": result.aggressive.win_probability,
        },
        "confidence": result.confidence,
        "key_drivers": result.key_drivers,
    });

    CommandResult::success(
        "sweep",
        format!(
            "optimal margin {:.1}% (win probability {:.0}%)",
            result.optimal.margin_pct.value(),
            result.optimal.win_probability * 100.0
        ),
        data,
    )
}
