use std::path::Path;

use dealwise_core::{optimize_bom, BomContext, BomLine};

use super::{load_json, to_value, CommandResult};

pub fn run(lines_path: &Path, context_path: Option<&Path>) -> CommandResult {
    let lines: Vec<BomLine> = match load_json(lines_path) {
        Ok(lines) => lines,
        Err(error) => return CommandResult::failure("bom", "input", format!("{error:#}"), 2),
    };
    let context: BomContext = match context_path {
        Some(path) => match load_json(path) {
            Ok(context) => context,
            Err(error) => return CommandResult::failure("bom", "input", format!("{error:#}"), 2),
        },
        None => BomContext::default(),
    };

    let allocation = optimize_bom(&lines, &context);
    CommandResult::success(
        "bom",
        format!(
            "blended margin {:.1}% across {} lines (health {})",
            allocation.totals.blended_margin_pct.value(),
            allocation.lines.len(),
            allocation.health_score
        ),
        to_value(&allocation),
    )
}
