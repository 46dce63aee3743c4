use std::path::Path;

use dealwise_core::{
    ApplicationError, CustomerId, DealSource, HistoricalDeal, TrainingOutcome, TrainingPipeline,
};

use super::{load_json, to_value, CommandResult};

struct FileDealSource(Vec<HistoricalDeal>);

impl DealSource for FileDealSource {
    fn closed_deals(&self, _customer: &CustomerId) -> Result<Vec<HistoricalDeal>, ApplicationError> {
        Ok(self.0.clone())
    }
}

pub fn run(history_path: &Path, customer: &str, output_path: Option<&Path>) -> CommandResult {
    let history: Vec<HistoricalDeal> = match load_json(history_path) {
        Ok(history) => history,
        Err(error) => return CommandResult::failure("train", "input", format!("{error:#}"), 2),
    };

    let pipeline = TrainingPipeline::new(FileDealSource(history));
    let outcome = match pipeline.train_customer_model(&CustomerId(customer.to_string())) {
        Ok(outcome) => outcome,
        Err(error) => return CommandResult::failure("train", "training", error.to_string(), 1),
    };

    match outcome {
        TrainingOutcome::InsufficientData(shortfall) => CommandResult::success(
            "train",
            format!(
                "insufficient data: {} closed deals ({} won / {} lost), {} more needed",
                shortfall.total,
                shortfall.won,
                shortfall.lost,
                shortfall.missing()
            ),
            to_value(&shortfall),
        ),
        TrainingOutcome::Trained(report) => {
            if let Some(path) = output_path {
                let serialized = match serde_json::to_string_pretty(&report.package) {
                    Ok(serialized) => serialized,
                    Err(error) => {
                        return CommandResult::failure("train", "serialization", error.to_string(), 1)
                    }
                };
                if let Err(error) = std::fs::write(path, serialized) {
                    return CommandResult::failure(
                        "train",
                        "io",
                        format!("could not write `{}`: {error}", path.display()),
                        1,
                    );
                }
            }

            let summary = serde_json::json!({
                "version": report.package.version,
                "auc": report.package.metrics.auc,
                "log_loss": report.package.metrics.log_loss,
                "accuracy": report.package.metrics.accuracy,
                "real_deals": report.real_deals,
                "synthetic_samples": report.synthetic_samples,
                "epochs_run": report.epochs_run,
                "phase_promotion_eligible": report.phase_promotion_eligible,
                "input_checksum": report.package.input_checksum,
            });
            CommandResult::success(
                "train",
                format!(
                    "trained on {} deals (AUC {:.3})",
                    report.real_deals, report.package.metrics.auc
                ),
                summary,
            )
        }
    }
}
