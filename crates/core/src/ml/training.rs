//! Customer model training pipeline.
//!
//! Pulls a customer's closed deals from an injected [`DealSource`], gates
//! on minimum data volume, augments the set with synthetic counterfactuals,
//! trains the regression engine, and assembles a [`ModelPackage`]. The
//! package replaces the stored one wholesale; partial updates do not exist.
//!
//! Honest-metrics rule: normalization statistics come from the combined
//! real+synthetic set (the model sees both at train time), but every
//! reported evaluation metric is computed against real deals only.

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::benchmarks;
use crate::domain::deal::{CustomerId, DealOutcome, HistoricalDeal};
use crate::domain::margin::FractionMargin;
use crate::domain::model::ModelPackage;
use crate::errors::ApplicationError;
use crate::ml::features::{compute_norm_stats, featurize, FeatureInput, FEATURE_COUNT, FEATURE_NAMES};
use crate::ml::regression::{self, TrainOptions};

pub const MIN_TOTAL_DEALS: usize = 100;
pub const MIN_WON_DEALS: usize = 20;
pub const MIN_LOST_DEALS: usize = 20;

/// Synthetic samples count half a real deal in the weighted loss.
const SYNTHETIC_WEIGHT: f64 = 0.5;
/// Counterfactual margins never leave this band.
const SYNTHETIC_MARGIN_FLOOR: f64 = 0.01;
const SYNTHETIC_MARGIN_CEILING: f64 = 0.55;
/// Promotion to the model-backed recommendation phase.
const PROMOTION_MIN_AUC: f64 = 0.60;
const PROMOTION_MIN_DEALS: usize = 100;

/// Read access to a customer's closed deals. Persistence lives outside the
/// engine; tests and the CLI inject in-memory/file-backed sources.
pub trait DealSource {
    fn closed_deals(&self, customer: &CustomerId) -> Result<Vec<HistoricalDeal>, ApplicationError>;
}

/// Not-enough-data report. This is a normal outcome, not an error.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DataShortfall {
    pub total: usize,
    pub won: usize,
    pub lost: usize,
    pub required_total: usize,
    pub required_won: usize,
    pub required_lost: usize,
}

impl DataShortfall {
    /// Deals still missing against the strictest unmet requirement.
    pub fn missing(&self) -> usize {
        let total_gap = self.required_total.saturating_sub(self.total);
        let won_gap = self.required_won.saturating_sub(self.won);
        let lost_gap = self.required_lost.saturating_sub(self.lost);
        total_gap.max(won_gap).max(lost_gap)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrainingReport {
    pub package: ModelPackage,
    pub real_deals: usize,
    pub synthetic_samples: usize,
    pub epochs_run: usize,
    pub best_validation_loss: f64,
    /// AUC >= 0.60 with at least 100 real deals: the caller may move this
    /// customer to the model-backed recommendation phase.
    pub phase_promotion_eligible: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TrainingOutcome {
    Trained(Box<TrainingReport>),
    InsufficientData(DataShortfall),
}

struct Sample {
    deal_index: usize,
    margin: FractionMargin,
    label: f64,
    weight: f64,
    real: bool,
}

pub struct TrainingPipeline<S> {
    source: S,
    options: TrainOptions,
}

impl<S: DealSource> TrainingPipeline<S> {
    pub fn new(source: S) -> Self {
        Self { source, options: TrainOptions::default() }
    }

    pub fn with_options(source: S, options: TrainOptions) -> Self {
        Self { source, options }
    }

    pub fn train_customer_model(
        &self,
        customer: &CustomerId,
    ) -> Result<TrainingOutcome, ApplicationError> {
        let deals = self.source.closed_deals(customer)?;

        let won = deals.iter().filter(|deal| deal.is_won()).count();
        let lost = deals.len() - won;
        if deals.len() < MIN_TOTAL_DEALS || won < MIN_WON_DEALS || lost < MIN_LOST_DEALS {
            return Ok(TrainingOutcome::InsufficientData(DataShortfall {
                total: deals.len(),
                won,
                lost,
                required_total: MIN_TOTAL_DEALS,
                required_won: MIN_WON_DEALS,
                required_lost: MIN_LOST_DEALS,
            }));
        }

        let samples = augment(&deals);
        let synthetic_samples = samples.iter().filter(|sample| !sample.real).count();

        let inputs: Vec<FeatureInput<'_>> = samples
            .iter()
            .map(|sample| FeatureInput {
                deal: &deals[sample.deal_index].context,
                margin: Some(sample.margin),
            })
            .collect();
        let norm_stats = compute_norm_stats(&inputs);

        let x: Vec<Vec<f64>> =
            inputs.iter().map(|input| featurize(input, &norm_stats)).collect();
        let y: Vec<f64> = samples.iter().map(|sample| sample.label).collect();
        let weights: Vec<f64> = samples.iter().map(|sample| sample.weight).collect();

        let trained = regression::train(&x, &y, Some(&weights), &self.options)?;

        let real_x: Vec<Vec<f64>> = samples
            .iter()
            .zip(x.iter())
            .filter(|(sample, _)| sample.real)
            .map(|(_, row)| row.clone())
            .collect();
        let real_y: Vec<f64> = samples
            .iter()
            .filter(|sample| sample.real)
            .map(|sample| sample.label)
            .collect();
        let metrics = regression::evaluate(&trained.model, &real_x, &real_y)?;

        let feature_importance =
            regression::feature_importance(&trained.model, &FEATURE_NAMES);
        let input_checksum = training_input_checksum(customer, &x, &y, &weights);

        let phase_promotion_eligible =
            metrics.auc >= PROMOTION_MIN_AUC && deals.len() >= PROMOTION_MIN_DEALS;

        info!(
            customer = %customer.0,
            real_deals = deals.len(),
            synthetic_samples,
            auc = metrics.auc,
            log_loss = metrics.log_loss,
            promotion_eligible = phase_promotion_eligible,
            "customer model trained"
        );

        let package = ModelPackage {
            version: uuid::Uuid::new_v4().to_string(),
            trained_at: Utc::now(),
            weights: trained.model.weights.clone(),
            bias: trained.model.bias,
            feature_count: FEATURE_COUNT,
            norm_stats,
            metrics,
            feature_importance,
            training_deals: deals.len(),
            input_checksum,
        };

        Ok(TrainingOutcome::Trained(Box::new(TrainingReport {
            package,
            real_deals: deals.len(),
            synthetic_samples,
            epochs_run: trained.epochs_run,
            best_validation_loss: trained.best_validation_loss,
            phase_promotion_eligible,
        })))
    }
}

/// Real samples plus one counterfactual per deal: a won deal would have
/// been lost somewhat above its closing margin, a lost deal might have won
/// somewhat below it. Shift sizes follow the benchmark band for the deal's
/// segment and product mix.
fn augment(deals: &[HistoricalDeal]) -> Vec<Sample> {
    let mut samples = Vec::with_capacity(deals.len() * 2);

    for (deal_index, deal) in deals.iter().enumerate() {
        let won = deal.outcome == DealOutcome::Won;
        samples.push(Sample {
            deal_index,
            margin: deal.achieved_margin,
            label: if won { 1.0 } else { 0.0 },
            weight: 1.0,
            real: true,
        });

        let iqr = benchmarks::benchmark_for_deal(&deal.context).iqr();
        let won_shift = 0.75 * iqr;
        let lost_shift = 0.5 * won_shift;

        let (shifted, label) = if won {
            (deal.achieved_margin.value() + won_shift, 0.0)
        } else {
            (deal.achieved_margin.value() - lost_shift, 1.0)
        };
        samples.push(Sample {
            deal_index,
            margin: FractionMargin(
                shifted.clamp(SYNTHETIC_MARGIN_FLOOR, SYNTHETIC_MARGIN_CEILING),
            ),
            label,
            weight: SYNTHETIC_WEIGHT,
            real: false,
        });
    }

    samples
}

/// sha256 over the canonical training matrix, so two packages trained on
/// identical inputs carry identical checksums.
fn training_input_checksum(
    customer: &CustomerId,
    x: &[Vec<f64>],
    y: &[f64],
    weights: &[f64],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(customer.0.as_bytes());
    hasher.update((x.len() as u64).to_le_bytes());
    for ((row, label), weight) in x.iter().zip(y.iter()).zip(weights.iter()) {
        for value in row {
            hasher.update(value.to_bits().to_le_bytes());
        }
        hasher.update(label.to_bits().to_le_bytes());
        hasher.update(weight.to_bits().to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::{
        DealSource, TrainingOutcome, TrainingPipeline, MIN_LOST_DEALS, MIN_TOTAL_DEALS,
        MIN_WON_DEALS,
    };
    use crate::domain::deal::{
        CustomerId, DealContext, DealInput, DealOutcome, HistoricalDeal,
    };
    use crate::domain::margin::FractionMargin;
    use crate::errors::ApplicationError;
    use crate::ml::features::FEATURE_COUNT;

    struct FixedSource(Vec<HistoricalDeal>);

    impl DealSource for FixedSource {
        fn closed_deals(
            &self,
            _customer: &CustomerId,
        ) -> Result<Vec<HistoricalDeal>, ApplicationError> {
            Ok(self.0.clone())
        }
    }

    fn closed_deal(step: usize, won: bool) -> HistoricalDeal {
        let context = DealContext::from_input(DealInput {
            oem_cost: Decimal::new(20_000_00 + step as i64 * 1_000_00, 2),
            ..DealInput::default()
        });
        // Won deals closed lean, lost deals were priced rich: the margin
        // feature separates the classes.
        let margin = if won {
            0.08 + (step % 10) as f64 * 0.008
        } else {
            0.24 + (step % 10) as f64 * 0.008
        };
        HistoricalDeal {
            context,
            achieved_margin: FractionMargin(margin),
            outcome: if won { DealOutcome::Won } else { DealOutcome::Lost },
            loss_reason: if won { None } else { Some("price".to_owned()) },
            close_date: Some(Utc::now() - Duration::days(step as i64)),
        }
    }

    fn history(won: usize, lost: usize) -> Vec<HistoricalDeal> {
        let mut deals = Vec::new();
        for step in 0..won {
            deals.push(closed_deal(step, true));
        }
        for step in 0..lost {
            deals.push(closed_deal(step, false));
        }
        deals
    }

    #[test]
    fn too_few_deals_yield_a_structured_shortfall() {
        let pipeline = TrainingPipeline::new(FixedSource(history(8, 4)));
        let outcome = pipeline
            .train_customer_model(&CustomerId("cust-1".to_owned()))
            .expect("pipeline should not error on thin data");

        match outcome {
            TrainingOutcome::InsufficientData(shortfall) => {
                assert_eq!(shortfall.total, 12);
                assert_eq!(shortfall.won, 8);
                assert_eq!(shortfall.lost, 4);
                assert_eq!(shortfall.required_total, MIN_TOTAL_DEALS);
                assert_eq!(shortfall.required_won, MIN_WON_DEALS);
                assert_eq!(shortfall.required_lost, MIN_LOST_DEALS);
                assert_eq!(shortfall.missing(), 88);
            }
            TrainingOutcome::Trained(_) => panic!("thin data must not train"),
        }
    }

    #[test]
    fn sufficient_history_trains_a_full_package() {
        let pipeline = TrainingPipeline::new(FixedSource(history(70, 50)));
        let outcome = pipeline
            .train_customer_model(&CustomerId("cust-2".to_owned()))
            .expect("training should succeed");

        let report = match outcome {
            TrainingOutcome::Trained(report) => report,
            TrainingOutcome::InsufficientData(shortfall) => {
                panic!("expected training, got shortfall {shortfall:?}")
            }
        };

        assert_eq!(report.real_deals, 120);
        assert_eq!(report.synthetic_samples, 120);
        assert_eq!(report.package.feature_count, FEATURE_COUNT);
        assert_eq!(report.package.weights.len(), FEATURE_COUNT);
        assert_eq!(report.package.training_deals, 120);
        assert!(report.package.metrics.auc > 0.8, "margin-separable history should rank well");
        assert!(report.package.metrics.log_loss.is_finite());
        assert_eq!(report.package.feature_importance.len(), FEATURE_COUNT);
        assert_eq!(report.package.input_checksum.len(), 64);
        assert!(report.phase_promotion_eligible);
    }

    #[test]
    fn identical_inputs_produce_identical_checksums() {
        let customer = CustomerId("cust-3".to_owned());
        let first = TrainingPipeline::new(FixedSource(history(70, 50)))
            .train_customer_model(&customer)
            .expect("training should succeed");
        let second = TrainingPipeline::new(FixedSource(history(70, 50)))
            .train_customer_model(&customer)
            .expect("training should succeed");

        match (first, second) {
            (TrainingOutcome::Trained(a), TrainingOutcome::Trained(b)) => {
                assert_eq!(a.package.input_checksum, b.package.input_checksum);
                assert_ne!(a.package.version, b.package.version);
            }
            _ => panic!("both runs should train"),
        }
    }
}
