//! Deal feature engineering.
//!
//! Maps a [`DealContext`] into a fixed-length numeric vector: 8 continuous
//! features (z-normalized against externally supplied [`NormStats`]), 4
//! binary indicators, and 6 categorical groups one-hot encoded with the
//! last variant of each group dropped. The vector length never varies with
//! the input; an absent continuous value normalizes to exactly 0, which is
//! mean imputation under z-normalization.

use crate::domain::deal::{
    CustomerSegment, DealContext, DealProductCategory, DealRegistration, RelationshipStrength,
    SolutionComplexity, ValueAddLevel,
};
use crate::domain::margin::FractionMargin;
use crate::domain::model::NormStats;

pub const CONTINUOUS_COUNT: usize = 8;
pub const FEATURE_COUNT: usize = 29;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "log_oem_cost",
    "proposed_margin",
    "price_sensitivity",
    "loyalty",
    "urgency",
    "differentiation",
    "competitor_count",
    "bom_line_count",
    "new_logo",
    "services_attached",
    "quarter_end",
    "displacement",
    "category_hardware",
    "category_software",
    "category_cloud",
    "category_services",
    "segment_smb",
    "segment_mid_market",
    "relationship_new",
    "relationship_developing",
    "relationship_established",
    "registration_not_registered",
    "registration_registered",
    "value_add_none",
    "value_add_basic",
    "value_add_moderate",
    "complexity_commodity",
    "complexity_standard",
    "complexity_complex",
];

/// One row to featurize: a deal plus the margin to evaluate it at.
///
/// For a historical deal the margin is its recorded outcome; the margin
/// sweep substitutes counterfactual values here without touching the deal.
/// `None` means no margin is known and the feature imputes to the mean.
#[derive(Clone, Copy, Debug)]
pub struct FeatureInput<'a> {
    pub deal: &'a DealContext,
    pub margin: Option<FractionMargin>,
}

fn continuous_raw(input: &FeatureInput<'_>) -> [Option<f64>; CONTINUOUS_COUNT] {
    let deal = input.deal;
    [
        Some((deal.oem_cost_f64().max(0.0) + 1.0).ln()),
        input.margin.map(FractionMargin::value),
        Some(deal.price_sensitivity.as_f64()),
        Some(deal.loyalty.as_f64()),
        Some(deal.urgency.as_f64()),
        Some(deal.differentiation.as_f64()),
        Some(f64::from(deal.competitor_bucket.count())),
        deal.bom_stats.map(|stats| f64::from(stats.line_count)),
    ]
}

/// Produce the 29-element feature vector for one input.
pub fn featurize(input: &FeatureInput<'_>, stats: &NormStats) -> Vec<f64> {
    let deal = input.deal;
    let mut vector = Vec::with_capacity(FEATURE_COUNT);

    for (index, raw) in continuous_raw(input).into_iter().enumerate() {
        let value = match raw {
            Some(value) => {
                let mean = stats.mean.get(index).copied().unwrap_or(0.0);
                let std = stats.std.get(index).copied().unwrap_or(1.0);
                let std = if std > 0.0 { std } else { 1.0 };
                (value - mean) / std
            }
            None => 0.0,
        };
        vector.push(value);
    }

    for flag in [deal.new_logo, deal.services_attached, deal.quarter_end, deal.displacement] {
        vector.push(if flag { 1.0 } else { 0.0 });
    }

    // k-1 one-hot groups: the last variant of each group is the dropped
    // reference level and encodes as all zeros.
    for category in [
        DealProductCategory::Hardware,
        DealProductCategory::Software,
        DealProductCategory::Cloud,
        DealProductCategory::Services,
    ] {
        vector.push(indicator(deal.product_category == category));
    }
    for segment in [CustomerSegment::Smb, CustomerSegment::MidMarket] {
        vector.push(indicator(deal.segment == segment));
    }
    for relationship in [
        RelationshipStrength::New,
        RelationshipStrength::Developing,
        RelationshipStrength::Established,
    ] {
        vector.push(indicator(deal.relationship == relationship));
    }
    for registration in [DealRegistration::NotRegistered, DealRegistration::Registered] {
        vector.push(indicator(deal.registration == registration));
    }
    for value_add in [ValueAddLevel::None, ValueAddLevel::Basic, ValueAddLevel::Moderate] {
        vector.push(indicator(deal.value_add == value_add));
    }
    for complexity in [
        SolutionComplexity::Commodity,
        SolutionComplexity::Standard,
        SolutionComplexity::Complex,
    ] {
        vector.push(indicator(deal.complexity == complexity));
    }

    debug_assert_eq!(vector.len(), FEATURE_COUNT);
    vector
}

fn indicator(condition: bool) -> f64 {
    if condition {
        1.0
    } else {
        0.0
    }
}

/// Population mean/std per continuous feature over a sample set. Absent
/// values do not contribute; a feature that is constant (or entirely
/// absent) across the set gets std 1.0 so normalization never divides by
/// zero.
pub fn compute_norm_stats(inputs: &[FeatureInput<'_>]) -> NormStats {
    let mut mean = vec![0.0; CONTINUOUS_COUNT];
    let mut std = vec![1.0; CONTINUOUS_COUNT];

    let raws: Vec<[Option<f64>; CONTINUOUS_COUNT]> =
        inputs.iter().map(continuous_raw).collect();

    for index in 0..CONTINUOUS_COUNT {
        let values: Vec<f64> = raws.iter().filter_map(|row| row[index]).collect();
        if values.is_empty() {
            continue;
        }

        let count = values.len() as f64;
        let feature_mean = values.iter().sum::<f64>() / count;
        let variance =
            values.iter().map(|value| (value - feature_mean).powi(2)).sum::<f64>() / count;
        let feature_std = variance.sqrt();

        mean[index] = feature_mean;
        std[index] = if feature_std > 1e-12 { feature_std } else { 1.0 };
    }

    NormStats { mean, std }
}
