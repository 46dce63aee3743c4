use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::margin::FractionMargin;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

/// Product mix of the opportunity as a whole (distinct from the per-line
/// BOM categories in `domain::bom`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealProductCategory {
    Hardware,
    Software,
    Cloud,
    Services,
    Hybrid,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerSegment {
    Smb,
    MidMarket,
    Enterprise,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStrength {
    New,
    Developing,
    Established,
    Strategic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealRegistration {
    NotRegistered,
    Registered,
    Premium,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompetitorBucket {
    None,
    One,
    Two,
    ThreeOrMore,
}

impl CompetitorBucket {
    /// Numeric encoding used by the feature vector.
    pub fn count(self) -> u8 {
        match self {
            Self::None => 0,
            Self::One => 1,
            Self::Two => 2,
            Self::ThreeOrMore => 3,
        }
    }

    /// Two or more named competitors.
    pub fn is_competitive(self) -> bool {
        matches!(self, Self::Two | Self::ThreeOrMore)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueAddLevel {
    None,
    Basic,
    Moderate,
    Extensive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionComplexity {
    Commodity,
    Standard,
    Complex,
    HighlyComplex,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechSophistication {
    Low,
    Medium,
    High,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategicImportance {
    Standard,
    Important,
    MustWin,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndustryVertical {
    Healthcare,
    FinancialServices,
    Government,
    Education,
    Retail,
    Manufacturing,
    Technology,
    Other,
}

/// A 1-5 buyer rating. Out-of-range inputs are clamped at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rating(u8);

impl Rating {
    pub fn new(value: u8) -> Self {
        Self(value.clamp(1, 5))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.0)
    }
}

impl Default for Rating {
    fn default() -> Self {
        Self(3)
    }
}

/// A named competitor known to be in the deal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorProfile {
    pub name: String,
    /// How aggressively this competitor prices (1 = passive, 5 = cutthroat).
    pub price_aggression: Rating,
}

/// Admin-configured overrides for a specific OEM vendor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OemProfile {
    pub vendor: String,
    /// Replaces the vendor-table adjustment: configured base margin for
    /// deals on this vendor's paper.
    pub base_margin: Option<FractionMargin>,
    /// Margin bonus for a standard registration, as a fraction.
    pub registered_bonus: Option<f64>,
    /// Margin bonus for a premium registration, as a fraction.
    pub premium_bonus: Option<f64>,
}

/// Summary of an attached bill of materials, when one exists.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BomStats {
    pub line_count: u32,
    pub avg_margin: FractionMargin,
}

/// Raw request shape: every attribute the caller may omit is optional.
/// Resolution into a [`DealContext`] happens in exactly one place,
/// [`DealContext::from_input`], so defaults cannot drift between call
/// sites.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DealInput {
    pub oem_cost: Decimal,
    pub product_category: Option<DealProductCategory>,
    pub segment: Option<CustomerSegment>,
    pub relationship: Option<RelationshipStrength>,
    pub registration: Option<DealRegistration>,
    pub competitor_bucket: Option<CompetitorBucket>,
    pub value_add: Option<ValueAddLevel>,
    pub complexity: Option<SolutionComplexity>,
    pub tech_sophistication: Option<TechSophistication>,
    pub strategic_importance: Option<StrategicImportance>,
    pub price_sensitivity: Option<u8>,
    pub loyalty: Option<u8>,
    pub urgency: Option<u8>,
    pub differentiation: Option<u8>,
    pub new_logo: Option<bool>,
    pub services_attached: Option<bool>,
    pub quarter_end: Option<bool>,
    pub displacement: Option<bool>,
    pub industry: Option<IndustryVertical>,
    #[serde(default)]
    pub competitor_profiles: Vec<CompetitorProfile>,
    pub oem_profile: Option<OemProfile>,
    pub bom_stats: Option<BomStats>,
}

/// One fully resolved sales opportunity. Immutable input to every engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DealContext {
    pub oem_cost: Decimal,
    pub product_category: DealProductCategory,
    pub segment: CustomerSegment,
    pub relationship: RelationshipStrength,
    pub registration: DealRegistration,
    pub competitor_bucket: CompetitorBucket,
    pub value_add: ValueAddLevel,
    pub complexity: SolutionComplexity,
    pub tech_sophistication: TechSophistication,
    pub strategic_importance: StrategicImportance,
    pub price_sensitivity: Rating,
    pub loyalty: Rating,
    pub urgency: Rating,
    pub differentiation: Rating,
    pub new_logo: bool,
    pub services_attached: bool,
    pub quarter_end: bool,
    pub displacement: bool,
    pub industry: Option<IndustryVertical>,
    pub competitor_profiles: Vec<CompetitorProfile>,
    pub oem_profile: Option<OemProfile>,
    pub bom_stats: Option<BomStats>,
}

impl DealContext {
    /// The single defaulting step for optional deal attributes.
    pub fn from_input(input: DealInput) -> Self {
        Self {
            oem_cost: input.oem_cost,
            product_category: input.product_category.unwrap_or(DealProductCategory::Hardware),
            segment: input.segment.unwrap_or(CustomerSegment::MidMarket),
            relationship: input.relationship.unwrap_or(RelationshipStrength::Developing),
            registration: input.registration.unwrap_or(DealRegistration::NotRegistered),
            competitor_bucket: input.competitor_bucket.unwrap_or(CompetitorBucket::One),
            value_add: input.value_add.unwrap_or(ValueAddLevel::Basic),
            complexity: input.complexity.unwrap_or(SolutionComplexity::Standard),
            tech_sophistication: input.tech_sophistication.unwrap_or(TechSophistication::Medium),
            strategic_importance: input.strategic_importance.unwrap_or(StrategicImportance::Standard),
            price_sensitivity: Rating::new(input.price_sensitivity.unwrap_or(3)),
            loyalty: Rating::new(input.loyalty.unwrap_or(3)),
            urgency: Rating::new(input.urgency.unwrap_or(3)),
            differentiation: Rating::new(input.differentiation.unwrap_or(3)),
            new_logo: input.new_logo.unwrap_or(false),
            services_attached: input.services_attached.unwrap_or(false),
            quarter_end: input.quarter_end.unwrap_or(false),
            displacement: input.displacement.unwrap_or(false),
            industry: input.industry,
            competitor_profiles: input.competitor_profiles,
            oem_profile: input.oem_profile,
            bom_stats: input.bom_stats,
        }
    }

    /// Average price aggression across named competitor profiles.
    pub fn avg_price_aggression(&self) -> Option<f64> {
        if self.competitor_profiles.is_empty() {
            return None;
        }
        let sum: f64 = self.competitor_profiles.iter().map(|c| c.price_aggression.as_f64()).sum();
        Some(sum / self.competitor_profiles.len() as f64)
    }

    /// OEM cost as f64 for ratio math; money stays `Decimal` elsewhere.
    pub fn oem_cost_f64(&self) -> f64 {
        self.oem_cost.try_into().unwrap_or(0.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealOutcome {
    Won,
    Lost,
}

/// A closed deal: the context as it looked at close, plus what happened.
/// Read-only to the engine; both the neighbor model and the training
/// pipeline consume these verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoricalDeal {
    pub context: DealContext,
    /// Margin on price actually achieved (fraction, not percent).
    pub achieved_margin: FractionMargin,
    pub outcome: DealOutcome,
    pub loss_reason: Option<String>,
    pub close_date: Option<DateTime<Utc>>,
}

impl HistoricalDeal {
    pub fn is_won(&self) -> bool {
        self.outcome == DealOutcome::Won
    }

    /// Lost, with a loss reason that mentions price.
    pub fn lost_on_price(&self) -> bool {
        self.outcome == DealOutcome::Lost
            && self
                .loss_reason
                .as_deref()
                .is_some_and(|reason| reason.to_ascii_lowercase().contains("price"))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{
        CompetitorBucket, CompetitorProfile, CustomerSegment, DealContext, DealInput, DealOutcome,
        HistoricalDeal, Rating,
    };
    use crate::domain::margin::FractionMargin;

    #[test]
    fn from_input_applies_documented_defaults() {
        let context = DealContext::from_input(DealInput {
            oem_cost: Decimal::new(50_000_00, 2),
            ..DealInput::default()
        });

        assert_eq!(context.segment, CustomerSegment::MidMarket);
        assert_eq!(context.competitor_bucket, CompetitorBucket::One);
        assert_eq!(context.price_sensitivity, Rating::new(3));
        assert!(!context.new_logo);
        assert!(context.industry.is_none());
    }

    #[test]
    fn ratings_are_clamped_to_scale() {
        assert_eq!(Rating::new(0).value(), 1);
        assert_eq!(Rating::new(9).value(), 5);
        assert_eq!(Rating::new(4).value(), 4);
    }

    #[test]
    fn avg_price_aggression_averages_named_competitors() {
        let mut context = DealContext::from_input(DealInput {
            oem_cost: Decimal::new(10_000_00, 2),
            ..DealInput::default()
        });
        assert_eq!(context.avg_price_aggression(), None);

        context.competitor_profiles = vec![
            CompetitorProfile { name: "Northgrid".to_owned(), price_aggression: Rating::new(5) },
            CompetitorProfile { name: "Vexa".to_owned(), price_aggression: Rating::new(2) },
        ];
        assert_eq!(context.avg_price_aggression(), Some(3.5));
    }

    #[test]
    fn lost_on_price_matches_reason_case_insensitively() {
        let context = DealContext::from_input(DealInput {
            oem_cost: Decimal::new(10_000_00, 2),
            ..DealInput::default()
        });
        let deal = HistoricalDeal {
            context,
            achieved_margin: FractionMargin(0.12),
            outcome: DealOutcome::Lost,
            loss_reason: Some("Lost on Price to incumbent".to_owned()),
            close_date: None,
        };

        assert!(deal.lost_on_price());
        assert!(!HistoricalDeal { outcome: DealOutcome::Won, ..deal.clone() }.lost_on_price());
        assert!(!HistoricalDeal { loss_reason: None, ..deal }.lost_on_price());
    }
}
