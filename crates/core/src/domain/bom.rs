use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::deal::{
    CompetitorBucket, CustomerSegment, DealRegistration, RelationshipStrength, ValueAddLevel,
};
use crate::domain::margin::PercentMargin;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BomCategory {
    Hardware,
    Software,
    Cloud,
    ProfessionalServices,
    ManagedServices,
    ComplexSolution,
    /// Anything the catalog does not recognize; priced at the most
    /// conservative policy.
    Other,
}

/// One line item of a bill of materials.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BomLine {
    pub category: BomCategory,
    pub quantity: u32,
    pub unit_cost: Decimal,
    pub description: Option<String>,
}

impl BomLine {
    pub fn extended_cost(&self) -> Decimal {
        self.unit_cost * Decimal::from(self.quantity)
    }
}

/// Deal attributes that shape the allocation; everything optional so the
/// optimizer can run on a bare line list.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BomContext {
    pub target_blended_margin: Option<PercentMargin>,
    pub segment: Option<CustomerSegment>,
    pub registration: Option<DealRegistration>,
    pub relationship: Option<RelationshipStrength>,
    pub value_add: Option<ValueAddLevel>,
    pub competitor_bucket: Option<CompetitorBucket>,
}

/// Optimizer output for a single line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BomLineAllocation {
    pub category: BomCategory,
    pub quantity: u32,
    pub unit_cost: Decimal,
    pub recommended_margin_pct: PercentMargin,
    pub floor_pct: PercentMargin,
    pub extended_cost: Decimal,
    pub extended_price: Decimal,
    pub gross_profit: Decimal,
    pub rationale: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BomTotals {
    pub total_cost: Decimal,
    pub total_price: Decimal,
    pub total_gross_profit: Decimal,
    pub blended_margin_pct: PercentMargin,
    pub target_achieved: bool,
    /// Remaining distance to the requested target in percentage points;
    /// zero when no target was requested.
    pub gap_pct: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BomAllocation {
    pub lines: Vec<BomLineAllocation>,
    pub totals: BomTotals,
    /// 0-100 structural quality score.
    pub health_score: u8,
    pub insights: Vec<String>,
}
