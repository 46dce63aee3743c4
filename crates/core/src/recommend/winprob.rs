//! Heuristic win-probability estimate.
//!
//! Blends a competitor-count base rate (adjusted for deal posture) with a
//! logistic response to the proposed margin. Margin is a required input:
//! every caller has a concrete candidate margin, so the undefined-margin
//! path that existed upstream is unrepresentable here.

use crate::domain::deal::{
    CompetitorBucket, CustomerSegment, DealContext, DealRegistration, RelationshipStrength,
    SolutionComplexity, ValueAddLevel,
};
use crate::domain::margin::FractionMargin;

/// Margin (in points) at which win odds start falling away.
const KNEE_MARGIN_PCT: f64 = 18.0;
/// Logistic slope per margin point around the knee.
const KNEE_SLOPE: f64 = 0.08;
const HEURISTIC_WEIGHT: f64 = 0.6;
const MARGIN_WEIGHT: f64 = 0.4;

/// Estimated win chance at the given margin, as an integer percent in
/// `[5, 95]`. Deterministic: identical inputs always produce identical
/// output.
pub fn estimate_win_probability(deal: &DealContext, margin: FractionMargin) -> u8 {
    let probability = win_probability_fraction(deal, margin);
    (probability * 100.0).round() as u8
}

/// The same estimate as a 0-1 fraction, clamped to `[0.05, 0.95]`.
pub fn win_probability_fraction(deal: &DealContext, margin: FractionMargin) -> f64 {
    let mut base = match deal.competitor_bucket {
        CompetitorBucket::None => 0.68,
        CompetitorBucket::One => 0.58,
        CompetitorBucket::Two => 0.43,
        CompetitorBucket::ThreeOrMore => 0.32,
    };

    base += match deal.registration {
        DealRegistration::NotRegistered => 0.0,
        DealRegistration::Registered => 0.05,
        DealRegistration::Premium => 0.09,
    };
    base += match deal.segment {
        CustomerSegment::Smb => 0.02,
        CustomerSegment::MidMarket => 0.0,
        CustomerSegment::Enterprise => -0.03,
    };
    base += match deal.relationship {
        RelationshipStrength::New => -0.03,
        RelationshipStrength::Developing => 0.0,
        RelationshipStrength::Established => 0.04,
        RelationshipStrength::Strategic => 0.08,
    };
    base += match deal.value_add {
        ValueAddLevel::None => -0.02,
        ValueAddLevel::Basic => 0.0,
        ValueAddLevel::Moderate => 0.03,
        ValueAddLevel::Extensive => 0.06,
    };
    base += match deal.complexity {
        SolutionComplexity::Commodity => 0.0,
        SolutionComplexity::Standard => 0.0,
        SolutionComplexity::Complex => -0.02,
        SolutionComplexity::HighlyComplex => -0.04,
    };
    if deal.new_logo {
        base -= 0.05;
    }
    if deal.services_attached {
        base += 0.03;
    }
    if deal.quarter_end {
        base += 0.02;
    }
    if let Some(aggression) = deal.avg_price_aggression() {
        // Passive fields lift the odds, cutthroat ones drag them.
        base += (3.0 - aggression) * 0.02;
    }

    let margin_pct = margin.as_percent().value();
    let margin_term = 1.0 / (1.0 + (KNEE_SLOPE * (margin_pct - KNEE_MARGIN_PCT)).exp());

    (HEURISTIC_WEIGHT * base + MARGIN_WEIGHT * margin_term).clamp(0.05, 0.95)
}
