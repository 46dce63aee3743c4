//! Rule-based margin recommendation.
//!
//! Accumulates ~20 named, signed adjustments onto a segment base margin,
//! optionally blends toward what similar historical deals actually closed
//! at, and clamps the result between the policy floor and ceiling. Every
//! adjustment is emitted as a [`Driver`] so the recommendation explains
//! itself.

use crate::domain::deal::{
    CompetitorBucket, CustomerSegment, DealContext, DealProductCategory, DealRegistration,
    IndustryVertical, RelationshipStrength, SolutionComplexity, StrategicImportance,
    TechSophistication, ValueAddLevel,
};
use crate::domain::margin::FractionMargin;
use crate::domain::recommendation::{
    price_at_margin, Driver, RecommendationMethod, RecommendationResult,
};
use crate::recommend::neighbors::NeighborSummary;
use crate::recommend::winprob::win_probability_fraction;

pub const MARGIN_CEILING: f64 = 0.55;
/// Floor for an unregistered enterprise knife-fight.
pub const COMPETITIVE_ENTERPRISE_FLOOR: f64 = 0.005;
pub const STANDARD_FLOOR: f64 = 0.03;

const MAX_DRIVERS: usize = 6;
const RULES_ONLY_CONFIDENCE: f64 = 0.4;

/// Blend weight given to the neighbor average as evidence accumulates.
pub fn neighbor_alpha(count: usize) -> f64 {
    (0.25 + count as f64 / 40.0).clamp(0.25, 0.6)
}

/// The policy floor for this deal's risk profile.
pub fn policy_floor(deal: &DealContext) -> FractionMargin {
    let competitive_enterprise = deal.segment == CustomerSegment::Enterprise
        && deal.competitor_bucket.is_competitive()
        && deal.registration == DealRegistration::NotRegistered;
    if competitive_enterprise {
        FractionMargin(COMPETITIVE_ENTERPRISE_FLOOR)
    } else {
        FractionMargin(STANDARD_FLOOR)
    }
}

fn segment_base(segment: CustomerSegment) -> f64 {
    match segment {
        CustomerSegment::Smb => 0.20,
        CustomerSegment::MidMarket => 0.17,
        CustomerSegment::Enterprise => 0.14,
    }
}

fn add(drivers: &mut Vec<Driver>, name: &str, value: f64) -> f64 {
    if value != 0.0 {
        drivers.push(Driver { name: name.to_owned(), value });
    }
    value
}

/// Vendor margin posture by name. Vendor names are free-form, so unknown
/// vendors fall through to 0 by design.
fn vendor_adjustment(vendor: &str) -> f64 {
    match vendor.trim().to_ascii_lowercase().as_str() {
        "cisco" => -0.01,
        "dell" | "hpe" => -0.005,
        "fortinet" => 0.01,
        "palo alto" | "palo alto networks" => 0.015,
        _ => 0.0,
    }
}

fn industry_adjustment(vertical: IndustryVertical) -> f64 {
    match vertical {
        IndustryVertical::Healthcare => 0.01,
        IndustryVertical::FinancialServices => 0.005,
        IndustryVertical::Government => -0.02,
        IndustryVertical::Education => -0.015,
        IndustryVertical::Retail => -0.005,
        IndustryVertical::Manufacturing => 0.0,
        IndustryVertical::Technology => 0.01,
        IndustryVertical::Other => 0.0,
    }
}

fn accumulate_adjustments(deal: &DealContext, drivers: &mut Vec<Driver>) -> f64 {
    let mut margin = add(drivers, "Segment base", segment_base(deal.segment));

    let registration_bonus = match deal.registration {
        DealRegistration::NotRegistered => 0.0,
        DealRegistration::Registered => deal
            .oem_profile
            .as_ref()
            .and_then(|profile| profile.registered_bonus)
            .unwrap_or(0.03),
        DealRegistration::Premium => deal
            .oem_profile
            .as_ref()
            .and_then(|profile| profile.premium_bonus)
            .unwrap_or(0.06),
    };
    margin += add(drivers, "Deal registration", registration_bonus);

    margin += add(
        drivers,
        "Competitive pressure",
        match deal.competitor_bucket {
            CompetitorBucket::None => 0.025,
            CompetitorBucket::One => 0.0,
            CompetitorBucket::Two => -0.02,
            CompetitorBucket::ThreeOrMore => -0.035,
        },
    );

    if let Some(aggression) = deal.avg_price_aggression() {
        margin += add(drivers, "Competitor pricing posture", (3.0 - aggression) * 0.005);
    }

    margin += add(
        drivers,
        "Value-add level",
        match deal.value_add {
            ValueAddLevel::None => -0.01,
            ValueAddLevel::Basic => 0.0,
            ValueAddLevel::Moderate => 0.015,
            ValueAddLevel::Extensive => 0.03,
        },
    );

    margin += add(
        drivers,
        "Relationship strength",
        match deal.relationship {
            RelationshipStrength::New => -0.01,
            RelationshipStrength::Developing => 0.0,
            RelationshipStrength::Established => 0.01,
            RelationshipStrength::Strategic => 0.02,
        },
    );

    margin += add(
        drivers,
        "Price sensitivity",
        (3.0 - deal.price_sensitivity.as_f64()) * 0.008,
    );
    margin += add(drivers, "Customer loyalty", (deal.loyalty.as_f64() - 3.0) * 0.005);

    margin += add(
        drivers,
        "Product category",
        match deal.product_category {
            DealProductCategory::Hardware => -0.02,
            DealProductCategory::Software => 0.02,
            DealProductCategory::Cloud => 0.005,
            DealProductCategory::Services => 0.03,
            DealProductCategory::Hybrid => 0.01,
        },
    );

    margin += add(
        drivers,
        "Solution complexity",
        match deal.complexity {
            SolutionComplexity::Commodity => -0.015,
            SolutionComplexity::Standard => 0.0,
            SolutionComplexity::Complex => 0.02,
            SolutionComplexity::HighlyComplex => 0.035,
        },
    );

    margin += add(
        drivers,
        "Strategic importance",
        match deal.strategic_importance {
            StrategicImportance::Standard => 0.0,
            StrategicImportance::Important => -0.01,
            StrategicImportance::MustWin => -0.025,
        },
    );

    margin += add(drivers, "Buyer urgency", (deal.urgency.as_f64() - 3.0) * 0.006);

    if deal.new_logo {
        margin += add(drivers, "New logo", -0.015);
    }

    margin += add(drivers, "Differentiation", (deal.differentiation.as_f64() - 3.0) * 0.007);

    margin += add(
        drivers,
        "Tech sophistication",
        match deal.tech_sophistication {
            TechSophistication::Low => 0.01,
            TechSophistication::Medium => 0.0,
            TechSophistication::High => -0.01,
        },
    );

    let cost = deal.oem_cost_f64();
    margin += add(
        drivers,
        "Deal size",
        if cost < 10_000.0 {
            0.02
        } else if cost >= 1_000_000.0 {
            -0.045
        } else if cost >= 500_000.0 {
            -0.03
        } else if cost >= 100_000.0 {
            -0.015
        } else {
            0.0
        },
    );

    if let Some(vertical) = deal.industry {
        margin += add(drivers, "Industry vertical", industry_adjustment(vertical));
    }

    // A configured OEM base margin replaces the vendor table outright.
    if let Some(profile) = &deal.oem_profile {
        let adjustment = match profile.base_margin {
            Some(base) => base.value() - segment_base(deal.segment),
            None => vendor_adjustment(&profile.vendor),
        };
        margin += add(drivers, "OEM program", adjustment);
    }

    if deal.services_attached {
        margin += add(drivers, "Services attached", 0.01);
        let complex_mix = deal.product_category == DealProductCategory::Hardware
            || matches!(
                deal.complexity,
                SolutionComplexity::Complex | SolutionComplexity::HighlyComplex
            );
        if complex_mix {
            margin += add(drivers, "Services on complex hardware", 0.005);
        }
    }

    if deal.quarter_end {
        margin += add(drivers, "Quarter-end close pressure", -0.01);
    }

    if deal.displacement {
        margin += add(drivers, "Displacement deal", -0.02);
    }

    margin
}

/// Produce a recommendation from rules alone, or blended with neighbor
/// evidence when a summary is supplied.
pub fn rule_based_recommendation(
    deal: &DealContext,
    neighbors: Option<&NeighborSummary>,
) -> RecommendationResult {
    let mut drivers = Vec::new();
    let rule_margin = accumulate_adjustments(deal, &mut drivers);

    let floor = policy_floor(deal);
    let rule_margin = rule_margin.clamp(floor.value(), MARGIN_CEILING);

    let neighbor_avg = neighbors
        .filter(|summary| summary.count > 0)
        .and_then(|summary| summary.weighted_avg_margin.map(|avg| (summary, avg)));

    let (final_margin, confidence, method) = match neighbor_avg {
        Some((summary, avg)) => {
            let alpha = neighbor_alpha(summary.count);
            let blended = alpha * avg.value() + (1.0 - alpha) * rule_margin;
            add(&mut drivers, "Neighbor margin blend", blended - rule_margin);

            let loss_adjustment =
                add(&mut drivers, "Neighbors lost on price", -0.015 * summary.lost_on_price as f64);
            let wins_adjustment = if summary.lost_on_price == 0 {
                add(
                    &mut drivers,
                    "High-margin neighbor wins",
                    0.01 * summary.high_margin_wins as f64,
                )
            } else {
                0.0
            };

            let blended = (blended + loss_adjustment + wins_adjustment)
                .clamp(floor.value(), MARGIN_CEILING);
            let agreement_gap = (rule_margin - avg.value()).abs();
            let confidence =
                (0.4 + summary.count as f64 / 50.0 - agreement_gap * 1.5).clamp(0.2, 0.8);
            (blended, confidence, RecommendationMethod::RuleBasedWithNeighbors)
        }
        None => (rule_margin, RULES_ONLY_CONFIDENCE, RecommendationMethod::RuleBased),
    };

    drivers.sort_by(|a, b| {
        b.value.abs().partial_cmp(&a.value.abs()).unwrap_or(std::cmp::Ordering::Equal)
    });
    drivers.truncate(MAX_DRIVERS);

    let final_margin = FractionMargin(final_margin);
    RecommendationResult {
        suggested_margin_pct: final_margin.as_percent(),
        suggested_price: price_at_margin(deal.oem_cost, final_margin),
        win_probability: win_probability_fraction(deal, final_margin),
        drivers,
        policy_floor: floor,
        confidence,
        method,
    }
}
