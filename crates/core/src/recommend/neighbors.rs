//! Nearest-neighbor scoring over historical deals.
//!
//! Similarity is an unbounded non-negative sum of weighted attribute
//! comparisons; recency enters as a multiplicative step-function decay.
//! The summary fed into the rule scorer carries the similarity-weighted
//! margin average plus the two signals that nudge it: neighbors lost on
//! price and neighbors won rich.

use chrono::{DateTime, Utc};

use crate::domain::deal::{DealContext, HistoricalDeal};
use crate::domain::margin::FractionMargin;

pub const DEFAULT_NEIGHBOR_K: usize = 10;

/// A win above this margin counts as a high-margin win.
const HIGH_MARGIN_WIN: f64 = 0.20;

const W_INDUSTRY: f64 = 2.0;
const W_SEGMENT: f64 = 1.5;
const W_CATEGORY: f64 = 1.5;
const W_REGISTRATION: f64 = 1.0;
const W_VALUE_ADD: f64 = 1.0;
const W_COMPLEXITY: f64 = 1.0;
const W_RELATIONSHIP: f64 = 1.0;
const W_TECH: f64 = 0.5;
const W_COMPETITOR_BUCKET: f64 = 1.0;
const W_COMPETITOR_OVERLAP: f64 = 1.5;
const W_RATING: f64 = 0.25;
const W_COST_BAND: f64 = 1.0;
const W_BOM_LINES: f64 = 0.75;
const W_BOM_MARGIN: f64 = 0.75;
const W_OEM_VENDOR: f64 = 0.75;
const W_FLAG: f64 = 0.25;

#[derive(Clone, Debug)]
pub struct ScoredNeighbor {
    pub deal: HistoricalDeal,
    pub score: f64,
}

#[derive(Clone, Debug, Default)]
pub struct NeighborSummary {
    pub neighbors: Vec<ScoredNeighbor>,
    pub weighted_avg_margin: Option<FractionMargin>,
    /// Neighbors lost with a price-related loss reason.
    pub lost_on_price: usize,
    /// Neighbors won above 20% margin.
    pub high_margin_wins: usize,
    pub count: usize,
}

fn cost_band(cost: f64) -> u8 {
    if cost < 10_000.0 {
        0
    } else if cost < 50_000.0 {
        1
    } else if cost < 100_000.0 {
        2
    } else if cost < 500_000.0 {
        3
    } else if cost < 1_000_000.0 {
        4
    } else {
        5
    }
}

/// Multi-attribute similarity between a live deal and a historical one.
/// Non-negative and unbounded; only relative magnitude matters.
pub fn similarity(input: &DealContext, other: &DealContext) -> f64 {
    let mut score = 0.0;

    if input.industry.is_some() && input.industry == other.industry {
        score += W_INDUSTRY;
    }
    if input.segment == other.segment {
        score += W_SEGMENT;
    }
    if input.product_category == other.product_category {
        score += W_CATEGORY;
    }
    if input.registration == other.registration {
        score += W_REGISTRATION;
    }
    if input.value_add == other.value_add {
        score += W_VALUE_ADD;
    }
    if input.complexity == other.complexity {
        score += W_COMPLEXITY;
    }
    if input.relationship == other.relationship {
        score += W_RELATIONSHIP;
    }
    if input.tech_sophistication == other.tech_sophistication {
        score += W_TECH;
    }

    if input.competitor_bucket == other.competitor_bucket {
        score += W_COMPETITOR_BUCKET;
    } else if input.competitor_bucket.is_competitive() && other.competitor_bucket.is_competitive()
    {
        // Both crowded fields, even if the head counts differ.
        score += W_COMPETITOR_BUCKET * 0.5;
    }

    score += W_COMPETITOR_OVERLAP * competitor_jaccard(input, other);

    for (mine, theirs) in [
        (input.price_sensitivity, other.price_sensitivity),
        (input.loyalty, other.loyalty),
        (input.urgency, other.urgency),
        (input.differentiation, other.differentiation),
    ] {
        if mine == theirs {
            score += W_RATING;
        }
    }

    if cost_band(input.oem_cost_f64()) == cost_band(other.oem_cost_f64()) {
        score += W_COST_BAND;
    }

    if let (Some(mine), Some(theirs)) = (input.bom_stats, other.bom_stats) {
        let line_gap = i64::from(mine.line_count).abs_diff(i64::from(theirs.line_count));
        if line_gap <= 2 {
            score += W_BOM_LINES;
        } else if line_gap <= 5 {
            score += W_BOM_LINES * 0.5;
        }

        let margin_gap = (mine.avg_margin.value() - theirs.avg_margin.value()).abs();
        if margin_gap <= 0.02 {
            score += W_BOM_MARGIN;
        } else if margin_gap <= 0.05 {
            score += W_BOM_MARGIN * 0.5;
        }
    }

    if let (Some(mine), Some(theirs)) = (&input.oem_profile, &other.oem_profile) {
        if mine.vendor.eq_ignore_ascii_case(&theirs.vendor) {
            score += W_OEM_VENDOR;
        }
    }

    if input.services_attached == other.services_attached {
        score += W_FLAG;
    }
    if input.quarter_end == other.quarter_end {
        score += W_FLAG;
    }

    score
}

fn competitor_jaccard(input: &DealContext, other: &DealContext) -> f64 {
    if input.competitor_profiles.is_empty() || other.competitor_profiles.is_empty() {
        return 0.0;
    }
    let mine: std::collections::BTreeSet<String> = input
        .competitor_profiles
        .iter()
        .map(|profile| profile.name.to_ascii_lowercase())
        .collect();
    let theirs: std::collections::BTreeSet<String> = other
        .competitor_profiles
        .iter()
        .map(|profile| profile.name.to_ascii_lowercase())
        .collect();

    let intersection = mine.intersection(&theirs).count() as f64;
    let union = mine.union(&theirs).count() as f64;
    intersection / union
}

/// Recency weight for a closed deal. A missing close date is neutral.
pub fn time_decay(close_date: Option<DateTime<Utc>>, as_of: DateTime<Utc>) -> f64 {
    let Some(closed) = close_date else {
        return 0.5;
    };

    let months = (as_of - closed).num_days().max(0) as f64 / 30.44;
    if months <= 12.0 {
        1.0
    } else if months <= 24.0 {
        0.85
    } else if months <= 36.0 {
        0.70
    } else if months <= 72.0 {
        0.50
    } else {
        0.30
    }
}

/// Score every historical deal against the input, keep the top `k` by
/// decayed similarity, and summarize what those neighbors closed at.
pub fn top_k_neighbors(
    input: &DealContext,
    deals: &[HistoricalDeal],
    k: usize,
    as_of: DateTime<Utc>,
) -> NeighborSummary {
    let mut scored: Vec<ScoredNeighbor> = deals
        .iter()
        .map(|deal| ScoredNeighbor {
            score: similarity(input, &deal.context) * time_decay(deal.close_date, as_of),
            deal: deal.clone(),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(k);

    let count = scored.len();
    let total_score: f64 = scored.iter().map(|neighbor| neighbor.score).sum();
    let weighted_avg_margin = if count == 0 {
        None
    } else if total_score > 0.0 {
        Some(FractionMargin(
            scored
                .iter()
                .map(|neighbor| neighbor.score * neighbor.deal.achieved_margin.value())
                .sum::<f64>()
                / total_score,
        ))
    } else {
        Some(FractionMargin(
            scored.iter().map(|neighbor| neighbor.deal.achieved_margin.value()).sum::<f64>()
                / count as f64,
        ))
    };

    let lost_on_price = scored.iter().filter(|neighbor| neighbor.deal.lost_on_price()).count();
    let high_margin_wins = scored
        .iter()
        .filter(|neighbor| {
            neighbor.deal.is_won() && neighbor.deal.achieved_margin.value() > HIGH_MARGIN_WIN
        })
        .count();

    NeighborSummary { neighbors: scored, weighted_avg_margin, lost_on_price, high_margin_wins, count }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::{similarity, time_decay, top_k_neighbors};
    use crate::domain::deal::{
        CompetitorProfile, CustomerSegment, DealContext, DealInput, DealOutcome, HistoricalDeal,
        IndustryVertical, Rating,
    };
    use crate::domain::margin::FractionMargin;

    fn base_deal() -> DealContext {
        DealContext::from_input(DealInput {
            oem_cost: Decimal::new(60_000_00, 2),
            industry: Some(IndustryVertical::Healthcare),
            ..DealInput::default()
        })
    }

    fn closed(
        context: DealContext,
        margin: f64,
        won: bool,
        loss_reason: Option<&str>,
        months_ago: i64,
    ) -> HistoricalDeal {
        HistoricalDeal {
            context,
            achieved_margin: FractionMargin(margin),
            outcome: if won { DealOutcome::Won } else { DealOutcome::Lost },
            loss_reason: loss_reason.map(str::to_owned),
            close_date: Some(Utc::now() - Duration::days(months_ago * 30)),
        }
    }

    #[test]
    fn identical_deals_outscore_dissimilar_ones() {
        let input = base_deal();
        let twin = input.clone();
        let mut stranger = base_deal();
        stranger.segment = CustomerSegment::Enterprise;
        stranger.industry = Some(IndustryVertical::Retail);
        stranger.oem_cost = Decimal::new(2_000_000_00, 2);
        stranger.price_sensitivity = Rating::new(5);

        assert!(similarity(&input, &twin) > similarity(&input, &stranger));
    }

    #[test]
    fn competitor_overlap_earns_partial_credit() {
        let mut input = base_deal();
        input.competitor_profiles = vec![
            CompetitorProfile { name: "Northgrid".to_owned(), price_aggression: Rating::new(4) },
            CompetitorProfile { name: "Vexa".to_owned(), price_aggression: Rating::new(3) },
        ];
        let mut overlapping = base_deal();
        overlapping.competitor_profiles = vec![CompetitorProfile {
            name: "northgrid".to_owned(),
            price_aggression: Rating::new(2),
        }];
        let mut disjoint = base_deal();
        disjoint.competitor_profiles = vec![CompetitorProfile {
            name: "Quanta".to_owned(),
            price_aggression: Rating::new(2),
        }];

        assert!(similarity(&input, &overlapping) > similarity(&input, &disjoint));
    }

    #[test]
    fn time_decay_follows_the_step_schedule() {
        let now = Utc::now();
        let months = |count: i64| Some(now - Duration::days(count * 30));

        assert_eq!(time_decay(months(6), now), 1.0);
        assert_eq!(time_decay(months(18), now), 0.85);
        assert_eq!(time_decay(months(30), now), 0.70);
        assert_eq!(time_decay(months(48), now), 0.50);
        assert_eq!(time_decay(months(84), now), 0.30);
        assert_eq!(time_decay(None, now), 0.5);
    }

    #[test]
    fn summary_counts_price_losses_and_rich_wins() {
        let input = base_deal();
        let deals = vec![
            closed(base_deal(), 0.25, true, None, 3),
            closed(base_deal(), 0.22, true, None, 5),
            closed(base_deal(), 0.12, false, Some("beaten on price"), 4),
            closed(base_deal(), 0.15, false, Some("lost to incumbent"), 6),
            closed(base_deal(), 0.10, true, None, 2),
        ];

        let summary = top_k_neighbors(&input, &deals, 10, Utc::now());
        assert_eq!(summary.count, 5);
        assert_eq!(summary.lost_on_price, 1);
        assert_eq!(summary.high_margin_wins, 2);

        let avg = summary.weighted_avg_margin.expect("neighbors present").value();
        assert!(avg > 0.10 && avg < 0.25);
    }

    #[test]
    fn top_k_truncates_to_k_best() {
        let input = base_deal();
        let mut deals = Vec::new();
        for step in 0..8 {
            let mut context = base_deal();
            if step % 2 == 0 {
                context.segment = CustomerSegment::Enterprise;
            }
            deals.push(closed(context, 0.15, true, None, step));
        }

        let summary = top_k_neighbors(&input, &deals, 3, Utc::now());
        assert_eq!(summary.count, 3);
        // Matching-segment deals should dominate the short list.
        assert!(summary
            .neighbors
            .iter()
            .all(|neighbor| neighbor.deal.context.segment == input.segment));
    }

    #[test]
    fn empty_history_yields_an_empty_summary() {
        let summary = top_k_neighbors(&base_deal(), &[], 5, Utc::now());
        assert_eq!(summary.count, 0);
        assert!(summary.weighted_avg_margin.is_none());
    }
}
