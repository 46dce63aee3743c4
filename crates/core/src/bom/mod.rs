//! Bill-of-materials margin allocation.
//!
//! Assigns every line a category-policy margin adjusted for deal context,
//! then iteratively redistributes gross profit toward a requested blended
//! target, proportionally to each line's elasticity and cost weight. The
//! redistribution is a capped heuristic fixed-point search: when headroom
//! runs out the allocation reports `target_achieved = false` rather than
//! forcing margins past their floors or ceilings.

use rust_decimal::Decimal;

use crate::domain::bom::{
    BomAllocation, BomCategory, BomContext, BomLine, BomLineAllocation, BomTotals,
};
use crate::domain::deal::{
    CompetitorBucket, CustomerSegment, DealRegistration, RelationshipStrength, ValueAddLevel,
};
use crate::domain::margin::{FractionMargin, PercentMargin};
use crate::domain::recommendation::price_at_margin;

/// Redistribution passes before the optimizer accepts the shortfall.
const MAX_REDISTRIBUTION_PASSES: usize = 5;
/// Blended-margin tolerance, in fraction (0.1 percentage points).
const TARGET_TOLERANCE: f64 = 0.001;

const NO_LINES_INSIGHT: &str = "No BOM lines provided";

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CategoryPolicy {
    pub floor: f64,
    pub ceiling: f64,
    /// How much margin headroom the category absorbs during
    /// redistribution, relative to other categories.
    pub elasticity: f64,
    pub base_target: f64,
}

pub fn category_policy(category: BomCategory) -> CategoryPolicy {
    match category {
        BomCategory::Hardware => {
            CategoryPolicy { floor: 0.05, ceiling: 0.25, elasticity: 0.6, base_target: 0.12 }
        }
        BomCategory::Software => {
            CategoryPolicy { floor: 0.08, ceiling: 0.35, elasticity: 1.2, base_target: 0.18 }
        }
        BomCategory::Cloud => {
            CategoryPolicy { floor: 0.06, ceiling: 0.30, elasticity: 1.0, base_target: 0.14 }
        }
        BomCategory::ProfessionalServices => {
            CategoryPolicy { floor: 0.15, ceiling: 0.45, elasticity: 1.5, base_target: 0.25 }
        }
        BomCategory::ManagedServices => {
            CategoryPolicy { floor: 0.12, ceiling: 0.40, elasticity: 1.3, base_target: 0.22 }
        }
        BomCategory::ComplexSolution => {
            CategoryPolicy { floor: 0.10, ceiling: 0.35, elasticity: 1.0, base_target: 0.17 }
        }
        BomCategory::Other => {
            CategoryPolicy { floor: 0.05, ceiling: 0.25, elasticity: 0.5, base_target: 0.10 }
        }
    }
}

fn context_adjustment(context: &BomContext) -> f64 {
    let mut adjustment = 0.0;

    adjustment += match context.registration {
        Some(DealRegistration::Registered) => 0.01,
        Some(DealRegistration::Premium) => 0.02,
        Some(DealRegistration::NotRegistered) | None => 0.0,
    };
    adjustment += match context.relationship {
        Some(RelationshipStrength::New) => -0.005,
        Some(RelationshipStrength::Established) => 0.005,
        Some(RelationshipStrength::Strategic) => 0.01,
        Some(RelationshipStrength::Developing) | None => 0.0,
    };
    adjustment += match context.value_add {
        Some(ValueAddLevel::None) => -0.005,
        Some(ValueAddLevel::Moderate) => 0.005,
        Some(ValueAddLevel::Extensive) => 0.01,
        Some(ValueAddLevel::Basic) | None => 0.0,
    };
    adjustment += match context.competitor_bucket {
        Some(CompetitorBucket::None) => 0.005,
        Some(CompetitorBucket::Two) => -0.01,
        Some(CompetitorBucket::ThreeOrMore) => -0.02,
        Some(CompetitorBucket::One) | None => 0.0,
    };
    adjustment += match context.segment {
        Some(CustomerSegment::Smb) => 0.01,
        Some(CustomerSegment::Enterprise) => -0.01,
        Some(CustomerSegment::MidMarket) | None => 0.0,
    };

    adjustment
}

struct WorkingLine {
    category: BomCategory,
    policy: CategoryPolicy,
    cost: f64,
    margin: f64,
    adjusted_for_target: bool,
}

impl WorkingLine {
    fn gross_profit(&self) -> f64 {
        self.cost * self.margin / (1.0 - self.margin)
    }
}

fn blended_margin(lines: &[WorkingLine]) -> f64 {
    let total_price: f64 = lines.iter().map(|line| line.cost / (1.0 - line.margin)).sum();
    let total_cost: f64 = lines.iter().map(|line| line.cost).sum();
    if total_price > 0.0 {
        (total_price - total_cost) / total_price
    } else {
        0.0
    }
}

/// Push line margins toward the target blended margin. Returns early once
/// the remaining delta is inside tolerance or no line has headroom left.
fn redistribute(lines: &mut [WorkingLine], target: f64) {
    for _ in 0..MAX_REDISTRIBUTION_PASSES {
        let blended = blended_margin(lines);
        if (blended - target).abs() <= TARGET_TOLERANCE {
            return;
        }

        let total_cost: f64 = lines.iter().map(|line| line.cost).sum();
        let current_gp: f64 = lines.iter().map(WorkingLine::gross_profit).sum();
        let required_gp = total_cost / (1.0 - target) - total_cost;
        let gp_delta = required_gp - current_gp;

        let needs_more = gp_delta > 0.0;
        let headroom = |line: &WorkingLine| {
            if needs_more {
                line.margin < line.policy.ceiling - 1e-12
            } else {
                line.margin > line.policy.floor + 1e-12
            }
        };

        let total_weight: f64 = lines
            .iter()
            .filter(|line| headroom(line))
            .map(|line| line.policy.elasticity * line.cost)
            .sum();
        if total_weight <= 0.0 {
            return;
        }

        for line in lines.iter_mut() {
            if line.cost <= 0.0 || !headroom(line) {
                continue;
            }
            let share = gp_delta * line.policy.elasticity * line.cost / total_weight;
            let new_gp = (line.gross_profit() + share).max(0.0);
            let new_margin = new_gp / (line.cost + new_gp);
            let clamped = new_margin.clamp(line.policy.floor, line.policy.ceiling);
            if (clamped - line.margin).abs() > 1e-12 {
                line.margin = clamped;
                line.adjusted_for_target = true;
            }
        }
    }
}

fn line_rationale(line: &WorkingLine, adjustment: f64) -> String {
    let mut rationale = format!(
        "Category target {:.1}% within floor {:.1}% and ceiling {:.1}%",
        line.policy.base_target * 100.0,
        line.policy.floor * 100.0,
        line.policy.ceiling * 100.0
    );
    if adjustment != 0.0 {
        rationale.push_str(&format!("; deal context shifted {:+.1} points", adjustment * 100.0));
    }
    if line.adjusted_for_target {
        if line.margin >= line.policy.ceiling - 1e-12 {
            rationale.push_str("; raised to the category ceiling for the blended target");
        } else if line.margin <= line.policy.floor + 1e-12 {
            rationale.push_str("; lowered to the category floor for the blended target");
        } else {
            rationale.push_str("; rebalanced toward the blended target");
        }
    }
    rationale
}

fn zero_totals(target: Option<f64>) -> BomTotals {
    BomTotals {
        total_cost: Decimal::ZERO,
        total_price: Decimal::ZERO,
        total_gross_profit: Decimal::ZERO,
        blended_margin_pct: PercentMargin(0.0),
        target_achieved: false,
        gap_pct: target.map_or(0.0, |value| value * 100.0),
    }
}

/// Allocate margin across a bill of materials.
pub fn optimize_bom(lines: &[BomLine], context: &BomContext) -> BomAllocation {
    let target = context.target_blended_margin.map(|pct| pct.as_fraction().value());

    if lines.is_empty() {
        return BomAllocation {
            lines: Vec::new(),
            totals: zero_totals(target),
            health_score: 50,
            insights: vec![NO_LINES_INSIGHT.to_owned()],
        };
    }

    let adjustment = context_adjustment(context);
    let mut working: Vec<WorkingLine> = lines
        .iter()
        .map(|line| {
            let policy = category_policy(line.category);
            let initial =
                (policy.base_target + adjustment).clamp(policy.floor, policy.ceiling);
            WorkingLine {
                category: line.category,
                policy,
                cost: line.extended_cost().try_into().unwrap_or(0.0),
                margin: initial,
                adjusted_for_target: false,
            }
        })
        .collect();

    let total_cost_f64: f64 = working.iter().map(|line| line.cost).sum();
    if total_cost_f64 <= 0.0 {
        let allocations = lines
            .iter()
            .zip(working.iter())
            .map(|(line, work)| BomLineAllocation {
                category: line.category,
                quantity: line.quantity,
                unit_cost: line.unit_cost,
                recommended_margin_pct: FractionMargin(work.margin).as_percent(),
                floor_pct: FractionMargin(work.policy.floor).as_percent(),
                extended_cost: Decimal::ZERO,
                extended_price: Decimal::ZERO,
                gross_profit: Decimal::ZERO,
                rationale: line_rationale(work, adjustment),
            })
            .collect();
        return BomAllocation {
            lines: allocations,
            totals: zero_totals(target),
            health_score: 40,
            insights: vec!["All lines carry zero cost".to_owned()],
        };
    }

    if let Some(target) = target {
        if (blended_margin(&working) - target).abs() > TARGET_TOLERANCE {
            redistribute(&mut working, target);
        }
    }

    let mut total_cost = Decimal::ZERO;
    let mut total_price = Decimal::ZERO;
    let allocations: Vec<BomLineAllocation> = lines
        .iter()
        .zip(working.iter())
        .map(|(line, work)| {
            let extended_cost = line.extended_cost();
            let margin = FractionMargin(work.margin);
            let extended_price = price_at_margin(extended_cost, margin);
            total_cost += extended_cost;
            total_price += extended_price;
            BomLineAllocation {
                category: line.category,
                quantity: line.quantity,
                unit_cost: line.unit_cost,
                recommended_margin_pct: margin.as_percent(),
                floor_pct: FractionMargin(work.policy.floor).as_percent(),
                extended_cost,
                extended_price,
                gross_profit: extended_price - extended_cost,
                rationale: line_rationale(work, adjustment),
            }
        })
        .collect();

    let total_price_f64: f64 = total_price.try_into().unwrap_or(0.0);
    let blended = if total_price_f64 > 0.0 {
        (total_price_f64 - total_cost_f64) / total_price_f64
    } else {
        0.0
    };

    let (target_achieved, gap_pct) = match target {
        Some(target) => {
            let gap = target - blended;
            (gap.abs() <= TARGET_TOLERANCE, gap * 100.0)
        }
        None => (true, 0.0),
    };

    let totals = BomTotals {
        total_cost,
        total_price,
        total_gross_profit: total_price - total_cost,
        blended_margin_pct: FractionMargin(blended).as_percent(),
        target_achieved,
        gap_pct,
    };

    let health_score = health_score(context, &working, target, target_achieved, total_cost_f64);
    let insights =
        build_insights(context, &working, target, target_achieved, gap_pct, total_cost_f64);

    BomAllocation { lines: allocations, totals, health_score, insights }
}

fn hardware_cost_share(working: &[WorkingLine], total_cost: f64) -> f64 {
    let hardware_cost: f64 = working
        .iter()
        .filter(|line| line.category == BomCategory::Hardware)
        .map(|line| line.cost)
        .sum();
    if total_cost > 0.0 {
        hardware_cost / total_cost
    } else {
        0.0
    }
}

fn margin_spread(working: &[WorkingLine]) -> f64 {
    let max = working.iter().map(|line| line.margin).fold(f64::MIN, f64::max);
    let min = working.iter().map(|line| line.margin).fold(f64::MAX, f64::min);
    (max - min).max(0.0)
}

fn all_at_floor(working: &[WorkingLine]) -> bool {
    working.iter().all(|line| line.margin <= line.policy.floor + 1e-9)
}

fn health_score(
    context: &BomContext,
    working: &[WorkingLine],
    target: Option<f64>,
    target_achieved: bool,
    total_cost: f64,
) -> u8 {
    let mut score: i32 = 50;

    if target.is_some() {
        score += if target_achieved { 10 } else { -10 };
    }
    if matches!(
        context.registration,
        Some(DealRegistration::Registered) | Some(DealRegistration::Premium)
    ) {
        score += 5;
    }
    if matches!(context.value_add, Some(ValueAddLevel::Moderate) | Some(ValueAddLevel::Extensive))
    {
        score += 5;
    }
    if matches!(
        context.relationship,
        Some(RelationshipStrength::Established) | Some(RelationshipStrength::Strategic)
    ) {
        score += 5;
    }
    if context.competitor_bucket.is_some_and(CompetitorBucket::is_competitive) {
        score -= 5;
    }
    if all_at_floor(working) {
        score -= 10;
    }
    if hardware_cost_share(working, total_cost) > 0.7 {
        score -= 5;
    }
    if margin_spread(working) > 0.25 {
        score -= 5;
    }

    score.clamp(0, 100) as u8
}

fn build_insights(
    context: &BomContext,
    working: &[WorkingLine],
    target: Option<f64>,
    target_achieved: bool,
    gap_pct: f64,
    total_cost: f64,
) -> Vec<String> {
    let mut insights: Vec<String> = Vec::new();
    let mut push = |insight: String| {
        if !insights.contains(&insight) {
            insights.push(insight);
        }
    };

    match target {
        Some(_) if target_achieved => {
            push("Blended margin target met within tolerance".to_owned());
        }
        Some(_) => {
            if gap_pct > 0.0 {
                push(format!(
                    "Blended margin falls {:.1} points short of target; category ceilings limit headroom",
                    gap_pct
                ));
            } else {
                push(format!(
                    "Blended margin overshoots target by {:.1} points; category floors prevent further discounting",
                    -gap_pct
                ));
            }
        }
        None => {}
    }

    if all_at_floor(working) {
        push("Every line sits at its category floor; no remaining discount room".to_owned());
    }
    if hardware_cost_share(working, total_cost) > 0.7 {
        push("Hardware dominates the cost base, capping the achievable blended margin".to_owned());
    }
    if margin_spread(working) > 0.25 {
        push("Wide margin spread across lines; review outliers before quoting".to_owned());
    }
    if context.competitor_bucket.is_some_and(CompetitorBucket::is_competitive)
        && matches!(context.registration, Some(DealRegistration::NotRegistered) | None)
    {
        push("Unregistered deal in a competitive field compresses line margins".to_owned());
    }

    if insights.is_empty() {
        insights.push("Allocation within standard guardrails".to_owned());
    }
    insights
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{category_policy, optimize_bom};
    use crate::domain::bom::{BomCategory, BomContext, BomLine};
    use crate::domain::margin::PercentMargin;

    fn line(category: BomCategory, quantity: u32, unit_cost: i64) -> BomLine {
        BomLine { category, quantity, unit_cost: Decimal::new(unit_cost * 100, 2), description: None }
    }

    #[test]
    fn empty_bom_returns_well_formed_zero_totals() {
        let allocation = optimize_bom(&[], &BomContext::default());

        assert_eq!(allocation.totals.total_cost, Decimal::ZERO);
        assert_eq!(allocation.totals.total_price, Decimal::ZERO);
        assert!(!allocation.totals.target_achieved);
        assert_eq!(allocation.insights, vec!["No BOM lines provided".to_owned()]);
    }

    #[test]
    fn category_floors_match_policy() {
        let expectations = [
            (BomCategory::Hardware, 0.05),
            (BomCategory::Software, 0.08),
            (BomCategory::Cloud, 0.06),
            (BomCategory::ProfessionalServices, 0.15),
            (BomCategory::ManagedServices, 0.12),
            (BomCategory::ComplexSolution, 0.10),
            (BomCategory::Other, 0.05),
        ];
        for (category, floor) in expectations {
            assert_eq!(category_policy(category).floor, floor);
        }
    }

    #[test]
    fn recommended_margin_never_drops_below_floor() {
        // An absurdly low target forces every line toward its floor.
        let lines = vec![
            line(BomCategory::Hardware, 10, 5_000),
            line(BomCategory::Software, 5, 2_000),
            line(BomCategory::ProfessionalServices, 40, 200),
        ];
        let context = BomContext {
            target_blended_margin: Some(PercentMargin(1.0)),
            ..BomContext::default()
        };

        let allocation = optimize_bom(&lines, &context);
        assert!(!allocation.totals.target_achieved);
        for allocated in &allocation.lines {
            assert!(
                allocated.recommended_margin_pct.value() >= allocated.floor_pct.value() - 1e-9,
                "{:?} fell below floor",
                allocated.category
            );
        }
    }

    #[test]
    fn price_and_profit_identities_hold_per_line() {
        let lines = vec![line(BomCategory::Software, 3, 4_000)];
        let allocation = optimize_bom(&lines, &BomContext::default());

        let allocated = &allocation.lines[0];
        let margin = allocated.recommended_margin_pct.as_fraction().value();
        let cost: f64 = allocated.extended_cost.try_into().unwrap();
        let price: f64 = allocated.extended_price.try_into().unwrap();
        let gross_profit: f64 = allocated.gross_profit.try_into().unwrap();

        assert!((price - cost / (1.0 - margin)).abs() < 0.01);
        assert!((gross_profit - (price - cost)).abs() < 1e-9);
    }

    #[test]
    fn reference_scenario_hits_its_fifteen_point_target() {
        let lines = vec![
            line(BomCategory::Hardware, 10, 5_717),
            line(BomCategory::ProfessionalServices, 80, 175),
        ];
        let context = BomContext {
            target_blended_margin: Some(PercentMargin(15.0)),
            ..BomContext::default()
        };

        let allocation = optimize_bom(&lines, &context);
        assert!(allocation.totals.target_achieved);
        assert!(
            (allocation.totals.blended_margin_pct.value() - 15.0).abs() < 0.2,
            "blended {:?}",
            allocation.totals.blended_margin_pct
        );
    }

    #[test]
    fn unreachable_target_reports_the_gap() {
        let lines = vec![line(BomCategory::Hardware, 1, 100_000)];
        let context = BomContext {
            target_blended_margin: Some(PercentMargin(50.0)),
            ..BomContext::default()
        };

        let allocation = optimize_bom(&lines, &context);
        assert!(!allocation.totals.target_achieved);
        assert!(allocation.totals.gap_pct > 0.0);
        // Hardware tops out at its 25% ceiling.
        assert!((allocation.lines[0].recommended_margin_pct.value() - 25.0).abs() < 1e-6);
        assert!(allocation
            .insights
            .iter()
            .any(|insight| insight.contains("short of target")));
    }

    #[test]
    fn zero_cost_lines_stay_finite() {
        let lines = vec![line(BomCategory::Cloud, 5, 0)];
        let allocation = optimize_bom(&lines, &BomContext::default());

        assert_eq!(allocation.totals.total_cost, Decimal::ZERO);
        assert_eq!(allocation.totals.blended_margin_pct, PercentMargin(0.0));
        assert!(!allocation.totals.target_achieved);
        assert!(allocation.totals.gap_pct.is_finite());
    }

    #[test]
    fn health_score_stays_within_bounds() {
        let lines = vec![
            line(BomCategory::Hardware, 100, 9_000),
            line(BomCategory::ProfessionalServices, 1, 100),
        ];
        let context = BomContext {
            target_blended_margin: Some(PercentMargin(45.0)),
            competitor_bucket: Some(crate::domain::deal::CompetitorBucket::ThreeOrMore),
            ..BomContext::default()
        };

        let allocation = optimize_bom(&lines, &context);
        assert!(allocation.health_score <= 100);
        assert!(!allocation.insights.is_empty());
    }

    #[test]
    fn feasible_target_converges_within_the_pass_cap() {
        let lines = vec![
            line(BomCategory::Hardware, 4, 10_000),
            line(BomCategory::Software, 10, 1_500),
            line(BomCategory::ManagedServices, 12, 800),
        ];
        let context = BomContext {
            target_blended_margin: Some(PercentMargin(20.0)),
            ..BomContext::default()
        };

        let allocation = optimize_bom(&lines, &context);
        assert!(allocation.totals.target_achieved, "gap {:?}", allocation.totals.gap_pct);
    }
}
