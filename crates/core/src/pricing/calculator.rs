use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::order::{OrderLine, PriceSource, UsageMeasurements};
use crate::domain::pricing_rule::PricingRule;

/// Minor-unit precision of every currency the shop bills in.
pub const MONEY_SCALE: u32 = 2;

/// Why a line ended up with the price it has.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingOutcome {
    RuleApplied,
    NoRule,
    RuleInactive,
    InvalidRule,
    ConflictingRules,
    InsufficientMeasurementData,
    OutOfRange,
    Negotiated,
}

impl PricingOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RuleApplied => "rule_applied",
            Self::NoRule => "no_rule",
            Self::RuleInactive => "rule_inactive",
            Self::InvalidRule => "invalid_rule",
            Self::ConflictingRules => "conflicting_rules",
            Self::InsufficientMeasurementData => "insufficient_measurement_data",
            Self::OutOfRange => "out_of_range",
            Self::Negotiated => "negotiated",
        }
    }

    /// True when a usage rule was expected to price the line but the quoted
    /// price had to be kept instead.
    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            Self::InvalidRule
                | Self::ConflictingRules
                | Self::InsufficientMeasurementData
                | Self::OutOfRange
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingNote {
    /// Area and length ranges disagreed; the area range decided.
    LengthBoundsDisagree,
    AreaDerivedFromDimensions,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceComputation {
    pub amount: Decimal,
    pub outcome: PricingOutcome,
    pub notes: Vec<PricingNote>,
}

impl PriceComputation {
    fn fallback(quoted_price: Decimal, outcome: PricingOutcome, notes: Vec<PricingNote>) -> Self {
        Self { amount: quoted_price, outcome, notes }
    }
}

pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Usage-based price of a line, or its quoted price when the rule cannot be
/// applied to the measurements.
pub fn compute(
    rule: Option<&PricingRule>,
    quoted_price: Decimal,
    quantity: u32,
    usage: &UsageMeasurements,
) -> PriceComputation {
    let mut notes = Vec::new();

    let Some(rule) = rule else {
        return PriceComputation::fallback(quoted_price, PricingOutcome::NoRule, notes);
    };
    if !rule.is_active {
        return PriceComputation::fallback(quoted_price, PricingOutcome::RuleInactive, notes);
    }
    if rule.validate().is_err() {
        return PriceComputation::fallback(quoted_price, PricingOutcome::InvalidRule, notes);
    }

    let area = match (usage.area, usage.length, usage.width) {
        (Some(area), _, _) => Some(area),
        (None, Some(length), Some(width)) => {
            notes.push(PricingNote::AreaDerivedFromDimensions);
            Some(length * width)
        }
        _ => None,
    };
    let Some(area) = area.filter(|area| *area > Decimal::ZERO) else {
        return PriceComputation::fallback(
            quoted_price,
            PricingOutcome::InsufficientMeasurementData,
            notes,
        );
    };

    let area_fits = rule
        .has_area_bounds()
        .then(|| within(area, rule.min_area, rule.max_area));
    let length_fits = usage
        .length
        .filter(|_| rule.has_length_bounds())
        .map(|length| within(length, rule.min_length, rule.max_length));

    let applicable = match (area_fits, length_fits) {
        (Some(area_fits), Some(length_fits)) => {
            if area_fits != length_fits {
                notes.push(PricingNote::LengthBoundsDisagree);
            }
            area_fits
        }
        (Some(fits), None) | (None, Some(fits)) => fits,
        (None, None) => true,
    };
    if !applicable {
        return PriceComputation::fallback(quoted_price, PricingOutcome::OutOfRange, notes);
    }

    let mut amount = area * rule.base_price_per_sq_meter;
    if let Some(factor) = rule.color_pricing_factor {
        amount *= factor;
    }
    amount *= Decimal::from(quantity);

    PriceComputation {
        amount: round_money(amount).max(Decimal::ZERO),
        outcome: PricingOutcome::RuleApplied,
        notes,
    }
}

/// Prices a line against an already resolved rule. Negotiated lines keep
/// their final price.
pub fn apply_to_line(
    line: &OrderLine,
    rule: Option<&PricingRule>,
) -> (OrderLine, PriceComputation) {
    let mut priced = line.clone();
    if line.price_source == PriceSource::Negotiated {
        let computation = PriceComputation {
            amount: line.final_calculated_price,
            outcome: PricingOutcome::Negotiated,
            notes: Vec::new(),
        };
        return (priced, computation);
    }

    let computation = compute(rule, line.quoted_price, line.quantity, &line.usage);
    priced.final_calculated_price = computation.amount;
    priced.price_source = match computation.outcome {
        PricingOutcome::RuleApplied => PriceSource::Usage,
        _ => PriceSource::Catalog,
    };
    (priced, computation)
}

pub fn order_total<'a>(lines: impl IntoIterator<Item = &'a OrderLine>) -> Decimal {
    lines.into_iter().map(|line| line.final_calculated_price).sum()
}

fn within(value: Decimal, min: Option<Decimal>, max: Option<Decimal>) -> bool {
    min.map_or(true, |min| value >= min) && max.map_or(true, |max| value <= max)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::{apply_to_line, compute, order_total, round_money, PricingNote, PricingOutcome};
    use crate::domain::order::{
        OrderId, OrderLine, OrderLineId, PriceSource, ServiceId, UsageMeasurements,
    };
    use crate::domain::pricing_rule::{PricingRule, PricingRuleId};

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).expect("decimal literal")
    }

    fn rule() -> PricingRule {
        PricingRule {
            id: PricingRuleId("PR-WRAP".to_string()),
            service_id: ServiceId("svc-wrap".to_string()),
            base_price_per_sq_meter: dec("100"),
            min_area: None,
            max_area: None,
            min_length: None,
            max_length: None,
            color_pricing_factor: Some(dec("1.2")),
            is_active: true,
            formula_description: None,
        }
    }

    fn area(value: &str) -> UsageMeasurements {
        UsageMeasurements { area: Some(dec(value)), length: None, width: None }
    }

    fn line(quoted: &str, source: PriceSource) -> OrderLine {
        OrderLine {
            id: OrderLineId("OL-1".to_string()),
            order_id: OrderId("ORD-1".to_string()),
            service_id: ServiceId("svc-wrap".to_string()),
            quantity: 1,
            usage: UsageMeasurements::default(),
            quoted_price: dec(quoted),
            final_calculated_price: dec(quoted),
            price_source: source,
        }
    }

    #[test]
    fn area_times_base_times_factor() {
        let rule = rule();
        let result = compute(Some(&rule), dec("250"), 1, &area("2.5"));

        assert_eq!(result.outcome, PricingOutcome::RuleApplied);
        assert_eq!(result.amount, dec("300.00"));
    }

    #[test]
    fn quantity_multiplies_the_line_amount() {
        let mut rule = rule();
        rule.color_pricing_factor = None;
        let result = compute(Some(&rule), dec("0"), 3, &area("1.5"));

        assert_eq!(result.amount, dec("450.00"));
    }

    #[test]
    fn rounds_half_up_to_two_places() {
        assert_eq!(round_money(dec("10.005")), dec("10.01"));
        assert_eq!(round_money(dec("10.004")), dec("10.00"));

        let mut rule = rule();
        rule.base_price_per_sq_meter = dec("33.333");
        rule.color_pricing_factor = None;
        let result = compute(Some(&rule), dec("0"), 1, &area("1.5"));
        assert_eq!(result.amount, dec("50.00"));
    }

    #[test]
    fn area_is_derived_from_length_and_width() {
        let rule = rule();
        let usage =
            UsageMeasurements { area: None, length: Some(dec("2")), width: Some(dec("1.25")) };
        let result = compute(Some(&rule), dec("10"), 1, &usage);

        assert_eq!(result.amount, dec("300.00"));
        assert_eq!(result.notes, vec![PricingNote::AreaDerivedFromDimensions]);
    }

    #[test]
    fn missing_measurements_fall_back_to_quoted_price_with_flag() {
        let rule = rule();
        let result = compute(Some(&rule), dec("199.99"), 1, &UsageMeasurements::default());

        assert_eq!(result.amount, dec("199.99"));
        assert_eq!(result.outcome, PricingOutcome::InsufficientMeasurementData);
        assert!(result.outcome.is_fallback());
    }

    #[test]
    fn length_without_width_is_insufficient() {
        let rule = rule();
        let usage = UsageMeasurements { area: None, length: Some(dec("3")), width: None };

        let result = compute(Some(&rule), dec("80"), 1, &usage);
        assert_eq!(result.outcome, PricingOutcome::InsufficientMeasurementData);
        assert_eq!(result.amount, dec("80"));
    }

    #[test]
    fn absent_or_inactive_rule_keeps_quoted_price_without_fallback_flag() {
        let result = compute(None, dec("45.50"), 2, &area("3"));
        assert_eq!(result.amount, dec("45.50"));
        assert_eq!(result.outcome, PricingOutcome::NoRule);
        assert!(!result.outcome.is_fallback());

        let mut inactive = rule();
        inactive.is_active = false;
        let result = compute(Some(&inactive), dec("45.50"), 2, &area("3"));
        assert_eq!(result.outcome, PricingOutcome::RuleInactive);
        assert_eq!(result.amount, dec("45.50"));
    }

    #[test]
    fn area_outside_closed_range_falls_back() {
        let mut rule = rule();
        rule.min_area = Some(dec("1"));
        rule.max_area = Some(dec("2.5"));

        for boundary in ["1", "2.5"] {
            let result = compute(Some(&rule), dec("5"), 1, &area(boundary));
            assert_eq!(result.outcome, PricingOutcome::RuleApplied);
        }

        let result = compute(Some(&rule), dec("5"), 1, &area("2.51"));
        assert_eq!(result.outcome, PricingOutcome::OutOfRange);
        assert_eq!(result.amount, dec("5"));
    }

    #[test]
    fn length_range_applies_when_no_area_range_is_set() {
        let mut rule = rule();
        rule.max_length = Some(dec("2"));
        let usage =
            UsageMeasurements { area: None, length: Some(dec("3")), width: Some(dec("0.5")) };

        let result = compute(Some(&rule), dec("12"), 1, &usage);
        assert_eq!(result.outcome, PricingOutcome::OutOfRange);
    }

    #[test]
    fn area_range_wins_when_ranges_disagree() {
        let mut rule = rule();
        rule.max_area = Some(dec("10"));
        rule.max_length = Some(dec("2"));
        let usage = UsageMeasurements {
            area: Some(dec("2.5")),
            length: Some(dec("5")),
            width: Some(dec("0.5")),
        };

        let result = compute(Some(&rule), dec("1"), 1, &usage);
        assert_eq!(result.outcome, PricingOutcome::RuleApplied);
        assert_eq!(result.amount, dec("300.00"));
        assert_eq!(result.notes, vec![PricingNote::LengthBoundsDisagree]);
    }

    #[test]
    fn malformed_rule_is_a_fallback() {
        let mut rule = rule();
        rule.min_area = Some(dec("5"));
        rule.max_area = Some(dec("1"));

        let result = compute(Some(&rule), dec("70"), 1, &area("2"));
        assert_eq!(result.outcome, PricingOutcome::InvalidRule);
        assert_eq!(result.amount, dec("70"));
    }

    #[test]
    fn applied_rule_marks_line_as_usage_priced() {
        let rule = rule();
        let mut measured = line("250", PriceSource::Catalog);
        measured.usage = area("2.5");

        let (priced, computation) = apply_to_line(&measured, Some(&rule));
        assert_eq!(computation.outcome, PricingOutcome::RuleApplied);
        assert_eq!(priced.final_calculated_price, dec("300.00"));
        assert_eq!(priced.price_source, PriceSource::Usage);
    }

    #[test]
    fn negotiated_line_is_left_alone() {
        let rule = rule();
        let mut negotiated = line("1200", PriceSource::Negotiated);
        negotiated.usage = area("2.5");

        let (priced, computation) = apply_to_line(&negotiated, Some(&rule));
        assert_eq!(computation.outcome, PricingOutcome::Negotiated);
        assert_eq!(priced, negotiated);
    }

    #[test]
    fn total_sums_final_prices() {
        let mut first = line("100", PriceSource::Catalog);
        first.final_calculated_price = dec("300.00");
        let second = line("49.99", PriceSource::Catalog);

        assert_eq!(order_total([&first, &second]), dec("349.99"));
        assert_eq!(order_total(&Vec::<OrderLine>::new()), Decimal::ZERO);
    }
}
