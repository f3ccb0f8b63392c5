use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order::ServiceId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PricingRuleId(pub String);

/// Usage-based price formula for one catalog service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRule {
    pub id: PricingRuleId,
    pub service_id: ServiceId,
    pub base_price_per_sq_meter: Decimal,
    pub min_area: Option<Decimal>,
    pub max_area: Option<Decimal>,
    pub min_length: Option<Decimal>,
    pub max_length: Option<Decimal>,
    pub color_pricing_factor: Option<Decimal>,
    pub is_active: bool,
    /// Human-readable description of the formula. Never evaluated.
    pub formula_description: Option<String>,
}

impl PricingRule {
    pub fn has_area_bounds(&self) -> bool {
        self.min_area.is_some() || self.max_area.is_some()
    }

    pub fn has_length_bounds(&self) -> bool {
        self.min_length.is_some() || self.max_length.is_some()
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.base_price_per_sq_meter < Decimal::ZERO {
            return Err(self.invalid("base_price_per_sq_meter must not be negative"));
        }
        if matches!(self.color_pricing_factor, Some(factor) if factor < Decimal::ZERO) {
            return Err(self.invalid("color_pricing_factor must not be negative"));
        }

        let bounds = [self.min_area, self.max_area, self.min_length, self.max_length];
        if bounds.iter().flatten().any(|bound| *bound < Decimal::ZERO) {
            return Err(self.invalid("range bounds must not be negative"));
        }
        if let (Some(min), Some(max)) = (self.min_area, self.max_area) {
            if min > max {
                return Err(self.invalid("min_area must not exceed max_area"));
            }
        }
        if let (Some(min), Some(max)) = (self.min_length, self.max_length) {
            if min > max {
                return Err(self.invalid("min_length must not exceed max_length"));
            }
        }

        Ok(())
    }

    fn invalid(&self, reason: &str) -> DomainError {
        DomainError::InvalidPricingRule(format!("rule `{}`: {reason}", self.id.0))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{PricingRule, PricingRuleId};
    use crate::domain::order::ServiceId;
    use crate::errors::DomainError;

    fn rule() -> PricingRule {
        PricingRule {
            id: PricingRuleId("PR-1".to_string()),
            service_id: ServiceId("svc-full-wrap".to_string()),
            base_price_per_sq_meter: Decimal::new(100, 0),
            min_area: Some(Decimal::ONE),
            max_area: Some(Decimal::new(20, 0)),
            min_length: None,
            max_length: None,
            color_pricing_factor: Some(Decimal::new(12, 1)),
            is_active: true,
            formula_description: Some("area * base * color factor".to_string()),
        }
    }

    #[test]
    fn well_formed_rule_validates() {
        assert_eq!(rule().validate(), Ok(()));
    }

    #[test]
    fn inverted_area_range_is_rejected() {
        let mut rule = rule();
        rule.min_area = Some(Decimal::new(30, 0));

        let error = rule.validate().expect_err("inverted range must fail");
        assert!(matches!(
            error,
            DomainError::InvalidPricingRule(ref message) if message.contains("min_area")
        ));
    }

    #[test]
    fn negative_factor_is_rejected() {
        let mut rule = rule();
        rule.color_pricing_factor = Some(Decimal::new(-1, 0));

        assert!(rule.validate().is_err());
    }
}
