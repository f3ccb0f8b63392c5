use crate::domain::order::ServiceId;
use crate::domain::pricing_rule::PricingRule;
use crate::errors::DomainError;

/// What the resolver found among a service's stored rules.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuleResolution {
    Active(PricingRule),
    Missing,
    Conflicting { count: usize },
}

impl RuleResolution {
    pub fn rule(&self) -> Option<&PricingRule> {
        match self {
            Self::Active(rule) => Some(rule),
            Self::Missing | Self::Conflicting { .. } => None,
        }
    }

    pub fn into_result(self, service_id: &ServiceId) -> Result<Option<PricingRule>, DomainError> {
        match self {
            Self::Active(rule) => Ok(Some(rule)),
            Self::Missing => Ok(None),
            Self::Conflicting { count } => {
                Err(DomainError::ConflictingPricingRules { service_id: service_id.clone(), count })
            }
        }
    }
}

/// At most one active rule may price a service; more than one is reported,
/// never resolved by picking one.
pub fn resolve(service_id: &ServiceId, rules: Vec<PricingRule>) -> RuleResolution {
    let mut active: Vec<PricingRule> = rules
        .into_iter()
        .filter(|rule| rule.is_active && rule.service_id == *service_id)
        .collect();

    match active.len() {
        0 => RuleResolution::Missing,
        1 => active.pop().map_or(RuleResolution::Missing, RuleResolution::Active),
        count => RuleResolution::Conflicting { count },
    }
}
