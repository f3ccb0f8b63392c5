use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome};
use crate::domain::order::{
    OrderId, OrderLine, OrderLineId, PriceSource, ServiceId, UsageMeasurements,
};
use crate::domain::pricing_rule::PricingRule;
use crate::errors::{ApplicationError, DomainError};
use crate::pricing::calculator::{self, PriceComputation, PricingNote, PricingOutcome};
use crate::pricing::rules::{self, RuleResolution};
use crate::runtime::CoreRuntime;
use crate::store::{LineRepricing, LineWrite, OrderStore, PricingRuleStore};

pub const DEFAULT_CURRENCY: &str = "USD";

/// Priced line together with how its price was reached.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LinePricing {
    pub line: OrderLine,
    pub outcome: PricingOutcome,
    pub notes: Vec<PricingNote>,
    pub fallback: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderPricing {
    pub order_id: OrderId,
    pub total_amount: Decimal,
    pub currency: String,
    pub lines: Vec<LinePricing>,
}

impl OrderPricing {
    pub fn fallback_lines(&self) -> impl Iterator<Item = &LinePricing> {
        self.lines.iter().filter(|line| line.fallback)
    }
}

pub struct OrderPricingService<O, R> {
    orders: O,
    rules: R,
    runtime: CoreRuntime,
    currency: String,
}

impl<O, R> OrderPricingService<O, R>
where
    O: OrderStore,
    R: PricingRuleStore,
{
    pub fn new(orders: O, rules: R, runtime: CoreRuntime) -> Self {
        Self { orders, rules, runtime, currency: DEFAULT_CURRENCY.to_owned() }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub async fn list_active_rules(
        &self,
        service_id: &ServiceId,
    ) -> Result<Vec<PricingRule>, ApplicationError> {
        let rules = self.rules.list_rules_for_service(service_id).await?;
        Ok(rules.into_iter().filter(|rule| rule.is_active).collect())
    }

    /// The single active rule for the service, if any.
    pub async fn resolve_rule(
        &self,
        service_id: &ServiceId,
    ) -> Result<Option<PricingRule>, ApplicationError> {
        Ok(self.resolution(service_id).await?.into_result(service_id)?)
    }

    pub async fn save_rule(
        &self,
        rule: PricingRule,
        context: &AuditContext,
    ) -> Result<PricingRule, ApplicationError> {
        rule.validate()?;
        self.rules.save_rule(&rule).await?;

        tracing::info!(
            event_name = "pricing.rule.saved",
            correlation_id = %context.correlation_id,
            rule_id = %rule.id.0,
            service_id = %rule.service_id.0,
            is_active = rule.is_active,
            "pricing rule saved"
        );
        self.runtime.audit.emit(
            AuditEvent::new(
                context,
                "pricing.rule.saved",
                AuditCategory::Pricing,
                AuditOutcome::Success,
                self.runtime.clock.now(),
            )
            .with_metadata("rule_id", rule.id.0.clone())
            .with_metadata("service_id", rule.service_id.0.clone())
            .with_metadata("is_active", rule.is_active.to_string()),
        );
        Ok(rule)
    }

    /// Prices one line without persisting it. The persisted form, which saves
    /// the line and the order total together, is `record_line_usage` for one
    /// measured line and `reprice_order` for the whole order.
    pub async fn apply_to_line(&self, line: &OrderLine) -> Result<LinePricing, ApplicationError> {
        let resolution = self.resolution(&line.service_id).await?;
        Ok(price_line(line, &resolution))
    }

    /// Stores the sum of the order's stored final line prices as its total.
    /// Lines priced by `apply_to_line` are not saved here; `reprice_order`
    /// writes them and the total in one transaction.
    pub async fn recompute_order_total(
        &self,
        order_id: &OrderId,
    ) -> Result<Decimal, ApplicationError> {
        self.ensure_order(order_id).await?;
        self.write_lines(order_id, &[]).await
    }

    /// Stores measurements on a line, reprices it and updates the order
    /// total in one write.
    pub async fn record_line_usage(
        &self,
        order_id: &OrderId,
        line_id: &OrderLineId,
        usage: UsageMeasurements,
        context: &AuditContext,
    ) -> Result<OrderPricing, ApplicationError> {
        if usage.has_negative_value() {
            return Err(DomainError::InvariantViolation(
                "measurements must not be negative".to_owned(),
            )
            .into());
        }

        self.ensure_order(order_id).await?;
        let lines = self.orders.list_lines(order_id).await?;
        let Some(mut line) = lines.into_iter().find(|line| line.id == *line_id) else {
            return Err(ApplicationError::not_found("order line", line_id.0.clone()));
        };
        let read_usage = std::mem::replace(&mut line.usage, usage);

        let resolution = self.resolution(&line.service_id).await?;
        let priced = price_line(&line, &resolution);
        let total_amount = self
            .write_lines(order_id, &[LineRepricing::new(priced.line.clone(), read_usage)])
            .await?;

        let pricing = OrderPricing {
            order_id: order_id.clone(),
            total_amount,
            currency: self.currency.clone(),
            lines: vec![priced],
        };
        self.repriced("pricing.line.measured", &pricing, context);
        Ok(pricing)
    }

    /// Re-applies pricing to every line of the order and recomputes the total
    /// atomically. One unpriceable line does not block the others. A line
    /// measured again since it was read fails the whole write with a
    /// retryable `Conflict`.
    pub async fn reprice_order(
        &self,
        order_id: &OrderId,
        context: &AuditContext,
    ) -> Result<OrderPricing, ApplicationError> {
        self.ensure_order(order_id).await?;
        let lines = self.orders.list_lines(order_id).await?;

        let mut resolutions: HashMap<ServiceId, RuleResolution> = HashMap::new();
        for line in &lines {
            if !resolutions.contains_key(&line.service_id) {
                let resolution = self.resolution(&line.service_id).await?;
                resolutions.insert(line.service_id.clone(), resolution);
            }
        }
        let missing = RuleResolution::Missing;
        let priced: Vec<LinePricing> = lines
            .iter()
            .map(|line| price_line(line, resolutions.get(&line.service_id).unwrap_or(&missing)))
            .collect();

        let updates: Vec<LineRepricing> = lines
            .iter()
            .zip(&priced)
            .map(|(read, pricing)| LineRepricing::new(pricing.line.clone(), read.usage.clone()))
            .collect();
        let total_amount = self.write_lines(order_id, &updates).await?;

        let pricing = OrderPricing {
            order_id: order_id.clone(),
            total_amount,
            currency: self.currency.clone(),
            lines: priced,
        };
        self.repriced("pricing.order.repriced", &pricing, context);
        Ok(pricing)
    }

    async fn resolution(&self, service_id: &ServiceId) -> Result<RuleResolution, ApplicationError> {
        let rules = self.rules.list_rules_for_service(service_id).await?;
        let resolution = rules::resolve(service_id, rules);
        if let RuleResolution::Conflicting { count } = &resolution {
            tracing::error!(
                event_name = "pricing.rule.conflict",
                service_id = %service_id.0,
                active_rules = *count,
                "service has more than one active pricing rule"
            );
        }
        Ok(resolution)
    }

    async fn write_lines(
        &self,
        order_id: &OrderId,
        updates: &[LineRepricing],
    ) -> Result<Decimal, ApplicationError> {
        match self.orders.save_priced_lines(order_id, updates).await? {
            LineWrite::Saved { total_amount } => Ok(total_amount),
            LineWrite::Stale { line_id } => {
                tracing::warn!(
                    event_name = "pricing.line.stale",
                    order_id = %order_id.0,
                    line_id = %line_id.0,
                    "line measurements changed while it was being priced"
                );
                Err(ApplicationError::Conflict { entity: "order line", id: line_id.0 })
            }
        }
    }

    async fn ensure_order(&self, order_id: &OrderId) -> Result<(), ApplicationError> {
        match self.orders.find_order(order_id).await? {
            Some(_) => Ok(()),
            None => Err(ApplicationError::not_found("order", order_id.0.clone())),
        }
    }

    fn repriced(&self, event_type: &str, pricing: &OrderPricing, context: &AuditContext) {
        let fallback_lines = pricing.fallback_lines().count();
        tracing::info!(
            event_name = event_type,
            correlation_id = %context.correlation_id,
            order_id = %pricing.order_id.0,
            total_amount = %pricing.total_amount,
            currency = %pricing.currency,
            lines = pricing.lines.len(),
            fallback_lines,
            "order pricing updated"
        );

        let mut event = AuditEvent::new(
            context,
            event_type,
            AuditCategory::Pricing,
            AuditOutcome::Success,
            self.runtime.clock.now(),
        )
        .for_order(&pricing.order_id)
        .with_metadata("total_amount", pricing.total_amount.to_string())
        .with_metadata("fallback_lines", fallback_lines.to_string());
        for line in &pricing.lines {
            event = event.with_metadata(format!("line:{}", line.line.id.0), line.outcome.as_str());
        }
        self.runtime.audit.emit(event);
    }
}

fn price_line(line: &OrderLine, resolution: &RuleResolution) -> LinePricing {
    let (priced, computation) = match resolution {
        RuleResolution::Conflicting { .. } if line.price_source != PriceSource::Negotiated => {
            let mut priced = line.clone();
            priced.final_calculated_price = line.quoted_price;
            priced.price_source = PriceSource::Catalog;
            let computation = PriceComputation {
                amount: line.quoted_price,
                outcome: PricingOutcome::ConflictingRules,
                notes: Vec::new(),
            };
            (priced, computation)
        }
        _ => calculator::apply_to_line(line, resolution.rule()),
    };

    if computation.outcome.is_fallback() {
        tracing::warn!(
            event_name = "pricing.line.fallback",
            order_id = %line.order_id.0,
            line_id = %line.id.0,
            service_id = %line.service_id.0,
            outcome = computation.outcome.as_str(),
            quoted_price = %line.quoted_price,
            "line kept its quoted price"
        );
    }
    if computation.notes.contains(&PricingNote::LengthBoundsDisagree) {
        tracing::warn!(
            event_name = "pricing.rule.bounds_disagree",
            line_id = %line.id.0,
            service_id = %line.service_id.0,
            "area and length ranges disagree; area range applied"
        );
    }

    LinePricing {
        fallback: computation.outcome.is_fallback(),
        outcome: computation.outcome,
        notes: computation.notes,
        line: priced,
    }
}
