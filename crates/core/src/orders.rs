use rust_decimal::Decimal;
use serde::Serialize;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome};
use crate::domain::order::{
    CustomerId, EmployeeId, Order, OrderId, OrderLine, OrderLineId, OrderStageHistory,
    PriceSource, ServiceId, StageHistoryId, UsageMeasurements, ORDER_STATUS_NEW,
};
use crate::domain::stage::Stage;
use crate::errors::{ApplicationError, DomainError};
use crate::lifecycle::ledger::opening_entry;
use crate::pricing::calculator::order_total;
use crate::runtime::CoreRuntime;
use crate::store::OrderStore;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewOrderLine {
    pub service_id: ServiceId,
    pub quantity: u32,
    pub quoted_price: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewOrder {
    pub customer_id: CustomerId,
    pub assigned_employee_id: Option<EmployeeId>,
    pub lines: Vec<NewOrderLine>,
    pub opened_by: Option<EmployeeId>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderDetails {
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OpenedOrder {
    pub order: Order,
    pub lines: Vec<OrderLine>,
    pub opening_entry: OrderStageHistory,
}

pub struct OrderService<S> {
    store: S,
    runtime: CoreRuntime,
}

impl<S> OrderService<S>
where
    S: OrderStore,
{
    pub fn new(store: S, runtime: CoreRuntime) -> Self {
        Self { store, runtime }
    }

    /// Creates an order at Survey with its lines priced at their quoted
    /// amounts and an opening ledger entry.
    pub async fn open_order(
        &self,
        input: NewOrder,
        context: &AuditContext,
    ) -> Result<OpenedOrder, ApplicationError> {
        if let Some(line) = input.lines.iter().find(|line| line.quoted_price < Decimal::ZERO) {
            return Err(DomainError::InvariantViolation(format!(
                "quoted price for service `{}` must not be negative",
                line.service_id.0
            ))
            .into());
        }

        let now = self.runtime.clock.now();
        let order_id = OrderId(self.runtime.ids.next_id("ORD"));
        let lines: Vec<OrderLine> = input
            .lines
            .into_iter()
            .map(|line| OrderLine {
                id: OrderLineId(self.runtime.ids.next_id("OL")),
                order_id: order_id.clone(),
                service_id: line.service_id,
                quantity: line.quantity,
                usage: UsageMeasurements::default(),
                quoted_price: line.quoted_price,
                final_calculated_price: line.quoted_price,
                price_source: PriceSource::Catalog,
            })
            .collect();

        let order = Order {
            id: order_id.clone(),
            customer_id: input.customer_id,
            assigned_employee_id: input.assigned_employee_id,
            order_date: now,
            total_amount: order_total(&lines),
            order_status: ORDER_STATUS_NEW.to_owned(),
            current_stage: Stage::Survey,
            stage_sequence: 1,
            request_id: None,
        };
        let opening = opening_entry(
            StageHistoryId(self.runtime.ids.next_id("OSH")),
            &order_id,
            now,
            input.opened_by.or_else(|| order.assigned_employee_id.clone()),
            input.notes,
        );

        self.store.create_order(&order, &lines, &opening).await?;

        tracing::info!(
            event_name = "order.opened",
            correlation_id = %context.correlation_id,
            order_id = %order.id.0,
            customer_id = %order.customer_id.0,
            lines = lines.len(),
            total_amount = %order.total_amount,
            "order opened"
        );
        self.runtime.audit.emit(
            AuditEvent::new(
                context,
                "order.opened",
                AuditCategory::Lifecycle,
                AuditOutcome::Success,
                now,
            )
            .for_order(&order.id)
            .with_metadata("total_amount", order.total_amount.to_string())
            .with_metadata("lines", lines.len().to_string()),
        );

        Ok(OpenedOrder { order, lines, opening_entry: opening })
    }

    pub async fn order_details(&self, id: &OrderId) -> Result<OrderDetails, ApplicationError> {
        let order = self.load_order(id).await?;
        let lines = self.store.list_lines(id).await?;
        Ok(OrderDetails { order, lines })
    }

    /// Free-text status label; independent of the production stage.
    pub async fn set_order_status(
        &self,
        id: &OrderId,
        label: &str,
        context: &AuditContext,
    ) -> Result<Order, ApplicationError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(DomainError::InvariantViolation(
                "order status label must not be empty".to_owned(),
            )
            .into());
        }

        let mut order = self.load_order(id).await?;
        let previous = std::mem::replace(&mut order.order_status, label.to_owned());
        self.store.update_order_status(id, label).await?;

        tracing::info!(
            event_name = "order.status_changed",
            correlation_id = %context.correlation_id,
            order_id = %id.0,
            from_status = %previous,
            to_status = %label,
            "order status label changed"
        );
        self.runtime.audit.emit(
            AuditEvent::new(
                context,
                "order.status_changed",
                AuditCategory::Lifecycle,
                AuditOutcome::Success,
                self.runtime.clock.now(),
            )
            .for_order(id)
            .with_metadata("from", previous)
            .with_metadata("to", label),
        );
        Ok(order)
    }

    async fn load_order(&self, id: &OrderId) -> Result<Order, ApplicationError> {
        self.store
            .find_order(id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("order", id.0.clone()))
    }
}
