use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome};
use crate::domain::order::{
    EmployeeId, Order, OrderId, OrderLine, OrderLineId, OrderStageHistory, PriceSource,
    ServiceId, StageHistoryId, UsageMeasurements, ORDER_STATUS_NEW,
};
use crate::domain::service_request::{CustomServiceRequest, RequestId, RequestStatus};
use crate::domain::stage::Stage;
use crate::errors::{ApplicationError, DomainError};
use crate::lifecycle::ledger::opening_entry;
use crate::requests::intake::load_request;
use crate::runtime::CoreRuntime;
use crate::store::{ConversionCommit, ConversionOutcome, ServiceRequestStore};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversionInput {
    pub request_id: RequestId,
    pub assigned_employee_id: EmployeeId,
    pub final_estimated_cost: Decimal,
    pub final_estimated_work_units: Decimal,
    pub custom_service_id: ServiceId,
}

/// Everything created or changed by a successful conversion.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConvertedRequest {
    pub order: Order,
    pub line: OrderLine,
    pub opening_entry: OrderStageHistory,
    pub request: CustomServiceRequest,
}

/// Turns an accepted custom request into a billable order in one atomic write.
pub struct RequestConversionWorkflow<S> {
    store: S,
    runtime: CoreRuntime,
}

impl<S> RequestConversionWorkflow<S>
where
    S: ServiceRequestStore,
{
    pub fn new(store: S, runtime: CoreRuntime) -> Self {
        Self { store, runtime }
    }

    pub async fn convert_to_order(
        &self,
        input: ConversionInput,
        context: &AuditContext,
    ) -> Result<ConvertedRequest, ApplicationError> {
        let request = load_request(&self.store, &input.request_id).await?;
        if let Err(error) = request.ensure_convertible() {
            self.rejected(&request.id, &error, context);
            return Err(error.into());
        }
        let quantity = quantity_from_work_units(input.final_estimated_work_units)?;
        if input.final_estimated_cost < Decimal::ZERO {
            return Err(DomainError::InvariantViolation(
                "final estimated cost must not be negative".to_owned(),
            )
            .into());
        }

        let now = self.runtime.clock.now();
        let order_id = OrderId(self.runtime.ids.next_id("ORD"));
        let order = Order {
            id: order_id.clone(),
            customer_id: request.customer_id.clone(),
            assigned_employee_id: Some(input.assigned_employee_id.clone()),
            order_date: now,
            total_amount: input.final_estimated_cost,
            order_status: ORDER_STATUS_NEW.to_owned(),
            current_stage: Stage::Survey,
            stage_sequence: 1,
            request_id: Some(request.id.clone()),
        };
        let line = OrderLine {
            id: OrderLineId(self.runtime.ids.next_id("OL")),
            order_id: order_id.clone(),
            service_id: input.custom_service_id.clone(),
            quantity,
            usage: UsageMeasurements::default(),
            quoted_price: input.final_estimated_cost,
            final_calculated_price: input.final_estimated_cost,
            price_source: PriceSource::Negotiated,
        };
        let opening = opening_entry(
            StageHistoryId(self.runtime.ids.next_id("OSH")),
            &order_id,
            now,
            Some(input.assigned_employee_id.clone()),
            Some(format!("order opened from request {}", request.id.0)),
        );

        let mut converted = request.clone();
        converted.order_id = Some(order_id.clone());
        converted.status = RequestStatus::ConvertedToOrder;
        converted.updated_at = now.max(request.updated_at);

        let commit = ConversionCommit {
            order,
            line,
            opening_entry: opening,
            request: converted,
        };
        match self.store.commit_conversion(&commit).await? {
            ConversionOutcome::Committed => {}
            ConversionOutcome::Rejected { status, order_id } => {
                let error = match (status, order_id) {
                    (RequestStatus::ConvertedToOrder, _) => {
                        DomainError::AlreadyConverted { request_id: request.id.clone() }
                    }
                    (_, Some(order_id)) => {
                        DomainError::AlreadyLinked { request_id: request.id.clone(), order_id }
                    }
                    (status, None) => {
                        DomainError::RequestClosed { request_id: request.id.clone(), status }
                    }
                };
                self.rejected(&request.id, &error, context);
                return Err(error.into());
            }
        }

        self.converted(&commit, context);
        let ConversionCommit { order, line, opening_entry, request } = commit;
        Ok(ConvertedRequest { order, line, opening_entry, request })
    }

    fn converted(&self, commit: &ConversionCommit, context: &AuditContext) {
        tracing::info!(
            event_name = "request.converted",
            correlation_id = %context.correlation_id,
            request_id = %commit.request.id.0,
            order_id = %commit.order.id.0,
            total_amount = %commit.order.total_amount,
            quantity = commit.line.quantity,
            "custom service request converted to order"
        );
        self.runtime.audit.emit(
            AuditEvent::new(
                context,
                "request.converted",
                AuditCategory::Conversion,
                AuditOutcome::Success,
                commit.order.order_date,
            )
            .for_order(&commit.order.id)
            .for_request(&commit.request.id)
            .with_metadata("total_amount", commit.order.total_amount.to_string())
            .with_metadata("service_id", commit.line.service_id.0.clone()),
        );
    }

    fn rejected(&self, request_id: &RequestId, error: &DomainError, context: &AuditContext) {
        tracing::warn!(
            event_name = "request.conversion_rejected",
            correlation_id = %context.correlation_id,
            request_id = %request_id.0,
            error = %error,
            "custom service request conversion rejected"
        );
        self.runtime.audit.emit(
            AuditEvent::new(
                context,
                "request.conversion_rejected",
                AuditCategory::Conversion,
                AuditOutcome::Rejected,
                self.runtime.clock.now(),
            )
            .for_request(request_id)
            .with_metadata("error", error.to_string()),
        );
    }
}

/// Whole units of work billed on the converted line: rounded up, at least one.
pub fn quantity_from_work_units(work_units: Decimal) -> Result<u32, DomainError> {
    if work_units <= Decimal::ZERO {
        return Err(DomainError::InvariantViolation(
            "final estimated work units must be positive".to_owned(),
        ));
    }
    work_units.ceil().to_u32().map(|units| units.max(1)).ok_or_else(|| {
        DomainError::InvariantViolation(format!("work units {work_units} exceed line quantity"))
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::quantity_from_work_units;
    use crate::errors::DomainError;

    #[test]
    fn work_units_round_up_to_whole_quantity() {
        assert_eq!(quantity_from_work_units(Decimal::new(25, 1)), Ok(3));
        assert_eq!(quantity_from_work_units(Decimal::new(4, 0)), Ok(4));
        assert_eq!(quantity_from_work_units(Decimal::new(1, 2)), Ok(1));
    }

    #[test]
    fn non_positive_work_units_are_rejected() {
        assert!(matches!(
            quantity_from_work_units(Decimal::ZERO),
            Err(DomainError::InvariantViolation(_))
        ));
        assert!(quantity_from_work_units(Decimal::new(-2, 0)).is_err());
    }
}
