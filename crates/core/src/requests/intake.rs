use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome};
use crate::domain::order::{CustomerId, EmployeeId};
use crate::domain::service_request::{CustomServiceRequest, RequestId, RequestStatus};
use crate::errors::{ApplicationError, DomainError};
use crate::runtime::CoreRuntime;
use crate::store::ServiceRequestStore;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewServiceRequest {
    pub customer_id: CustomerId,
    pub description: String,
    pub reference_image_url: Option<String>,
    pub desired_completion_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EstimateRefinement {
    pub sales_employee_id: EmployeeId,
    pub estimated_cost: Option<Decimal>,
    pub estimated_work_units: Option<Decimal>,
}

/// Intake and refinement of custom work requests up to the point of
/// conversion.
pub struct RequestIntake<S> {
    store: S,
    runtime: CoreRuntime,
}

impl<S> RequestIntake<S>
where
    S: ServiceRequestStore,
{
    pub fn new(store: S, runtime: CoreRuntime) -> Self {
        Self { store, runtime }
    }

    pub async fn find(&self, id: &RequestId) -> Result<CustomServiceRequest, ApplicationError> {
        load_request(&self.store, id).await
    }

    pub async fn submit(
        &self,
        input: NewServiceRequest,
        context: &AuditContext,
    ) -> Result<CustomServiceRequest, ApplicationError> {
        let description = input.description.trim();
        if description.is_empty() {
            return Err(DomainError::InvariantViolation(
                "request description must not be empty".to_owned(),
            )
            .into());
        }

        let now = self.runtime.clock.now();
        let request = CustomServiceRequest {
            id: RequestId(self.runtime.ids.next_id("REQ")),
            customer_id: input.customer_id,
            description: description.to_owned(),
            reference_image_url: input.reference_image_url.filter(|url| !url.trim().is_empty()),
            desired_completion_date: input.desired_completion_date,
            status: RequestStatus::New,
            estimated_cost: None,
            estimated_work_units: None,
            sales_employee_id: None,
            order_id: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_request(&request).await?;

        self.emit("request.submitted", &request, context);
        Ok(request)
    }

    pub async fn start_review(
        &self,
        id: &RequestId,
        sales_employee_id: EmployeeId,
        context: &AuditContext,
    ) -> Result<CustomServiceRequest, ApplicationError> {
        self.advance(id, RequestStatus::UnderReview, context, |request| {
            if request.status != RequestStatus::New {
                return Err(invalid(request, RequestStatus::UnderReview));
            }
            request.sales_employee_id = Some(sales_employee_id);
            Ok(())
        })
        .await
    }

    /// Records the sales estimate and marks the request quoted. A quoted
    /// request may be re-quoted until it is converted.
    pub async fn refine_estimate(
        &self,
        id: &RequestId,
        refinement: EstimateRefinement,
        context: &AuditContext,
    ) -> Result<CustomServiceRequest, ApplicationError> {
        if matches!(refinement.estimated_cost, Some(cost) if cost < Decimal::ZERO) {
            return Err(DomainError::InvariantViolation(
                "estimated cost must not be negative".to_owned(),
            )
            .into());
        }
        if matches!(refinement.estimated_work_units, Some(units) if units <= Decimal::ZERO) {
            return Err(DomainError::InvariantViolation(
                "estimated work units must be positive".to_owned(),
            )
            .into());
        }

        self.advance(id, RequestStatus::Quoted, context, |request| {
            request.sales_employee_id = Some(refinement.sales_employee_id);
            if refinement.estimated_cost.is_some() {
                request.estimated_cost = refinement.estimated_cost;
            }
            if refinement.estimated_work_units.is_some() {
                request.estimated_work_units = refinement.estimated_work_units;
            }
            Ok(())
        })
        .await
    }

    pub async fn reject(
        &self,
        id: &RequestId,
        reason: Option<String>,
        context: &AuditContext,
    ) -> Result<CustomServiceRequest, ApplicationError> {
        self.advance(id, RequestStatus::Rejected, context, |request| {
            request.rejection_reason = reason.filter(|reason| !reason.trim().is_empty());
            Ok(())
        })
        .await
    }

    async fn advance<F>(
        &self,
        id: &RequestId,
        target: RequestStatus,
        context: &AuditContext,
        change: F,
    ) -> Result<CustomServiceRequest, ApplicationError>
    where
        F: FnOnce(&mut CustomServiceRequest) -> Result<(), DomainError>,
    {
        let current = load_request(&self.store, id).await?;
        if let Err(error) = current.ensure_mutable() {
            self.reject_event(&current, target, &error, context);
            return Err(error.into());
        }

        let mut updated = current.clone();
        if let Err(error) = change(&mut updated) {
            self.reject_event(&current, target, &error, context);
            return Err(error.into());
        }
        updated.status = target;
        updated.updated_at = self.runtime.clock.now().max(current.updated_at);

        if !self.store.update_request(&updated, current.status).await? {
            let latest = load_request(&self.store, id).await?;
            latest.ensure_mutable()?;
            return Err(ApplicationError::Conflict { entity: "request", id: id.0.clone() });
        }

        let event_type = match target {
            RequestStatus::UnderReview => "request.review_started",
            RequestStatus::Quoted => "request.quoted",
            RequestStatus::Rejected => "request.rejected",
            RequestStatus::New | RequestStatus::ConvertedToOrder => "request.updated",
        };
        self.emit(event_type, &updated, context);
        Ok(updated)
    }

    fn emit(&self, event_type: &str, request: &CustomServiceRequest, context: &AuditContext) {
        tracing::info!(
            event_name = event_type,
            correlation_id = %context.correlation_id,
            request_id = %request.id.0,
            status = request.status.as_str(),
            "custom service request updated"
        );
        self.runtime.audit.emit(
            AuditEvent::new(
                context,
                event_type,
                AuditCategory::Intake,
                AuditOutcome::Success,
                request.updated_at,
            )
            .for_request(&request.id)
            .with_metadata("status", request.status.as_str()),
        );
    }

    fn reject_event(
        &self,
        request: &CustomServiceRequest,
        target: RequestStatus,
        error: &DomainError,
        context: &AuditContext,
    ) {
        tracing::warn!(
            event_name = "request.update_rejected",
            correlation_id = %context.correlation_id,
            request_id = %request.id.0,
            status = request.status.as_str(),
            target = target.as_str(),
            error = %error,
            "custom service request update rejected"
        );
        self.runtime.audit.emit(
            AuditEvent::new(
                context,
                "request.update_rejected",
                AuditCategory::Intake,
                AuditOutcome::Rejected,
                self.runtime.clock.now(),
            )
            .for_request(&request.id)
            .with_metadata("status", request.status.as_str())
            .with_metadata("target", target.as_str())
            .with_metadata("error", error.to_string()),
        );
    }
}

pub(crate) async fn load_request<S>(
    store: &S,
    id: &RequestId,
) -> Result<CustomServiceRequest, ApplicationError>
where
    S: ServiceRequestStore,
{
    store
        .find_request(id)
        .await?
        .ok_or_else(|| ApplicationError::not_found("request", id.0.clone()))
}

fn invalid(request: &CustomServiceRequest, to: RequestStatus) -> DomainError {
    DomainError::InvalidRequestTransition {
        request_id: request.id.clone(),
        from: request.status,
        to,
    }
}
