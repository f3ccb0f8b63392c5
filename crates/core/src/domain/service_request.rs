use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order::{CustomerId, EmployeeId, OrderId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    New,
    UnderReview,
    Quoted,
    ConvertedToOrder,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::UnderReview => "under_review",
            Self::Quoted => "quoted",
            Self::ConvertedToOrder => "converted_to_order",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "new" => Some(Self::New),
            "under_review" => Some(Self::UnderReview),
            "quoted" => Some(Self::Quoted),
            "converted_to_order" => Some(Self::ConvertedToOrder),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ConvertedToOrder | Self::Rejected)
    }
}

/// Customer inquiry for bespoke work that may later become a billable order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomServiceRequest {
    pub id: RequestId,
    pub customer_id: CustomerId,
    pub description: String,
    pub reference_image_url: Option<String>,
    pub desired_completion_date: Option<NaiveDate>,
    pub status: RequestStatus,
    pub estimated_cost: Option<Decimal>,
    pub estimated_work_units: Option<Decimal>,
    pub sales_employee_id: Option<EmployeeId>,
    pub order_id: Option<OrderId>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomServiceRequest {
    /// Converted and rejected requests are frozen.
    pub fn ensure_mutable(&self) -> Result<(), DomainError> {
        self.ensure_convertible()
    }

    pub fn ensure_convertible(&self) -> Result<(), DomainError> {
        match (&self.status, &self.order_id) {
            (RequestStatus::ConvertedToOrder, _) => {
                Err(DomainError::AlreadyConverted { request_id: self.id.clone() })
            }
            (_, Some(order_id)) => Err(DomainError::AlreadyLinked {
                request_id: self.id.clone(),
                order_id: order_id.clone(),
            }),
            (status, None) if status.is_terminal() => {
                Err(DomainError::RequestClosed { request_id: self.id.clone(), status: *status })
            }
            _ => Ok(()),
        }
    }
}
