use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::service_request::RequestId;
use crate::domain::stage::Stage;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderLineId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageHistoryId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmployeeId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceId(pub String);

pub const ORDER_STATUS_NEW: &str = "New";
pub const ORDER_STATUS_CANCELLED: &str = "Cancelled";

/// Position of an order in its stage ledger: the stage of the latest history
/// entry and that entry's sequence number (0 when no entry exists yet).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCursor {
    pub stage: Stage,
    pub sequence: u32,
}

impl StageCursor {
    pub fn unopened() -> Self {
        Self { stage: Stage::Survey, sequence: 0 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub assigned_employee_id: Option<EmployeeId>,
    pub order_date: DateTime<Utc>,
    pub total_amount: Decimal,
    pub order_status: String,
    pub current_stage: Stage,
    pub stage_sequence: u32,
    pub request_id: Option<RequestId>,
}

impl Order {
    pub fn stage_cursor(&self) -> StageCursor {
        StageCursor { stage: self.current_stage, sequence: self.stage_sequence }
    }
}

/// Where a line's final price came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Catalog,
    Usage,
    Negotiated,
}

impl PriceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::Usage => "usage",
            Self::Negotiated => "negotiated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "catalog" => Some(Self::Catalog),
            "usage" => Some(Self::Usage),
            "negotiated" => Some(Self::Negotiated),
            _ => None,
        }
    }
}

/// Material actually consumed on a line, in square meters / meters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMeasurements {
    pub area: Option<Decimal>,
    pub length: Option<Decimal>,
    pub width: Option<Decimal>,
}

impl UsageMeasurements {
    pub fn is_empty(&self) -> bool {
        self.area.is_none() && self.length.is_none() && self.width.is_none()
    }

    pub fn has_negative_value(&self) -> bool {
        [self.area, self.length, self.width]
            .iter()
            .flatten()
            .any(|value| *value < Decimal::ZERO)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub order_id: OrderId,
    pub service_id: ServiceId,
    pub quantity: u32,
    pub usage: UsageMeasurements,
    pub quoted_price: Decimal,
    pub final_calculated_price: Decimal,
    pub price_source: PriceSource,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStageHistory {
    pub id: StageHistoryId,
    pub order_id: OrderId,
    pub stage: Stage,
    pub sequence: u32,
    pub changed_at: DateTime<Utc>,
    pub changed_by: Option<EmployeeId>,
    pub notes: Option<String>,
}

impl OrderStageHistory {
    pub fn cursor(&self) -> StageCursor {
        StageCursor { stage: self.stage, sequence: self.sequence }
    }
}
