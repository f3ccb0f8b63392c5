use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::order::{
    Order, OrderId, OrderLine, OrderLineId, OrderStageHistory, ServiceId, StageCursor,
    UsageMeasurements,
};
use crate::domain::pricing_rule::PricingRule;
use crate::domain::service_request::{CustomServiceRequest, RequestId, RequestStatus};
use crate::errors::ApplicationError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::Backend(message) => Self::Persistence(message),
        }
    }
}

/// Result of a compare-and-swap append on the stage ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageAppend {
    Appended,
    /// The order moved since the caller read it; nothing was written.
    Stale { actual: StageCursor },
}

/// A priced line and the measurements that were stored when it was read.
#[derive(Clone, Debug, PartialEq)]
pub struct LineRepricing {
    pub line: OrderLine,
    pub read_usage: UsageMeasurements,
}

impl LineRepricing {
    pub fn new(line: OrderLine, read_usage: UsageMeasurements) -> Self {
        Self { line, read_usage }
    }
}

/// Result of a guarded write of priced lines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineWrite {
    Saved { total_amount: Decimal },
    /// The line's stored measurements no longer match what the caller read;
    /// nothing was written.
    Stale { line_id: OrderLineId },
}

/// Order aggregate: the order row, its lines and its stage history.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, StoreError>;

    /// Inserts the order, its lines and its opening history entry atomically.
    async fn create_order(
        &self,
        order: &Order,
        lines: &[OrderLine],
        opening_entry: &OrderStageHistory,
    ) -> Result<(), StoreError>;

    async fn update_order_status(&self, id: &OrderId, status: &str) -> Result<(), StoreError>;

    /// History entries ordered oldest first.
    async fn list_stage_history(&self, id: &OrderId)
        -> Result<Vec<OrderStageHistory>, StoreError>;

    /// Appends `entries` and moves the order's denormalized stage to the last
    /// of them, but only if the order still sits at `expected`.
    async fn append_stage_entries(
        &self,
        id: &OrderId,
        expected: StageCursor,
        entries: &[OrderStageHistory],
    ) -> Result<StageAppend, StoreError>;

    async fn list_lines(&self, id: &OrderId) -> Result<Vec<OrderLine>, StoreError>;

    /// Writes usage and prices for `lines`, then recomputes the order total
    /// from every line of the order in the same transaction. Each line is
    /// written only while its stored usage still equals `read_usage`.
    async fn save_priced_lines(
        &self,
        id: &OrderId,
        lines: &[LineRepricing],
    ) -> Result<LineWrite, StoreError>;
}

#[async_trait]
pub trait PricingRuleStore: Send + Sync {
    async fn list_rules_for_service(
        &self,
        service_id: &ServiceId,
    ) -> Result<Vec<PricingRule>, StoreError>;

    async fn save_rule(&self, rule: &PricingRule) -> Result<(), StoreError>;
}

/// Everything the conversion workflow writes in one unit.
#[derive(Clone, Debug, PartialEq)]
pub struct ConversionCommit {
    pub order: Order,
    pub line: OrderLine,
    pub opening_entry: OrderStageHistory,
    pub request: CustomServiceRequest,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConversionOutcome {
    Committed,
    /// The request was converted, linked or closed concurrently.
    Rejected { status: RequestStatus, order_id: Option<OrderId> },
}

#[async_trait]
pub trait ServiceRequestStore: Send + Sync {
    async fn find_request(
        &self,
        id: &RequestId,
    ) -> Result<Option<CustomServiceRequest>, StoreError>;

    async fn insert_request(&self, request: &CustomServiceRequest) -> Result<(), StoreError>;

    /// Overwrites the request only while it is unlinked and still carries
    /// `expected_status`. Returns false when the guard did not match.
    async fn update_request(
        &self,
        request: &CustomServiceRequest,
        expected_status: RequestStatus,
    ) -> Result<bool, StoreError>;

    async fn commit_conversion(
        &self,
        commit: &ConversionCommit,
    ) -> Result<ConversionOutcome, StoreError>;
}
