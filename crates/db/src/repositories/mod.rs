use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use decalops_core::domain::stage::Stage;
use decalops_core::store::StoreError;

pub mod memory;
pub mod order;
pub mod pricing_rule;
pub mod service_request;

pub use memory::InMemoryStore;
pub use order::SqlOrderRepository;
pub use pricing_rule::SqlPricingRuleRepository;
pub use service_request::SqlServiceRequestRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(value: RepositoryError) -> Self {
        StoreError::Backend(value.to_string())
    }
}

pub(crate) fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(
    column: &str,
    value: String,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid {column} `{value}`: {error}")))
}

pub(crate) fn parse_date(column: &str, value: String) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(&value, "%Y-%m-%d")
        .map_err(|error| RepositoryError::Decode(format!("invalid {column} `{value}`: {error}")))
}

pub(crate) fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value.trim())
        .map_err(|error| RepositoryError::Decode(format!("invalid {column} `{value}`: {error}")))
}

pub(crate) fn parse_optional_decimal(
    column: &str,
    value: Option<String>,
) -> Result<Option<Decimal>, RepositoryError> {
    value.map(|value| parse_decimal(column, value)).transpose()
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("{column} `{value}` is out of range")))
}

pub(crate) fn parse_stage(column: &str, value: i64) -> Result<Stage, RepositoryError> {
    Stage::from_ordinal(value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown {column} ordinal `{value}`")))
}
