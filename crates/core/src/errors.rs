use thiserror::Error;

use crate::domain::order::{OrderId, ServiceId};
use crate::domain::service_request::{RequestId, RequestStatus};
use crate::domain::stage::Stage;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid stage transition from {from} to {to}")]
    InvalidStageTransition { from: Stage, to: Stage },
    #[error("request `{}` has already been converted to an order", .request_id.0)]
    AlreadyConverted { request_id: RequestId },
    #[error("request `{}` is already linked to order `{}`", .request_id.0, .order_id.0)]
    AlreadyLinked { request_id: RequestId, order_id: OrderId },
    #[error("request `{}` is closed with status {}", .request_id.0, .status.as_str())]
    RequestClosed { request_id: RequestId, status: RequestStatus },
    #[error(
        "request `{}` cannot move from {} to {}",
        .request_id.0,
        .from.as_str(),
        .to.as_str()
    )]
    InvalidRequestTransition { request_id: RequestId, from: RequestStatus, to: RequestStatus },
    #[error("service `{}` has {count} active pricing rules; expected at most one", .service_id.0)]
    ConflictingPricingRules { service_id: ServiceId, count: usize },
    #[error("invalid pricing rule: {0}")]
    InvalidPricingRule(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("concurrent update on {entity} `{id}`; reload and retry")]
    Conflict { entity: &'static str, id: String },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Conflict { .. })
    }

    /// Stable machine-readable class used by the operator surface.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Domain(DomainError::InvalidStageTransition { .. }) => "invalid_stage_transition",
            Self::Domain(DomainError::AlreadyConverted { .. }) => "already_converted",
            Self::Domain(DomainError::AlreadyLinked { .. }) => "already_linked",
            Self::Domain(DomainError::RequestClosed { .. }) => "request_closed",
            Self::Domain(DomainError::InvalidRequestTransition { .. }) => {
                "invalid_request_transition"
            }
            Self::Domain(DomainError::ConflictingPricingRules { .. }) => {
                "conflicting_pricing_rules"
            }
            Self::Domain(DomainError::InvalidPricingRule(_)) => "invalid_pricing_rule",
            Self::Domain(DomainError::InvariantViolation(_)) => "invariant_violation",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::Persistence(_) => "persistence",
            Self::Configuration(_) => "configuration",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The referenced record does not exist.",
            Self::Conflict { .. } => {
                "The record was changed by someone else. Reload it and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(
                error @ (DomainError::AlreadyConverted { .. } | DomainError::AlreadyLinked { .. }),
            ) => Self::Conflict { message: error.to_string(), correlation_id },
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id }
            }
            error @ ApplicationError::NotFound { .. } => {
                Self::NotFound { message: error.to_string(), correlation_id }
            }
            error @ ApplicationError::Conflict { .. } => {
                Self::Conflict { message: error.to_string(), correlation_id }
            }
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}
