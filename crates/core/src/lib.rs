pub mod audit;
pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod ids;
pub mod lifecycle;
pub mod orders;
pub mod pricing;
pub mod requests;
pub mod runtime;
pub mod store;

pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::order::{
    CustomerId, EmployeeId, Order, OrderId, OrderLine, OrderLineId, OrderStageHistory,
    PriceSource, ServiceId, StageCursor, UsageMeasurements,
};
pub use domain::pricing_rule::{PricingRule, PricingRuleId};
pub use domain::service_request::{CustomServiceRequest, RequestId, RequestStatus};
pub use domain::stage::Stage;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use ids::{IdGenerator, SequentialIdGenerator, UuidGenerator};
pub use lifecycle::{StageChange, StageLedger, StageTimeline, StageTransitionEngine};
pub use orders::{NewOrder, NewOrderLine, OpenedOrder, OrderDetails, OrderService};
pub use pricing::{LinePricing, OrderPricing, OrderPricingService, PricingOutcome};
pub use requests::{
    ConversionInput, ConvertedRequest, EstimateRefinement, NewServiceRequest,
    RequestConversionWorkflow, RequestIntake,
};
pub use runtime::CoreRuntime;
pub use store::{
    ConversionCommit, ConversionOutcome, LineRepricing, LineWrite, OrderStore, PricingRuleStore,
    ServiceRequestStore, StageAppend, StoreError,
};
