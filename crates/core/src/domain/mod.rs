pub mod order;
pub mod pricing_rule;
pub mod service_request;
pub mod stage;
