pub mod calculator;
pub mod rules;
pub mod service;

pub use calculator::{
    apply_to_line, compute, order_total, round_money, PriceComputation, PricingNote,
    PricingOutcome,
};
pub use rules::{resolve, RuleResolution};
pub use service::{LinePricing, OrderPricing, OrderPricingService, DEFAULT_CURRENCY};
