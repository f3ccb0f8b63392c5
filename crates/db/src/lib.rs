pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_config, connect_with_settings, DbPool};
pub use fixtures::{DemoDataset, OrderSeedInfo, SeedResult, VerificationResult};
pub use repositories::{
    InMemoryStore, RepositoryError, SqlOrderRepository, SqlPricingRuleRepository,
    SqlServiceRequestRepository,
};
