use sqlx::Executor;

use decalops_core::domain::order::OrderId;
use decalops_core::domain::stage::Stage;
use decalops_core::pricing::calculator::order_total;

use crate::connection::DbPool;
use crate::repositories::{RepositoryError, SqlOrderRepository};

/// Canonical demo orders and the state each one is seeded in.
const SEED_ORDERS: &[SeedOrderContract] = &[
    SeedOrderContract {
        order_id: "ORD-DEMO-001",
        stage: Stage::Designing,
        stage_sequence: 2,
        expected_line_count: 2,
        description: "Wrap and tint order in design, two history entries",
    },
    SeedOrderContract {
        order_id: "ORD-DEMO-002",
        stage: Stage::Survey,
        stage_sequence: 0,
        expected_line_count: 1,
        description: "Imported order without stage history",
    },
];

const SEED_RULES: &[(&str, bool)] =
    &[("PR-DEMO-WRAP", true), ("PR-DEMO-WRAP-2025", false), ("PR-DEMO-TINT", true)];

const SEED_REQUESTS: &[(&str, &str)] = &[("REQ-DEMO-001", "quoted"), ("REQ-DEMO-002", "new")];

/// Demo dataset covering the order lifecycle, usage pricing and request
/// conversion:
/// 1. an order mid-production with a recorded stage history
/// 2. an imported order that has never been through the ledger
/// 3. active, superseded and length-based pricing rules
/// 4. one quoted and one fresh custom service request
pub struct DemoDataset;

impl DemoDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let orders_seeded = SEED_ORDERS
            .iter()
            .map(|order| OrderSeedInfo {
                order_id: order.order_id,
                stage: order.stage,
                description: order.description,
            })
            .collect::<Vec<_>>();

        Ok(SeedResult {
            orders_seeded,
            rules_seeded: SEED_RULES.len(),
            requests_seeded: SEED_REQUESTS.len(),
        })
    }

    /// Checks that the seeded rows are present and internally consistent.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();
        let orders = SqlOrderRepository::new(pool.clone());

        for (rule_id, is_active) in SEED_RULES {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM pricing_rules WHERE id = ?1 AND is_active = ?2)",
            )
            .bind(*rule_id)
            .bind(*is_active)
            .fetch_one(pool)
            .await?;
            checks.push((*rule_id, present == 1));
        }

        for seed in SEED_ORDERS {
            let id = OrderId(seed.order_id.to_owned());
            let order = orders.load_order(&id).await?;
            let at_stage = order.as_ref().is_some_and(|order| {
                order.current_stage == seed.stage && order.stage_sequence == seed.stage_sequence
            });
            checks.push((seed.order_id, at_stage));

            let lines = orders.load_lines(&id).await?;
            checks.push((seed.line_count_label(), lines.len() == seed.expected_line_count));

            let total_matches =
                order.as_ref().is_some_and(|order| order.total_amount == order_total(&lines));
            checks.push((seed.total_label(), total_matches));

            let history = orders.load_history(&id).await?;
            let history_matches = history.len() == seed.stage_sequence as usize
                && history.last().map_or(seed.stage_sequence == 0, |entry| {
                    entry.stage == seed.stage && entry.sequence == seed.stage_sequence
                });
            checks.push((seed.history_label(), history_matches));
        }

        for (request_id, status) in SEED_REQUESTS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                    SELECT 1 FROM custom_service_requests
                    WHERE id = ?1 AND status = ?2 AND order_id IS NULL
                 )",
            )
            .bind(*request_id)
            .bind(*status)
            .fetch_one(pool)
            .await?;
            checks.push((*request_id, present == 1));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the seeded rows. Lines and history go with their orders.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let request_ids = sql_array_from_ids(SEED_REQUESTS.iter().map(|(id, _)| *id));
        let order_ids = sql_array_from_ids(SEED_ORDERS.iter().map(|order| order.order_id));
        let rule_ids = sql_array_from_ids(SEED_RULES.iter().map(|(id, _)| *id));

        sqlx::query(&format!("DELETE FROM custom_service_requests WHERE id IN {request_ids}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM orders WHERE id IN {order_ids}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM pricing_rules WHERE id IN {rule_ids}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedOrderContract {
    order_id: &'static str,
    stage: Stage,
    stage_sequence: u32,
    expected_line_count: usize,
    description: &'static str,
}

impl SeedOrderContract {
    fn line_count_label(&self) -> &'static str {
        match self.order_id {
            "ORD-DEMO-001" => "order-demo-001-line-count",
            _ => "order-demo-002-line-count",
        }
    }

    fn total_label(&self) -> &'static str {
        match self.order_id {
            "ORD-DEMO-001" => "order-demo-001-total",
            _ => "order-demo-002-total",
        }
    }

    fn history_label(&self) -> &'static str {
        match self.order_id {
            "ORD-DEMO-001" => "order-demo-001-history",
            _ => "order-demo-002-history",
        }
    }
}

fn sql_array_from_ids<'a>(ids: impl Iterator<Item = &'a str>) -> String {
    let quoted = ids.map(|id| format!("'{id}'")).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub orders_seeded: Vec<OrderSeedInfo>,
    pub rules_seeded: usize,
    pub requests_seeded: usize,
}

#[derive(Debug)]
pub struct OrderSeedInfo {
    pub order_id: &'static str,
    pub stage: Stage,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
