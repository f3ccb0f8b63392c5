use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use decalops_core::{
    ApplicationError, AuditContext, CoreRuntime, CustomerId, DomainError, InMemoryAuditSink,
    LineRepricing, LineWrite, ManualClock, NewOrder, NewOrderLine, OpenedOrder, Order, OrderId,
    OrderLine, OrderLineId, OrderPricingService, OrderService, OrderStageHistory, OrderStore,
    PriceSource, PricingOutcome, PricingRule, PricingRuleId, PricingRuleStore,
    SequentialIdGenerator, ServiceId, StageAppend, StageCursor, StoreError, UsageMeasurements,
};
use decalops_db::{
    connect_with_settings, migrations, InMemoryStore, SqlOrderRepository,
    SqlPricingRuleRepository,
};

const WRAP: &str = "svc-full-wrap";
const TINT: &str = "svc-window-tint";

fn parse_ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).expect("valid timestamp").with_timezone(&Utc)
}

fn runtime(audit: &InMemoryAuditSink) -> CoreRuntime {
    CoreRuntime::default()
        .with_clock(Arc::new(ManualClock::new(parse_ts("2026-02-23T12:00:00Z"))))
        .with_ids(Arc::new(SequentialIdGenerator::default()))
        .with_audit(Arc::new(audit.clone()))
}

fn context() -> AuditContext {
    AuditContext::new("corr-pricing", "employee:EMP-3")
}

fn wrap_rule(id: &str) -> PricingRule {
    PricingRule {
        id: PricingRuleId(id.to_owned()),
        service_id: ServiceId(WRAP.to_owned()),
        base_price_per_sq_meter: Decimal::new(100, 0),
        min_area: Some(Decimal::ONE),
        max_area: Some(Decimal::new(20, 0)),
        min_length: None,
        max_length: None,
        color_pricing_factor: Some(Decimal::new(12, 1)),
        is_active: true,
        formula_description: Some("area x base x colour factor".to_owned()),
    }
}

fn line(service: &str, quoted: i64) -> NewOrderLine {
    NewOrderLine {
        service_id: ServiceId(service.to_owned()),
        quantity: 1,
        quoted_price: Decimal::new(quoted, 2),
    }
}

async fn open<S: OrderStore>(
    store: S,
    runtime: CoreRuntime,
    lines: Vec<NewOrderLine>,
) -> OpenedOrder {
    OrderService::new(store, runtime)
        .open_order(
            NewOrder {
                customer_id: CustomerId("CUS-1".to_owned()),
                assigned_employee_id: None,
                lines,
                opened_by: None,
                notes: None,
            },
            &context(),
        )
        .await
        .expect("open order")
}

fn area(value: Decimal) -> UsageMeasurements {
    UsageMeasurements { area: Some(value), length: None, width: None }
}

#[tokio::test]
async fn measured_area_prices_the_line_from_its_rule() {
    let audit = InMemoryAuditSink::default();
    let store = InMemoryStore::new();
    let runtime = runtime(&audit);
    store.save_rule(&wrap_rule("PR-WRAP")).await.expect("save rule");
    let opened = open(store.clone(), runtime.clone(), vec![line(WRAP, 25000)]).await;
    let pricing = OrderPricingService::new(store.clone(), store, runtime);

    let outcome = pricing
        .record_line_usage(
            &opened.order.id,
            &opened.lines[0].id,
            area(Decimal::new(25, 1)),
            &context(),
        )
        .await
        .expect("record usage");

    assert_eq!(outcome.lines.len(), 1);
    assert_eq!(outcome.lines[0].outcome, PricingOutcome::RuleApplied);
    assert!(!outcome.lines[0].fallback);
    assert_eq!(outcome.lines[0].line.final_calculated_price, Decimal::new(30000, 2));
    assert_eq!(outcome.lines[0].line.price_source, PriceSource::Usage);
    assert_eq!(outcome.total_amount, Decimal::new(30000, 2));
    assert_eq!(outcome.currency, "USD");
    assert_eq!(audit.events_of_type("pricing.line.measured").len(), 1);
}

#[tokio::test]
async fn unmeasured_line_keeps_quoted_price_and_is_flagged() {
    let audit = InMemoryAuditSink::default();
    let store = InMemoryStore::new();
    let runtime = runtime(&audit);
    store.save_rule(&wrap_rule("PR-WRAP")).await.expect("save rule");
    let opened = open(store.clone(), runtime.clone(), vec![line(WRAP, 25000)]).await;
    let pricing = OrderPricingService::new(store.clone(), store, runtime);

    let outcome = pricing.reprice_order(&opened.order.id, &context()).await.expect("reprice");

    let priced = &outcome.lines[0];
    assert_eq!(priced.outcome, PricingOutcome::InsufficientMeasurementData);
    assert!(priced.fallback);
    assert_eq!(priced.line.final_calculated_price, Decimal::new(25000, 2));
    assert_eq!(outcome.fallback_lines().count(), 1);
    assert_eq!(outcome.total_amount, Decimal::new(25000, 2));
}

#[tokio::test]
async fn order_total_tracks_line_prices_in_sql_store() {
    let pool =
        connect_with_settings("sqlite::memory:?cache=shared", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    let orders = SqlOrderRepository::new(pool.clone());
    let rules = SqlPricingRuleRepository::new(pool.clone());
    let audit = InMemoryAuditSink::default();
    let runtime = runtime(&audit);

    rules.save_rule(&wrap_rule("PR-WRAP")).await.expect("save rule");
    let opened =
        open(orders.clone(), runtime.clone(), vec![line(WRAP, 25000), line(TINT, 15000)]).await;
    assert_eq!(opened.order.total_amount, Decimal::new(40000, 2));

    let pricing = OrderPricingService::new(orders.clone(), rules, runtime).with_currency("EUR");
    let wrap_line = opened
        .lines
        .iter()
        .find(|line| line.service_id.0 == WRAP)
        .expect("wrap line");
    let measured = pricing
        .record_line_usage(&opened.order.id, &wrap_line.id, area(Decimal::new(25, 1)), &context())
        .await
        .expect("record usage");
    assert_eq!(measured.total_amount, Decimal::new(45000, 2));
    assert_eq!(measured.currency, "EUR");

    let repriced = pricing.reprice_order(&opened.order.id, &context()).await.expect("reprice");
    let outcomes: Vec<PricingOutcome> = repriced.lines.iter().map(|line| line.outcome).collect();
    assert!(outcomes.contains(&PricingOutcome::RuleApplied));
    assert!(outcomes.contains(&PricingOutcome::NoRule));

    let stored = orders.find_order(&opened.order.id).await.expect("find").expect("order");
    let lines = orders.list_lines(&opened.order.id).await.expect("lines");
    let sum: Decimal = lines.iter().map(|line| line.final_calculated_price).sum();
    assert_eq!(stored.total_amount, sum);
    assert_eq!(stored.total_amount, Decimal::new(45000, 2));
    assert_eq!(
        pricing.recompute_order_total(&opened.order.id).await.expect("recompute"),
        Decimal::new(45000, 2)
    );
}

#[tokio::test]
async fn conflicting_active_rules_fall_back_for_that_service_only() {
    let audit = InMemoryAuditSink::default();
    let store = InMemoryStore::new();
    let runtime = runtime(&audit);
    store.save_rule(&wrap_rule("PR-WRAP-A")).await.expect("save rule");
    store.save_rule(&wrap_rule("PR-WRAP-B")).await.expect("save rule");
    let mut tint = wrap_rule("PR-TINT");
    tint.service_id = ServiceId(TINT.to_owned());
    tint.color_pricing_factor = None;
    tint.base_price_per_sq_meter = Decimal::new(40, 0);
    store.save_rule(&tint).await.expect("save rule");

    let opened =
        open(store.clone(), runtime.clone(), vec![line(WRAP, 25000), line(TINT, 15000)]).await;
    let pricing = OrderPricingService::new(store.clone(), store, runtime);
    for order_line in &opened.lines {
        pricing
            .record_line_usage(
                &opened.order.id,
                &order_line.id,
                area(Decimal::new(2, 0)),
                &context(),
            )
            .await
            .expect("record usage");
    }

    let error = pricing
        .resolve_rule(&ServiceId(WRAP.to_owned()))
        .await
        .expect_err("two active rules");
    assert!(matches!(
        error,
        ApplicationError::Domain(DomainError::ConflictingPricingRules { count: 2, .. })
    ));

    let repriced = pricing.reprice_order(&opened.order.id, &context()).await.expect("reprice");
    for priced in &repriced.lines {
        if priced.line.service_id.0 == WRAP {
            assert_eq!(priced.outcome, PricingOutcome::ConflictingRules);
            assert_eq!(priced.line.final_calculated_price, Decimal::new(25000, 2));
        } else {
            assert_eq!(priced.outcome, PricingOutcome::RuleApplied);
            assert_eq!(priced.line.final_calculated_price, Decimal::new(8000, 2));
        }
    }
    assert_eq!(repriced.total_amount, Decimal::new(33000, 2));
}

#[tokio::test]
async fn invalid_rule_is_refused_before_saving() {
    let audit = InMemoryAuditSink::default();
    let store = InMemoryStore::new();
    let pricing = OrderPricingService::new(store.clone(), store, runtime(&audit));

    let mut rule = wrap_rule("PR-BAD");
    rule.min_area = Some(Decimal::new(30, 0));
    let error = pricing.save_rule(rule, &context()).await.expect_err("min above max");
    assert!(matches!(error, ApplicationError::Domain(DomainError::InvalidPricingRule(_))));
    assert!(pricing
        .list_active_rules(&ServiceId(WRAP.to_owned()))
        .await
        .expect("list rules")
        .is_empty());
}

/// Order store that lets a measurement land on `line_id` right after the
/// lines were read, the way a second terminal would.
struct MeasuredAfterRead {
    inner: InMemoryStore,
    runtime: CoreRuntime,
    line_id: OrderLineId,
    measured: AtomicBool,
}

#[async_trait::async_trait]
impl OrderStore for MeasuredAfterRead {
    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        self.inner.find_order(id).await
    }

    async fn create_order(
        &self,
        order: &Order,
        lines: &[OrderLine],
        opening_entry: &OrderStageHistory,
    ) -> Result<(), StoreError> {
        self.inner.create_order(order, lines, opening_entry).await
    }

    async fn update_order_status(&self, id: &OrderId, status: &str) -> Result<(), StoreError> {
        self.inner.update_order_status(id, status).await
    }

    async fn list_stage_history(
        &self,
        id: &OrderId,
    ) -> Result<Vec<OrderStageHistory>, StoreError> {
        self.inner.list_stage_history(id).await
    }

    async fn append_stage_entries(
        &self,
        id: &OrderId,
        expected: StageCursor,
        entries: &[OrderStageHistory],
    ) -> Result<StageAppend, StoreError> {
        self.inner.append_stage_entries(id, expected, entries).await
    }

    async fn list_lines(&self, id: &OrderId) -> Result<Vec<OrderLine>, StoreError> {
        let lines = self.inner.list_lines(id).await?;
        if !self.measured.swap(true, Ordering::SeqCst) {
            OrderPricingService::new(self.inner.clone(), self.inner.clone(), self.runtime.clone())
                .record_line_usage(id, &self.line_id, area(Decimal::new(25, 1)), &context())
                .await
                .expect("measurement from the other terminal");
        }
        Ok(lines)
    }

    async fn save_priced_lines(
        &self,
        id: &OrderId,
        lines: &[LineRepricing],
    ) -> Result<LineWrite, StoreError> {
        self.inner.save_priced_lines(id, lines).await
    }
}

#[tokio::test]
async fn reprice_does_not_overwrite_a_measurement_recorded_meanwhile() {
    let audit = InMemoryAuditSink::default();
    let store = InMemoryStore::new();
    let runtime = runtime(&audit);
    store.save_rule(&wrap_rule("PR-WRAP")).await.expect("save rule");
    let opened = open(store.clone(), runtime.clone(), vec![line(WRAP, 25000)]).await;
    let racing = MeasuredAfterRead {
        inner: store.clone(),
        runtime: runtime.clone(),
        line_id: opened.lines[0].id.clone(),
        measured: AtomicBool::new(false),
    };
    let pricing = OrderPricingService::new(racing, store.clone(), runtime);

    let error = pricing
        .reprice_order(&opened.order.id, &context())
        .await
        .expect_err("reprice read the line before it was measured");

    assert_eq!(
        error,
        ApplicationError::Conflict { entity: "order line", id: opened.lines[0].id.0.clone() }
    );
    assert!(error.is_retryable());
    let stored = store.list_lines(&opened.order.id).await.expect("lines");
    assert_eq!(stored[0].usage.area, Some(Decimal::new(25, 1)));
    assert_eq!(stored[0].final_calculated_price, Decimal::new(30000, 2));
    let order = store.find_order(&opened.order.id).await.expect("find").expect("order exists");
    assert_eq!(order.total_amount, Decimal::new(30000, 2));
    assert!(audit.events_of_type("pricing.order.repriced").is_empty());
}
