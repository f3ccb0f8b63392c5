use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use decalops_core::{
    ApplicationError, AuditContext, ConversionInput, CoreRuntime, CustomerId, DomainError,
    EmployeeId, EstimateRefinement, InMemoryAuditSink, ManualClock, NewServiceRequest, OrderStore,
    PriceSource, RequestConversionWorkflow, RequestId, RequestIntake, RequestStatus,
    SequentialIdGenerator, ServiceId, ServiceRequestStore, Stage, StageLedger,
};
use decalops_db::{
    connect_with_settings, migrations, InMemoryStore, SqlOrderRepository,
    SqlServiceRequestRepository,
};

fn parse_ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).expect("valid timestamp").with_timezone(&Utc)
}

fn runtime(clock: &ManualClock, audit: &InMemoryAuditSink) -> CoreRuntime {
    CoreRuntime::default()
        .with_clock(Arc::new(clock.clone()))
        .with_ids(Arc::new(SequentialIdGenerator::default()))
        .with_audit(Arc::new(audit.clone()))
}

fn context() -> AuditContext {
    AuditContext::new("corr-conversion", "employee:EMP-2")
}

fn sales() -> EmployeeId {
    EmployeeId("EMP-2".to_owned())
}

fn submission() -> NewServiceRequest {
    NewServiceRequest {
        customer_id: CustomerId("CUS-4".to_owned()),
        description: "  Matte black hood decal with racing stripes ".to_owned(),
        reference_image_url: Some("https://cdn.example.com/hood.png".to_owned()),
        desired_completion_date: None,
    }
}

fn conversion(request_id: &RequestId) -> ConversionInput {
    ConversionInput {
        request_id: request_id.clone(),
        assigned_employee_id: EmployeeId("EMP-9".to_owned()),
        final_estimated_cost: Decimal::new(85000, 2),
        final_estimated_work_units: Decimal::new(65, 1),
        custom_service_id: ServiceId("svc-custom".to_owned()),
    }
}

async fn quoted_request<S: ServiceRequestStore>(intake: &RequestIntake<S>) -> RequestId {
    let request = intake.submit(submission(), &context()).await.expect("submit");
    intake.start_review(&request.id, sales(), &context()).await.expect("review");
    intake
        .refine_estimate(
            &request.id,
            EstimateRefinement {
                sales_employee_id: sales(),
                estimated_cost: Some(Decimal::new(80000, 2)),
                estimated_work_units: Some(Decimal::new(6, 0)),
            },
            &context(),
        )
        .await
        .expect("quote");
    request.id
}

async fn count_orders(pool: &decalops_db::DbPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(1) FROM orders").fetch_one(pool).await.expect("count")
}

/// Runs the double-conversion property against any pair of stores.
async fn second_conversion_is_refused<R, O>(requests: R, orders: O, runtime: CoreRuntime)
where
    R: ServiceRequestStore + Clone,
    O: OrderStore,
{
    let intake = RequestIntake::new(requests.clone(), runtime.clone());
    let workflow = RequestConversionWorkflow::new(requests, runtime);
    let request_id = quoted_request(&intake).await;

    let first =
        workflow.convert_to_order(conversion(&request_id), &context()).await.expect("convert");
    let error = workflow
        .convert_to_order(conversion(&request_id), &context())
        .await
        .expect_err("second conversion");
    assert_eq!(
        error,
        ApplicationError::Domain(DomainError::AlreadyConverted { request_id: request_id.clone() })
    );

    let request = intake.find(&request_id).await.expect("request");
    assert_eq!(request.status, RequestStatus::ConvertedToOrder);
    assert_eq!(request.order_id.as_ref(), Some(&first.order.id));

    let stored = orders.find_order(&first.order.id).await.expect("find").expect("order");
    assert_eq!(stored.request_id.as_ref(), Some(&request_id));
    assert_eq!(orders.list_lines(&first.order.id).await.expect("lines").len(), 1);
    assert_eq!(orders.list_stage_history(&first.order.id).await.expect("history").len(), 1);
}

#[tokio::test]
async fn intake_moves_request_to_quoted() {
    let clock = ManualClock::new(parse_ts("2026-02-23T12:00:00Z"));
    let audit = InMemoryAuditSink::default();
    let intake = RequestIntake::new(InMemoryStore::new(), runtime(&clock, &audit));

    let submitted = intake.submit(submission(), &context()).await.expect("submit");
    assert_eq!(submitted.status, RequestStatus::New);
    assert_eq!(submitted.description, "Matte black hood decal with racing stripes");

    clock.advance(Duration::minutes(30));
    let request_id = submitted.id.clone();
    let reviewed = intake.start_review(&request_id, sales(), &context()).await.expect("review");
    assert_eq!(reviewed.status, RequestStatus::UnderReview);
    assert_eq!(reviewed.sales_employee_id, Some(sales()));

    let quoted = intake
        .refine_estimate(
            &request_id,
            EstimateRefinement {
                sales_employee_id: sales(),
                estimated_cost: Some(Decimal::new(80000, 2)),
                estimated_work_units: None,
            },
            &context(),
        )
        .await
        .expect("quote");
    assert_eq!(quoted.status, RequestStatus::Quoted);
    assert_eq!(quoted.estimated_cost, Some(Decimal::new(80000, 2)));
    assert_eq!(quoted.created_at, submitted.created_at);
    assert!(quoted.updated_at > submitted.updated_at);
}

#[tokio::test]
async fn empty_description_is_rejected() {
    let clock = ManualClock::new(parse_ts("2026-02-23T12:00:00Z"));
    let audit = InMemoryAuditSink::default();
    let intake = RequestIntake::new(InMemoryStore::new(), runtime(&clock, &audit));

    let mut input = submission();
    input.description = "   ".to_owned();
    let error = intake.submit(input, &context()).await.expect_err("blank description");
    assert!(matches!(error, ApplicationError::Domain(DomainError::InvariantViolation(_))));
}

#[tokio::test]
async fn conversion_opens_order_at_survey_with_negotiated_line() {
    let clock = ManualClock::new(parse_ts("2026-02-23T12:00:00Z"));
    let audit = InMemoryAuditSink::default();
    let store = InMemoryStore::new();
    let runtime = runtime(&clock, &audit);
    let intake = RequestIntake::new(store.clone(), runtime.clone());
    let workflow = RequestConversionWorkflow::new(store.clone(), runtime.clone());
    let request_id = quoted_request(&intake).await;
    let before = intake.find(&request_id).await.expect("request");

    clock.advance(Duration::hours(1));
    let converted =
        workflow.convert_to_order(conversion(&request_id), &context()).await.expect("convert");

    assert_eq!(converted.order.customer_id, CustomerId("CUS-4".to_owned()));
    assert_eq!(converted.order.assigned_employee_id, Some(EmployeeId("EMP-9".to_owned())));
    assert_eq!(converted.order.total_amount, Decimal::new(85000, 2));
    assert_eq!(converted.order.order_status, "New");
    assert_eq!(converted.order.current_stage, Stage::Survey);
    assert_eq!(converted.line.quantity, 7);
    assert_eq!(converted.line.final_calculated_price, Decimal::new(85000, 2));
    assert_eq!(converted.line.price_source, PriceSource::Negotiated);
    assert_eq!(converted.opening_entry.stage, Stage::Survey);

    let request = intake.find(&request_id).await.expect("request");
    assert_eq!(request.description, before.description);
    assert_eq!(request.created_at, before.created_at);
    assert_eq!(request.estimated_cost, before.estimated_cost);

    let ledger = StageLedger::new(store, runtime);
    let timeline = ledger.timeline(&converted.order.id).await.expect("timeline");
    assert_eq!(timeline.entries.len(), 1);
    assert_eq!(timeline.completion_percentage, 25);
    assert_eq!(audit.events_of_type("request.converted").len(), 1);
}

#[tokio::test]
async fn in_memory_second_conversion_is_refused() {
    let clock = ManualClock::new(parse_ts("2026-02-23T12:00:00Z"));
    let audit = InMemoryAuditSink::default();
    let store = InMemoryStore::new();
    second_conversion_is_refused(store.clone(), store, runtime(&clock, &audit)).await;
    assert_eq!(audit.events_of_type("request.conversion_rejected").len(), 1);
}

#[tokio::test]
async fn sql_second_conversion_is_refused() {
    let pool =
        connect_with_settings("sqlite::memory:?cache=shared", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    let clock = ManualClock::new(parse_ts("2026-02-23T12:00:00Z"));
    let audit = InMemoryAuditSink::default();

    second_conversion_is_refused(
        SqlServiceRequestRepository::new(pool.clone()),
        SqlOrderRepository::new(pool.clone()),
        runtime(&clock, &audit),
    )
    .await;
    assert_eq!(count_orders(&pool).await, 1);
}

#[tokio::test]
async fn rejected_request_cannot_be_converted_or_changed() {
    let clock = ManualClock::new(parse_ts("2026-02-23T12:00:00Z"));
    let audit = InMemoryAuditSink::default();
    let store = InMemoryStore::new();
    let runtime = runtime(&clock, &audit);
    let intake = RequestIntake::new(store.clone(), runtime.clone());
    let workflow = RequestConversionWorkflow::new(store, runtime);

    let request = intake.submit(submission(), &context()).await.expect("submit");
    let rejected = intake
        .reject(&request.id, Some("artwork infringes a trademark".to_owned()), &context())
        .await
        .expect("reject");
    assert_eq!(rejected.status, RequestStatus::Rejected);

    let error = workflow
        .convert_to_order(conversion(&request.id), &context())
        .await
        .expect_err("rejected request");
    assert_eq!(
        error,
        ApplicationError::Domain(DomainError::RequestClosed {
            request_id: request.id.clone(),
            status: RequestStatus::Rejected,
        })
    );

    let error = intake
        .start_review(&request.id, sales(), &context())
        .await
        .expect_err("closed request");
    assert!(matches!(error, ApplicationError::Domain(DomainError::RequestClosed { .. })));
}

#[tokio::test]
async fn unknown_request_is_not_found() {
    let clock = ManualClock::new(parse_ts("2026-02-23T12:00:00Z"));
    let audit = InMemoryAuditSink::default();
    let workflow = RequestConversionWorkflow::new(InMemoryStore::new(), runtime(&clock, &audit));

    let error = workflow
        .convert_to_order(conversion(&RequestId("REQ-404".to_owned())), &context())
        .await
        .expect_err("unknown request");
    assert!(matches!(error, ApplicationError::NotFound { entity: "request", .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_conversions_create_one_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("conversion.db").display());
    let pool = connect_with_settings(&url, 4, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");

    let clock = ManualClock::new(parse_ts("2026-02-23T12:00:00Z"));
    let audit = InMemoryAuditSink::default();
    let runtime = runtime(&clock, &audit);
    let requests = SqlServiceRequestRepository::new(pool.clone());
    let intake = RequestIntake::new(requests.clone(), runtime.clone());
    let request_id = quoted_request(&intake).await;
    let workflow = Arc::new(RequestConversionWorkflow::new(requests, runtime));

    let mut handles = Vec::new();
    for _ in 0..2 {
        let workflow = Arc::clone(&workflow);
        let input = conversion(&request_id);
        handles.push(tokio::spawn(async move {
            workflow.convert_to_order(input, &context()).await
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.expect("task completes"));
    }

    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1, "{outcomes:?}");
    assert!(outcomes.iter().any(|outcome| matches!(
        outcome,
        Err(ApplicationError::Domain(DomainError::AlreadyConverted { .. }))
    )));
    assert_eq!(count_orders(&pool).await, 1);
    pool.close().await;
}
