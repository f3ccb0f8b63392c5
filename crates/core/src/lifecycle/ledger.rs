use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome};
use crate::domain::order::{
    EmployeeId, Order, OrderId, OrderStageHistory, StageCursor, StageHistoryId,
};
use crate::domain::stage::Stage;
use crate::errors::{ApplicationError, DomainError};
use crate::lifecycle::catalog::{definition, initial_stage};
use crate::lifecycle::transitions::{StageTransition, StageTransitionEngine};
use crate::runtime::CoreRuntime;
use crate::store::{OrderStore, StageAppend};

pub const OPENING_NOTE: &str = "order opened";

/// Operator request to move an order one stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageChange {
    pub order_id: OrderId,
    pub target: Stage,
    pub changed_by: Option<EmployeeId>,
    pub notes: Option<String>,
}

/// Read model of an order's progress.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StageTimeline {
    pub order_id: OrderId,
    pub current_stage: Stage,
    pub current_label: &'static str,
    pub completion_percentage: u8,
    pub entries: Vec<OrderStageHistory>,
}

/// Builds the first ledger entry of an order: Survey at sequence 1.
pub fn opening_entry(
    id: StageHistoryId,
    order_id: &OrderId,
    changed_at: DateTime<Utc>,
    changed_by: Option<EmployeeId>,
    notes: Option<String>,
) -> OrderStageHistory {
    OrderStageHistory {
        id,
        order_id: order_id.clone(),
        stage: initial_stage(),
        sequence: 1,
        changed_at,
        changed_by,
        notes: Some(notes.unwrap_or_else(|| OPENING_NOTE.to_owned())),
    }
}

/// Append-only record of stage movements; the only writer of an order's stage.
pub struct StageLedger<S> {
    store: S,
    runtime: CoreRuntime,
    engine: StageTransitionEngine,
}

impl<S> StageLedger<S>
where
    S: OrderStore,
{
    pub fn new(store: S, runtime: CoreRuntime) -> Self {
        Self { store, runtime, engine: StageTransitionEngine }
    }

    pub fn engine(&self) -> &StageTransitionEngine {
        &self.engine
    }

    pub async fn record_transition(
        &self,
        change: StageChange,
        context: &AuditContext,
    ) -> Result<OrderStageHistory, ApplicationError> {
        let order = self.load_order(&change.order_id).await?;
        let history = self.store.list_stage_history(&order.id).await?;
        let current =
            history.last().map(OrderStageHistory::cursor).unwrap_or_else(StageCursor::unopened);

        let transition = match self.engine.validate(current.stage, change.target) {
            Ok(transition) => transition,
            Err(error) => {
                self.reject(&order.id, current.stage, change.target, &error, context);
                return Err(error.into());
            }
        };

        let now = self.runtime.clock.now();
        let changed_at = history.last().map_or(now, |last| last.changed_at.max(now));

        let mut entries = Vec::with_capacity(2);
        if history.is_empty() {
            entries.push(opening_entry(
                self.next_history_id(),
                &order.id,
                changed_at,
                order.assigned_employee_id.clone(),
                None,
            ));
        }
        let sequence = entries.last().map_or(current.sequence, |entry| entry.sequence) + 1;
        entries.push(OrderStageHistory {
            id: self.next_history_id(),
            order_id: order.id.clone(),
            stage: change.target,
            sequence,
            changed_at,
            changed_by: change.changed_by.clone(),
            notes: change.notes.clone(),
        });

        match self.store.append_stage_entries(&order.id, current, &entries).await? {
            StageAppend::Appended => {}
            StageAppend::Stale { actual } => {
                return Err(self.stale_append(&order.id, actual, change.target, context));
            }
        }

        let Some(applied) = entries.pop() else {
            return Err(DomainError::InvariantViolation(
                "stage append produced no entry".to_owned(),
            )
            .into());
        };
        self.applied(&applied, transition, context);
        Ok(applied)
    }

    /// History oldest first, with the derived current stage.
    pub async fn timeline(&self, order_id: &OrderId) -> Result<StageTimeline, ApplicationError> {
        let order = self.load_order(order_id).await?;
        let entries = self.store.list_stage_history(&order.id).await?;
        let current_stage = entries.last().map_or(initial_stage(), |entry| entry.stage);
        let stage = definition(current_stage);

        Ok(StageTimeline {
            order_id: order.id,
            current_stage,
            current_label: stage.label,
            completion_percentage: stage.completion_percentage,
            entries,
        })
    }

    pub async fn current_stage(&self, order_id: &OrderId) -> Result<Stage, ApplicationError> {
        Ok(self.timeline(order_id).await?.current_stage)
    }

    pub async fn completion_percentage(&self, order_id: &OrderId) -> Result<u8, ApplicationError> {
        Ok(self.timeline(order_id).await?.completion_percentage)
    }

    async fn load_order(&self, order_id: &OrderId) -> Result<Order, ApplicationError> {
        self.store
            .find_order(order_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("order", order_id.0.clone()))
    }

    fn next_history_id(&self) -> StageHistoryId {
        StageHistoryId(self.runtime.ids.next_id("OSH"))
    }

    fn stale_append(
        &self,
        order_id: &OrderId,
        actual: StageCursor,
        target: Stage,
        context: &AuditContext,
    ) -> ApplicationError {
        match self.engine.validate(actual.stage, target) {
            Ok(_) => {
                tracing::warn!(
                    event_name = "order.stage.transition_conflict",
                    correlation_id = %context.correlation_id,
                    order_id = %order_id.0,
                    actual_stage = %actual.stage,
                    actual_sequence = actual.sequence,
                    target_stage = %target,
                    "stage ledger moved underneath the caller"
                );
                ApplicationError::Conflict { entity: "order", id: order_id.0.clone() }
            }
            Err(error) => {
                self.reject(order_id, actual.stage, target, &error, context);
                error.into()
            }
        }
    }

    fn applied(
        &self,
        entry: &OrderStageHistory,
        transition: StageTransition,
        context: &AuditContext,
    ) {
        tracing::info!(
            event_name = "order.stage.transition_applied",
            correlation_id = %context.correlation_id,
            order_id = %entry.order_id.0,
            from_stage = %transition.from,
            to_stage = %transition.to,
            direction = ?transition.direction,
            sequence = entry.sequence,
            "order stage transition applied"
        );
        self.runtime.audit.emit(
            AuditEvent::new(
                context,
                "order.stage.transition_applied",
                AuditCategory::Lifecycle,
                AuditOutcome::Success,
                entry.changed_at,
            )
            .for_order(&entry.order_id)
            .with_metadata("from", transition.from.as_str())
            .with_metadata("to", transition.to.as_str())
            .with_metadata("sequence", entry.sequence.to_string()),
        );
    }

    fn reject(
        &self,
        order_id: &OrderId,
        from: Stage,
        to: Stage,
        error: &DomainError,
        context: &AuditContext,
    ) {
        tracing::warn!(
            event_name = "order.stage.transition_rejected",
            correlation_id = %context.correlation_id,
            order_id = %order_id.0,
            from_stage = %from,
            to_stage = %to,
            "order stage transition rejected"
        );
        self.runtime.audit.emit(
            AuditEvent::new(
                context,
                "order.stage.transition_rejected",
                AuditCategory::Lifecycle,
                AuditOutcome::Rejected,
                self.runtime.clock.now(),
            )
            .for_order(order_id)
            .with_metadata("from", from.as_str())
            .with_metadata("to", to.as_str())
            .with_metadata("error", error.to_string()),
        );
    }
}
