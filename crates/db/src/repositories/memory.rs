use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use decalops_core::domain::order::{
    Order, OrderId, OrderLine, OrderStageHistory, ServiceId, StageCursor,
};
use decalops_core::domain::pricing_rule::PricingRule;
use decalops_core::domain::service_request::{CustomServiceRequest, RequestId, RequestStatus};
use decalops_core::pricing::calculator::order_total;
use decalops_core::store::{
    ConversionCommit, ConversionOutcome, LineRepricing, LineWrite, OrderStore, PricingRuleStore,
    ServiceRequestStore, StageAppend, StoreError,
};

#[derive(Default)]
struct MemoryState {
    orders: HashMap<String, Order>,
    lines: HashMap<String, Vec<OrderLine>>,
    history: HashMap<String, Vec<OrderStageHistory>>,
    rules: HashMap<String, PricingRule>,
    requests: HashMap<String, CustomServiceRequest>,
}

impl MemoryState {
    fn order_mut(&mut self, id: &OrderId) -> Result<&mut Order, StoreError> {
        self.orders
            .get_mut(&id.0)
            .ok_or_else(|| StoreError::NotFound { entity: "order", id: id.0.clone() })
    }

    fn insert_order(
        &mut self,
        order: &Order,
        lines: &[OrderLine],
        opening_entry: &OrderStageHistory,
    ) -> Result<(), StoreError> {
        if self.orders.contains_key(&order.id.0) {
            return Err(StoreError::Backend(format!("order `{}` already exists", order.id.0)));
        }
        if let Some(request_id) = &order.request_id {
            if self.orders.values().any(|existing| existing.request_id.as_ref() == Some(request_id))
            {
                return Err(StoreError::Backend(format!(
                    "request `{}` already has an order",
                    request_id.0
                )));
            }
        }

        self.orders.insert(order.id.0.clone(), order.clone());
        self.lines.insert(order.id.0.clone(), lines.to_vec());
        self.history.insert(order.id.0.clone(), vec![opening_entry.clone()]);
        Ok(())
    }
}

/// Process-local store behind all three store traits. Clones share state.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl OrderStore for InMemoryStore {
    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        let state = self.state.read().await;
        Ok(state.orders.get(&id.0).cloned())
    }

    async fn create_order(
        &self,
        order: &Order,
        lines: &[OrderLine],
        opening_entry: &OrderStageHistory,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.insert_order(order, lines, opening_entry)
    }

    async fn update_order_status(&self, id: &OrderId, status: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.order_mut(id)?.order_status = status.to_owned();
        Ok(())
    }

    async fn list_stage_history(
        &self,
        id: &OrderId,
    ) -> Result<Vec<OrderStageHistory>, StoreError> {
        let state = self.state.read().await;
        Ok(state.history.get(&id.0).cloned().unwrap_or_default())
    }

    async fn append_stage_entries(
        &self,
        id: &OrderId,
        expected: StageCursor,
        entries: &[OrderStageHistory],
    ) -> Result<StageAppend, StoreError> {
        let mut state = self.state.write().await;
        let order = state.order_mut(id)?;
        let actual = order.stage_cursor();
        if actual != expected {
            return Ok(StageAppend::Stale { actual });
        }
        let Some(last) = entries.last() else {
            return Ok(StageAppend::Appended);
        };
        order.current_stage = last.stage;
        order.stage_sequence = last.sequence;

        state.history.entry(id.0.clone()).or_default().extend(entries.iter().cloned());
        Ok(StageAppend::Appended)
    }

    async fn list_lines(&self, id: &OrderId) -> Result<Vec<OrderLine>, StoreError> {
        let state = self.state.read().await;
        Ok(state.lines.get(&id.0).cloned().unwrap_or_default())
    }

    async fn save_priced_lines(
        &self,
        id: &OrderId,
        lines: &[LineRepricing],
    ) -> Result<LineWrite, StoreError> {
        let mut state = self.state.write().await;
        state.order_mut(id)?;

        let stored = state.lines.entry(id.0.clone()).or_default();
        for update in lines {
            let current = stored.iter().find(|existing| existing.id == update.line.id);
            if current.map_or(true, |existing| existing.usage != update.read_usage) {
                return Ok(LineWrite::Stale { line_id: update.line.id.clone() });
            }
        }
        for update in lines {
            if let Some(existing) = stored.iter_mut().find(|existing| existing.id == update.line.id)
            {
                existing.usage = update.line.usage.clone();
                existing.final_calculated_price = update.line.final_calculated_price;
                existing.price_source = update.line.price_source;
            }
        }
        let total_amount = order_total(stored.iter());

        state.order_mut(id)?.total_amount = total_amount;
        Ok(LineWrite::Saved { total_amount })
    }
}

#[async_trait::async_trait]
impl PricingRuleStore for InMemoryStore {
    async fn list_rules_for_service(
        &self,
        service_id: &ServiceId,
    ) -> Result<Vec<PricingRule>, StoreError> {
        let state = self.state.read().await;
        let mut rules: Vec<PricingRule> = state
            .rules
            .values()
            .filter(|rule| rule.service_id == *service_id)
            .cloned()
            .collect();
        rules.sort_by(|left, right| left.id.0.cmp(&right.id.0));
        Ok(rules)
    }

    async fn save_rule(&self, rule: &PricingRule) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.rules.insert(rule.id.0.clone(), rule.clone());
        Ok(())
    }
}

#[async_trait::async_trait]
impl ServiceRequestStore for InMemoryStore {
    async fn find_request(
        &self,
        id: &RequestId,
    ) -> Result<Option<CustomServiceRequest>, StoreError> {
        let state = self.state.read().await;
        Ok(state.requests.get(&id.0).cloned())
    }

    async fn insert_request(&self, request: &CustomServiceRequest) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.requests.contains_key(&request.id.0) {
            return Err(StoreError::Backend(format!("request `{}` already exists", request.id.0)));
        }
        state.requests.insert(request.id.0.clone(), request.clone());
        Ok(())
    }

    async fn update_request(
        &self,
        request: &CustomServiceRequest,
        expected_status: RequestStatus,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let Some(stored) = state.requests.get_mut(&request.id.0) else {
            return Err(StoreError::NotFound { entity: "request", id: request.id.0.clone() });
        };
        if stored.status != expected_status || stored.order_id.is_some() {
            return Ok(false);
        }

        let order_id = stored.order_id.clone();
        *stored = request.clone();
        stored.order_id = order_id;
        Ok(true)
    }

    async fn commit_conversion(
        &self,
        commit: &ConversionCommit,
    ) -> Result<ConversionOutcome, StoreError> {
        let mut state = self.state.write().await;
        let request_id = &commit.request.id;
        let Some(stored) = state.requests.get(&request_id.0) else {
            return Err(StoreError::NotFound { entity: "request", id: request_id.0.clone() });
        };
        if stored.status.is_terminal() || stored.order_id.is_some() {
            return Ok(ConversionOutcome::Rejected {
                status: stored.status,
                order_id: stored.order_id.clone(),
            });
        }

        state.insert_order(
            &commit.order,
            std::slice::from_ref(&commit.line),
            &commit.opening_entry,
        )?;
        if let Some(stored) = state.requests.get_mut(&request_id.0) {
            stored.status = RequestStatus::ConvertedToOrder;
            stored.order_id = Some(commit.order.id.clone());
            stored.updated_at = commit.request.updated_at;
        }
        Ok(ConversionOutcome::Committed)
    }
}
