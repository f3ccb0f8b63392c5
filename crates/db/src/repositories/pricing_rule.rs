use sqlx::{sqlite::SqliteRow, Row};

use decalops_core::domain::order::ServiceId;
use decalops_core::domain::pricing_rule::{PricingRule, PricingRuleId};
use decalops_core::store::{PricingRuleStore, StoreError};

use super::{parse_decimal, parse_optional_decimal, RepositoryError};
use crate::DbPool;

#[derive(Clone)]
pub struct SqlPricingRuleRepository {
    pool: DbPool,
}

impl SqlPricingRuleRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_for_service(
        &self,
        service_id: &ServiceId,
    ) -> Result<Vec<PricingRule>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                service_id,
                base_price_per_sq_meter,
                min_area,
                max_area,
                min_length,
                max_length,
                color_pricing_factor,
                is_active,
                formula_description
             FROM pricing_rules
             WHERE service_id = ?
             ORDER BY id ASC",
        )
        .bind(&service_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(rule_from_row).collect()
    }

    async fn upsert(&self, rule: &PricingRule) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO pricing_rules (
                id,
                service_id,
                base_price_per_sq_meter,
                min_area,
                max_area,
                min_length,
                max_length,
                color_pricing_factor,
                is_active,
                formula_description
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                service_id = excluded.service_id,
                base_price_per_sq_meter = excluded.base_price_per_sq_meter,
                min_area = excluded.min_area,
                max_area = excluded.max_area,
                min_length = excluded.min_length,
                max_length = excluded.max_length,
                color_pricing_factor = excluded.color_pricing_factor,
                is_active = excluded.is_active,
                formula_description = excluded.formula_description",
        )
        .bind(&rule.id.0)
        .bind(&rule.service_id.0)
        .bind(rule.base_price_per_sq_meter.to_string())
        .bind(rule.min_area.map(|value| value.to_string()))
        .bind(rule.max_area.map(|value| value.to_string()))
        .bind(rule.min_length.map(|value| value.to_string()))
        .bind(rule.max_length.map(|value| value.to_string()))
        .bind(rule.color_pricing_factor.map(|value| value.to_string()))
        .bind(rule.is_active)
        .bind(rule.formula_description.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl PricingRuleStore for SqlPricingRuleRepository {
    async fn list_rules_for_service(
        &self,
        service_id: &ServiceId,
    ) -> Result<Vec<PricingRule>, StoreError> {
        Ok(self.load_for_service(service_id).await?)
    }

    async fn save_rule(&self, rule: &PricingRule) -> Result<(), StoreError> {
        Ok(self.upsert(rule).await?)
    }
}

fn rule_from_row(row: SqliteRow) -> Result<PricingRule, RepositoryError> {
    Ok(PricingRule {
        id: PricingRuleId(row.try_get("id")?),
        service_id: ServiceId(row.try_get("service_id")?),
        base_price_per_sq_meter: parse_decimal(
            "base_price_per_sq_meter",
            row.try_get("base_price_per_sq_meter")?,
        )?,
        min_area: parse_optional_decimal("min_area", row.try_get("min_area")?)?,
        max_area: parse_optional_decimal("max_area", row.try_get("max_area")?)?,
        min_length: parse_optional_decimal("min_length", row.try_get("min_length")?)?,
        max_length: parse_optional_decimal("max_length", row.try_get("max_length")?)?,
        color_pricing_factor: parse_optional_decimal(
            "color_pricing_factor",
            row.try_get("color_pricing_factor")?,
        )?,
        is_active: row.try_get("is_active")?,
        formula_description: row.try_get("formula_description")?,
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use decalops_core::domain::order::ServiceId;
    use decalops_core::domain::pricing_rule::{PricingRule, PricingRuleId};
    use decalops_core::store::PricingRuleStore;

    use super::SqlPricingRuleRepository;
    use crate::{connect_with_settings, migrations};

    fn rule(id: &str, service: &str) -> PricingRule {
        PricingRule {
            id: PricingRuleId(id.to_owned()),
            service_id: ServiceId(service.to_owned()),
            base_price_per_sq_meter: Decimal::new(100, 0),
            min_area: Some(Decimal::ONE),
            max_area: Some(Decimal::new(20, 0)),
            min_length: None,
            max_length: None,
            color_pricing_factor: Some(Decimal::new(12, 1)),
            is_active: true,
            formula_description: Some("area * base * color factor".to_owned()),
        }
    }

    #[tokio::test]
    async fn rules_are_upserted_and_listed_per_service() {
        let pool =
            connect_with_settings("sqlite::memory:?cache=shared", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlPricingRuleRepository::new(pool);

        let mut first = rule("PR-1", "svc-full-wrap");
        repo.save_rule(&first).await.expect("save");
        repo.save_rule(&rule("PR-2", "svc-window-tint")).await.expect("save");

        first.is_active = false;
        first.base_price_per_sq_meter = Decimal::new(11050, 2);
        repo.save_rule(&first).await.expect("update");

        let rules = repo
            .list_rules_for_service(&ServiceId("svc-full-wrap".to_owned()))
            .await
            .expect("list");
        assert_eq!(rules, vec![first]);
    }
}
