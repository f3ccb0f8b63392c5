use sqlx::{sqlite::SqliteRow, Row};

use decalops_core::domain::order::{
    CustomerId, EmployeeId, Order, OrderId, OrderLine, OrderLineId, OrderStageHistory,
    PriceSource, ServiceId, StageCursor, StageHistoryId, UsageMeasurements,
};
use decalops_core::domain::service_request::RequestId;
use decalops_core::pricing::calculator::order_total;
use decalops_core::store::{LineRepricing, LineWrite, OrderStore, StageAppend, StoreError};

use super::{
    format_timestamp, parse_decimal, parse_optional_decimal, parse_stage, parse_timestamp,
    parse_u32, RepositoryError,
};
use crate::DbPool;

const ORDER_COLUMNS: &str = "id, customer_id, assigned_employee_id, order_date, total_amount,
    order_status, current_stage, stage_sequence, request_id";

const LINE_COLUMNS: &str = "id, order_id, service_id, quantity, actual_area, actual_length,
    actual_width, quoted_price, final_calculated_price, price_source";

const HISTORY_COLUMNS: &str = "id, order_id, stage, sequence, changed_at, changed_by, notes";

#[derive(Clone)]
pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub(crate) async fn load_order(
        &self,
        id: &OrderId,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(order_from_row).transpose()
    }

    async fn insert_order(
        &self,
        order: &Order,
        lines: &[OrderLine],
        opening_entry: &OrderStageHistory,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        insert_order_row(&mut tx, order).await?;
        for (position, line) in lines.iter().enumerate() {
            insert_line_row(&mut tx, line, position).await?;
        }
        insert_history_row(&mut tx, opening_entry).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn write_status(&self, id: &OrderId, status: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE orders SET order_status = ? WHERE id = ?")
            .bind(status)
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub(crate) async fn load_history(
        &self,
        id: &OrderId,
    ) -> Result<Vec<OrderStageHistory>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {HISTORY_COLUMNS}
             FROM order_stage_history
             WHERE order_id = ?
             ORDER BY sequence ASC"
        ))
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(history_from_row).collect()
    }

    /// `None` when the order does not exist.
    async fn append_entries(
        &self,
        id: &OrderId,
        expected: StageCursor,
        entries: &[OrderStageHistory],
    ) -> Result<Option<StageAppend>, RepositoryError> {
        let Some(last) = entries.last() else {
            return Ok(Some(StageAppend::Appended));
        };

        let mut tx = self.pool.begin().await?;

        // The guarded write comes first so the transaction holds the write
        // lock before anything is read.
        let moved = sqlx::query(
            "UPDATE orders
             SET current_stage = ?, stage_sequence = ?
             WHERE id = ? AND current_stage = ? AND stage_sequence = ?",
        )
        .bind(i64::from(last.stage.ordinal()))
        .bind(i64::from(last.sequence))
        .bind(&id.0)
        .bind(i64::from(expected.stage.ordinal()))
        .bind(i64::from(expected.sequence))
        .execute(&mut *tx)
        .await?;

        if moved.rows_affected() == 0 {
            let row = sqlx::query("SELECT current_stage, stage_sequence FROM orders WHERE id = ?")
                .bind(&id.0)
                .fetch_optional(&mut *tx)
                .await?;
            tx.rollback().await?;

            let Some(row) = row else {
                return Ok(None);
            };
            let actual = StageCursor {
                stage: parse_stage("current_stage", row.try_get("current_stage")?)?,
                sequence: parse_u32("stage_sequence", row.try_get("stage_sequence")?)?,
            };
            tracing::debug!(
                event_name = "db.order.stage_cursor_stale",
                order_id = %id.0,
                expected_stage = expected.stage.as_str(),
                expected_sequence = expected.sequence,
                actual_stage = actual.stage.as_str(),
                actual_sequence = actual.sequence,
                "stage append skipped"
            );
            return Ok(Some(StageAppend::Stale { actual }));
        }

        for entry in entries {
            insert_history_row(&mut tx, entry).await?;
        }
        tx.commit().await?;
        Ok(Some(StageAppend::Appended))
    }

    pub(crate) async fn load_lines(
        &self,
        id: &OrderId,
    ) -> Result<Vec<OrderLine>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {LINE_COLUMNS}
             FROM order_lines
             WHERE order_id = ?
             ORDER BY line_position ASC"
        ))
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(line_from_row).collect()
    }

    /// `None` when the order does not exist.
    async fn write_priced_lines(
        &self,
        id: &OrderId,
        lines: &[LineRepricing],
    ) -> Result<Option<LineWrite>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query("UPDATE orders SET total_amount = total_amount WHERE id = ?")
            .bind(&id.0)
            .execute(&mut *tx)
            .await?;
        if claimed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        for LineRepricing { line, read_usage } in lines {
            let written = sqlx::query(
                "UPDATE order_lines
                 SET actual_area = ?,
                     actual_length = ?,
                     actual_width = ?,
                     final_calculated_price = ?,
                     price_source = ?
                 WHERE id = ? AND order_id = ?
                   AND actual_area IS ? AND actual_length IS ? AND actual_width IS ?",
            )
            .bind(line.usage.area.map(|value| value.to_string()))
            .bind(line.usage.length.map(|value| value.to_string()))
            .bind(line.usage.width.map(|value| value.to_string()))
            .bind(line.final_calculated_price.to_string())
            .bind(line.price_source.as_str())
            .bind(&line.id.0)
            .bind(&id.0)
            .bind(read_usage.area.map(|value| value.to_string()))
            .bind(read_usage.length.map(|value| value.to_string()))
            .bind(read_usage.width.map(|value| value.to_string()))
            .execute(&mut *tx)
            .await?;
            if written.rows_affected() == 0 {
                tx.rollback().await?;
                return Ok(Some(LineWrite::Stale { line_id: line.id.clone() }));
            }
        }

        let rows = sqlx::query(&format!(
            "SELECT {LINE_COLUMNS} FROM order_lines WHERE order_id = ? ORDER BY line_position ASC"
        ))
        .bind(&id.0)
        .fetch_all(&mut *tx)
        .await?;
        let stored = rows.into_iter().map(line_from_row).collect::<Result<Vec<_>, _>>()?;
        let total = order_total(&stored);

        sqlx::query("UPDATE orders SET total_amount = ? WHERE id = ?")
            .bind(total.to_string())
            .bind(&id.0)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(LineWrite::Saved { total_amount: total }))
    }
}

#[async_trait::async_trait]
impl OrderStore for SqlOrderRepository {
    async fn find_order(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.load_order(id).await?)
    }

    async fn create_order(
        &self,
        order: &Order,
        lines: &[OrderLine],
        opening_entry: &OrderStageHistory,
    ) -> Result<(), StoreError> {
        Ok(self.insert_order(order, lines, opening_entry).await?)
    }

    async fn update_order_status(&self, id: &OrderId, status: &str) -> Result<(), StoreError> {
        if self.write_status(id, status).await? {
            Ok(())
        } else {
            Err(order_not_found(id))
        }
    }

    async fn list_stage_history(
        &self,
        id: &OrderId,
    ) -> Result<Vec<OrderStageHistory>, StoreError> {
        Ok(self.load_history(id).await?)
    }

    async fn append_stage_entries(
        &self,
        id: &OrderId,
        expected: StageCursor,
        entries: &[OrderStageHistory],
    ) -> Result<StageAppend, StoreError> {
        self.append_entries(id, expected, entries).await?.ok_or_else(|| order_not_found(id))
    }

    async fn list_lines(&self, id: &OrderId) -> Result<Vec<OrderLine>, StoreError> {
        Ok(self.load_lines(id).await?)
    }

    async fn save_priced_lines(
        &self,
        id: &OrderId,
        lines: &[LineRepricing],
    ) -> Result<LineWrite, StoreError> {
        self.write_priced_lines(id, lines).await?.ok_or_else(|| order_not_found(id))
    }
}

fn order_not_found(id: &OrderId) -> StoreError {
    StoreError::NotFound { entity: "order", id: id.0.clone() }
}

pub(crate) async fn insert_order_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    order: &Order,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO orders (
            id,
            customer_id,
            assigned_employee_id,
            order_date,
            total_amount,
            order_status,
            current_stage,
            stage_sequence,
            request_id
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&order.id.0)
    .bind(&order.customer_id.0)
    .bind(order.assigned_employee_id.as_ref().map(|id| id.0.as_str()))
    .bind(format_timestamp(&order.order_date))
    .bind(order.total_amount.to_string())
    .bind(&order.order_status)
    .bind(i64::from(order.current_stage.ordinal()))
    .bind(i64::from(order.stage_sequence))
    .bind(order.request_id.as_ref().map(|id| id.0.as_str()))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub(crate) async fn insert_line_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    line: &OrderLine,
    position: usize,
) -> Result<(), RepositoryError> {
    let position = i64::try_from(position)
        .map_err(|_| RepositoryError::Decode(format!("line position `{position}` overflows")))?;
    sqlx::query(
        "INSERT INTO order_lines (
            id,
            order_id,
            line_position,
            service_id,
            quantity,
            actual_area,
            actual_length,
            actual_width,
            quoted_price,
            final_calculated_price,
            price_source
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&line.id.0)
    .bind(&line.order_id.0)
    .bind(position)
    .bind(&line.service_id.0)
    .bind(i64::from(line.quantity))
    .bind(line.usage.area.map(|value| value.to_string()))
    .bind(line.usage.length.map(|value| value.to_string()))
    .bind(line.usage.width.map(|value| value.to_string()))
    .bind(line.quoted_price.to_string())
    .bind(line.final_calculated_price.to_string())
    .bind(line.price_source.as_str())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub(crate) async fn insert_history_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    entry: &OrderStageHistory,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO order_stage_history (
            id,
            order_id,
            stage,
            sequence,
            changed_at,
            changed_by,
            notes
         ) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&entry.id.0)
    .bind(&entry.order_id.0)
    .bind(i64::from(entry.stage.ordinal()))
    .bind(i64::from(entry.sequence))
    .bind(format_timestamp(&entry.changed_at))
    .bind(entry.changed_by.as_ref().map(|id| id.0.as_str()))
    .bind(entry.notes.as_deref())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn order_from_row(row: SqliteRow) -> Result<Order, RepositoryError> {
    Ok(Order {
        id: OrderId(row.try_get("id")?),
        customer_id: CustomerId(row.try_get("customer_id")?),
        assigned_employee_id: row
            .try_get::<Option<String>, _>("assigned_employee_id")?
            .map(EmployeeId),
        order_date: parse_timestamp("order_date", row.try_get("order_date")?)?,
        total_amount: parse_decimal("total_amount", row.try_get("total_amount")?)?,
        order_status: row.try_get("order_status")?,
        current_stage: parse_stage("current_stage", row.try_get("current_stage")?)?,
        stage_sequence: parse_u32("stage_sequence", row.try_get("stage_sequence")?)?,
        request_id: row.try_get::<Option<String>, _>("request_id")?.map(RequestId),
    })
}

fn line_from_row(row: SqliteRow) -> Result<OrderLine, RepositoryError> {
    let price_source: String = row.try_get("price_source")?;
    let price_source = PriceSource::parse(&price_source).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown price_source `{price_source}`"))
    })?;

    Ok(OrderLine {
        id: OrderLineId(row.try_get("id")?),
        order_id: OrderId(row.try_get("order_id")?),
        service_id: ServiceId(row.try_get("service_id")?),
        quantity: parse_u32("quantity", row.try_get("quantity")?)?,
        usage: UsageMeasurements {
            area: parse_optional_decimal("actual_area", row.try_get("actual_area")?)?,
            length: parse_optional_decimal("actual_length", row.try_get("actual_length")?)?,
            width: parse_optional_decimal("actual_width", row.try_get("actual_width")?)?,
        },
        quoted_price: parse_decimal("quoted_price", row.try_get("quoted_price")?)?,
        final_calculated_price: parse_decimal(
            "final_calculated_price",
            row.try_get("final_calculated_price")?,
        )?,
        price_source,
    })
}

fn history_from_row(row: SqliteRow) -> Result<OrderStageHistory, RepositoryError> {
    Ok(OrderStageHistory {
        id: StageHistoryId(row.try_get("id")?),
        order_id: OrderId(row.try_get("order_id")?),
        stage: parse_stage("stage", row.try_get("stage")?)?,
        sequence: parse_u32("sequence", row.try_get("sequence")?)?,
        changed_at: parse_timestamp("changed_at", row.try_get("changed_at")?)?,
        changed_by: row.try_get::<Option<String>, _>("changed_by")?.map(EmployeeId),
        notes: row.try_get("notes")?,
    })
}
