use sqlx::{sqlite::SqliteRow, Row};

use decalops_core::domain::order::{CustomerId, EmployeeId, OrderId};
use decalops_core::domain::service_request::{CustomServiceRequest, RequestId, RequestStatus};
use decalops_core::store::{ConversionCommit, ConversionOutcome, ServiceRequestStore, StoreError};

use super::order::{insert_history_row, insert_line_row, insert_order_row};
use super::{
    format_timestamp, parse_date, parse_optional_decimal, parse_timestamp, RepositoryError,
};
use crate::DbPool;

#[derive(Clone)]
pub struct SqlServiceRequestRepository {
    pool: DbPool,
}

impl SqlServiceRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load(
        &self,
        id: &RequestId,
    ) -> Result<Option<CustomServiceRequest>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                customer_id,
                description,
                reference_image_url,
                desired_completion_date,
                status,
                estimated_cost,
                estimated_work_units,
                sales_employee_id,
                order_id,
                rejection_reason,
                created_at,
                updated_at
             FROM custom_service_requests
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(request_from_row).transpose()
    }

    async fn insert(&self, request: &CustomServiceRequest) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO custom_service_requests (
                id,
                customer_id,
                description,
                reference_image_url,
                desired_completion_date,
                status,
                estimated_cost,
                estimated_work_units,
                sales_employee_id,
                order_id,
                rejection_reason,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.customer_id.0)
        .bind(&request.description)
        .bind(request.reference_image_url.as_deref())
        .bind(request.desired_completion_date.map(|date| date.format("%Y-%m-%d").to_string()))
        .bind(request.status.as_str())
        .bind(request.estimated_cost.map(|value| value.to_string()))
        .bind(request.estimated_work_units.map(|value| value.to_string()))
        .bind(request.sales_employee_id.as_ref().map(|id| id.0.as_str()))
        .bind(request.order_id.as_ref().map(|id| id.0.as_str()))
        .bind(request.rejection_reason.as_deref())
        .bind(format_timestamp(&request.created_at))
        .bind(format_timestamp(&request.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn guarded_update(
        &self,
        request: &CustomServiceRequest,
        expected_status: RequestStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE custom_service_requests
             SET description = ?,
                 reference_image_url = ?,
                 desired_completion_date = ?,
                 status = ?,
                 estimated_cost = ?,
                 estimated_work_units = ?,
                 sales_employee_id = ?,
                 rejection_reason = ?,
                 updated_at = ?
             WHERE id = ? AND status = ? AND order_id IS NULL",
        )
        .bind(&request.description)
        .bind(request.reference_image_url.as_deref())
        .bind(request.desired_completion_date.map(|date| date.format("%Y-%m-%d").to_string()))
        .bind(request.status.as_str())
        .bind(request.estimated_cost.map(|value| value.to_string()))
        .bind(request.estimated_work_units.map(|value| value.to_string()))
        .bind(request.sales_employee_id.as_ref().map(|id| id.0.as_str()))
        .bind(request.rejection_reason.as_deref())
        .bind(format_timestamp(&request.updated_at))
        .bind(&request.id.0)
        .bind(expected_status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// `None` when the request does not exist.
    async fn convert(
        &self,
        commit: &ConversionCommit,
    ) -> Result<Option<ConversionOutcome>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Linking the request first takes the write lock; the order it points
        // at is checked when the deferred foreign key is enforced on commit.
        let linked = sqlx::query(
            "UPDATE custom_service_requests
             SET status = ?,
                 order_id = ?,
                 updated_at = ?
             WHERE id = ?
               AND order_id IS NULL
               AND status NOT IN ('converted_to_order', 'rejected')",
        )
        .bind(RequestStatus::ConvertedToOrder.as_str())
        .bind(&commit.order.id.0)
        .bind(format_timestamp(&commit.request.updated_at))
        .bind(&commit.request.id.0)
        .execute(&mut *tx)
        .await?;

        if linked.rows_affected() == 0 {
            let row =
                sqlx::query("SELECT status, order_id FROM custom_service_requests WHERE id = ?")
                    .bind(&commit.request.id.0)
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.rollback().await?;

            let Some(row) = row else {
                return Ok(None);
            };
            let status = parse_status(row.try_get("status")?)?;
            let order_id = row.try_get::<Option<String>, _>("order_id")?.map(OrderId);
            tracing::debug!(
                event_name = "db.request.conversion_guard_failed",
                request_id = %commit.request.id.0,
                status = status.as_str(),
                linked_order_id = order_id.as_ref().map(|id| id.0.as_str()).unwrap_or("none"),
                "request conversion rolled back"
            );
            return Ok(Some(ConversionOutcome::Rejected { status, order_id }));
        }

        insert_order_row(&mut tx, &commit.order).await?;
        insert_line_row(&mut tx, &commit.line, 0).await?;
        insert_history_row(&mut tx, &commit.opening_entry).await?;
        tx.commit().await?;
        Ok(Some(ConversionOutcome::Committed))
    }
}

#[async_trait::async_trait]
impl ServiceRequestStore for SqlServiceRequestRepository {
    async fn find_request(
        &self,
        id: &RequestId,
    ) -> Result<Option<CustomServiceRequest>, StoreError> {
        Ok(self.load(id).await?)
    }

    async fn insert_request(&self, request: &CustomServiceRequest) -> Result<(), StoreError> {
        Ok(self.insert(request).await?)
    }

    async fn update_request(
        &self,
        request: &CustomServiceRequest,
        expected_status: RequestStatus,
    ) -> Result<bool, StoreError> {
        Ok(self.guarded_update(request, expected_status).await?)
    }

    async fn commit_conversion(
        &self,
        commit: &ConversionCommit,
    ) -> Result<ConversionOutcome, StoreError> {
        self.convert(commit).await?.ok_or_else(|| StoreError::NotFound {
            entity: "request",
            id: commit.request.id.0.clone(),
        })
    }
}

fn parse_status(value: String) -> Result<RequestStatus, RepositoryError> {
    RequestStatus::parse(&value)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown request status `{value}`")))
}

fn request_from_row(row: SqliteRow) -> Result<CustomServiceRequest, RepositoryError> {
    Ok(CustomServiceRequest {
        id: RequestId(row.try_get("id")?),
        customer_id: CustomerId(row.try_get("customer_id")?),
        description: row.try_get("description")?,
        reference_image_url: row.try_get("reference_image_url")?,
        desired_completion_date: row
            .try_get::<Option<String>, _>("desired_completion_date")?
            .map(|value| parse_date("desired_completion_date", value))
            .transpose()?,
        status: parse_status(row.try_get("status")?)?,
        estimated_cost: parse_optional_decimal("estimated_cost", row.try_get("estimated_cost")?)?,
        estimated_work_units: parse_optional_decimal(
            "estimated_work_units",
            row.try_get("estimated_work_units")?,
        )?,
        sales_employee_id: row.try_get::<Option<String>, _>("sales_employee_id")?.map(EmployeeId),
        order_id: row.try_get::<Option<String>, _>("order_id")?.map(OrderId),
        rejection_reason: row.try_get("rejection_reason")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
