//! `PostgreSQL` implementation of the `SummaryStore` trait.

use std::collections::HashMap;

use async_trait::async_trait;
use ordertrail_core::error::DomainError;
use ordertrail_core::repository::run_cancellable;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

use crate::store::SummaryStore;
use crate::summary::{OrderSummary, ProjectionOutcome, SummaryChange};

// Parameters: $1 order_id, $2 version, $3 customer or quantity.
// Totals are computed in NUMERIC and clamped to [0, i64::MAX], matching
// `OrderSummary::apply`.
const OPEN: &str = r"
    INSERT INTO order_summary
        (order_id, customer, total_items, checked_out, projected_version)
    SELECT $1, $3, 0, FALSE, $2
    WHERE $2 = 1
    ON CONFLICT (order_id) DO NOTHING
";

const ADD_ITEMS: &str = r"
    UPDATE order_summary
    SET total_items = LEAST(total_items::NUMERIC + $3, 9223372036854775807)::BIGINT,
        projected_version = $2
    WHERE order_id = $1 AND projected_version = $2 - 1
";

const REMOVE_ITEMS: &str = r"
    UPDATE order_summary
    SET total_items = GREATEST(LEAST(total_items::NUMERIC - $3, 9223372036854775807), 0)::BIGINT,
        projected_version = $2
    WHERE order_id = $1 AND projected_version = $2 - 1
";

const CHECK_OUT: &str = r"
    UPDATE order_summary
    SET checked_out = TRUE, projected_version = $2
    WHERE order_id = $1 AND projected_version = $2 - 1
";

/// PostgreSQL-backed summary store over the `order_summary` table.
///
/// Every write is a single statement whose `WHERE` clause carries the
/// version guard, so no explicit transaction is needed.
#[derive(Debug, Clone)]
pub struct PgSummaryStore {
    pool: PgPool,
}

impl PgSummaryStore {
    /// Creates a new `PgSummaryStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn write(
        &self,
        order_id: Uuid,
        version: i64,
        change: &SummaryChange,
    ) -> Result<u64, sqlx::Error> {
        let statement = match change {
            SummaryChange::Open { customer } => sqlx::query(OPEN)
                .bind(order_id)
                .bind(version)
                .bind(customer.clone()),
            SummaryChange::AddItems(quantity) => sqlx::query(ADD_ITEMS)
                .bind(order_id)
                .bind(version)
                .bind(*quantity),
            SummaryChange::RemoveItems(quantity) => sqlx::query(REMOVE_ITEMS)
                .bind(order_id)
                .bind(version)
                .bind(*quantity),
            SummaryChange::CheckOut => sqlx::query(CHECK_OUT).bind(order_id).bind(version),
        };
        let result = statement.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn projected_version(&self, order_id: Uuid) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT projected_version FROM order_summary WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[async_trait]
impl SummaryStore for PgSummaryStore {
    #[instrument(skip(self, change, cancel))]
    async fn apply(
        &self,
        order_id: Uuid,
        version: i64,
        change: &SummaryChange,
        cancel: &CancellationToken,
    ) -> Result<ProjectionOutcome, DomainError> {
        run_cancellable(cancel, async {
            let written = self
                .write(order_id, version, change)
                .await
                .map_err(infrastructure)?;
            if written > 0 {
                return Ok(ProjectionOutcome::Applied);
            }
            let current = self
                .projected_version(order_id)
                .await
                .map_err(infrastructure)?;
            Ok(ProjectionOutcome::skipped(current, version, change))
        })
        .await
    }

    #[instrument(skip(self, cancel))]
    async fn get(
        &self,
        order_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<Option<OrderSummary>, DomainError> {
        run_cancellable(cancel, async {
            let row = sqlx::query_as::<_, (Uuid, String, i64, bool, i64)>(
                r"
                SELECT order_id, customer, total_items, checked_out, projected_version
                FROM order_summary
                WHERE order_id = $1
                ",
            )
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(infrastructure)?;
            Ok(row.map(
                |(order_id, customer, total_items, checked_out, projected_version)| OrderSummary {
                    order_id,
                    customer,
                    total_items,
                    checked_out,
                    projected_version,
                },
            ))
        })
        .await
    }

    #[instrument(skip(self, cancel))]
    async fn projected_versions(
        &self,
        cancel: &CancellationToken,
    ) -> Result<HashMap<Uuid, i64>, DomainError> {
        run_cancellable(cancel, async {
            let rows = sqlx::query_as::<_, (Uuid, i64)>(
                "SELECT order_id, projected_version FROM order_summary",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(infrastructure)?;
            Ok(rows.into_iter().collect())
        })
        .await
    }
}

#[allow(clippy::needless_pass_by_value)]
fn infrastructure(err: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(err.to_string())
}
