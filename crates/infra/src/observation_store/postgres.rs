//! Postgres-backed observation store.
//!
//! ## Schema
//!
//! One append-only table, `price_observations`, created by
//! [`PostgresObservationStore::ensure_schema`]. Prices are `NUMERIC(12,2)`
//! mapped through `rust_decimal`.
//!
//! ## Previous price
//!
//! `record()` runs in a transaction that locks the product's latest row
//! (`FOR UPDATE`), reads its price and inserts the new row, so two concurrent
//! checks of the same product cannot both chain off the same predecessor.
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError |
//! |------------|------------|
//! | Database / PoolClosed / Io / other | `Backend` |
//! | ColumnDecode / Decode / ColumnNotFound | `Corrupt` |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use tracing::instrument;

use pricewatch_core::{ObservationId, ProductId};
use pricewatch_monitor::{NewObservation, ObservationStore, PriceObservation, StoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS price_observations (
    id              UUID PRIMARY KEY,
    product_id      BIGINT NOT NULL,
    price           NUMERIC(12,2),
    previous_price  NUMERIC(12,2),
    source          TEXT,
    currency        TEXT NOT NULL DEFAULT 'BRL',
    available       BOOLEAN NOT NULL,
    error           TEXT,
    checked_at      TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS price_observations_product_checked
    ON price_observations (product_id, checked_at DESC);
CREATE INDEX IF NOT EXISTS price_observations_checked
    ON price_observations (checked_at);
"#;

const COLUMNS: &str =
    "id, product_id, price, previous_price, source, currency, available, error, checked_at";

#[derive(Debug, Clone)]
pub struct PostgresObservationStore {
    pool: PgPool,
}

impl PostgresObservationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the table and indexes if they do not exist.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait]
impl ObservationStore for PostgresObservationStore {
    #[instrument(skip(self, observation), fields(product_id = %observation.product_id), err)]
    async fn record(&self, observation: NewObservation) -> Result<PriceObservation, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let previous: Option<Option<Decimal>> = sqlx::query_scalar(
            r#"
            SELECT price
            FROM price_observations
            WHERE product_id = $1
            ORDER BY checked_at DESC, id DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(observation.product_id.get())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("load_previous", e))?;

        let stored = observation.into_observation(previous.flatten());

        sqlx::query(
            r#"
            INSERT INTO price_observations (
                id, product_id, price, previous_price, source,
                currency, available, error, checked_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(stored.id.as_uuid())
        .bind(stored.product_id.get())
        .bind(stored.price)
        .bind(stored.previous_price)
        .bind(&stored.source)
        .bind(&stored.currency)
        .bind(stored.available)
        .bind(&stored.error)
        .bind(stored.checked_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_observation", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(stored)
    }

    #[instrument(skip(self), err)]
    async fn latest(&self, product_id: ProductId) -> Result<Option<PriceObservation>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM price_observations WHERE product_id = $1 \
             ORDER BY checked_at DESC, id DESC LIMIT 1"
        ))
        .bind(product_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("latest", e))?;

        row.as_ref().map(observation_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn history(
        &self,
        product_id: ProductId,
        since: DateTime<Utc>,
    ) -> Result<Vec<PriceObservation>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM price_observations \
             WHERE product_id = $1 AND checked_at >= $2 \
             ORDER BY checked_at DESC, id DESC"
        ))
        .bind(product_id.get())
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("history", e))?;

        rows.iter().map(observation_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn products_with_changes(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ProductId>, StoreError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT product_id
            FROM price_observations
            WHERE checked_at >= $1
              AND price IS NOT NULL
              AND previous_price IS NOT NULL
              AND price <> previous_price
            ORDER BY product_id
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("products_with_changes", e))?;

        Ok(ids.into_iter().map(ProductId::new).collect())
    }
}

fn observation_from_row(row: &sqlx::postgres::PgRow) -> Result<PriceObservation, StoreError> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode_row", e);
    Ok(PriceObservation {
        id: ObservationId::from_uuid(row.try_get("id").map_err(decode)?),
        product_id: ProductId::new(row.try_get("product_id").map_err(decode)?),
        price: row.try_get("price").map_err(decode)?,
        previous_price: row.try_get("previous_price").map_err(decode)?,
        source: row.try_get("source").map_err(decode)?,
        currency: row.try_get("currency").map_err(decode)?,
        available: row.try_get("available").map_err(decode)?,
        error: row.try_get("error").map_err(decode)?,
        checked_at: row.try_get("checked_at").map_err(decode)?,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(format!("{operation}: {err}"))
        }
        sqlx::Error::Database(db_err) => StoreError::Backend(format!(
            "database error in {operation}: {}",
            db_err.message()
        )),
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn decode_failures_are_corrupt_rows() {
        let err = map_sqlx_error("decode_row", sqlx::Error::ColumnNotFound("price".to_string()));
        assert!(matches!(err, StoreError::Corrupt(msg) if msg.contains("decode_row")));

        let err = map_sqlx_error("history", sqlx::Error::PoolClosed);
        assert_eq!(
            err,
            StoreError::Backend("connection pool closed in history".to_string())
        );
    }

    /// Runs only when `PRICEWATCH_TEST_DATABASE_URL` points at a scratch database.
    #[tokio::test]
    async fn chains_previous_price_against_postgres() {
        let Ok(url) = std::env::var("PRICEWATCH_TEST_DATABASE_URL") else {
            return;
        };
        let store = PostgresObservationStore::connect(&url).await.unwrap();
        store.ensure_schema().await.unwrap();

        let product = ProductId::new(900_000 + (Utc::now().timestamp_subsec_micros() as i64));
        let t0 = Utc::now() - Duration::minutes(10);

        let first = store
            .record(NewObservation::available(product, dec!(199.90), None, t0))
            .await
            .unwrap();
        assert_eq!(first.previous_price, None);

        let second = store
            .record(NewObservation::available(
                product,
                dec!(149.90),
                Some("amazon".to_string()),
                t0 + Duration::minutes(5),
            ))
            .await
            .unwrap();
        assert_eq!(second.previous_price, Some(dec!(199.90)));

        let latest = store.latest(product).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(store.history(product, t0).await.unwrap().len(), 2);
        assert!(store
            .products_with_changes(t0)
            .await
            .unwrap()
            .contains(&product));
    }
}
