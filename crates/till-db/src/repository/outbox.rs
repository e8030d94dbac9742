//! # Ledger Outbox Repository
//!
//! Ledger events queued in the same transaction as the change they
//! describe, then delivered by [`OutboxRelay`](crate::relay::OutboxRelay).
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ENGINE OPERATION (e.g. create_sale)                                    │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │  1. INSERT INTO sales ...                                       │   │
//! │  │  2. INSERT OR IGNORE INTO ledger_outbox (event_key, payload)    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │ COMMIT: both or neither                                         │
//! │       ▼                                                                 │
//! │  RELAY (background)                                                     │
//! │  1. SELECT pending WHERE delivered_at IS NULL AND attempts < max        │
//! │  2. publish to sink                                                     │
//! │     ├── ok   → delivered_at = now                                       │
//! │     └── err  → attempts += 1, last_error                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `event_key` is unique, so enqueueing the same fact twice is a no-op and
//! consumers can deduplicate on it.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use till_core::LedgerEvent;

/// A queued event.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct OutboxEntry {
    pub id: String,
    pub business_id: String,
    pub event_key: String,
    pub kind: String,
    /// JSON-encoded [`LedgerEvent`].
    pub payload: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    /// Decodes the payload.
    pub fn event(&self) -> DbResult<LedgerEvent> {
        serde_json::from_str(&self.payload)
            .map_err(|e| DbError::corrupt("OutboxEntry", e.to_string()))
    }
}

/// Queues an event inside the caller's transaction.
///
/// ## Returns
/// `true` when a new row was written, `false` when the key already existed.
pub(crate) async fn enqueue(conn: &mut SqliteConnection, event: &LedgerEvent) -> DbResult<bool> {
    let payload = serde_json::to_string(event)?;

    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO ledger_outbox (
            id, business_id, event_key, kind, payload, attempts, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&event.business_id)
    .bind(&event.event_key)
    .bind(event.kind.as_str())
    .bind(payload)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    let inserted = result.rows_affected() == 1;
    debug!(event_key = %event.event_key, inserted, "Ledger event queued");
    Ok(inserted)
}

/// Repository for outbox delivery bookkeeping.
#[derive(Debug, Clone)]
pub struct OutboxRepository {
    pool: SqlitePool,
}

impl OutboxRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OutboxRepository { pool }
    }

    /// Undelivered entries that still have attempts left, oldest first.
    pub async fn get_pending(&self, limit: u32, max_attempts: i64) -> DbResult<Vec<OutboxEntry>> {
        let entries = sqlx::query_as::<_, OutboxEntry>(
            r#"
            SELECT * FROM ledger_outbox
            WHERE delivered_at IS NULL AND attempts < ?2
            ORDER BY created_at, rowid
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .bind(max_attempts)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    pub async fn mark_delivered(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE ledger_outbox
            SET delivered_at = ?2, attempted_at = ?2, attempts = attempts + 1, last_error = NULL
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records a failed attempt and returns the new attempt count.
    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<i64> {
        let attempts: i64 = sqlx::query_scalar(
            r#"
            UPDATE ledger_outbox
            SET attempts = attempts + 1, last_error = ?2, attempted_at = ?3
            WHERE id = ?1
            RETURNING attempts
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("OutboxEntry", id))?;

        Ok(attempts)
    }

    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM ledger_outbox WHERE delivered_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Every entry for one business, in queue order. For audits and tests.
    pub async fn list_for_business(&self, business_id: &str) -> DbResult<Vec<OutboxEntry>> {
        let entries = sqlx::query_as::<_, OutboxEntry>(
            "SELECT * FROM ledger_outbox WHERE business_id = ?1 ORDER BY created_at, rowid",
        )
        .bind(business_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use till_core::{Money, PaymentMethod, Sale, SaleStatus};

    fn sale(id: &str) -> Sale {
        let now = Utc::now();
        Sale {
            id: id.to_string(),
            business_id: "b-1".to_string(),
            number: 1,
            status: SaleStatus::Completed,
            subtotal: Money::from_cents(500),
            discount: Money::zero(),
            total: Money::from_cents(500),
            payment_method: PaymentMethod::Cash,
            customer_id: None,
            cash_session_id: None,
            notes: None,
            created_by: "u".to_string(),
            created_at: now,
            updated_at: now,
            cancelled_at: None,
        }
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent_on_event_key() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let event = LedgerEvent::sale_completed(&sale("s-1"));

        let mut conn = db.pool().acquire().await.unwrap();
        assert!(enqueue(&mut conn, &event).await.unwrap());
        assert!(!enqueue(&mut conn, &event).await.unwrap());
        drop(conn);

        let outbox = db.outbox();
        assert_eq!(outbox.count_pending().await.unwrap(), 1);

        let pending = outbox.get_pending(10, 5).await.unwrap();
        assert_eq!(pending[0].event().unwrap(), event);
    }

    #[tokio::test]
    async fn test_delivery_bookkeeping() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        enqueue(&mut conn, &LedgerEvent::sale_completed(&sale("s-1"))).await.unwrap();
        enqueue(&mut conn, &LedgerEvent::sale_completed(&sale("s-2"))).await.unwrap();
        drop(conn);

        let outbox = db.outbox();
        let pending = outbox.get_pending(10, 2).await.unwrap();
        assert_eq!(pending.len(), 2);

        outbox.mark_delivered(&pending[0].id).await.unwrap();
        assert_eq!(outbox.mark_failed(&pending[1].id, "sink down").await.unwrap(), 1);
        assert_eq!(outbox.mark_failed(&pending[1].id, "sink down").await.unwrap(), 2);

        // Out of attempts, no longer offered
        assert!(outbox.get_pending(10, 2).await.unwrap().is_empty());
        assert_eq!(outbox.count_pending().await.unwrap(), 1);

        let all = outbox.list_for_business("b-1").await.unwrap();
        assert!(all[0].delivered_at.is_some());
        assert_eq!(all[1].last_error.as_deref(), Some("sink down"));
    }
}
