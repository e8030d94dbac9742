//! # Sequence Allocator
//!
//! Per-business gapless counters for sale and order numbers.
//!
//! ```text
//! INSERT INTO sequences (business_id, kind, last_value) VALUES (?, ?, 1)
//! ON CONFLICT DO UPDATE SET last_value = last_value + 1
//! RETURNING last_value
//! ```
//!
//! The increment is part of the caller's transaction: a rollback returns the
//! number, so committed numbers have no gaps. Being a write, the statement
//! also takes the database write lock, which is why sale and order creation
//! allocate their number first.

use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;

/// Counter names.
pub const SALE_SEQUENCE: &str = "sale";
pub const ORDER_SEQUENCE: &str = "order";

/// Returns the next value of `(business_id, kind)`, starting at 1.
pub async fn next_value(
    conn: &mut SqliteConnection,
    business_id: &str,
    kind: &str,
) -> DbResult<i64> {
    let value: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO sequences (business_id, kind, last_value)
        VALUES (?1, ?2, 1)
        ON CONFLICT (business_id, kind)
        DO UPDATE SET last_value = last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(business_id)
    .bind(kind)
    .fetch_one(&mut *conn)
    .await?;

    debug!(business_id = %business_id, kind = %kind, value, "Allocated sequence value");
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_values_are_per_business_and_kind() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let a = db.businesses().create("A").await.unwrap();
        let b = db.businesses().create("B").await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        assert_eq!(next_value(&mut conn, &a.id, SALE_SEQUENCE).await.unwrap(), 1);
        assert_eq!(next_value(&mut conn, &a.id, SALE_SEQUENCE).await.unwrap(), 2);
        assert_eq!(next_value(&mut conn, &a.id, ORDER_SEQUENCE).await.unwrap(), 1);
        assert_eq!(next_value(&mut conn, &b.id, SALE_SEQUENCE).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rollback_returns_the_number() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let business = db.businesses().create("A").await.unwrap();

        let mut tx = db.pool().begin().await.unwrap();
        assert_eq!(next_value(&mut tx, &business.id, SALE_SEQUENCE).await.unwrap(), 1);
        tx.rollback().await.unwrap();

        let mut tx = db.pool().begin().await.unwrap();
        assert_eq!(next_value(&mut tx, &business.id, SALE_SEQUENCE).await.unwrap(), 1);
        tx.commit().await.unwrap();
    }
}
