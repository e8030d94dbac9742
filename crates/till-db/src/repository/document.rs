//! # Document Numbering
//!
//! One counter per (business, document type), issued without gaps or
//! duplicates.
//!
//! ```text
//! BEGIN
//!   upsert series (creates it, or touches it to take the write lock)
//!   formatted = code-padded(next_number)      INV-000042
//!   next_number += 1
//! COMMIT
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::NumberingSettings;
use crate::error::DbResult;
use till_core::numbering::format_document_number;
use till_core::{DocumentNumber, DocumentSeries, DocumentType, TenantContext};

/// Creates the series with the configured code and padding, or touches the
/// existing one. Either way the row is write-locked afterwards.
async fn upsert_series(
    conn: &mut SqliteConnection,
    business_id: &str,
    document_type: DocumentType,
    numbering: &NumberingSettings,
) -> DbResult<DocumentSeries> {
    let now = Utc::now();
    let series = sqlx::query_as::<_, DocumentSeries>(
        r#"
        INSERT INTO document_series (
            id, business_id, document_type, code, padding, next_number,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)
        ON CONFLICT (business_id, document_type)
        DO UPDATE SET updated_at = updated_at
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(business_id)
    .bind(document_type)
    .bind(numbering.code_for(document_type))
    .bind(numbering.padding as i64)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(series)
}

/// Repository for document number series.
#[derive(Debug, Clone)]
pub struct DocumentRepository {
    pool: SqlitePool,
    numbering: NumberingSettings,
}

impl DocumentRepository {
    pub fn new(pool: SqlitePool, numbering: NumberingSettings) -> Self {
        DocumentRepository { pool, numbering }
    }

    /// The series for a document type, created on first use.
    pub async fn get_or_create_series(
        &self,
        ctx: &TenantContext,
        document_type: DocumentType,
    ) -> DbResult<DocumentSeries> {
        let mut tx = self.pool.begin().await?;
        let series = upsert_series(&mut tx, &ctx.business_id, document_type, &self.numbering).await?;
        tx.commit().await?;

        debug!(series_id = %series.id, document_type = %document_type, "Document series ready");
        Ok(series)
    }

    /// Issues the next number of a series.
    ///
    /// ## Example
    /// ```text
    /// series INV, padding 6, next_number 42
    ///   → DocumentNumber { number: 42, formatted: "INV-000042" }
    ///   → next_number 43
    /// ```
    pub async fn get_next_document_number(
        &self,
        ctx: &TenantContext,
        document_type: DocumentType,
    ) -> DbResult<DocumentNumber> {
        let mut tx = self.pool.begin().await?;
        let series = upsert_series(&mut tx, &ctx.business_id, document_type, &self.numbering).await?;

        let padding = usize::try_from(series.padding).unwrap_or_default();
        let issued = DocumentNumber {
            series_id: series.id.clone(),
            document_type,
            number: series.next_number,
            formatted: format_document_number(&series.code, series.next_number, padding),
        };

        sqlx::query(
            "UPDATE document_series SET next_number = next_number + 1, updated_at = ?2 WHERE id = ?1",
        )
        .bind(&series.id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(formatted = %issued.formatted, document_type = %document_type, "Document number issued");
        Ok(issued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn setup() -> (Database, TenantContext) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let business = db.businesses().create("Studio").await.unwrap();
        let ctx = TenantContext::new(&business.id, "owner-1", "owner");
        (db, ctx)
    }

    #[tokio::test]
    async fn test_numbers_are_consecutive_per_type() {
        let (db, ctx) = setup().await;
        let docs = db.documents();

        let a = docs.get_next_document_number(&ctx, DocumentType::Invoice).await.unwrap();
        let b = docs.get_next_document_number(&ctx, DocumentType::Invoice).await.unwrap();
        let q = docs.get_next_document_number(&ctx, DocumentType::Quote).await.unwrap();

        assert_eq!(a.formatted, "INV-000001");
        assert_eq!(b.formatted, "INV-000002");
        assert_eq!(q.formatted, "QUO-000001");
        assert_eq!(a.series_id, b.series_id);

        let series = docs.get_or_create_series(&ctx, DocumentType::Invoice).await.unwrap();
        assert_eq!(series.next_number, 3);
    }

    #[tokio::test]
    async fn test_configured_code_and_padding() {
        let (db, ctx) = setup().await;
        let db = db.with_numbering(NumberingSettings {
            invoice_code: "F".to_string(),
            quote_code: "P".to_string(),
            padding: 3,
        });

        let issued = db
            .documents()
            .get_next_document_number(&ctx, DocumentType::Invoice)
            .await
            .unwrap();
        assert_eq!(issued.formatted, "F-001");
    }

    #[tokio::test]
    async fn test_series_are_per_business() {
        let (db, ctx) = setup().await;
        let other = db.businesses().create("Other").await.unwrap();
        let other_ctx = TenantContext::new(&other.id, "owner-2", "owner");
        let docs = db.documents();

        docs.get_next_document_number(&ctx, DocumentType::Invoice).await.unwrap();
        let first = docs
            .get_next_document_number(&other_ctx, DocumentType::Invoice)
            .await
            .unwrap();
        assert_eq!(first.number, 1);
    }
}
