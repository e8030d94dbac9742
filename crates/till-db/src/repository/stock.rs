//! # Stock Ledger
//!
//! The only writer of `product_stock`. Every change is an appended
//! movement whose before/after levels are taken under the write lock.
//!
//! ## One Movement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  register_stock_movement(conn, ...)        (inside caller's tx)         │
//! │                                                                         │
//! │  1. LOCK    INSERT INTO product_stock SELECT ... FROM products          │
//! │             WHERE id = ? AND business_id = ?                            │
//! │             ON CONFLICT DO UPDATE SET quantity = quantity RETURNING *   │
//! │             (no row back → product not in this business)               │
//! │                                                                         │
//! │  2. DECIDE  stock::plan_movement(current, type, qty, allow_negative)    │
//! │             └── InsufficientStock → whole transaction rolls back        │
//! │                                                                         │
//! │  3. WRITE   INSERT stock_movements (before, after, audit reason)        │
//! │             UPDATE product_stock SET quantity = after                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Replaying a product's movements in insertion order reproduces its
//! `product_stock.quantity` exactly.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use till_core::stock::{plan_movement, replay};
use till_core::validation::validate_movement_request;
use till_core::{
    CoreError, MovementSource, ProductStock, Quantity, StockMovement, StockMovementRequest,
    StockMovementType, TenantContext,
};

// =============================================================================
// Row Mapping
// =============================================================================

/// `stock_movements` as stored; the source is split across two columns.
#[derive(Debug, FromRow)]
struct StockMovementRow {
    id: String,
    business_id: String,
    product_id: String,
    movement_type: StockMovementType,
    quantity: Quantity,
    quantity_before: Quantity,
    quantity_after: Quantity,
    note: Option<String>,
    reason: Option<String>,
    metadata: Option<String>,
    source_kind: String,
    source_id: Option<String>,
    created_by: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<StockMovementRow> for StockMovement {
    type Error = DbError;

    fn try_from(row: StockMovementRow) -> Result<Self, Self::Error> {
        let source = MovementSource::from_parts(&row.source_kind, row.source_id)
            .ok_or_else(|| DbError::corrupt("StockMovement", format!("source '{}'", row.source_kind)))?;

        let metadata: Option<serde_json::Value> = row
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| DbError::corrupt("StockMovement", e.to_string()))?;

        Ok(StockMovement {
            id: row.id,
            business_id: row.business_id,
            product_id: row.product_id,
            movement_type: row.movement_type,
            quantity: row.quantity,
            quantity_before: row.quantity_before,
            quantity_after: row.quantity_after,
            note: row.note,
            reason: row.reason,
            metadata,
            source,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

/// Returns the stock row for a product, creating it at zero, and takes the
/// write lock in the same statement.
///
/// ## Returns
/// * `Err(CoreError::NotFound)` - the product does not exist in this business
pub(crate) async fn ensure_stock_record(
    conn: &mut SqliteConnection,
    business_id: &str,
    product_id: &str,
) -> DbResult<ProductStock> {
    let now = Utc::now();

    sqlx::query_as::<_, ProductStock>(
        r#"
        INSERT INTO product_stock (business_id, product_id, quantity, updated_at)
        SELECT business_id, id, 0, ?3
        FROM products
        WHERE id = ?1 AND business_id = ?2
        ON CONFLICT (business_id, product_id)
        DO UPDATE SET quantity = quantity
        RETURNING *
        "#,
    )
    .bind(product_id)
    .bind(business_id)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| CoreError::not_found("Product", product_id).into())
}

/// Current level read through the caller's connection; zero when the
/// product has never moved.
pub(crate) async fn current_level(
    conn: &mut SqliteConnection,
    business_id: &str,
    product_id: &str,
) -> DbResult<Quantity> {
    let level: Option<Quantity> = sqlx::query_scalar(
        "SELECT quantity FROM product_stock WHERE business_id = ?1 AND product_id = ?2",
    )
    .bind(business_id)
    .bind(product_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(level.unwrap_or_default())
}

/// Appends one movement and updates the materialized level.
///
/// Runs inside the caller's transaction; the caller commits. Sales, sale
/// cancellations and manual movements all come through here.
pub(crate) async fn register_stock_movement(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    request: &StockMovementRequest,
) -> DbResult<StockMovement> {
    let stock = ensure_stock_record(conn, &ctx.business_id, &request.product_id).await?;

    let plan = plan_movement(
        &request.product_id,
        stock.quantity,
        request.movement_type,
        request.quantity,
        request.allow_negative,
    )?;

    let (reason, metadata) = match plan.negative_stock_audit(request.movement_type, request.quantity)
    {
        Some((reason, metadata)) => {
            warn!(
                product_id = %request.product_id,
                before = %plan.before,
                after = %plan.after,
                "Stock driven negative under permissive policy"
            );
            (Some(reason), Some(metadata))
        }
        None => (None, None),
    };

    let movement = StockMovement {
        id: Uuid::new_v4().to_string(),
        business_id: ctx.business_id.clone(),
        product_id: request.product_id.clone(),
        movement_type: request.movement_type,
        quantity: request.quantity,
        quantity_before: plan.before,
        quantity_after: plan.after,
        note: request.note.clone(),
        reason,
        metadata,
        source: request.source.clone(),
        created_by: ctx.user_id.clone(),
        created_at: Utc::now(),
    };

    let metadata_json = movement
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            id, business_id, product_id, movement_type, quantity,
            quantity_before, quantity_after, note, reason, metadata,
            source_kind, source_id, created_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(&movement.id)
    .bind(&movement.business_id)
    .bind(&movement.product_id)
    .bind(movement.movement_type)
    .bind(movement.quantity)
    .bind(movement.quantity_before)
    .bind(movement.quantity_after)
    .bind(&movement.note)
    .bind(&movement.reason)
    .bind(metadata_json)
    .bind(movement.source.kind())
    .bind(movement.source.source_id())
    .bind(&movement.created_by)
    .bind(movement.created_at)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        UPDATE product_stock SET quantity = ?3, updated_at = ?4
        WHERE business_id = ?1 AND product_id = ?2
        "#,
    )
    .bind(&movement.business_id)
    .bind(&movement.product_id)
    .bind(movement.quantity_after)
    .bind(movement.created_at)
    .execute(&mut *conn)
    .await?;

    debug!(
        product_id = %movement.product_id,
        movement_type = %movement.movement_type,
        quantity = %movement.quantity,
        before = %movement.quantity_before,
        after = %movement.quantity_after,
        "Stock movement registered"
    );

    Ok(movement)
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for the stock ledger.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    /// Registers a manual movement (receiving, counting, waste) in its own
    /// transaction.
    ///
    /// ## Arguments
    /// * `ctx` - caller; the movement is recorded as created by `ctx.user_id`
    /// * `request` - movement to apply; `allow_negative` permits a result
    ///   below zero for this call only
    ///
    /// ## Returns
    /// * `Ok(StockMovement)` - the appended ledger entry
    /// * `Err(CoreError::InsufficientStock)` - would go negative, nothing written
    pub async fn register_movement(
        &self,
        ctx: &TenantContext,
        request: StockMovementRequest,
    ) -> DbResult<StockMovement> {
        validate_movement_request(&request).map_err(CoreError::from)?;

        let mut tx = self.pool.begin().await?;
        let movement = register_stock_movement(&mut tx, ctx, &request).await?;
        tx.commit().await?;

        info!(
            movement_id = %movement.id,
            product_id = %movement.product_id,
            movement_type = %movement.movement_type,
            after = %movement.quantity_after,
            "Stock movement committed"
        );
        Ok(movement)
    }

    /// Current level; zero when the product has never moved.
    pub async fn stock_level(&self, ctx: &TenantContext, product_id: &str) -> DbResult<Quantity> {
        let mut conn = self.pool.acquire().await?;
        current_level(&mut conn, &ctx.business_id, product_id).await
    }

    /// The materialized row, if the product has ever moved.
    pub async fn get_stock(
        &self,
        ctx: &TenantContext,
        product_id: &str,
    ) -> DbResult<Option<ProductStock>> {
        let stock = sqlx::query_as::<_, ProductStock>(
            "SELECT * FROM product_stock WHERE business_id = ?1 AND product_id = ?2",
        )
        .bind(&ctx.business_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(stock)
    }

    /// All movements of a product in the order they were applied.
    pub async fn movements(
        &self,
        ctx: &TenantContext,
        product_id: &str,
    ) -> DbResult<Vec<StockMovement>> {
        let rows = sqlx::query_as::<_, StockMovementRow>(
            r#"
            SELECT * FROM stock_movements
            WHERE business_id = ?1 AND product_id = ?2
            ORDER BY rowid
            "#,
        )
        .bind(&ctx.business_id)
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StockMovement::try_from).collect()
    }

    /// Level obtained by replaying the movement log from zero.
    ///
    /// Always equal to [`stock_level`](Self::stock_level); a mismatch means
    /// something other than the ledger wrote `product_stock`.
    pub async fn replay_quantity(
        &self,
        ctx: &TenantContext,
        product_id: &str,
    ) -> DbResult<Quantity> {
        let movements = self.movements(ctx, product_id).await?;
        replay(movements.iter().map(|m| (m.movement_type, m.quantity)))
            .ok_or_else(|| DbError::corrupt("stock_movements", "movement log overflows"))
    }

    /// Products whose level is under their `stock_min`.
    pub async fn below_minimum(&self, ctx: &TenantContext) -> DbResult<Vec<ProductStock>> {
        let rows = sqlx::query_as::<_, ProductStock>(
            r#"
            SELECT s.* FROM product_stock s
            JOIN products p ON p.id = s.product_id AND p.business_id = s.business_id
            WHERE s.business_id = ?1 AND s.quantity < p.stock_min
            ORDER BY p.name
            "#,
        )
        .bind(&ctx.business_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
