//! # Cash Session Engine
//!
//! Opening and closing register sessions, taking payments, manual cash in
//! and out, and settling sales left unpaid when a session closes.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  open_session(register?, opening)                                       │
//! │    └── INSERT; partial UNIQUE index (business, slot) WHERE open         │
//! │        rejects a second open session → CASH_SESSION_ALREADY_OPEN        │
//! │                                                                         │
//! │  record_payment / record_cash_movement   (session must be OPEN)         │
//! │                                                                         │
//! │  close_session(counted, note, collect_pending)                          │
//! │    1. collect_pending_session_sales   (optional, own transactions)      │
//! │    2. BEGIN; lock session row; closed → CASH_SESSION_CLOSED             │
//! │    3. totals: expected = opening + cash payments + IN − OUT             │
//! │    4. snapshot expected, counted, difference; status CLOSED; COMMIT     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Pending-Sale Collector
//! Candidates are completed sales of the business with an outstanding
//! balance that are tagged to the session, or untagged and created inside
//! its window. Each candidate is settled in its own transaction that locks
//! the sale and re-reads what was paid, so a second run (or a concurrent
//! one) finds nothing left to collect.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::outbox::enqueue;
use crate::repository::sale::{lock_sale, paid_amount};
use till_core::cash::{outstanding_balance, CollectionReport, SessionTotals};
use till_core::validation::{
    validate_name, validate_non_negative_amount, validate_note, validate_positive_amount,
};
use till_core::{
    CashMovement, CashMovementType, CashSession, CashSessionStatus, CoreError, LedgerEvent,
    Money, Payment, PaymentMethod, Sale, TenantContext,
};

/// Slot value for sessions opened without a register.
const NO_REGISTER_SLOT: &str = "";

/// Result of closing a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedSession {
    pub session: CashSession,
    pub totals: SessionTotals,
    /// Present when the collector ran first.
    pub collection: Option<CollectionReport>,
}

// =============================================================================
// Transaction Helpers
// =============================================================================

/// Loads a session; absent and foreign both read as `NotFound`.
pub(crate) async fn fetch_session(
    conn: &mut SqliteConnection,
    business_id: &str,
    session_id: &str,
) -> DbResult<CashSession> {
    sqlx::query_as::<_, CashSession>(
        "SELECT * FROM cash_sessions WHERE id = ?1 AND business_id = ?2",
    )
    .bind(session_id)
    .bind(business_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| CoreError::not_found("CashSession", session_id).into())
}

/// The most recently opened session still open, on any register.
pub(crate) async fn latest_open_session(
    conn: &mut SqliteConnection,
    business_id: &str,
) -> DbResult<Option<CashSession>> {
    let session = sqlx::query_as::<_, CashSession>(
        r#"
        SELECT * FROM cash_sessions
        WHERE business_id = ?1 AND status = 'open'
        ORDER BY opened_at DESC, rowid DESC
        LIMIT 1
        "#,
    )
    .bind(business_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(session)
}

/// Locks a session row for the rest of the transaction.
async fn lock_session(
    conn: &mut SqliteConnection,
    business_id: &str,
    session_id: &str,
) -> DbResult<CashSession> {
    sqlx::query_as::<_, CashSession>(
        r#"
        UPDATE cash_sessions SET status = status
        WHERE id = ?1 AND business_id = ?2
        RETURNING *
        "#,
    )
    .bind(session_id)
    .bind(business_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| CoreError::not_found("CashSession", session_id).into())
}

fn ensure_open(session: &CashSession) -> DbResult<()> {
    if !session.is_open() {
        return Err(CoreError::CashSessionClosed {
            session_id: session.id.clone(),
        }
        .into());
    }
    Ok(())
}

async fn session_totals(
    conn: &mut SqliteConnection,
    session: &CashSession,
) -> DbResult<SessionTotals> {
    let payments: Vec<(PaymentMethod, Money)> =
        sqlx::query_as("SELECT method, amount FROM payments WHERE cash_session_id = ?1")
            .bind(&session.id)
            .fetch_all(&mut *conn)
            .await?;

    let movements: Vec<(CashMovementType, Money)> = sqlx::query_as(
        "SELECT movement_type, amount FROM cash_movements WHERE cash_session_id = ?1",
    )
    .bind(&session.id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(SessionTotals::compute(session, &payments, &movements))
}

async fn insert_payment(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO payments (
            id, business_id, sale_id, cash_session_id, method, amount,
            created_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&payment.id)
    .bind(&payment.business_id)
    .bind(&payment.sale_id)
    .bind(&payment.cash_session_id)
    .bind(payment.method)
    .bind(payment.amount)
    .bind(&payment.created_by)
    .bind(payment.created_at)
    .execute(&mut *conn)
    .await?;

    enqueue(conn, &LedgerEvent::payment_recorded(payment)).await?;
    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for cash sessions, payments and cash movements.
#[derive(Debug, Clone)]
pub struct CashRepository {
    pool: SqlitePool,
}

impl CashRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CashRepository { pool }
    }

    /// Opens a session on a register, or on the business-wide slot when
    /// `register_id` is `None`.
    ///
    /// ## Returns
    /// * `Err(CoreError::CashSessionAlreadyOpen)` - the slot already has one
    pub async fn open_session(
        &self,
        ctx: &TenantContext,
        register_id: Option<&str>,
        opening_cash_amount: Money,
    ) -> DbResult<CashSession> {
        validate_non_negative_amount("opening_cash_amount", opening_cash_amount)
            .map_err(CoreError::from)?;

        if let Some(register_id) = register_id {
            let exists: Option<String> = sqlx::query_scalar(
                "SELECT id FROM cash_registers WHERE id = ?1 AND business_id = ?2",
            )
            .bind(register_id)
            .bind(&ctx.business_id)
            .fetch_optional(&self.pool)
            .await?;

            if exists.is_none() {
                return Err(CoreError::not_found("CashRegister", register_id).into());
            }
        }

        let session = CashSession {
            id: Uuid::new_v4().to_string(),
            business_id: ctx.business_id.clone(),
            register_id: register_id.map(str::to_string),
            status: CashSessionStatus::Open,
            opening_cash_amount,
            closing_cash_counted: None,
            expected_cash_total: None,
            difference_amount: None,
            note: None,
            opened_by: ctx.user_id.clone(),
            closed_by: None,
            opened_at: Utc::now(),
            closed_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO cash_sessions (
                id, business_id, register_id, register_slot, status,
                opening_cash_amount, opened_by, opened_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&session.id)
        .bind(&session.business_id)
        .bind(&session.register_id)
        .bind(register_id.unwrap_or(NO_REGISTER_SLOT))
        .bind(session.status)
        .bind(session.opening_cash_amount)
        .bind(&session.opened_by)
        .bind(session.opened_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::from(CoreError::CashSessionAlreadyOpen {
                register_id: session.register_id.clone(),
            }),
            other => other,
        })?;

        info!(
            session_id = %session.id,
            register_id = ?session.register_id,
            opening = %session.opening_cash_amount,
            "Cash session opened"
        );
        Ok(session)
    }

    pub async fn get_session(
        &self,
        ctx: &TenantContext,
        session_id: &str,
    ) -> DbResult<Option<CashSession>> {
        let session = sqlx::query_as::<_, CashSession>(
            "SELECT * FROM cash_sessions WHERE id = ?1 AND business_id = ?2",
        )
        .bind(session_id)
        .bind(&ctx.business_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// The open session on a register (or the no-register slot), if any.
    pub async fn current_session(
        &self,
        ctx: &TenantContext,
        register_id: Option<&str>,
    ) -> DbResult<Option<CashSession>> {
        let session = sqlx::query_as::<_, CashSession>(
            r#"
            SELECT * FROM cash_sessions
            WHERE business_id = ?1 AND register_slot = ?2 AND status = 'open'
            "#,
        )
        .bind(&ctx.business_id)
        .bind(register_id.unwrap_or(NO_REGISTER_SLOT))
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Records a payment against a sale inside an open session.
    ///
    /// ## Returns
    /// * `Err(CoreError::SaleCancelled)` - the sale is cancelled
    /// * `Err(CoreError::CashSessionClosed)` - the session is closed
    /// * `Err(CoreError::PaymentExceedsBalance)` - more than is still owed
    pub async fn record_payment(
        &self,
        ctx: &TenantContext,
        sale_id: &str,
        session_id: &str,
        method: PaymentMethod,
        amount: Money,
    ) -> DbResult<Payment> {
        validate_positive_amount("amount", amount).map_err(CoreError::from)?;

        let mut tx = self.pool.begin().await?;
        let sale = lock_sale(&mut tx, &ctx.business_id, sale_id).await?;

        if sale.is_cancelled() {
            return Err(CoreError::SaleCancelled { sale_id: sale.id }.into());
        }

        let session = fetch_session(&mut tx, &ctx.business_id, session_id).await?;
        ensure_open(&session)?;

        let paid = paid_amount(&mut tx, &sale.id).await?;
        let outstanding = outstanding_balance(sale.total, paid);
        if amount > outstanding {
            return Err(CoreError::PaymentExceedsBalance {
                sale_id: sale.id,
                amount,
                outstanding,
            }
            .into());
        }

        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            business_id: ctx.business_id.clone(),
            sale_id: sale.id,
            cash_session_id: session.id,
            method,
            amount,
            created_by: ctx.user_id.clone(),
            created_at: Utc::now(),
        };
        insert_payment(&mut tx, &payment).await?;
        tx.commit().await?;

        info!(
            payment_id = %payment.id,
            sale_id = %payment.sale_id,
            method = %payment.method,
            amount = %payment.amount,
            "Payment recorded"
        );
        Ok(payment)
    }

    /// Records cash put into or taken out of the drawer.
    pub async fn record_cash_movement(
        &self,
        ctx: &TenantContext,
        session_id: &str,
        movement_type: CashMovementType,
        category: &str,
        amount: Money,
        note: Option<&str>,
    ) -> DbResult<CashMovement> {
        validate_positive_amount("amount", amount).map_err(CoreError::from)?;
        validate_name("category", category, 100).map_err(CoreError::from)?;
        validate_note("note", note).map_err(CoreError::from)?;

        let mut tx = self.pool.begin().await?;
        let session = lock_session(&mut tx, &ctx.business_id, session_id).await?;
        ensure_open(&session)?;

        let movement = CashMovement {
            id: Uuid::new_v4().to_string(),
            business_id: ctx.business_id.clone(),
            cash_session_id: session.id,
            movement_type,
            category: category.trim().to_string(),
            amount,
            note: note.map(str::to_string),
            created_by: ctx.user_id.clone(),
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO cash_movements (
                id, business_id, cash_session_id, movement_type, category,
                amount, note, created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&movement.id)
        .bind(&movement.business_id)
        .bind(&movement.cash_session_id)
        .bind(movement.movement_type)
        .bind(&movement.category)
        .bind(movement.amount)
        .bind(&movement.note)
        .bind(&movement.created_by)
        .bind(movement.created_at)
        .execute(&mut *tx)
        .await?;

        enqueue(&mut tx, &LedgerEvent::cash_movement_recorded(&movement)).await?;
        tx.commit().await?;

        debug!(
            movement_id = %movement.id,
            session_id = %movement.cash_session_id,
            amount = %movement.amount,
            "Cash movement recorded"
        );
        Ok(movement)
    }

    /// Payment and movement aggregates for a session, open or closed.
    pub async fn compute_session_totals(
        &self,
        ctx: &TenantContext,
        session_id: &str,
    ) -> DbResult<SessionTotals> {
        let mut conn = self.pool.acquire().await?;
        let session = fetch_session(&mut conn, &ctx.business_id, session_id).await?;
        session_totals(&mut conn, &session).await
    }

    pub async fn list_payments(
        &self,
        ctx: &TenantContext,
        session_id: &str,
    ) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT * FROM payments
            WHERE cash_session_id = ?1 AND business_id = ?2
            ORDER BY created_at, rowid
            "#,
        )
        .bind(session_id)
        .bind(&ctx.business_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    pub async fn list_cash_movements(
        &self,
        ctx: &TenantContext,
        session_id: &str,
    ) -> DbResult<Vec<CashMovement>> {
        let movements = sqlx::query_as::<_, CashMovement>(
            r#"
            SELECT * FROM cash_movements
            WHERE cash_session_id = ?1 AND business_id = ?2
            ORDER BY created_at, rowid
            "#,
        )
        .bind(session_id)
        .bind(&ctx.business_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }

    /// Settles every sale the session still has an outstanding balance on,
    /// one balancing payment per sale in the sale's own payment method.
    ///
    /// Idempotent: settled sales are skipped on the next run.
    pub async fn collect_pending_session_sales(
        &self,
        ctx: &TenantContext,
        session_id: &str,
    ) -> DbResult<CollectionReport> {
        let session = self
            .get_session(ctx, session_id)
            .await?
            .ok_or_else(|| DbError::from(CoreError::not_found("CashSession", session_id)))?;
        ensure_open(&session)?;

        let window_end = Utc::now();
        let candidates: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT s.id FROM sales s
            WHERE s.business_id = ?1
              AND s.status = 'completed'
              AND (
                    s.cash_session_id = ?2
                 OR (s.cash_session_id IS NULL AND s.created_at >= ?3 AND s.created_at <= ?4)
              )
              AND s.total > COALESCE(
                    (SELECT SUM(p.amount) FROM payments p WHERE p.sale_id = s.id), 0)
            ORDER BY s.number
            "#,
        )
        .bind(&ctx.business_id)
        .bind(&session.id)
        .bind(session.opened_at)
        .bind(window_end)
        .fetch_all(&self.pool)
        .await?;

        debug!(session_id = %session.id, candidates = candidates.len(), "Collecting pending sales");

        let mut report = CollectionReport::new(&session.id);
        for sale_id in candidates {
            match self.collect_one(ctx, &session.id, &sale_id).await? {
                Some(payment) => report.record(payment.id, payment.amount),
                None => debug!(sale_id = %sale_id, "Nothing left to collect"),
            }
        }

        info!(
            session_id = %session.id,
            collected = report.collected_count,
            total = %report.collected_total,
            "Pending sales collected"
        );
        Ok(report)
    }

    /// Settles one sale in its own transaction, re-checking under the lock.
    async fn collect_one(
        &self,
        ctx: &TenantContext,
        session_id: &str,
        sale_id: &str,
    ) -> DbResult<Option<Payment>> {
        let mut tx = self.pool.begin().await?;
        let sale: Sale = lock_sale(&mut tx, &ctx.business_id, sale_id).await?;

        if sale.is_cancelled() {
            return Ok(None);
        }

        let session = fetch_session(&mut tx, &ctx.business_id, session_id).await?;
        ensure_open(&session)?;

        let paid = paid_amount(&mut tx, &sale.id).await?;
        let outstanding = outstanding_balance(sale.total, paid);
        if outstanding.is_zero() {
            return Ok(None);
        }

        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            business_id: ctx.business_id.clone(),
            sale_id: sale.id,
            cash_session_id: session.id,
            method: sale.payment_method,
            amount: outstanding,
            created_by: ctx.user_id.clone(),
            created_at: Utc::now(),
        };
        insert_payment(&mut tx, &payment).await?;
        tx.commit().await?;

        debug!(payment_id = %payment.id, sale_id = %payment.sale_id, amount = %payment.amount, "Sale settled");
        Ok(Some(payment))
    }

    /// Closes a session, snapshotting expected cash and the difference.
    ///
    /// ## Arguments
    /// * `closing_cash_counted` - what was counted in the drawer
    /// * `collect_pending` - settle unpaid sales first
    ///
    /// ## Returns
    /// * `Err(CoreError::CashSessionClosed)` - already closed; of two
    ///   concurrent closes exactly one succeeds
    pub async fn close_session(
        &self,
        ctx: &TenantContext,
        session_id: &str,
        closing_cash_counted: Money,
        note: Option<&str>,
        collect_pending: bool,
    ) -> DbResult<ClosedSession> {
        validate_non_negative_amount("closing_cash_counted", closing_cash_counted)
            .map_err(CoreError::from)?;
        validate_note("note", note).map_err(CoreError::from)?;

        let collection = if collect_pending {
            Some(self.collect_pending_session_sales(ctx, session_id).await?)
        } else {
            None
        };

        let mut tx = self.pool.begin().await?;
        let session = lock_session(&mut tx, &ctx.business_id, session_id).await?;
        ensure_open(&session)?;

        let totals = session_totals(&mut tx, &session).await?;
        let difference = totals.difference(closing_cash_counted);
        let now = Utc::now();

        let closed = sqlx::query_as::<_, CashSession>(
            r#"
            UPDATE cash_sessions
            SET status = ?2,
                closing_cash_counted = ?3,
                expected_cash_total = ?4,
                difference_amount = ?5,
                note = ?6,
                closed_by = ?7,
                closed_at = ?8
            WHERE id = ?1 AND status = 'open'
            RETURNING *
            "#,
        )
        .bind(&session.id)
        .bind(CashSessionStatus::Closed)
        .bind(closing_cash_counted)
        .bind(totals.expected_cash)
        .bind(difference)
        .bind(note)
        .bind(&ctx.user_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            DbError::from(CoreError::CashSessionClosed {
                session_id: session.id.clone(),
            })
        })?;

        tx.commit().await?;

        if !difference.is_zero() {
            warn!(
                session_id = %closed.id,
                expected = %totals.expected_cash,
                counted = %closing_cash_counted,
                difference = %difference,
                "Cash session closed with a difference"
            );
        }
        info!(session_id = %closed.id, expected = %totals.expected_cash, "Cash session closed");

        Ok(ClosedSession {
            session: closed,
            totals,
            collection,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
