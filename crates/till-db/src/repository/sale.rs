//! # Sale Repository
//!
//! Creating and cancelling sales. A sale is written once, complete; there is
//! no draft state.
//!
//! ## create_sale
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate shape, customer gate, discount sign     ← before BEGIN        │
//! │  BEGIN                                                                  │
//! │  1. number = sequences upsert                     ← takes write lock    │
//! │  2. cash session: named one must be open, or                           │
//! │     latest open one when the policy demands it                          │
//! │  3. per line: product (same business), unit price, NEGATIVE_PRICE gate  │
//! │  4. subtotal = Σ round(qty × unit_price); discount ≤ subtotal gate      │
//! │  5. INSERT sale                                                         │
//! │  6. per line: OUT movement (stock ledger) + INSERT sale_item            │
//! │  7. outbox: sale_completed                                              │
//! │  COMMIT  (any error above: nothing persisted, number not consumed)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## cancel_sale
//! Lock the sale row, return it unchanged if already cancelled, otherwise
//! one compensating IN per line whose product still exists, then status,
//! `cancelled_at`, the reason appended to notes and a `sale_cancelled`
//! event, all in one transaction.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::cash::{fetch_session, latest_open_session};
use crate::repository::outbox::enqueue;
use crate::repository::product::fetch_product;
use crate::repository::sequence::{next_value, SALE_SEQUENCE};
use crate::repository::stock::register_stock_movement;
use till_core::cash::outstanding_balance;
use till_core::validation::{validate_name, validate_new_sale};
use till_core::{
    CoreError, CoreResult, LedgerEvent, Money, MovementSource, NewSale, Sale, SaleDetail,
    SaleItem, SaleStatus, StockMovementRequest, StockMovementType, TenantContext,
    ValidationError, MAX_NOTE_LENGTH,
};

// =============================================================================
// Policy Gates
// =============================================================================

/// Gates decidable from the request alone.
pub(crate) fn check_request_gates(
    ctx: &TenantContext,
    customer_id: Option<&str>,
    discount: Money,
) -> CoreResult<()> {
    let has_customer = customer_id.map(|c| !c.trim().is_empty()).unwrap_or(false);
    if ctx.policy.require_customer_for_sales && !has_customer {
        return Err(CoreError::CustomerRequired);
    }

    if discount.is_negative() && !ctx.policy.allow_negative_price_or_discount {
        return Err(ValidationError::MustNotBeNegative {
            field: "discount".to_string(),
        }
        .into());
    }

    Ok(())
}

/// Picks the session a new sale is tagged to.
///
/// A named session must belong to the business and be open. With no name,
/// the latest open session is used when the policy requires one.
async fn resolve_sale_session(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    requested: Option<&str>,
) -> DbResult<Option<String>> {
    if let Some(session_id) = requested {
        let session = fetch_session(conn, &ctx.business_id, session_id).await?;
        if !session.is_open() {
            return Err(CoreError::CashSessionClosed {
                session_id: session.id,
            }
            .into());
        }
        return Ok(Some(session.id));
    }

    if !ctx.policy.block_sales_if_no_open_cash_session {
        return Ok(None);
    }

    match latest_open_session(conn, &ctx.business_id).await? {
        Some(session) => Ok(Some(session.id)),
        None => Err(CoreError::CashSessionRequired.into()),
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

/// Locks a sale row for the rest of the transaction.
pub(crate) async fn lock_sale(
    conn: &mut SqliteConnection,
    business_id: &str,
    sale_id: &str,
) -> DbResult<Sale> {
    sqlx::query_as::<_, Sale>(
        r#"
        UPDATE sales SET updated_at = updated_at
        WHERE id = ?1 AND business_id = ?2
        RETURNING *
        "#,
    )
    .bind(sale_id)
    .bind(business_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| CoreError::not_found("Sale", sale_id).into())
}

/// Sum of payments recorded against a sale.
pub(crate) async fn paid_amount(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Money> {
    let paid: Money =
        sqlx::query_scalar("SELECT COALESCE(SUM(amount), 0) FROM payments WHERE sale_id = ?1")
            .bind(sale_id)
            .fetch_one(&mut *conn)
            .await?;

    Ok(paid)
}

async fn fetch_items(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<SaleItem>> {
    let items = sqlx::query_as::<_, SaleItem>(
        r#"
        SELECT id, sale_id, product_id, product_name, sku, quantity, unit_price, line_total
        FROM sale_items
        WHERE sale_id = ?1
        ORDER BY position
        "#,
    )
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(items)
}

/// The sale creation path shared by direct sales and order close.
///
/// Must run inside a transaction; request gates are the caller's job.
pub(crate) async fn create_sale_in_tx(
    conn: &mut SqliteConnection,
    ctx: &TenantContext,
    new: &NewSale,
) -> DbResult<SaleDetail> {
    let policy = ctx.policy;
    let number = next_value(conn, &ctx.business_id, SALE_SEQUENCE).await?;
    let cash_session_id = resolve_sale_session(conn, ctx, new.cash_session_id.as_deref()).await?;

    let sale_id = Uuid::new_v4().to_string();
    let now = Utc::now();

    // Snapshot lines
    let mut items = Vec::with_capacity(new.items.len());
    for line in &new.items {
        let product = fetch_product(conn, &ctx.business_id, &line.product_id).await?;
        let unit_price = line.unit_price.unwrap_or(product.price);

        if unit_price.is_negative() && !policy.allow_negative_price_or_discount {
            return Err(CoreError::NegativePrice {
                product_id: product.id,
            }
            .into());
        }

        let (product_name, sku) = match &line.snapshot {
            Some(snapshot) => (snapshot.product_name.clone(), snapshot.sku.clone()),
            None => (product.name, product.sku),
        };

        items.push(SaleItem {
            id: Uuid::new_v4().to_string(),
            sale_id: sale_id.clone(),
            product_id: Some(product.id),
            product_name,
            sku,
            quantity: line.quantity,
            unit_price,
            line_total: unit_price.times(line.quantity),
        });
    }

    let subtotal: Money = items.iter().map(|item| item.line_total).sum();
    if new.discount > subtotal && !policy.allow_negative_price_or_discount {
        return Err(CoreError::DiscountExceedsSubtotal {
            discount: new.discount,
            subtotal,
        }
        .into());
    }

    let sale = Sale {
        id: sale_id.clone(),
        business_id: ctx.business_id.clone(),
        number,
        status: SaleStatus::Completed,
        subtotal,
        discount: new.discount,
        total: subtotal - new.discount,
        payment_method: new.payment_method,
        customer_id: new.customer_id.clone(),
        cash_session_id,
        notes: new.notes.clone(),
        created_by: ctx.user_id.clone(),
        created_at: now,
        updated_at: now,
        cancelled_at: None,
    };

    sqlx::query(
        r#"
        INSERT INTO sales (
            id, business_id, number, status, subtotal, discount, total,
            payment_method, customer_id, cash_session_id, notes,
            created_by, created_at, updated_at, cancelled_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
        "#,
    )
    .bind(&sale.id)
    .bind(&sale.business_id)
    .bind(sale.number)
    .bind(sale.status)
    .bind(sale.subtotal)
    .bind(sale.discount)
    .bind(sale.total)
    .bind(sale.payment_method)
    .bind(&sale.customer_id)
    .bind(&sale.cash_session_id)
    .bind(&sale.notes)
    .bind(&sale.created_by)
    .bind(sale.created_at)
    .bind(sale.updated_at)
    .bind(sale.cancelled_at)
    .execute(&mut *conn)
    .await?;

    for (position, (item, line)) in items.iter().zip(&new.items).enumerate() {
        let request = StockMovementRequest {
            product_id: line.product_id.clone(),
            movement_type: StockMovementType::Out,
            quantity: line.quantity,
            note: Some(format!("Sale #{}", sale.number)),
            allow_negative: policy.allow_sell_without_stock || line.allow_negative_stock,
            source: MovementSource::Sale {
                sale_id: sale.id.clone(),
            },
        };
        register_stock_movement(conn, ctx, &request).await?;

        sqlx::query(
            r#"
            INSERT INTO sale_items (
                id, sale_id, product_id, product_name, sku,
                quantity, unit_price, line_total, position
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&item.id)
        .bind(&item.sale_id)
        .bind(&item.product_id)
        .bind(&item.product_name)
        .bind(&item.sku)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.line_total)
        .bind(position as i64)
        .execute(&mut *conn)
        .await?;
    }

    enqueue(conn, &LedgerEvent::sale_completed(&sale)).await?;

    debug!(sale_id = %sale.id, number = sale.number, lines = items.len(), "Sale persisted");
    Ok(SaleDetail { sale, items })
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Creates a completed sale in one transaction.
    ///
    /// ## Returns
    /// * `Ok(SaleDetail)` - the sale with its numbered lines
    /// * `Err(..)` - validation, policy, stock or not-found; nothing persisted
    pub async fn create_sale(&self, ctx: &TenantContext, new: NewSale) -> DbResult<SaleDetail> {
        validate_new_sale(&new).map_err(CoreError::from)?;
        check_request_gates(ctx, new.customer_id.as_deref(), new.discount)?;

        let mut tx = self.pool.begin().await?;
        let detail = create_sale_in_tx(&mut tx, ctx, &new).await?;
        tx.commit().await?;

        info!(
            sale_id = %detail.sale.id,
            number = detail.sale.number,
            total = %detail.sale.total,
            "Sale created"
        );
        Ok(detail)
    }

    /// Cancels a sale and puts its stock back.
    ///
    /// Cancelling a cancelled sale returns it unchanged. Lines whose product
    /// has since been deleted are skipped.
    pub async fn cancel_sale(
        &self,
        ctx: &TenantContext,
        sale_id: &str,
        reason: &str,
    ) -> DbResult<Sale> {
        validate_name("reason", reason, MAX_NOTE_LENGTH).map_err(CoreError::from)?;

        let mut tx = self.pool.begin().await?;
        let sale = lock_sale(&mut tx, &ctx.business_id, sale_id).await?;

        if sale.is_cancelled() {
            debug!(sale_id = %sale_id, "Sale already cancelled");
            tx.rollback().await?;
            return Ok(sale);
        }

        let items = fetch_items(&mut tx, &sale.id).await?;
        for item in &items {
            let Some(product_id) = &item.product_id else {
                debug!(item_id = %item.id, "Skipping line with deleted product");
                continue;
            };

            let request = StockMovementRequest {
                product_id: product_id.clone(),
                movement_type: StockMovementType::In,
                quantity: item.quantity,
                note: Some(format!("Cancel sale #{}", sale.number)),
                allow_negative: false,
                source: MovementSource::SaleCancellation {
                    sale_id: sale.id.clone(),
                },
            };
            register_stock_movement(&mut tx, ctx, &request).await?;
        }

        let now = Utc::now();
        let cancel_note = format!("Cancelled: {}", reason.trim());
        let notes = match &sale.notes {
            Some(existing) if !existing.is_empty() => format!("{}\n{}", existing, cancel_note),
            _ => cancel_note,
        };

        let cancelled = sqlx::query_as::<_, Sale>(
            r#"
            UPDATE sales
            SET status = ?2, notes = ?3, cancelled_at = ?4, updated_at = ?4
            WHERE id = ?1
            RETURNING *
            "#,
        )
        .bind(&sale.id)
        .bind(SaleStatus::Cancelled)
        .bind(notes)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        enqueue(&mut tx, &LedgerEvent::sale_cancelled(&cancelled)).await?;
        tx.commit().await?;

        info!(sale_id = %cancelled.id, number = cancelled.number, "Sale cancelled");
        Ok(cancelled)
    }

    pub async fn get_sale(&self, ctx: &TenantContext, sale_id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>(
            "SELECT * FROM sales WHERE id = ?1 AND business_id = ?2",
        )
        .bind(sale_id)
        .bind(&ctx.business_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sale)
    }

    /// Sale with its lines in entry order.
    pub async fn get_sale_detail(&self, ctx: &TenantContext, sale_id: &str) -> DbResult<SaleDetail> {
        let sale = self
            .get_sale(ctx, sale_id)
            .await?
            .ok_or_else(|| DbError::from(CoreError::not_found("Sale", sale_id)))?;

        let mut conn = self.pool.acquire().await?;
        let items = fetch_items(&mut conn, &sale.id).await?;

        Ok(SaleDetail { sale, items })
    }

    /// Total minus payments so far; zero for cancelled sales.
    pub async fn outstanding_balance(&self, ctx: &TenantContext, sale_id: &str) -> DbResult<Money> {
        let sale = self
            .get_sale(ctx, sale_id)
            .await?
            .ok_or_else(|| DbError::from(CoreError::not_found("Sale", sale_id)))?;

        if sale.is_cancelled() {
            return Ok(Money::zero());
        }

        let mut conn = self.pool.acquire().await?;
        let paid = paid_amount(&mut conn, &sale.id).await?;
        Ok(outstanding_balance(sale.total, paid))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use till_core::{
        BusinessPolicy, ErrorCode, NewProduct, PaymentMethod, Quantity, SaleLineInput,
    };

    struct Fixture {
        db: Database,
        ctx: TenantContext,
        coffee: String,
        bagel: String,
    }

    async fn setup() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let business = db.businesses().create("Cafe").await.unwrap();
        let ctx = TenantContext::new(&business.id, "cashier-1", "cashier");

        let coffee = db
            .products()
            .create(&ctx, NewProduct::new("Coffee", Money::from_cents(350)).sku("COF"))
            .await
            .unwrap()
            .id;
        let bagel = db
            .products()
            .create(&ctx, NewProduct::new("Bagel", Money::from_cents(225)))
            .await
            .unwrap()
            .id;

        for product in [&coffee, &bagel] {
            db.stock()
                .register_movement(
                    &ctx,
                    StockMovementRequest::manual(product, StockMovementType::In, Quantity::from_units(10)),
                )
                .await
                .unwrap();
        }

        Fixture { db, ctx, coffee, bagel }
    }

    fn units(n: i64) -> Quantity {
        Quantity::from_units(n)
    }

    fn code(err: DbError) -> ErrorCode {
        err.as_domain().map(|e| e.code()).unwrap_or(ErrorCode::Internal)
    }

    #[tokio::test]
    async fn test_create_sale_totals_and_stock() {
        let f = setup().await;

        let detail = f
            .db
            .sales()
            .create_sale(
                &f.ctx,
                NewSale::new(
                    vec![
                        SaleLineInput::new(&f.coffee, units(2)),
                        SaleLineInput::new(&f.bagel, Quantity::from_hundredths(150)),
                    ],
                    PaymentMethod::Card,
                )
                .discount(Money::from_cents(100)),
            )
            .await
            .unwrap();

        // 2 × 3.50 + 1.5 × 2.25 (3.375 → 3.38)
        assert_eq!(detail.sale.subtotal, Money::from_cents(1038));
        assert_eq!(detail.sale.total, Money::from_cents(938));
        assert_eq!(detail.sale.number, 1);
        assert_eq!(detail.items[0].sku.as_deref(), Some("COF"));

        let stock = f.db.stock();
        assert_eq!(stock.stock_level(&f.ctx, &f.coffee).await.unwrap(), units(8));
        assert_eq!(
            stock.stock_level(&f.ctx, &f.bagel).await.unwrap(),
            Quantity::from_hundredths(850)
        );

        let movements = stock.movements(&f.ctx, &f.coffee).await.unwrap();
        assert_eq!(
            movements.last().unwrap().source,
            MovementSource::Sale {
                sale_id: detail.sale.id.clone()
            }
        );
    }

    #[tokio::test]
    async fn test_numbers_are_sequential() {
        let f = setup().await;
        let sales = f.db.sales();

        for expected in 1..=3 {
            let detail = sales
                .create_sale(
                    &f.ctx,
                    NewSale::new(vec![SaleLineInput::new(&f.coffee, units(1))], PaymentMethod::Cash),
                )
                .await
                .unwrap();
            assert_eq!(detail.sale.number, expected);
        }
    }

    #[tokio::test]
    async fn test_insufficient_stock_rolls_back_everything() {
        let f = setup().await;

        let err = f
            .db
            .sales()
            .create_sale(
                &f.ctx,
                NewSale::new(
                    vec![
                        SaleLineInput::new(&f.coffee, units(1)),
                        SaleLineInput::new(&f.bagel, units(50)),
                    ],
                    PaymentMethod::Cash,
                ),
            )
            .await
            .unwrap_err();
        assert_eq!(code(err), ErrorCode::InsufficientStock);

        // First line's OUT rolled back too
        assert_eq!(f.db.stock().stock_level(&f.ctx, &f.coffee).await.unwrap(), units(10));
        assert_eq!(f.db.outbox().count_pending().await.unwrap(), 0);

        // Number 1 was not consumed
        let detail = f
            .db
            .sales()
            .create_sale(
                &f.ctx,
                NewSale::new(vec![SaleLineInput::new(&f.coffee, units(1))], PaymentMethod::Cash),
            )
            .await
            .unwrap();
        assert_eq!(detail.sale.number, 1);
    }

    #[tokio::test]
    async fn test_discount_and_price_gates() {
        let f = setup().await;
        let sales = f.db.sales();
        let line = || vec![SaleLineInput::new(&f.coffee, units(1))];

        let err = sales
            .create_sale(&f.ctx, NewSale::new(line(), PaymentMethod::Cash).discount(Money::from_cents(400)))
            .await
            .unwrap_err();
        assert_eq!(code(err), ErrorCode::DiscountExceedsSubtotal);

        let err = sales
            .create_sale(
                &f.ctx,
                NewSale::new(
                    vec![SaleLineInput::new(&f.coffee, units(1)).unit_price(Money::from_cents(-100))],
                    PaymentMethod::Cash,
                ),
            )
            .await
            .unwrap_err();
        assert_eq!(code(err), ErrorCode::NegativePrice);

        let permissive = f.ctx.clone().with_policy(BusinessPolicy {
            allow_negative_price_or_discount: true,
            ..Default::default()
        });
        let detail = sales
            .create_sale(&permissive, NewSale::new(line(), PaymentMethod::Cash).discount(Money::from_cents(400)))
            .await
            .unwrap();
        assert_eq!(detail.sale.total, Money::from_cents(-50));
    }

    #[tokio::test]
    async fn test_customer_and_session_gates() {
        let f = setup().await;
        let sales = f.db.sales();
        let new_sale = || NewSale::new(vec![SaleLineInput::new(&f.coffee, units(1))], PaymentMethod::Cash);

        let ctx = f.ctx.clone().with_policy(BusinessPolicy {
            require_customer_for_sales: true,
            ..Default::default()
        });
        let err = sales.create_sale(&ctx, new_sale()).await.unwrap_err();
        assert_eq!(code(err), ErrorCode::CustomerRequired);
        assert!(sales.create_sale(&ctx, new_sale().customer("cust-1")).await.is_ok());

        let ctx = f.ctx.clone().with_policy(BusinessPolicy {
            block_sales_if_no_open_cash_session: true,
            ..Default::default()
        });
        let err = sales.create_sale(&ctx, new_sale()).await.unwrap_err();
        assert_eq!(code(err), ErrorCode::CashSessionRequired);

        let session = f.db.cash().open_session(&ctx, None, Money::zero()).await.unwrap();
        let detail = sales.create_sale(&ctx, new_sale()).await.unwrap();
        assert_eq!(detail.sale.cash_session_id.as_deref(), Some(session.id.as_str()));
    }

    #[tokio::test]
    async fn test_cancel_restores_stock_once() {
        let f = setup().await;
        let sales = f.db.sales();

        let detail = sales
            .create_sale(
                &f.ctx,
                NewSale::new(vec![SaleLineInput::new(&f.coffee, units(3))], PaymentMethod::Cash),
            )
            .await
            .unwrap();
        assert_eq!(f.db.stock().stock_level(&f.ctx, &f.coffee).await.unwrap(), units(7));

        let cancelled = sales.cancel_sale(&f.ctx, &detail.sale.id, "wrong order").await.unwrap();
        assert_eq!(cancelled.status, SaleStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());
        assert_eq!(cancelled.notes.as_deref(), Some("Cancelled: wrong order"));
        assert_eq!(f.db.stock().stock_level(&f.ctx, &f.coffee).await.unwrap(), units(10));

        // Second cancel is a no-op
        let again = sales.cancel_sale(&f.ctx, &detail.sale.id, "again").await.unwrap();
        assert_eq!(again, cancelled);
        assert_eq!(f.db.stock().stock_level(&f.ctx, &f.coffee).await.unwrap(), units(10));
        assert_eq!(
            f.db.stock().replay_quantity(&f.ctx, &f.coffee).await.unwrap(),
            units(10)
        );
        assert_eq!(sales.outstanding_balance(&f.ctx, &detail.sale.id).await.unwrap(), Money::zero());
    }

    #[tokio::test]
    async fn test_cancel_skips_deleted_products() {
        let f = setup().await;

        let detail = f
            .db
            .sales()
            .create_sale(
                &f.ctx,
                NewSale::new(
                    vec![
                        SaleLineInput::new(&f.coffee, units(1)),
                        SaleLineInput::new(&f.bagel, units(1)),
                    ],
                    PaymentMethod::Cash,
                ),
            )
            .await
            .unwrap();

        f.db.products().delete(&f.ctx, &f.bagel).await.unwrap();

        let cancelled = f.db.sales().cancel_sale(&f.ctx, &detail.sale.id, "void").await.unwrap();
        assert!(cancelled.is_cancelled());
        assert_eq!(f.db.stock().stock_level(&f.ctx, &f.coffee).await.unwrap(), units(10));

        let after = f.db.sales().get_sale_detail(&f.ctx, &detail.sale.id).await.unwrap();
        assert_eq!(after.items[1].product_id, None);
        assert_eq!(after.items[1].product_name, "Bagel");
    }

    #[tokio::test]
    async fn test_other_tenant_cannot_cancel() {
        let f = setup().await;
        let other = f.db.businesses().create("Other").await.unwrap();
        let other_ctx = TenantContext::new(&other.id, "u", "cashier");

        let detail = f
            .db
            .sales()
            .create_sale(
                &f.ctx,
                NewSale::new(vec![SaleLineInput::new(&f.coffee, units(1))], PaymentMethod::Cash),
            )
            .await
            .unwrap();

        let err = f.db.sales().cancel_sale(&other_ctx, &detail.sale.id, "x").await.unwrap_err();
        assert_eq!(code(err), ErrorCode::NotFound);
        assert!(f.db.sales().get_sale(&other_ctx, &detail.sale.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_events_are_queued() {
        let f = setup().await;

        let detail = f
            .db
            .sales()
            .create_sale(
                &f.ctx,
                NewSale::new(vec![SaleLineInput::new(&f.coffee, units(1))], PaymentMethod::Cash),
            )
            .await
            .unwrap();
        f.db.sales().cancel_sale(&f.ctx, &detail.sale.id, "test").await.unwrap();

        let entries = f.db.outbox().list_for_business(&f.ctx.business_id).await.unwrap();
        let keys: Vec<_> = entries.iter().map(|e| e.event_key.clone()).collect();
        assert_eq!(
            keys,
            vec![
                format!("sale_completed:{}", detail.sale.id),
                format!("sale_cancelled:{}", detail.sale.id),
            ]
        );
        assert_eq!(entries[1].event().unwrap().amount, Money::from_cents(-350));
    }

    #[tokio::test]
    async fn test_validation_before_transaction() {
        let f = setup().await;
        let err = f
            .db
            .sales()
            .create_sale(&f.ctx, NewSale::new(vec![], PaymentMethod::Cash))
            .await
            .unwrap_err();
        assert_eq!(code(err), ErrorCode::ValidationFailed);
    }

    #[tokio::test]
    async fn test_cancel_restores_stock_that_went_negative() {
        let f = setup().await;
        let sales = f.db.sales();
        let loose = f.ctx.clone().with_policy(BusinessPolicy {
            allow_sell_without_stock: true,
            ..Default::default()
        });

        let first = sales
            .create_sale(&loose, NewSale::new(vec![SaleLineInput::new(&f.bagel, units(12))], PaymentMethod::Cash))
            .await
            .unwrap();
        let second = sales
            .create_sale(&loose, NewSale::new(vec![SaleLineInput::new(&f.bagel, units(3))], PaymentMethod::Cash))
            .await
            .unwrap();
        assert_eq!(f.db.stock().stock_level(&f.ctx, &f.bagel).await.unwrap(), units(-5));

        // Cancelling under the strict default policy still puts the goods back
        sales.cancel_sale(&f.ctx, &first.sale.id, "void").await.unwrap();
        assert_eq!(f.db.stock().stock_level(&f.ctx, &f.bagel).await.unwrap(), units(7));

        sales.cancel_sale(&f.ctx, &second.sale.id, "void").await.unwrap();
        let level = f.db.stock().stock_level(&f.ctx, &f.bagel).await.unwrap();
        assert_eq!(level, units(10));
        assert_eq!(f.db.stock().replay_quantity(&f.ctx, &f.bagel).await.unwrap(), level);
    }
}
