//! # Order Repository
//!
//! Table and counter orders: an editable basket that becomes a sale exactly
//! once.
//!
//! ## Lifecycle
//! ```text
//! create_order ──► DRAFT ──► OPEN ──► SENT ──┬──► PAID       (close_order)
//!                    │         │        │    └──► CANCELLED  (cancel_order)
//!                    └─────────┴────────┘
//!                   items editable while no sale is linked
//! ```
//!
//! ## add_item
//! ```text
//! BEGIN
//! 1. lock order row; editable?              else ORDER_NOT_EDITABLE
//! 2. product (same business), unit = price + modifier deltas
//! 3. committed = Σ qty of this product already on the order + new qty
//!    committed > stock level:
//!      policy allows  → line flagged sold_without_stock
//!      otherwise      → OUT_OF_STOCK
//! 4. merge into (product, name, note, unit, modifier signature) or append
//! 5. subtotal = Σ line totals
//! COMMIT
//! ```
//!
//! Stock is only reserved in the sense of the check above; the ledger moves
//! when the order closes and its sale is created.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::product::fetch_product;
use crate::repository::sale::{check_request_gates, create_sale_in_tx};
use crate::repository::sequence::{next_value, ORDER_SEQUENCE};
use crate::repository::stock::current_level;
use till_core::order::{
    check_line_stock, committed_quantity, find_mergeable, modifier_signature, normalize_note,
    order_subtotal, unit_price_with_modifiers, LineKey,
};
use till_core::validation::{
    validate_name, validate_new_sale, validate_note, validate_order_item, validate_quantity,
};
use till_core::{
    CloseOrder, CoreError, NewOrder, NewSale, Order, OrderDetail, OrderItem, OrderItemInput,
    OrderStatus, Quantity, SaleDetail, SaleLineInput, TenantContext, ValidationError,
};

/// An order closed into a sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedOrder {
    pub order: OrderDetail,
    pub sale: SaleDetail,
}

// =============================================================================
// Transaction Helpers
// =============================================================================

async fn lock_order(
    conn: &mut SqliteConnection,
    business_id: &str,
    order_id: &str,
) -> DbResult<Order> {
    sqlx::query_as::<_, Order>(
        r#"
        UPDATE orders SET updated_at = updated_at
        WHERE id = ?1 AND business_id = ?2
        RETURNING *
        "#,
    )
    .bind(order_id)
    .bind(business_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| CoreError::not_found("Order", order_id).into())
}

fn ensure_editable(order: &Order) -> DbResult<()> {
    if !order.is_editable() {
        return Err(CoreError::OrderNotEditable {
            order_id: order.id.clone(),
            status: order.status,
        }
        .into());
    }
    Ok(())
}

async fn fetch_items(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<OrderItem>> {
    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = ?1 ORDER BY created_at, rowid",
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(items)
}

/// Recomputes the subtotal from the lines and returns the order with its
/// items.
async fn refresh_order(conn: &mut SqliteConnection, order_id: &str) -> DbResult<OrderDetail> {
    let items = fetch_items(conn, order_id).await?;
    let subtotal = order_subtotal(&items);

    let order = sqlx::query_as::<_, Order>(
        "UPDATE orders SET subtotal = ?2, updated_at = ?3 WHERE id = ?1 RETURNING *",
    )
    .bind(order_id)
    .bind(subtotal)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await?;

    Ok(OrderDetail { order, items })
}

fn append_note(existing: Option<&str>, addition: String) -> String {
    match existing {
        Some(notes) if !notes.is_empty() => format!("{}\n{}", notes, addition),
        _ => addition,
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for orders and their lines.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Starts an order in DRAFT with the next order number.
    ///
    /// The table reference is stored as given; whether the table is free is
    /// decided outside the engine.
    pub async fn create_order(&self, ctx: &TenantContext, new: NewOrder) -> DbResult<Order> {
        if let Some(table_ref) = &new.table_ref {
            validate_name("table_ref", table_ref, 50).map_err(CoreError::from)?;
        }
        validate_note("notes", new.notes.as_deref()).map_err(CoreError::from)?;

        let mut tx = self.pool.begin().await?;
        let number = next_value(&mut tx, &ctx.business_id, ORDER_SEQUENCE).await?;

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4().to_string(),
            business_id: ctx.business_id.clone(),
            number,
            status: OrderStatus::Draft,
            channel: new.channel,
            table_ref: new.table_ref.map(|t| t.trim().to_string()),
            customer_id: new.customer_id,
            notes: new.notes,
            subtotal: Default::default(),
            sale_id: None,
            created_by: ctx.user_id.clone(),
            created_at: now,
            updated_at: now,
            closed_at: None,
            cancelled_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, business_id, number, status, channel, table_ref, customer_id,
                notes, subtotal, created_by, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&order.id)
        .bind(&order.business_id)
        .bind(order.number)
        .bind(order.status)
        .bind(order.channel)
        .bind(&order.table_ref)
        .bind(&order.customer_id)
        .bind(&order.notes)
        .bind(order.subtotal)
        .bind(&order.created_by)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(order_id = %order.id, number = order.number, channel = ?order.channel, "Order created");
        Ok(order)
    }

    pub async fn open_order(&self, ctx: &TenantContext, order_id: &str) -> DbResult<Order> {
        self.transition(ctx, order_id, OrderStatus::Open).await
    }

    /// Marks the order as sent to the kitchen or bar.
    pub async fn send_order(&self, ctx: &TenantContext, order_id: &str) -> DbResult<Order> {
        self.transition(ctx, order_id, OrderStatus::Sent).await
    }

    async fn transition(
        &self,
        ctx: &TenantContext,
        order_id: &str,
        target: OrderStatus,
    ) -> DbResult<Order> {
        let mut tx = self.pool.begin().await?;
        let order = lock_order(&mut tx, &ctx.business_id, order_id).await?;

        if order.sale_id.is_some() {
            return Err(CoreError::OrderAlreadyClosed { order_id: order.id }.into());
        }
        if !order.status.can_transition_to(target) {
            return Err(CoreError::InvalidOrderTransition {
                order_id: order.id,
                from: order.status,
                to: target,
            }
            .into());
        }

        let updated = sqlx::query_as::<_, Order>(
            "UPDATE orders SET status = ?2, updated_at = ?3 WHERE id = ?1 RETURNING *",
        )
        .bind(&order.id)
        .bind(target)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(order_id = %updated.id, from = %order.status, to = %target, "Order status changed");
        Ok(updated)
    }

    /// Cancels an order that has not been paid.
    ///
    /// Cancelling a cancelled order returns it unchanged.
    pub async fn cancel_order(
        &self,
        ctx: &TenantContext,
        order_id: &str,
        reason: Option<&str>,
    ) -> DbResult<Order> {
        validate_note("reason", reason).map_err(CoreError::from)?;

        let mut tx = self.pool.begin().await?;
        let order = lock_order(&mut tx, &ctx.business_id, order_id).await?;

        if order.status == OrderStatus::Cancelled {
            tx.rollback().await?;
            return Ok(order);
        }
        if order.sale_id.is_some() || order.status == OrderStatus::Paid {
            return Err(CoreError::OrderAlreadyClosed { order_id: order.id }.into());
        }

        let notes = match normalize_note(reason) {
            Some(reason) => Some(append_note(
                order.notes.as_deref(),
                format!("Cancelled: {}", reason),
            )),
            None => order.notes.clone(),
        };
        let now = Utc::now();

        let cancelled = sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders
            SET status = ?2, notes = ?3, cancelled_at = ?4, updated_at = ?4
            WHERE id = ?1
            RETURNING *
            "#,
        )
        .bind(&order.id)
        .bind(OrderStatus::Cancelled)
        .bind(notes)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(order_id = %cancelled.id, number = cancelled.number, "Order cancelled");
        Ok(cancelled)
    }

    /// Adds a line, merging into an identical one when present.
    ///
    /// ## Returns
    /// * `Err(CoreError::OrderNotEditable)` - paid, cancelled or linked
    /// * `Err(CoreError::OutOfStock)` - short and the policy forbids it
    pub async fn add_item(
        &self,
        ctx: &TenantContext,
        order_id: &str,
        input: OrderItemInput,
    ) -> DbResult<OrderDetail> {
        validate_order_item(&input).map_err(CoreError::from)?;
        let policy = ctx.policy;

        let mut tx = self.pool.begin().await?;
        let order = lock_order(&mut tx, &ctx.business_id, order_id).await?;
        ensure_editable(&order)?;

        let product = fetch_product(&mut tx, &ctx.business_id, &input.product_id).await?;
        let base_price = input.unit_price.unwrap_or(product.price);
        let unit_price = unit_price_with_modifiers(base_price, &input.modifiers);

        if unit_price.is_negative() && !policy.allow_negative_price_or_discount {
            return Err(CoreError::NegativePrice {
                product_id: product.id,
            }
            .into());
        }

        let signature = modifier_signature(&input.modifiers);
        let note = normalize_note(input.note.as_deref());
        let items = fetch_items(&mut tx, &order.id).await?;

        let available = current_level(&mut tx, &ctx.business_id, &product.id).await?;
        let committed_after = committed_quantity(&items, &product.id) + input.quantity;
        let short = check_line_stock(
            &product.id,
            available,
            committed_after,
            policy.allow_sell_without_stock,
        )?;

        let key = LineKey {
            product_id: &product.id,
            product_name: &product.name,
            note: note.as_deref(),
            unit_price,
            modifier_signature: &signature,
        };

        match find_mergeable(&items, &key) {
            Some(index) => {
                let line = &items[index];
                let quantity = line.quantity + input.quantity;

                sqlx::query(
                    r#"
                    UPDATE order_items
                    SET quantity = ?2, line_total = ?3,
                        sold_without_stock = sold_without_stock OR ?4
                    WHERE id = ?1
                    "#,
                )
                .bind(&line.id)
                .bind(quantity)
                .bind(unit_price.times(quantity))
                .bind(short)
                .execute(&mut *tx)
                .await?;

                debug!(order_id = %order.id, item_id = %line.id, quantity = %quantity, "Order line merged");
            }
            None => {
                let item_id = Uuid::new_v4().to_string();
                let modifiers = serde_json::to_string(&input.modifiers)?;

                sqlx::query(
                    r#"
                    INSERT INTO order_items (
                        id, order_id, product_id, product_name, sku, note, unit_price,
                        quantity, line_total, modifiers, modifier_signature,
                        sold_without_stock, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                    "#,
                )
                .bind(&item_id)
                .bind(&order.id)
                .bind(&product.id)
                .bind(&product.name)
                .bind(&product.sku)
                .bind(&note)
                .bind(unit_price)
                .bind(input.quantity)
                .bind(unit_price.times(input.quantity))
                .bind(modifiers)
                .bind(&signature)
                .bind(short)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;

                debug!(order_id = %order.id, item_id = %item_id, product = %product.name, "Order line added");
            }
        }

        let detail = refresh_order(&mut tx, &order.id).await?;
        tx.commit().await?;

        if short {
            info!(order_id = %order.id, product_id = %product.id, "Line added without stock");
        }
        Ok(detail)
    }

    /// Sets a line's quantity. Raising it re-runs the stock check.
    pub async fn update_item_quantity(
        &self,
        ctx: &TenantContext,
        order_id: &str,
        item_id: &str,
        quantity: Quantity,
    ) -> DbResult<OrderDetail> {
        validate_quantity("quantity", quantity).map_err(CoreError::from)?;

        let mut tx = self.pool.begin().await?;
        let order = lock_order(&mut tx, &ctx.business_id, order_id).await?;
        ensure_editable(&order)?;

        let items = fetch_items(&mut tx, &order.id).await?;
        let line = items
            .iter()
            .find(|item| item.id == item_id)
            .ok_or_else(|| DbError::from(CoreError::not_found("OrderItem", item_id)))?;

        let short = if quantity > line.quantity {
            let available = current_level(&mut tx, &ctx.business_id, &line.product_id).await?;
            let committed_after =
                committed_quantity(&items, &line.product_id) - line.quantity + quantity;
            check_line_stock(
                &line.product_id,
                available,
                committed_after,
                ctx.policy.allow_sell_without_stock,
            )?
        } else {
            false
        };

        sqlx::query(
            r#"
            UPDATE order_items
            SET quantity = ?2, line_total = ?3,
                sold_without_stock = sold_without_stock OR ?4
            WHERE id = ?1
            "#,
        )
        .bind(&line.id)
        .bind(quantity)
        .bind(line.unit_price.times(quantity))
        .bind(short)
        .execute(&mut *tx)
        .await?;

        let detail = refresh_order(&mut tx, &order.id).await?;
        tx.commit().await?;

        debug!(order_id = %order_id, item_id = %item_id, quantity = %quantity, "Order line updated");
        Ok(detail)
    }

    pub async fn remove_item(
        &self,
        ctx: &TenantContext,
        order_id: &str,
        item_id: &str,
    ) -> DbResult<OrderDetail> {
        let mut tx = self.pool.begin().await?;
        let order = lock_order(&mut tx, &ctx.business_id, order_id).await?;
        ensure_editable(&order)?;

        let result = sqlx::query("DELETE FROM order_items WHERE id = ?1 AND order_id = ?2")
            .bind(item_id)
            .bind(&order.id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("OrderItem", item_id).into());
        }

        let detail = refresh_order(&mut tx, &order.id).await?;
        tx.commit().await?;

        debug!(order_id = %order_id, item_id = %item_id, "Order line removed");
        Ok(detail)
    }

    /// Turns the order into a sale and marks it PAID.
    ///
    /// ## Process
    /// ```text
    /// BEGIN
    /// 1. lock order; linked or PAID → ORDER_ALREADY_CLOSED
    ///                CANCELLED      → ORDER_NOT_EDITABLE
    /// 2. customer gate (request customer, else the order's)
    /// 3. sale creation path: number, session, OUT per line, outbox
    ///    lines flagged sold_without_stock may go negative
    /// 4. link sale where sale_id IS NULL; status PAID, closed_at
    /// COMMIT
    /// ```
    pub async fn close_order(
        &self,
        ctx: &TenantContext,
        order_id: &str,
        close: CloseOrder,
    ) -> DbResult<ClosedOrder> {
        let mut tx = self.pool.begin().await?;
        let order = lock_order(&mut tx, &ctx.business_id, order_id).await?;

        if order.sale_id.is_some() || order.status == OrderStatus::Paid {
            return Err(CoreError::OrderAlreadyClosed { order_id: order.id }.into());
        }
        ensure_editable(&order)?;

        let customer_id = close.customer_id.clone().or_else(|| order.customer_id.clone());
        check_request_gates(ctx, customer_id.as_deref(), close.discount)?;

        let items = fetch_items(&mut tx, &order.id).await?;
        if items.is_empty() {
            return Err(CoreError::from(ValidationError::Required {
                field: "items".to_string(),
            })
            .into());
        }

        let lines = items
            .iter()
            .map(|item| {
                let mut line = SaleLineInput::new(&item.product_id, item.quantity)
                    .unit_price(item.unit_price)
                    .snapshot(&item.product_name, item.sku.clone());
                line.allow_negative_stock = item.sold_without_stock;
                line
            })
            .collect();

        let mut new_sale = NewSale::new(lines, close.payment_method).discount(close.discount);
        new_sale.customer_id = customer_id;
        new_sale.cash_session_id = close.cash_session_id;
        new_sale.notes = Some(format!("Order #{}", order.number));
        validate_new_sale(&new_sale).map_err(CoreError::from)?;

        let sale = create_sale_in_tx(&mut tx, ctx, &new_sale).await?;

        let now = Utc::now();
        let paid = sqlx::query_as::<_, Order>(
            r#"
            UPDATE orders
            SET sale_id = ?2, status = ?3, closed_at = ?4, updated_at = ?4
            WHERE id = ?1 AND sale_id IS NULL
            RETURNING *
            "#,
        )
        .bind(&order.id)
        .bind(&sale.sale.id)
        .bind(OrderStatus::Paid)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            DbError::from(CoreError::OrderAlreadyClosed {
                order_id: order.id.clone(),
            })
        })?;

        tx.commit().await?;

        info!(
            order_id = %paid.id,
            sale_id = %sale.sale.id,
            sale_number = sale.sale.number,
            total = %sale.sale.total,
            "Order closed"
        );

        Ok(ClosedOrder {
            order: OrderDetail {
                order: paid,
                items,
            },
            sale,
        })
    }

    pub async fn get_order(&self, ctx: &TenantContext, order_id: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE id = ?1 AND business_id = ?2",
        )
        .bind(order_id)
        .bind(&ctx.business_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    pub async fn get_order_detail(
        &self,
        ctx: &TenantContext,
        order_id: &str,
    ) -> DbResult<OrderDetail> {
        let order = self
            .get_order(ctx, order_id)
            .await?
            .ok_or_else(|| DbError::from(CoreError::not_found("Order", order_id)))?;

        let mut conn = self.pool.acquire().await?;
        let items = fetch_items(&mut conn, &order.id).await?;

        Ok(OrderDetail { order, items })
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
        BusinessPolicy, ErrorCode, Money, NewProduct, OrderChannel, OrderModifier,
        PaymentMethod, StockMovementRequest, StockMovementType,
    };

    struct Fixture {
        db: Database,
        ctx: TenantContext,
        latte: String,
    }

    async fn setup(stock: i64) -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let business = db.businesses().create("Cafe").await.unwrap();
        let ctx = TenantContext::new(&business.id, "waiter-1", "waiter");
        let latte = db
            .products()
            .create(&ctx, NewProduct::new("Latte", Money::from_cents(300)))
            .await
            .unwrap()
            .id;
        if stock > 0 {
            db.stock()
                .register_movement(
                    &ctx,
                    StockMovementRequest::manual(&latte, StockMovementType::In, Quantity::from_units(stock)),
                )
                .await
                .unwrap();
        }
        Fixture { db, ctx, latte }
    }

    fn code(err: DbError) -> ErrorCode {
        err.as_domain().map(|e| e.code()).unwrap_or(ErrorCode::Internal)
    }

    fn oat() -> OrderModifier {
        OrderModifier::new("Oat milk", Money::from_cents(50))
    }

    #[tokio::test]
    async fn test_numbers_and_transitions() {
        let f = setup(10).await;
        let orders = f.db.orders();

        let first = orders
            .create_order(&f.ctx, NewOrder::new(OrderChannel::DineIn).table("T4"))
            .await
            .unwrap();
        let second = orders
            .create_order(&f.ctx, NewOrder::new(OrderChannel::Counter))
            .await
            .unwrap();
        assert_eq!((first.number, second.number), (1, 2));
        assert_eq!(first.status, OrderStatus::Draft);

        // Skipping forward is fine, going back is not
        let sent = orders.send_order(&f.ctx, &first.id).await.unwrap();
        assert_eq!(sent.status, OrderStatus::Sent);
        let err = orders.open_order(&f.ctx, &first.id).await.unwrap_err();
        assert_eq!(code(err), ErrorCode::InvalidOrderTransition);
    }

    #[tokio::test]
    async fn test_lines_merge_on_identity() {
        let f = setup(10).await;
        let orders = f.db.orders();
        let order = orders
            .create_order(&f.ctx, NewOrder::new(OrderChannel::Counter))
            .await
            .unwrap();

        orders
            .add_item(&f.ctx, &order.id, OrderItemInput::new(&f.latte, Quantity::from_units(1)).modifier(oat()))
            .await
            .unwrap();
        orders
            .add_item(&f.ctx, &order.id, OrderItemInput::new(&f.latte, Quantity::from_units(2)).modifier(oat()))
            .await
            .unwrap();
        orders
            .add_item(&f.ctx, &order.id, OrderItemInput::new(&f.latte, Quantity::from_units(1)))
            .await
            .unwrap();
        let detail = orders
            .add_item(
                &f.ctx,
                &order.id,
                OrderItemInput::new(&f.latte, Quantity::from_units(1)).note("no foam"),
            )
            .await
            .unwrap();

        assert_eq!(detail.items.len(), 3);
        assert_eq!(detail.items[0].quantity, Quantity::from_units(3));
        assert_eq!(detail.items[0].unit_price, Money::from_cents(350));
        assert_eq!(detail.items[0].modifiers, vec![oat()]);
        // 3 × 3.50 + 3.00 + 3.00
        assert_eq!(detail.order.subtotal, Money::from_cents(1650));
    }

    #[tokio::test]
    async fn test_running_quantity_checked_against_stock() {
        let f = setup(3).await;
        let orders = f.db.orders();
        let order = orders
            .create_order(&f.ctx, NewOrder::new(OrderChannel::Counter))
            .await
            .unwrap();

        orders
            .add_item(&f.ctx, &order.id, OrderItemInput::new(&f.latte, Quantity::from_units(2)))
            .await
            .unwrap();
        let err = orders
            .add_item(&f.ctx, &order.id, OrderItemInput::new(&f.latte, Quantity::from_units(2)).note("hot"))
            .await
            .unwrap_err();
        assert_eq!(code(err), ErrorCode::OutOfStock);

        // Permissive tenant gets a flagged line instead
        let ctx = f.ctx.clone().with_policy(BusinessPolicy {
            allow_sell_without_stock: true,
            ..BusinessPolicy::default()
        });
        let detail = orders
            .add_item(&ctx, &order.id, OrderItemInput::new(&f.latte, Quantity::from_units(2)).note("hot"))
            .await
            .unwrap();
        assert!(!detail.items[0].sold_without_stock);
        assert!(detail.items[1].sold_without_stock);
    }

    #[tokio::test]
    async fn test_update_and_remove_items() {
        let f = setup(5).await;
        let orders = f.db.orders();
        let order = orders
            .create_order(&f.ctx, NewOrder::new(OrderChannel::Takeaway))
            .await
            .unwrap();
        let detail = orders
            .add_item(&f.ctx, &order.id, OrderItemInput::new(&f.latte, Quantity::from_units(1)))
            .await
            .unwrap();
        let line_id = detail.items[0].id.clone();

        let detail = orders
            .update_item_quantity(&f.ctx, &order.id, &line_id, Quantity::from_units(4))
            .await
            .unwrap();
        assert_eq!(detail.order.subtotal, Money::from_cents(1200));

        let err = orders
            .update_item_quantity(&f.ctx, &order.id, &line_id, Quantity::from_units(6))
            .await
            .unwrap_err();
        assert_eq!(code(err), ErrorCode::OutOfStock);

        let detail = orders.remove_item(&f.ctx, &order.id, &line_id).await.unwrap();
        assert!(detail.items.is_empty());
        assert!(detail.order.subtotal.is_zero());
    }

    #[tokio::test]
    async fn test_close_creates_sale_once() {
        let f = setup(5).await;
        let orders = f.db.orders();
        let order = orders
            .create_order(&f.ctx, NewOrder::new(OrderChannel::DineIn).table("T1"))
            .await
            .unwrap();
        orders
            .add_item(&f.ctx, &order.id, OrderItemInput::new(&f.latte, Quantity::from_units(1)))
            .await
            .unwrap();

        let closed = orders
            .close_order(
                &f.ctx,
                &order.id,
                CloseOrder::new(PaymentMethod::Card).discount(Money::from_cents(50)),
            )
            .await
            .unwrap();

        assert_eq!(closed.order.order.status, OrderStatus::Paid);
        assert_eq!(closed.order.order.sale_id.as_deref(), Some(closed.sale.sale.id.as_str()));
        assert!(closed.order.order.closed_at.is_some());
        assert_eq!(closed.sale.sale.total, Money::from_cents(250));
        assert_eq!(
            f.db.stock().stock_level(&f.ctx, &f.latte).await.unwrap(),
            Quantity::from_units(4)
        );

        let err = orders
            .close_order(&f.ctx, &order.id, CloseOrder::new(PaymentMethod::Cash))
            .await
            .unwrap_err();
        assert_eq!(code(err), ErrorCode::OrderAlreadyClosed);

        let err = orders
            .add_item(&f.ctx, &order.id, OrderItemInput::new(&f.latte, Quantity::from_units(1)))
            .await
            .unwrap_err();
        assert_eq!(code(err), ErrorCode::OrderNotEditable);

        let err = orders.cancel_order(&f.ctx, &order.id, None).await.unwrap_err();
        assert_eq!(code(err), ErrorCode::OrderAlreadyClosed);
    }

    #[tokio::test]
    async fn test_flagged_line_keeps_exemption_at_close() {
        let f = setup(1).await;
        let orders = f.db.orders();
        let permissive = f.ctx.clone().with_policy(BusinessPolicy {
            allow_sell_without_stock: true,
            ..BusinessPolicy::default()
        });

        let order = orders
            .create_order(&permissive, NewOrder::new(OrderChannel::Counter))
            .await
            .unwrap();
        orders
            .add_item(&permissive, &order.id, OrderItemInput::new(&f.latte, Quantity::from_units(3)))
            .await
            .unwrap();

        // Policy tightened before close
        orders
            .close_order(&f.ctx, &order.id, CloseOrder::new(PaymentMethod::Cash))
            .await
            .unwrap();
        assert_eq!(
            f.db.stock().stock_level(&f.ctx, &f.latte).await.unwrap(),
            Quantity::from_units(-2)
        );
    }

    #[tokio::test]
    async fn test_close_gates_leave_order_untouched() {
        let f = setup(5).await;
        let orders = f.db.orders();
        let strict = f.ctx.clone().with_policy(BusinessPolicy {
            require_customer_for_sales: true,
            ..BusinessPolicy::default()
        });

        let order = orders
            .create_order(&f.ctx, NewOrder::new(OrderChannel::Counter))
            .await
            .unwrap();

        let err = orders
            .close_order(&f.ctx, &order.id, CloseOrder::new(PaymentMethod::Cash))
            .await
            .unwrap_err();
        assert_eq!(code(err), ErrorCode::ValidationFailed);

        orders
            .add_item(&f.ctx, &order.id, OrderItemInput::new(&f.latte, Quantity::from_units(1)))
            .await
            .unwrap();

        let err = orders
            .close_order(&strict, &order.id, CloseOrder::new(PaymentMethod::Cash))
            .await
            .unwrap_err();
        assert_eq!(code(err), ErrorCode::CustomerRequired);

        let detail = orders.get_order_detail(&f.ctx, &order.id).await.unwrap();
        assert!(detail.order.sale_id.is_none());
        assert_eq!(detail.order.status, OrderStatus::Draft);

        // A customer on the close request satisfies the gate
        let closed = orders
            .close_order(
                &strict,
                &order.id,
                CloseOrder::new(PaymentMethod::Cash).customer("cust-9"),
            )
            .await
            .unwrap();
        assert_eq!(closed.sale.sale.customer_id.as_deref(), Some("cust-9"));
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let f = setup(5).await;
        let orders = f.db.orders();
        let order = orders
            .create_order(&f.ctx, NewOrder::new(OrderChannel::Delivery))
            .await
            .unwrap();

        let cancelled = orders
            .cancel_order(&f.ctx, &order.id, Some("customer left"))
            .await
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.notes.as_deref(), Some("Cancelled: customer left"));

        let again = orders.cancel_order(&f.ctx, &order.id, None).await.unwrap();
        assert_eq!(again.cancelled_at, cancelled.cancelled_at);

        let err = orders
            .close_order(&f.ctx, &order.id, CloseOrder::new(PaymentMethod::Cash))
            .await
            .unwrap_err();
        assert_eq!(code(err), ErrorCode::OrderNotEditable);
    }

    #[tokio::test]
    async fn test_sale_keeps_order_line_snapshot() {
        let f = setup(0).await;
        let orders = f.db.orders();
        let mocha = f
            .db
            .products()
            .create(&f.ctx, NewProduct::new("Mocha", Money::from_cents(400)).sku("MOC-1"))
            .await
            .unwrap();
        f.db.stock()
            .register_movement(
                &f.ctx,
                StockMovementRequest::manual(&mocha.id, StockMovementType::In, Quantity::from_units(3)),
            )
            .await
            .unwrap();

        let order = orders
            .create_order(&f.ctx, NewOrder::new(OrderChannel::Counter))
            .await
            .unwrap();
        let detail = orders
            .add_item(&f.ctx, &order.id, OrderItemInput::new(&mocha.id, Quantity::from_units(1)))
            .await
            .unwrap();
        assert_eq!(detail.items[0].sku.as_deref(), Some("MOC-1"));

        // Catalog edited between taking the line and paying for it
        sqlx::query("UPDATE products SET name = 'Mocha Grande', sku = 'MOC-2' WHERE id = ?1")
            .bind(&mocha.id)
            .execute(f.db.pool())
            .await
            .unwrap();

        let closed = orders
            .close_order(&f.ctx, &order.id, CloseOrder::new(PaymentMethod::Card))
            .await
            .unwrap();
        let line = &closed.sale.items[0];
        assert_eq!(line.product_name, "Mocha");
        assert_eq!(line.sku.as_deref(), Some("MOC-1"));
        assert_eq!(line.unit_price, Money::from_cents(400));
    }
}
