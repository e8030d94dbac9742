//! End-to-end business scenarios against an in-memory database.

use till_core::{
    CashMovementType, CloseOrder, ErrorCode, ErrorPayload, Money, NewOrder, NewProduct, NewSale,
    OrderChannel, OrderItemInput, PaymentMethod, Product, Quantity, SaleLineInput,
    StockMovementRequest, StockMovementType, TenantContext,
};
use till_db::{Database, DbConfig, DbError};

struct Shop {
    db: Database,
    ctx: TenantContext,
}

impl Shop {
    async fn open() -> Shop {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let business = db.businesses().create("Scenario Shop").await.unwrap();
        let ctx = TenantContext::new(&business.id, "cashier-1", "cashier");
        Shop { db, ctx }
    }

    async fn product(&self, name: &str, price: Money, stock: i64) -> Product {
        let product = self
            .db
            .products()
            .create(&self.ctx, NewProduct::new(name, price))
            .await
            .unwrap();
        if stock > 0 {
            self.db
                .stock()
                .register_movement(
                    &self.ctx,
                    StockMovementRequest::manual(&product.id, StockMovementType::In, Quantity::from_units(stock)),
                )
                .await
                .unwrap();
        }
        product
    }

    async fn level(&self, product: &Product) -> Quantity {
        self.db.stock().stock_level(&self.ctx, &product.id).await.unwrap()
    }
}

fn code(err: DbError) -> ErrorCode {
    ErrorPayload::from(err).code
}

#[tokio::test]
async fn overselling_is_rejected_and_stock_untouched() {
    let shop = Shop::open().await;
    let bread = shop.product("Bread", Money::from_units(2), 2).await;

    let err = shop
        .db
        .sales()
        .create_sale(
            &shop.ctx,
            NewSale::new(
                vec![SaleLineInput::new(&bread.id, Quantity::from_units(5))],
                PaymentMethod::Cash,
            ),
        )
        .await
        .unwrap_err();

    assert_eq!(code(err), ErrorCode::InsufficientStock);
    assert_eq!(shop.level(&bread).await, Quantity::from_units(2));
    assert_eq!(
        shop.db.stock().movements(&shop.ctx, &bread.id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn expected_cash_reconciles() {
    let shop = Shop::open().await;
    let cake = shop.product("Cake", Money::from_units(300), 10).await;
    let cash = shop.db.cash();

    let session = cash
        .open_session(&shop.ctx, None, Money::from_units(500))
        .await
        .unwrap();
    let sale = shop
        .db
        .sales()
        .create_sale(
            &shop.ctx,
            NewSale::new(
                vec![SaleLineInput::new(&cake.id, Quantity::from_units(1))],
                PaymentMethod::Cash,
            )
            .cash_session(&session.id),
        )
        .await
        .unwrap();

    cash.record_payment(&shop.ctx, &sale.sale.id, &session.id, PaymentMethod::Cash, Money::from_units(300))
        .await
        .unwrap();
    cash.record_cash_movement(&shop.ctx, &session.id, CashMovementType::In, "float", Money::from_units(50), None)
        .await
        .unwrap();
    cash.record_cash_movement(&shop.ctx, &session.id, CashMovementType::Out, "supplier", Money::from_units(20), None)
        .await
        .unwrap();

    let totals = cash.compute_session_totals(&shop.ctx, &session.id).await.unwrap();
    assert_eq!(totals.expected_cash, Money::from_units(830));

    let closed = cash
        .close_session(&shop.ctx, &session.id, Money::from_units(830), None, false)
        .await
        .unwrap();
    assert_eq!(closed.session.expected_cash_total, Some(Money::from_units(830)));
    assert_eq!(closed.session.difference_amount, Some(Money::zero()));
}

#[tokio::test]
async fn order_closes_into_exactly_one_sale() {
    let shop = Shop::open().await;
    let soup = shop.product("Soup", Money::from_units(100), 10).await;
    let steak = shop.product("Steak", Money::from_units(200), 10).await;
    let orders = shop.db.orders();

    let order = orders
        .create_order(&shop.ctx, NewOrder::new(OrderChannel::DineIn).table("T7"))
        .await
        .unwrap();
    orders
        .add_item(&shop.ctx, &order.id, OrderItemInput::new(&soup.id, Quantity::from_units(1)))
        .await
        .unwrap();
    let detail = orders
        .add_item(&shop.ctx, &order.id, OrderItemInput::new(&steak.id, Quantity::from_units(1)))
        .await
        .unwrap();
    assert_eq!(detail.order.subtotal, Money::from_units(300));

    let closed = orders
        .close_order(
            &shop.ctx,
            &order.id,
            CloseOrder::new(PaymentMethod::Cash).discount(Money::from_units(50)),
        )
        .await
        .unwrap();
    assert_eq!(closed.sale.sale.total, Money::from_units(250));

    let err = orders
        .close_order(&shop.ctx, &order.id, CloseOrder::new(PaymentMethod::Cash))
        .await
        .unwrap_err();
    assert_eq!(code(err), ErrorCode::OrderAlreadyClosed);

    let sales: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales WHERE business_id = ?1")
        .bind(&shop.ctx.business_id)
        .fetch_one(shop.db.pool())
        .await
        .unwrap();
    assert_eq!(sales, 1);
}

#[tokio::test]
async fn collector_is_idempotent() {
    let shop = Shop::open().await;
    let tea = shop.product("Tea", Money::from_cents(180), 20).await;
    let cash = shop.db.cash();
    let session = cash.open_session(&shop.ctx, None, Money::zero()).await.unwrap();

    for method in [PaymentMethod::Cash, PaymentMethod::Transfer] {
        shop.db
            .sales()
            .create_sale(
                &shop.ctx,
                NewSale::new(vec![SaleLineInput::new(&tea.id, Quantity::from_units(2))], method)
                    .cash_session(&session.id),
            )
            .await
            .unwrap();
    }

    let first = cash.collect_pending_session_sales(&shop.ctx, &session.id).await.unwrap();
    assert_eq!(first.collected_count, 2);
    assert_eq!(first.collected_total, Money::from_cents(720));

    let second = cash.collect_pending_session_sales(&shop.ctx, &session.id).await.unwrap();
    assert_eq!(second.collected_count, 0);
    assert_eq!(cash.list_payments(&shop.ctx, &session.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn cancellation_restores_stock_and_ledger_replays() {
    let shop = Shop::open().await;
    let jam = shop.product("Jam", Money::from_cents(450), 10).await;
    let sales = shop.db.sales();

    let sale = sales
        .create_sale(
            &shop.ctx,
            NewSale::new(
                vec![SaleLineInput::new(&jam.id, Quantity::from_hundredths(350))],
                PaymentMethod::Card,
            ),
        )
        .await
        .unwrap();
    assert_eq!(sale.sale.total, sale.sale.subtotal - sale.sale.discount);
    assert_eq!(shop.level(&jam).await, Quantity::from_hundredths(650));

    shop.db
        .stock()
        .register_movement(
            &shop.ctx,
            StockMovementRequest::manual(&jam.id, StockMovementType::Waste, Quantity::from_units(1)),
        )
        .await
        .unwrap();

    sales.cancel_sale(&shop.ctx, &sale.sale.id, "wrong jar").await.unwrap();
    assert_eq!(shop.level(&jam).await, Quantity::from_units(9));
    assert_eq!(
        shop.db.stock().replay_quantity(&shop.ctx, &jam.id).await.unwrap(),
        Quantity::from_units(9)
    );
}

#[tokio::test]
async fn tenants_cannot_reach_each_other() {
    let shop = Shop::open().await;
    let coffee = shop.product("Coffee", Money::from_units(3), 10).await;
    let session = shop.db.cash().open_session(&shop.ctx, None, Money::zero()).await.unwrap();

    let rival = shop.db.businesses().create("Rival").await.unwrap();
    let rival_ctx = TenantContext::new(&rival.id, "spy", "owner");

    let err = shop
        .db
        .sales()
        .create_sale(
            &rival_ctx,
            NewSale::new(
                vec![SaleLineInput::new(&coffee.id, Quantity::from_units(1))],
                PaymentMethod::Cash,
            ),
        )
        .await
        .unwrap_err();
    assert_eq!(code(err), ErrorCode::NotFound);

    let err = shop
        .db
        .cash()
        .close_session(&rival_ctx, &session.id, Money::zero(), None, false)
        .await
        .unwrap_err();
    assert_eq!(code(err), ErrorCode::NotFound);

    // The rival's own session slot is free
    assert!(shop.db.cash().open_session(&rival_ctx, None, Money::zero()).await.is_ok());
}
