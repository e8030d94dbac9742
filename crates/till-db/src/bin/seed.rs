//! # Till Seed
//!
//! Runs one demo business day against the configured database and prints
//! the cash reconciliation.
//!
//! ```text
//! cargo run -p till-db --bin seed -- [path/to/till.toml]
//! TILL_DATABASE_PATH=demo.db TILL_LOG=debug cargo run -p till-db --bin seed
//! ```
//!
//! ## The Day
//! ```text
//! receive stock ─► open session (100.00) ─► 2 direct sales ─► table order
//!      ─► cash out for ice ─► close with collector ─► invoice number
//!      ─► relay ledger events to the log
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use till_core::{
    CashMovementType, CloseOrder, DocumentType, Money, NewOrder, NewProduct, NewSale,
    OrderChannel, OrderItemInput, OrderModifier, PaymentMethod, Quantity, SaleLineInput,
    StockMovementRequest, StockMovementType, TenantContext,
};
use till_db::{Database, LoggingSink, OutboxRelay, TillConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = TillConfig::load(config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .with_target(true)
        .init();

    info!(path = %config.database.path.display(), "Starting demo day");
    let db = Database::open(&config).await?;

    // Tenant and catalog
    let business = db.businesses().create("Corner Cafe").await?;
    let ctx = TenantContext::new(&business.id, "demo-owner", "owner");
    let register = db.businesses().create_register(&ctx, "Front till").await?;

    let products = db.products();
    let espresso = products
        .create(&ctx, NewProduct::new("Espresso", Money::from_cents(250)).sku("ESP"))
        .await?;
    let croissant = products
        .create(
            &ctx,
            NewProduct::new("Croissant", Money::from_cents(300))
                .sku("CRO")
                .stock_min(Quantity::from_units(5)),
        )
        .await?;

    for (product_id, units) in [(&espresso.id, 200), (&croissant.id, 12)] {
        db.stock()
            .register_movement(
                &ctx,
                StockMovementRequest::manual(product_id, StockMovementType::In, Quantity::from_units(units))
                    .note("Morning delivery"),
            )
            .await?;
    }

    // Session and direct sales
    let cash = db.cash();
    let session = cash
        .open_session(&ctx, Some(&register.id), Money::from_units(100))
        .await?;

    let sales = db.sales();
    let first = sales
        .create_sale(
            &ctx,
            NewSale::new(
                vec![
                    SaleLineInput::new(&espresso.id, Quantity::from_units(2)),
                    SaleLineInput::new(&croissant.id, Quantity::from_units(1)),
                ],
                PaymentMethod::Cash,
            )
            .cash_session(&session.id),
        )
        .await?;
    cash.record_payment(&ctx, &first.sale.id, &session.id, PaymentMethod::Cash, first.sale.total)
        .await?;

    // Left unpaid on purpose; the collector settles it at close
    sales
        .create_sale(
            &ctx,
            NewSale::new(
                vec![SaleLineInput::new(&croissant.id, Quantity::from_units(4))],
                PaymentMethod::Card,
            )
            .cash_session(&session.id),
        )
        .await?;

    // Table order
    let orders = db.orders();
    let order = orders
        .create_order(&ctx, NewOrder::new(OrderChannel::DineIn).table("T3"))
        .await?;
    orders
        .add_item(
            &ctx,
            &order.id,
            OrderItemInput::new(&espresso.id, Quantity::from_units(2))
                .modifier(OrderModifier::new("Extra shot", Money::from_cents(80))),
        )
        .await?;
    orders.send_order(&ctx, &order.id).await?;
    let closed_order = orders
        .close_order(
            &ctx,
            &order.id,
            CloseOrder::new(PaymentMethod::Cash)
                .discount(Money::from_cents(60))
                .cash_session(&session.id),
        )
        .await?;
    info!(
        order = closed_order.order.order.number,
        sale = closed_order.sale.sale.number,
        total = %closed_order.sale.sale.total,
        "Table order paid"
    );

    cash.record_cash_movement(
        &ctx,
        &session.id,
        CashMovementType::Out,
        "supplier",
        Money::from_units(5),
        Some("Ice"),
    )
    .await?;

    // Close and reconcile
    let expected = cash.compute_session_totals(&ctx, &session.id).await?;
    let counted = expected.expected_cash;
    let closed = cash
        .close_session(&ctx, &session.id, counted, Some("Demo close"), true)
        .await?;

    let invoice = db
        .documents()
        .get_next_document_number(&ctx, DocumentType::Invoice)
        .await?;

    let (relay, _handle) = OutboxRelay::new(db.clone(), Arc::new(LoggingSink), config.outbox.clone());
    let relayed = relay.relay_once().await?;

    let low = db.stock().below_minimum(&ctx).await?;

    println!("Session {}", closed.session.id);
    println!("  opening            {}", closed.session.opening_cash_amount);
    for method in &closed.totals.payments_by_method {
        println!("  {:<18} {}", method.method.as_str(), method.amount);
    }
    println!("  cash in            {}", closed.totals.movement_in);
    println!("  cash out           {}", closed.totals.movement_out);
    println!("  expected cash      {}", closed.totals.expected_cash);
    println!("  counted            {}", counted);
    if let Some(collection) = &closed.collection {
        println!(
            "  collected          {} sale(s), {}",
            collection.collected_count, collection.collected_total
        );
    }
    println!("Invoice {}", invoice.formatted);
    println!("Ledger events relayed: {}", relayed.delivered);
    println!("Products below minimum: {}", low.len());

    db.close().await;
    Ok(())
}
