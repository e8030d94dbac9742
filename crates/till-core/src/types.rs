//! # Domain Types
//!
//! Aggregates, enums and request shapes shared by the engine.
//!
//! ## Aggregate Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            Business (tenant)                            │
//! │                                                                         │
//! │  Product ──► ProductStock ◄── StockMovement (append-only)               │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  OrderItem ──► Order ──(close, once)──► Sale ◄── SaleItem               │
//! │                                          │                              │
//! │                                          ▼                              │
//! │  CashRegister ──► CashSession ◄── Payment                               │
//! │                        ▲                                                │
//! │                        └──────── CashMovement                           │
//! │                                                                         │
//! │  DocumentSeries (invoice / quote counters)                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Identifiers are UUID v4 strings. Sale and order numbers are per-business
//! sequential integers handed out by the sequence allocator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::money::{Money, Quantity};

// =============================================================================
// Tenant Context
// =============================================================================

/// Tenant policy flags resolved by the permission layer.
///
/// Each flag turns a would-be hard failure into an allowed operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessPolicy {
    /// Sales and order lines may drive stock below zero.
    pub allow_sell_without_stock: bool,

    /// Sales require an open cash session.
    pub block_sales_if_no_open_cash_session: bool,

    /// Sales require a customer reference.
    pub require_customer_for_sales: bool,

    /// Negative unit prices and discounts larger than the subtotal are allowed.
    pub allow_negative_price_or_discount: bool,
}

/// The resolved caller: tenant, acting user, role and policy.
///
/// Every engine operation takes one of these; nothing is read across
/// `business_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub business_id: String,
    pub user_id: String,
    pub role: String,
    pub policy: BusinessPolicy,
}

impl TenantContext {
    /// Creates a context with the default (strict) policy.
    pub fn new(
        business_id: impl Into<String>,
        user_id: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        TenantContext {
            business_id: business_id.into(),
            user_id: user_id.into(),
            role: role.into(),
            policy: BusinessPolicy::default(),
        }
    }

    /// Replaces the policy.
    pub fn with_policy(mut self, policy: BusinessPolicy) -> Self {
        self.policy = policy;
        self
    }
}

// =============================================================================
// Business & Catalog
// =============================================================================

/// A tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Business {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A sellable product. Catalog CRUD lives elsewhere; the engine only reads
/// name, sku and price when snapshotting lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: String,
    pub business_id: String,
    pub sku: Option<String>,
    pub name: String,
    pub price: Money,
    pub cost: Option<Money>,
    /// Low-stock threshold.
    pub stock_min: Quantity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub sku: Option<String>,
    pub name: String,
    pub price: Money,
    pub cost: Option<Money>,
    #[serde(default)]
    pub stock_min: Quantity,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, price: Money) -> Self {
        NewProduct {
            sku: None,
            name: name.into(),
            price,
            cost: None,
            stock_min: Quantity::zero(),
        }
    }

    pub fn sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }

    pub fn cost(mut self, cost: Money) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn stock_min(mut self, stock_min: Quantity) -> Self {
        self.stock_min = stock_min;
        self
    }
}

// =============================================================================
// Stock
// =============================================================================

/// Materialized stock level for one (business, product).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ProductStock {
    pub business_id: String,
    pub product_id: String,
    pub quantity: Quantity,
    pub updated_at: DateTime<Utc>,
}

impl ProductStock {
    /// True when the level has fallen below the product's threshold.
    pub fn is_below_minimum(&self, stock_min: Quantity) -> bool {
        self.quantity < stock_min
    }
}

/// Kind of stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum StockMovementType {
    /// Adds to stock.
    In,
    /// Removes from stock (sales).
    Out,
    /// Sets stock to an absolute counted value.
    Adjust,
    /// Removes from stock (spoilage, breakage).
    Waste,
}

impl StockMovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockMovementType::In => "in",
            StockMovementType::Out => "out",
            StockMovementType::Adjust => "adjust",
            StockMovementType::Waste => "waste",
        }
    }
}

impl fmt::Display for StockMovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What caused a stock movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MovementSource {
    /// Receiving, counting or writing off by hand.
    Manual,
    /// OUT emitted while creating a sale.
    Sale { sale_id: String },
    /// Compensating IN emitted while cancelling a sale.
    SaleCancellation { sale_id: String },
}

impl MovementSource {
    /// Storage discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            MovementSource::Manual => "manual",
            MovementSource::Sale { .. } => "sale",
            MovementSource::SaleCancellation { .. } => "sale_cancellation",
        }
    }

    /// Id of the originating aggregate, if any.
    pub fn source_id(&self) -> Option<&str> {
        match self {
            MovementSource::Manual => None,
            MovementSource::Sale { sale_id } | MovementSource::SaleCancellation { sale_id } => {
                Some(sale_id)
            }
        }
    }

    /// Rebuilds a source from its stored columns.
    pub fn from_parts(kind: &str, source_id: Option<String>) -> Option<Self> {
        match (kind, source_id) {
            ("manual", _) => Some(MovementSource::Manual),
            ("sale", Some(sale_id)) => Some(MovementSource::Sale { sale_id }),
            ("sale_cancellation", Some(sale_id)) => {
                Some(MovementSource::SaleCancellation { sale_id })
            }
            _ => None,
        }
    }
}

/// An immutable entry in the stock ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: String,
    pub business_id: String,
    pub product_id: String,
    pub movement_type: StockMovementType,
    /// Requested quantity (the counted value for ADJUST).
    pub quantity: Quantity,
    pub quantity_before: Quantity,
    pub quantity_after: Quantity,
    pub note: Option<String>,
    /// Audit reason, set when the movement drove stock negative.
    pub reason: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub source: MovementSource,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Request to append one movement to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovementRequest {
    pub product_id: String,
    pub movement_type: StockMovementType,
    pub quantity: Quantity,
    pub note: Option<String>,
    /// Permit the result to go below zero for this call only.
    #[serde(default)]
    pub allow_negative: bool,
    pub source: MovementSource,
}

impl StockMovementRequest {
    /// A manual movement with negative stock disallowed.
    pub fn manual(
        product_id: impl Into<String>,
        movement_type: StockMovementType,
        quantity: Quantity,
    ) -> Self {
        StockMovementRequest {
            product_id: product_id.into(),
            movement_type,
            quantity,
            note: None,
            allow_negative: false,
            source: MovementSource::Manual,
        }
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn allow_negative(mut self, allow: bool) -> Self {
        self.allow_negative = allow;
        self
    }
}

// =============================================================================
// Sales
// =============================================================================

/// The status of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Completed,
    Cancelled,
}

/// How a sale or payment was tendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
    Other,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 4] = [
        PaymentMethod::Cash,
        PaymentMethod::Card,
        PaymentMethod::Transfer,
        PaymentMethod::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Transfer => "transfer",
            PaymentMethod::Other => "other",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            "transfer" => Ok(PaymentMethod::Transfer),
            "other" => Ok(PaymentMethod::Other),
            _ => Err(format!("Unknown payment method: {}", s)),
        }
    }
}

/// A completed or cancelled sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Sale {
    pub id: String,
    pub business_id: String,
    /// Per-business sequential number, never reassigned.
    pub number: i64,
    pub status: SaleStatus,
    pub subtotal: Money,
    pub discount: Money,
    pub total: Money,
    pub payment_method: PaymentMethod,
    pub customer_id: Option<String>,
    pub cash_session_id: Option<String>,
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Sale {
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.status == SaleStatus::Cancelled
    }
}

/// A sale line. Product details are snapshotted at sale time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    /// `None` once the product has been removed from the catalog.
    pub product_id: Option<String>,
    pub product_name: String,
    pub sku: Option<String>,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub line_total: Money,
}

/// A sale with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleDetail {
    pub sale: Sale,
    pub items: Vec<SaleItem>,
}

/// One requested sale line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLineInput {
    pub product_id: String,
    pub quantity: Quantity,
    /// Overrides the catalog price when set.
    pub unit_price: Option<Money>,
    /// Skip the negative-stock check for this line (order lines already
    /// flagged as sold without stock).
    #[serde(default)]
    pub allow_negative_stock: bool,
    /// Name and SKU captured earlier (on an order line). The catalog is
    /// read only when this is `None`.
    #[serde(default)]
    pub snapshot: Option<LineSnapshot>,
}

/// Product details frozen at the moment a line was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSnapshot {
    pub product_name: String,
    pub sku: Option<String>,
}

impl SaleLineInput {
    pub fn new(product_id: impl Into<String>, quantity: Quantity) -> Self {
        SaleLineInput {
            product_id: product_id.into(),
            quantity,
            unit_price: None,
            allow_negative_stock: false,
            snapshot: None,
        }
    }

    pub fn unit_price(mut self, price: Money) -> Self {
        self.unit_price = Some(price);
        self
    }

    pub fn snapshot(mut self, product_name: impl Into<String>, sku: Option<String>) -> Self {
        self.snapshot = Some(LineSnapshot {
            product_name: product_name.into(),
            sku,
        });
        self
    }
}

/// Request to create a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSale {
    pub items: Vec<SaleLineInput>,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub discount: Money,
    pub customer_id: Option<String>,
    pub cash_session_id: Option<String>,
    pub notes: Option<String>,
}

impl NewSale {
    pub fn new(items: Vec<SaleLineInput>, payment_method: PaymentMethod) -> Self {
        NewSale {
            items,
            payment_method,
            discount: Money::zero(),
            customer_id: None,
            cash_session_id: None,
            notes: None,
        }
    }

    pub fn discount(mut self, discount: Money) -> Self {
        self.discount = discount;
        self
    }

    pub fn customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn cash_session(mut self, session_id: impl Into<String>) -> Self {
        self.cash_session_id = Some(session_id.into());
        self
    }
}

// =============================================================================
// Orders
// =============================================================================

/// Order lifecycle.
///
/// ```text
/// DRAFT ──► OPEN ──► SENT ──► PAID
///   │         │        │
///   └─────────┴────────┴────► CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Draft,
    Open,
    Sent,
    Paid,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "draft",
            OrderStatus::Open => "open",
            OrderStatus::Sent => "sent",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Items may change only in the pre-payment states.
    pub fn is_editable(&self) -> bool {
        matches!(self, OrderStatus::Draft | OrderStatus::Open | OrderStatus::Sent)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Cancelled)
    }

    fn rank(&self) -> u8 {
        match self {
            OrderStatus::Draft => 0,
            OrderStatus::Open => 1,
            OrderStatus::Sent => 2,
            OrderStatus::Paid => 3,
            OrderStatus::Cancelled => 3,
        }
    }

    /// Forward-only moves, plus cancellation from any editable state.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if !self.is_editable() {
            return false;
        }
        match next {
            OrderStatus::Cancelled | OrderStatus::Paid => true,
            _ => next.rank() > self.rank(),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an order came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum OrderChannel {
    Counter,
    DineIn,
    Takeaway,
    Delivery,
}

/// An order header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    pub id: String,
    pub business_id: String,
    pub number: i64,
    pub status: OrderStatus,
    pub channel: OrderChannel,
    /// Table assigned by the availability checker.
    pub table_ref: Option<String>,
    pub customer_id: Option<String>,
    pub notes: Option<String>,
    pub subtotal: Money,
    /// Set exactly once, when the order is closed.
    pub sale_id: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Editable while pre-payment and not yet linked to a sale.
    pub fn is_editable(&self) -> bool {
        self.status.is_editable() && self.sale_id.is_none()
    }
}

/// A priced modifier on an order line ("extra cheese +1.50").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderModifier {
    pub name: String,
    #[serde(default)]
    pub price_delta: Money,
}

impl OrderModifier {
    pub fn new(name: impl Into<String>, price_delta: Money) -> Self {
        OrderModifier {
            name: name.into(),
            price_delta,
        }
    }
}

/// An order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub product_name: String,
    pub sku: Option<String>,
    pub note: Option<String>,
    /// Base price plus modifier deltas.
    pub unit_price: Money,
    pub quantity: Quantity,
    pub line_total: Money,
    #[cfg_attr(feature = "sqlx", sqlx(json))]
    pub modifiers: Vec<OrderModifier>,
    pub modifier_signature: String,
    /// Added while stock was short, under a permissive policy.
    pub sold_without_stock: bool,
    pub created_at: DateTime<Utc>,
}

/// An order with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetail {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Request to create an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub channel: OrderChannel,
    pub table_ref: Option<String>,
    pub customer_id: Option<String>,
    pub notes: Option<String>,
}

impl NewOrder {
    pub fn new(channel: OrderChannel) -> Self {
        NewOrder {
            channel,
            table_ref: None,
            customer_id: None,
            notes: None,
        }
    }

    pub fn table(mut self, table_ref: impl Into<String>) -> Self {
        self.table_ref = Some(table_ref.into());
        self
    }

    pub fn customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }
}

/// Request to add a line to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemInput {
    pub product_id: String,
    pub quantity: Quantity,
    pub note: Option<String>,
    /// Overrides the catalog base price when set.
    pub unit_price: Option<Money>,
    #[serde(default)]
    pub modifiers: Vec<OrderModifier>,
}

impl OrderItemInput {
    pub fn new(product_id: impl Into<String>, quantity: Quantity) -> Self {
        OrderItemInput {
            product_id: product_id.into(),
            quantity,
            note: None,
            unit_price: None,
            modifiers: Vec::new(),
        }
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn unit_price(mut self, price: Money) -> Self {
        self.unit_price = Some(price);
        self
    }

    pub fn modifier(mut self, modifier: OrderModifier) -> Self {
        self.modifiers.push(modifier);
        self
    }
}

/// Request to close (pay) an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseOrder {
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub discount: Money,
    pub customer_id: Option<String>,
    pub cash_session_id: Option<String>,
}

impl CloseOrder {
    pub fn new(payment_method: PaymentMethod) -> Self {
        CloseOrder {
            payment_method,
            discount: Money::zero(),
            customer_id: None,
            cash_session_id: None,
        }
    }

    pub fn discount(mut self, discount: Money) -> Self {
        self.discount = discount;
        self
    }

    pub fn customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn cash_session(mut self, session_id: impl Into<String>) -> Self {
        self.cash_session_id = Some(session_id.into());
        self
    }
}

// =============================================================================
// Cash
// =============================================================================

/// A physical till.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CashRegister {
    pub id: String,
    pub business_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum CashSessionStatus {
    Open,
    Closed,
}

/// A bounded period during which a register takes money.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CashSession {
    pub id: String,
    pub business_id: String,
    /// `None` for the business-wide no-register slot.
    pub register_id: Option<String>,
    pub status: CashSessionStatus,
    pub opening_cash_amount: Money,
    pub closing_cash_counted: Option<Money>,
    /// Snapshot taken at close.
    pub expected_cash_total: Option<Money>,
    /// Counted minus expected, snapshot at close.
    pub difference_amount: Option<Money>,
    pub note: Option<String>,
    pub opened_by: String,
    pub closed_by: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl CashSession {
    #[inline]
    pub fn is_open(&self) -> bool {
        self.status == CashSessionStatus::Open
    }
}

/// Money received against a sale inside a cash session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Payment {
    pub id: String,
    pub business_id: String,
    pub sale_id: String,
    pub cash_session_id: String,
    pub method: PaymentMethod,
    pub amount: Money,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum CashMovementType {
    In,
    Out,
}

/// Manual cash in or out, not tied to a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CashMovement {
    pub id: String,
    pub business_id: String,
    pub cash_session_id: String,
    pub movement_type: CashMovementType,
    /// Free-form bucket such as "float", "supplier" or "tips".
    pub category: String,
    pub amount: Money,
    pub note: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Documents
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Invoice,
    Quote,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "invoice",
            DocumentType::Quote => "quote",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-business counter for one document type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DocumentSeries {
    pub id: String,
    pub business_id: String,
    pub document_type: DocumentType,
    pub code: String,
    pub padding: i64,
    /// Number the next issued document will carry.
    pub next_number: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An issued document number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentNumber {
    pub series_id: String,
    pub document_type: DocumentType,
    pub number: i64,
    pub formatted: String,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_transitions() {
        use OrderStatus::*;

        assert!(Draft.can_transition_to(Open));
        assert!(Draft.can_transition_to(Sent));
        assert!(Open.can_transition_to(Sent));
        assert!(Sent.can_transition_to(Paid));
        assert!(Draft.can_transition_to(Cancelled));

        assert!(!Sent.can_transition_to(Open));
        assert!(!Open.can_transition_to(Draft));
        assert!(!Paid.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Open));
        assert!(!Sent.can_transition_to(Sent));
    }

    #[test]
    fn test_movement_source_round_trips_through_columns() {
        let source = MovementSource::SaleCancellation {
            sale_id: "s-1".to_string(),
        };
        let rebuilt =
            MovementSource::from_parts(source.kind(), source.source_id().map(String::from));
        assert_eq!(rebuilt, Some(source));

        assert_eq!(
            MovementSource::from_parts("manual", None),
            Some(MovementSource::Manual)
        );
        assert_eq!(MovementSource::from_parts("sale", None), None);
        assert_eq!(MovementSource::from_parts("payroll", Some("x".into())), None);
    }

    #[test]
    fn test_movement_source_serializes_as_tagged_union() {
        let json = serde_json::to_value(MovementSource::Sale {
            sale_id: "s-9".to_string(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"kind": "sale", "sale_id": "s-9"}));
    }

    #[test]
    fn test_payment_method_parsing() {
        assert_eq!("CASH".parse::<PaymentMethod>().unwrap(), PaymentMethod::Cash);
        assert_eq!("card".parse::<PaymentMethod>().unwrap(), PaymentMethod::Card);
        assert!("cheque".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_low_stock_flag() {
        let stock = ProductStock {
            business_id: "b".into(),
            product_id: "p".into(),
            quantity: Quantity::from_units(2),
            updated_at: Utc::now(),
        };
        assert!(stock.is_below_minimum(Quantity::from_units(5)));
        assert!(!stock.is_below_minimum(Quantity::from_units(2)));
    }

    #[test]
    fn test_policy_defaults_are_strict() {
        let policy: BusinessPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy, BusinessPolicy::default());
        assert!(!policy.allow_sell_without_stock);
    }
}
