//! # Error Types
//!
//! Domain errors for the ledger engine and the payload collaborators see.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  till-core (this file)                                                  │
//! │  ├── ValidationError  - malformed input, caught before any transaction  │
//! │  ├── CoreError        - every domain failure, classified by kind()      │
//! │  └── ErrorPayload     - {code, kind, message, context} for transports   │
//! │                                                                         │
//! │  till-db                                                                │
//! │  └── DbError          - storage failures, wraps CoreError               │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → ErrorPayload             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Kinds
//! | Kind       | Meaning                                              |
//! |------------|------------------------------------------------------|
//! | validation | input rejected, retry with corrected input           |
//! | policy     | a tenant policy gate said no; always has a code      |
//! | conflict   | state changed underneath (already open/closed/paid)  |
//! | not_found  | absent, or belongs to another tenant                 |
//! | internal   | unexpected failure, details only in logs             |

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

use crate::money::{Money, Quantity};
use crate::types::OrderStatus;

// =============================================================================
// Classification
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Policy,
    Conflict,
    NotFound,
    Internal,
}

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationFailed,
    InsufficientStock,
    OutOfStock,
    CustomerRequired,
    CashSessionRequired,
    NegativePrice,
    DiscountExceedsSubtotal,
    PaymentExceedsBalance,
    SaleCancelled,
    OrderNotEditable,
    OrderAlreadyClosed,
    InvalidOrderTransition,
    CashSessionAlreadyOpen,
    CashSessionClosed,
    NotFound,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::InsufficientStock => "INSUFFICIENT_STOCK",
            ErrorCode::OutOfStock => "OUT_OF_STOCK",
            ErrorCode::CustomerRequired => "CUSTOMER_REQUIRED",
            ErrorCode::CashSessionRequired => "CASH_SESSION_REQUIRED",
            ErrorCode::NegativePrice => "NEGATIVE_PRICE",
            ErrorCode::DiscountExceedsSubtotal => "DISCOUNT_EXCEEDS_SUBTOTAL",
            ErrorCode::PaymentExceedsBalance => "PAYMENT_EXCEEDS_BALANCE",
            ErrorCode::SaleCancelled => "SALE_CANCELLED",
            ErrorCode::OrderNotEditable => "ORDER_NOT_EDITABLE",
            ErrorCode::OrderAlreadyClosed => "ORDER_ALREADY_CLOSED",
            ErrorCode::InvalidOrderTransition => "INVALID_ORDER_TRANSITION",
            ErrorCode::CashSessionAlreadyOpen => "CASH_SESSION_ALREADY_OPEN",
            ErrorCode::CashSessionClosed => "CASH_SESSION_CLOSED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Core Error
// =============================================================================

/// Domain failures raised by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A stock movement would leave the product below zero.
    ///
    /// ```text
    /// stock = 2, OUT 5, allow_negative = false
    ///      │
    ///      ▼
    /// InsufficientStock { available: 2.00, requested: 5.00 }
    ///      │
    ///      ▼
    /// transaction rolls back, stock stays 2
    /// ```
    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: Quantity,
        requested: Quantity,
    },

    /// An order line asks for more than the ledger holds.
    #[error("Product {product_id} is out of stock: available {available}, requested {requested}")]
    OutOfStock {
        product_id: String,
        available: Quantity,
        requested: Quantity,
    },

    #[error("A customer is required for sales")]
    CustomerRequired,

    #[error("An open cash session is required for sales")]
    CashSessionRequired,

    #[error("Negative unit price for product {product_id}")]
    NegativePrice { product_id: String },

    #[error("Discount {discount} exceeds subtotal {subtotal}")]
    DiscountExceedsSubtotal { discount: Money, subtotal: Money },

    #[error("Payment {amount} exceeds outstanding balance {outstanding} on sale {sale_id}")]
    PaymentExceedsBalance {
        sale_id: String,
        amount: Money,
        outstanding: Money,
    },

    #[error("Sale {sale_id} is cancelled")]
    SaleCancelled { sale_id: String },

    #[error("Order {order_id} is {status} and can no longer be edited")]
    OrderNotEditable { order_id: String, status: OrderStatus },

    #[error("Order {order_id} is already closed")]
    OrderAlreadyClosed { order_id: String },

    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidOrderTransition {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("A cash session is already open for {}", register_label(.register_id))]
    CashSessionAlreadyOpen { register_id: Option<String> },

    #[error("Cash session {session_id} is closed")]
    CashSessionClosed { session_id: String },

    /// Absent or outside the caller's tenant; the two are indistinguishable.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
}

fn register_label(register_id: &Option<String>) -> String {
    match register_id {
        Some(id) => format!("register {}", id),
        None => "the no-register slot".to_string(),
    }
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) | CoreError::PaymentExceedsBalance { .. } => {
                ErrorKind::Validation
            }
            CoreError::InsufficientStock { .. }
            | CoreError::OutOfStock { .. }
            | CoreError::CustomerRequired
            | CoreError::CashSessionRequired
            | CoreError::NegativePrice { .. }
            | CoreError::DiscountExceedsSubtotal { .. } => ErrorKind::Policy,
            CoreError::SaleCancelled { .. }
            | CoreError::OrderNotEditable { .. }
            | CoreError::OrderAlreadyClosed { .. }
            | CoreError::InvalidOrderTransition { .. }
            | CoreError::CashSessionAlreadyOpen { .. }
            | CoreError::CashSessionClosed { .. } => ErrorKind::Conflict,
            CoreError::NotFound { .. } => ErrorKind::NotFound,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::Validation(_) => ErrorCode::ValidationFailed,
            CoreError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            CoreError::OutOfStock { .. } => ErrorCode::OutOfStock,
            CoreError::CustomerRequired => ErrorCode::CustomerRequired,
            CoreError::CashSessionRequired => ErrorCode::CashSessionRequired,
            CoreError::NegativePrice { .. } => ErrorCode::NegativePrice,
            CoreError::DiscountExceedsSubtotal { .. } => ErrorCode::DiscountExceedsSubtotal,
            CoreError::PaymentExceedsBalance { .. } => ErrorCode::PaymentExceedsBalance,
            CoreError::SaleCancelled { .. } => ErrorCode::SaleCancelled,
            CoreError::OrderNotEditable { .. } => ErrorCode::OrderNotEditable,
            CoreError::OrderAlreadyClosed { .. } => ErrorCode::OrderAlreadyClosed,
            CoreError::InvalidOrderTransition { .. } => ErrorCode::InvalidOrderTransition,
            CoreError::CashSessionAlreadyOpen { .. } => ErrorCode::CashSessionAlreadyOpen,
            CoreError::CashSessionClosed { .. } => ErrorCode::CashSessionClosed,
            CoreError::NotFound { .. } => ErrorCode::NotFound,
        }
    }

    /// Structured fields that accompany the message.
    fn context(&self) -> Map<String, Value> {
        let mut ctx = Map::new();
        let mut put = |key: &str, value: Value| {
            ctx.insert(key.to_string(), value);
        };

        match self {
            CoreError::Validation(v) => put("field", Value::from(v.field())),
            CoreError::InsufficientStock {
                product_id,
                available,
                requested,
            }
            | CoreError::OutOfStock {
                product_id,
                available,
                requested,
            } => {
                put("product_id", Value::from(product_id.as_str()));
                put("available", Value::from(available.to_string()));
                put("requested", Value::from(requested.to_string()));
            }
            CoreError::NegativePrice { product_id } => {
                put("product_id", Value::from(product_id.as_str()))
            }
            CoreError::DiscountExceedsSubtotal { discount, subtotal } => {
                put("discount", Value::from(discount.to_string()));
                put("subtotal", Value::from(subtotal.to_string()));
            }
            CoreError::PaymentExceedsBalance {
                sale_id,
                amount,
                outstanding,
            } => {
                put("sale_id", Value::from(sale_id.as_str()));
                put("amount", Value::from(amount.to_string()));
                put("outstanding", Value::from(outstanding.to_string()));
            }
            CoreError::SaleCancelled { sale_id } => put("sale_id", Value::from(sale_id.as_str())),
            CoreError::OrderNotEditable { order_id, status } => {
                put("order_id", Value::from(order_id.as_str()));
                put("status", Value::from(status.as_str()));
            }
            CoreError::OrderAlreadyClosed { order_id } => {
                put("order_id", Value::from(order_id.as_str()))
            }
            CoreError::InvalidOrderTransition { order_id, from, to } => {
                put("order_id", Value::from(order_id.as_str()));
                put("from", Value::from(from.as_str()));
                put("to", Value::from(to.as_str()));
            }
            CoreError::CashSessionAlreadyOpen { register_id } => put(
                "register_id",
                register_id
                    .as_deref()
                    .map(Value::from)
                    .unwrap_or(Value::Null),
            ),
            CoreError::CashSessionClosed { session_id } => {
                put("session_id", Value::from(session_id.as_str()))
            }
            CoreError::NotFound { entity, id } => {
                put("entity", Value::from(*entity));
                put("id", Value::from(id.as_str()));
            }
            CoreError::CustomerRequired | CoreError::CashSessionRequired => {}
        }

        ctx
    }

    /// Builds the payload a transport layer returns verbatim.
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code(),
            kind: self.kind(),
            message: self.to_string(),
            context: self.context(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Per-field input errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    #[error("{field} must have at most {max} entries")]
    TooMany { field: String, max: usize },

    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    #[error("{field} must be at most {max} in size")]
    OutOfRange { field: String, max: String },
}

impl ValidationError {
    /// The offending field.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::Required { field }
            | ValidationError::TooLong { field, .. }
            | ValidationError::MustBePositive { field }
            | ValidationError::MustNotBeNegative { field }
            | ValidationError::TooMany { field, .. }
            | ValidationError::InvalidFormat { field, .. }
            | ValidationError::OutOfRange { field, .. } => field,
        }
    }
}

// =============================================================================
// Error Payload
// =============================================================================

/// What a caller receives when an engine operation fails.
///
/// ```json
/// {
///   "code": "OUT_OF_STOCK",
///   "kind": "policy",
///   "message": "Product p-1 is out of stock: available 2.00, requested 5.00",
///   "context": { "product_id": "p-1", "available": "2.00", "requested": "5.00" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
}

impl ErrorPayload {
    /// Generic failure with no internal detail.
    pub fn internal() -> Self {
        ErrorPayload {
            code: ErrorCode::Internal,
            kind: ErrorKind::Internal,
            message: "An internal error occurred".to_string(),
            context: Map::new(),
        }
    }
}

impl From<&CoreError> for ErrorPayload {
    fn from(err: &CoreError) -> Self {
        err.to_payload()
    }
}

impl From<CoreError> for ErrorPayload {
    fn from(err: CoreError) -> Self {
        err.to_payload()
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
