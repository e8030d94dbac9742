//! # Ledger Events
//!
//! Facts the engine publishes for the external accounting module after a
//! transaction commits.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_sale tx                                                         │
//! │  ├── INSERT sales, sale_items, stock_movements                          │
//! │  └── INSERT ledger_outbox (event_key = "sale_completed:<sale id>")      │
//! │  COMMIT                                                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  OutboxRelay ──► LedgerEventSink (accounting) ──► mark delivered        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each event names its origin through [`LedgerSource`], one variant per
//! originating aggregate. `event_key` is stable, so a consumer that sees the
//! same key twice can drop the duplicate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::types::{CashMovement, CashMovementType, Payment, PaymentMethod, Sale};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEventKind {
    SaleCompleted,
    SaleCancelled,
    PaymentRecorded,
    CashMovementRecorded,
}

impl LedgerEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEventKind::SaleCompleted => "sale_completed",
            LedgerEventKind::SaleCancelled => "sale_cancelled",
            LedgerEventKind::PaymentRecorded => "payment_recorded",
            LedgerEventKind::CashMovementRecorded => "cash_movement_recorded",
        }
    }
}

/// The aggregate an event originates from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerSource {
    Sale {
        sale_id: String,
        number: i64,
    },
    Payment {
        payment_id: String,
        sale_id: String,
        method: PaymentMethod,
    },
    CashMovement {
        movement_id: String,
        cash_session_id: String,
        category: String,
    },
}

impl LedgerSource {
    /// Id of the originating row.
    pub fn id(&self) -> &str {
        match self {
            LedgerSource::Sale { sale_id, .. } => sale_id,
            LedgerSource::Payment { payment_id, .. } => payment_id,
            LedgerSource::CashMovement { movement_id, .. } => movement_id,
        }
    }
}

/// One publishable fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub event_key: String,
    pub kind: LedgerEventKind,
    pub business_id: String,
    pub source: LedgerSource,
    /// Signed: cancellations and cash-out are negative.
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
}

impl LedgerEvent {
    fn new(
        kind: LedgerEventKind,
        business_id: &str,
        source: LedgerSource,
        amount: Money,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        LedgerEvent {
            event_key: format!("{}:{}", kind.as_str(), source.id()),
            kind,
            business_id: business_id.to_string(),
            source,
            amount,
            occurred_at,
        }
    }

    pub fn sale_completed(sale: &Sale) -> Self {
        Self::new(
            LedgerEventKind::SaleCompleted,
            &sale.business_id,
            LedgerSource::Sale {
                sale_id: sale.id.clone(),
                number: sale.number,
            },
            sale.total,
            sale.created_at,
        )
    }

    pub fn sale_cancelled(sale: &Sale) -> Self {
        Self::new(
            LedgerEventKind::SaleCancelled,
            &sale.business_id,
            LedgerSource::Sale {
                sale_id: sale.id.clone(),
                number: sale.number,
            },
            -sale.total,
            sale.cancelled_at.unwrap_or(sale.updated_at),
        )
    }

    pub fn payment_recorded(payment: &Payment) -> Self {
        Self::new(
            LedgerEventKind::PaymentRecorded,
            &payment.business_id,
            LedgerSource::Payment {
                payment_id: payment.id.clone(),
                sale_id: payment.sale_id.clone(),
                method: payment.method,
            },
            payment.amount,
            payment.created_at,
        )
    }

    pub fn cash_movement_recorded(movement: &CashMovement) -> Self {
        let amount = match movement.movement_type {
            CashMovementType::In => movement.amount,
            CashMovementType::Out => -movement.amount,
        };
        Self::new(
            LedgerEventKind::CashMovementRecorded,
            &movement.business_id,
            LedgerSource::CashMovement {
                movement_id: movement.id.clone(),
                cash_session_id: movement.cash_session_id.clone(),
                category: movement.category.clone(),
            },
            amount,
            movement.created_at,
        )
    }
}
