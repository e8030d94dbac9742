//! # till-core: Pure Ledger Logic
//!
//! Deterministic rules behind the ledger and session engine. Nothing in this
//! crate touches a database, a clock it was not handed, or the network.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Collaborators (HTTP, permissions, catalog, accounting)                 │
//! │        │ TenantContext + requests          ▲ aggregates, ErrorPayload   │
//! │        ▼                                   │ LedgerEvents               │
//! │  ┌─────────────────────────────────────────┴───────────────────────┐   │
//! │  │                    till-db (transactions)                        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ decides with                           │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ till-core (THIS CRATE) ★                         │   │
//! │  │                                                                 │   │
//! │  │   money   types   stock   order   cash   numbering   events     │   │
//! │  │   error   validation                                            │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - `Money` and `Quantity`, exact two-digit fixed point
//! - [`types`] - aggregates, enums, tenant context and request shapes
//! - [`stock`] - movement arithmetic and log replay
//! - [`order`] - line merging and the per-order stock check
//! - [`cash`] - session totals and outstanding balances
//! - [`numbering`] - document number formatting
//! - [`events`] - ledger events published after commit
//! - [`error`] - error taxonomy and the collaborator payload
//! - [`validation`] - input checks run before any transaction
//!
//! ## Example
//!
//! ```rust
//! use till_core::money::{Money, Quantity};
//! use till_core::stock::plan_movement;
//! use till_core::types::StockMovementType;
//!
//! let plan = plan_movement("p-1", Quantity::from_units(2), StockMovementType::Out,
//!                          Quantity::from_units(5), false);
//! assert_eq!(plan.unwrap_err().code().as_str(), "INSUFFICIENT_STOCK");
//!
//! let line = Money::from_cents(1250).times(Quantity::from_units(2));
//! assert_eq!(line.to_string(), "25.00");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cash;
pub mod error;
pub mod events;
pub mod money;
pub mod numbering;
pub mod order;
pub mod stock;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ErrorCode, ErrorKind, ErrorPayload, ValidationError};
pub use events::{LedgerEvent, LedgerEventKind, LedgerSource};
pub use money::{Money, Quantity};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines in a single sale.
pub const MAX_SALE_ITEMS: usize = 200;

/// Maximum length of notes and reasons.
pub const MAX_NOTE_LENGTH: usize = 500;

/// Maximum modifiers on one order line.
pub const MAX_MODIFIERS: usize = 20;

/// Largest quantity accepted on one movement or line (one million units).
pub const MAX_QUANTITY: Quantity = Quantity::from_units(1_000_000);

/// Largest magnitude accepted for one price, discount or cash amount.
///
/// With [`MAX_QUANTITY`], [`MAX_MODIFIERS`] and [`MAX_SALE_ITEMS`] this keeps
/// every line total and sale total well inside `i64` cents.
pub const MAX_AMOUNT: Money = Money::from_units(10_000_000);
