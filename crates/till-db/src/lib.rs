//! # till-db: Transactional Ledger Engine
//!
//! Runs every ledger and session operation inside a SQLite transaction, using
//! the pure rules in `till-core` to decide and this crate to lock and persist.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Till Data Flow                                   │
//! │                                                                         │
//! │  Collaborator (HTTP handler, job, test)                                 │
//! │       │  TenantContext + request                                        │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     till-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐   │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │   │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │   │   │
//! │  │   │               │    │ StockRepo     │    │              │   │   │
//! │  │   │ SqlitePool    │◄───│ SaleRepo      │    │ 001_init.sql │   │   │
//! │  │   │ WAL + busy    │    │ OrderRepo     │    │              │   │   │
//! │  │   │ timeout       │    │ CashRepo      │    │              │   │   │
//! │  │   │               │    │ DocumentRepo  │    │              │   │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘   │   │
//! │  │                                │ same transaction               │   │
//! │  │                                ▼                                │   │
//! │  │                         ledger_outbox ──► OutboxRelay ──► sink  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool, write-lock settings, repository accessors
//! - [`migrations`] - Embedded database migrations
//! - [`config`] - `till.toml` + environment configuration
//! - [`error`] - Database error types and payload mapping
//! - [`repository`] - Sequence, stock, sale, order, cash, document, outbox
//! - [`relay`] - Post-commit delivery of ledger events
//!
//! ## Usage
//!
//! ```rust,ignore
//! use till_db::{Database, DbConfig};
//! use till_core::{TenantContext, NewSale, SaleLineInput, PaymentMethod, Quantity};
//!
//! let db = Database::new(DbConfig::in_memory()).await?;
//! let ctx = TenantContext::new(business_id, "cashier-1", "cashier");
//!
//! let sale = db
//!     .sales()
//!     .create_sale(&ctx, NewSale::new(vec![SaleLineInput::new(product_id, Quantity::from_units(1))], PaymentMethod::Cash))
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod relay;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, TillConfig};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use relay::{LedgerEventSink, LoggingSink, OutboxRelay, RelayHandle, RelayReport, SinkError};

// Repository re-exports for convenience
pub use repository::business::BusinessRepository;
pub use repository::cash::{CashRepository, ClosedSession};
pub use repository::document::DocumentRepository;
pub use repository::order::{ClosedOrder, OrderRepository};
pub use repository::outbox::{OutboxEntry, OutboxRepository};
pub use repository::product::ProductRepository;
pub use repository::sale::SaleRepository;
pub use repository::stock::StockRepository;
