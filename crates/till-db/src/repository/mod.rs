//! # Repository Module
//!
//! Transactional engine operations, one repository per aggregate.
//!
//! ## Transaction Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Every mutating operation                               │
//! │                                                                         │
//! │  validate input (till-core::validation)      ← no transaction yet       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN                                                                  │
//! │  1. LOCK     first statement is a write on the row being decided        │
//! │              (upsert / no-op UPDATE ... RETURNING *)                    │
//! │  2. READ     current state, through the same connection                 │
//! │  3. DECIDE   till-core rules; any error rolls everything back           │
//! │  4. WRITE    rows + stock movements + outbox event                      │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Helpers that take `&mut SqliteConnection` run inside the caller's
//! transaction and never touch the pool.
//!
//! ## Available Repositories
//!
//! - [`BusinessRepository`](business::BusinessRepository) - tenants and registers
//! - [`ProductRepository`](product::ProductRepository) - minimal catalog fixture
//! - [`StockRepository`](stock::StockRepository) - the stock ledger
//! - [`SaleRepository`](sale::SaleRepository) - sale creation and cancellation
//! - [`OrderRepository`](order::OrderRepository) - order state machine
//! - [`CashRepository`](cash::CashRepository) - cash sessions and payments
//! - [`DocumentRepository`](document::DocumentRepository) - document numbering
//! - [`OutboxRepository`](outbox::OutboxRepository) - ledger event queue

pub mod business;
pub mod cash;
pub mod document;
pub mod order;
pub mod outbox;
pub mod product;
pub mod sale;
pub mod sequence;
pub mod stock;
