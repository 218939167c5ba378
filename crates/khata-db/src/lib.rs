//! # khata-db: Persistence and Ledger Services for Khata
//!
//! This crate stores customers, inventory, invoices and payments in SQLite
//! and runs every ledger operation as a single transaction.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Khata Data Flow                                  │
//! │                                                                         │
//! │  POST /api/payments                                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     khata-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Services    │    │  Repositories │    │  Database    │  │   │
//! │  │   │               │    │               │    │  (pool.rs)   │  │   │
//! │  │   │ PaymentLedger │───►│ SaleRepo      │───►│ SqlitePool   │  │   │
//! │  │   │ SaleLifecycle │    │ PaymentRepo   │    │ CustomerLocks│  │   │
//! │  │   │               │    │ InventoryLedger│   │ Migrations   │  │   │
//! │  │   └───────┬───────┘    └───────────────┘    └──────────────┘  │   │
//! │  │           │ plans from khata-core::ledger                       │   │
//! │  └───────────┼─────────────────────────────────────────────────────┘   │
//! │              ▼                                                          │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   ./khata.db  or  :memory:                                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database and ledger error types
//! - [`locks`] - Per-customer serialization
//! - [`repository`] - SQL for each table group
//! - [`service`] - Payment ledger and sale lifecycle
//!
//! ## Usage
//!
//! ```rust,ignore
//! use khata_db::{Database, DbConfig, NewPayment};
//!
//! let db = Database::new(DbConfig::new("khata.db")).await?;
//!
//! let outcome = db
//!     .payment_ledger()
//!     .add_payment(NewPayment {
//!         customer_id: customer.id.clone(),
//!         amount_cents: 12_000,
//!         ..Default::default()
//!     })
//!     .await?;
//! println!("applied {}", outcome.allocation.applied());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod locks;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult, LedgerError, LedgerResult};
pub use locks::CustomerLocks;
pub use pool::{Database, DbConfig, IN_MEMORY_PATH};

// Repository and service re-exports for convenience
pub use repository::{
    BatchPatch, CustomerRepository, InventoryLedger, InventoryRepository, NewBatch, NewCustomer,
    NewProduct, PaymentRepository, ProductPatch, SaleRepository,
};
pub use service::payment_ledger::{NewPayment, PaymentLedger, PaymentOutcome, ReversalOutcome};
pub use service::sale_lifecycle::{NewSale, NewSaleItem, SaleLifecycle, SalePatch};

// =============================================================================
// Test Helpers
// =============================================================================
