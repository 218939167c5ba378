//! # khata-core: Pure Ledger Logic for Khata
//!
//! This crate holds the accounts-receivable rules of Khata as pure functions
//! with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Khata Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 khata-server (axum REST layer)                  │   │
//! │  │   /api/payments  /api/sales  /api/inventory  /api/customers     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          khata-db (transactions, repositories, services)        │   │
//! │  │   PaymentLedger   SaleLifecycle   InventoryRepository           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ executes plans                         │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ khata-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │  ledger   │  │ validation│  │   │
//! │  │   │  Invoice  │  │   Money   │  │ allocate  │  │   rules   │  │   │
//! │  │   │  Payment  │  │  TaxRate  │  │ reverse   │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Customer, Sale, Payment, InventoryBatch, ...)
//! - [`money`] - Money type with integer arithmetic
//! - [`ledger`] - Allocation and reversal planning (the FIFO engine)
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use khata_core::{Money, PaymentStatus};
//!
//! let total = Money::from_cents(10_000);
//! assert_eq!(PaymentStatus::derive(Money::from_cents(2_000), total), PaymentStatus::Partial);
//! assert_eq!(PaymentStatus::derive(total, total), PaymentStatus::Paid);
//! assert_eq!(PaymentStatus::derive(Money::zero(), total), PaymentStatus::Unpaid);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod ledger;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, ValidationError};
pub use ledger::{AllocationPlan, InvoiceAdjustment, InvoiceBalance, ReversalPlan};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Tolerance used when comparing `amount_paid` against an invoice total.
///
/// An invoice counts as paid once it is within one minor unit of its total,
/// and as unpaid while at most one minor unit has been received.
pub const SETTLEMENT_TOLERANCE: Money = Money::from_cents(1);

/// Largest money amount accepted on any input (₹10 trillion in paise).
///
/// Keeps every sum the ledger forms well inside `i64`.
pub const MAX_MONEY_CENTS: i64 = 1_000_000_000_000_000;

/// Maximum quantity of a single line item.
pub const MAX_ITEM_QUANTITY: i64 = 100_000;

/// Maximum number of line items on one invoice.
pub const MAX_INVOICE_ITEMS: usize = 500;

/// Name given to the batch created alongside a new product.
pub const INITIAL_BATCH_NAME: &str = "Initial Stock";

/// Default name for batches added through restocking.
pub const RESTOCK_BATCH_NAME: &str = "Restock";
