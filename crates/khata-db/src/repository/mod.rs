//! # Repository Module
//!
//! SQL access for each table group.
//!
//! ## Two Kinds of Method
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  &self methods            run on the pool; plain reads and one-shot    │
//! │                           writes (db.sales().get_by_id(id))            │
//! │                                                                         │
//! │  Self::f(conn, …)         run on a connection the caller owns, usually │
//! │                           a transaction opened by a ledger service     │
//! │                           (SaleRepository::apply_adjustment(&mut *tx)) │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CustomerRepository`] - Customers and their balances
//! - [`InventoryRepository`] - Products and batches
//! - [`InventoryLedger`] - Stock movements driven by sales
//! - [`SaleRepository`] - Invoices and line items
//! - [`PaymentRepository`] - Payments and allocations

pub mod customer;
pub mod inventory;
pub mod payment;
pub mod sale;

pub use customer::{CustomerRepository, NewCustomer};
pub use inventory::{
    BatchPatch, InventoryLedger, InventoryRepository, NewBatch, NewProduct, ProductPatch,
};
pub use payment::PaymentRepository;
pub use sale::SaleRepository;
