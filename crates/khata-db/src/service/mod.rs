//! # Ledger Services
//!
//! The operations that change money or stock. Each one takes the
//! customer's lock, opens one transaction, and either commits every write
//! or none.
//!
//! - [`PaymentLedger`](payment_ledger::PaymentLedger) - add / delete payments
//! - [`SaleLifecycle`](sale_lifecycle::SaleLifecycle) - create / update / delete sales

pub mod payment_ledger;
pub mod sale_lifecycle;
