//! # Domain Types
//!
//! Core domain types used throughout Khata.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Customer     │◄──│  Sale (invoice) │◄──│PaymentAllocation│       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │   │  total_cents    │   │  payment_id     │       │
//! │  │  name, phone    │   │  amount_paid    │   │  invoice_id     │       │
//! │  └────────▲────────┘   │  payment_status │   │  amount_cents   │       │
//! │           │            │  items[]        │   └────────┬────────┘       │
//! │           │            └───────┬─────────┘            │                │
//! │  ┌────────┴────────┐           │ batch_id             │                │
//! │  │    Payment      │◄──────────┼──────────────────────┘                │
//! │  │  amount_cents   │   ┌───────▼─────────┐   ┌─────────────────┐       │
//! │  │  unapplied      │   │ InventoryBatch  │──►│    Product      │       │
//! │  │  payment_mode   │   │  stock          │   │  legacy stock   │       │
//! │  └─────────────────┘   │  zero_stock_since│  │  gst_bps        │       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Monetary fields are stored as raw minor units (`*_cents: i64`) so rows
//! map straight onto SQLite columns; accessor methods return [`Money`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::money::Money;
use crate::SETTLEMENT_TOLERANCE;

/// Generates a new entity identifier (UUID v4).
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Tax Rate
// =============================================================================

/// A percentage represented in basis points (bps).
///
/// Used for GST and for invoice-level discounts.
/// 1 basis point = 0.01%, so 1800 bps = 18% GST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Zero rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Payment Status
// =============================================================================

/// Settlement state of an invoice.
///
/// ## State Machine
/// ```text
///            allocate (amount_paid ↑)
///   Unpaid ───────────► Partial ───────────► Paid
///     ▲                   │  ▲                 │
///     └───────────────────┘  └─────────────────┘
///            reverse (amount_paid ↓)
/// ```
/// Forced edits through `update_sale` may jump directly between any states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Nothing (within tolerance) has been received.
    Unpaid,
    /// Some, but not all, of the total has been received.
    Partial,
    /// Total received (within tolerance).
    Paid,
}

impl PaymentStatus {
    /// Derives the status from the amounts on an invoice.
    ///
    /// ## Rules
    /// - `Paid` when `amount_paid ≥ total − ε`
    /// - `Unpaid` when `amount_paid ≤ ε`
    /// - `Partial` otherwise
    ///
    /// The paid check runs first, so a zero-total invoice is `Paid`.
    ///
    /// ## Example
    /// ```rust
    /// use khata_core::{Money, PaymentStatus};
    ///
    /// let total = Money::from_cents(5000);
    /// assert_eq!(PaymentStatus::derive(Money::from_cents(4999), total), PaymentStatus::Paid);
    /// assert_eq!(PaymentStatus::derive(Money::from_cents(2000), total), PaymentStatus::Partial);
    /// assert_eq!(PaymentStatus::derive(Money::from_cents(1), total), PaymentStatus::Unpaid);
    /// ```
    pub fn derive(amount_paid: Money, total: Money) -> Self {
        if amount_paid >= total - SETTLEMENT_TOLERANCE {
            PaymentStatus::Paid
        } else if amount_paid <= SETTLEMENT_TOLERANCE {
            PaymentStatus::Unpaid
        } else {
            PaymentStatus::Partial
        }
    }

    /// Returns the lowercase storage name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
        }
    }
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Unpaid
    }
}

// =============================================================================
// Payment Mode
// =============================================================================

/// How money was received, for both sale checkout and ledger payments.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    Cash,
    /// UPI transfer. The checkout screen labels this `upi_only`.
    #[serde(alias = "upi_only")]
    Upi,
    BankTransfer,
    Cheque,
    Card,
}

impl Default for PaymentMode {
    fn default() -> Self {
        PaymentMode::Cash
    }
}

// =============================================================================
// Customer
// =============================================================================

/// A customer who receives invoices and makes payments.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub city: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Outstanding position of one customer.
///
/// `net_due_cents` is negative when the customer holds more credit than debt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CustomerBalance {
    pub customer_id: String,
    /// Σ max(total − amount_paid, 0) over the customer's invoices.
    pub outstanding_cents: i64,
    /// Σ unapplied amounts over the customer's payments.
    pub credit_cents: i64,
    pub net_due_cents: i64,
    /// Invoices not yet paid.
    pub open_invoices: i64,
}

impl CustomerBalance {
    /// Builds a balance from the two aggregates.
    pub fn new(customer_id: impl Into<String>, outstanding: Money, credit: Money, open_invoices: i64) -> Self {
        CustomerBalance {
            customer_id: customer_id.into(),
            outstanding_cents: outstanding.cents(),
            credit_cents: credit.cents(),
            net_due_cents: (outstanding - credit).cents(),
            open_invoices,
        }
    }
}

// =============================================================================
// Product & Inventory Batch
// =============================================================================

/// Inventory master record.
///
/// `price_cents` and `stock` are the legacy fields, used only by line
/// items that carry no batch reference.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub sku: Option<String>,
    pub company: Option<String>,
    pub unit: Option<String>,
    /// GST in basis points (1800 = 18%).
    pub gst_bps: u32,
    pub price_cents: i64,
    pub cost_cents: i64,
    pub wholesale_cents: i64,
    /// Legacy stock counter, clamped at zero.
    pub stock: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    /// Batches owned by this product (loaded separately).
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    #[serde(default)]
    pub batches: Vec<InventoryBatch>,
}

impl Product {
    /// Stock across all batches, or the legacy counter if there are none.
    pub fn total_stock(&self) -> i64 {
        if self.batches.is_empty() {
            self.stock
        } else {
            self.batches.iter().map(|b| b.stock).sum()
        }
    }
}

/// A restock lot of a product with its own prices and stock.
///
/// Stock may go negative when a batch is oversold.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryBatch {
    pub id: String,
    pub product_id: String,
    pub batch_name: String,
    pub sku_variant: Option<String>,
    pub cost_price_cents: i64,
    pub selling_price_cents: i64,
    pub wholesale_price_cents: i64,
    pub stock: i64,
    /// Set when stock reaches zero or below, cleared once it is positive.
    #[ts(as = "Option<String>")]
    pub zero_stock_since: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Sale (Invoice)
// =============================================================================

/// An invoice issued to a customer.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    /// Human-readable number, `INV-YYYYMMDD-NNNN`.
    pub invoice_number: String,
    pub customer_id: String,
    pub subtotal_cents: i64,
    pub discount_bps: u32,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub amount_paid_cents: i64,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<PaymentMode>,
    /// Invoice date; immutable once set.
    #[ts(as = "String")]
    pub date: DateTime<Utc>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    #[serde(default)]
    pub items: Vec<SaleItem>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn amount_paid(&self) -> Money {
        Money::from_cents(self.amount_paid_cents)
    }

    /// Remaining amount owed, never negative.
    #[inline]
    pub fn due(&self) -> Money {
        (self.total() - self.amount_paid()).non_negative()
    }

    /// Whether the stored status matches the amounts.
    pub fn is_consistent(&self) -> bool {
        self.payment_status == PaymentStatus::derive(self.amount_paid(), self.total())
    }
}

/// Where a line item's stock comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockSource<'a> {
    /// Decrement/restore the given batch.
    Batch(&'a str),
    /// Legacy product-level counter.
    Legacy(&'a str),
}

/// A line on an invoice.
///
/// Name and unit price are snapshots taken at sale time.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    /// Position of the line on the invoice.
    pub position: i64,
    pub product_id: Option<String>,
    pub batch_id: Option<String>,
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

impl SaleItem {
    /// Which stock counter this line moves, if any.
    ///
    /// Lines with a non-positive quantity, or with neither a batch nor a
    /// product reference, move nothing.
    pub fn stock_source(&self) -> Option<StockSource<'_>> {
        if self.quantity <= 0 {
            return None;
        }
        match (&self.batch_id, &self.product_id) {
            (Some(batch_id), _) => Some(StockSource::Batch(batch_id)),
            (None, Some(product_id)) => Some(StockSource::Legacy(product_id)),
            (None, None) => None,
        }
    }
}

// =============================================================================
// Payment
// =============================================================================

/// A discrete payment received from a customer.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub customer_id: String,
    pub amount_cents: i64,
    /// Portion that found no open invoice; held as customer credit.
    pub unapplied_cents: i64,
    #[ts(as = "String")]
    pub date: DateTime<Utc>,
    pub payment_mode: PaymentMode,
    pub reference: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Payment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    #[inline]
    pub fn unapplied(&self) -> Money {
        Money::from_cents(self.unapplied_cents)
    }

    /// Amount that reached invoices.
    #[inline]
    pub fn applied(&self) -> Money {
        self.amount() - self.unapplied()
    }
}

/// How much of one payment went to one invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PaymentAllocation {
    pub id: String,
    pub payment_id: String,
    pub invoice_id: String,
    pub amount_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl PaymentAllocation {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
