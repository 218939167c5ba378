//! # Sale Lifecycle
//!
//! Creating, editing and deleting invoices together with the stock and
//! payment side effects each one carries.
//!
//! ## Side Effects
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_sale   INSERT invoice + items, decrement stock per line         │
//! │                                                                         │
//! │  update_sale   touch invoice, rewrite header fields                     │
//! │                amount paid lowered? trim allocations into credit        │
//! │                items replaced? restore old batch lines,                 │
//! │                                decrement new lines                      │
//! │                                                                         │
//! │  delete_sale   DELETE items RETURNING *                                 │
//! │                return allocated amounts to the payments' credit         │
//! │                DELETE invoice (NotFound if missing)                     │
//! │                restore batch lines                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each operation is one transaction under the customer's lock. A line
//! whose batch or product has disappeared is logged and skipped; any other
//! failure rolls the whole operation back.

use chrono::{DateTime, Utc};
use khata_core::validation::{
    validate_item_count, validate_money_ceiling, validate_non_negative, validate_percentage_bps,
    validate_quantity, validate_required, ValidationResult,
};
use khata_core::{
    new_id, CoreError, Money, PaymentMode, PaymentStatus, Sale, SaleItem, StockSource, TaxRate,
    ValidationError,
};
use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use ts_rs::TS;

use crate::error::{DbError, LedgerError, LedgerResult};
use crate::locks::CustomerLocks;
use crate::repository::customer::CustomerRepository;
use crate::repository::inventory::InventoryLedger;
use crate::repository::payment::PaymentRepository;
use crate::repository::sale::SaleRepository;

// =============================================================================
// Inputs
// =============================================================================

/// One line of a new invoice.
#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export)]
#[serde(default)]
pub struct NewSaleItem {
    pub product_id: Option<String>,
    pub batch_id: Option<String>,
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

impl NewSaleItem {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_required("name", &self.name)?;
        validate_quantity(self.quantity)?;
        validate_non_negative("unit_price_cents", Money::from_cents(self.unit_price_cents))?;
        self.line_total()?;
        Ok(())
    }

    fn line_total(&self) -> ValidationResult<Money> {
        let total = Money::from_cents(self.unit_price_cents)
            .checked_multiply_quantity(self.quantity)
            .ok_or_else(|| ValidationError::money_out_of_range("line_total_cents"))?;
        validate_money_ceiling("line_total_cents", total)?;
        Ok(total)
    }

    fn into_item(self, sale_id: &str, position: usize) -> ValidationResult<SaleItem> {
        let line_total_cents = self.line_total()?.cents();
        Ok(SaleItem {
            id: new_id(),
            sale_id: sale_id.to_string(),
            position: position as i64,
            product_id: self.product_id.filter(|id| !id.trim().is_empty()),
            batch_id: self.batch_id.filter(|id| !id.trim().is_empty()),
            name: self.name.trim().to_string(),
            quantity: self.quantity,
            unit_price_cents: self.unit_price_cents,
            line_total_cents,
        })
    }
}

fn validate_items(items: &[NewSaleItem]) -> ValidationResult<()> {
    validate_item_count(items.len())?;
    items.iter().try_for_each(NewSaleItem::validate)
}

fn build_items(items: Vec<NewSaleItem>, sale_id: &str) -> ValidationResult<Vec<SaleItem>> {
    items
        .into_iter()
        .enumerate()
        .map(|(position, item)| item.into_item(sale_id, position))
        .collect()
}

/// A checkout.
#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export)]
#[serde(default)]
pub struct NewSale {
    pub customer_id: String,
    pub items: Vec<NewSaleItem>,
    /// Defaults to the sum of the line totals.
    pub subtotal_cents: Option<i64>,
    /// GST applied to the subtotal when no explicit tax is given.
    pub gst_bps: Option<u32>,
    pub discount_bps: Option<u32>,
    /// Explicit tax; wins over `gst_bps`.
    pub tax_cents: Option<i64>,
    /// Defaults to the discounted subtotal plus tax.
    pub total_cents: Option<i64>,
    pub payment_method: Option<PaymentMode>,
    pub payment_status: Option<PaymentStatus>,
    /// Only read for a `partial` checkout.
    pub amount_paid_cents: Option<i64>,
    /// Defaults to now.
    #[ts(as = "Option<String>")]
    pub date: Option<DateTime<Utc>>,
}

impl NewSale {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_required("customer_id", &self.customer_id)?;
        validate_items(&self.items)?;
        validate_percentage_bps("gst_bps", self.gst_bps.unwrap_or(0))?;
        validate_percentage_bps("discount_bps", self.discount_bps.unwrap_or(0))?;
        for (field, value) in [
            ("subtotal_cents", self.subtotal_cents),
            ("tax_cents", self.tax_cents),
            ("total_cents", self.total_cents),
            ("amount_paid_cents", self.amount_paid_cents),
        ] {
            validate_non_negative(field, Money::from_cents(value.unwrap_or(0)))?;
        }
        Ok(())
    }

    fn subtotal(&self) -> ValidationResult<Money> {
        let subtotal = match self.subtotal_cents {
            Some(cents) => Money::from_cents(cents),
            None => {
                let mut sum = Money::zero();
                for item in &self.items {
                    sum = sum
                        .checked_add(item.line_total()?)
                        .ok_or_else(|| ValidationError::money_out_of_range("subtotal_cents"))?;
                }
                sum
            }
        };
        validate_money_ceiling("subtotal_cents", subtotal)?;
        Ok(subtotal)
    }

    /// Explicit tax, else GST on the subtotal, else nothing.
    fn tax(&self, subtotal: Money) -> Money {
        match (self.tax_cents, self.gst_bps) {
            (Some(cents), _) => Money::from_cents(cents),
            (None, Some(bps)) => subtotal.calculate_tax(TaxRate::from_bps(bps)),
            (None, None) => Money::zero(),
        }
    }

    /// Subtotal, tax and total. Totals above the money ceiling are rejected.
    fn amounts(&self, discount: TaxRate) -> ValidationResult<(Money, Money, Money)> {
        let subtotal = self.subtotal()?;
        let tax = self.tax(subtotal);
        let total = match self.total_cents {
            Some(cents) => Money::from_cents(cents),
            None => subtotal
                .apply_percentage_discount(discount)
                .checked_add(tax)
                .ok_or_else(|| ValidationError::money_out_of_range("total_cents"))?,
        };
        validate_money_ceiling("total_cents", total)?;
        Ok((subtotal, tax, total))
    }

    /// What the checkout says was received, from the requested status.
    fn amount_paid(&self, total: Money) -> Money {
        match self.payment_status {
            Some(PaymentStatus::Paid) => total,
            Some(PaymentStatus::Partial) => Money::from_cents(self.amount_paid_cents.unwrap_or(0)),
            Some(PaymentStatus::Unpaid) | None => Money::zero(),
        }
    }
}

/// An edit to an existing invoice. Absent fields stay as they are.
#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export)]
#[serde(default)]
pub struct SalePatch {
    pub subtotal_cents: Option<i64>,
    pub discount_bps: Option<u32>,
    pub tax_cents: Option<i64>,
    pub total_cents: Option<i64>,
    pub payment_method: Option<PaymentMode>,
    pub payment_status: Option<PaymentStatus>,
    pub amount_paid_cents: Option<i64>,
    /// Replaces every line when present.
    pub items: Option<Vec<NewSaleItem>>,
    /// Accepted but ignored: the invoice date never changes.
    #[ts(as = "Option<String>")]
    pub date: Option<DateTime<Utc>>,
}

impl SalePatch {
    pub fn validate(&self) -> ValidationResult<()> {
        if let Some(items) = &self.items {
            validate_items(items)?;
        }
        if let Some(bps) = self.discount_bps {
            validate_percentage_bps("discount_bps", bps)?;
        }
        for (field, value) in [
            ("subtotal_cents", self.subtotal_cents),
            ("tax_cents", self.tax_cents),
            ("total_cents", self.total_cents),
            ("amount_paid_cents", self.amount_paid_cents),
        ] {
            if let Some(cents) = value {
                validate_non_negative(field, Money::from_cents(cents))?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// Stock movement per line
// =============================================================================

/// Takes one line's quantity out of stock. Missing stock records are
/// logged and skipped.
async fn consume_line(conn: &mut SqliteConnection, item: &SaleItem) -> LedgerResult<()> {
    let result = match item.stock_source() {
        Some(StockSource::Batch(batch_id)) => {
            InventoryLedger::decrement_batch(conn, batch_id, item.quantity)
                .await
                .map(|_| ())
        }
        Some(StockSource::Legacy(product_id)) => {
            InventoryLedger::decrement_legacy(conn, product_id, item.quantity)
                .await
                .map(|_| ())
        }
        None => return Ok(()),
    };

    match result {
        Ok(()) => Ok(()),
        Err(DbError::NotFound { entity, id }) => {
            warn!(
                sale_id = %item.sale_id,
                line = item.position,
                entity = %entity,
                id = %id,
                "Stock record missing, line not deducted"
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Puts one line's quantity back into its batch. Lines sold from the
/// legacy product counter are not restored.
async fn restore_line(conn: &mut SqliteConnection, item: &SaleItem) -> LedgerResult<()> {
    match item.stock_source() {
        Some(StockSource::Batch(batch_id)) => {
            match InventoryLedger::restore_batch(conn, batch_id, item.quantity).await {
                Ok(_) => Ok(()),
                Err(DbError::NotFound { .. }) => {
                    warn!(
                        sale_id = %item.sale_id,
                        batch_id = %batch_id,
                        quantity = item.quantity,
                        "Batch missing, stock not restored"
                    );
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        }
        Some(StockSource::Legacy(product_id)) => {
            debug!(product_id = %product_id, quantity = item.quantity, "Legacy line, stock not restored");
            Ok(())
        }
        None => Ok(()),
    }
}

// =============================================================================
// Service
// =============================================================================

/// Creates, edits and deletes invoices.
#[derive(Debug, Clone)]
pub struct SaleLifecycle {
    pool: SqlitePool,
    locks: CustomerLocks,
}

impl SaleLifecycle {
    pub fn new(pool: SqlitePool, locks: CustomerLocks) -> Self {
        SaleLifecycle { pool, locks }
    }

    async fn customer_of(&self, sale_id: &str) -> LedgerResult<String> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query_scalar::<_, String>("SELECT customer_id FROM sales WHERE id = ?1")
            .bind(sale_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| LedgerError::not_found("Sale", sale_id))
    }

    /// Creates an invoice and takes its lines out of stock.
    ///
    /// ## Errors
    /// - `Validation` for malformed input
    /// - `Rule` if the amount paid exceeds the total
    /// - `NotFound` if the customer does not exist
    pub async fn create_sale(&self, new: NewSale) -> LedgerResult<Sale> {
        new.validate()?;

        let discount = TaxRate::from_bps(new.discount_bps.unwrap_or(0));
        let (subtotal, tax, total) = new.amounts(discount)?;
        let amount_paid = new.amount_paid(total);
        if amount_paid > total {
            return Err(CoreError::InvalidInvoiceAmounts {
                reason: format!("amount paid {} exceeds total {}", amount_paid, total),
            }
            .into());
        }

        let customer_id = new.customer_id.trim().to_string();
        {
            let mut conn = self.pool.acquire().await?;
            if !CustomerRepository::exists(&mut conn, &customer_id).await? {
                return Err(LedgerError::not_found("Customer", &customer_id));
            }
        }

        let _guard = self.locks.acquire(&customer_id).await;

        let now = Utc::now();
        let sale_id = new_id();
        let items = build_items(new.items, &sale_id)?;
        let mut sale = Sale {
            id: sale_id,
            invoice_number: String::new(),
            customer_id,
            subtotal_cents: subtotal.cents(),
            discount_bps: discount.bps(),
            tax_cents: tax.cents(),
            total_cents: total.cents(),
            amount_paid_cents: amount_paid.cents(),
            payment_status: PaymentStatus::derive(amount_paid, total),
            payment_method: new.payment_method,
            date: new.date.unwrap_or(now),
            created_at: now,
            updated_at: now,
            items: Vec::new(),
        };

        let mut tx = self.pool.begin().await?;

        sale.invoice_number = SaleRepository::insert(&mut tx, &sale).await?;
        SaleRepository::insert_items(&mut tx, &items).await?;
        for item in &items {
            consume_line(&mut tx, item).await?;
        }

        tx.commit().await?;
        sale.items = items;

        info!(
            sale_id = %sale.id,
            invoice_number = %sale.invoice_number,
            customer_id = %sale.customer_id,
            total = sale.total_cents,
            amount_paid = sale.amount_paid_cents,
            status = sale.payment_status.as_str(),
            lines = sale.items.len(),
            "Sale created"
        );
        Ok(sale)
    }

    /// Edits an invoice.
    ///
    /// ## Payment Status
    /// - `paid`: amount paid becomes the (new) total
    /// - `unpaid`: amount paid becomes zero
    /// - `partial`: amount paid is the supplied value, else unchanged
    /// - absent: amount paid is the supplied value, else unchanged, and the
    ///   status is derived from it
    ///
    /// A forced status is stored as given even if the amounts disagree.
    pub async fn update_sale(&self, sale_id: &str, patch: SalePatch) -> LedgerResult<Sale> {
        patch.validate()?;

        let customer_id = self.customer_of(sale_id).await?;
        let _guard = self.locks.acquire(&customer_id).await;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        if !SaleRepository::touch(&mut tx, sale_id, now).await? {
            return Err(LedgerError::not_found("Sale", sale_id));
        }
        let mut sale = SaleRepository::fetch(&mut tx, sale_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Sale", sale_id))?;

        if patch.date.is_some() {
            debug!(sale_id = %sale_id, "Ignoring date change on invoice");
        }

        if let Some(cents) = patch.subtotal_cents {
            sale.subtotal_cents = cents;
        }
        if let Some(bps) = patch.discount_bps {
            sale.discount_bps = bps;
        }
        if let Some(cents) = patch.tax_cents {
            sale.tax_cents = cents;
        }
        if let Some(cents) = patch.total_cents {
            sale.total_cents = cents;
        }
        if patch.payment_method.is_some() {
            sale.payment_method = patch.payment_method;
        }

        let previous_paid = sale.amount_paid();
        let supplied_or_current = patch.amount_paid_cents.unwrap_or(sale.amount_paid_cents);
        sale.amount_paid_cents = match patch.payment_status {
            Some(PaymentStatus::Paid) => sale.total_cents,
            Some(PaymentStatus::Unpaid) => 0,
            Some(PaymentStatus::Partial) | None => supplied_or_current,
        };
        sale.payment_status = match patch.payment_status {
            Some(forced) => forced,
            None => {
                if sale.amount_paid() > sale.total() {
                    return Err(CoreError::InvalidInvoiceAmounts {
                        reason: format!(
                            "amount paid {} exceeds total {}",
                            sale.amount_paid(),
                            sale.total()
                        ),
                    }
                    .into());
                }
                PaymentStatus::derive(sale.amount_paid(), sale.total())
            }
        };
        sale.updated_at = now;

        if let Some(new_items) = patch.items {
            let old_items = SaleRepository::take_items(&mut tx, sale_id).await?;
            for item in &old_items {
                restore_line(&mut tx, item).await?;
            }

            let items = build_items(new_items, sale_id)?;
            SaleRepository::insert_items(&mut tx, &items).await?;
            for item in &items {
                consume_line(&mut tx, item).await?;
            }

            debug!(
                sale_id = %sale_id,
                removed = old_items.len(),
                added = items.len(),
                "Invoice lines replaced"
            );
        }

        if sale.amount_paid() < previous_paid {
            let released =
                PaymentRepository::trim_invoice(&mut tx, sale_id, sale.amount_paid()).await?;
            if released.is_positive() {
                debug!(
                    sale_id = %sale_id,
                    released = released.cents(),
                    "Allocations trimmed to the edited amount paid"
                );
            }
        }

        SaleRepository::update_header(&mut tx, &sale).await?;
        sale.items = SaleRepository::items(&mut tx, sale_id).await?;

        tx.commit().await?;

        info!(
            sale_id = %sale.id,
            total = sale.total_cents,
            amount_paid = sale.amount_paid_cents,
            status = sale.payment_status.as_str(),
            forced = patch.payment_status.is_some(),
            "Sale updated"
        );
        Ok(sale)
    }

    /// Deletes an invoice, returns its stock to the batches and its
    /// allocated payments to the customers' credit.
    ///
    /// ## Errors
    /// - `NotFound` if the invoice does not exist
    pub async fn delete_sale(&self, sale_id: &str) -> LedgerResult<Sale> {
        let customer_id = self.customer_of(sale_id).await?;
        let _guard = self.locks.acquire(&customer_id).await;

        let mut tx = self.pool.begin().await?;

        let items = SaleRepository::take_items(&mut tx, sale_id).await?;
        let released = PaymentRepository::release_invoice(&mut tx, sale_id).await?;
        let mut sale = SaleRepository::delete(&mut tx, sale_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Sale", sale_id))?;

        for item in &items {
            restore_line(&mut tx, item).await?;
        }

        tx.commit().await?;
        sale.items = items;

        let credited: Money = released.iter().map(|a| a.amount()).sum();
        info!(
            sale_id = %sale.id,
            invoice_number = %sale.invoice_number,
            lines = sale.items.len(),
            credited = credited.cents(),
            "Sale deleted"
        );
        Ok(sale)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::inventory::NewProduct;
    use crate::service::payment_ledger::NewPayment;
    use crate::testutil::{customer, ymd};
    use crate::{Database, DbConfig};
    use khata_core::{InventoryBatch, Product, MAX_MONEY_CENTS};

    async fn product(db: &Database, stock: i64) -> Product {
        db.inventory()
            .create_product(NewProduct {
                name: "Toor Dal 1kg".to_string(),
                gst_bps: 500,
                price_cents: 16_000,
                cost_cents: 14_000,
                stock,
                ..Default::default()
            })
            .await
            .unwrap()
    }

    async fn batch(db: &Database, id: &str) -> InventoryBatch {
        db.inventory().get_batch(id).await.unwrap().unwrap()
    }

    fn line(product: &Product, quantity: i64) -> NewSaleItem {
        NewSaleItem {
            product_id: Some(product.id.clone()),
            batch_id: product.batches.first().map(|b| b.id.clone()),
            name: product.name.clone(),
            quantity,
            unit_price_cents: product.price_cents,
        }
    }

    fn checkout(customer_id: &str, items: Vec<NewSaleItem>) -> NewSale {
        NewSale {
            customer_id: customer_id.to_string(),
            items,
            date: Some(ymd(2024, 1, 15)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_then_delete_restores_batch() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let c = customer(&db, "Asha Traders").await;
        let dal = product(&db, 10).await;
        let batch_id = dal.batches[0].id.clone();

        let sale = db
            .sale_lifecycle()
            .create_sale(checkout(&c, vec![line(&dal, 3)]))
            .await
            .unwrap();
        assert_eq!(sale.invoice_number, "INV-20240115-0001");
        assert_eq!(sale.subtotal_cents, 48_000);
        assert_eq!(sale.payment_status, PaymentStatus::Unpaid);
        assert_eq!(batch(&db, &batch_id).await.stock, 7);

        db.sale_lifecycle().delete_sale(&sale.id).await.unwrap();
        assert_eq!(batch(&db, &batch_id).await.stock, 10);
        assert!(db.sales().get_by_id(&sale.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stock_symmetry_through_zero() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let c = customer(&db, "Asha Traders").await;
        let dal = product(&db, 3).await;
        let batch_id = dal.batches[0].id.clone();
        let before = batch(&db, &batch_id).await;

        let sale = db
            .sale_lifecycle()
            .create_sale(checkout(&c, vec![line(&dal, 5)]))
            .await
            .unwrap();
        let oversold = batch(&db, &batch_id).await;
        assert_eq!(oversold.stock, -2);
        assert!(oversold.zero_stock_since.is_some());

        db.sale_lifecycle().delete_sale(&sale.id).await.unwrap();
        let after = batch(&db, &batch_id).await;
        assert_eq!(after.stock, before.stock);
        assert_eq!(after.zero_stock_since, before.zero_stock_since);
    }

    #[tokio::test]
    async fn test_tax_from_gst_and_explicit_override() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let c = customer(&db, "Asha Traders").await;

        let mut with_gst = checkout(&c, Vec::new());
        with_gst.subtotal_cents = Some(10_000);
        with_gst.gst_bps = Some(1_800);
        let sale = db.sale_lifecycle().create_sale(with_gst).await.unwrap();
        assert_eq!(sale.tax_cents, 1_800);
        assert_eq!(sale.total_cents, 11_800);

        let mut explicit = checkout(&c, Vec::new());
        explicit.subtotal_cents = Some(10_000);
        explicit.gst_bps = Some(1_800);
        explicit.tax_cents = Some(500);
        explicit.total_cents = Some(10_500);
        let sale = db.sale_lifecycle().create_sale(explicit).await.unwrap();
        assert_eq!(sale.tax_cents, 500);
        assert_eq!(sale.total_cents, 10_500);
    }

    #[tokio::test]
    async fn test_checkout_status_sets_amount_paid() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let c = customer(&db, "Asha Traders").await;

        let mut paid = checkout(&c, Vec::new());
        paid.total_cents = Some(5_000);
        paid.payment_status = Some(PaymentStatus::Paid);
        paid.amount_paid_cents = Some(1);
        let sale = db.sale_lifecycle().create_sale(paid).await.unwrap();
        assert_eq!(sale.amount_paid_cents, 5_000);
        assert_eq!(sale.payment_status, PaymentStatus::Paid);

        let mut partial = checkout(&c, Vec::new());
        partial.total_cents = Some(5_000);
        partial.payment_status = Some(PaymentStatus::Partial);
        partial.amount_paid_cents = Some(2_000);
        let sale = db.sale_lifecycle().create_sale(partial).await.unwrap();
        assert_eq!(sale.amount_paid_cents, 2_000);
        assert_eq!(sale.payment_status, PaymentStatus::Partial);

        let mut too_much = checkout(&c, Vec::new());
        too_much.total_cents = Some(5_000);
        too_much.payment_status = Some(PaymentStatus::Partial);
        too_much.amount_paid_cents = Some(6_000);
        let err = db.sale_lifecycle().create_sale(too_much).await.unwrap_err();
        assert!(matches!(err, LedgerError::Rule(CoreError::InvalidInvoiceAmounts { .. })));
        assert_eq!(db.sales().list_by_customer(&c).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_batch_does_not_block_sale() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let c = customer(&db, "Asha Traders").await;
        let dal = product(&db, 10).await;

        let ghost = NewSaleItem {
            batch_id: Some("deleted-batch".to_string()),
            name: "Old stock".to_string(),
            quantity: 1,
            unit_price_cents: 100,
            ..Default::default()
        };
        let sale = db
            .sale_lifecycle()
            .create_sale(checkout(&c, vec![ghost, line(&dal, 2)]))
            .await
            .unwrap();

        assert_eq!(sale.items.len(), 2);
        assert_eq!(batch(&db, &dal.batches[0].id).await.stock, 8);
        db.sale_lifecycle().delete_sale(&sale.id).await.unwrap();
        assert_eq!(batch(&db, &dal.batches[0].id).await.stock, 10);
    }

    #[tokio::test]
    async fn test_legacy_line_decrements_product() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let c = customer(&db, "Asha Traders").await;
        let dal = product(&db, 4).await;

        let legacy = NewSaleItem {
            batch_id: None,
            ..line(&dal, 6)
        };
        db.sale_lifecycle()
            .create_sale(checkout(&c, vec![legacy]))
            .await
            .unwrap();

        let reloaded = db.inventory().get_product(&dal.id).await.unwrap().unwrap();
        assert_eq!(reloaded.stock, 0);
        assert_eq!(reloaded.batches[0].stock, 4);
    }

    #[tokio::test]
    async fn test_update_forced_statuses() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let c = customer(&db, "Asha Traders").await;
        let mut new = checkout(&c, Vec::new());
        new.total_cents = Some(5_000);
        let sale = db.sale_lifecycle().create_sale(new).await.unwrap();
        let lifecycle = db.sale_lifecycle();

        let paid = lifecycle
            .update_sale(
                &sale.id,
                SalePatch {
                    payment_status: Some(PaymentStatus::Paid),
                    total_cents: Some(6_000),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(paid.amount_paid_cents, 6_000);
        assert_eq!(paid.payment_status, PaymentStatus::Paid);

        let partial = lifecycle
            .update_sale(
                &sale.id,
                SalePatch {
                    payment_status: Some(PaymentStatus::Partial),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(partial.amount_paid_cents, 6_000);
        assert_eq!(partial.payment_status, PaymentStatus::Partial);

        let unpaid = lifecycle
            .update_sale(
                &sale.id,
                SalePatch {
                    payment_status: Some(PaymentStatus::Unpaid),
                    date: Some(ymd(2030, 1, 1)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(unpaid.amount_paid_cents, 0);
        assert_eq!(unpaid.date, ymd(2024, 1, 15));
    }

    #[tokio::test]
    async fn test_update_without_status_derives_it() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let c = customer(&db, "Asha Traders").await;
        let mut new = checkout(&c, Vec::new());
        new.total_cents = Some(5_000);
        let sale = db.sale_lifecycle().create_sale(new).await.unwrap();

        let updated = db
            .sale_lifecycle()
            .update_sale(
                &sale.id,
                SalePatch {
                    amount_paid_cents: Some(2_500),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.payment_status, PaymentStatus::Partial);
        assert!(updated.is_consistent());

        let err = db
            .sale_lifecycle()
            .update_sale(
                &sale.id,
                SalePatch {
                    amount_paid_cents: Some(9_000),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Rule(_)));
    }

    #[tokio::test]
    async fn test_update_replaces_lines_and_moves_stock() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let c = customer(&db, "Asha Traders").await;
        let dal = product(&db, 10).await;
        let batch_id = dal.batches[0].id.clone();

        let sale = db
            .sale_lifecycle()
            .create_sale(checkout(&c, vec![line(&dal, 3)]))
            .await
            .unwrap();
        assert_eq!(batch(&db, &batch_id).await.stock, 7);

        let updated = db
            .sale_lifecycle()
            .update_sale(
                &sale.id,
                SalePatch {
                    items: Some(vec![line(&dal, 5), line(&dal, 1)]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.items.len(), 2);
        assert_eq!(batch(&db, &batch_id).await.stock, 4);
    }

    #[tokio::test]
    async fn test_delete_sale_returns_payment_to_credit() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let c = customer(&db, "Asha Traders").await;
        let mut new = checkout(&c, Vec::new());
        new.total_cents = Some(5_000);
        let sale = db.sale_lifecycle().create_sale(new).await.unwrap();

        let outcome = db
            .payment_ledger()
            .add_payment(NewPayment {
                customer_id: c.clone(),
                amount_cents: 3_000,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(outcome.payment.unapplied_cents, 0);

        db.sale_lifecycle().delete_sale(&sale.id).await.unwrap();

        let payment = db.payments().get_by_id(&outcome.payment.id).await.unwrap().unwrap();
        assert_eq!(payment.unapplied_cents, 3_000);
        let balance = db.customers().balance(&c).await.unwrap();
        assert_eq!(balance.credit_cents, 3_000);
        assert_eq!(balance.outstanding_cents, 0);
    }

    #[tokio::test]
    async fn test_oversized_amounts_are_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let c = customer(&db, "Asha Traders").await;

        let huge_line = NewSaleItem {
            name: "Bulk order".to_string(),
            quantity: 3,
            unit_price_cents: i64::MAX / 2,
            ..Default::default()
        };
        let err = db
            .sale_lifecycle()
            .create_sale(checkout(&c, vec![huge_line]))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let mut huge_subtotal = checkout(&c, Vec::new());
        huge_subtotal.subtotal_cents = Some(i64::MAX);
        huge_subtotal.gst_bps = Some(10_000);
        let err = db.sale_lifecycle().create_sale(huge_subtotal).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let mut at_ceiling = checkout(&c, Vec::new());
        at_ceiling.subtotal_cents = Some(MAX_MONEY_CENTS);
        at_ceiling.gst_bps = Some(1_800);
        let err = db.sale_lifecycle().create_sale(at_ceiling).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        assert!(db.sales().list_by_customer(&c).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_forced_unpaid_releases_allocations_to_credit() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let c = customer(&db, "Asha Traders").await;
        let mut new = checkout(&c, Vec::new());
        new.total_cents = Some(5_000);
        let sale = db.sale_lifecycle().create_sale(new).await.unwrap();
        let ledger = db.payment_ledger();
        let pay = |amount_cents| NewPayment {
            customer_id: c.clone(),
            amount_cents,
            ..Default::default()
        };

        let first = ledger.add_payment(pay(3_000)).await.unwrap();
        db.sale_lifecycle()
            .update_sale(
                &sale.id,
                SalePatch {
                    payment_status: Some(PaymentStatus::Unpaid),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let released = db.payments().get_by_id(&first.payment.id).await.unwrap().unwrap();
        assert_eq!(released.unapplied_cents, 3_000);
        assert!(db.payments().allocations(&first.payment.id).await.unwrap().is_empty());

        let second = ledger.add_payment(pay(3_000)).await.unwrap();
        ledger.delete_payment(&first.payment.id).await.unwrap();

        let invoice = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(invoice.amount_paid_cents, 3_000);
        assert_eq!(invoice.payment_status, PaymentStatus::Partial);
        let kept = db.payments().allocations(&second.payment.id).await.unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].amount_cents, 3_000);
    }

    #[tokio::test]
    async fn test_lowered_amount_paid_trims_newest_allocation() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let c = customer(&db, "Asha Traders").await;
        let mut new = checkout(&c, Vec::new());
        new.total_cents = Some(5_000);
        let sale = db.sale_lifecycle().create_sale(new).await.unwrap();
        let ledger = db.payment_ledger();
        let pay = |amount_cents| NewPayment {
            customer_id: c.clone(),
            amount_cents,
            ..Default::default()
        };

        let first = ledger.add_payment(pay(2_000)).await.unwrap();
        let second = ledger.add_payment(pay(2_000)).await.unwrap();

        db.sale_lifecycle()
            .update_sale(
                &sale.id,
                SalePatch {
                    amount_paid_cents: Some(3_000),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let trimmed = db.payments().get_by_id(&second.payment.id).await.unwrap().unwrap();
        assert_eq!(trimmed.unapplied_cents, 1_000);

        ledger.delete_payment(&second.payment.id).await.unwrap();
        let invoice = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(invoice.amount_paid_cents, 2_000);

        ledger.delete_payment(&first.payment.id).await.unwrap();
        let invoice = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(invoice.amount_paid_cents, 0);
        assert_eq!(invoice.payment_status, PaymentStatus::Unpaid);
    }

    #[tokio::test]
    async fn test_stock_failure_rolls_back_whole_sale() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let c = customer(&db, "Asha Traders").await;
        let dal = product(&db, 10).await;
        let sugar = product(&db, 10).await;

        let trigger = format!(
            "CREATE TRIGGER lock_batch BEFORE UPDATE ON inventory_batches \
             WHEN OLD.id = '{}' BEGIN SELECT RAISE(ABORT, 'batch locked'); END",
            sugar.batches[0].id
        );
        sqlx::query(&trigger).execute(db.pool()).await.unwrap();

        let err = db
            .sale_lifecycle()
            .create_sale(checkout(&c, vec![line(&dal, 2), line(&sugar, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Db(_)));
        assert!(!err.is_not_found());

        assert_eq!(batch(&db, &dal.batches[0].id).await.stock, 10);
        assert!(db.sales().list_by_customer(&c).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_sale_is_not_found() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.sale_lifecycle().delete_sale("missing").await.unwrap_err().is_not_found());
        assert!(db
            .sale_lifecycle()
            .update_sale("missing", SalePatch::default())
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_unknown_customer_is_not_found() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db
            .sale_lifecycle()
            .create_sale(checkout("ghost", Vec::new()))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
