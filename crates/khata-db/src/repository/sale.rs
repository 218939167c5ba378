//! # Sale Repository
//!
//! Storage for invoices (`sales`) and their line items.
//!
//! Most functions take `&mut SqliteConnection` and are meant to run inside
//! a transaction opened by the payment ledger or the sale lifecycle. The
//! pool-level methods are read-only views.
//!
//! ## Invoice Numbers
//! `INV-YYYYMMDD-NNNN`, where the date part comes from the invoice date and
//! `NNNN` is one more than the highest sequence already used for that day.
//! The sequence is computed inside the INSERT itself, so the read and the
//! write happen under the same SQLite write lock.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use khata_core::{InvoiceAdjustment, InvoiceBalance, PaymentStatus, Sale, SaleItem};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};

/// Columns of `sales` that make up an [`InvoiceBalance`].
const BALANCE_COLUMNS: &str =
    "id AS invoice_id, date, total_cents, amount_paid_cents, payment_status";

/// Invoice number prefix for a given invoice date.
pub fn invoice_prefix(date: DateTime<Utc>) -> String {
    format!("INV-{}-", date.format("%Y%m%d"))
}

fn attach_items(sales: &mut [Sale], items: Vec<SaleItem>) {
    let mut by_sale: HashMap<String, Vec<SaleItem>> = HashMap::new();
    for item in items {
        by_sale.entry(item.sale_id.clone()).or_default().push(item);
    }
    for sale in sales {
        sale.items = by_sale.remove(&sale.id).unwrap_or_default();
    }
}

/// Repository for invoice database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    // =========================================================================
    // Pool-level reads
    // =========================================================================

    /// Gets an invoice with its line items.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_with_items(&mut conn, id).await
    }

    /// Lists a customer's invoices, oldest first, with their line items.
    pub async fn list_by_customer(&self, customer_id: &str) -> DbResult<Vec<Sale>> {
        let mut sales = sqlx::query_as::<_, Sale>(
            "SELECT * FROM sales WHERE customer_id = ?1 ORDER BY date ASC, id ASC",
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        let items = sqlx::query_as::<_, SaleItem>(
            r#"
            SELECT si.* FROM sale_items si
            JOIN sales s ON s.id = si.sale_id
            WHERE s.customer_id = ?1
            ORDER BY si.sale_id, si.position
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        attach_items(&mut sales, items);
        Ok(sales)
    }

    /// Lists the most recent invoices across all customers, newest first,
    /// with their line items.
    pub async fn list_recent(&self, limit: i64) -> DbResult<Vec<Sale>> {
        let mut sales =
            sqlx::query_as::<_, Sale>("SELECT * FROM sales ORDER BY date DESC, id DESC LIMIT ?1")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;

        let items = sqlx::query_as::<_, SaleItem>(
            r#"
            SELECT * FROM sale_items
            WHERE sale_id IN (SELECT id FROM sales ORDER BY date DESC, id DESC LIMIT ?1)
            ORDER BY sale_id, position
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        attach_items(&mut sales, items);
        Ok(sales)
    }

    // =========================================================================
    // Connection-level reads
    // =========================================================================

    /// Loads an invoice header (no items).
    pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(sale)
    }

    /// Loads an invoice with its line items.
    pub async fn fetch_with_items(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Sale>> {
        let Some(mut sale) = Self::fetch(conn, id).await? else {
            return Ok(None);
        };
        sale.items = Self::items(conn, id).await?;
        Ok(Some(sale))
    }

    /// Line items of an invoice in position order.
    pub async fn items(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let items = sqlx::query_as::<_, SaleItem>(
            "SELECT * FROM sale_items WHERE sale_id = ?1 ORDER BY position",
        )
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(items)
    }

    /// A customer's invoices that are not paid, oldest first.
    pub async fn open_invoices(
        conn: &mut SqliteConnection,
        customer_id: &str,
    ) -> DbResult<Vec<InvoiceBalance>> {
        let sql = format!(
            "SELECT {BALANCE_COLUMNS} FROM sales \
             WHERE customer_id = ?1 AND payment_status != ?2 \
             ORDER BY date ASC, id ASC"
        );
        let invoices = sqlx::query_as::<_, InvoiceBalance>(&sql)
            .bind(customer_id)
            .bind(PaymentStatus::Paid)
            .fetch_all(&mut *conn)
            .await?;

        Ok(invoices)
    }

    /// A customer's invoices that have received money, newest first.
    pub async fn paid_invoices(
        conn: &mut SqliteConnection,
        customer_id: &str,
    ) -> DbResult<Vec<InvoiceBalance>> {
        let sql = format!(
            "SELECT {BALANCE_COLUMNS} FROM sales \
             WHERE customer_id = ?1 AND amount_paid_cents > 0 \
             ORDER BY date DESC, id DESC"
        );
        let invoices = sqlx::query_as::<_, InvoiceBalance>(&sql)
            .bind(customer_id)
            .fetch_all(&mut *conn)
            .await?;

        Ok(invoices)
    }

    /// The allocation view of one invoice.
    pub async fn balance(
        conn: &mut SqliteConnection,
        invoice_id: &str,
    ) -> DbResult<Option<InvoiceBalance>> {
        let sql = format!("SELECT {BALANCE_COLUMNS} FROM sales WHERE id = ?1");
        let invoice = sqlx::query_as::<_, InvoiceBalance>(&sql)
            .bind(invoice_id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(invoice)
    }

    // =========================================================================
    // Connection-level writes
    // =========================================================================

    /// Inserts an invoice header and returns the invoice number it was
    /// given. `sale.invoice_number` is ignored.
    pub async fn insert(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<String> {
        let prefix = invoice_prefix(sale.date);

        let invoice_number: String = sqlx::query_scalar(
            r#"
            INSERT INTO sales (
                id, invoice_number, customer_id,
                subtotal_cents, discount_bps, tax_cents, total_cents,
                amount_paid_cents, payment_status, payment_method,
                date, created_at, updated_at
            ) VALUES (
                ?1,
                ?2 || printf('%04d', (
                    SELECT COALESCE(MAX(CAST(substr(invoice_number, length(?2) + 1) AS INTEGER)), 0) + 1
                    FROM sales
                    WHERE invoice_number LIKE ?2 || '%'
                )),
                ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13
            )
            RETURNING invoice_number
            "#,
        )
        .bind(&sale.id)
        .bind(&prefix)
        .bind(&sale.customer_id)
        .bind(sale.subtotal_cents)
        .bind(sale.discount_bps)
        .bind(sale.tax_cents)
        .bind(sale.total_cents)
        .bind(sale.amount_paid_cents)
        .bind(sale.payment_status)
        .bind(sale.payment_method)
        .bind(sale.date)
        .bind(sale.created_at)
        .bind(sale.updated_at)
        .fetch_one(&mut *conn)
        .await?;

        debug!(sale_id = %sale.id, invoice_number = %invoice_number, "Invoice inserted");
        Ok(invoice_number)
    }

    /// Inserts line items.
    pub async fn insert_items(conn: &mut SqliteConnection, items: &[SaleItem]) -> DbResult<()> {
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO sale_items (
                    id, sale_id, position, product_id, batch_id,
                    name, quantity, unit_price_cents, line_total_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&item.id)
            .bind(&item.sale_id)
            .bind(item.position)
            .bind(&item.product_id)
            .bind(&item.batch_id)
            .bind(&item.name)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(item.line_total_cents)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    /// Bumps `updated_at`. Returns false if the invoice does not exist.
    ///
    /// Used as the opening write of an update so the transaction holds the
    /// write lock before it reads anything.
    pub async fn touch(conn: &mut SqliteConnection, id: &str, now: DateTime<Utc>) -> DbResult<bool> {
        let result = sqlx::query("UPDATE sales SET updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(now)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Writes back every mutable header field of an invoice.
    ///
    /// `date`, `invoice_number` and `customer_id` never change.
    pub async fn update_header(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sales SET
                subtotal_cents = ?2,
                discount_bps = ?3,
                tax_cents = ?4,
                total_cents = ?5,
                amount_paid_cents = ?6,
                payment_status = ?7,
                payment_method = ?8,
                updated_at = ?9
            WHERE id = ?1
            "#,
        )
        .bind(&sale.id)
        .bind(sale.subtotal_cents)
        .bind(sale.discount_bps)
        .bind(sale.tax_cents)
        .bind(sale.total_cents)
        .bind(sale.amount_paid_cents)
        .bind(sale.payment_status)
        .bind(sale.payment_method)
        .bind(sale.updated_at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Sale", &sale.id));
        }
        Ok(())
    }

    /// Applies one planned change to an invoice's paid amount.
    ///
    /// The write only lands if `amount_paid` still holds the value the plan
    /// was computed from.
    pub async fn apply_adjustment(
        conn: &mut SqliteConnection,
        adjustment: &InvoiceAdjustment,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sales SET
                amount_paid_cents = ?2,
                payment_status = ?3,
                updated_at = ?4
            WHERE id = ?1 AND amount_paid_cents = ?5
            "#,
        )
        .bind(&adjustment.invoice_id)
        .bind(adjustment.new_paid_cents)
        .bind(adjustment.payment_status)
        .bind(now)
        .bind(adjustment.previous_paid_cents)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::TransactionFailed(format!(
                "Invoice {} changed during allocation",
                adjustment.invoice_id
            )));
        }

        debug!(
            invoice_id = %adjustment.invoice_id,
            from = adjustment.previous_paid_cents,
            to = adjustment.new_paid_cents,
            status = adjustment.payment_status.as_str(),
            "Invoice adjusted"
        );
        Ok(())
    }

    /// Deletes an invoice's line items, returning them.
    pub async fn take_items(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let mut items = sqlx::query_as::<_, SaleItem>(
            "DELETE FROM sale_items WHERE sale_id = ?1 RETURNING *",
        )
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;

        items.sort_by_key(|item| item.position);
        Ok(items)
    }

    /// Deletes an invoice header, returning it. Items and allocations go
    /// with it by cascade.
    pub async fn delete(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Sale>> {
        let sale = sqlx::query_as::<_, Sale>("DELETE FROM sales WHERE id = ?1 RETURNING *")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(sale)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
