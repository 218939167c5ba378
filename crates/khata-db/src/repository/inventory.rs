//! # Inventory Repository
//!
//! Products, their stock batches, and the stock movements driven by sales.
//!
//! ## Stock Movements
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     InventoryLedger                                     │
//! │                                                                         │
//! │  line has batch_id ──► decrement_batch / restore_batch                 │
//! │                        one UPDATE … RETURNING, no read-modify-write    │
//! │                        stock may go negative (oversold)                │
//! │                        zero_stock_since set at ≤ 0, cleared at > 0     │
//! │                                                                         │
//! │  product_id only   ──► decrement_legacy                                │
//! │                        stock = MAX(stock − qty, 0)                     │
//! │                                                                         │
//! │  neither           ──► nothing to move                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The ledger functions take `&mut SqliteConnection` so they run inside the
//! caller's transaction.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use khata_core::validation::{validate_name, validate_non_negative, validate_percentage_bps};
use khata_core::{new_id, InventoryBatch, Money, Product, INITIAL_BATCH_NAME, RESTOCK_BATCH_NAME};
use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use ts_rs::TS;

use crate::error::{DbError, DbResult, LedgerResult};

// =============================================================================
// Inputs
// =============================================================================

/// Input for creating a product.
#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export)]
#[serde(default)]
pub struct NewProduct {
    pub name: String,
    pub sku: Option<String>,
    pub company: Option<String>,
    pub unit: Option<String>,
    pub gst_bps: u32,
    pub price_cents: i64,
    pub cost_cents: i64,
    pub wholesale_cents: i64,
    pub stock: i64,
}

impl NewProduct {
    pub fn validate(&self) -> LedgerResult<()> {
        validate_name("name", &self.name)?;
        validate_percentage_bps("gst_bps", self.gst_bps)?;
        validate_non_negative("price_cents", Money::from_cents(self.price_cents))?;
        validate_non_negative("cost_cents", Money::from_cents(self.cost_cents))?;
        validate_non_negative("wholesale_cents", Money::from_cents(self.wholesale_cents))?;
        if self.stock < 0 {
            return Err(khata_core::ValidationError::MustNotBeNegative {
                field: "stock".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// A product gets an opening batch when it has stock or a price.
    pub fn wants_initial_batch(&self) -> bool {
        self.stock > 0 || self.price_cents > 0
    }
}

/// Partial update of a product's master row. Absent fields are left
/// unchanged; batches are edited separately.
#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export)]
#[serde(default)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub sku: Option<String>,
    pub company: Option<String>,
    pub unit: Option<String>,
    pub gst_bps: Option<u32>,
    pub price_cents: Option<i64>,
    pub cost_cents: Option<i64>,
    pub wholesale_cents: Option<i64>,
    pub stock: Option<i64>,
}

impl ProductPatch {
    pub fn validate(&self) -> LedgerResult<()> {
        if let Some(name) = &self.name {
            validate_name("name", name)?;
        }
        if let Some(bps) = self.gst_bps {
            validate_percentage_bps("gst_bps", bps)?;
        }
        validate_prices([
            ("price_cents", self.price_cents),
            ("cost_cents", self.cost_cents),
            ("wholesale_cents", self.wholesale_cents),
        ])?;
        if self.stock.is_some_and(|stock| stock < 0) {
            return Err(khata_core::ValidationError::MustNotBeNegative {
                field: "stock".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

fn validate_prices<const N: usize>(prices: [(&str, Option<i64>); N]) -> LedgerResult<()> {
    for (field, cents) in prices {
        if let Some(cents) = cents {
            validate_non_negative(field, Money::from_cents(cents))?;
        }
    }
    Ok(())
}

/// Input for a restock batch.
#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export)]
#[serde(default)]
pub struct NewBatch {
    /// Defaults to "Restock".
    pub batch_name: Option<String>,
    pub sku_variant: Option<String>,
    pub cost_price_cents: i64,
    pub selling_price_cents: i64,
    pub wholesale_price_cents: i64,
    pub stock: i64,
}

/// Partial update of a batch. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export)]
#[serde(default)]
pub struct BatchPatch {
    pub batch_name: Option<String>,
    pub sku_variant: Option<String>,
    pub cost_price_cents: Option<i64>,
    pub selling_price_cents: Option<i64>,
    pub wholesale_price_cents: Option<i64>,
    pub stock: Option<i64>,
}

impl BatchPatch {
    pub fn validate(&self) -> LedgerResult<()> {
        if let Some(name) = &self.batch_name {
            validate_name("batch_name", name)?;
        }
        validate_prices([
            ("cost_price_cents", self.cost_price_cents),
            ("selling_price_cents", self.selling_price_cents),
            ("wholesale_price_cents", self.wholesale_price_cents),
        ])
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for products and batches.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Creates a product, plus an "Initial Stock" batch when it has stock
    /// or a price. Both rows commit together.
    pub async fn create_product(&self, new: NewProduct) -> LedgerResult<Product> {
        new.validate()?;

        let now = Utc::now();
        let mut product = Product {
            id: new_id(),
            name: new.name.trim().to_string(),
            sku: new.sku.clone(),
            company: new.company.clone(),
            unit: new.unit.clone(),
            gst_bps: new.gst_bps,
            price_cents: new.price_cents,
            cost_cents: new.cost_cents,
            wholesale_cents: new.wholesale_cents,
            stock: new.stock,
            created_at: now,
            updated_at: now,
            batches: Vec::new(),
        };

        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, sku, company, unit, gst_bps,
                price_cents, cost_cents, wholesale_cents, stock,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.sku)
        .bind(&product.company)
        .bind(&product.unit)
        .bind(product.gst_bps)
        .bind(product.price_cents)
        .bind(product.cost_cents)
        .bind(product.wholesale_cents)
        .bind(product.stock)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(DbError::from)?;

        if new.wants_initial_batch() {
            let opening = NewBatch {
                batch_name: Some(INITIAL_BATCH_NAME.to_string()),
                sku_variant: new.sku.clone(),
                cost_price_cents: new.cost_cents,
                selling_price_cents: new.price_cents,
                wholesale_price_cents: new.wholesale_cents,
                stock: new.stock,
            };
            let batch = Self::insert_batch(&mut tx, &product.id, opening, now).await?;
            product.batches.push(batch);
        }

        tx.commit().await.map_err(DbError::from)?;

        info!(
            product_id = %product.id,
            name = %product.name,
            batches = product.batches.len(),
            "Product created"
        );
        Ok(product)
    }

    /// Adds a restock batch to an existing product.
    pub async fn add_batch(&self, product_id: &str, new: NewBatch) -> LedgerResult<InventoryBatch> {
        if let Some(name) = &new.batch_name {
            validate_name("batch_name", name)?;
        }

        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM products WHERE id = ?1")
            .bind(product_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(DbError::from)?;
        if exists.is_none() {
            return Err(DbError::not_found("Product", product_id).into());
        }

        let batch = Self::insert_batch(&mut conn, product_id, new, Utc::now()).await?;
        info!(batch_id = %batch.id, product_id = %product_id, stock = batch.stock, "Batch added");
        Ok(batch)
    }

    async fn insert_batch(
        conn: &mut SqliteConnection,
        product_id: &str,
        new: NewBatch,
        now: DateTime<Utc>,
    ) -> DbResult<InventoryBatch> {
        let batch = InventoryBatch {
            id: new_id(),
            product_id: product_id.to_string(),
            batch_name: new
                .batch_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| RESTOCK_BATCH_NAME.to_string()),
            sku_variant: new.sku_variant,
            cost_price_cents: new.cost_price_cents,
            selling_price_cents: new.selling_price_cents,
            wholesale_price_cents: new.wholesale_price_cents,
            stock: new.stock,
            zero_stock_since: (new.stock <= 0).then_some(now),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO inventory_batches (
                id, product_id, batch_name, sku_variant,
                cost_price_cents, selling_price_cents, wholesale_price_cents,
                stock, zero_stock_since, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&batch.id)
        .bind(&batch.product_id)
        .bind(&batch.batch_name)
        .bind(&batch.sku_variant)
        .bind(batch.cost_price_cents)
        .bind(batch.selling_price_cents)
        .bind(batch.wholesale_price_cents)
        .bind(batch.stock)
        .bind(batch.zero_stock_since)
        .bind(batch.created_at)
        .bind(batch.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(batch)
    }

    /// Updates a batch. Setting `stock` recomputes `zero_stock_since`.
    pub async fn update_batch(&self, batch_id: &str, patch: BatchPatch) -> LedgerResult<InventoryBatch> {
        patch.validate()?;

        let now = Utc::now();
        let batch = sqlx::query_as::<_, InventoryBatch>(
            r#"
            UPDATE inventory_batches SET
                batch_name = COALESCE(?2, batch_name),
                sku_variant = COALESCE(?3, sku_variant),
                cost_price_cents = COALESCE(?4, cost_price_cents),
                selling_price_cents = COALESCE(?5, selling_price_cents),
                wholesale_price_cents = COALESCE(?6, wholesale_price_cents),
                stock = COALESCE(?7, stock),
                zero_stock_since = CASE
                    WHEN ?7 IS NULL THEN zero_stock_since
                    WHEN ?7 <= 0 THEN COALESCE(zero_stock_since, ?8)
                    ELSE NULL
                END,
                updated_at = ?8
            WHERE id = ?1
            RETURNING *
            "#,
        )
        .bind(batch_id)
        .bind(patch.batch_name.map(|n| n.trim().to_string()))
        .bind(patch.sku_variant)
        .bind(patch.cost_price_cents)
        .bind(patch.selling_price_cents)
        .bind(patch.wholesale_price_cents)
        .bind(patch.stock)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?
        .ok_or_else(|| DbError::not_found("Batch", batch_id))?;

        debug!(batch_id = %batch_id, stock = batch.stock, "Batch updated");
        Ok(batch)
    }

    /// Updates a product's master fields and returns it with its batches.
    pub async fn update_product(&self, product_id: &str, patch: ProductPatch) -> LedgerResult<Product> {
        patch.validate()?;

        let updated = sqlx::query(
            r#"
            UPDATE products SET
                name = COALESCE(?2, name),
                sku = COALESCE(?3, sku),
                company = COALESCE(?4, company),
                unit = COALESCE(?5, unit),
                gst_bps = COALESCE(?6, gst_bps),
                price_cents = COALESCE(?7, price_cents),
                cost_cents = COALESCE(?8, cost_cents),
                wholesale_cents = COALESCE(?9, wholesale_cents),
                stock = COALESCE(?10, stock),
                updated_at = ?11
            WHERE id = ?1
            "#,
        )
        .bind(product_id)
        .bind(patch.name.map(|n| n.trim().to_string()))
        .bind(patch.sku)
        .bind(patch.company)
        .bind(patch.unit)
        .bind(patch.gst_bps)
        .bind(patch.price_cents)
        .bind(patch.cost_cents)
        .bind(patch.wholesale_cents)
        .bind(patch.stock)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        if updated.rows_affected() == 0 {
            return Err(DbError::not_found("Product", product_id).into());
        }

        let product = self
            .get_product(product_id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", product_id))?;
        debug!(product_id = %product_id, "Product updated");
        Ok(product)
    }

    /// Gets a batch by ID.
    pub async fn get_batch(&self, batch_id: &str) -> DbResult<Option<InventoryBatch>> {
        let batch = sqlx::query_as::<_, InventoryBatch>("SELECT * FROM inventory_batches WHERE id = ?1")
            .bind(batch_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(batch)
    }

    /// Gets a product with its batches.
    pub async fn get_product(&self, product_id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?1")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(mut product) = product else {
            return Ok(None);
        };

        product.batches = sqlx::query_as::<_, InventoryBatch>(
            "SELECT * FROM inventory_batches WHERE product_id = ?1 ORDER BY created_at, id",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(product))
    }

    /// Lists all products by name, each with its batches.
    pub async fn list_products(&self) -> DbResult<Vec<Product>> {
        let mut products =
            sqlx::query_as::<_, Product>("SELECT * FROM products ORDER BY name COLLATE NOCASE, id")
                .fetch_all(&self.pool)
                .await?;

        let batches = sqlx::query_as::<_, InventoryBatch>(
            "SELECT * FROM inventory_batches ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_product: HashMap<String, Vec<InventoryBatch>> = HashMap::new();
        for batch in batches {
            by_product.entry(batch.product_id.clone()).or_default().push(batch);
        }
        for product in &mut products {
            product.batches = by_product.remove(&product.id).unwrap_or_default();
        }

        Ok(products)
    }

    /// Deletes a product and (by cascade) its batches.
    ///
    /// Sale lines keep their product and batch ids; restoring stock for
    /// them later becomes a logged no-op.
    pub async fn delete_product(&self, product_id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(product_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", product_id));
        }

        info!(product_id = %product_id, "Product deleted");
        Ok(())
    }

    /// Deletes every product of a company, matching the name without regard
    /// to ASCII case. Returns how many were removed.
    pub async fn delete_products_by_company(&self, company: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM products WHERE company = ?1 COLLATE NOCASE")
            .bind(company)
            .execute(&self.pool)
            .await?;

        info!(company = %company, deleted = result.rows_affected(), "Company products deleted");
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Inventory Ledger
// =============================================================================

/// Stock movements, run on the caller's connection or transaction.
pub struct InventoryLedger;

impl InventoryLedger {
    /// Subtracts `quantity` from a batch.
    ///
    /// No floor: overselling leaves negative stock. `zero_stock_since` is
    /// stamped when the result is ≤ 0 (an existing stamp is kept) and
    /// cleared otherwise.
    ///
    /// ## Errors
    /// `NotFound` if the batch does not exist.
    pub async fn decrement_batch(
        conn: &mut SqliteConnection,
        batch_id: &str,
        quantity: i64,
    ) -> DbResult<InventoryBatch> {
        let batch = sqlx::query_as::<_, InventoryBatch>(
            r#"
            UPDATE inventory_batches SET
                stock = stock - ?2,
                zero_stock_since = CASE
                    WHEN stock - ?2 <= 0 THEN COALESCE(zero_stock_since, ?3)
                    ELSE NULL
                END,
                updated_at = ?3
            WHERE id = ?1
            RETURNING *
            "#,
        )
        .bind(batch_id)
        .bind(quantity)
        .bind(Utc::now())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Batch", batch_id))?;

        debug!(batch_id = %batch_id, quantity, stock = batch.stock, "Batch decremented");
        Ok(batch)
    }

    /// Adds `quantity` back to a batch. Clears `zero_stock_since` once the
    /// stock is positive again.
    ///
    /// ## Errors
    /// `NotFound` if the batch does not exist.
    pub async fn restore_batch(
        conn: &mut SqliteConnection,
        batch_id: &str,
        quantity: i64,
    ) -> DbResult<InventoryBatch> {
        let batch = sqlx::query_as::<_, InventoryBatch>(
            r#"
            UPDATE inventory_batches SET
                stock = stock + ?2,
                zero_stock_since = CASE
                    WHEN stock + ?2 > 0 THEN NULL
                    ELSE zero_stock_since
                END,
                updated_at = ?3
            WHERE id = ?1
            RETURNING *
            "#,
        )
        .bind(batch_id)
        .bind(quantity)
        .bind(Utc::now())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Batch", batch_id))?;

        debug!(batch_id = %batch_id, quantity, stock = batch.stock, "Batch restored");
        Ok(batch)
    }

    /// Subtracts `quantity` from a product's legacy stock, clamped at zero.
    /// Returns the new stock.
    ///
    /// ## Errors
    /// `NotFound` if the product does not exist.
    pub async fn decrement_legacy(
        conn: &mut SqliteConnection,
        product_id: &str,
        quantity: i64,
    ) -> DbResult<i64> {
        let stock: i64 = sqlx::query_scalar(
            r#"
            UPDATE products SET
                stock = MAX(stock - ?2, 0),
                updated_at = ?3
            WHERE id = ?1
            RETURNING stock
            "#,
        )
        .bind(product_id)
        .bind(quantity)
        .bind(Utc::now())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Product", product_id))?;

        debug!(product_id = %product_id, quantity, stock, "Legacy stock decremented");
        Ok(stock)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    fn rice(stock: i64, price_cents: i64) -> NewProduct {
        NewProduct {
            name: "Basmati Rice 5kg".to_string(),
            sku: Some("RICE-5".to_string()),
            company: Some("India Gate".to_string()),
            gst_bps: 500,
            price_cents,
            cost_cents: price_cents * 8 / 10,
            stock,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_product_with_initial_batch() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db.inventory().create_product(rice(10, 45_000)).await.unwrap();

        assert_eq!(product.batches.len(), 1);
        assert_eq!(product.batches[0].batch_name, INITIAL_BATCH_NAME);
        assert_eq!(product.batches[0].stock, 10);
        assert!(product.batches[0].zero_stock_since.is_none());

        let loaded = db.inventory().get_product(&product.id).await.unwrap().unwrap();
        assert_eq!(loaded.batches.len(), 1);
        assert_eq!(loaded.total_stock(), 10);
    }

    #[tokio::test]
    async fn test_create_product_without_stock_or_price_has_no_batch() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db.inventory().create_product(rice(0, 0)).await.unwrap();
        assert!(product.batches.is_empty());
    }

    #[tokio::test]
    async fn test_add_batch_defaults_name() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db.inventory().create_product(rice(0, 0)).await.unwrap();

        let batch = db
            .inventory()
            .add_batch(&product.id, NewBatch { stock: 0, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(batch.batch_name, RESTOCK_BATCH_NAME);
        assert!(batch.zero_stock_since.is_some());

        let err = db
            .inventory()
            .add_batch("missing", NewBatch::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_decrement_can_oversell_and_restore_clears_marker() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db.inventory().create_product(rice(2, 45_000)).await.unwrap();
        let batch_id = product.batches[0].id.clone();
        let mut conn = db.pool().acquire().await.unwrap();

        let batch = InventoryLedger::decrement_batch(&mut conn, &batch_id, 3).await.unwrap();
        assert_eq!(batch.stock, -1);
        assert!(batch.zero_stock_since.is_some());

        let batch = InventoryLedger::restore_batch(&mut conn, &batch_id, 3).await.unwrap();
        assert_eq!(batch.stock, 2);
        assert!(batch.zero_stock_since.is_none());
    }

    #[tokio::test]
    async fn test_decrement_keeps_first_zero_stamp() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db.inventory().create_product(rice(1, 45_000)).await.unwrap();
        let batch_id = product.batches[0].id.clone();
        let mut conn = db.pool().acquire().await.unwrap();

        let first = InventoryLedger::decrement_batch(&mut conn, &batch_id, 1).await.unwrap();
        let second = InventoryLedger::decrement_batch(&mut conn, &batch_id, 1).await.unwrap();
        assert_eq!(first.zero_stock_since, second.zero_stock_since);
        assert_eq!(second.stock, -1);
    }

    #[tokio::test]
    async fn test_missing_batch_is_not_found() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        let err = InventoryLedger::decrement_batch(&mut conn, "missing", 1).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_legacy_decrement_clamps_at_zero() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db.inventory().create_product(rice(4, 45_000)).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        assert_eq!(InventoryLedger::decrement_legacy(&mut conn, &product.id, 3).await.unwrap(), 1);
        assert_eq!(InventoryLedger::decrement_legacy(&mut conn, &product.id, 3).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_batch_stock_recomputes_marker() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db.inventory().create_product(rice(5, 45_000)).await.unwrap();
        let batch_id = product.batches[0].id.clone();

        let zeroed = db
            .inventory()
            .update_batch(&batch_id, BatchPatch { stock: Some(0), ..Default::default() })
            .await
            .unwrap();
        assert!(zeroed.zero_stock_since.is_some());

        let renamed = db
            .inventory()
            .update_batch(
                &batch_id,
                BatchPatch {
                    batch_name: Some("Diwali lot".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.batch_name, "Diwali lot");
        assert_eq!(renamed.stock, 0);
        assert!(renamed.zero_stock_since.is_some());

        let restocked = db
            .inventory()
            .update_batch(&batch_id, BatchPatch { stock: Some(12), ..Default::default() })
            .await
            .unwrap();
        assert!(restocked.zero_stock_since.is_none());
    }

    #[tokio::test]
    async fn test_delete_product_cascades_batches() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db.inventory().create_product(rice(5, 45_000)).await.unwrap();
        let batch_id = product.batches[0].id.clone();

        db.inventory().delete_product(&product.id).await.unwrap();
        assert!(db.inventory().get_batch(&batch_id).await.unwrap().is_none());
        assert!(db.inventory().delete_product(&product.id).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_by_company() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.inventory().create_product(rice(1, 100)).await.unwrap();
        db.inventory().create_product(rice(1, 100)).await.unwrap();
        let mut other = rice(1, 100);
        other.company = Some("Daawat".to_string());
        db.inventory().create_product(other).await.unwrap();

        let deleted = db.inventory().delete_products_by_company("india gate").await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(db.inventory().list_products().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_product_keeps_unset_fields() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db.inventory().create_product(rice(5, 45_000)).await.unwrap();

        let updated = db
            .inventory()
            .update_product(
                &product.id,
                ProductPatch {
                    price_cents: Some(47_500),
                    company: Some("Daawat".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.price_cents, 47_500);
        assert_eq!(updated.company.as_deref(), Some("Daawat"));
        assert_eq!(updated.name, "Basmati Rice 5kg");
        assert_eq!(updated.stock, 5);
        assert_eq!(updated.batches.len(), 1);

        let err = db
            .inventory()
            .update_product(&product.id, ProductPatch { cost_cents: Some(-1), ..Default::default() })
            .await
            .unwrap_err();
        assert!(!err.is_not_found());

        let err = db
            .inventory()
            .update_product("missing", ProductPatch::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_batch_rejects_negative_prices() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db.inventory().create_product(rice(5, 45_000)).await.unwrap();
        let batch_id = product.batches[0].id.clone();

        for patch in [
            BatchPatch { cost_price_cents: Some(-1), ..Default::default() },
            BatchPatch { selling_price_cents: Some(-1), ..Default::default() },
            BatchPatch { wholesale_price_cents: Some(-1), ..Default::default() },
        ] {
            let err = db.inventory().update_batch(&batch_id, patch).await.unwrap_err();
            assert!(matches!(err, crate::error::LedgerError::Validation(_)));
        }

        let untouched = db.inventory().get_batch(&batch_id).await.unwrap().unwrap();
        assert_eq!(untouched.selling_price_cents, 45_000);
    }
}
