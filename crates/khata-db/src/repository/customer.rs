//! # Customer Repository
//!
//! Customers are referenced by invoices and payments but never mutated by
//! the ledger itself.

use chrono::Utc;
use khata_core::validation::{validate_email, validate_name, validate_phone};
use khata_core::{new_id, Customer, CustomerBalance, Money, PaymentStatus};
use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use ts_rs::TS;

use crate::error::{DbError, DbResult, LedgerResult};

/// Input for creating a customer.
#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub city: Option<String>,
}

impl NewCustomer {
    /// Name, email and phone are all required.
    pub fn validate(&self) -> LedgerResult<()> {
        validate_name("name", &self.name)?;
        validate_email(&self.email)?;
        validate_phone(&self.phone)?;
        Ok(())
    }
}

/// Repository for customer database operations.
#[derive(Debug, Clone)]
pub struct CustomerRepository {
    pool: SqlitePool,
}

impl CustomerRepository {
    /// Creates a new CustomerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CustomerRepository { pool }
    }

    /// Validates and inserts a customer.
    pub async fn create(&self, new: NewCustomer) -> LedgerResult<Customer> {
        new.validate()?;

        let customer = Customer {
            id: new_id(),
            name: new.name.trim().to_string(),
            email: new.email.trim().to_string(),
            phone: new.phone.trim().to_string(),
            city: new
                .city
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO customers (id, name, email, phone, city, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(&customer.city)
        .bind(customer.created_at)
        .execute(&self.pool)
        .await?;

        info!(customer_id = %customer.id, name = %customer.name, "Customer created");
        Ok(customer)
    }

    /// Gets a customer by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(customer)
    }

    /// Lists all customers by name.
    pub async fn list(&self) -> DbResult<Vec<Customer>> {
        let customers =
            sqlx::query_as::<_, Customer>("SELECT * FROM customers ORDER BY name COLLATE NOCASE, id")
                .fetch_all(&self.pool)
                .await?;

        Ok(customers)
    }

    /// Deletes a customer.
    ///
    /// ## Errors
    /// - `NotFound` if the customer does not exist
    /// - `ForeignKeyViolation` while invoices or payments still reference it
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        debug!(customer_id = %id, "Deleting customer");

        let result = sqlx::query("DELETE FROM customers WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Customer", id));
        }

        Ok(())
    }

    /// Checks that a customer exists, on the caller's connection.
    pub async fn exists(conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM customers WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(found.is_some())
    }

    /// Outstanding debt and unapplied credit of a customer.
    pub async fn balance(&self, id: &str) -> DbResult<CustomerBalance> {
        let mut conn = self.pool.acquire().await?;

        if !Self::exists(&mut conn, id).await? {
            return Err(DbError::not_found("Customer", id));
        }

        let (outstanding, open): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(MAX(total_cents - amount_paid_cents, 0)), 0),
                COALESCE(SUM(CASE WHEN payment_status != ?2 THEN 1 ELSE 0 END), 0)
            FROM sales
            WHERE customer_id = ?1
            "#,
        )
        .bind(id)
        .bind(PaymentStatus::Paid)
        .fetch_one(&mut *conn)
        .await?;

        let credit: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(unapplied_cents), 0) FROM payments WHERE customer_id = ?1",
        )
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(CustomerBalance::new(
            id,
            Money::from_cents(outstanding),
            Money::from_cents(credit),
            open,
        ))
    }
}
