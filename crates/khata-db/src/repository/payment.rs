//! # Payment Repository
//!
//! Payments and the allocation rows that record which invoices each one
//! funded.
//!
//! For every payment:
//! ```text
//! amount_cents = Σ payment_allocations.amount_cents + unapplied_cents
//! ```

use chrono::{DateTime, Utc};
use khata_core::{new_id, Money, Payment, PaymentAllocation};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

/// Repository for payment database operations.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    /// Gets a payment by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(payment)
    }

    /// Lists a customer's payments, newest first.
    pub async fn list_by_customer(&self, customer_id: &str) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT * FROM payments
            WHERE customer_id = ?1
            ORDER BY date DESC, created_at DESC, id DESC
            "#,
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Allocation rows of a payment, in the order they were made.
    pub async fn allocations(&self, payment_id: &str) -> DbResult<Vec<PaymentAllocation>> {
        let allocations = sqlx::query_as::<_, PaymentAllocation>(
            "SELECT * FROM payment_allocations WHERE payment_id = ?1 ORDER BY rowid",
        )
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(allocations)
    }

    // =========================================================================
    // Connection-level
    // =========================================================================

    /// Inserts a payment row.
    pub async fn insert(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, customer_id, amount_cents, unapplied_cents,
                date, payment_mode, reference, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.customer_id)
        .bind(payment.amount_cents)
        .bind(payment.unapplied_cents)
        .bind(payment.date)
        .bind(payment.payment_mode)
        .bind(&payment.reference)
        .bind(payment.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Sets the unapplied remainder of a payment.
    pub async fn set_unapplied(conn: &mut SqliteConnection, payment_id: &str, unapplied: Money) -> DbResult<()> {
        sqlx::query("UPDATE payments SET unapplied_cents = ?2 WHERE id = ?1")
            .bind(payment_id)
            .bind(unapplied.cents())
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    /// Records that `amount` of a payment went to an invoice.
    pub async fn insert_allocation(
        conn: &mut SqliteConnection,
        payment_id: &str,
        invoice_id: &str,
        amount: Money,
        now: DateTime<Utc>,
    ) -> DbResult<PaymentAllocation> {
        let allocation = PaymentAllocation {
            id: new_id(),
            payment_id: payment_id.to_string(),
            invoice_id: invoice_id.to_string(),
            amount_cents: amount.cents(),
            created_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO payment_allocations (id, payment_id, invoice_id, amount_cents, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&allocation.id)
        .bind(&allocation.payment_id)
        .bind(&allocation.invoice_id)
        .bind(allocation.amount_cents)
        .bind(allocation.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(allocation)
    }

    /// Deletes a payment's allocation rows, returning them.
    pub async fn take_allocations(
        conn: &mut SqliteConnection,
        payment_id: &str,
    ) -> DbResult<Vec<PaymentAllocation>> {
        let allocations = sqlx::query_as::<_, PaymentAllocation>(
            "DELETE FROM payment_allocations WHERE payment_id = ?1 RETURNING *",
        )
        .bind(payment_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(allocations)
    }

    /// Deletes every allocation made to an invoice and returns each amount
    /// to its payment's unapplied credit.
    pub async fn release_invoice(
        conn: &mut SqliteConnection,
        invoice_id: &str,
    ) -> DbResult<Vec<PaymentAllocation>> {
        let released = sqlx::query_as::<_, PaymentAllocation>(
            "DELETE FROM payment_allocations WHERE invoice_id = ?1 RETURNING *",
        )
        .bind(invoice_id)
        .fetch_all(&mut *conn)
        .await?;

        for allocation in &released {
            Self::credit(conn, &allocation.payment_id, allocation.amount()).await?;
            debug!(
                payment_id = %allocation.payment_id,
                invoice_id = %invoice_id,
                amount = allocation.amount_cents,
                "Allocation returned to payment credit"
            );
        }

        Ok(released)
    }

    /// Shrinks an invoice's allocation rows, newest first, until they add
    /// up to at most `keep`. Whatever is taken off goes back to the
    /// payments' unapplied credit. Returns the amount released.
    pub async fn trim_invoice(
        conn: &mut SqliteConnection,
        invoice_id: &str,
        keep: Money,
    ) -> DbResult<Money> {
        let rows = sqlx::query_as::<_, PaymentAllocation>(
            "SELECT * FROM payment_allocations WHERE invoice_id = ?1 ORDER BY rowid DESC",
        )
        .bind(invoice_id)
        .fetch_all(&mut *conn)
        .await?;

        let allocated: Money = rows.iter().map(PaymentAllocation::amount).sum();
        let released = (allocated - keep).non_negative();
        let mut excess = released;

        for row in &rows {
            if !excess.is_positive() {
                break;
            }
            let take = row.amount().min(excess);

            if take == row.amount() {
                sqlx::query("DELETE FROM payment_allocations WHERE id = ?1")
                    .bind(&row.id)
                    .execute(&mut *conn)
                    .await?;
            } else {
                sqlx::query(
                    "UPDATE payment_allocations SET amount_cents = amount_cents - ?2 WHERE id = ?1",
                )
                .bind(&row.id)
                .bind(take.cents())
                .execute(&mut *conn)
                .await?;
            }
            Self::credit(conn, &row.payment_id, take).await?;
            excess -= take;

            debug!(
                payment_id = %row.payment_id,
                invoice_id = %invoice_id,
                amount = take.cents(),
                "Allocation trimmed into payment credit"
            );
        }

        Ok(released)
    }

    async fn credit(conn: &mut SqliteConnection, payment_id: &str, amount: Money) -> DbResult<()> {
        sqlx::query("UPDATE payments SET unapplied_cents = unapplied_cents + ?2 WHERE id = ?1")
            .bind(payment_id)
            .bind(amount.cents())
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    /// Deletes a payment, returning it.
    pub async fn delete(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>("DELETE FROM payments WHERE id = ?1 RETURNING *")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(payment)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
