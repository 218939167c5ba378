//! # Payment Ledger
//!
//! Records and retracts customer payments, moving money on and off the
//! customer's invoices.
//!
//! ## Add
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate ─► customer exists? ─► lock(customer)                        │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │    INSERT payment (unapplied = amount)       ◄── first statement writes │
//! │    SELECT open invoices, oldest first                                   │
//! │    plan_allocation(invoices, amount)                                    │
//! │    UPDATE each invoice (conditional on the amount it was planned from)  │
//! │    INSERT payment_allocations for invoices that received money          │
//! │    UPDATE payment.unapplied = what was left                             │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Delete
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  load payment (NotFound) ─► lock(customer)                             │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │    DELETE allocations RETURNING *                                       │
//! │    DELETE payment RETURNING *                (gone meanwhile: NotFound) │
//! │    Exact + rows        ─► plan_exact_reversal(rows)                     │
//! │    NewestFirst/no rows ─► plan_newest_first_reversal(paid, applied)     │
//! │    UPDATE each invoice                                                  │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Any failure rolls the whole operation back; no invoice is ever left
//! half-allocated.

use chrono::{DateTime, Utc};
use khata_core::ledger::{
    plan_allocation, plan_exact_reversal, plan_newest_first_reversal, ReversalPolicy,
};
use khata_core::validation::{validate_payment_amount, validate_required, ValidationResult};
use khata_core::{
    new_id, AllocationPlan, Money, Payment, PaymentAllocation, PaymentMode, ReversalPlan,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use ts_rs::TS;

use crate::error::{LedgerError, LedgerResult};
use crate::locks::CustomerLocks;
use crate::repository::customer::CustomerRepository;
use crate::repository::payment::PaymentRepository;
use crate::repository::sale::SaleRepository;

// =============================================================================
// Inputs & Outputs
// =============================================================================

/// A payment to record.
#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export)]
#[serde(default)]
pub struct NewPayment {
    pub customer_id: String,
    pub amount_cents: i64,
    /// Defaults to now.
    #[ts(as = "Option<String>")]
    pub date: Option<DateTime<Utc>>,
    /// Defaults to cash.
    pub payment_mode: Option<PaymentMode>,
    pub reference: Option<String>,
}

impl NewPayment {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_required("customer_id", &self.customer_id)?;
        validate_payment_amount(Money::from_cents(self.amount_cents))?;
        Ok(())
    }
}

/// A recorded payment and where its money went.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct PaymentOutcome {
    pub payment: Payment,
    pub allocation: AllocationPlan,
    pub allocations: Vec<PaymentAllocation>,
}

/// A deleted payment and what was taken back off invoices.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct ReversalOutcome {
    pub payment: Payment,
    /// The policy actually used; `NewestFirst` when an exact reversal had
    /// no allocation rows to work from.
    pub policy: ReversalPolicy,
    pub plan: ReversalPlan,
}

// =============================================================================
// Service
// =============================================================================

/// Adds and deletes payments.
#[derive(Debug, Clone)]
pub struct PaymentLedger {
    pool: SqlitePool,
    locks: CustomerLocks,
    policy: ReversalPolicy,
}

impl PaymentLedger {
    pub fn new(pool: SqlitePool, locks: CustomerLocks, policy: ReversalPolicy) -> Self {
        PaymentLedger { pool, locks, policy }
    }

    /// Records a payment and applies it to the customer's open invoices,
    /// oldest first. Whatever exceeds the outstanding debt stays on the
    /// payment as unapplied credit.
    ///
    /// ## Errors
    /// - `Validation` if the amount is not positive or the customer id is blank
    /// - `NotFound` if the customer does not exist
    pub async fn add_payment(&self, new: NewPayment) -> LedgerResult<PaymentOutcome> {
        new.validate()?;

        let customer_id = new.customer_id.trim().to_string();
        {
            let mut conn = self.pool.acquire().await?;
            if !CustomerRepository::exists(&mut conn, &customer_id).await? {
                return Err(LedgerError::not_found("Customer", &customer_id));
            }
        }

        let _guard = self.locks.acquire(&customer_id).await;

        let now = Utc::now();
        let mut payment = Payment {
            id: new_id(),
            customer_id,
            amount_cents: new.amount_cents,
            unapplied_cents: new.amount_cents,
            date: new.date.unwrap_or(now),
            payment_mode: new.payment_mode.unwrap_or_default(),
            reference: new
                .reference
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty()),
            created_at: now,
        };

        debug!(
            payment_id = %payment.id,
            customer_id = %payment.customer_id,
            amount = payment.amount_cents,
            "Recording payment"
        );

        let mut tx = self.pool.begin().await?;

        PaymentRepository::insert(&mut tx, &payment).await?;

        let invoices = SaleRepository::open_invoices(&mut tx, &payment.customer_id).await?;
        let plan = plan_allocation(&invoices, payment.amount());

        for adjustment in &plan.adjustments {
            SaleRepository::apply_adjustment(&mut tx, adjustment, now).await?;
        }

        let mut allocations = Vec::new();
        for adjustment in plan.funded() {
            let allocation = PaymentRepository::insert_allocation(
                &mut tx,
                &payment.id,
                &adjustment.invoice_id,
                adjustment.delta(),
                now,
            )
            .await?;
            allocations.push(allocation);
        }

        if plan.unapplied() != payment.amount() {
            PaymentRepository::set_unapplied(&mut tx, &payment.id, plan.unapplied()).await?;
        }
        payment.unapplied_cents = plan.unapplied_cents;

        tx.commit().await?;

        info!(
            payment_id = %payment.id,
            customer_id = %payment.customer_id,
            amount = payment.amount_cents,
            applied = plan.applied_cents,
            unapplied = plan.unapplied_cents,
            invoices = allocations.len(),
            "Payment recorded"
        );

        Ok(PaymentOutcome {
            payment,
            allocation: plan,
            allocations,
        })
    }

    /// Deletes a payment and takes its money back off the invoices.
    ///
    /// ## Errors
    /// - `NotFound` if the payment does not exist
    pub async fn delete_payment(&self, payment_id: &str) -> LedgerResult<ReversalOutcome> {
        let customer_id = {
            let mut conn = self.pool.acquire().await?;
            sqlx::query_scalar::<_, String>("SELECT customer_id FROM payments WHERE id = ?1")
                .bind(payment_id)
                .fetch_optional(&mut *conn)
                .await?
                .ok_or_else(|| LedgerError::not_found("Payment", payment_id))?
        };

        let _guard = self.locks.acquire(&customer_id).await;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let allocations = PaymentRepository::take_allocations(&mut tx, payment_id).await?;
        let payment = PaymentRepository::delete(&mut tx, payment_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Payment", payment_id))?;

        let (policy, plan) = match self.policy {
            ReversalPolicy::Exact if !allocations.is_empty() => {
                let mut recorded = Vec::with_capacity(allocations.len());
                for allocation in &allocations {
                    match SaleRepository::balance(&mut tx, &allocation.invoice_id).await? {
                        Some(invoice) => recorded.push((invoice, allocation.amount())),
                        None => warn!(
                            invoice_id = %allocation.invoice_id,
                            payment_id = %payment_id,
                            "Allocated invoice no longer exists, skipping"
                        ),
                    }
                }
                (ReversalPolicy::Exact, plan_exact_reversal(&recorded))
            }
            policy => {
                if policy == ReversalPolicy::Exact {
                    debug!(payment_id = %payment_id, "No allocation rows, reversing newest first");
                }
                let invoices = SaleRepository::paid_invoices(&mut tx, &payment.customer_id).await?;
                (
                    ReversalPolicy::NewestFirst,
                    plan_newest_first_reversal(&invoices, payment.applied()),
                )
            }
        };

        for adjustment in &plan.adjustments {
            SaleRepository::apply_adjustment(&mut tx, adjustment, now).await?;
        }

        tx.commit().await?;

        info!(
            payment_id = %payment.id,
            customer_id = %payment.customer_id,
            policy = %policy,
            reverted = plan.reverted_cents,
            unreverted = plan.unreverted_cents,
            discarded_credit = payment.unapplied_cents,
            "Payment deleted"
        );

        Ok(ReversalOutcome {
            payment,
            policy,
            plan,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
