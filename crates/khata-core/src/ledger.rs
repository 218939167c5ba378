//! # Allocation Engine
//!
//! Decides how a payment is spread across a customer's invoices, and how
//! that spread is taken back when the payment is deleted.
//!
//! ## Forward Allocation (oldest first)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  payment 120.00                                                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Inv1  Jan 1   total 100   paid 0   ──► apply 100 ──► paid    (100/100) │
//! │       │ remaining 20                                                    │
//! │       ▼                                                                 │
//! │  Inv2  Jan 5   total  50   paid 0   ──► apply  20 ──► partial  (20/50)  │
//! │       │ remaining 0                                                     │
//! │       ▼                                                                 │
//! │  stop. Anything left over becomes unapplied credit.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Reversal
//! - **Exact**: undo the recorded `(invoice, amount)` pairs of the payment.
//! - **Newest first**: walk invoices with `amount_paid > 0` from the newest
//!   date backwards, deducting until the payment amount is used up. Used
//!   for payments that carry no allocation records.
//!
//! Every function here is pure. khata-db loads the invoice balances, calls a
//! planner, and writes the resulting [`InvoiceAdjustment`]s in one
//! transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::PaymentStatus;

// =============================================================================
// Inputs
// =============================================================================

/// The fields of an invoice that allocation reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InvoiceBalance {
    pub invoice_id: String,
    #[ts(as = "String")]
    pub date: DateTime<Utc>,
    pub total_cents: i64,
    pub amount_paid_cents: i64,
    pub payment_status: PaymentStatus,
}

impl InvoiceBalance {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn amount_paid(&self) -> Money {
        Money::from_cents(self.amount_paid_cents)
    }

    /// `total − amount_paid`, never negative.
    #[inline]
    pub fn due(&self) -> Money {
        (self.total() - self.amount_paid()).non_negative()
    }

    /// Oldest first; ties broken by id so the order is total.
    fn chronological(a: &&InvoiceBalance, b: &&InvoiceBalance) -> Ordering {
        a.date
            .cmp(&b.date)
            .then_with(|| a.invoice_id.cmp(&b.invoice_id))
    }
}

/// Which reversal algorithm a payment deletion uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReversalPolicy {
    /// Undo exactly the recorded allocations of the payment.
    Exact,
    /// Deduct the payment amount from the newest paid invoices.
    NewestFirst,
}

impl Default for ReversalPolicy {
    fn default() -> Self {
        ReversalPolicy::Exact
    }
}

impl fmt::Display for ReversalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReversalPolicy::Exact => f.write_str("exact"),
            ReversalPolicy::NewestFirst => f.write_str("newest_first"),
        }
    }
}

impl FromStr for ReversalPolicy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(ReversalPolicy::Exact),
            "newest_first" | "newest-first" => Ok(ReversalPolicy::NewestFirst),
            _ => Err(ValidationError::NotAllowed {
                field: "reversal_policy".to_string(),
                allowed: vec!["exact".to_string(), "newest_first".to_string()],
            }),
        }
    }
}

// =============================================================================
// Outputs
// =============================================================================

/// A single write the ledger must make to an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceAdjustment {
    pub invoice_id: String,
    pub previous_paid_cents: i64,
    pub new_paid_cents: i64,
    pub payment_status: PaymentStatus,
}

impl InvoiceAdjustment {
    fn new(invoice: &InvoiceBalance, new_paid: Money) -> Self {
        InvoiceAdjustment {
            invoice_id: invoice.invoice_id.clone(),
            previous_paid_cents: invoice.amount_paid_cents,
            new_paid_cents: new_paid.cents(),
            payment_status: PaymentStatus::derive(new_paid, invoice.total()),
        }
    }

    /// Signed change in `amount_paid`.
    #[inline]
    pub fn delta(&self) -> Money {
        Money::from_cents(self.new_paid_cents - self.previous_paid_cents)
    }
}

/// Result of planning a forward allocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AllocationPlan {
    /// Invoice writes in the order they were decided (oldest first).
    pub adjustments: Vec<InvoiceAdjustment>,
    pub applied_cents: i64,
    /// Amount left after every open invoice was settled.
    pub unapplied_cents: i64,
}

impl AllocationPlan {
    #[inline]
    pub fn applied(&self) -> Money {
        Money::from_cents(self.applied_cents)
    }

    #[inline]
    pub fn unapplied(&self) -> Money {
        Money::from_cents(self.unapplied_cents)
    }

    /// Adjustments that moved money, i.e. the ones worth recording as
    /// payment allocations.
    pub fn funded(&self) -> impl Iterator<Item = &InvoiceAdjustment> {
        self.adjustments.iter().filter(|a| a.delta().is_positive())
    }
}

/// Result of planning a reversal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReversalPlan {
    pub adjustments: Vec<InvoiceAdjustment>,
    /// Total deducted from invoices.
    pub reverted_cents: i64,
    /// Part of the request that found nothing to deduct from.
    pub unreverted_cents: i64,
}

impl ReversalPlan {
    #[inline]
    pub fn reverted(&self) -> Money {
        Money::from_cents(self.reverted_cents)
    }
}

// =============================================================================
// Planners
// =============================================================================

/// Plans a forward allocation of `amount` across `invoices`.
///
/// ## Rules
/// - Only invoices whose status is not `Paid` take part.
/// - They are visited oldest first (`date`, then id).
/// - Each receives `min(due, remaining)`; the walk stops once nothing
///   remains.
/// - An open invoice with nothing due is re-stamped with its derived status
///   without receiving money.
/// - Whatever is left after the last invoice is reported as unapplied.
///
/// ## Example
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use khata_core::ledger::{plan_allocation, InvoiceBalance};
/// use khata_core::{Money, PaymentStatus};
///
/// let invoice = InvoiceBalance {
///     invoice_id: "inv-1".into(),
///     date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
///     total_cents: 10_000,
///     amount_paid_cents: 0,
///     payment_status: PaymentStatus::Unpaid,
/// };
/// let plan = plan_allocation(&[invoice], Money::from_cents(4_000));
/// assert_eq!(plan.adjustments[0].new_paid_cents, 4_000);
/// assert_eq!(plan.adjustments[0].payment_status, PaymentStatus::Partial);
/// ```
pub fn plan_allocation(invoices: &[InvoiceBalance], amount: Money) -> AllocationPlan {
    let mut open: Vec<&InvoiceBalance> = invoices
        .iter()
        .filter(|inv| inv.payment_status != PaymentStatus::Paid)
        .collect();
    open.sort_by(InvoiceBalance::chronological);

    let amount = amount.non_negative();
    let mut remaining = amount;
    let mut adjustments = Vec::new();

    for invoice in open {
        if !remaining.is_positive() {
            break;
        }

        let to_apply = invoice.due().min(remaining);
        let adjustment = InvoiceAdjustment::new(invoice, invoice.amount_paid() + to_apply);

        if to_apply.is_zero() && adjustment.payment_status == invoice.payment_status {
            continue;
        }

        remaining -= to_apply;
        adjustments.push(adjustment);
    }

    AllocationPlan {
        adjustments,
        applied_cents: (amount - remaining).cents(),
        unapplied_cents: remaining.cents(),
    }
}

/// Plans a best-effort reversal of `amount`, newest invoice first.
///
/// Visits invoices with `amount_paid > 0` from the newest date backwards and
/// deducts `min(amount_paid, remaining)` from each until `amount` is used
/// up. The result equals the forward allocation only when amounts happen to
/// line up; see [`plan_exact_reversal`] for the precise inverse.
pub fn plan_newest_first_reversal(invoices: &[InvoiceBalance], amount: Money) -> ReversalPlan {
    let mut touched: Vec<&InvoiceBalance> = invoices
        .iter()
        .filter(|inv| inv.amount_paid().is_positive())
        .collect();
    touched.sort_by(|a, b| InvoiceBalance::chronological(b, a));

    let amount = amount.non_negative();
    let mut remaining = amount;
    let mut adjustments = Vec::new();

    for invoice in touched {
        if !remaining.is_positive() {
            break;
        }

        let to_deduct = invoice.amount_paid().min(remaining);
        adjustments.push(InvoiceAdjustment::new(
            invoice,
            invoice.amount_paid() - to_deduct,
        ));
        remaining -= to_deduct;
    }

    ReversalPlan {
        adjustments,
        reverted_cents: (amount - remaining).cents(),
        unreverted_cents: remaining.cents(),
    }
}

/// Plans the exact inverse of recorded allocations.
///
/// Each `(invoice, amount)` pair deducts `amount` from that invoice, capped
/// at the invoice's current `amount_paid` so a forced edit in between can
/// never drive it negative. The capped-off part is reported as unreverted.
pub fn plan_exact_reversal(allocations: &[(InvoiceBalance, Money)]) -> ReversalPlan {
    let mut adjustments = Vec::with_capacity(allocations.len());
    let mut reverted = Money::zero();
    let mut unreverted = Money::zero();

    for (invoice, recorded) in allocations {
        let recorded = recorded.non_negative();
        let to_deduct = recorded.min(invoice.amount_paid().non_negative());

        reverted += to_deduct;
        unreverted += recorded - to_deduct;

        if to_deduct.is_positive() {
            adjustments.push(InvoiceAdjustment::new(
                invoice,
                invoice.amount_paid() - to_deduct,
            ));
        }
    }

    ReversalPlan {
        adjustments,
        reverted_cents: reverted.cents(),
        unreverted_cents: unreverted.cents(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn invoice(id: &str, day: u32, total: i64, paid: i64) -> InvoiceBalance {
        InvoiceBalance {
            invoice_id: id.to_string(),
            date: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            total_cents: total,
            amount_paid_cents: paid,
            payment_status: PaymentStatus::derive(Money::from_cents(paid), Money::from_cents(total)),
        }
    }

    fn apply(invoices: &mut [InvoiceBalance], adjustments: &[InvoiceAdjustment]) {
        for adj in adjustments {
            let inv = invoices
                .iter_mut()
                .find(|i| i.invoice_id == adj.invoice_id)
                .unwrap();
            inv.amount_paid_cents = adj.new_paid_cents;
            inv.payment_status = adj.payment_status;
        }
    }

    fn total_paid(invoices: &[InvoiceBalance]) -> i64 {
        invoices.iter().map(|i| i.amount_paid_cents).sum()
    }

    #[test]
    fn test_fifo_allocation_example() {
        let invoices = vec![invoice("inv-2", 5, 5_000, 0), invoice("inv-1", 1, 10_000, 0)];

        let plan = plan_allocation(&invoices, Money::from_cents(12_000));

        assert_eq!(plan.adjustments.len(), 2);
        assert_eq!(plan.adjustments[0].invoice_id, "inv-1");
        assert_eq!(plan.adjustments[0].new_paid_cents, 10_000);
        assert_eq!(plan.adjustments[0].payment_status, PaymentStatus::Paid);
        assert_eq!(plan.adjustments[1].invoice_id, "inv-2");
        assert_eq!(plan.adjustments[1].new_paid_cents, 2_000);
        assert_eq!(plan.adjustments[1].payment_status, PaymentStatus::Partial);
        assert_eq!(plan.applied_cents, 12_000);
        assert_eq!(plan.unapplied_cents, 0);
    }

    #[test]
    fn test_newest_first_reversal_example() {
        let invoices = vec![invoice("inv-1", 1, 10_000, 10_000), invoice("inv-2", 5, 5_000, 2_000)];

        let plan = plan_newest_first_reversal(&invoices, Money::from_cents(12_000));

        assert_eq!(plan.adjustments[0].invoice_id, "inv-2");
        assert_eq!(plan.adjustments[0].new_paid_cents, 0);
        assert_eq!(plan.adjustments[0].payment_status, PaymentStatus::Unpaid);
        assert_eq!(plan.adjustments[1].invoice_id, "inv-1");
        assert_eq!(plan.adjustments[1].new_paid_cents, 0);
        assert_eq!(plan.reverted_cents, 12_000);
    }

    #[test]
    fn test_paid_invoices_are_skipped() {
        let invoices = vec![invoice("inv-1", 1, 10_000, 10_000), invoice("inv-2", 2, 3_000, 0)];
        let plan = plan_allocation(&invoices, Money::from_cents(1_000));
        assert_eq!(plan.adjustments.len(), 1);
        assert_eq!(plan.adjustments[0].invoice_id, "inv-2");
    }

    #[test]
    fn test_no_open_invoices_leaves_everything_unapplied() {
        let plan = plan_allocation(&[], Money::from_cents(2_500));
        assert!(plan.adjustments.is_empty());
        assert_eq!(plan.applied_cents, 0);
        assert_eq!(plan.unapplied_cents, 2_500);
    }

    #[test]
    fn test_overpayment_becomes_unapplied() {
        let invoices = vec![invoice("inv-1", 1, 4_000, 1_000)];
        let plan = plan_allocation(&invoices, Money::from_cents(5_000));
        assert_eq!(plan.adjustments[0].new_paid_cents, 4_000);
        assert_eq!(plan.applied_cents, 3_000);
        assert_eq!(plan.unapplied_cents, 2_000);
    }

    #[test]
    fn test_stale_status_is_normalized_without_money() {
        // Forced edit left an unpaid tag on a settled invoice
        let mut stale = invoice("inv-1", 1, 4_000, 4_000);
        stale.payment_status = PaymentStatus::Unpaid;
        let invoices = vec![stale, invoice("inv-2", 2, 1_000, 0)];

        let plan = plan_allocation(&invoices, Money::from_cents(500));

        assert_eq!(plan.adjustments[0].invoice_id, "inv-1");
        assert!(plan.adjustments[0].delta().is_zero());
        assert_eq!(plan.adjustments[0].payment_status, PaymentStatus::Paid);
        assert_eq!(plan.funded().count(), 1);
        assert_eq!(plan.applied_cents, 500);
    }

    #[test]
    fn test_same_day_invoices_order_by_id() {
        let invoices = vec![invoice("b", 3, 1_000, 0), invoice("a", 3, 1_000, 0)];
        let plan = plan_allocation(&invoices, Money::from_cents(1_000));
        assert_eq!(plan.adjustments.len(), 1);
        assert_eq!(plan.adjustments[0].invoice_id, "a");
    }

    #[test]
    fn test_exact_reversal_caps_at_current_paid() {
        let allocations = vec![
            (invoice("inv-1", 1, 10_000, 10_000), Money::from_cents(10_000)),
            // Force-edited down to 500 after the payment touched it
            (invoice("inv-2", 5, 5_000, 500), Money::from_cents(2_000)),
        ];

        let plan = plan_exact_reversal(&allocations);

        assert_eq!(plan.adjustments.len(), 2);
        assert_eq!(plan.adjustments[1].new_paid_cents, 0);
        assert_eq!(plan.reverted_cents, 10_500);
        assert_eq!(plan.unreverted_cents, 1_500);
    }

    #[test]
    fn test_exact_reversal_differs_from_heuristic() {
        // Payment A paid inv-1 in full; payment B later paid part of inv-2.
        let after = vec![invoice("inv-1", 1, 3_000, 3_000), invoice("inv-2", 9, 3_000, 1_000)];

        let heuristic = plan_newest_first_reversal(&after, Money::from_cents(3_000));
        assert_eq!(heuristic.adjustments[0].invoice_id, "inv-2");

        let exact = plan_exact_reversal(&[(after[0].clone(), Money::from_cents(3_000))]);
        assert_eq!(exact.adjustments.len(), 1);
        assert_eq!(exact.adjustments[0].invoice_id, "inv-1");
        assert_eq!(exact.adjustments[0].payment_status, PaymentStatus::Unpaid);
    }

    #[test]
    fn test_reversal_policy_parsing() {
        assert_eq!("exact".parse::<ReversalPolicy>().unwrap(), ReversalPolicy::Exact);
        assert_eq!(
            "NEWEST_FIRST".parse::<ReversalPolicy>().unwrap(),
            ReversalPolicy::NewestFirst
        );
        assert!("lifo".parse::<ReversalPolicy>().is_err());
    }

    fn arb_invoices() -> impl Strategy<Value = Vec<InvoiceBalance>> {
        prop::collection::vec((1i64..50_000, 0u8..=100, 0i64..60), 0..8).prop_map(|rows| {
            let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            rows.into_iter()
                .enumerate()
                .map(|(i, (total, pct, day))| {
                    let paid = total * pct as i64 / 100;
                    InvoiceBalance {
                        invoice_id: format!("inv-{:02}", i),
                        date: base + Duration::days(day),
                        total_cents: total,
                        amount_paid_cents: paid,
                        payment_status: PaymentStatus::derive(
                            Money::from_cents(paid),
                            Money::from_cents(total),
                        ),
                    }
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_allocation_conserves_money(invoices in arb_invoices(), amount in 1i64..200_000) {
            let plan = plan_allocation(&invoices, Money::from_cents(amount));
            let deltas: i64 = plan.adjustments.iter().map(|a| a.delta().cents()).sum();

            prop_assert_eq!(deltas, plan.applied_cents);
            prop_assert_eq!(plan.applied_cents + plan.unapplied_cents, amount);

            let open_due: i64 = invoices
                .iter()
                .filter(|i| i.payment_status != PaymentStatus::Paid)
                .map(|i| i.due().cents())
                .sum();
            prop_assert_eq!(plan.applied_cents, amount.min(open_due));
        }

        #[test]
        fn prop_allocation_is_oldest_first(invoices in arb_invoices(), amount in 1i64..200_000) {
            let plan = plan_allocation(&invoices, Money::from_cents(amount));
            let mut after = invoices.clone();
            apply(&mut after, &plan.adjustments);

            // Every funded invoice except the last must end fully settled
            let funded: Vec<_> = plan.funded().collect();
            for adj in funded.iter().take(funded.len().saturating_sub(1)) {
                let inv = after.iter().find(|i| i.invoice_id == adj.invoice_id).unwrap();
                prop_assert!(inv.due().is_zero());
            }
        }

        #[test]
        fn prop_status_always_derived(invoices in arb_invoices(), amount in 1i64..200_000) {
            let plan = plan_allocation(&invoices, Money::from_cents(amount));
            for adj in &plan.adjustments {
                let inv = invoices.iter().find(|i| i.invoice_id == adj.invoice_id).unwrap();
                prop_assert_eq!(
                    adj.payment_status,
                    PaymentStatus::derive(Money::from_cents(adj.new_paid_cents), inv.total())
                );
            }
        }

        #[test]
        fn prop_never_overpays_an_invoice(invoices in arb_invoices(), amount in 1i64..500_000) {
            let plan = plan_allocation(&invoices, Money::from_cents(amount));
            let mut after = invoices.clone();
            apply(&mut after, &plan.adjustments);
            for (before, now) in invoices.iter().zip(after.iter()) {
                prop_assert!(now.amount_paid_cents <= before.total_cents.max(before.amount_paid_cents));
            }
        }

        #[test]
        fn prop_reversal_is_bounded(invoices in arb_invoices(), amount in 1i64..200_000) {
            let before = total_paid(&invoices);
            let plan = plan_newest_first_reversal(&invoices, Money::from_cents(amount));
            let mut after = invoices.clone();
            apply(&mut after, &plan.adjustments);

            prop_assert_eq!(before - total_paid(&after), amount.min(before));
            prop_assert!(after.iter().all(|i| i.amount_paid_cents >= 0));
        }

        #[test]
        fn prop_exact_reversal_restores_allocation(invoices in arb_invoices(), amount in 1i64..200_000) {
            let plan = plan_allocation(&invoices, Money::from_cents(amount));
            let mut after = invoices.clone();
            apply(&mut after, &plan.adjustments);

            let recorded: Vec<(InvoiceBalance, Money)> = plan
                .funded()
                .map(|adj| {
                    let inv = after.iter().find(|i| i.invoice_id == adj.invoice_id).unwrap();
                    (inv.clone(), adj.delta())
                })
                .collect();
            let reversal = plan_exact_reversal(&recorded);
            apply(&mut after, &reversal.adjustments);

            prop_assert_eq!(reversal.reverted_cents, plan.applied_cents);
            for (before, now) in invoices.iter().zip(after.iter()) {
                prop_assert_eq!(before.amount_paid_cents, now.amount_paid_cents);
            }
        }
    }
}
