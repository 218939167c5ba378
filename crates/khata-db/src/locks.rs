//! # Per-Customer Serialization
//!
//! Two payments for the same customer must not both read the same "oldest
//! unpaid invoice" and both apply to it. Every operation that moves a
//! customer's `amount_paid` takes that customer's lock first.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  add_payment(C1) ──► lock(C1) ──► BEGIN … COMMIT ──► unlock            │
//! │  add_payment(C1) ──► lock(C1) ─ waits ─────────────► BEGIN … COMMIT    │
//! │  add_payment(C2) ──► lock(C2) ──► BEGIN … COMMIT   (runs alongside)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Locks are process-local. Several processes sharing one database file
//! still rely on SQLite's single-writer lock plus the conditional invoice
//! updates in the sale repository.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

/// Lock entries kept before idle ones are swept.
const PRUNE_THRESHOLD: usize = 256;

/// A table of async mutexes keyed by customer id.
#[derive(Debug, Clone, Default)]
pub struct CustomerLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

/// Held for the duration of one ledger operation.
#[derive(Debug)]
pub struct CustomerGuard {
    customer_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl CustomerGuard {
    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }
}

impl CustomerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `customer_id`.
    pub async fn acquire(&self, customer_id: &str) -> CustomerGuard {
        let lock = {
            let mut table = self.inner.lock().unwrap_or_else(|e| e.into_inner());

            if table.len() >= PRUNE_THRESHOLD {
                // Only the table holds these, so nobody is waiting on them
                table.retain(|_, lock| Arc::strong_count(lock) > 1);
            }

            table
                .entry(customer_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        trace!(customer_id = %customer_id, "Waiting for customer lock");
        let guard = lock.lock_owned().await;

        CustomerGuard {
            customer_id: customer_id.to_string(),
            _guard: guard,
        }
    }

    /// Number of customers currently in the table.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
