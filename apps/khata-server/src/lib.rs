//! # Khata Server
//!
//! REST API over the receivables ledger.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Khata Server                                     │
//! │                                                                         │
//! │  HTTP ───► Router ───► routes::* ───► khata-db ───► SQLite             │
//! │                │                          │                             │
//! │                ▼                          ▼                             │
//! │            AppState                   LedgerError                       │
//! │          (Database handle)               │                              │
//! │                                          ▼                              │
//! │                                   ApiError (status + JSON)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Handlers hold no ledger logic. Allocation, reversal, stock movement and
//! per-customer locking all happen inside `khata-db`.

pub mod config;
pub mod error;
pub mod routes;

use axum::Router;
use khata_db::Database;

pub use config::{ConfigError, ServerConfig};
pub use error::{ApiError, ApiResult, ErrorCode};

/// Shared application state.
///
/// `Database` is a cheap clone around the pool and the customer lock table.
#[derive(Debug, Clone)]
pub struct AppState {
    pub db: Database,
}

impl AppState {
    pub fn new(db: Database) -> Self {
        AppState { db }
    }
}

/// Builds the full router.
pub fn app(state: AppState) -> Router {
    routes::router().with_state(state)
}

#[cfg(test)]
pub(crate) mod testutil {
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use axum::Router;
    use khata_db::{Database, DbConfig};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::{app, AppState};

    pub async fn test_app() -> (Router, Database) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        (app(AppState::new(db.clone())), db)
    }

    /// Sends one request and returns the status and the decoded JSON body.
    pub async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}
