//! # Routes
//!
//! ```text
//! GET    /health
//!
//! GET    /api/customers                  POST /api/customers
//! GET    /api/customers/{id}             DELETE /api/customers/{id}
//! GET    /api/customers/{id}/balance
//! GET    /api/customers/{id}/sales
//! GET    /api/customers/{id}/payments
//!
//! POST   /api/payments                   (allocates oldest invoice first)
//! GET    /api/payments/{id}              DELETE /api/payments/{id}
//!
//! POST   /api/sales
//! GET    /api/sales/{id}    PUT /api/sales/{id}    DELETE /api/sales/{id}
//!
//! GET    /api/inventory                  POST /api/inventory
//! DELETE /api/inventory/{id}
//! DELETE /api/inventory/company/{company}
//! POST   /api/inventory/{id}/batches
//! PUT    /api/inventory/batches/{id}
//! ```

pub mod customers;
pub mod inventory;
pub mod payments;
pub mod sales;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::AppState;

/// All routes, before state is attached.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .nest("/api/customers", customers::router())
        .nest("/api/payments", payments::router())
        .nest("/api/sales", sales::router())
        .nest("/api/inventory", inventory::router())
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    if state.db.health_check().await {
        (StatusCode::OK, Json(json!({ "status": "ok" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable" })),
        )
    }
}
