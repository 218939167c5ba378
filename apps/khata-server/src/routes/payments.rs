//! Payment routes.
//!
//! Recording a payment allocates it across the customer's open invoices,
//! oldest first; deleting one reverses that allocation. Both run as one
//! transaction inside [`khata_db::PaymentLedger`].

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use khata_core::{Payment, PaymentAllocation};
use khata_db::{NewPayment, ReversalOutcome};
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create))
        .route("/{id}", get(show).delete(remove))
}

#[derive(Debug, Serialize)]
struct PaymentCreated {
    payment: Payment,
    /// Cents that went onto invoices; the rest is customer credit.
    allocation_applied: i64,
    allocations: Vec<PaymentAllocation>,
}

#[derive(Debug, Serialize)]
struct PaymentReverted {
    reverted: bool,
    reversal: ReversalOutcome,
}

#[derive(Debug, Serialize)]
struct PaymentDetail {
    #[serde(flatten)]
    payment: Payment,
    allocations: Vec<PaymentAllocation>,
}

async fn create(
    State(state): State<AppState>,
    Json(new): Json<NewPayment>,
) -> ApiResult<(StatusCode, Json<PaymentCreated>)> {
    let outcome = state.db.payment_ledger().add_payment(new).await?;

    Ok((
        StatusCode::CREATED,
        Json(PaymentCreated {
            allocation_applied: outcome.allocation.applied_cents,
            payment: outcome.payment,
            allocations: outcome.allocations,
        }),
    ))
}

async fn show(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<PaymentDetail>> {
    let payments = state.db.payments();
    let payment = payments
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Payment", &id))?;
    let allocations = payments.allocations(&id).await?;

    Ok(Json(PaymentDetail { payment, allocations }))
}

async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<PaymentReverted>> {
    let reversal = state.db.payment_ledger().delete_payment(&id).await?;
    Ok(Json(PaymentReverted {
        reverted: true,
        reversal,
    }))
}

#[cfg(test)]
mod tests {
    use crate::testutil::{send, test_app};
    use axum::http::{Method, StatusCode};
    use serde_json::{json, Value};

    async fn customer_with_invoice(app: &axum::Router, total_cents: i64) -> (String, String) {
        let (_, customer) = send(
            app,
            Method::POST,
            "/api/customers",
            Some(json!({ "name": "Ravi Kirana", "email": "ravi@example.in", "phone": "9800000002" })),
        )
        .await;
        let customer_id = customer["id"].as_str().unwrap().to_string();

        let (status, sale) = send(
            app,
            Method::POST,
            "/api/sales",
            Some(json!({
                "customer_id": customer_id,
                "items": [{ "name": "Sugar 1kg", "quantity": 1, "unit_price_cents": total_cents }],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        (customer_id, sale["id"].as_str().unwrap().to_string())
    }

    fn sale_paid(sale: &Value) -> i64 {
        sale["amount_paid_cents"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_payment_round_trip_restores_invoice() {
        let (app, _db) = test_app().await;
        let (customer_id, sale_id) = customer_with_invoice(&app, 10_000).await;

        let (status, created) = send(
            &app,
            Method::POST,
            "/api/payments",
            Some(json!({ "customer_id": customer_id, "amount_cents": 12_000 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["allocation_applied"], 10_000);
        assert_eq!(created["payment"]["unapplied_cents"], 2_000);

        let (_, sale) = send(&app, Method::GET, &format!("/api/sales/{}", sale_id), None).await;
        assert_eq!(sale_paid(&sale), 10_000);
        assert_eq!(sale["payment_status"], "paid");

        let payment_id = created["payment"]["id"].as_str().unwrap().to_string();
        let (status, detail) = send(&app, Method::GET, &format!("/api/payments/{}", payment_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["allocations"].as_array().unwrap().len(), 1);

        let (status, reverted) = send(&app, Method::DELETE, &format!("/api/payments/{}", payment_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reverted["reverted"], true);
        assert_eq!(reverted["reversal"]["policy"], "exact");

        let (_, sale) = send(&app, Method::GET, &format!("/api/sales/{}", sale_id), None).await;
        assert_eq!(sale_paid(&sale), 0);
        assert_eq!(sale["payment_status"], "unpaid");
    }

    #[tokio::test]
    async fn test_non_positive_amount_is_400() {
        let (app, _db) = test_app().await;
        let (customer_id, _) = customer_with_invoice(&app, 5_000).await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/payments",
            Some(json!({ "customer_id": customer_id, "amount_cents": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_delete_unknown_payment_is_404() {
        let (app, _db) = test_app().await;
        let (status, body) = send(&app, Method::DELETE, "/api/payments/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }
}
