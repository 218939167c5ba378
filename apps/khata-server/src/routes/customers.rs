//! Customer routes: directory, balance, and per-customer history.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use khata_core::{Customer, CustomerBalance, Payment, Sale};
use khata_db::NewCustomer;
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", get(show).delete(remove))
        .route("/{id}/balance", get(balance))
        .route("/{id}/sales", get(sales))
        .route("/{id}/payments", get(payments))
}

async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Customer>>> {
    Ok(Json(state.db.customers().list().await?))
}

async fn create(
    State(state): State<AppState>,
    Json(new): Json<NewCustomer>,
) -> ApiResult<(StatusCode, Json<Customer>)> {
    let customer = state.db.customers().create(new).await?;
    Ok((StatusCode::CREATED, Json(customer)))
}

async fn show(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Customer>> {
    state
        .db
        .customers()
        .get_by_id(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Customer", &id))
}

async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    state.db.customers().delete(&id).await?;
    Ok(Json(json!({ "message": "Customer deleted" })))
}

async fn balance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CustomerBalance>> {
    Ok(Json(state.db.customers().balance(&id).await?))
}

async fn sales(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Vec<Sale>>> {
    Ok(Json(state.db.sales().list_by_customer(&id).await?))
}

async fn payments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Payment>>> {
    Ok(Json(state.db.payments().list_by_customer(&id).await?))
}

#[cfg(test)]
mod tests {
    use crate::testutil::{send, test_app};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_create_then_fetch() {
        let (app, _db) = test_app().await;

        let (status, created) = send(
            &app,
            Method::POST,
            "/api/customers",
            Some(json!({ "name": "Asha Traders", "email": "asha@example.in", "phone": "9800000001" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap().to_string();

        let (status, fetched) = send(&app, Method::GET, &format!("/api/customers/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["name"], "Asha Traders");

        let (status, list) = send(&app, Method::GET, "/api/customers", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_email_is_400() {
        let (app, _db) = test_app().await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/customers",
            Some(json!({ "name": "Asha", "email": "not-an-email", "phone": "9800000001" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_unknown_customer_is_404() {
        let (app, _db) = test_app().await;
        let (status, body) = send(&app, Method::GET, "/api/customers/missing/balance", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");

        let (status, _) = send(&app, Method::DELETE, "/api/customers/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
