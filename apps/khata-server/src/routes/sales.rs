//! Sale (invoice) routes. Stock moves with every create, update and delete.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use khata_core::Sale;
use khata_db::{NewSale, SalePatch};
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// How many invoices the list view returns.
const RECENT_SALES_LIMIT: i64 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", get(show).put(update).delete(remove))
}

async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Sale>>> {
    Ok(Json(state.db.sales().list_recent(RECENT_SALES_LIMIT).await?))
}

async fn create(
    State(state): State<AppState>,
    Json(new): Json<NewSale>,
) -> ApiResult<(StatusCode, Json<Sale>)> {
    let sale = state.db.sale_lifecycle().create_sale(new).await?;
    Ok((StatusCode::CREATED, Json(sale)))
}

async fn show(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Sale>> {
    state
        .db
        .sales()
        .get_by_id(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Sale", &id))
}

async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<SalePatch>,
) -> ApiResult<Json<Sale>> {
    Ok(Json(state.db.sale_lifecycle().update_sale(&id, patch).await?))
}

async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let sale = state.db.sale_lifecycle().delete_sale(&id).await?;
    Ok(Json(json!({
        "message": format!("Sale {} deleted", sale.invoice_number),
    })))
}
