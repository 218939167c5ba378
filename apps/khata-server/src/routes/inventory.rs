//! Inventory routes: products and their batches.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use khata_core::{InventoryBatch, Product};
use khata_db::{BatchPatch, NewBatch, NewProduct, ProductPatch};
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", put(update).delete(remove))
        .route("/{id}/batches", post(add_batch))
        .route("/batches/{id}", put(update_batch))
        .route("/company/{company}", delete(remove_company))
}

async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<Product>>> {
    Ok(Json(state.db.inventory().list_products().await?))
}

async fn create(
    State(state): State<AppState>,
    Json(new): Json<NewProduct>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    let product = state.db.inventory().create_product(new).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<ProductPatch>,
) -> ApiResult<Json<Product>> {
    Ok(Json(state.db.inventory().update_product(&id, patch).await?))
}

async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    state.db.inventory().delete_product(&id).await?;
    Ok(Json(json!({ "message": "Product deleted" })))
}

async fn remove_company(
    State(state): State<AppState>,
    Path(company): Path<String>,
) -> ApiResult<Json<Value>> {
    let deleted = state.db.inventory().delete_products_by_company(&company).await?;
    Ok(Json(json!({
        "message": format!("Deleted {} products from {}", deleted, company),
        "deleted": deleted,
    })))
}

async fn add_batch(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    Json(new): Json<NewBatch>,
) -> ApiResult<(StatusCode, Json<InventoryBatch>)> {
    let batch = state.db.inventory().add_batch(&product_id, new).await?;
    Ok((StatusCode::CREATED, Json(batch)))
}

async fn update_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
    Json(patch): Json<BatchPatch>,
) -> ApiResult<Json<InventoryBatch>> {
    Ok(Json(state.db.inventory().update_batch(&batch_id, patch).await?))
}
