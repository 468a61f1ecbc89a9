use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::Product,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
    store::Store,
};

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct ProductList {
    #[schema(value_type = Vec<Product>)]
    pub items: Vec<Product>,
}

// Read-only catalog surface; product administration and pricing live in the
// catalog service, and stock moves only through the ledger.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products))
        .route("/{id}", get(get_product))
}

#[utoipa::path(
    get,
    path = "/api/products",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20")
    ),
    responses(
        (status = 200, description = "List products", body = ApiResponse<ProductList>)
    ),
    tag = "Products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<ProductList>>> {
    let (page, per_page) = pagination.normalize();
    let (items, total) = state
        .store
        .products(per_page, (page - 1) * per_page)
        .await?;

    let meta = Meta::new(page, per_page, total);
    Ok(Json(ApiResponse::success(
        "OK",
        ProductList { items },
        Some(meta),
    )))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Product detail", body = ApiResponse<Product>),
        (status = 404, description = "Not Found"),
    ),
    tag = "Products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Product>>> {
    let product = state
        .store
        .product(id)
        .await?
        .ok_or_else(|| AppError::NotFound("product not found".to_string()))?;

    Ok(Json(ApiResponse::success(
        "OK",
        product,
        Some(Meta::empty()),
    )))
}
