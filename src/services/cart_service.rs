use serde_json::json;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::cart::{AddItemRequest, CartItemView, CartView},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Cart, CartLine},
    response::{ApiResponse, Meta},
    state::AppState,
    store::Store,
};

/// Return the customer's open cart, creating an empty one if there is none.
/// Never touches inventory.
pub async fn get_or_create_cart(state: &AppState, customer_id: Uuid) -> AppResult<Cart> {
    if let Some(cart) = state.store.find_cart(customer_id).await? {
        return Ok(cart);
    }
    state.store.create_cart(customer_id).await
}

pub async fn add_item(
    state: &AppState,
    user: &AuthUser,
    payload: AddItemRequest,
) -> AppResult<ApiResponse<CartLine>> {
    if payload.quantity <= 0 {
        return Err(AppError::Validation(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let product = state
        .store
        .product(payload.product_id)
        .await?
        .ok_or_else(|| AppError::NotFound("product not found".to_string()))?;

    let cart = get_or_create_cart(state, user.customer_id).await?;
    let existing = state.store.cart_line(cart.id, payload.product_id).await?;
    let merged = existing.map_or(0, |line| line.quantity) + payload.quantity;

    // Advisory check; the authoritative one is the atomic reservation at
    // checkout, since stock can move between add and checkout.
    if merged > product.available_quantity {
        return Err(AppError::InsufficientStock {
            name: product.name,
            requested: merged,
            available: product.available_quantity,
        });
    }

    let line = state
        .store
        .set_cart_line(cart.id, payload.product_id, merged)
        .await?;

    log_audit(
        state.store.as_ref(),
        Some(user.customer_id),
        "cart_add",
        Some("cart_lines"),
        Some(json!({ "product_id": payload.product_id, "quantity": payload.quantity })),
    )
    .await;

    Ok(ApiResponse::success("Added to cart", line, None))
}

pub async fn remove_item(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let cart = state
        .store
        .find_cart(user.customer_id)
        .await?
        .ok_or_else(|| AppError::NotFound("cart not found".to_string()))?;

    let removed = state.store.delete_cart_line(cart.id, product_id).await?;
    if !removed {
        return Err(AppError::NotFound("product not in cart".to_string()));
    }

    log_audit(
        state.store.as_ref(),
        Some(user.customer_id),
        "cart_remove",
        Some("cart_lines"),
        Some(json!({ "product_id": product_id })),
    )
    .await;

    Ok(ApiResponse::success(
        "Removed from cart",
        json!({}),
        Some(Meta::empty()),
    ))
}

/// Idempotent: clearing an absent or already-empty cart succeeds.
pub async fn clear(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<serde_json::Value>> {
    if let Some(cart) = state.store.find_cart(user.customer_id).await? {
        state.store.clear_cart_lines(cart.id).await?;
    }

    log_audit(
        state.store.as_ref(),
        Some(user.customer_id),
        "cart_clear",
        Some("cart_lines"),
        None,
    )
    .await;

    Ok(ApiResponse::success(
        "Cart cleared",
        json!({}),
        Some(Meta::empty()),
    ))
}

/// Cart view priced at the current catalog, as opposed to the frozen total
/// an order gets at checkout.
pub async fn cart_totals(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartView>> {
    let Some(cart) = state.store.find_cart(user.customer_id).await? else {
        return Ok(ApiResponse::success(
            "OK",
            CartView {
                items: Vec::new(),
                total_items: 0,
                total_price: 0,
            },
            Some(Meta::empty()),
        ));
    };

    let lines = state.store.cart_lines_priced(cart.id).await?;
    let items: Vec<CartItemView> = lines
        .into_iter()
        .map(|line| CartItemView {
            product_id: line.product_id,
            name: line.name,
            price: line.price,
            quantity: line.quantity,
            item_total: line.price * i64::from(line.quantity),
        })
        .collect();

    let total_items: i32 = items.iter().map(|item| item.quantity).sum();
    let total_price: i64 = items.iter().map(|item| item.item_total).sum();

    Ok(ApiResponse::success(
        "OK",
        CartView {
            items,
            total_items,
            total_price,
        },
        Some(Meta::empty()),
    ))
}
