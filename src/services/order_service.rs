use std::str::FromStr;

use serde_json::json;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{CheckoutRequest, OrderList, OrderWithLines, UpdateOrderStatusRequest},
    error::{AppError, AppResult},
    ledger,
    middleware::auth::{AuthUser, ensure_employee},
    models::{Order, OrderStatus},
    response::{ApiResponse, Meta},
    routes::params::{EmployeeOrderQuery, OrderListQuery},
    state::AppState,
    store::{NewOrder, OrderFilter, Store, StoreTxn},
    txn::UnitOfWork,
};

/// Promote the customer's cart into a committed order. Stock is reserved for
/// every line and the total is frozen inside a single unit of work that also
/// consumes the cart; any failure leaves the cart and the shelf untouched.
pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<OrderWithLines>> {
    let cart = state
        .store
        .find_cart(user.customer_id)
        .await?
        .ok_or_else(|| AppError::NotFound("cart not found".to_string()))?;

    if state.store.cart_lines_priced(cart.id).await?.is_empty() {
        return Err(AppError::Validation("cart is empty".to_string()));
    }

    let (address, phone, date, time) = match (
        trimmed(payload.delivery_address.as_deref()),
        trimmed(payload.delivery_phone.as_deref()),
        payload.delivery_date,
        trimmed(payload.delivery_time.as_deref()),
    ) {
        (Some(address), Some(phone), Some(date), Some(time)) => (address, phone, date, time),
        _ => {
            return Err(AppError::Validation(
                "delivery address, phone, date and time are required".to_string(),
            ));
        }
    };

    let mut uow = UnitOfWork::begin(state.store.as_ref()).await?;
    let txn = uow.txn();

    // Re-read inside the transaction; prices and lines are frozen from here.
    let lines = txn.cart_lines_priced(cart.id).await?;
    if lines.is_empty() {
        return Err(AppError::Validation("cart is empty".to_string()));
    }

    ledger::reserve_all(txn, &lines).await?;

    let total_price: i64 = lines
        .iter()
        .map(|line| line.price * i64::from(line.quantity))
        .sum();

    let order = txn
        .insert_order(NewOrder {
            customer_id: user.customer_id,
            total_price,
            delivery_address: address,
            delivery_phone: phone,
            delivery_date: date,
            delivery_time: time,
            comment: payload.comment,
        })
        .await?;
    txn.insert_order_lines(order.id, &lines).await?;
    txn.delete_cart(cart.id).await?;

    let order_lines = txn.order_lines(order.id).await?;
    uow.commit().await?;

    log_audit(
        state.store.as_ref(),
        Some(user.customer_id),
        "checkout",
        Some("orders"),
        Some(json!({ "order_id": order.id, "total_price": total_price })),
    )
    .await;

    Ok(ApiResponse::success(
        "Order created",
        OrderWithLines {
            order,
            lines: order_lines,
        },
        Some(Meta::empty()),
    ))
}

/// Customer-driven cancellation; the exact inverse of checkout. Only orders
/// still in `new` qualify.
pub async fn cancel(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
) -> AppResult<ApiResponse<Order>> {
    let mut uow = UnitOfWork::begin(state.store.as_ref()).await?;
    let txn = uow.txn();

    let order = txn
        .order_for_update(order_id)
        .await?
        .filter(|order| order.customer_id == user.customer_id)
        .ok_or_else(|| AppError::NotFound("order not found".to_string()))?;

    if order.status != OrderStatus::New {
        return Err(AppError::InvalidTransition(
            "only new orders can be cancelled".to_string(),
        ));
    }

    let lines = txn.order_lines(order.id).await?;
    ledger::release_all(txn, &lines).await?;
    let order = txn.set_order_status(order.id, OrderStatus::Cancelled).await?;
    uow.commit().await?;

    log_audit(
        state.store.as_ref(),
        Some(user.customer_id),
        "order_cancel",
        Some("orders"),
        Some(json!({ "order_id": order.id })),
    )
    .await;

    Ok(ApiResponse::success(
        "Order cancelled",
        order,
        Some(Meta::empty()),
    ))
}

/// Employee-driven status change. Does not gate on the current status and
/// never re-reserves stock. Moving into `cancelled` from a status that still
/// holds stock returns the reserved units; a repeat cancel or a cancel after
/// fulfilment must not.
pub async fn advance_status(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_employee(user)?;

    let target = OrderStatus::from_str(payload.status.trim()).map_err(|_| {
        AppError::Validation(
            "status must be one of: new, processing, fulfilled, cancelled".to_string(),
        )
    })?;

    let mut uow = UnitOfWork::begin(state.store.as_ref()).await?;
    let txn = uow.txn();

    let order = txn
        .order_for_update(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound("order not found".to_string()))?;

    if target == OrderStatus::Cancelled && order.status.holds_stock() {
        let lines = txn.order_lines(order.id).await?;
        ledger::release_all(txn, &lines).await?;
    }

    let order = txn.set_order_status(order.id, target).await?;
    uow.commit().await?;

    log_audit(
        state.store.as_ref(),
        Some(user.customer_id),
        "order_status",
        Some("orders"),
        Some(json!({ "order_id": order.id, "status": order.status.as_str() })),
    )
    .await;

    Ok(ApiResponse::success(
        "Order status updated",
        order,
        Some(Meta::empty()),
    ))
}

pub async fn list_my_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, per_page) = query.pagination.normalize();
    let mut filter = OrderFilter::new(page, per_page);
    filter.customer_id = Some(user.customer_id);
    filter.status = parse_status_filter(query.status.as_deref())?;
    filter.sort = query.sort_order.unwrap_or_default();

    let (items, total) = state.store.orders(&filter).await?;
    Ok(ApiResponse::success(
        "OK",
        OrderList { items },
        Some(Meta::new(page, per_page, total)),
    ))
}

pub async fn get_my_order(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
) -> AppResult<ApiResponse<OrderWithLines>> {
    let order = state
        .store
        .order(order_id)
        .await?
        .filter(|order| order.customer_id == user.customer_id)
        .ok_or_else(|| AppError::NotFound("order not found".to_string()))?;

    let lines = state.store.order_lines(order.id).await?;
    Ok(ApiResponse::success(
        "OK",
        OrderWithLines { order, lines },
        Some(Meta::empty()),
    ))
}

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: EmployeeOrderQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_employee(user)?;

    let (page, per_page) = query.pagination.normalize();
    let mut filter = OrderFilter::new(page, per_page);
    filter.customer_id = query.customer_id;
    filter.status = parse_status_filter(query.status.as_deref())?;
    filter.sort = query.sort_order.unwrap_or_default();

    let (items, total) = state.store.orders(&filter).await?;
    Ok(ApiResponse::success(
        "OK",
        OrderList { items },
        Some(Meta::new(page, per_page, total)),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
) -> AppResult<ApiResponse<OrderWithLines>> {
    ensure_employee(user)?;

    let order = state
        .store
        .order(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound("order not found".to_string()))?;

    let lines = state.store.order_lines(order.id).await?;
    Ok(ApiResponse::success(
        "OK",
        OrderWithLines { order, lines },
        Some(Meta::empty()),
    ))
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_status_filter(status: Option<&str>) -> AppResult<Option<OrderStatus>> {
    match status.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => OrderStatus::from_str(s)
            .map(Some)
            .map_err(|_| AppError::Validation("unknown order status".to_string())),
    }
}
