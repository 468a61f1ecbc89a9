use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use construction_store_api::{
    dto::cart::AddItemRequest,
    dto::orders::{CheckoutRequest, UpdateOrderStatusRequest},
    error::AppError,
    middleware::auth::AuthUser,
    models::OrderStatus,
    services::{cart_service, order_service},
    state::AppState,
    store::Store,
    store::memory::MemoryStore,
};

fn test_state() -> (AppState, MemoryStore) {
    let store = MemoryStore::new();
    let state = AppState::new(Arc::new(store.clone()));
    (state, store)
}

fn customer() -> AuthUser {
    AuthUser {
        customer_id: Uuid::new_v4(),
        role: "customer".to_string(),
    }
}

fn employee() -> AuthUser {
    AuthUser {
        customer_id: Uuid::new_v4(),
        role: "employee".to_string(),
    }
}

fn delivery() -> CheckoutRequest {
    CheckoutRequest {
        delivery_address: Some("12 Builders Lane".to_string()),
        delivery_phone: Some("+7 900 123-45-67".to_string()),
        delivery_date: NaiveDate::from_ymd_opt(2026, 9, 1),
        delivery_time: Some("10:00-14:00".to_string()),
        comment: None,
    }
}

async fn add(state: &AppState, user: &AuthUser, product_id: Uuid, quantity: i32) {
    cart_service::add_item(
        state,
        user,
        AddItemRequest {
            product_id,
            quantity,
        },
    )
    .await
    .expect("add_item failed");
}

async fn stock(store: &MemoryStore, product_id: Uuid) -> i32 {
    store
        .product(product_id)
        .await
        .unwrap()
        .unwrap()
        .available_quantity
}

#[tokio::test]
async fn repeated_adds_merge_into_one_line() {
    let (state, store) = test_state();
    let user = customer();
    let cement = store.insert_product("Cement M500, 50 kg", 45_000, 10).await;

    add(&state, &user, cement.id, 2).await;
    let resp = cart_service::add_item(
        &state,
        &user,
        AddItemRequest {
            product_id: cement.id,
            quantity: 3,
        },
    )
    .await
    .unwrap();

    let line = resp.data.unwrap();
    assert_eq!(line.quantity, 5);

    let cart = resp_cart(&state, &user).await;
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.total_items, 5);
    assert_eq!(cart.total_price, 5 * 45_000);

    // both mutations left an audit trail
    assert_eq!(store.audit_len().await, 2);
}

#[tokio::test]
async fn add_beyond_available_stock_fails_without_mutation() {
    let (state, store) = test_state();
    let user = customer();
    let brick = store.insert_product("Facing brick, pallet", 1_240_000, 4).await;

    add(&state, &user, brick.id, 3).await;
    let err = cart_service::add_item(
        &state,
        &user,
        AddItemRequest {
            product_id: brick.id,
            quantity: 2,
        },
    )
    .await
    .unwrap_err();

    match err {
        AppError::InsufficientStock {
            requested,
            available,
            ..
        } => {
            assert_eq!(requested, 5);
            assert_eq!(available, 4);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // the line keeps its previous quantity and stock is untouched
    let cart = resp_cart(&state, &user).await;
    assert_eq!(cart.total_items, 3);
    assert_eq!(stock(&store, brick.id).await, 4);
}

#[tokio::test]
async fn add_rejects_non_positive_quantity_and_unknown_product() {
    let (state, store) = test_state();
    let user = customer();
    let paint = store.insert_product("Wall paint, 10 l", 210_000, 5).await;

    let err = cart_service::add_item(
        &state,
        &user,
        AddItemRequest {
            product_id: paint.id,
            quantity: 0,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = cart_service::add_item(
        &state,
        &user,
        AddItemRequest {
            product_id: Uuid::new_v4(),
            quantity: 1,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn checkout_reserves_stock_and_freezes_total() {
    let (state, store) = test_state();
    let user = customer();
    let cement = store.insert_product("Cement M500, 50 kg", 45_000, 10).await;
    let sand = store.insert_product("Quarry sand, 1 t", 95_000, 6).await;

    add(&state, &user, cement.id, 4).await;
    add(&state, &user, sand.id, 1).await;

    let resp = order_service::checkout(&state, &user, delivery()).await.unwrap();
    let data = resp.data.unwrap();

    assert_eq!(data.order.status, OrderStatus::New);
    assert_eq!(data.order.total_price, 4 * 45_000 + 95_000);
    assert_eq!(data.lines.len(), 2);
    assert_eq!(stock(&store, cement.id).await, 6);
    assert_eq!(stock(&store, sand.id).await, 5);

    // the cart was consumed by the promotion
    assert!(store.find_cart(user.customer_id).await.unwrap().is_none());

    // a later catalog price change never touches the committed total
    store.set_price(cement.id, 99_000).await;
    let order = store.order(data.order.id).await.unwrap().unwrap();
    assert_eq!(order.total_price, 4 * 45_000 + 95_000);
}

#[tokio::test]
async fn failed_checkout_leaves_no_trace() {
    let (state, store) = test_state();
    let alice = customer();
    let bob = customer();
    let cement = store.insert_product("Cement M500, 50 kg", 45_000, 5).await;
    let sand = store.insert_product("Quarry sand, 1 t", 95_000, 3).await;

    // Alice wants both products; Bob drains the sand first.
    add(&state, &alice, cement.id, 2).await;
    add(&state, &alice, sand.id, 3).await;
    add(&state, &bob, sand.id, 2).await;

    order_service::checkout(&state, &bob, delivery()).await.unwrap();
    assert_eq!(stock(&store, sand.id).await, 1);

    let err = order_service::checkout(&state, &alice, delivery())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock { .. }));

    // full rollback: cement untouched, sand as Bob left it, cart intact
    assert_eq!(stock(&store, cement.id).await, 5);
    assert_eq!(stock(&store, sand.id).await, 1);
    let cart = resp_cart(&state, &alice).await;
    assert_eq!(cart.items.len(), 2);

    let mut filter = construction_store_api::store::OrderFilter::new(1, 10);
    filter.customer_id = Some(alice.customer_id);
    let (orders, total) = store.orders(&filter).await.unwrap();
    assert!(orders.is_empty());
    assert_eq!(total, 0);
}

#[tokio::test]
async fn checkout_requires_cart_lines_and_delivery_fields() {
    let (state, store) = test_state();
    let user = customer();
    let paint = store.insert_product("Wall paint, 10 l", 210_000, 5).await;

    // no cart at all
    let err = order_service::checkout(&state, &user, delivery()).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    // cart exists but is empty
    cart_service::get_or_create_cart(&state, user.customer_id)
        .await
        .unwrap();
    let err = order_service::checkout(&state, &user, delivery()).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // missing delivery phone
    add(&state, &user, paint.id, 1).await;
    let mut payload = delivery();
    payload.delivery_phone = None;
    let err = order_service::checkout(&state, &user, payload).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // nothing was reserved along the way
    assert_eq!(stock(&store, paint.id).await, 5);
}

#[tokio::test]
async fn concurrent_checkouts_for_last_unit_let_exactly_one_through() {
    let (state, store) = test_state();
    let alice = customer();
    let bob = customer();
    let drill = store.insert_product("Hammer drill SDS+", 780_000, 1).await;

    add(&state, &alice, drill.id, 1).await;
    add(&state, &bob, drill.id, 1).await;

    let (left, right) = tokio::join!(
        order_service::checkout(&state, &alice, delivery()),
        order_service::checkout(&state, &bob, delivery()),
    );

    let outcomes = [left, right];
    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one checkout must win the last unit");

    let loser = outcomes
        .into_iter()
        .find(|r| r.is_err())
        .unwrap()
        .unwrap_err();
    assert!(matches!(loser, AppError::InsufficientStock { .. }));
    assert_eq!(stock(&store, drill.id).await, 0);
}

#[tokio::test]
async fn cancel_is_the_exact_inverse_of_checkout() {
    let (state, store) = test_state();
    let user = customer();
    let cement = store.insert_product("Cement M500, 50 kg", 45_000, 10).await;
    let brick = store.insert_product("Facing brick, pallet", 1_240_000, 7).await;

    add(&state, &user, cement.id, 3).await;
    add(&state, &user, brick.id, 2).await;

    let order = order_service::checkout(&state, &user, delivery())
        .await
        .unwrap()
        .data
        .unwrap()
        .order;
    assert_eq!(stock(&store, cement.id).await, 7);
    assert_eq!(stock(&store, brick.id).await, 5);

    let cancelled = order_service::cancel(&state, &user, order.id)
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(stock(&store, cement.id).await, 10);
    assert_eq!(stock(&store, brick.id).await, 7);
}

#[tokio::test]
async fn cancel_refuses_foreign_and_non_new_orders() {
    let (state, store) = test_state();
    let user = customer();
    let staff = employee();
    let sand = store.insert_product("Quarry sand, 1 t", 95_000, 9).await;

    add(&state, &user, sand.id, 2).await;
    let order = order_service::checkout(&state, &user, delivery())
        .await
        .unwrap()
        .data
        .unwrap()
        .order;

    // not the owner
    let err = order_service::cancel(&state, &customer(), order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    // fulfilled orders cannot be cancelled by the customer
    order_service::advance_status(
        &state,
        &staff,
        order.id,
        UpdateOrderStatusRequest {
            status: "fulfilled".to_string(),
        },
    )
    .await
    .unwrap();

    let err = order_service::cancel(&state, &user, order.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));

    let order = store.order(order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Fulfilled);
    assert_eq!(stock(&store, sand.id).await, 7);
}

#[tokio::test]
async fn employee_cancel_releases_stock_exactly_once() {
    let (state, store) = test_state();
    let user = customer();
    let staff = employee();
    let paint = store.insert_product("Wall paint, 10 l", 210_000, 8).await;

    add(&state, &user, paint.id, 3).await;
    let order = order_service::checkout(&state, &user, delivery())
        .await
        .unwrap()
        .data
        .unwrap()
        .order;
    assert_eq!(stock(&store, paint.id).await, 5);

    let cancel = UpdateOrderStatusRequest {
        status: "cancelled".to_string(),
    };
    order_service::advance_status(&state, &staff, order.id, cancel)
        .await
        .unwrap();
    assert_eq!(stock(&store, paint.id).await, 8);

    // repeating the transition must not release again
    let cancel_again = UpdateOrderStatusRequest {
        status: "cancelled".to_string(),
    };
    order_service::advance_status(&state, &staff, order.id, cancel_again)
        .await
        .unwrap();
    assert_eq!(stock(&store, paint.id).await, 8);
}

#[tokio::test]
async fn advance_status_validates_input_and_role() {
    let (state, store) = test_state();
    let user = customer();
    let staff = employee();
    let sand = store.insert_product("Quarry sand, 1 t", 95_000, 5).await;

    add(&state, &user, sand.id, 1).await;
    let order = order_service::checkout(&state, &user, delivery())
        .await
        .unwrap()
        .data
        .unwrap()
        .order;

    let err = order_service::advance_status(
        &state,
        &staff,
        order.id,
        UpdateOrderStatusRequest {
            status: "shipped".to_string(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = order_service::advance_status(
        &state,
        &user,
        order.id,
        UpdateOrderStatusRequest {
            status: "processing".to_string(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    order_service::advance_status(
        &state,
        &staff,
        order.id,
        UpdateOrderStatusRequest {
            status: "processing".to_string(),
        },
    )
    .await
    .unwrap();
    let order = store.order(order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Processing);
    // plain status moves never touch stock
    assert_eq!(stock(&store, sand.id).await, 4);
}

#[tokio::test]
async fn remove_and_clear_behave_per_contract() {
    let (state, store) = test_state();
    let user = customer();
    let cement = store.insert_product("Cement M500, 50 kg", 45_000, 10).await;

    // removing from a non-existent cart
    let err = cart_service::remove_item(&state, &user, cement.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    add(&state, &user, cement.id, 2).await;

    // removing a product that is not in the cart
    let err = cart_service::remove_item(&state, &user, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    cart_service::remove_item(&state, &user, cement.id)
        .await
        .unwrap();
    assert_eq!(resp_cart(&state, &user).await.items.len(), 0);

    // clear is idempotent, empty or not
    cart_service::clear(&state, &user).await.unwrap();
    add(&state, &user, cement.id, 1).await;
    cart_service::clear(&state, &user).await.unwrap();
    cart_service::clear(&state, &user).await.unwrap();
    assert_eq!(resp_cart(&state, &user).await.total_items, 0);
}

async fn resp_cart(
    state: &AppState,
    user: &AuthUser,
) -> construction_store_api::dto::cart::CartView {
    cart_service::cart_totals(state, user)
        .await
        .unwrap()
        .data
        .unwrap()
}
