use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use construction_store_api::{
    dto::cart::AddItemRequest,
    dto::orders::CheckoutRequest,
    middleware::auth::AuthUser,
    models::OrderStatus,
    services::{cart_service, order_service},
    state::AppState,
    store::Store,
    store::postgres::PgStore,
};

// End-to-end flow against a real PostgreSQL: add to cart -> checkout ->
// cancel, verifying the stock round-trip along the way.
#[tokio::test]
async fn checkout_and_cancel_round_trip_stock() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url =
        match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
            Ok(url) => url,
            Err(_) => {
                eprintln!(
                    "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run the flow test."
                );
                return Ok(());
            }
        };

    let pool = construction_store_api::db::create_pool(&database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    sqlx::query("TRUNCATE TABLE order_lines, orders, cart_lines, carts, audit_logs, products")
        .execute(&pool)
        .await?;

    let store = PgStore::new(pool.clone());
    let state = AppState::new(Arc::new(store));
    let user = AuthUser {
        customer_id: Uuid::new_v4(),
        role: "customer".to_string(),
    };

    let product_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO products (id, name, description, price, available_quantity)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(product_id)
    .bind("Cement M500, 50 kg")
    .bind("Flow test product")
    .bind(45_000_i64)
    .bind(10)
    .execute(&pool)
    .await?;

    cart_service::add_item(
        &state,
        &user,
        AddItemRequest {
            product_id,
            quantity: 4,
        },
    )
    .await?;

    let checkout = order_service::checkout(
        &state,
        &user,
        CheckoutRequest {
            delivery_address: Some("12 Builders Lane".to_string()),
            delivery_phone: Some("+7 900 123-45-67".to_string()),
            delivery_date: NaiveDate::from_ymd_opt(2026, 9, 1),
            delivery_time: Some("10:00-14:00".to_string()),
            comment: Some("Call ahead".to_string()),
        },
    )
    .await?;
    let order = checkout.data.expect("checkout data").order;

    assert_eq!(order.status, OrderStatus::New);
    assert_eq!(order.total_price, 4 * 45_000);

    let product = state.store.product(product_id).await?.expect("product");
    assert_eq!(product.available_quantity, 6);
    assert!(state.store.find_cart(user.customer_id).await?.is_none());

    order_service::cancel(&state, &user, order.id).await?;

    let product = state.store.product(product_id).await?.expect("product");
    assert_eq!(product.available_quantity, 10);
    let order = state.store.order(order.id).await?.expect("order");
    assert_eq!(order.status, OrderStatus::Cancelled);

    Ok(())
}
