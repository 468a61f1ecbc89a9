pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::audit::AuditEntry;
use crate::error::AppResult;
use crate::models::{Cart, CartLine, Order, OrderLine, OrderStatus, Product};

/// A cart line joined with its product's current name and price.
#[derive(Debug, Clone, FromRow)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub name: String,
    pub price: i64,
    pub quantity: i32,
}

/// Fields for the order row created when a cart is promoted.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: Uuid,
    pub total_price: i64,
    pub delivery_address: String,
    pub delivery_phone: String,
    pub delivery_date: NaiveDate,
    pub delivery_time: String,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Everything an order listing can filter on. Translated into SQL by exactly
/// one builder (`postgres::push_order_filter`), so placeholder indexing and
/// parameter binding stay correct by construction.
#[derive(Debug, Clone)]
pub struct OrderFilter {
    pub customer_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    pub page: i64,
    pub per_page: i64,
    pub sort: SortOrder,
}

impl OrderFilter {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            customer_id: None,
            status: None,
            page,
            per_page,
            sort: SortOrder::Desc,
        }
    }

    pub fn limit_offset(&self) -> (i64, i64) {
        (self.per_page, (self.page - 1) * self.per_page)
    }
}

/// Repository surface of the service. One implementation speaks PostgreSQL,
/// one keeps everything in memory behind a mutex for tests; both uphold the
/// same atomicity contract for units of work begun via [`Store::begin`].
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a unit-of-work boundary. All mutations performed through the
    /// returned handle become durable together on commit; dropping the
    /// handle without committing rolls every one of them back.
    async fn begin(&self) -> AppResult<Box<dyn StoreTxn>>;

    async fn product(&self, id: Uuid) -> AppResult<Option<Product>>;
    async fn products(&self, limit: i64, offset: i64) -> AppResult<(Vec<Product>, i64)>;

    async fn find_cart(&self, customer_id: Uuid) -> AppResult<Option<Cart>>;
    async fn create_cart(&self, customer_id: Uuid) -> AppResult<Cart>;
    async fn cart_line(&self, cart_id: Uuid, product_id: Uuid) -> AppResult<Option<CartLine>>;
    /// Insert or overwrite the `(cart, product)` line with an absolute
    /// quantity. Merge arithmetic happens in the cart service.
    async fn set_cart_line(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> AppResult<CartLine>;
    /// Returns false when the line did not exist.
    async fn delete_cart_line(&self, cart_id: Uuid, product_id: Uuid) -> AppResult<bool>;
    async fn clear_cart_lines(&self, cart_id: Uuid) -> AppResult<()>;
    async fn cart_lines_priced(&self, cart_id: Uuid) -> AppResult<Vec<PricedLine>>;

    async fn order(&self, id: Uuid) -> AppResult<Option<Order>>;
    async fn order_lines(&self, order_id: Uuid) -> AppResult<Vec<OrderLine>>;
    async fn orders(&self, filter: &OrderFilter) -> AppResult<(Vec<Order>, i64)>;

    async fn record_audit(&self, entry: AuditEntry) -> AppResult<()>;
}

/// Transactional handle produced by [`Store::begin`].
///
/// Dropping the handle without calling [`StoreTxn::commit`] rolls back every
/// mutation performed through it (early `?` returns and panics included) and
/// releases the underlying connection or lock.
#[async_trait]
pub trait StoreTxn: Send {
    /// Atomic conditional decrement: `available_quantity -= quantity` only if
    /// `available_quantity >= quantity`, with zero side effects on failure.
    /// Concurrent callers against one product serialize here; combined
    /// over-requests can never both succeed.
    async fn reserve(&mut self, product_id: Uuid, quantity: i32) -> AppResult<()>;

    /// Atomic unconditional increment of `available_quantity`.
    async fn release(&mut self, product_id: Uuid, quantity: i32) -> AppResult<()>;

    async fn cart_lines_priced(&mut self, cart_id: Uuid) -> AppResult<Vec<PricedLine>>;
    async fn insert_order(&mut self, order: NewOrder) -> AppResult<Order>;
    async fn insert_order_lines(&mut self, order_id: Uuid, lines: &[PricedLine]) -> AppResult<()>;
    async fn delete_cart(&mut self, cart_id: Uuid) -> AppResult<()>;

    /// Load an order and hold it against concurrent status changes for the
    /// rest of the unit of work.
    async fn order_for_update(&mut self, order_id: Uuid) -> AppResult<Option<Order>>;
    async fn order_lines(&mut self, order_id: Uuid) -> AppResult<Vec<OrderLine>>;
    async fn set_order_status(&mut self, order_id: Uuid, status: OrderStatus) -> AppResult<Order>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}
