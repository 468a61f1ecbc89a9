use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::audit::AuditEntry;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::{Cart, CartLine, Order, OrderLine, OrderStatus, Product};

use super::{NewOrder, OrderFilter, PricedLine, Store, StoreTxn};

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Single translation point for [`OrderFilter`]; the listing and the count
/// query both go through it.
fn push_order_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
    let mut prefix = " WHERE ";
    if let Some(customer_id) = filter.customer_id {
        qb.push(prefix).push("customer_id = ").push_bind(customer_id);
        prefix = " AND ";
    }
    if let Some(status) = filter.status {
        qb.push(prefix).push("status = ").push_bind(status);
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTxn>> {
        let txn = self
            .pool
            .begin()
            .await
            .map_err(|err| AppError::TransactionAbort(err.to_string()))?;
        Ok(Box::new(PgTxn { txn }))
    }

    async fn product(&self, id: Uuid) -> AppResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    async fn products(&self, limit: i64, offset: i64) -> AppResult<(Vec<Product>, i64)> {
        let items = sqlx::query_as::<_, Product>(
            "SELECT * FROM products ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok((items, total.0))
    }

    async fn find_cart(&self, customer_id: Uuid) -> AppResult<Option<Cart>> {
        let cart = sqlx::query_as::<_, Cart>("SELECT * FROM carts WHERE customer_id = $1")
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(cart)
    }

    async fn create_cart(&self, customer_id: Uuid) -> AppResult<Cart> {
        let cart = sqlx::query_as::<_, Cart>(
            "INSERT INTO carts (id, customer_id) VALUES ($1, $2) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(cart)
    }

    async fn cart_line(&self, cart_id: Uuid, product_id: Uuid) -> AppResult<Option<CartLine>> {
        let line = sqlx::query_as::<_, CartLine>(
            "SELECT * FROM cart_lines WHERE cart_id = $1 AND product_id = $2",
        )
        .bind(cart_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(line)
    }

    async fn set_cart_line(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> AppResult<CartLine> {
        let line = sqlx::query_as::<_, CartLine>(
            r#"
            INSERT INTO cart_lines (id, cart_id, product_id, quantity)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (cart_id, product_id) DO UPDATE SET quantity = EXCLUDED.quantity
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(cart_id)
        .bind(product_id)
        .bind(quantity)
        .fetch_one(&self.pool)
        .await?;
        Ok(line)
    }

    async fn delete_cart_line(&self, cart_id: Uuid, product_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM cart_lines WHERE cart_id = $1 AND product_id = $2")
            .bind(cart_id)
            .bind(product_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_cart_lines(&self, cart_id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM cart_lines WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn cart_lines_priced(&self, cart_id: Uuid) -> AppResult<Vec<PricedLine>> {
        let lines = sqlx::query_as::<_, PricedLine>(
            r#"
            SELECT cl.product_id, p.name, p.price, cl.quantity
            FROM cart_lines cl
            JOIN products p ON p.id = cl.product_id
            WHERE cl.cart_id = $1
            ORDER BY cl.created_at
            "#,
        )
        .bind(cart_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(lines)
    }

    async fn order(&self, id: Uuid) -> AppResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    async fn order_lines(&self, order_id: Uuid) -> AppResult<Vec<OrderLine>> {
        let lines = sqlx::query_as::<_, OrderLine>(
            "SELECT * FROM order_lines WHERE order_id = $1 ORDER BY created_at",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(lines)
    }

    async fn orders(&self, filter: &OrderFilter) -> AppResult<(Vec<Order>, i64)> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM orders");
        push_order_filter(&mut qb, filter);
        qb.push(" ORDER BY created_at ").push(filter.sort.as_sql());
        let (limit, offset) = filter.limit_offset();
        qb.push(" LIMIT ").push_bind(limit);
        qb.push(" OFFSET ").push_bind(offset);
        let items = qb
            .build_query_as::<Order>()
            .fetch_all(&self.pool)
            .await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders");
        push_order_filter(&mut count, filter);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        Ok((items, total))
    }

    async fn record_audit(&self, entry: AuditEntry) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, customer_id, action, resource, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(entry.customer_id)
        .bind(entry.action)
        .bind(entry.resource)
        .bind(entry.metadata)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct PgTxn {
    txn: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTxn for PgTxn {
    async fn reserve(&mut self, product_id: Uuid, quantity: i32) -> AppResult<()> {
        // Compare-and-decrement in one statement; a read-then-write pair
        // would lose updates under concurrent checkouts.
        let result = sqlx::query(
            r#"
            UPDATE products
            SET available_quantity = available_quantity - $2
            WHERE id = $1 AND available_quantity >= $2
            "#,
        )
        .bind(product_id)
        .bind(quantity)
        .execute(&mut *self.txn)
        .await?;

        if result.rows_affected() == 0 {
            let row: Option<(String, i32)> =
                sqlx::query_as("SELECT name, available_quantity FROM products WHERE id = $1")
                    .bind(product_id)
                    .fetch_optional(&mut *self.txn)
                    .await?;
            return match row {
                Some((name, available)) => Err(AppError::InsufficientStock {
                    name,
                    requested: quantity,
                    available,
                }),
                None => Err(AppError::NotFound("product not found".to_string())),
            };
        }
        Ok(())
    }

    async fn release(&mut self, product_id: Uuid, quantity: i32) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE products SET available_quantity = available_quantity + $2 WHERE id = $1",
        )
        .bind(product_id)
        .bind(quantity)
        .execute(&mut *self.txn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("product not found".to_string()));
        }
        Ok(())
    }

    async fn cart_lines_priced(&mut self, cart_id: Uuid) -> AppResult<Vec<PricedLine>> {
        let lines = sqlx::query_as::<_, PricedLine>(
            r#"
            SELECT cl.product_id, p.name, p.price, cl.quantity
            FROM cart_lines cl
            JOIN products p ON p.id = cl.product_id
            WHERE cl.cart_id = $1
            ORDER BY cl.created_at
            "#,
        )
        .bind(cart_id)
        .fetch_all(&mut *self.txn)
        .await?;
        Ok(lines)
    }

    async fn insert_order(&mut self, order: NewOrder) -> AppResult<Order> {
        let order = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (id, customer_id, status, total_price, delivery_address,
                                delivery_phone, delivery_date, delivery_time, comment)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(order.customer_id)
        .bind(OrderStatus::New)
        .bind(order.total_price)
        .bind(order.delivery_address)
        .bind(order.delivery_phone)
        .bind(order.delivery_date)
        .bind(order.delivery_time)
        .bind(order.comment)
        .fetch_one(&mut *self.txn)
        .await?;
        Ok(order)
    }

    async fn insert_order_lines(&mut self, order_id: Uuid, lines: &[PricedLine]) -> AppResult<()> {
        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO order_lines (id, order_id, product_id, quantity, price)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(order_id)
            .bind(line.product_id)
            .bind(line.quantity)
            .bind(line.price)
            .execute(&mut *self.txn)
            .await?;
        }
        Ok(())
    }

    async fn delete_cart(&mut self, cart_id: Uuid) -> AppResult<()> {
        // cart_lines go with it via ON DELETE CASCADE
        sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(cart_id)
            .execute(&mut *self.txn)
            .await?;
        Ok(())
    }

    async fn order_for_update(&mut self, order_id: Uuid) -> AppResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id)
            .fetch_optional(&mut *self.txn)
            .await?;
        Ok(order)
    }

    async fn order_lines(&mut self, order_id: Uuid) -> AppResult<Vec<OrderLine>> {
        let lines = sqlx::query_as::<_, OrderLine>(
            "SELECT * FROM order_lines WHERE order_id = $1 ORDER BY created_at",
        )
        .bind(order_id)
        .fetch_all(&mut *self.txn)
        .await?;
        Ok(lines)
    }

    async fn set_order_status(&mut self, order_id: Uuid, status: OrderStatus) -> AppResult<Order> {
        let order =
            sqlx::query_as::<_, Order>("UPDATE orders SET status = $2 WHERE id = $1 RETURNING *")
                .bind(order_id)
                .bind(status)
                .fetch_one(&mut *self.txn)
                .await?;
        Ok(order)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.txn
            .commit()
            .await
            .map_err(|err| AppError::TransactionAbort(err.to_string()))
    }
}
