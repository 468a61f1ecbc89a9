use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::audit::AuditEntry;
use crate::error::{AppError, AppResult};
use crate::models::{Cart, CartLine, Order, OrderLine, OrderStatus, Product};

use super::{NewOrder, OrderFilter, PricedLine, SortOrder, Store, StoreTxn};

/// In-memory store for tests. A single mutex over the whole state stands in
/// for row locks: a unit of work holds the guard for its entire lifetime, so
/// concurrent transactions serialize and the reserve contract holds.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Clone, Default)]
struct MemoryState {
    products: HashMap<Uuid, Product>,
    carts: Vec<Cart>,
    cart_lines: Vec<CartLine>,
    orders: HashMap<Uuid, Order>,
    order_lines: Vec<OrderLine>,
    audit: Vec<AuditEntry>,
}

impl MemoryState {
    fn priced_lines(&self, cart_id: Uuid) -> AppResult<Vec<PricedLine>> {
        self.cart_lines
            .iter()
            .filter(|line| line.cart_id == cart_id)
            .map(|line| {
                let product = self
                    .products
                    .get(&line.product_id)
                    .ok_or_else(|| AppError::NotFound("product not found".to_string()))?;
                Ok(PricedLine {
                    product_id: line.product_id,
                    name: product.name.clone(),
                    price: product.price,
                    quantity: line.quantity,
                })
            })
            .collect()
    }

    fn lines_of(&self, order_id: Uuid) -> Vec<OrderLine> {
        self.order_lines
            .iter()
            .filter(|line| line.order_id == order_id)
            .cloned()
            .collect()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a product. In production the catalog collaborator owns this.
    pub async fn insert_product(&self, name: &str, price: i64, available_quantity: i32) -> Product {
        let product = Product {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            price,
            available_quantity,
            created_at: Utc::now(),
        };
        self.state
            .lock()
            .await
            .products
            .insert(product.id, product.clone());
        product
    }

    /// Repoint a product's catalog price, as the external catalog would.
    pub async fn set_price(&self, product_id: Uuid, price: i64) {
        if let Some(product) = self.state.lock().await.products.get_mut(&product_id) {
            product.price = price;
        }
    }

    pub async fn audit_len(&self) -> usize {
        self.state.lock().await.audit.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTxn>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let snapshot = guard.clone();
        Ok(Box::new(MemoryTxn {
            guard,
            snapshot: Some(snapshot),
        }))
    }

    async fn product(&self, id: Uuid) -> AppResult<Option<Product>> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn products(&self, limit: i64, offset: i64) -> AppResult<(Vec<Product>, i64)> {
        let state = self.state.lock().await;
        let mut items: Vec<Product> = state.products.values().cloned().collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = items.len() as i64;
        let items = items
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((items, total))
    }

    async fn find_cart(&self, customer_id: Uuid) -> AppResult<Option<Cart>> {
        Ok(self
            .state
            .lock()
            .await
            .carts
            .iter()
            .find(|cart| cart.customer_id == customer_id)
            .cloned())
    }

    async fn create_cart(&self, customer_id: Uuid) -> AppResult<Cart> {
        let cart = Cart {
            id: Uuid::new_v4(),
            customer_id,
            created_at: Utc::now(),
        };
        self.state.lock().await.carts.push(cart.clone());
        Ok(cart)
    }

    async fn cart_line(&self, cart_id: Uuid, product_id: Uuid) -> AppResult<Option<CartLine>> {
        Ok(self
            .state
            .lock()
            .await
            .cart_lines
            .iter()
            .find(|line| line.cart_id == cart_id && line.product_id == product_id)
            .cloned())
    }

    async fn set_cart_line(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> AppResult<CartLine> {
        let mut state = self.state.lock().await;
        if let Some(line) = state
            .cart_lines
            .iter_mut()
            .find(|line| line.cart_id == cart_id && line.product_id == product_id)
        {
            line.quantity = quantity;
            return Ok(line.clone());
        }
        let line = CartLine {
            id: Uuid::new_v4(),
            cart_id,
            product_id,
            quantity,
            created_at: Utc::now(),
        };
        state.cart_lines.push(line.clone());
        Ok(line)
    }

    async fn delete_cart_line(&self, cart_id: Uuid, product_id: Uuid) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.cart_lines.len();
        state
            .cart_lines
            .retain(|line| !(line.cart_id == cart_id && line.product_id == product_id));
        Ok(state.cart_lines.len() < before)
    }

    async fn clear_cart_lines(&self, cart_id: Uuid) -> AppResult<()> {
        self.state
            .lock()
            .await
            .cart_lines
            .retain(|line| line.cart_id != cart_id);
        Ok(())
    }

    async fn cart_lines_priced(&self, cart_id: Uuid) -> AppResult<Vec<PricedLine>> {
        self.state.lock().await.priced_lines(cart_id)
    }

    async fn order(&self, id: Uuid) -> AppResult<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn order_lines(&self, order_id: Uuid) -> AppResult<Vec<OrderLine>> {
        Ok(self.state.lock().await.lines_of(order_id))
    }

    async fn orders(&self, filter: &OrderFilter) -> AppResult<(Vec<Order>, i64)> {
        let state = self.state.lock().await;
        let mut items: Vec<Order> = state
            .orders
            .values()
            .filter(|order| {
                filter
                    .customer_id
                    .is_none_or(|customer_id| order.customer_id == customer_id)
                    && filter.status.is_none_or(|status| order.status == status)
            })
            .cloned()
            .collect();
        match filter.sort {
            SortOrder::Asc => items.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            SortOrder::Desc => items.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        }
        let total = items.len() as i64;
        let (limit, offset) = filter.limit_offset();
        let items = items
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((items, total))
    }

    async fn record_audit(&self, entry: AuditEntry) -> AppResult<()> {
        self.state.lock().await.audit.push(entry);
        Ok(())
    }
}

struct MemoryTxn {
    guard: OwnedMutexGuard<MemoryState>,
    /// State as of `begin`; restored on drop unless committed.
    snapshot: Option<MemoryState>,
}

impl Drop for MemoryTxn {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
    }
}

#[async_trait]
impl StoreTxn for MemoryTxn {
    async fn reserve(&mut self, product_id: Uuid, quantity: i32) -> AppResult<()> {
        let product = self
            .guard
            .products
            .get_mut(&product_id)
            .ok_or_else(|| AppError::NotFound("product not found".to_string()))?;
        if product.available_quantity < quantity {
            return Err(AppError::InsufficientStock {
                name: product.name.clone(),
                requested: quantity,
                available: product.available_quantity,
            });
        }
        product.available_quantity -= quantity;
        Ok(())
    }

    async fn release(&mut self, product_id: Uuid, quantity: i32) -> AppResult<()> {
        let product = self
            .guard
            .products
            .get_mut(&product_id)
            .ok_or_else(|| AppError::NotFound("product not found".to_string()))?;
        product.available_quantity += quantity;
        Ok(())
    }

    async fn cart_lines_priced(&mut self, cart_id: Uuid) -> AppResult<Vec<PricedLine>> {
        self.guard.priced_lines(cart_id)
    }

    async fn insert_order(&mut self, order: NewOrder) -> AppResult<Order> {
        let order = Order {
            id: Uuid::new_v4(),
            customer_id: order.customer_id,
            status: OrderStatus::New,
            total_price: order.total_price,
            delivery_address: order.delivery_address,
            delivery_phone: order.delivery_phone,
            delivery_date: order.delivery_date,
            delivery_time: order.delivery_time,
            comment: order.comment,
            created_at: Utc::now(),
        };
        self.guard.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn insert_order_lines(&mut self, order_id: Uuid, lines: &[PricedLine]) -> AppResult<()> {
        for line in lines {
            self.guard.order_lines.push(OrderLine {
                id: Uuid::new_v4(),
                order_id,
                product_id: line.product_id,
                quantity: line.quantity,
                price: line.price,
                created_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn delete_cart(&mut self, cart_id: Uuid) -> AppResult<()> {
        self.guard.carts.retain(|cart| cart.id != cart_id);
        self.guard.cart_lines.retain(|line| line.cart_id != cart_id);
        Ok(())
    }

    async fn order_for_update(&mut self, order_id: Uuid) -> AppResult<Option<Order>> {
        Ok(self.guard.orders.get(&order_id).cloned())
    }

    async fn order_lines(&mut self, order_id: Uuid) -> AppResult<Vec<OrderLine>> {
        Ok(self.guard.lines_of(order_id))
    }

    async fn set_order_status(&mut self, order_id: Uuid, status: OrderStatus) -> AppResult<Order> {
        let order = self
            .guard
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound("order not found".to_string()))?;
        order.status = status;
        Ok(order.clone())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let mut this = self;
        this.snapshot = None;
        Ok(())
    }
}
