use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartItemView {
    pub product_id: Uuid,
    pub name: String,
    /// Current catalog price per unit, not a snapshot.
    pub price: i64,
    pub quantity: i32,
    pub item_total: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub total_items: i32,
    pub total_price: i64,
}
