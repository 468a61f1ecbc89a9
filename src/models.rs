use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Per-unit price in minor currency units.
    pub price: i64,
    /// Single source of truth for stock; mutated only through the ledger.
    pub available_quantity: i32,
    pub created_at: DateTime<Utc>,
}

/// A customer's open cart. At most one per customer; consumed by checkout.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Cart {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct CartLine {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "order_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    New,
    Processing,
    Fulfilled,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Processing => "processing",
            OrderStatus::Fulfilled => "fulfilled",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Whether an order in this status still holds reserved warehouse stock.
    /// Fulfilled orders deducted stock too, but the goods have left the
    /// warehouse and cannot be returned to `available_quantity`.
    pub fn holds_stock(&self) -> bool {
        matches!(self, OrderStatus::New | OrderStatus::Processing)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(OrderStatus::New),
            "processing" => Ok(OrderStatus::Processing),
            "fulfilled" => Ok(OrderStatus::Fulfilled),
            "cancelled" => Ok(OrderStatus::Cancelled),
            _ => Err(()),
        }
    }
}

/// Committed order. Created whole by cart promotion at checkout; after that
/// only `status` ever changes.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    /// Frozen at checkout; catalog price changes never touch it.
    pub total_price: i64,
    pub delivery_address: String,
    pub delivery_phone: String,
    pub delivery_date: NaiveDate,
    pub delivery_time: String,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct OrderLine {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    /// Per-unit price snapshot taken at checkout.
    pub price: i64,
    pub created_at: DateTime<Utc>,
}
