use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Order, OrderLine};

/// Delivery details for checkout. Fields are optional at the serde layer so
/// that missing ones produce a validation error, not a deserialize rejection.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub delivery_address: Option<String>,
    pub delivery_phone: Option<String>,
    pub delivery_date: Option<NaiveDate>,
    pub delivery_time: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithLines {
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}
