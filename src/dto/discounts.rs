use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Discount;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckDiscountRequest {
    pub code: String,
    pub subtotal: i64,
    #[serde(default)]
    pub product_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DiscountCheckResponse {
    pub valid: bool,
    pub discount: Option<Discount>,
    pub discount_amount: Option<i64>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDiscountRequest {
    pub code: String,
    pub percent: i32,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    #[serde(default)]
    pub min_order_amount: i64,
    pub usage_limit: i32,
    #[serde(default)]
    pub product_ids: Vec<Uuid>,
}
