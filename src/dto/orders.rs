use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Order, OrderItem, OrderPayment, Product, ProductVariant, ShippingAddress};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CheckoutItem {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub items: Vec<CheckoutItem>,
    pub shipping_id: Uuid,
    pub payment_method_id: Uuid,
    pub discount_code: Option<String>,
}

impl CheckoutRequest {
    /// Shape checks that run before any database work.
    pub fn validate(&self) -> AppResult<()> {
        if self.items.is_empty() {
            return Err(AppError::Validation("items must not be empty".into()));
        }
        if let Some(item) = self.items.iter().find(|i| i.quantity <= 0) {
            return Err(AppError::Validation(format!(
                "quantity for product {} must be greater than 0",
                item.product_id
            )));
        }
        Ok(())
    }

    /// Discount code with surrounding whitespace removed; blank counts as absent.
    pub fn discount_code(&self) -> Option<&str> {
        self.discount_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderItemDetail {
    #[serde(flatten)]
    pub item: OrderItem,
    pub product: Option<Product>,
    pub variant: Option<ProductVariant>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItemDetail>,
    pub shipping: Option<ShippingAddress>,
    pub payment: Option<OrderPayment>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PlaceOrderResponse {
    pub order: OrderDetail,
    pub payment_url: Option<String>,
    pub original_total: i64,
    pub discount_amount: i64,
    pub final_total: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentStatusResponse {
    pub order_status: String,
    pub payment_status: String,
    #[schema(value_type = Object)]
    pub zalopay_response: Value,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}

/// Server-to-server notification posted by the gateway after payment.
#[derive(Debug, Deserialize, ToSchema)]
pub struct GatewayCallback {
    pub data: String,
    pub mac: String,
    #[serde(rename = "type", default)]
    pub kind: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GatewayCallbackAck {
    pub return_code: i32,
    pub return_message: String,
}
