use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entity::{
    colors, discounts, order_items, order_payments, orders, payment_methods, products,
    refund_requests, shipping_addresses, sizes, users,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub promotional_price: Option<i64>,
    pub stock_quantity: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Size or color label attached to a variant.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Attribute {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductVariant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub size: Option<Attribute>,
    pub color: Option<Attribute>,
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Discount {
    pub id: Uuid,
    pub code: String,
    pub percent: i32,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub min_order_amount: i64,
    pub usage_limit: i32,
    pub used_count: i32,
    /// Empty means the code applies to every product.
    pub product_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentMethod {
    pub id: Uuid,
    pub name: String,
    pub kind: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ShippingAddress {
    pub id: Uuid,
    pub user_id: Uuid,
    pub recipient_name: String,
    pub phone: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub sku: String,
    pub shipping_id: Option<Uuid>,
    pub original_total: i64,
    pub discount_code: Option<String>,
    pub discount_amount: i64,
    pub total: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    pub price: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderPayment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: String,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub method: Option<PaymentMethod>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RefundRequest {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub reason: String,
    pub description: Option<String>,
    #[schema(value_type = Option<Vec<String>>)]
    pub images: Option<Value>,
    pub amount: i64,
    pub status: String,
    pub admin_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            name: model.name,
            role: model.role,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<products::Model> for Product {
    fn from(model: products::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            price: model.price,
            promotional_price: model.promotional_price,
            stock_quantity: model.stock_quantity,
            status: model.status,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<sizes::Model> for Attribute {
    fn from(model: sizes::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
        }
    }
}

impl From<colors::Model> for Attribute {
    fn from(model: colors::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
        }
    }
}

impl Discount {
    pub fn from_entity(model: discounts::Model, product_ids: Vec<Uuid>) -> Self {
        Self {
            id: model.id,
            code: model.code,
            percent: model.percent,
            valid_from: model.valid_from.with_timezone(&Utc),
            valid_to: model.valid_to.with_timezone(&Utc),
            min_order_amount: model.min_order_amount,
            usage_limit: model.usage_limit,
            used_count: model.used_count,
            product_ids,
        }
    }
}

impl From<payment_methods::Model> for PaymentMethod {
    fn from(model: payment_methods::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            kind: model.kind,
        }
    }
}

impl From<shipping_addresses::Model> for ShippingAddress {
    fn from(model: shipping_addresses::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            recipient_name: model.recipient_name,
            phone: model.phone,
            address: model.address,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<orders::Model> for Order {
    fn from(model: orders::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            sku: model.sku,
            shipping_id: model.shipping_id,
            original_total: model.original_total,
            discount_code: model.discount_code,
            discount_amount: model.discount_amount,
            total: model.total,
            status: model.status,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

impl From<order_items::Model> for OrderItem {
    fn from(model: order_items::Model) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            product_id: model.product_id,
            variant_id: model.variant_id,
            quantity: model.quantity,
            price: model.price,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl OrderPayment {
    pub fn from_entity(
        model: order_payments::Model,
        method: Option<payment_methods::Model>,
    ) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            status: model.status,
            transaction_id: model.transaction_id,
            paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
            method: method.map(PaymentMethod::from),
        }
    }
}

impl From<refund_requests::Model> for RefundRequest {
    fn from(model: refund_requests::Model) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            user_id: model.user_id,
            reason: model.reason,
            description: model.description,
            images: model.images,
            amount: model.amount,
            status: model.status,
            admin_note: model.admin_note,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}
