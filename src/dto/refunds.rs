use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::RefundRequest;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRefundRequest {
    pub order_id: Uuid,
    pub reason: String,
    pub amount: i64,
    pub images: Option<Vec<String>>,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RejectRefundRequest {
    pub note: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefundDecision {
    pub status: String,
    pub message: String,
    pub refund_request: RefundRequest,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefundList {
    pub items: Vec<RefundRequest>,
}
