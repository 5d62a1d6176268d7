//! Payment gateway seam. Checkout, reconciliation and refunds only talk to
//! [`PaymentGateway`]; `zalopay` is the production implementation.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

pub mod zalopay;

pub use zalopay::ZaloPayGateway;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gateway returned an unreadable response: {0}")]
    Decode(String),

    #[error("gateway is not configured: {0}")]
    Misconfigured(String),
}

/// Everything the gateway needs to open a payment session for an order.
#[derive(Debug, Clone)]
pub struct PaymentInitiation {
    pub order_id: Uuid,
    pub order_sku: String,
    pub user_id: Uuid,
    /// Amount in the smallest currency unit.
    pub amount: i64,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct InitiatedPayment {
    pub return_code: i32,
    pub order_url: Option<String>,
    /// Merchant-side transaction id later used for status queries.
    pub transaction_id: String,
    pub raw: Value,
}

impl InitiatedPayment {
    pub fn is_success(&self) -> bool {
        self.return_code == 1
    }
}

#[derive(Debug, Clone)]
pub struct GatewayStatus {
    pub return_code: i32,
    /// Gateway-side transaction id, required to refund.
    pub gateway_reference: Option<String>,
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct RefundInstruction {
    pub order_id: Uuid,
    /// Merchant refund id. Resending the same id lets the gateway dedupe retries.
    pub refund_reference: String,
    pub gateway_reference: String,
    pub amount: i64,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub return_code: i32,
    pub accepted: bool,
    pub raw: Value,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initiate_payment(
        &self,
        request: &PaymentInitiation,
    ) -> Result<InitiatedPayment, GatewayError>;

    async fn search_status(&self, transaction_id: &str) -> Result<GatewayStatus, GatewayError>;

    async fn refund(&self, request: &RefundInstruction) -> Result<RefundOutcome, GatewayError>;

    /// Fresh merchant refund id. Callers store it and resend the same id
    /// until the gateway gives a definite answer.
    fn new_refund_reference(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Checks the signature the gateway attaches to its server callbacks.
    fn verify_callback(&self, data: &str, mac: &str) -> bool;
}
