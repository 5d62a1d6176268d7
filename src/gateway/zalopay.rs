use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::Sha256;
use uuid::Uuid;

use super::{
    GatewayError, GatewayStatus, InitiatedPayment, PaymentGateway, PaymentInitiation,
    RefundInstruction, RefundOutcome,
};
use crate::config::ZaloPayConfig;

type HmacSha256 = Hmac<Sha256>;

/// ZaloPay v2 client. Requests are signed with `key1`, callbacks with `key2`.
#[derive(Clone)]
pub struct ZaloPayGateway {
    client: reqwest::Client,
    config: ZaloPayConfig,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    return_code: i32,
    #[serde(default)]
    order_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    return_code: i32,
    #[serde(default)]
    zp_trans_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    return_code: i32,
}

/// Callback payload carried as a JSON string in the `data` field.
#[derive(Debug, Deserialize)]
pub struct CallbackData {
    pub app_trans_id: String,
    #[serde(default)]
    pub zp_trans_id: Option<Value>,
    #[serde(default)]
    pub amount: Option<i64>,
}

impl ZaloPayGateway {
    pub fn new(config: ZaloPayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    fn sign(key: &str, data: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(data.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn ensure_configured(&self) -> Result<(), GatewayError> {
        if self.config.key1.is_empty() {
            return Err(GatewayError::Misconfigured("ZALOPAY_KEY1 is empty".into()));
        }
        Ok(())
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<(T, Value), GatewayError> {
        let url = format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path);
        let raw: Value = self
            .client
            .post(url)
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let parsed = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok((parsed, raw))
    }
}

fn vietnam_now() -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(7 * 3600).expect("UTC+7 is a valid offset");
    Utc::now().with_timezone(&offset)
}

/// `yyMMdd_<sku>`, the merchant transaction id format the gateway requires.
pub fn build_app_trans_id(now: DateTime<FixedOffset>, order_sku: &str) -> String {
    format!("{}_{}", now.format("%y%m%d"), order_sku)
}

/// `yyMMdd_<app id>_<16 hex digits>`, the merchant refund id format.
pub fn build_m_refund_id(now: DateTime<FixedOffset>, app_id: i64, nonce: Uuid) -> String {
    let suffix = nonce.simple().to_string();
    format!("{}_{}_{}", now.format("%y%m%d"), app_id, &suffix[..16])
}

pub fn create_mac_input(
    app_id: i64,
    app_trans_id: &str,
    app_user: &str,
    amount: i64,
    app_time: i64,
    embed_data: &str,
    item: &str,
) -> String {
    format!("{app_id}|{app_trans_id}|{app_user}|{amount}|{app_time}|{embed_data}|{item}")
}

/// Query codes are 1 paid, 2 failed, 3 not yet paid. Local reconciliation
/// reads 1 success, 2 pending, anything else failed, so 2 and 3 swap.
pub fn normalize_query_code(code: i32) -> i32 {
    match code {
        1 => 1,
        3 => 2,
        _ => 0,
    }
}

fn reference_text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) if n.as_i64() != Some(0) => Some(n.to_string()),
        _ => None,
    }
}

impl CallbackData {
    pub fn gateway_reference(&self) -> Option<String> {
        reference_text(self.zp_trans_id.clone())
    }
}

#[async_trait]
impl PaymentGateway for ZaloPayGateway {
    #[tracing::instrument(skip(self, request), fields(order_sku = %request.order_sku, amount = request.amount))]
    async fn initiate_payment(
        &self,
        request: &PaymentInitiation,
    ) -> Result<InitiatedPayment, GatewayError> {
        self.ensure_configured()?;
        let now = vietnam_now();
        let app_trans_id = build_app_trans_id(now, &request.order_sku);
        let app_time = now.timestamp_millis();
        let app_user = request.user_id.to_string();
        let embed_data = json!({
            "redirecturl": self.config.redirect_url.clone().unwrap_or_default(),
            "order_id": request.order_id,
        })
        .to_string();
        let item = "[]".to_string();

        let mac = Self::sign(
            &self.config.key1,
            &create_mac_input(
                self.config.app_id,
                &app_trans_id,
                &app_user,
                request.amount,
                app_time,
                &embed_data,
                &item,
            ),
        );

        let mut body = json!({
            "app_id": self.config.app_id,
            "app_user": app_user,
            "app_trans_id": app_trans_id,
            "app_time": app_time,
            "amount": request.amount,
            "item": item,
            "embed_data": embed_data,
            "description": request.description,
            "bank_code": "",
            "mac": mac,
        });
        if let Some(callback_url) = &self.config.callback_url {
            body["callback_url"] = json!(callback_url);
        }

        let (resp, raw): (CreateResponse, Value) = self.post("create", &body).await?;
        tracing::debug!(return_code = resp.return_code, "gateway create answered");

        Ok(InitiatedPayment {
            return_code: resp.return_code,
            order_url: resp.order_url,
            transaction_id: app_trans_id,
            raw,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn search_status(&self, transaction_id: &str) -> Result<GatewayStatus, GatewayError> {
        self.ensure_configured()?;
        let mac = Self::sign(
            &self.config.key1,
            &format!("{}|{}|{}", self.config.app_id, transaction_id, self.config.key1),
        );
        let body = json!({
            "app_id": self.config.app_id,
            "app_trans_id": transaction_id,
            "mac": mac,
        });

        let (resp, raw): (QueryResponse, Value) = self.post("query", &body).await?;
        Ok(GatewayStatus {
            return_code: normalize_query_code(resp.return_code),
            gateway_reference: reference_text(resp.zp_trans_id),
            raw,
        })
    }

    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id, amount = request.amount))]
    async fn refund(&self, request: &RefundInstruction) -> Result<RefundOutcome, GatewayError> {
        self.ensure_configured()?;
        let now = vietnam_now();
        let timestamp = now.timestamp_millis();
        let mac = Self::sign(
            &self.config.key1,
            &format!(
                "{}|{}|{}|{}|{}",
                self.config.app_id,
                request.gateway_reference,
                request.amount,
                request.description,
                timestamp
            ),
        );
        let body = json!({
            "app_id": self.config.app_id,
            "m_refund_id": request.refund_reference,
            "zp_trans_id": request.gateway_reference,
            "amount": request.amount,
            "timestamp": timestamp,
            "description": request.description,
            "mac": mac,
        });

        let (resp, raw): (RefundResponse, Value) = self.post("refund", &body).await?;
        // 3 means the refund is queued on the gateway side.
        let accepted = matches!(resp.return_code, 1 | 3);
        Ok(RefundOutcome {
            return_code: resp.return_code,
            accepted,
            raw,
        })
    }

    fn new_refund_reference(&self) -> String {
        build_m_refund_id(vietnam_now(), self.config.app_id, Uuid::new_v4())
    }

    fn verify_callback(&self, data: &str, mac: &str) -> bool {
        let Ok(expected) = hex::decode(mac) else {
            return false;
        };
        let Ok(mut hmac) = HmacSha256::new_from_slice(self.config.key2.as_bytes()) else {
            return false;
        };
        hmac.update(data.as_bytes());
        hmac.verify_slice(&expected).is_ok()
    }
}
