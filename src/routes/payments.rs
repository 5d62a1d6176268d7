use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::orders::{GatewayCallback, GatewayCallbackAck},
    services::payment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/zalopay/callback", post(zalopay_callback))
}

/// Server-to-server notification from the gateway. Always answers 200; the
/// outcome travels in `return_code`.
#[utoipa::path(
    post,
    path = "/api/payments/zalopay/callback",
    request_body = GatewayCallback,
    responses(
        (status = 200, description = "Callback acknowledgement", body = GatewayCallbackAck)
    ),
    tag = "Payments"
)]
pub async fn zalopay_callback(
    State(state): State<AppState>,
    Json(payload): Json<GatewayCallback>,
) -> Json<GatewayCallbackAck> {
    Json(payment_service::handle_gateway_callback(&state, payload).await)
}
