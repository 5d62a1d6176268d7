use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::discounts::{CheckDiscountRequest, DiscountCheckResponse},
    error::AppResult,
    response::ApiResponse,
    services::discount_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/check", post(check_discount))
}

#[utoipa::path(
    post,
    path = "/api/discounts/check",
    request_body = CheckDiscountRequest,
    responses(
        (status = 200, description = "Preview a discount code against a cart", body = ApiResponse<DiscountCheckResponse>)
    ),
    tag = "Discounts"
)]
pub async fn check_discount(
    State(state): State<AppState>,
    Json(payload): Json<CheckDiscountRequest>,
) -> AppResult<Json<ApiResponse<DiscountCheckResponse>>> {
    let resp = discount_service::check_discount(&state, payload).await?;
    Ok(Json(resp))
}
