use axum::{Json, Router, extract::State, routing::get};

use crate::{
    dto::refunds::{CreateRefundRequest, RefundList},
    error::AppResult,
    middleware::auth::AuthUser,
    models::RefundRequest,
    response::{ApiResponse, Created, created},
    services::refund_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_own).post(create_refund_request))
}

#[utoipa::path(
    post,
    path = "/api/refund-requests",
    request_body = CreateRefundRequest,
    responses(
        (status = 201, description = "Refund request filed", body = ApiResponse<RefundRequest>),
        (status = 404, description = "Order not found"),
        (status = 422, description = "Duplicate request or amount above order total")
    ),
    security(("bearer_auth" = [])),
    tag = "Refunds"
)]
pub async fn create_refund_request(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateRefundRequest>,
) -> AppResult<Created<RefundRequest>> {
    let resp = refund_service::create_refund_request(&state, &user, payload).await?;
    Ok(created(resp))
}

#[utoipa::path(
    get,
    path = "/api/refund-requests",
    responses(
        (status = 200, description = "List own refund requests", body = ApiResponse<RefundList>),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Refunds"
)]
pub async fn list_own(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<RefundList>>> {
    let resp = refund_service::list_own_refund_requests(&state, &user).await?;
    Ok(Json(resp))
}
