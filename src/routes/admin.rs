use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch, post},
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::discounts::CreateDiscountRequest,
    dto::orders::{OrderDetail, OrderList},
    dto::products::ProductDetail,
    dto::refunds::{RefundDecision, RefundList, RejectRefundRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    models::{Discount, Order},
    response::{ApiResponse, Created, created},
    routes::params::{OrderListQuery, RefundListQuery},
    services::{admin_service, discount_service, refund_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_all_orders))
        .route("/orders/{id}", get(get_order_admin))
        .route("/orders/{id}/status", patch(update_order_status))
        .route("/inventory/{id}", patch(adjust_inventory))
        .route("/discounts", post(create_discount))
        .route("/refund-requests", get(list_refund_requests))
        .route("/refund-requests/{id}/approve", post(approve_refund_request))
        .route("/refund-requests/{id}/reject", post(reject_refund_request))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InventoryAdjustRequest {
    pub delta: i32,
    pub variant_id: Option<Uuid>,
}

#[utoipa::path(
    get,
    path = "/api/admin/orders",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("status" = Option<String>, Query, description = "Filter by status"),
        ("sort_order" = Option<String>, Query, description = "Sort order: asc, desc")
    ),
    responses(
    (status = 200, description = "Get all orders (admin only)", body = ApiResponse<OrderList>),
    (status = 403, description = "Forbidden"),
    (status = 500, description = "Internal Server Error"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_all_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = admin_service::list_all_orders(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/admin/orders/{id}",
    params(
    (
        "id" = Uuid, Path, description = "Order ID")
    ),
    responses(
    (status = 200, description = "Get any order with items (admin only)", body = ApiResponse<OrderDetail>),
    (status = 404, description = "Not Found", ),
    (status = 403, description = "Forbidden", ),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"

)]
pub async fn get_order_admin(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<OrderDetail>>> {
    let resp = admin_service::get_order_admin(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/admin/orders/{id}/status",
    params(
    (
        "id" = Uuid, Path, description = "Order ID")
    ),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Update fulfilment status", body = ApiResponse<Order>),
        (status = 400, description = "Unknown status or transition not allowed from the current state"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let resp = admin_service::update_order_status(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/admin/inventory/{id}",
    params(
    (
        "id" = Uuid, Path, description = "Product ID")
    ),
    request_body = InventoryAdjustRequest,
    responses(
        (status = 200, description = "Adjust product or variant stock", body = ApiResponse<ProductDetail>),
        (status = 400, description = "Invalid adjustment"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn adjust_inventory(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<InventoryAdjustRequest>,
) -> AppResult<Json<ApiResponse<ProductDetail>>> {
    let resp = admin_service::adjust_inventory(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/admin/discounts",
    request_body = CreateDiscountRequest,
    responses(
        (status = 201, description = "Create discount code", body = ApiResponse<Discount>),
        (status = 400, description = "Code already exists"),
        (status = 403, description = "Forbidden"),
        (status = 422, description = "Invalid discount"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn create_discount(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateDiscountRequest>,
) -> AppResult<Created<Discount>> {
    let resp = discount_service::create_discount(&state, &user, payload).await?;
    Ok(created(resp))
}

#[utoipa::path(
    get,
    path = "/api/admin/refund-requests",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("status" = Option<String>, Query, description = "Filter by status: pending, approved, rejected")
    ),
    responses(
        (status = 200, description = "List refund requests", body = ApiResponse<RefundList>),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_refund_requests(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<RefundListQuery>,
) -> AppResult<Json<ApiResponse<RefundList>>> {
    let resp = refund_service::list_refund_requests(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/admin/refund-requests/{id}/approve",
    params(
        ("id" = Uuid, Path, description = "Refund request ID")
    ),
    responses(
        (status = 200, description = "Approve refund", body = ApiResponse<RefundDecision>),
        (status = 400, description = "Request already decided"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
        (status = 500, description = "Gateway refused the refund"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn approve_refund_request(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<RefundDecision>>> {
    let resp = refund_service::approve_refund_request(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/admin/refund-requests/{id}/reject",
    params(
        ("id" = Uuid, Path, description = "Refund request ID")
    ),
    request_body = RejectRefundRequest,
    responses(
        (status = 200, description = "Reject refund", body = ApiResponse<RefundDecision>),
        (status = 400, description = "Request already decided"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not Found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn reject_refund_request(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<RejectRefundRequest>>,
) -> AppResult<Json<ApiResponse<RefundDecision>>> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let resp = refund_service::reject_refund_request(&state, &user, id, payload).await?;
    Ok(Json(resp))
}
