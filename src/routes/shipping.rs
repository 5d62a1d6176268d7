use axum::{Json, Router, extract::State, routing::get};

use crate::{
    dto::shipping::{CreateShippingAddressRequest, ShippingAddressList},
    error::AppResult,
    middleware::auth::AuthUser,
    models::ShippingAddress,
    response::{ApiResponse, Created, created},
    services::shipping_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_addresses).post(create_address))
}

#[utoipa::path(
    get,
    path = "/api/shipping-addresses",
    responses(
        (status = 200, description = "List own shipping addresses", body = ApiResponse<ShippingAddressList>),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Shipping"
)]
pub async fn list_addresses(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<ShippingAddressList>>> {
    let resp = shipping_service::list_addresses(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/shipping-addresses",
    request_body = CreateShippingAddressRequest,
    responses(
        (status = 201, description = "Create shipping address", body = ApiResponse<ShippingAddress>),
        (status = 401, description = "Unauthorized"),
        (status = 422, description = "Missing fields")
    ),
    security(("bearer_auth" = [])),
    tag = "Shipping"
)]
pub async fn create_address(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateShippingAddressRequest>,
) -> AppResult<Created<ShippingAddress>> {
    let resp = shipping_service::create_address(&state, &user, payload).await?;
    Ok(created(resp))
}
