use axum::Router;

use crate::state::AppState;

pub mod admin;
pub mod auth;
pub mod discounts;
pub mod doc;
pub mod health;
pub mod orders;
pub mod params;
pub mod payments;
pub mod products;
pub mod refunds;
pub mod shipping;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/products", products::router())
        .nest("/shipping-addresses", shipping::router())
        .nest("/discounts", discounts::router())
        .nest("/orders", orders::router())
        .nest("/payments", payments::router())
        .nest("/refund-requests", refunds::router())
        .nest("/admin", admin::router())
}
