pub mod admin_service;
pub mod auth_service;
pub mod discount_service;
pub mod order_service;
pub mod payment_service;
pub mod product_service;
pub mod refund_service;
pub mod shipping_service;
pub mod token_service;
