pub mod auth;
pub mod discounts;
pub mod orders;
pub mod products;
pub mod refunds;
pub mod shipping;
