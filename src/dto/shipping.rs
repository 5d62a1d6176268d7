use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::ShippingAddress;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateShippingAddressRequest {
    pub recipient_name: String,
    pub phone: String,
    pub address: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ShippingAddressList {
    pub items: Vec<ShippingAddress>,
}
