use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{Product, ProductVariant};

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct ProductList {
    #[schema(value_type = Vec<Product>)]
    pub items: Vec<Product>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductDetail {
    pub product: Product,
    pub variants: Vec<ProductVariant>,
}
