use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, Set};
use uuid::Uuid;

use crate::{
    dto::shipping::{CreateShippingAddressRequest, ShippingAddressList},
    entity::shipping_addresses::{
        ActiveModel as AddressActive, Column as AddressCol, Entity as ShippingAddresses,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::ShippingAddress,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub async fn list_addresses(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<ShippingAddressList>> {
    let items = ShippingAddresses::find()
        .filter(AddressCol::UserId.eq(user.user_id))
        .order_by_desc(AddressCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(ShippingAddress::from)
        .collect();

    Ok(ApiResponse::success(
        "Shipping addresses",
        ShippingAddressList { items },
        Some(Meta::empty()),
    ))
}

pub async fn create_address(
    state: &AppState,
    user: &AuthUser,
    payload: CreateShippingAddressRequest,
) -> AppResult<ApiResponse<ShippingAddress>> {
    let recipient_name = payload.recipient_name.trim().to_string();
    let phone = payload.phone.trim().to_string();
    let address = payload.address.trim().to_string();
    if recipient_name.is_empty() || phone.is_empty() || address.is_empty() {
        return Err(AppError::Validation(
            "recipient_name, phone and address are required".into(),
        ));
    }

    let model = AddressActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        recipient_name: Set(recipient_name),
        phone: Set(phone),
        address: Set(address),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(ApiResponse::success(
        "Shipping address created",
        ShippingAddress::from(model),
        Some(Meta::empty()),
    ))
}

/// Ownership check used by checkout.
pub fn owned_by(user_id: Uuid, address_id: Uuid) -> Condition {
    Condition::all()
        .add(AddressCol::Id.eq(address_id))
        .add(AddressCol::UserId.eq(user_id))
}
