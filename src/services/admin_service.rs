use uuid::Uuid;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};
use sea_orm::sea_query::LockType;
use sea_orm::ActiveValue::Set;

use crate::{
    audit::record_audit,
    entity::{
        orders::{Column as OrderCol, Entity as Orders},
        product_variants::{ActiveModel as VariantActive, Entity as ProductVariants},
        products::{ActiveModel as ProductActive, Entity as Products},
    },
    dto::{orders::OrderDetail, products::ProductDetail},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Order, Product},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    routes::admin::{InventoryAdjustRequest, UpdateOrderStatusRequest},
    dto::orders::OrderList,
    services::{
        order_service::load_order_detail,
        payment_service::{apply_transition, lock_order_payment, parse_payment_status},
        product_service::describe_variants,
    },
    state::AppState,
    status::{OrderStatus, admin_transition},
};

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = Condition::all();
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(OrderCol::Status.eq(status.clone()));
    }

    let mut finder = Orders::find().filter(condition);

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

    let meta = Meta::new(page, limit, total);

    let order_list = OrderList { items: orders };

    Ok(ApiResponse::success("Orders", order_list, Some(meta)))
}

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderDetail>> {
    ensure_admin(user)?;
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let data = load_order_detail(&state.orm, order).await?;
    Ok(ApiResponse::success(
        "Order found",
        data,
        Some(Meta::empty()),
    ))
}

/// Fulfilment moves checked against the current order and payment state.
/// Cancelling an unpaid order restocks its items and gives the discount use
/// back in the same transaction.
pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;
    let target: OrderStatus = payload
        .status
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid order status".into()))?;

    let txn = state.orm.begin().await?;
    let (existing, payment) = lock_order_payment(&txn, id).await?;
    let current: OrderStatus = existing
        .status
        .parse()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("order {}: {e}", existing.id)))?;
    let payment_status = parse_payment_status(&payment)?;

    let transition = admin_transition(current, payment_status, target).ok_or_else(|| {
        AppError::BadRequest(format!("Order cannot move from {current} to {target}"))
    })?;

    let (order, payment) = apply_transition(&txn, existing, payment, transition, None).await?;
    txn.commit().await?;

    tracing::info!(
        order_id = %order.id,
        from = %current,
        to = %order.status,
        payment = %payment.status,
        restocked = transition.compensate,
        "order status updated"
    );
    record_audit(
        &state.pool,
        Some(user.user_id),
        "order_status_update",
        Some("orders"),
        Some(serde_json::json!({
            "order_id": order.id,
            "from": current.as_str(),
            "status": order.status,
            "payment_status": payment.status,
        })),
    )
    .await;

    Ok(ApiResponse::success(
        "Order updated",
        Order::from(order),
        Some(Meta::empty()),
    ))
}

/// Adds `delta` to a product's stock, or to one of its variants when
/// `variant_id` is given. Stock may not go negative.
pub async fn adjust_inventory(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: InventoryAdjustRequest,
) -> AppResult<ApiResponse<ProductDetail>> {
    ensure_admin(user)?;
    if payload.delta == 0 {
        return Err(AppError::BadRequest("delta must not be 0".into()));
    }

    let txn = state.orm.begin().await?;
    let product = Products::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .filter(|p| !p.is_deleted())
        .ok_or(AppError::NotFound)?;

    let product = match payload.variant_id {
        Some(variant_id) => {
            let variant = ProductVariants::find_by_id(variant_id)
                .lock(LockType::Update)
                .one(&txn)
                .await?
                .filter(|v| v.product_id == product.id)
                .ok_or(AppError::Missing("Product variant", variant_id))?;

            let new_quantity = variant.quantity + payload.delta;
            if new_quantity < 0 {
                return Err(AppError::BadRequest("stock cannot be negative".into()));
            }
            let mut active: VariantActive = variant.into();
            active.quantity = Set(new_quantity);
            active.update(&txn).await?;
            product
        }
        None => {
            let new_stock = product.stock_quantity + payload.delta;
            if new_stock < 0 {
                return Err(AppError::BadRequest("stock cannot be negative".into()));
            }
            let mut active: ProductActive = product.into();
            active.stock_quantity = Set(new_stock);
            active.update(&txn).await?
        }
    };

    let variants = product_variants_of(&txn, product.id).await?;
    let variants = describe_variants(&txn, variants).await?;

    txn.commit().await?;

    record_audit(
        &state.pool,
        Some(user.user_id),
        "inventory_adjust",
        Some("products"),
        Some(serde_json::json!({
            "product_id": product.id,
            "variant_id": payload.variant_id,
            "delta": payload.delta,
        })),
    )
    .await;

    Ok(ApiResponse::success(
        "Inventory updated",
        ProductDetail {
            product: Product::from(product),
            variants,
        },
        Some(Meta::empty()),
    ))
}

async fn product_variants_of(
    txn: &sea_orm::DatabaseTransaction,
    product_id: Uuid,
) -> AppResult<Vec<crate::entity::product_variants::Model>> {
    use crate::entity::product_variants::Column as VariantCol;

    Ok(ProductVariants::find()
        .filter(VariantCol::ProductId.eq(product_id))
        .order_by_asc(VariantCol::CreatedAt)
        .all(txn)
        .await?)
}
