use std::collections::HashMap;

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::record_audit,
    dto::orders::{CheckoutItem, CheckoutRequest, OrderDetail, OrderItemDetail, OrderList, PlaceOrderResponse},
    entity::{
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems, Model as OrderItemModel},
        order_payments::{ActiveModel as PaymentActive, Column as PaymentCol, Entity as OrderPayments},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        payment_methods::Entity as PaymentMethods,
        product_variants::{Column as VariantCol, Entity as ProductVariants},
        products::{Column as ProdCol, Entity as Products},
        shipping_addresses::Entity as ShippingAddresses,
    },
    error::{AppError, AppResult},
    gateway::PaymentInitiation,
    middleware::auth::AuthUser,
    models::{Order, OrderItem, OrderPayment, Product, ShippingAddress},
    notifications::{NotificationKind, notify},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::{discount_service, product_service::describe_variants, shipping_service},
    state::AppState,
    status::{PaymentMethodKind, PaymentStatus, initial_status},
};

/// One validated cart line, priced at the moment of checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: i64,
    /// Stock observed while validating, reported back on a failed decrement.
    pub available: i32,
}

impl PricedLine {
    pub fn line_total(&self) -> i64 {
        self.unit_price * i64::from(self.quantity)
    }
}

pub fn original_total(lines: &[PricedLine]) -> i64 {
    lines.iter().map(PricedLine::line_total).sum()
}

/// `ORD-<yyyymmdd>-<first 16 hex digits of the order id>`.
pub fn build_sku(order_id: Uuid) -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = order_id.simple().to_string().to_uppercase();
    format!("ORD-{}-{}", date, &suffix[..16])
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(OrderCol::Status.eq(status.clone()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
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
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderDetail>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let detail = load_order_detail(&state.orm, order).await?;
    Ok(ApiResponse::success("OK", detail, Some(Meta::empty())))
}

/// Places an order: validates and prices the cart, applies the discount,
/// writes order, items, stock and payment, and for gateway methods opens a
/// payment session. Everything happens in one transaction; any failure,
/// including a refused payment session, leaves no trace.
pub async fn place_order(
    state: &AppState,
    user: &AuthUser,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<PlaceOrderResponse>> {
    payload.validate()?;

    let txn = state.orm.begin().await?;
    let placed = match checkout_in(state, &txn, user, &payload).await {
        Ok(placed) => placed,
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                tracing::warn!(error = %rollback_err, "checkout rollback failed");
            }
            tracing::info!(user_id = %user.user_id, error = %err, "checkout aborted");
            return Err(err);
        }
    };
    txn.commit().await?;

    tracing::info!(
        order_id = %placed.order.id,
        sku = %placed.order.sku,
        total = placed.order.total,
        status = %placed.order.status,
        "order placed"
    );

    notify(
        &state.pool,
        user.user_id,
        NotificationKind::OrderPlaced,
        "Order placed",
        &format!(
            "Your order {} totalling {} has been received.",
            placed.order.sku, placed.order.total
        ),
    )
    .await;
    record_audit(
        &state.pool,
        Some(user.user_id),
        "order_placed",
        Some("orders"),
        Some(serde_json::json!({
            "order_id": placed.order.id,
            "total": placed.order.total,
            "discount_code": placed.order.discount_code,
        })),
    )
    .await;

    let original_total = placed.order.original_total;
    let discount_amount = placed.order.discount_amount;
    let final_total = placed.order.total;
    let detail = load_order_detail(&state.orm, placed.order).await?;

    Ok(ApiResponse::success(
        "Order created",
        PlaceOrderResponse {
            order: detail,
            payment_url: placed.payment_url,
            original_total,
            discount_amount,
            final_total,
        },
        Some(Meta::empty()),
    ))
}

struct PlacedOrder {
    order: OrderModel,
    payment_url: Option<String>,
}

async fn checkout_in(
    state: &AppState,
    txn: &DatabaseTransaction,
    user: &AuthUser,
    payload: &CheckoutRequest,
) -> AppResult<PlacedOrder> {
    ShippingAddresses::find()
        .filter(shipping_service::owned_by(user.user_id, payload.shipping_id))
        .one(txn)
        .await?
        .ok_or(AppError::Missing("Shipping address", payload.shipping_id))?;

    let method = PaymentMethods::find_by_id(payload.payment_method_id)
        .one(txn)
        .await?
        .ok_or(AppError::Missing("Payment method", payload.payment_method_id))?;
    let method_kind = method.method_kind();

    let mut lines = Vec::with_capacity(payload.items.len());
    for item in &payload.items {
        lines.push(price_line(txn, item).await?);
    }
    let original_total = original_total(&lines);

    let applied = match payload.discount_code() {
        Some(code) => {
            let product_ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
            Some(discount_service::apply_code(txn, code, original_total, &product_ids).await?)
        }
        None => None,
    };
    let discount_amount = applied.as_ref().map_or(0, |a| a.amount);
    let final_total = original_total - discount_amount;
    let (order_status, payment_status) = initial_status(final_total, method_kind);

    let order_id = Uuid::new_v4();
    let now = Utc::now();
    let order = OrderActive {
        id: Set(order_id),
        user_id: Set(user.user_id),
        sku: Set(build_sku(order_id)),
        shipping_id: Set(Some(payload.shipping_id)),
        original_total: Set(original_total),
        discount_code: Set(applied.as_ref().map(|a| a.discount.code.clone())),
        discount_amount: Set(discount_amount),
        total: Set(final_total),
        status: Set(order_status.as_str().into()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(txn)
    .await?;

    for line in &lines {
        OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(line.product_id),
            variant_id: Set(line.variant_id),
            quantity: Set(line.quantity),
            price: Set(line.unit_price),
            created_at: NotSet,
        }
        .insert(txn)
        .await?;

        take_stock(txn, line).await?;
    }

    let payment = PaymentActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        method_id: Set(method.id),
        status: Set(payment_status.as_str().into()),
        transaction_id: Set(None),
        gateway_reference: Set(None),
        paid_at: Set((payment_status == PaymentStatus::Paid).then(|| now.into())),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(txn)
    .await?;

    if let Some(applied) = &applied {
        discount_service::consume_usage(txn, applied.discount.id).await?;
    }

    if final_total == 0 || method_kind == PaymentMethodKind::Cod {
        return Ok(PlacedOrder {
            order,
            payment_url: None,
        });
    }

    let initiated = state
        .gateway
        .initiate_payment(&PaymentInitiation {
            order_id: order.id,
            order_sku: order.sku.clone(),
            user_id: user.user_id,
            amount: final_total,
            description: format!("Payment for order {}", order.sku),
        })
        .await?;

    if !initiated.is_success() {
        tracing::warn!(
            order_sku = %order.sku,
            return_code = initiated.return_code,
            response = %initiated.raw,
            "payment initiation refused"
        );
        return Err(AppError::PaymentInitiationFailed(initiated.return_code));
    }

    let mut payment: PaymentActive = payment.into();
    payment.transaction_id = Set(Some(initiated.transaction_id));
    payment.update(txn).await?;

    Ok(PlacedOrder {
        order,
        payment_url: initiated.order_url,
    })
}

async fn price_line<C: ConnectionTrait>(conn: &C, item: &CheckoutItem) -> AppResult<PricedLine> {
    let product = Products::find_by_id(item.product_id)
        .one(conn)
        .await?
        .filter(|p| !p.is_deleted())
        .ok_or(AppError::Missing("Product", item.product_id))?;

    let available = match item.variant_id {
        Some(variant_id) => {
            ProductVariants::find_by_id(variant_id)
                .one(conn)
                .await?
                .filter(|v| v.product_id == product.id)
                .ok_or(AppError::Missing("Product variant", variant_id))?
                .quantity
        }
        None => product.stock_quantity,
    };

    if available < item.quantity {
        return Err(AppError::InsufficientStock {
            product_id: product.id,
            variant_id: item.variant_id,
            requested: item.quantity,
            available,
        });
    }

    Ok(PricedLine {
        product_id: product.id,
        variant_id: item.variant_id,
        quantity: item.quantity,
        unit_price: product.unit_price(),
        available,
    })
}

/// Decrements stock only when enough is left, so concurrent checkouts
/// cannot oversell.
async fn take_stock<C: ConnectionTrait>(conn: &C, line: &PricedLine) -> AppResult<()> {
    let rows_affected = match line.variant_id {
        Some(variant_id) => {
            ProductVariants::update_many()
                .col_expr(
                    VariantCol::Quantity,
                    Expr::col(VariantCol::Quantity).sub(line.quantity),
                )
                .filter(VariantCol::Id.eq(variant_id))
                .filter(VariantCol::Quantity.gte(line.quantity))
                .exec(conn)
                .await?
                .rows_affected
        }
        None => {
            Products::update_many()
                .col_expr(
                    ProdCol::StockQuantity,
                    Expr::col(ProdCol::StockQuantity).sub(line.quantity),
                )
                .filter(ProdCol::Id.eq(line.product_id))
                .filter(ProdCol::StockQuantity.gte(line.quantity))
                .exec(conn)
                .await?
                .rows_affected
        }
    };

    if rows_affected == 0 {
        return Err(AppError::InsufficientStock {
            product_id: line.product_id,
            variant_id: line.variant_id,
            requested: line.quantity,
            available: line.available,
        });
    }
    Ok(())
}

/// Puts an item's quantity back where checkout took it from.
pub async fn return_stock<C: ConnectionTrait>(conn: &C, item: &OrderItemModel) -> AppResult<()> {
    match item.variant_id {
        Some(variant_id) => {
            ProductVariants::update_many()
                .col_expr(
                    VariantCol::Quantity,
                    Expr::col(VariantCol::Quantity).add(item.quantity),
                )
                .filter(VariantCol::Id.eq(variant_id))
                .exec(conn)
                .await?;
        }
        None => {
            Products::update_many()
                .col_expr(
                    ProdCol::StockQuantity,
                    Expr::col(ProdCol::StockQuantity).add(item.quantity),
                )
                .filter(ProdCol::Id.eq(item.product_id))
                .exec(conn)
                .await?;
        }
    }
    Ok(())
}

/// Order with items (product, variant with size/color), shipping address
/// and payment with its method.
pub async fn load_order_detail<C: ConnectionTrait>(
    conn: &C,
    order: OrderModel,
) -> AppResult<OrderDetail> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .order_by_asc(OrderItemCol::CreatedAt)
        .all(conn)
        .await?;

    let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
    let variant_ids: Vec<Uuid> = items.iter().filter_map(|i| i.variant_id).collect();

    let products: HashMap<Uuid, Product> = Products::find()
        .filter(ProdCol::Id.is_in(product_ids))
        .all(conn)
        .await?
        .into_iter()
        .map(|p| (p.id, Product::from(p)))
        .collect();

    let variants = if variant_ids.is_empty() {
        Vec::new()
    } else {
        ProductVariants::find()
            .filter(VariantCol::Id.is_in(variant_ids))
            .all(conn)
            .await?
    };
    let variants: HashMap<Uuid, _> = describe_variants(conn, variants)
        .await?
        .into_iter()
        .map(|v| (v.id, v))
        .collect();

    let items = items
        .into_iter()
        .map(|item| OrderItemDetail {
            product: products.get(&item.product_id).cloned(),
            variant: item.variant_id.and_then(|id| variants.get(&id).cloned()),
            item: OrderItem::from(item),
        })
        .collect();

    let shipping = match order.shipping_id {
        Some(id) => ShippingAddresses::find_by_id(id)
            .one(conn)
            .await?
            .map(ShippingAddress::from),
        None => None,
    };

    let payment = OrderPayments::find()
        .filter(PaymentCol::OrderId.eq(order.id))
        .find_also_related(PaymentMethods)
        .one(conn)
        .await?
        .map(|(payment, method)| OrderPayment::from_entity(payment, method));

    Ok(OrderDetail {
        order: Order::from(order),
        items,
        shipping,
        payment,
    })
}
