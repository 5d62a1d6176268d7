use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::record_audit,
    dto::refunds::{CreateRefundRequest, RefundDecision, RefundList, RejectRefundRequest},
    entity::{
        order_payments::{ActiveModel as PaymentActive, Column as PaymentCol, Entity as OrderPayments},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
        payment_methods::Entity as PaymentMethods,
        refund_requests::{ActiveModel as RefundActive, Column as RefundCol, Entity as RefundRequests},
    },
    error::{AppError, AppResult},
    gateway::RefundInstruction,
    middleware::auth::{AuthUser, ensure_admin},
    models::RefundRequest,
    notifications::{NotificationKind, notify},
    response::{ApiResponse, Meta},
    routes::params::RefundListQuery,
    state::AppState,
    status::{OrderStatus, PaymentMethodKind, PaymentStatus, RefundStatus},
};

/// Customer files a refund request against one of their orders.
pub async fn create_refund_request(
    state: &AppState,
    user: &AuthUser,
    payload: CreateRefundRequest,
) -> AppResult<ApiResponse<RefundRequest>> {
    let reason = payload.reason.trim().to_string();
    if reason.is_empty() {
        return Err(AppError::Validation("reason must not be empty".into()));
    }
    if payload.amount <= 0 {
        return Err(AppError::Validation("amount must be greater than 0".into()));
    }

    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::Id.eq(payload.order_id))
                .add(OrderCol::UserId.eq(user.user_id)),
        )
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let active = RefundRequests::find()
        .filter(RefundCol::OrderId.eq(order.id))
        .filter(RefundCol::Status.ne(RefundStatus::Rejected.as_str()))
        .count(&state.orm)
        .await?;
    if active > 0 {
        return Err(AppError::DuplicateRefundRequest);
    }

    if payload.amount > order.total {
        return Err(AppError::RefundAmountExceeded {
            requested: payload.amount,
            limit: order.total,
        });
    }

    let images = payload
        .images
        .filter(|images| !images.is_empty())
        .map(|images| serde_json::json!(images));

    let request = RefundActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        user_id: Set(user.user_id),
        reason: Set(reason),
        description: Set(payload.description),
        images: Set(images),
        amount: Set(payload.amount),
        status: Set(RefundStatus::Pending.as_str().into()),
        admin_note: Set(None),
        refund_reference: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    record_audit(
        &state.pool,
        Some(user.user_id),
        "refund_requested",
        Some("refund_requests"),
        Some(serde_json::json!({ "refund_request_id": request.id, "order_id": order.id, "amount": request.amount })),
    )
    .await;

    Ok(ApiResponse::success(
        "Refund request created",
        RefundRequest::from(request),
        Some(Meta::empty()),
    ))
}

pub async fn list_own_refund_requests(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<RefundList>> {
    let items = RefundRequests::find()
        .filter(RefundCol::UserId.eq(user.user_id))
        .order_by_desc(RefundCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(RefundRequest::from)
        .collect();

    Ok(ApiResponse::success(
        "Refund requests",
        RefundList { items },
        Some(Meta::empty()),
    ))
}

pub async fn list_refund_requests(
    state: &AppState,
    user: &AuthUser,
    query: RefundListQuery,
) -> AppResult<ApiResponse<RefundList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination.normalize();

    let mut finder = RefundRequests::find();
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        finder = finder.filter(RefundCol::Status.eq(status.clone()));
    }
    finder = finder.order_by_desc(RefundCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(RefundRequest::from)
        .collect();

    Ok(ApiResponse::success(
        "Refund requests",
        RefundList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

/// Stores the merchant refund id before the gateway is called. A retry
/// after a lost response or a failed commit sends the same id again.
async fn reserve_refund_reference(state: &AppState, id: Uuid) -> AppResult<String> {
    let request = RefundRequests::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    if request.status != RefundStatus::Pending.as_str() {
        return Err(AppError::BadRequest(format!(
            "Refund request is already {}",
            request.status
        )));
    }
    if let Some(reference) = request.refund_reference {
        return Ok(reference);
    }

    let reference = state.gateway.new_refund_reference();
    let result = RefundRequests::update_many()
        .col_expr(RefundCol::RefundReference, Expr::value(reference.clone()))
        .filter(RefundCol::Id.eq(request.id))
        .filter(RefundCol::RefundReference.is_null())
        .exec(&state.orm)
        .await?;
    if result.rows_affected == 1 {
        return Ok(reference);
    }

    // Another approval reserved one first.
    RefundRequests::find_by_id(id)
        .one(&state.orm)
        .await?
        .and_then(|r| r.refund_reference)
        .ok_or(AppError::NotFound)
}

/// Admin approval. COD orders are marked refunded directly; gateway orders
/// are refunded through the gateway first and only marked when it accepts.
pub async fn approve_refund_request(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<RefundDecision>> {
    ensure_admin(user)?;
    let reserved = reserve_refund_reference(state, id).await?;

    let txn = state.orm.begin().await?;
    let request = RefundRequests::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    if request.status != RefundStatus::Pending.as_str() {
        return Err(AppError::BadRequest(format!(
            "Refund request is already {}",
            request.status
        )));
    }

    let order = Orders::find_by_id(request.order_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::Missing("Order", request.order_id))?;
    let (payment, method) = OrderPayments::find()
        .filter(PaymentCol::OrderId.eq(order.id))
        .find_also_related(PaymentMethods)
        .one(&txn)
        .await?
        .ok_or(AppError::Missing("Payment for order", order.id))?;
    let method_kind = method
        .map(|m| m.method_kind())
        .unwrap_or(PaymentMethodKind::GatewayRedirect);

    let now = Utc::now();
    if method_kind == PaymentMethodKind::GatewayRedirect {
        let gateway_reference = payment.gateway_reference.clone().ok_or_else(|| {
            AppError::BadRequest("Payment has not been captured by the gateway".into())
        })?;

        let outcome = state
            .gateway
            .refund(&RefundInstruction {
                order_id: order.id,
                refund_reference: request.refund_reference.clone().unwrap_or(reserved),
                gateway_reference,
                amount: request.amount,
                description: format!("Refund for order {}", order.sku),
            })
            .await?;

        if !outcome.accepted {
            tracing::warn!(
                refund_request_id = %request.id,
                return_code = outcome.return_code,
                response = %outcome.raw,
                "gateway refused refund"
            );
            // Nothing was refunded, so the next attempt gets a fresh id.
            let mut request_active: RefundActive = request.into();
            request_active.refund_reference = Set(None);
            request_active.update(&txn).await?;
            txn.commit().await?;
            return Err(AppError::RefundFailed(outcome.return_code));
        }

        let mut payment_active: PaymentActive = payment.into();
        payment_active.status = Set(PaymentStatus::Refunded.as_str().into());
        payment_active.updated_at = Set(now.into());
        payment_active.update(&txn).await?;
    }

    let mut order_active: OrderActive = order.into();
    order_active.status = Set(OrderStatus::Refunded.as_str().into());
    order_active.updated_at = Set(now.into());
    let order = order_active.update(&txn).await?;

    let mut request_active: RefundActive = request.into();
    request_active.status = Set(RefundStatus::Approved.as_str().into());
    request_active.updated_at = Set(now.into());
    let request = request_active.update(&txn).await?;

    txn.commit().await?;

    tracing::info!(
        refund_request_id = %request.id,
        order_id = %order.id,
        method = method_kind.as_str(),
        "refund approved"
    );
    notify(
        &state.pool,
        request.user_id,
        NotificationKind::RefundApproved,
        "Refund approved",
        &format!("Your refund of {} for order {} was approved.", request.amount, order.sku),
    )
    .await;
    record_audit(
        &state.pool,
        Some(user.user_id),
        "refund_approved",
        Some("refund_requests"),
        Some(serde_json::json!({ "refund_request_id": request.id, "order_id": order.id })),
    )
    .await;

    Ok(ApiResponse::success(
        "Refund approved",
        RefundDecision {
            status: RefundStatus::Approved.as_str().into(),
            message: format!("Order {} has been refunded", order.sku),
            refund_request: RefundRequest::from(request),
        },
        Some(Meta::empty()),
    ))
}

pub async fn reject_refund_request(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: RejectRefundRequest,
) -> AppResult<ApiResponse<RefundDecision>> {
    ensure_admin(user)?;

    // Waits for an approval in flight to finish and then sees its outcome.
    let txn = state.orm.begin().await?;
    let request = RefundRequests::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    if request.status != RefundStatus::Pending.as_str() {
        return Err(AppError::BadRequest(format!(
            "Refund request is already {}",
            request.status
        )));
    }

    let mut active: RefundActive = request.into();
    active.status = Set(RefundStatus::Rejected.as_str().into());
    active.admin_note = Set(payload.note.filter(|n| !n.trim().is_empty()));
    active.updated_at = Set(Utc::now().into());
    let request = active.update(&txn).await?;
    txn.commit().await?;

    notify(
        &state.pool,
        request.user_id,
        NotificationKind::RefundRejected,
        "Refund rejected",
        request
            .admin_note
            .as_deref()
            .unwrap_or("Your refund request was rejected."),
    )
    .await;
    record_audit(
        &state.pool,
        Some(user.user_id),
        "refund_rejected",
        Some("refund_requests"),
        Some(serde_json::json!({ "refund_request_id": request.id })),
    )
    .await;

    Ok(ApiResponse::success(
        "Refund rejected",
        RefundDecision {
            status: RefundStatus::Rejected.as_str().into(),
            message: "Refund request rejected".into(),
            refund_request: RefundRequest::from(request),
        },
        Some(Meta::empty()),
    ))
}
