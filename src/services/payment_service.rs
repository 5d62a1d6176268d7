use chrono::Utc;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseTransaction, EntityTrait, QueryFilter,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::record_audit,
    dto::orders::{GatewayCallback, GatewayCallbackAck, PaymentStatusResponse},
    entity::{
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        order_payments::{ActiveModel as PaymentActive, Column as PaymentCol, Entity as OrderPayments, Model as PaymentModel},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
    },
    error::{AppError, AppResult},
    gateway::zalopay::CallbackData,
    middleware::auth::AuthUser,
    notifications::{NotificationKind, notify},
    response::{ApiResponse, Meta},
    services::{discount_service, order_service::return_stock},
    state::AppState,
    status::{GatewayOutcome, PaymentStatus, Transition, reconcile_transition},
};

/// Asks the gateway for the authoritative state of an order's payment and
/// syncs local order/payment status with it. Gateway failures leave local
/// state untouched.
pub async fn reconcile(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
) -> AppResult<ApiResponse<PaymentStatusResponse>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(order_id)),
        )
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let payment = OrderPayments::find()
        .filter(PaymentCol::OrderId.eq(order.id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::Missing("Payment for order", order.id))?;

    let transaction_id = payment.transaction_id.clone().ok_or_else(|| {
        AppError::BadRequest("Order has no gateway transaction to check".into())
    })?;

    let status = state.gateway.search_status(&transaction_id).await?;
    let outcome = GatewayOutcome::from_return_code(status.return_code);

    let txn = state.orm.begin().await?;
    let (order, payment) = lock_order_payment(&txn, order.id).await?;
    let current: PaymentStatus = parse_payment_status(&payment)?;

    let (order, payment) = match reconcile_transition(current, outcome) {
        Some(transition) => {
            let applied =
                apply_transition(&txn, order, payment, transition, status.gateway_reference).await?;
            txn.commit().await?;
            after_transition(state, &applied.0, transition).await;
            applied
        }
        None => {
            txn.commit().await?;
            (order, payment)
        }
    };

    tracing::info!(
        order_id = %order.id,
        return_code = status.return_code,
        order_status = %order.status,
        payment_status = %payment.status,
        "payment status reconciled"
    );

    Ok(ApiResponse::success(
        "Payment status",
        PaymentStatusResponse {
            order_status: order.status,
            payment_status: payment.status,
            zalopay_response: status.raw,
        },
        Some(Meta::empty()),
    ))
}

/// Handles the gateway's server callback. The answer is what the gateway
/// expects: 1 applied, 2 already settled, 0 retry later, -1 rejected.
pub async fn handle_gateway_callback(state: &AppState, payload: GatewayCallback) -> GatewayCallbackAck {
    if !state.gateway.verify_callback(&payload.data, &payload.mac) {
        tracing::warn!("gateway callback with invalid mac");
        return ack(-1, "mac not equal");
    }

    let data: CallbackData = match serde_json::from_str(&payload.data) {
        Ok(data) => data,
        Err(err) => {
            tracing::warn!(error = %err, "gateway callback data unreadable");
            return ack(-1, "invalid data");
        }
    };

    match settle_from_callback(state, &data).await {
        Ok(true) => ack(1, "success"),
        Ok(false) => ack(2, "already settled"),
        Err(AppError::NotFound) => {
            tracing::warn!(app_trans_id = %data.app_trans_id, "callback for unknown transaction");
            ack(-1, "unknown transaction")
        }
        Err(err) => {
            tracing::error!(error = %err, app_trans_id = %data.app_trans_id, "callback handling failed");
            ack(0, "retry")
        }
    }
}

async fn settle_from_callback(state: &AppState, data: &CallbackData) -> AppResult<bool> {
    let payment = OrderPayments::find()
        .filter(PaymentCol::TransactionId.eq(data.app_trans_id.as_str()))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let txn = state.orm.begin().await?;
    let (order, payment) = lock_order_payment(&txn, payment.order_id).await?;
    let current = parse_payment_status(&payment)?;

    let Some(transition) = reconcile_transition(current, GatewayOutcome::Success) else {
        txn.commit().await?;
        return Ok(false);
    };

    let (order, _) =
        apply_transition(&txn, order, payment, transition, data.gateway_reference()).await?;
    txn.commit().await?;

    tracing::info!(order_id = %order.id, "payment confirmed by gateway callback");
    record_audit(
        &state.pool,
        Some(order.user_id),
        "payment_callback",
        Some("order_payments"),
        Some(serde_json::json!({ "order_id": order.id, "app_trans_id": data.app_trans_id })),
    )
    .await;
    Ok(true)
}

fn ack(return_code: i32, message: &str) -> GatewayCallbackAck {
    GatewayCallbackAck {
        return_code,
        return_message: message.to_string(),
    }
}

pub(crate) fn parse_payment_status(payment: &PaymentModel) -> AppResult<PaymentStatus> {
    payment
        .status
        .parse()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("payment {}: {e}", payment.id)))
}

/// Re-reads order and payment under row locks so concurrent polls and
/// callbacks serialize on the same payment.
pub(crate) async fn lock_order_payment(
    txn: &DatabaseTransaction,
    order_id: Uuid,
) -> AppResult<(OrderModel, PaymentModel)> {
    let order = Orders::find_by_id(order_id)
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or(AppError::NotFound)?;
    let payment = OrderPayments::find()
        .filter(PaymentCol::OrderId.eq(order_id))
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or(AppError::Missing("Payment for order", order_id))?;
    Ok((order, payment))
}

pub(crate) async fn apply_transition(
    txn: &DatabaseTransaction,
    order: OrderModel,
    payment: PaymentModel,
    transition: Transition,
    gateway_reference: Option<String>,
) -> AppResult<(OrderModel, PaymentModel)> {
    let now = Utc::now();

    if transition.compensate {
        let items = OrderItems::find()
            .filter(OrderItemCol::OrderId.eq(order.id))
            .all(txn)
            .await?;
        for item in &items {
            return_stock(txn, item).await?;
        }
        if let Some(code) = order.discount_code.as_deref() {
            discount_service::release_usage(txn, code).await?;
        }
    }

    let mut order_active: OrderActive = order.into();
    order_active.status = Set(transition.order.as_str().into());
    order_active.updated_at = Set(now.into());
    let order = order_active.update(txn).await?;

    let was_paid = payment.status == PaymentStatus::Paid.as_str();
    let mut payment_active: PaymentActive = payment.into();
    payment_active.status = Set(transition.payment.as_str().into());
    payment_active.updated_at = Set(now.into());
    if transition.payment == PaymentStatus::Paid && !was_paid {
        payment_active.paid_at = Set(Some(now.into()));
    }
    if let Some(reference) = gateway_reference {
        payment_active.gateway_reference = Set(Some(reference));
    }
    let payment = payment_active.update(txn).await?;

    Ok((order, payment))
}

async fn after_transition(state: &AppState, order: &OrderModel, transition: Transition) {
    if transition.payment == PaymentStatus::Failed {
        notify(
            &state.pool,
            order.user_id,
            NotificationKind::PaymentFailed,
            "Payment failed",
            &format!("Payment for order {} failed and the order was cancelled.", order.sku),
        )
        .await;
    }
    record_audit(
        &state.pool,
        Some(order.user_id),
        "payment_reconciled",
        Some("order_payments"),
        Some(serde_json::json!({
            "order_id": order.id,
            "order_status": transition.order.as_str(),
            "payment_status": transition.payment.as_str(),
        })),
    )
    .await;
}
