use std::fmt;

use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    audit::record_audit,
    dto::discounts::{CheckDiscountRequest, CreateDiscountRequest, DiscountCheckResponse},
    entity::{
        discount_products::{
            ActiveModel as DiscountProductActive, Column as DiscountProductCol,
            Entity as DiscountProducts,
        },
        discounts::{ActiveModel as DiscountActive, Column as DiscountCol, Entity as Discounts, Model as DiscountModel},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Discount,
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Why a code cannot be applied. Checked in declaration order; the first
/// failing rule is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountRejection {
    NotFound,
    NotActive,
    UsageLimitReached,
    BelowMinimum,
    NotApplicable,
}

impl fmt::Display for DiscountRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            DiscountRejection::NotFound => "code not found",
            DiscountRejection::NotActive => "not yet active or expired",
            DiscountRejection::UsageLimitReached => "usage limit reached",
            DiscountRejection::BelowMinimum => "below minimum order amount",
            DiscountRejection::NotApplicable => "not applicable to these products",
        };
        f.write_str(reason)
    }
}

/// A discount that passed every rule, with the amount it takes off.
#[derive(Debug, Clone)]
pub struct AppliedDiscount {
    pub discount: DiscountModel,
    pub product_ids: Vec<Uuid>,
    pub amount: i64,
}

/// `subtotal * percent / 100`, rounded half-up to the currency unit and
/// never more than the subtotal.
pub fn discount_amount(subtotal: i64, percent: i32) -> i64 {
    let percent = i128::from(percent.clamp(0, 100));
    let raw = (i128::from(subtotal.max(0)) * percent + 50) / 100;
    (raw as i64).min(subtotal.max(0))
}

/// Pure rule check against an already loaded discount.
pub fn evaluate(
    discount: &DiscountModel,
    restricted_to: &[Uuid],
    now: DateTime<Utc>,
    subtotal: i64,
    cart_product_ids: &[Uuid],
) -> Result<i64, DiscountRejection> {
    if now < discount.valid_from || now > discount.valid_to {
        return Err(DiscountRejection::NotActive);
    }
    if discount.used_count >= discount.usage_limit {
        return Err(DiscountRejection::UsageLimitReached);
    }
    if subtotal < discount.min_order_amount {
        return Err(DiscountRejection::BelowMinimum);
    }
    if !restricted_to.is_empty() && !cart_product_ids.iter().any(|id| restricted_to.contains(id)) {
        return Err(DiscountRejection::NotApplicable);
    }
    Ok(discount_amount(subtotal, discount.percent))
}

pub async fn find_by_code<C: ConnectionTrait>(
    conn: &C,
    code: &str,
) -> AppResult<Option<(DiscountModel, Vec<Uuid>)>> {
    let Some(discount) = Discounts::find()
        .filter(DiscountCol::Code.eq(code))
        .one(conn)
        .await?
    else {
        return Ok(None);
    };

    let product_ids = DiscountProducts::find()
        .filter(DiscountProductCol::DiscountId.eq(discount.id))
        .all(conn)
        .await?
        .into_iter()
        .map(|row| row.product_id)
        .collect();

    Ok(Some((discount, product_ids)))
}

/// Loads and evaluates `code`. Rejections surface as `AppError::DiscountInvalid`.
pub async fn apply_code<C: ConnectionTrait>(
    conn: &C,
    code: &str,
    subtotal: i64,
    cart_product_ids: &[Uuid],
) -> AppResult<AppliedDiscount> {
    let (discount, product_ids) = find_by_code(conn, code)
        .await?
        .ok_or(AppError::DiscountInvalid(DiscountRejection::NotFound))?;

    let amount = evaluate(&discount, &product_ids, Utc::now(), subtotal, cart_product_ids)
        .map_err(AppError::DiscountInvalid)?;

    Ok(AppliedDiscount {
        discount,
        product_ids,
        amount,
    })
}

/// Takes one use of the discount, guarded so `used_count` never passes
/// `usage_limit` even when checkouts race.
pub async fn consume_usage<C: ConnectionTrait>(conn: &C, discount_id: Uuid) -> AppResult<()> {
    let result = Discounts::update_many()
        .col_expr(DiscountCol::UsedCount, Expr::col(DiscountCol::UsedCount).add(1))
        .filter(DiscountCol::Id.eq(discount_id))
        .filter(Expr::col(DiscountCol::UsedCount).lt(Expr::col(DiscountCol::UsageLimit)))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::DiscountInvalid(
            DiscountRejection::UsageLimitReached,
        ));
    }
    Ok(())
}

/// Gives one use back, floored at zero.
pub async fn release_usage<C: ConnectionTrait>(conn: &C, code: &str) -> AppResult<()> {
    let result = Discounts::update_many()
        .col_expr(DiscountCol::UsedCount, Expr::col(DiscountCol::UsedCount).sub(1))
        .filter(DiscountCol::Code.eq(code))
        .filter(DiscountCol::UsedCount.gt(0))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        tracing::warn!(code, "discount usage already at zero, nothing released");
    }
    Ok(())
}

pub async fn check_discount(
    state: &AppState,
    payload: CheckDiscountRequest,
) -> AppResult<ApiResponse<DiscountCheckResponse>> {
    let code = payload.code.trim();
    let data = match apply_code(&state.orm, code, payload.subtotal, &payload.product_ids).await {
        Ok(applied) => DiscountCheckResponse {
            valid: true,
            discount_amount: Some(applied.amount),
            discount: Some(Discount::from_entity(applied.discount, applied.product_ids)),
            reason: None,
        },
        Err(AppError::DiscountInvalid(reason)) => DiscountCheckResponse {
            valid: false,
            discount: None,
            discount_amount: None,
            reason: Some(reason.to_string()),
        },
        Err(err) => return Err(err),
    };

    Ok(ApiResponse::success("Discount checked", data, Some(Meta::empty())))
}

pub async fn create_discount(
    state: &AppState,
    user: &AuthUser,
    payload: CreateDiscountRequest,
) -> AppResult<ApiResponse<Discount>> {
    ensure_admin(user)?;
    let code = payload.code.trim().to_string();
    if code.is_empty() {
        return Err(AppError::Validation("code must not be empty".into()));
    }
    if !(0..=100).contains(&payload.percent) {
        return Err(AppError::Validation("percent must be between 0 and 100".into()));
    }
    if payload.valid_to < payload.valid_from {
        return Err(AppError::Validation("valid_to must not precede valid_from".into()));
    }
    if payload.usage_limit < 0 || payload.min_order_amount < 0 {
        return Err(AppError::Validation(
            "usage_limit and min_order_amount must not be negative".into(),
        ));
    }

    let exists = Discounts::find()
        .filter(DiscountCol::Code.eq(code.as_str()))
        .one(&state.orm)
        .await?;
    if exists.is_some() {
        return Err(AppError::BadRequest("Discount code is already taken".into()));
    }

    let txn = state.orm.begin().await?;
    let discount = DiscountActive {
        id: Set(Uuid::new_v4()),
        code: Set(code),
        percent: Set(payload.percent),
        valid_from: Set(payload.valid_from.into()),
        valid_to: Set(payload.valid_to.into()),
        min_order_amount: Set(payload.min_order_amount),
        usage_limit: Set(payload.usage_limit),
        used_count: Set(0),
        created_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut product_ids = payload.product_ids;
    product_ids.sort();
    product_ids.dedup();
    for product_id in &product_ids {
        DiscountProductActive {
            discount_id: Set(discount.id),
            product_id: Set(*product_id),
        }
        .insert(&txn)
        .await?;
    }
    txn.commit().await?;

    record_audit(
        &state.pool,
        Some(user.user_id),
        "discount_create",
        Some("discounts"),
        Some(serde_json::json!({ "discount_id": discount.id, "code": discount.code })),
    )
    .await;

    Ok(ApiResponse::success(
        "Discount created",
        Discount::from_entity(discount, product_ids),
        Some(Meta::empty()),
    ))
}
