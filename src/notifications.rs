//! In-app notifications. Delivery to push channels happens elsewhere; this
//! module only records the row the storefront reads.

use uuid::Uuid;

use crate::{db::DbPool, error::AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    OrderPlaced,
    PaymentFailed,
    RefundApproved,
    RefundRejected,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::OrderPlaced => "order_placed",
            NotificationKind::PaymentFailed => "payment_failed",
            NotificationKind::RefundApproved => "refund_approved",
            NotificationKind::RefundRejected => "refund_rejected",
        }
    }
}

pub async fn create_notification(
    pool: &DbPool,
    user_id: Uuid,
    kind: NotificationKind,
    title: &str,
    body: &str,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO notifications (id, user_id, kind, title, body)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(kind.as_str())
    .bind(title)
    .bind(body)
    .execute(pool)
    .await?;

    Ok(())
}

/// Sends a notification after the triggering write has committed. Failure is
/// logged and swallowed.
pub async fn notify(pool: &DbPool, user_id: Uuid, kind: NotificationKind, title: &str, body: &str) {
    if let Err(err) = create_notification(pool, user_id, kind, title, body).await {
        tracing::warn!(error = %err, kind = kind.as_str(), %user_id, "notification failed");
    }
}
