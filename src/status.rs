//! Order and payment state, and the transition tables that drive them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
    Refunded,
    Expired,
    Shipping,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Expired => "expired",
            OrderStatus::Shipping => "shipping",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
    Failed,
    Canceled,
    Expired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Canceled => "canceled",
            PaymentStatus::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Approved,
    Rejected,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Pending => "pending",
            RefundStatus::Approved => "approved",
            RefundStatus::Rejected => "rejected",
        }
    }
}

/// How a payment method settles. Stored as `kind` on `payment_methods`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum PaymentMethodKind {
    #[serde(rename = "cod")]
    Cod,
    #[serde(rename = "gateway")]
    GatewayRedirect,
}

impl PaymentMethodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethodKind::Cod => "cod",
            PaymentMethodKind::GatewayRedirect => "gateway",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown status `{}`", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

macro_rules! status_text {
    ($ty:ty, [$($variant:expr),+ $(,)?]) => {
        impl FromStr for $ty {
            type Err = UnknownStatus;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                [$($variant),+]
                    .into_iter()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| UnknownStatus(s.to_string()))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

status_text!(
    OrderStatus,
    [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
        OrderStatus::Expired,
        OrderStatus::Shipping,
    ]
);
status_text!(
    PaymentStatus,
    [
        PaymentStatus::Pending,
        PaymentStatus::Paid,
        PaymentStatus::Refunded,
        PaymentStatus::Failed,
        PaymentStatus::Canceled,
        PaymentStatus::Expired,
    ]
);
status_text!(
    RefundStatus,
    [RefundStatus::Pending, RefundStatus::Approved, RefundStatus::Rejected]
);
status_text!(
    PaymentMethodKind,
    [PaymentMethodKind::Cod, PaymentMethodKind::GatewayRedirect]
);

/// Initial state of a freshly assembled order.
///
/// A free order is settled immediately regardless of method; otherwise COD
/// orders go straight to processing while gateway orders wait for payment.
pub fn initial_status(final_total: i64, method: PaymentMethodKind) -> (OrderStatus, PaymentStatus) {
    if final_total == 0 {
        return (OrderStatus::Completed, PaymentStatus::Paid);
    }
    match method {
        PaymentMethodKind::Cod => (OrderStatus::Processing, PaymentStatus::Pending),
        PaymentMethodKind::GatewayRedirect => (OrderStatus::Pending, PaymentStatus::Pending),
    }
}

/// Gateway-reported settlement outcome, derived from its `return_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayOutcome {
    Success,
    Processing,
    Failed,
}

impl GatewayOutcome {
    pub fn from_return_code(code: i32) -> Self {
        match code {
            1 => GatewayOutcome::Success,
            2 => GatewayOutcome::Processing,
            _ => GatewayOutcome::Failed,
        }
    }
}

/// What reconciliation must write for a gateway outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub order: OrderStatus,
    pub payment: PaymentStatus,
    /// Restock items and give the discount usage back.
    pub compensate: bool,
}

/// Maps a gateway outcome onto local state. Returns `None` when nothing
/// should be written: the gateway still reports pending, or the payment has
/// already left `pending` (a repeated poll or a late callback).
pub fn reconcile_transition(current: PaymentStatus, outcome: GatewayOutcome) -> Option<Transition> {
    if current != PaymentStatus::Pending {
        return None;
    }
    match outcome {
        GatewayOutcome::Success => Some(Transition {
            order: OrderStatus::Completed,
            payment: PaymentStatus::Paid,
            compensate: false,
        }),
        GatewayOutcome::Processing => None,
        GatewayOutcome::Failed => Some(Transition {
            order: OrderStatus::Cancelled,
            payment: PaymentStatus::Failed,
            compensate: true,
        }),
    }
}

/// Manual order moves. Orders awaiting gateway payment can only be
/// cancelled; cancelled, refunded and expired orders are final. Paid orders
/// leave through a refund rather than a cancel. Completing an order whose
/// payment is still pending (cash on delivery) records the payment.
pub fn admin_transition(
    order: OrderStatus,
    payment: PaymentStatus,
    target: OrderStatus,
) -> Option<Transition> {
    use OrderStatus::*;

    let allowed = match (order, target) {
        (Cancelled | Refunded | Expired, _) => false,
        (from, to) if from == to => false,
        (_, Cancelled) => payment == PaymentStatus::Pending,
        (Processing, Shipping | Completed) => true,
        (Shipping, Completed) => true,
        (Completed, Shipping) => payment == PaymentStatus::Paid,
        _ => false,
    };
    if !allowed {
        return None;
    }

    let payment = match (target, payment) {
        (Cancelled, _) => PaymentStatus::Canceled,
        (Completed, PaymentStatus::Pending) => PaymentStatus::Paid,
        (_, current) => current,
    };
    Some(Transition {
        order: target,
        payment,
        compensate: target == Cancelled,
    })
}
