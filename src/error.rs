use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    gateway::GatewayError,
    response::{ApiResponse, Meta},
    services::discount_service::DiscountRejection,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("{0} {1} not found")]
    Missing(&'static str, Uuid),

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        variant_id: Option<Uuid>,
        requested: i32,
        available: i32,
    },

    #[error("Discount code is invalid: {0}")]
    DiscountInvalid(DiscountRejection),

    #[error("Payment initiation failed (return code {0})")]
    PaymentInitiationFailed(i32),

    #[error("Payment gateway error: {0}")]
    GatewayCommunication(#[from] GatewayError),

    #[error("Refund was not accepted by the payment gateway (return code {0})")]
    RefundFailed(i32),

    #[error("A refund request already exists for this order")]
    DuplicateRefundRequest,

    #[error("Refund amount {requested} exceeds order total {limit}")]
    RefundAmountExceeded { requested: i64, limit: i64 },

    #[error("{message}: {source}")]
    Failed {
        message: &'static str,
        source: Box<AppError>,
    },

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
}

impl AppError {
    /// Folds a domain failure into the generic `message` envelope answered with 500.
    /// Ownership and auth failures keep their own status.
    pub fn envelope(self, message: &'static str) -> Self {
        match self {
            AppError::NotFound
            | AppError::Unauthorized(_)
            | AppError::Forbidden
            | AppError::Failed { .. } => self,
            other => AppError::Failed {
                message,
                source: Box::new(other),
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound | AppError::Missing(..) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Validation(_)
            | AppError::InsufficientStock { .. }
            | AppError::DiscountInvalid(_)
            | AppError::DuplicateRefundRequest
            | AppError::RefundAmountExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::PaymentInitiationFailed(_)
            | AppError::GatewayCommunication(_)
            | AppError::RefundFailed(_)
            | AppError::Failed { .. }
            | AppError::DbError(_)
            | AppError::OrmError(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, error) = match &self {
            AppError::Failed { message, source } => (message.to_string(), source.to_string()),
            AppError::DbError(err) => {
                tracing::error!(error = %err, "database error");
                (self.to_string(), self.to_string())
            }
            AppError::OrmError(err) => {
                tracing::error!(error = %err, "orm error");
                (self.to_string(), self.to_string())
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal error");
                (self.to_string(), self.to_string())
            }
            _ => (self.to_string(), self.to_string()),
        };

        let body = ApiResponse {
            message,
            data: Some(ErrorData { error }),
            meta: Some(Meta::empty()),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_wraps_domain_failures_as_server_errors() {
        let err = AppError::InsufficientStock {
            product_id: Uuid::nil(),
            variant_id: None,
            requested: 3,
            available: 1,
        }
        .envelope("Order creation failed");

        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().starts_with("Order creation failed: Insufficient stock"));
    }

    #[test]
    fn envelope_keeps_ownership_failures() {
        let err = AppError::NotFound.envelope("Payment status check failed");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn refund_rules_are_unprocessable() {
        assert_eq!(
            AppError::DuplicateRefundRequest.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::RefundAmountExceeded {
                requested: 10,
                limit: 5
            }
            .status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::RefundFailed(2).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
