use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Auth error: {0}")]
    AuthError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Line item not found")]
    LineItemNotFound,

    #[error("Invalid discount code: {0}")]
    InvalidDiscountCode(String),

    #[error("Invalid order state: {0}")]
    InvalidOrderState(String),

    #[error("Subscription orders hold a single item")]
    SubscriptionConflict,

    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    #[error("Payment processor error: {0}")]
    ProcessorError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::ValidationError(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::AuthError(_) | AppError::JwtError(_) => {
                (StatusCode::UNAUTHORIZED, "AUTH_ERROR")
            }
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            AppError::LineItemNotFound => (StatusCode::NOT_FOUND, "LINE_ITEM_NOT_FOUND"),
            AppError::InvalidDiscountCode(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_DISCOUNT_CODE")
            }
            AppError::InvalidOrderState(_) => (StatusCode::CONFLICT, "INVALID_ORDER_STATE"),
            AppError::SubscriptionConflict => (StatusCode::CONFLICT, "SUBSCRIPTION_CONFLICT"),
            AppError::PaymentDeclined(_) => (StatusCode::PAYMENT_REQUIRED, "PAYMENT_DECLINED"),
            AppError::ProcessorError(_) => (StatusCode::BAD_GATEWAY, "PROCESSOR_ERROR"),
            AppError::DatabaseError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// Message shown to the caller. Gateway messages pass through verbatim,
    /// storage and internal failures are masked.
    fn public_message(&self) -> String {
        match self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::NotFound(msg)
            | AppError::InvalidDiscountCode(msg)
            | AppError::InvalidOrderState(msg)
            | AppError::PaymentDeclined(msg)
            | AppError::ProcessorError(msg) => msg.clone(),
            AppError::JwtError(_) => "Invalid token".to_string(),
            AppError::Forbidden | AppError::LineItemNotFound | AppError::SubscriptionConflict => {
                self.to_string()
            }
            AppError::DatabaseError(_) => "Database error".to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.status_and_code().0
    }

    fn error_response(&self) -> HttpResponse {
        let (status_code, error_code) = self.status_and_code();
        if status_code.is_server_error() {
            log::error!("{error_code}: {self}");
        } else {
            log::warn!("{error_code}: {self}");
        }

        HttpResponse::build(status_code).json(json!({
            "success": false,
            "error": {
                "code": error_code,
                "message": self.public_message()
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declines_surface_gateway_message() {
        let err = AppError::PaymentDeclined("card_declined".into());
        assert_eq!(err.status_code(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(err.public_message(), "card_declined");
    }

    #[test]
    fn database_errors_are_masked() {
        let err = AppError::DatabaseError(sea_orm::DbErr::Custom("boom".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Database error");
    }

    #[test]
    fn state_errors_are_conflicts() {
        assert_eq!(
            AppError::InvalidOrderState("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::LineItemNotFound.status_code(),
            StatusCode::NOT_FOUND
        );
    }
}
