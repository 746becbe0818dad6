use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum SystemPayError {
    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("{0}")]
    FormNotValid(String),

    #[error("{0}")]
    PaymentRejected(String),

    #[error("The payment has been cancelled by the customer")]
    PaymentCancelled,

    /// Result code `30`: the gateway rejected one of our parameters. `code`
    /// is the `vads_extra_result` value naming the faulty field.
    #[error("Invalid request parameter (code: {})", .code.as_deref().unwrap_or("unknown"))]
    ParamError { code: Option<String> },

    #[error("{0}")]
    ServerError(String),

    #[error("{0}")]
    Payment(String),

    #[error("{0}")]
    OrderNotFound(String),

    #[error("Storage Error: {0}")]
    Storage(#[from] StorageError),

    #[error("Template Error: {0}")]
    Template(#[from] tera::Error),
}

impl SystemPayError {
    /// Errors coming out of the payment exchange itself, as opposed to
    /// infrastructure failures.
    pub fn is_payment_error(&self) -> bool {
        matches!(
            self,
            SystemPayError::FormNotValid(_)
                | SystemPayError::PaymentRejected(_)
                | SystemPayError::PaymentCancelled
                | SystemPayError::ParamError { .. }
                | SystemPayError::ServerError(_)
                | SystemPayError::Payment(_)
        )
    }
}

impl ResponseError for SystemPayError {
    fn status_code(&self) -> StatusCode {
        match self {
            SystemPayError::FormNotValid(_)
            | SystemPayError::PaymentRejected(_)
            | SystemPayError::PaymentCancelled
            | SystemPayError::ParamError { .. }
            | SystemPayError::Payment(_) => StatusCode::BAD_REQUEST,
            SystemPayError::ServerError(_) => StatusCode::BAD_GATEWAY,
            SystemPayError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            SystemPayError::Config(_)
            | SystemPayError::Storage(_)
            | SystemPayError::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        tracing::error!(systempay_error = %self, "Responding with error");
        let body = match self {
            SystemPayError::Config(_) => json!({"error": "Configuration issue"}),
            SystemPayError::Storage(_) => json!({"error": "Database operation failed"}),
            SystemPayError::Template(_) => json!({"error": "Page rendering failed"}),
            other => json!({"error": other.to_string()}),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

pub type Result<T, E = SystemPayError> = std::result::Result<T, E>;
