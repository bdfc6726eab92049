use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use storefront_payment_engine::{AccountApiError, CheckoutError, StorefrontDbError, WebhookError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("{0}")]
    ValidationError(String),
    #[error("{0}")]
    InsufficientBalance(String),
    #[error("{0}")]
    AmountOutOfRange(String),
    #[error("{0}")]
    CannotCancel(String),
    #[error("The payment processor is unavailable. Please try again. {0}")]
    UpstreamError(String),
    #[error("The webhook signature is missing or invalid")]
    InvalidSignature,
    #[error("Requests from this address are not allowed")]
    ForbiddenPeer,
    #[error("{0}")]
    RetryLater(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::InsufficientBalance(_) => StatusCode::PAYMENT_REQUIRED,
            Self::AmountOutOfRange(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::CannotCancel(_) => StatusCode::CONFLICT,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::ForbiddenPeer => StatusCode::FORBIDDEN,
            Self::UpstreamError(_) => StatusCode::BAD_GATEWAY,
            Self::RetryLater(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<CheckoutError> for ServerError {
    fn from(e: CheckoutError) -> Self {
        match e {
            CheckoutError::Validation(_) => Self::ValidationError(e.to_string()),
            CheckoutError::UnknownGateway(_) => Self::ValidationError(e.to_string()),
            CheckoutError::InsufficientBalance { .. } => Self::InsufficientBalance(e.to_string()),
            CheckoutError::AmountOutOfRange { .. } => Self::AmountOutOfRange(e.to_string()),
            CheckoutError::GatewayUnavailable(_) => Self::UpstreamError(e.to_string()),
            CheckoutError::PaymentNotFound(_) => Self::NoRecordFound(e.to_string()),
            CheckoutError::CannotCancel { .. } => Self::CannotCancel(e.to_string()),
            CheckoutError::Configuration(_) | CheckoutError::DatabaseError(_) => Self::BackendError(e.to_string()),
        }
    }
}

impl From<WebhookError> for ServerError {
    fn from(e: WebhookError) -> Self {
        match e {
            WebhookError::UnknownGateway(_) => Self::NoRecordFound(e.to_string()),
            WebhookError::InvalidSignature => Self::InvalidSignature,
            WebhookError::Persistence(_) => Self::BackendError(e.to_string()),
            WebhookError::ReferenceNotYetAttached { .. } => Self::RetryLater(e.to_string()),
        }
    }
}

impl From<AccountApiError> for ServerError {
    fn from(e: AccountApiError) -> Self {
        Self::BackendError(e.to_string())
    }
}

impl From<StorefrontDbError> for ServerError {
    fn from(e: StorefrontDbError) -> Self {
        Self::BackendError(e.to_string())
    }
}

#[cfg(test)]
mod test {
    use sfp_common::Money;

    use super::*;

    #[test]
    fn checkout_errors_map_to_client_errors() {
        let e: ServerError = CheckoutError::Validation("The cart is empty".into()).into();
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);
        let e: ServerError =
            CheckoutError::InsufficientBalance { required: Money::from(500), available: Money::from(100) }.into();
        assert_eq!(e.status_code(), StatusCode::PAYMENT_REQUIRED);
        let e: ServerError =
            CheckoutError::AmountOutOfRange { amount: Money::from(5), min: Money::from(100), max: None }.into();
        assert_eq!(e.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        let e: ServerError = CheckoutError::GatewayUnavailable("timeout".into()).into();
        assert_eq!(e.status_code(), StatusCode::BAD_GATEWAY);
        let e: ServerError = CheckoutError::DatabaseError("locked".into()).into();
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn webhook_errors() {
        let e: ServerError = WebhookError::InvalidSignature.into();
        assert_eq!(e.status_code(), StatusCode::UNAUTHORIZED);
        let e: ServerError = WebhookError::UnknownGateway("nope".into()).into();
        assert_eq!(e.status_code(), StatusCode::NOT_FOUND);
        let e: ServerError = WebhookError::Persistence("disk full".into()).into();
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let e: ServerError =
            WebhookError::ReferenceNotYetAttached { gateway: "cards".into(), reference: "cs_1".into() }.into();
        assert_eq!(e.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
