use sfp_common::{Money, PaymentStatus};
use sfp_integrations::GatewayError;
use thiserror::Error;

use crate::{
    pricing::PriceOverflow,
    traits::{AccountApiError, StorefrontDbError},
};

#[derive(Debug, Clone, Error)]
pub enum CheckoutError {
    #[error("Invalid checkout request. {0}")]
    Validation(String),
    #[error("There is no active payment gateway with code '{0}'")]
    UnknownGateway(String),
    #[error("Insufficient balance: {required} is required, but only {available} is available")]
    InsufficientBalance { required: Money, available: Money },
    #[error("The gateway does not accept charges of {amount} (minimum {min}, maximum {max:?})")]
    AmountOutOfRange { amount: Money, min: Money, max: Option<Money> },
    #[error("The payment gateway could not create the charge. {0}")]
    GatewayUnavailable(String),
    #[error("The payment gateway is misconfigured. {0}")]
    Configuration(String),
    #[error("Payment {0} does not exist")]
    PaymentNotFound(String),
    #[error("Payment {id} cannot be cancelled because it is {status}")]
    CannotCancel { id: String, status: PaymentStatus },
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<StorefrontDbError> for CheckoutError {
    fn from(e: StorefrontDbError) -> Self {
        match e {
            StorefrontDbError::InsufficientBalance { required, available } => {
                CheckoutError::InsufficientBalance { required, available }
            },
            StorefrontDbError::PaymentIntentNotFound(id) => CheckoutError::PaymentNotFound(id),
            StorefrontDbError::InvalidAmount(s) => CheckoutError::Validation(s),
            e => CheckoutError::DatabaseError(e.to_string()),
        }
    }
}

impl From<AccountApiError> for CheckoutError {
    fn from(e: AccountApiError) -> Self {
        CheckoutError::DatabaseError(e.to_string())
    }
}

impl From<PriceOverflow> for CheckoutError {
    fn from(e: PriceOverflow) -> Self {
        CheckoutError::Validation(e.to_string())
    }
}

impl From<GatewayError> for CheckoutError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::AmountOutOfRange { amount, min, max } => CheckoutError::AmountOutOfRange { amount, min, max },
            GatewayError::Configuration(s) => CheckoutError::Configuration(s),
            e => CheckoutError::GatewayUnavailable(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum WebhookError {
    #[error("No payment gateway is registered with code '{0}'")]
    UnknownGateway(String),
    #[error("The webhook signature is missing or invalid")]
    InvalidSignature,
    #[error("The webhook could not be recorded. {0}")]
    Persistence(String),
    #[error("Payment {reference} at {gateway} is not known yet. Deliver it again later.")]
    ReferenceNotYetAttached { gateway: String, reference: String },
}

impl From<StorefrontDbError> for WebhookError {
    fn from(e: StorefrontDbError) -> Self {
        WebhookError::Persistence(e.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    #[error("No payment gateway is registered with code '{0}'")]
    UnknownGateway(String),
    #[error("{0}")]
    Gateway(#[from] GatewayError),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<StorefrontDbError> for ReconcileError {
    fn from(e: StorefrontDbError) -> Self {
        ReconcileError::DatabaseError(e.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum FulfillmentError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Order {0} does not exist")]
    OrderNotFound(String),
}

impl From<StorefrontDbError> for FulfillmentError {
    fn from(e: StorefrontDbError) -> Self {
        FulfillmentError::DatabaseError(e.to_string())
    }
}

impl From<AccountApiError> for FulfillmentError {
    fn from(e: AccountApiError) -> Self {
        FulfillmentError::DatabaseError(e.to_string())
    }
}
