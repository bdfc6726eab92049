use sfp_common::Money;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Gateway is not configured correctly: {0}")]
    Configuration(String),
    #[error("Amount {amount} is outside the range accepted by this gateway (minimum {min})")]
    AmountOutOfRange { amount: Money, min: Money, max: Option<Money> },
    #[error("The payment processor could not be reached or rejected the request: {0}")]
    Upstream(String),
    #[error("The payment processor returned a response that could not be understood: {0}")]
    MalformedResponse(String),
    #[error("The notification payload is malformed: {0}")]
    MalformedNotification(String),
}

impl GatewayError {
    /// Upstream faults are transient; the caller may try again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream(_))
    }
}

#[derive(Debug, Clone, Error)]
pub enum ProvisioningError {
    #[error("Credential issuer is not configured correctly: {0}")]
    Configuration(String),
    #[error("Credential issuer could not be reached: {0}")]
    Unreachable(String),
    #[error("Credential issuer rejected the request. Status {status}. {message}")]
    Rejected { status: u16, message: String },
    #[error("Credential issuer returned an invalid response: {0}")]
    InvalidResponse(String),
}
