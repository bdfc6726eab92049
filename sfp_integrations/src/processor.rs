use std::{fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sfp_common::{Money, OrderStatusType, PaymentStatus, Secret};

use crate::GatewayError;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

//-------------------------------------------   ProcessorSettings  -----------------------------------------------------
/// The credentials block of a stored gateway configuration.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct GatewayCredentials {
    #[serde(default)]
    pub api_key: Secret<String>,
    /// Used by processors that sign outgoing requests.
    #[serde(default)]
    pub api_secret: Secret<String>,
    /// Shared secret for webhook signatures. An empty secret means webhooks cannot be authenticated.
    #[serde(default)]
    pub webhook_secret: Secret<String>,
    pub merchant_id: Option<String>,
    /// The processor's API endpoint, e.g. `https://api.sandbox.processor.com`.
    pub base_url: Option<String>,
}

/// Everything an adapter needs to build a [`GatewayContext`].
#[derive(Clone, Debug)]
pub struct ProcessorSettings {
    pub gateway_code: String,
    pub credentials: GatewayCredentials,
    pub min_amount: Money,
    pub max_amount: Option<Money>,
    /// Accept webhooks without verifying them when no webhook secret is configured. **DANGER**
    pub allow_unsigned_webhooks: bool,
}

//-------------------------------------------   GatewayContext  --------------------------------------------------------
/// An initialized, immutable view of one gateway's configuration. Created by [`PaymentProcessor::initialize`] and
/// passed into every other adapter call.
#[derive(Clone)]
pub struct GatewayContext {
    gateway_code: String,
    base_url: String,
    credentials: GatewayCredentials,
    min_amount: Money,
    max_amount: Option<Money>,
    allow_unsigned_webhooks: bool,
    client: Arc<Client>,
}

impl Debug for GatewayContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GatewayContext({} @ {})", self.gateway_code, self.base_url)
    }
}

impl GatewayContext {
    /// Validates the common parts of the settings and builds the HTTP client. Adapters add their own checks on top.
    pub fn from_settings(settings: &ProcessorSettings) -> Result<Self, GatewayError> {
        if settings.gateway_code.trim().is_empty() {
            return Err(GatewayError::Configuration("Gateway code is empty".into()));
        }
        if settings.credentials.api_key.is_empty() {
            return Err(GatewayError::Configuration(format!("[{}] api_key is missing", settings.gateway_code)));
        }
        if settings.min_amount.value() < 0 {
            return Err(GatewayError::Configuration(format!(
                "[{}] minimum amount cannot be negative",
                settings.gateway_code
            )));
        }
        if let Some(max) = settings.max_amount {
            if max < settings.min_amount {
                return Err(GatewayError::Configuration(format!(
                    "[{}] maximum amount {max} is below the minimum {}",
                    settings.gateway_code, settings.min_amount
                )));
            }
        }
        let base_url = settings
            .credentials
            .base_url
            .as_deref()
            .ok_or_else(|| GatewayError::Configuration(format!("[{}] base_url is missing", settings.gateway_code)))?
            .trim_end_matches('/')
            .to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(GatewayError::Configuration(format!(
                "[{}] {base_url} is not a valid base URL",
                settings.gateway_code
            )));
        }
        let client = Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;
        Ok(Self {
            gateway_code: settings.gateway_code.clone(),
            base_url,
            credentials: settings.credentials.clone(),
            min_amount: settings.min_amount,
            max_amount: settings.max_amount,
            allow_unsigned_webhooks: settings.allow_unsigned_webhooks,
            client: Arc::new(client),
        })
    }

    pub fn gateway_code(&self) -> &str {
        &self.gateway_code
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn credentials(&self) -> &GatewayCredentials {
        &self.credentials
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn allow_unsigned_webhooks(&self) -> bool {
        self.allow_unsigned_webhooks
    }

    pub fn min_amount(&self) -> Money {
        self.min_amount
    }

    pub fn max_amount(&self) -> Option<Money> {
        self.max_amount
    }

    /// Checks that `amount` lies in the range this gateway accepts.
    pub fn check_amount(&self, amount: Money) -> Result<(), GatewayError> {
        let too_low = amount < self.min_amount || !amount.is_positive();
        let too_high = self.max_amount.map(|max| amount > max).unwrap_or(false);
        if too_low || too_high {
            return Err(GatewayError::AmountOutOfRange { amount, min: self.min_amount, max: self.max_amount });
        }
        Ok(())
    }
}

//-------------------------------------------   Charges  ---------------------------------------------------------------
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChargeRequest {
    /// The amount to charge, fees included.
    pub amount: Money,
    pub currency: String,
    /// Our reference for the charge. The processor echoes it back in notifications.
    pub order_ref: String,
    pub success_url: String,
    pub cancel_url: String,
    pub email: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeResponse {
    pub external_reference: String,
    pub checkout_url: String,
}

/// The parts of a webhook payload the reconciler cares about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub external_reference: String,
    pub native_status: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StatusMapping {
    pub payment: PaymentStatus,
    pub order: OrderStatusType,
}

impl StatusMapping {
    /// Derives the order status that accompanies a payment status.
    ///
    /// A completed payment puts the order into `Processing`; it only becomes `Confirmed` once every line item has been
    /// provisioned.
    pub fn for_payment(payment: PaymentStatus) -> Self {
        let order = match payment {
            PaymentStatus::Pending | PaymentStatus::Confirming => OrderStatusType::New,
            PaymentStatus::Completed => OrderStatusType::Processing,
            PaymentStatus::Failed | PaymentStatus::Expired | PaymentStatus::Refunded => OrderStatusType::Cancelled,
        };
        Self { payment, order }
    }
}

//-------------------------------------------   PaymentProcessor  ------------------------------------------------------
/// The contract every payment processor adapter satisfies.
///
/// Implementations must be safe to share between threads: the registry hands out `Arc<dyn PaymentProcessor>` and calls
/// them concurrently from request handlers and background workers.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// The adapter name, used to select an implementation for a stored gateway configuration.
    fn name(&self) -> &'static str;

    /// The HTTP header that carries the webhook signature.
    fn signature_header(&self) -> &'static str;

    /// Validates the stored settings and returns the context for all subsequent calls. Fails with
    /// [`GatewayError::Configuration`] if the credentials are absent or malformed.
    fn initialize(&self, settings: &ProcessorSettings) -> Result<GatewayContext, GatewayError>;

    /// Creates a hosted checkout for `request.amount`.
    ///
    /// Fails with [`GatewayError::AmountOutOfRange`] without contacting the processor if the amount is outside the
    /// gateway's limits, and with a retryable [`GatewayError::Upstream`] on network faults or non-2xx responses.
    async fn create_charge(
        &self,
        ctx: &GatewayContext,
        request: ChargeRequest,
    ) -> Result<ChargeResponse, GatewayError>;

    /// Queries the processor for the native status of a charge. Has no side effects.
    async fn get_status(&self, ctx: &GatewayContext, external_reference: &str) -> Result<String, GatewayError>;

    /// Verifies a webhook signature over the canonical form of `raw_payload`. Returns false for mismatched or
    /// malformed input.
    fn verify_signature(&self, ctx: &GatewayContext, raw_payload: &[u8], signature: &str) -> bool;

    /// Extracts the external reference and native status from a parsed webhook body.
    fn parse_notification(&self, payload: &Value) -> Result<Notification, GatewayError>;

    /// Maps a native status onto the pipeline's state machines. Unknown statuses map to `Pending`/`New`.
    fn map_status(&self, native_status: &str) -> StatusMapping;
}
