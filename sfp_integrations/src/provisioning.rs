use std::{fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use log::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sfp_common::Secret;

use crate::ProvisioningError;

const PROVISIONING_TIMEOUT: Duration = Duration::from_secs(60);

/// One option chosen by the buyer for a product, e.g. `{ "name": "region", "value": "eu-west" }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigOption {
    pub name: String,
    pub value: String,
}

/// What to provision for a single line item.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProvisioningRequest {
    pub line_item_id: i64,
    pub product_ref: String,
    pub quantity: i64,
    pub configuration: Vec<ConfigOption>,
}

impl ProvisioningRequest {
    /// Repeated calls with the same key must not provision twice.
    pub fn idempotency_key(&self, order_number: &str) -> String {
        format!("{order_number}:{}", self.line_item_id)
    }
}

/// A provisioned credential, e.g. `{ "label": "licence_key", "value": "XXXX-YYYY" }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub label: String,
    pub value: String,
}

/// The downstream service that issues credentials for purchased products.
///
/// Implementations must be idempotent per order number and line item, since the fulfilment sweep retries failed
/// calls.
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn issue(
        &self,
        order_number: &str,
        request: &ProvisioningRequest,
    ) -> Result<Vec<Credential>, ProvisioningError>;
}

#[derive(Serialize)]
struct IssueBody<'a> {
    order_number: &'a str,
    product_ref: &'a str,
    quantity: i64,
    options: &'a [ConfigOption],
}

#[derive(Deserialize)]
struct IssueResponse {
    credentials: Vec<Credential>,
}

/// A [`CredentialIssuer`] that calls a provisioning service over HTTP: `POST {url}/issue`.
#[derive(Clone)]
pub struct HttpCredentialIssuer {
    url: String,
    api_key: Secret<String>,
    client: Arc<Client>,
}

impl Debug for HttpCredentialIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HttpCredentialIssuer({})", self.url)
    }
}

impl HttpCredentialIssuer {
    pub fn new(url: &str, api_key: Secret<String>) -> Result<Self, ProvisioningError> {
        let url = url.trim().trim_end_matches('/').to_string();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ProvisioningError::Configuration(format!("'{url}' is not a valid provisioning URL")));
        }
        let client = Client::builder()
            .timeout(PROVISIONING_TIMEOUT)
            .build()
            .map_err(|e| ProvisioningError::Configuration(e.to_string()))?;
        Ok(Self { url, api_key, client: Arc::new(client) })
    }
}

#[async_trait]
impl CredentialIssuer for HttpCredentialIssuer {
    async fn issue(
        &self,
        order_number: &str,
        request: &ProvisioningRequest,
    ) -> Result<Vec<Credential>, ProvisioningError> {
        let body = IssueBody {
            order_number,
            product_ref: &request.product_ref,
            quantity: request.quantity,
            options: &request.configuration,
        };
        trace!("📦️ Requesting credentials for {order_number} / {}", request.product_ref);
        let response = self
            .client
            .post(format!("{}/issue", self.url))
            .bearer_auth(self.api_key.reveal())
            .header("Idempotency-Key", request.idempotency_key(order_number))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProvisioningError::Unreachable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProvisioningError::Rejected { status: status.as_u16(), message });
        }
        let issued: IssueResponse =
            response.json().await.map_err(|e| ProvisioningError::InvalidResponse(e.to_string()))?;
        if issued.credentials.is_empty() {
            return Err(ProvisioningError::InvalidResponse(format!("No credentials were issued for {order_number}")));
        }
        Ok(issued.credentials)
    }
}
