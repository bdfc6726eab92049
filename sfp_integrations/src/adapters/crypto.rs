//! Crypto invoice processor.
//!
//! The buyer pays an invoice in the cryptocurrency of their choice. Payment progress is pushed to us as IPN callbacks
//! signed with HMAC-SHA512 over the key-sorted body:
//!
//! ```json
//! { "payment_id": 5077125051, "invoice_id": 4522625843, "payment_status": "confirming", "order_id": "pi_3f2a" }
//! ```
//!
//! Prices are quoted in fiat as decimal strings; the processor handles the conversion.
use async_trait::async_trait;
use log::*;
use serde::Deserialize;
use serde_json::{json, Value};
use sfp_common::PaymentStatus;

use crate::{
    adapters::string_or_number,
    http::send_json,
    signature::{SignatureScheme, WebhookVerifier},
    ChargeRequest,
    ChargeResponse,
    GatewayContext,
    GatewayError,
    Notification,
    PaymentProcessor,
    ProcessorSettings,
    StatusMapping,
};

pub const CRYPTO_ADAPTER: &str = "crypto";

pub struct CryptoProcessor {
    verifier: WebhookVerifier,
}

impl Default for CryptoProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl CryptoProcessor {
    pub fn new() -> Self {
        Self { verifier: WebhookVerifier::new(SignatureScheme::HmacSha512Hex) }
    }
}

#[derive(Deserialize)]
struct InvoiceResponse {
    id: Value,
    invoice_url: Option<String>,
}

#[derive(Deserialize)]
struct InvoiceStatus {
    payment_status: Option<String>,
}

#[async_trait]
impl PaymentProcessor for CryptoProcessor {
    fn name(&self) -> &'static str {
        CRYPTO_ADAPTER
    }

    fn signature_header(&self) -> &'static str {
        "X-Crypto-Signature"
    }

    fn initialize(&self, settings: &ProcessorSettings) -> Result<GatewayContext, GatewayError> {
        GatewayContext::from_settings(settings)
    }

    async fn create_charge(
        &self,
        ctx: &GatewayContext,
        request: ChargeRequest,
    ) -> Result<ChargeResponse, GatewayError> {
        ctx.check_amount(request.amount)?;
        let body = json!({
            "price_amount": request.amount.to_string(),
            "price_currency": request.currency.to_lowercase(),
            "order_id": request.order_ref,
            "order_description": format!("Order {}", request.order_ref),
            "success_url": request.success_url,
            "cancel_url": request.cancel_url,
        });
        let req = ctx
            .client()
            .post(ctx.url("/v1/invoice"))
            .header("x-api-key", ctx.credentials().api_key.reveal().as_str())
            .json(&body);
        let invoice: InvoiceResponse = send_json(ctx.gateway_code(), req).await?;
        let external_reference = string_or_number(Some(&invoice.id))
            .ok_or_else(|| GatewayError::MalformedResponse("Invoice response did not include an id".into()))?;
        let checkout_url = invoice.invoice_url.ok_or_else(|| {
            GatewayError::MalformedResponse(format!("Invoice {external_reference} has no invoice URL"))
        })?;
        debug!("💳️ [{}] Invoice {external_reference} created for {}", ctx.gateway_code(), request.order_ref);
        Ok(ChargeResponse { external_reference, checkout_url })
    }

    async fn get_status(&self, ctx: &GatewayContext, external_reference: &str) -> Result<String, GatewayError> {
        let req = ctx
            .client()
            .get(ctx.url(&format!("/v1/invoice/{external_reference}")))
            .header("x-api-key", ctx.credentials().api_key.reveal().as_str());
        let status: InvoiceStatus = send_json(ctx.gateway_code(), req).await?;
        status.payment_status.ok_or_else(|| {
            GatewayError::MalformedResponse(format!("Invoice {external_reference} did not include a status"))
        })
    }

    fn verify_signature(&self, ctx: &GatewayContext, raw_payload: &[u8], signature: &str) -> bool {
        self.verifier.verify(ctx, raw_payload, signature)
    }

    fn parse_notification(&self, payload: &Value) -> Result<Notification, GatewayError> {
        let external_reference = string_or_number(payload.get("invoice_id"))
            .ok_or_else(|| GatewayError::MalformedNotification("missing 'invoice_id'".into()))?;
        let native_status = string_or_number(payload.get("payment_status"))
            .ok_or_else(|| GatewayError::MalformedNotification("missing 'payment_status'".into()))?;
        Ok(Notification { external_reference, native_status })
    }

    fn map_status(&self, native_status: &str) -> StatusMapping {
        let payment = match native_status.to_ascii_lowercase().as_str() {
            "waiting" | "partially_paid" => PaymentStatus::Pending,
            "confirming" | "confirmed" | "sending" => PaymentStatus::Confirming,
            "finished" => PaymentStatus::Completed,
            "failed" => PaymentStatus::Failed,
            "expired" => PaymentStatus::Expired,
            "refunded" => PaymentStatus::Refunded,
            other => {
                warn!("💳️ Unknown crypto invoice status '{other}'. Treating it as pending.");
                PaymentStatus::Pending
            },
        };
        StatusMapping::for_payment(payment)
    }
}
