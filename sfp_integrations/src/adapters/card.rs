//! Hosted card checkout.
//!
//! A charge is a *checkout session*: we create the session server-side and redirect the buyer to the returned URL.
//! The processor then posts session updates to our webhook:
//!
//! ```json
//! { "id": "evt_1", "type": "checkout.session.updated", "data": { "id": "cs_123", "payment_status": "paid" } }
//! ```
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

pub const CARD_ADAPTER: &str = "card";

pub struct CardProcessor {
    verifier: WebhookVerifier,
}

impl Default for CardProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl CardProcessor {
    pub fn new() -> Self {
        Self { verifier: WebhookVerifier::new(SignatureScheme::HmacSha256Hex) }
    }
}

#[derive(Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[async_trait]
impl PaymentProcessor for CardProcessor {
    fn name(&self) -> &'static str {
        CARD_ADAPTER
    }

    fn signature_header(&self) -> &'static str {
        "X-Card-Signature"
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
            "mode": "payment",
            "amount": request.amount.value(),
            "currency": request.currency.to_lowercase(),
            "client_reference_id": request.order_ref,
            "success_url": request.success_url,
            "cancel_url": request.cancel_url,
            "customer_email": request.email,
        });
        let req = ctx
            .client()
            .post(ctx.url("/v1/checkout/sessions"))
            .bearer_auth(ctx.credentials().api_key.reveal())
            .header("Idempotency-Key", request.order_ref.as_str())
            .json(&body);
        let session: SessionResponse = send_json(ctx.gateway_code(), req).await?;
        let checkout_url = session
            .url
            .ok_or_else(|| GatewayError::MalformedResponse(format!("Session {} has no checkout URL", session.id)))?;
        debug!("💳️ [{}] Checkout session {} created for {}", ctx.gateway_code(), session.id, request.order_ref);
        Ok(ChargeResponse { external_reference: session.id, checkout_url })
    }

    async fn get_status(&self, ctx: &GatewayContext, external_reference: &str) -> Result<String, GatewayError> {
        let req = ctx
            .client()
            .get(ctx.url(&format!("/v1/checkout/sessions/{external_reference}")))
            .bearer_auth(ctx.credentials().api_key.reveal());
        let session: SessionResponse = send_json(ctx.gateway_code(), req).await?;
        session.payment_status.or(session.status).ok_or_else(|| {
            GatewayError::MalformedResponse(format!("Session {external_reference} did not include a status"))
        })
    }

    fn verify_signature(&self, ctx: &GatewayContext, raw_payload: &[u8], signature: &str) -> bool {
        self.verifier.verify(ctx, raw_payload, signature)
    }

    fn parse_notification(&self, payload: &Value) -> Result<Notification, GatewayError> {
        let data = payload
            .get("data")
            .ok_or_else(|| GatewayError::MalformedNotification("missing 'data' object".into()))?;
        let external_reference = string_or_number(data.get("id"))
            .ok_or_else(|| GatewayError::MalformedNotification("missing 'data.id'".into()))?;
        let native_status = string_or_number(data.get("payment_status"))
            .or_else(|| string_or_number(data.get("status")))
            .ok_or_else(|| GatewayError::MalformedNotification("missing 'data.payment_status'".into()))?;
        Ok(Notification { external_reference, native_status })
    }

    fn map_status(&self, native_status: &str) -> StatusMapping {
        let payment = match native_status.to_ascii_lowercase().as_str() {
            "unpaid" | "open" | "requires_payment_method" => PaymentStatus::Pending,
            "processing" | "requires_capture" => PaymentStatus::Confirming,
            "paid" | "complete" | "succeeded" => PaymentStatus::Completed,
            "failed" | "canceled" => PaymentStatus::Failed,
            "expired" => PaymentStatus::Expired,
            "refunded" => PaymentStatus::Refunded,
            other => {
                warn!("💳️ Unknown card session status '{other}'. Treating it as pending.");
                PaymentStatus::Pending
            },
        };
        StatusMapping::for_payment(payment)
    }
}
