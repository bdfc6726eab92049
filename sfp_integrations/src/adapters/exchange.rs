//! Exchange-wallet pay orders.
//!
//! Every API request is signed: `HMAC-SHA512(api_secret, "{timestamp}\n{nonce}\n{body}\n")`, upper-case hex, with the
//! timestamp, nonce, API key and signature carried in `X-Exchange-*` headers.
//!
//! Order notifications look like
//!
//! ```json
//! { "bizType": "PAY", "bizIdStr": "29383937493038367292", "bizStatus": "PAY_SUCCESS",
//!   "data": { "prepayId": "29383937493038367292", "status": "PAID" } }
//! ```
//! and are signed with HMAC-SHA256 (base64) over the key-sorted body.
use async_trait::async_trait;
use chrono::Utc;
use log::*;
use rand::{distributions::Alphanumeric, Rng};
use serde::{de::DeserializeOwned, Deserialize};
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

pub const EXCHANGE_ADAPTER: &str = "exchange";
const NONCE_LENGTH: usize = 32;

pub struct ExchangeProcessor {
    verifier: WebhookVerifier,
}

impl Default for ExchangeProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ExchangeProcessor {
    pub fn new() -> Self {
        Self { verifier: WebhookVerifier::new(SignatureScheme::HmacSha256Base64) }
    }

    async fn signed_post<T: DeserializeOwned>(
        &self,
        ctx: &GatewayContext,
        path: &str,
        body: &Value,
    ) -> Result<T, GatewayError> {
        let body = body.to_string();
        let timestamp = Utc::now().timestamp_millis().to_string();
        let nonce = new_nonce();
        let signature = request_signature(ctx.credentials().api_secret.reveal(), &timestamp, &nonce, &body);
        let req = ctx
            .client()
            .post(ctx.url(path))
            .header("Content-Type", "application/json")
            .header("X-Exchange-Timestamp", timestamp)
            .header("X-Exchange-Nonce", nonce)
            .header("X-Exchange-ApiKey", ctx.credentials().api_key.reveal().as_str())
            .header("X-Exchange-Signature", signature)
            .body(body);
        let envelope: Envelope<T> = send_json(ctx.gateway_code(), req).await?;
        match (envelope.status.as_str(), envelope.data) {
            ("SUCCESS", Some(data)) => Ok(data),
            ("SUCCESS", None) => Err(GatewayError::MalformedResponse("Successful response without data".into())),
            (status, _) => Err(GatewayError::Upstream(format!(
                "{status}: {}",
                envelope.error_message.unwrap_or_else(|| "no error message".into())
            ))),
        }
    }
}

fn new_nonce() -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(NONCE_LENGTH).map(char::from).collect()
}

fn request_signature(secret: &str, timestamp: &str, nonce: &str, body: &str) -> String {
    let payload = format!("{timestamp}\n{nonce}\n{body}\n");
    SignatureScheme::HmacSha512Hex.sign(secret.as_bytes(), payload.as_bytes()).to_uppercase()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    status: String,
    data: Option<T>,
    error_message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedOrder {
    prepay_id: String,
    checkout_url: String,
}

#[derive(Deserialize)]
struct QueriedOrder {
    status: String,
}

#[async_trait]
impl PaymentProcessor for ExchangeProcessor {
    fn name(&self) -> &'static str {
        EXCHANGE_ADAPTER
    }

    fn signature_header(&self) -> &'static str {
        "X-Exchange-Signature"
    }

    fn initialize(&self, settings: &ProcessorSettings) -> Result<GatewayContext, GatewayError> {
        if settings.credentials.api_secret.is_empty() {
            return Err(GatewayError::Configuration(format!(
                "[{}] api_secret is required to sign exchange requests",
                settings.gateway_code
            )));
        }
        GatewayContext::from_settings(settings)
    }

    async fn create_charge(
        &self,
        ctx: &GatewayContext,
        request: ChargeRequest,
    ) -> Result<ChargeResponse, GatewayError> {
        ctx.check_amount(request.amount)?;
        // Merchant trade numbers only allow letters and digits
        let trade_no = request.order_ref.chars().filter(char::is_ascii_alphanumeric).collect::<String>();
        let body = json!({
            "env": { "terminalType": "WEB" },
            "merchantTradeNo": trade_no,
            "orderAmount": request.amount.to_string(),
            "currency": request.currency.to_uppercase(),
            "goods": { "goodsType": "02", "goodsCategory": "Z000", "referenceGoodsId": request.order_ref },
            "returnUrl": request.success_url,
            "cancelUrl": request.cancel_url,
        });
        let order: CreatedOrder = self.signed_post(ctx, "/v3/order", &body).await?;
        debug!("💳️ [{}] Pay order {} created for {}", ctx.gateway_code(), order.prepay_id, request.order_ref);
        Ok(ChargeResponse { external_reference: order.prepay_id, checkout_url: order.checkout_url })
    }

    async fn get_status(&self, ctx: &GatewayContext, external_reference: &str) -> Result<String, GatewayError> {
        let body = json!({ "prepayId": external_reference });
        let order: QueriedOrder = self.signed_post(ctx, "/v2/order/query", &body).await?;
        Ok(order.status)
    }

    fn verify_signature(&self, ctx: &GatewayContext, raw_payload: &[u8], signature: &str) -> bool {
        self.verifier.verify(ctx, raw_payload, signature)
    }

    fn parse_notification(&self, payload: &Value) -> Result<Notification, GatewayError> {
        // `data` is sometimes delivered as an embedded JSON string
        let data = match payload.get("data") {
            Some(Value::String(s)) => serde_json::from_str::<Value>(s).ok(),
            Some(v) => Some(v.clone()),
            None => None,
        };
        let data = data.as_ref();
        let external_reference = data
            .and_then(|d| string_or_number(d.get("prepayId")))
            .or_else(|| string_or_number(payload.get("bizIdStr")))
            .or_else(|| string_or_number(payload.get("bizId")))
            .ok_or_else(|| GatewayError::MalformedNotification("missing 'data.prepayId' and 'bizIdStr'".into()))?;
        let native_status = data
            .and_then(|d| string_or_number(d.get("status")))
            .or_else(|| string_or_number(payload.get("bizStatus")))
            .ok_or_else(|| GatewayError::MalformedNotification("missing 'data.status' and 'bizStatus'".into()))?;
        Ok(Notification { external_reference, native_status })
    }

    fn map_status(&self, native_status: &str) -> StatusMapping {
        let payment = match native_status.to_ascii_uppercase().as_str() {
            "INITIAL" => PaymentStatus::Pending,
            "PENDING" => PaymentStatus::Confirming,
            "PAID" | "PAY_SUCCESS" | "REFUNDING" => PaymentStatus::Completed,
            "CANCELED" | "ERROR" => PaymentStatus::Failed,
            "EXPIRED" | "PAY_CLOSED" => PaymentStatus::Expired,
            "REFUNDED" | "FULL_REFUNDED" => PaymentStatus::Refunded,
            other => {
                warn!("💳️ Unknown exchange order status '{other}'. Treating it as pending.");
                PaymentStatus::Pending
            },
        };
        StatusMapping::for_payment(payment)
    }
}
