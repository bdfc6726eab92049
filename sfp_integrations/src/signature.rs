//! Webhook signature helpers.
//!
//! Processors sign the JSON body of their notifications with a shared secret. Key order in a JSON object is not
//! significant, so signatures are computed over a *canonical* form of the payload: compact JSON with the keys of every
//! object sorted lexicographically.
use std::sync::Once;

use hmac::{Hmac, Mac};
use log::*;
use serde_json::Value;
use sha2::{Sha256, Sha512};

use crate::GatewayContext;

/// Serializes `value` as compact JSON with every object's keys sorted, at every depth.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys = map.keys().collect::<Vec<_>>();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(v) = map.get(key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        },
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        },
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureScheme {
    HmacSha256Hex,
    HmacSha512Hex,
    HmacSha256Base64,
}

impl SignatureScheme {
    pub fn sign(&self, secret: &[u8], message: &[u8]) -> String {
        match self {
            Self::HmacSha256Hex => hmac_sha256(secret, message).map(hex::encode),
            Self::HmacSha512Hex => hmac_sha512(secret, message).map(hex::encode),
            Self::HmacSha256Base64 => hmac_sha256(secret, message).map(base64::encode),
        }
        .unwrap_or_default()
    }

    /// Constant-time comparison of `signature` against the expected MAC. Hex signatures are accepted in either case.
    pub fn verify(&self, secret: &[u8], message: &[u8], signature: &str) -> bool {
        let signature = signature.trim();
        let received = match self {
            Self::HmacSha256Hex | Self::HmacSha512Hex => hex::decode(signature).ok(),
            Self::HmacSha256Base64 => base64::decode(signature).ok(),
        };
        let Some(received) = received else {
            debug!("🔐️ Signature is not correctly encoded for {self:?}");
            return false;
        };
        match self {
            Self::HmacSha256Hex | Self::HmacSha256Base64 => Hmac::<Sha256>::new_from_slice(secret)
                .map(|mut mac| {
                    mac.update(message);
                    mac.verify_slice(&received).is_ok()
                })
                .unwrap_or(false),
            Self::HmacSha512Hex => Hmac::<Sha512>::new_from_slice(secret)
                .map(|mut mac| {
                    mac.update(message);
                    mac.verify_slice(&received).is_ok()
                })
                .unwrap_or(false),
        }
    }
}

fn hmac_sha256(secret: &[u8], message: &[u8]) -> Option<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret).ok()?;
    mac.update(message);
    Some(mac.finalize().into_bytes().to_vec())
}

fn hmac_sha512(secret: &[u8], message: &[u8]) -> Option<Vec<u8>> {
    let mut mac = Hmac::<Sha512>::new_from_slice(secret).ok()?;
    mac.update(message);
    Some(mac.finalize().into_bytes().to_vec())
}

/// Per-adapter webhook verification, including the unsigned-webhook policy.
///
/// When a gateway has no webhook secret configured, notifications are rejected unless the gateway explicitly opts in
/// with `allow_unsigned_webhooks`. The opt-in is logged once per adapter instance.
pub struct WebhookVerifier {
    scheme: SignatureScheme,
    unsigned_warning: Once,
}

impl WebhookVerifier {
    pub const fn new(scheme: SignatureScheme) -> Self {
        Self { scheme, unsigned_warning: Once::new() }
    }

    pub fn scheme(&self) -> SignatureScheme {
        self.scheme
    }

    pub fn verify(&self, ctx: &GatewayContext, raw_payload: &[u8], signature: &str) -> bool {
        let secret = &ctx.credentials().webhook_secret;
        if secret.is_empty() {
            if ctx.allow_unsigned_webhooks() {
                self.unsigned_warning.call_once(|| {
                    warn!(
                        "🚨️ [{}] No webhook secret is configured and unsigned webhooks are explicitly allowed. \
                         Notifications for this gateway are NOT authenticated.",
                        ctx.gateway_code()
                    )
                });
                return true;
            }
            error!(
                "🔐️ [{}] No webhook secret is configured. Rejecting the notification. Configure a webhook secret, or \
                 set allow_unsigned_webhooks if you really know what you are doing.",
                ctx.gateway_code()
            );
            return false;
        }
        let value = match serde_json::from_slice::<Value>(raw_payload) {
            Ok(v) => v,
            Err(e) => {
                debug!("🔐️ [{}] Payload is not valid JSON, so it cannot be verified. {e}", ctx.gateway_code());
                return false;
            },
        };
        let canonical = canonical_json(&value);
        self.scheme.verify(secret.reveal().as_bytes(), canonical.as_bytes(), signature)
    }

    /// Signs a payload the way the processor would. Used by tests and by tooling that replays notifications.
    pub fn sign(&self, secret: &str, payload: &Value) -> String {
        self.scheme.sign(secret.as_bytes(), canonical_json(payload).as_bytes())
    }
}
