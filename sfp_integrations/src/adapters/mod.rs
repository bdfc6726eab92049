//! Concrete payment processor adapters.
//!
//! | adapter    | checkout style                     | webhook signature                              |
//! |------------|------------------------------------|------------------------------------------------|
//! | `card`     | hosted card checkout session       | HMAC-SHA256, hex, `X-Card-Signature`           |
//! | `crypto`   | crypto invoice with IPN callbacks  | HMAC-SHA512, hex, `X-Crypto-Signature`         |
//! | `exchange` | exchange-wallet pay order          | HMAC-SHA256, base64, `X-Exchange-Signature`    |
use std::sync::Arc;

use serde_json::Value;

use crate::PaymentProcessor;

mod card;
mod crypto;
mod exchange;

pub use card::{CardProcessor, CARD_ADAPTER};
pub use crypto::{CryptoProcessor, CRYPTO_ADAPTER};
pub use exchange::{ExchangeProcessor, EXCHANGE_ADAPTER};

/// Returns a fresh adapter instance for the given adapter name, or `None` if no such adapter exists.
pub fn processor_for_adapter(name: &str) -> Option<Arc<dyn PaymentProcessor>> {
    match name {
        CARD_ADAPTER => Some(Arc::new(CardProcessor::new())),
        CRYPTO_ADAPTER => Some(Arc::new(CryptoProcessor::new())),
        EXCHANGE_ADAPTER => Some(Arc::new(ExchangeProcessor::new())),
        _ => None,
    }
}

/// Reads a JSON field that processors send as either a string or a number.
pub(crate) fn string_or_number(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
