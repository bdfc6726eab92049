use blake2::{Blake2b512, Digest};
use rand::{distributions::Alphanumeric, Rng};

use crate::db_types::OrderNumber;

const ORDER_NUMBER_LENGTH: usize = 10;
const INTENT_ID_BYTES: usize = 12;

/// A fresh, human-friendly order number, e.g. `ORD-7KQ2M9XA1C`.
pub fn new_order_number() -> OrderNumber {
    let suffix = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ORDER_NUMBER_LENGTH)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect::<String>();
    OrderNumber(format!("ORD-{suffix}"))
}

/// A fresh payment intent id, e.g. `pi_4f0c9d0e6a7b1c2d3e4f5a6b`.
pub fn new_payment_intent_id() -> String {
    let bytes: [u8; INTENT_ID_BYTES] = rand::random();
    format!("pi_{}", hex::encode(bytes))
}

/// A journal reference for a balance checkout, e.g. `chk_1a2b3c...`.
pub fn new_checkout_reference() -> String {
    let bytes: [u8; INTENT_ID_BYTES] = rand::random();
    format!("chk_{}", hex::encode(bytes))
}

/// The hex-encoded Blake2b hash of a raw webhook body. Two deliveries of the same body hash identically.
pub fn payload_hash(raw: &[u8]) -> String {
    let mut hasher = Blake2b512::new();
    hasher.update(raw);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn order_numbers() {
        let n = new_order_number();
        assert!(n.as_str().starts_with("ORD-"));
        assert_eq!(n.as_str().len(), 4 + ORDER_NUMBER_LENGTH);
        assert_ne!(n, new_order_number());
    }

    #[test]
    fn intent_ids() {
        let id = new_payment_intent_id();
        assert!(id.starts_with("pi_"));
        assert_eq!(id.len(), 3 + 2 * INTENT_ID_BYTES);
    }

    #[test]
    fn hashes_are_stable() {
        let a = payload_hash(br#"{"a":1}"#);
        assert_eq!(a, payload_hash(br#"{"a":1}"#));
        assert_ne!(a, payload_hash(br#"{"a":2}"#));
        assert_eq!(a.len(), 128);
    }
}
