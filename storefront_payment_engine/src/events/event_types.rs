use sfp_common::PaymentStatus;

use crate::db_types::{Order, PaymentIntent, TransitionSource};

/// Every line item of the order has been provisioned and the order is now `Confirmed`.
#[derive(Debug, Clone)]
pub struct OrderConfirmedEvent {
    pub order: Order,
}

impl OrderConfirmedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// A provisioning attempt for one line item failed. The order stays in `Processing` and will be retried by the
/// fulfilment sweep until the attempt limit is reached.
#[derive(Debug, Clone)]
pub struct ProvisioningFailedEvent {
    pub order: Order,
    pub line_item_id: i64,
    pub attempts: i64,
    pub error: String,
}

/// A payment intent changed status.
#[derive(Debug, Clone)]
pub struct PaymentStatusChangedEvent {
    pub intent: PaymentIntent,
    pub old_status: PaymentStatus,
    pub source: TransitionSource,
}

impl PaymentStatusChangedEvent {
    pub fn new(intent: PaymentIntent, old_status: PaymentStatus, source: TransitionSource) -> Self {
        Self { intent, old_status, source }
    }
}
