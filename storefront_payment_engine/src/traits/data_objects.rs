use sfp_common::{Money, OrderStatusType, PaymentStatus};

use crate::db_types::{Order, PaymentIntent, TransitionSource};

/// A compare-and-set request: move the intent from `from` to `to`, but only if it is still in `from`.
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub intent_id: String,
    pub from: PaymentStatus,
    pub to: PaymentStatus,
    /// Applied to every attached order that has not reached a final status
    pub order_status: OrderStatusType,
    pub source: TransitionSource,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// The transition was applied. `orders` are the intent's orders after the update. `credited` is set when a
    /// completed deposit was credited to the customer's balance.
    Applied { intent: PaymentIntent, orders: Vec<Order>, credited: Option<Money> },
    /// The intent was no longer in the expected status. Nothing was changed.
    Stale { current: PaymentIntent },
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied { .. })
    }

    pub fn intent(&self) -> &PaymentIntent {
        match self {
            TransitionOutcome::Applied { intent, .. } => intent,
            TransitionOutcome::Stale { current } => current,
        }
    }
}
