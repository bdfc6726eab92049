use std::fmt::Display;

use serde::{Deserialize, Serialize};
use sfp_common::{Money, PaymentStatus};
use sfp_integrations::ConfigOption;

use crate::{
    db_types::{Order, OrderNumber, PaymentIntent},
    pricing::PriceBreakdown,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub product_ref: String,
    pub quantity: i64,
    #[serde(default)]
    pub configuration: Vec<ConfigOption>,
}

/// How a checkout is paid for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Settlement {
    /// Debit the customer's internal balance
    Balance,
    /// Redirect the buyer to an external payment gateway
    Gateway { gateway_code: String, success_url: String, cancel_url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub customer_id: String,
    #[serde(default)]
    pub email: Option<String>,
    pub items: Vec<CartItem>,
    pub settlement: Settlement,
}

/// The outcome of a single order's provisioning run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProvisioningReport {
    pub order_number: Option<OrderNumber>,
    pub provisioned: usize,
    pub failed: usize,
    /// Line items that were not attempted because they reached the attempt limit
    pub needs_review: usize,
    pub confirmed: bool,
    /// Set when the run did not take place, e.g. because the order is not paid for
    pub skipped: Option<String>,
}

impl ProvisioningReport {
    pub fn for_order(order_number: &OrderNumber) -> Self {
        Self { order_number: Some(order_number.clone()), ..Default::default() }
    }

    pub fn skipped<S: Display>(order_number: &OrderNumber, reason: S) -> Self {
        Self { skipped: Some(reason.to_string()), ..Self::for_order(order_number) }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResult {
    /// One order per cart item
    pub orders: Vec<Order>,
    pub price: PriceBreakdown,
    /// The payment intent for gateway checkouts
    pub payment: Option<PaymentIntent>,
    /// Where to redirect the buyer, for gateway checkouts
    pub checkout_url: Option<String>,
    /// Provisioning outcomes, for balance checkouts
    pub fulfilment: Vec<ProvisioningReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequest {
    pub customer_id: String,
    #[serde(default)]
    pub email: Option<String>,
    pub gateway_code: String,
    /// The amount to add to the balance, before fees and bonuses
    pub amount: Money,
    #[serde(default)]
    pub currency: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DepositResult {
    pub payment: PaymentIntent,
    pub price: PriceBreakdown,
    pub checkout_url: String,
}

/// What happened when a status change was applied to a payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Applied { from: PaymentStatus, to: PaymentStatus },
    /// The payment already had the requested status
    Unchanged { status: PaymentStatus },
    /// The transition is not allowed by the payment state machine. It was recorded in the audit trail and ignored.
    Rejected { from: PaymentStatus, to: PaymentStatus },
}

impl Display for ReconcileOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileOutcome::Applied { from, to } => write!(f, "applied {from} -> {to}"),
            ReconcileOutcome::Unchanged { status } => write!(f, "unchanged ({status})"),
            ReconcileOutcome::Rejected { from, to } => write!(f, "rejected {from} -> {to}"),
        }
    }
}

/// How a webhook delivery was handled. All of these are acknowledged to the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Reconciled { payment_id: String, outcome: ReconcileOutcome },
    /// This exact payload has been processed before
    Duplicate,
    /// No payment intent carries this external reference
    UnknownReference { external_reference: String },
    /// The payload could not be parsed
    Malformed { reason: String },
}
