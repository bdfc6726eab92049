use serde::Serialize;
use sfp_common::{Money, PaymentStatus};
use storefront_payment_engine::{
    checkout_objects::{CheckoutResult, DepositResult, ProvisioningReport},
    db_types::{OrderNumber, PaymentIntent},
};

/// The response to `POST /checkout`.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub order_numbers: Vec<OrderNumber>,
    /// Set for gateway checkouts. The storefront redirects the buyer here.
    pub checkout_url: Option<String>,
    pub payment_intent_id: Option<String>,
    pub total_charged: Money,
    pub fee_amount: Money,
    pub currency: String,
    /// Provisioning outcomes of balance checkouts
    pub fulfilment: Vec<ProvisioningReport>,
}

impl From<CheckoutResult> for CheckoutResponse {
    fn from(result: CheckoutResult) -> Self {
        let currency = result
            .orders
            .first()
            .map(|o| o.currency.clone())
            .or_else(|| result.payment.as_ref().map(|p| p.currency.clone()))
            .unwrap_or_default();
        Self {
            order_numbers: result.orders.into_iter().map(|o| o.order_number).collect(),
            checkout_url: result.checkout_url,
            payment_intent_id: result.payment.map(|p| p.id),
            total_charged: result.price.total_charged,
            fee_amount: result.price.fee_amount,
            currency,
            fulfilment: result.fulfilment,
        }
    }
}

/// The response to `POST /deposit`.
#[derive(Debug, Clone, Serialize)]
pub struct DepositResponse {
    pub payment_intent_id: String,
    pub checkout_url: String,
    pub total_charged: Money,
    pub fee_amount: Money,
    /// What the balance gains once the payment completes, bonus included
    pub effective_credit: Money,
}

impl From<DepositResult> for DepositResponse {
    fn from(result: DepositResult) -> Self {
        Self {
            effective_credit: result.payment.effective_credit(),
            payment_intent_id: result.payment.id,
            checkout_url: result.checkout_url,
            total_charged: result.price.total_charged,
            fee_amount: result.price.fee_amount,
        }
    }
}

/// The response to `POST /payment/{id}/cancel`.
#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub payment_intent_id: String,
    pub status: PaymentStatus,
}

impl From<PaymentIntent> for CancelResponse {
    fn from(intent: PaymentIntent) -> Self {
        Self { payment_intent_id: intent.id, status: intent.status }
    }
}
