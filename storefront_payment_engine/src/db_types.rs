//! Records stored by the payment engine.
//!
//! Amounts are [`Money`] (minor currency units). Statuses use the two state machines from `sfp_common`.
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
pub use sfp_common::{Money, OrderStatusType, PaymentStatus};
use sfp_integrations::{ConfigOption, Credential, GatewayCredentials, ProcessorSettings};
use sqlx::{types::Json, FromRow, Type};

use crate::pricing::{BonusRule, FeeRule};

//-------------------------------------------   Catalog  ---------------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Product {
    pub id: i64,
    pub product_ref: String,
    pub name: String,
    pub unit_price: Money,
    pub currency: String,
    /// Names of the configuration options a buyer must supply, e.g. `["region"]`
    pub required_options: Json<Vec<String>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub product_ref: String,
    pub name: String,
    pub unit_price: Money,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub required_options: Vec<String>,
    #[serde(default = "yes")]
    pub is_active: bool,
}

/// A configured payment gateway. Credentials never leave the engine; the struct is not `Serialize`.
#[derive(Debug, Clone, FromRow)]
pub struct GatewayConfig {
    pub id: i64,
    pub gateway_code: String,
    /// Which adapter implementation handles this gateway, e.g. `card`
    pub adapter: String,
    pub credentials: Json<GatewayCredentials>,
    pub min_amount: Money,
    pub max_amount: Option<Money>,
    pub fee_rule: Json<FeeRule>,
    pub bonus_rules: Json<Vec<BonusRule>>,
    pub is_active: bool,
    pub allow_unsigned_webhooks: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GatewayConfig {
    pub fn processor_settings(&self) -> ProcessorSettings {
        ProcessorSettings {
            gateway_code: self.gateway_code.clone(),
            credentials: self.credentials.0.clone(),
            min_amount: self.min_amount,
            max_amount: self.max_amount,
            allow_unsigned_webhooks: self.allow_unsigned_webhooks,
        }
    }
}

/// Gateway configuration as supplied by an operator. `credentials` is kept as raw JSON so that it can be stored
/// without ever being re-serialized from a [`GatewayCredentials`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewGatewayConfig {
    pub gateway_code: String,
    pub adapter: String,
    pub credentials: serde_json::Value,
    #[serde(default)]
    pub min_amount: Money,
    #[serde(default)]
    pub max_amount: Option<Money>,
    #[serde(default)]
    pub fee_rule: FeeRule,
    #[serde(default)]
    pub bonus_rules: Vec<BonusRule>,
    #[serde(default = "yes")]
    pub is_active: bool,
    #[serde(default)]
    pub allow_unsigned_webhooks: bool,
}

fn yes() -> bool {
    true
}

fn default_currency() -> String {
    sfp_common::DEFAULT_CURRENCY_CODE.to_string()
}

//-------------------------------------------   Payment intents  -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum PaymentPurpose {
    /// Pays for one or more orders
    Checkout,
    /// Tops up the customer's balance
    Deposit,
}

impl Display for PaymentPurpose {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentPurpose::Checkout => write!(f, "Checkout"),
            PaymentPurpose::Deposit => write!(f, "Deposit"),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PaymentIntent {
    pub id: String,
    pub gateway_code: String,
    pub purpose: PaymentPurpose,
    pub customer_id: String,
    /// The base amount before fees
    pub amount_requested: Money,
    /// What the gateway charges the buyer, fees included
    pub amount_charged: Money,
    pub fee_amount: Money,
    pub bonus_amount: Money,
    pub currency: String,
    pub status: PaymentStatus,
    pub external_reference: Option<String>,
    pub checkout_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentIntent {
    /// What the customer's balance gains when a deposit completes.
    pub fn effective_credit(&self) -> Money {
        self.amount_requested + self.bonus_amount
    }
}

#[derive(Debug, Clone)]
pub struct NewPaymentIntent {
    pub id: String,
    pub gateway_code: String,
    pub purpose: PaymentPurpose,
    pub customer_id: String,
    pub amount_requested: Money,
    pub amount_charged: Money,
    pub fee_amount: Money,
    pub bonus_amount: Money,
    pub currency: String,
}

/// Who asked for a payment status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TransitionSource {
    Checkout,
    Webhook,
    Poll,
    Buyer,
    Expiry,
}

impl Display for TransitionSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransitionSource::Checkout => "checkout",
            TransitionSource::Webhook => "webhook",
            TransitionSource::Poll => "poll",
            TransitionSource::Buyer => "buyer",
            TransitionSource::Expiry => "expiry",
        };
        f.write_str(s)
    }
}

/// One row of the payment audit trail. Rejected transitions are recorded with `applied = false`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PaymentAuditEntry {
    pub id: i64,
    pub payment_intent_id: String,
    pub from_status: Option<PaymentStatus>,
    pub to_status: PaymentStatus,
    pub source: TransitionSource,
    pub applied: bool,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

//-------------------------------------------   Orders  ----------------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderNumber(pub String);

impl FromStr for OrderNumber {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderNumber {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Display for OrderNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl OrderNumber {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum SettlementMethod {
    /// Paid from the customer's internal balance
    Balance,
    /// Paid through an external payment gateway
    Gateway,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Order {
    pub id: i64,
    pub order_number: OrderNumber,
    pub customer_id: String,
    pub buyer_email: Option<String>,
    pub settlement: SettlementMethod,
    pub payment_intent_id: Option<String>,
    pub total_amount: Money,
    pub currency: String,
    pub status: OrderStatusType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: OrderNumber,
    pub customer_id: String,
    pub buyer_email: Option<String>,
    pub currency: String,
    pub line_items: Vec<NewLineItem>,
}

impl NewOrder {
    pub fn total_amount(&self) -> Money {
        self.line_items.iter().map(|li| li.price).sum()
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LineItem {
    pub id: i64,
    pub order_id: i64,
    pub product_ref: String,
    pub quantity: i64,
    pub configuration: Json<Vec<ConfigOption>>,
    /// Unit price times quantity
    pub price: Money,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLineItem {
    pub product_ref: String,
    pub quantity: i64,
    pub configuration: Vec<ConfigOption>,
    pub price: Money,
}

//-------------------------------------------   Fulfilment  ------------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProvisioningResult {
    pub id: i64,
    pub order_id: i64,
    pub line_item_id: i64,
    pub success: bool,
    pub credentials: Json<Vec<Credential>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewProvisioningResult {
    pub order_id: i64,
    pub line_item_id: i64,
    pub outcome: Result<Vec<Credential>, String>,
}

//-------------------------------------------   Webhooks  --------------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WebhookEvent {
    pub id: i64,
    pub gateway_code: String,
    pub external_reference: String,
    pub payload_hash: String,
    pub signature_valid: bool,
    pub outcome: String,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewWebhookEvent {
    pub gateway_code: String,
    pub external_reference: String,
    pub payload_hash: String,
    pub signature_valid: bool,
    pub outcome: String,
}

//-------------------------------------------   Accounts  --------------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserAccount {
    pub id: i64,
    pub customer_id: String,
    pub email: Option<String>,
    pub balance: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A balance journal entry. `(reason, reference)` is unique, so replaying a credit or debit is a no-op.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BalanceEntry {
    pub id: i64,
    pub account_id: i64,
    pub amount: Money,
    pub balance_after: Money,
    pub reason: String,
    pub reference: String,
    pub created_at: DateTime<Utc>,
}
