use serde::Serialize;
use sfp_common::Money;

use crate::db_types::{BalanceEntry, LineItem, Order, PaymentAuditEntry, PaymentIntent, ProvisioningResult};

/// An order with everything that hangs off it.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    pub order: Order,
    pub line_items: Vec<LineItem>,
    /// Every provisioning attempt, oldest first, failures included
    pub provisioning: Vec<ProvisioningResult>,
}

/// A payment intent with its orders and audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentDetails {
    pub payment: PaymentIntent,
    pub orders: Vec<Order>,
    pub audit: Vec<PaymentAuditEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceResult {
    pub customer_id: String,
    /// Zero for customers without an account
    pub balance: Money,
    pub history: Vec<BalanceEntry>,
}
