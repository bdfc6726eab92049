use thiserror::Error;

use crate::db_types::{
    BalanceEntry,
    LineItem,
    Order,
    OrderNumber,
    PaymentAuditEntry,
    PaymentIntent,
    ProvisioningResult,
    UserAccount,
    WebhookEvent,
};

#[derive(Debug, Clone, Error)]
pub enum AccountApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("User error constructing query: {0}")]
    QueryError(String),
}

impl From<sqlx::Error> for AccountApiError {
    fn from(e: sqlx::Error) -> Self {
        AccountApiError::DatabaseError(e.to_string())
    }
}

/// Read-only queries over customer accounts and everything hanging off them.
///
/// Nothing here changes state. The [`crate::traits::StorefrontDatabase`] trait does the writing.
#[allow(async_fn_in_trait)]
pub trait AccountManagement {
    async fn fetch_user_account_for_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<UserAccount>, AccountApiError>;

    /// Balance journal entries for the customer, oldest first.
    async fn fetch_balance_history(&self, customer_id: &str) -> Result<Vec<BalanceEntry>, AccountApiError>;

    async fn fetch_order_by_number(&self, order_number: &OrderNumber) -> Result<Option<Order>, AccountApiError>;

    async fn fetch_orders_for_customer(&self, customer_id: &str) -> Result<Vec<Order>, AccountApiError>;

    async fn fetch_line_items(&self, order_id: i64) -> Result<Vec<LineItem>, AccountApiError>;

    /// Every provisioning attempt for the order, successful or not, oldest first.
    async fn fetch_provisioning_results(&self, order_id: i64) -> Result<Vec<ProvisioningResult>, AccountApiError>;

    async fn fetch_payment_intent(&self, intent_id: &str) -> Result<Option<PaymentIntent>, AccountApiError>;

    async fn fetch_orders_for_payment_intent(&self, intent_id: &str) -> Result<Vec<Order>, AccountApiError>;

    /// The audit trail for a payment intent, oldest first. Rejected transitions are included.
    async fn fetch_payment_audit(&self, intent_id: &str) -> Result<Vec<PaymentAuditEntry>, AccountApiError>;

    async fn fetch_webhook_events(
        &self,
        gateway_code: &str,
        external_reference: &str,
    ) -> Result<Vec<WebhookEvent>, AccountApiError>;
}
