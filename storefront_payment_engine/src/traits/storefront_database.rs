use chrono::Duration;
use sfp_common::{Money, PaymentStatus};
use thiserror::Error;

use crate::{
    db_types::{
        LineItem,
        NewOrder,
        NewPaymentIntent,
        NewProvisioningResult,
        NewWebhookEvent,
        Order,
        PaymentIntent,
        ProvisioningResult,
        TransitionSource,
        UserAccount,
    },
    traits::{AccountApiError, AccountManagement, CatalogManagement, TransitionOutcome, TransitionRequest},
};

/// The highest level of behaviour for backends supporting the storefront payment engine.
///
/// This behaviour includes:
/// * Creating orders and payment intents for checkouts and deposits
/// * Applying payment status transitions with compare-and-set semantics
/// * Crediting and debiting customer balances, idempotently
/// * Recording webhook deliveries and provisioning results
#[allow(async_fn_in_trait)]
pub trait StorefrontDatabase: Clone + AccountManagement + CatalogManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Adds `amount` to the customer's balance, creating the account if necessary. Replaying the same
    /// `(reason, reference)` pair changes nothing and returns the account as it stands.
    async fn credit_balance(
        &self,
        customer_id: &str,
        amount: Money,
        reason: &str,
        reference: &str,
    ) -> Result<UserAccount, StorefrontDbError>;

    /// Removes `amount` from the customer's balance. Fails with [`StorefrontDbError::InsufficientBalance`] rather
    /// than letting the balance go negative. Replaying the same `(reason, reference)` pair changes nothing.
    async fn debit_balance(
        &self,
        customer_id: &str,
        amount: Money,
        reason: &str,
        reference: &str,
    ) -> Result<UserAccount, StorefrontDbError>;

    /// In one transaction, debits the combined total of `orders` from the customer's balance and stores the orders
    /// with status `New`. If the balance is insufficient, nothing is stored.
    async fn create_balance_checkout(
        &self,
        customer_id: &str,
        reference: &str,
        orders: Vec<NewOrder>,
    ) -> Result<Vec<Order>, StorefrontDbError>;

    /// In one transaction, stores a `Pending` checkout intent and its orders.
    async fn create_gateway_checkout(
        &self,
        intent: NewPaymentIntent,
        orders: Vec<NewOrder>,
    ) -> Result<(PaymentIntent, Vec<Order>), StorefrontDbError>;

    /// Stores a `Pending` deposit intent.
    async fn create_deposit_intent(&self, intent: NewPaymentIntent) -> Result<PaymentIntent, StorefrontDbError>;

    /// Records the processor's reference and hosted checkout URL once a charge has been created.
    async fn attach_external_reference(
        &self,
        intent_id: &str,
        external_reference: &str,
        checkout_url: &str,
    ) -> Result<PaymentIntent, StorefrontDbError>;

    async fn fetch_payment_intent_by_reference(
        &self,
        gateway_code: &str,
        external_reference: &str,
    ) -> Result<Option<PaymentIntent>, StorefrontDbError>;

    /// Whether a charge created at `gateway_code` in the last `within` is still waiting for its external reference.
    async fn has_unattached_charges(&self, gateway_code: &str, within: Duration) -> Result<bool, StorefrontDbError>;

    /// Applies a payment status transition if, and only if, the intent is still in `request.from`.
    ///
    /// In the same transaction:
    /// * an audit entry is written,
    /// * the attached orders that are not `Confirmed` or `Cancelled` move to `request.order_status`,
    /// * a deposit moving to `Completed` credits its effective credit to the customer's balance.
    ///
    /// The caller is responsible for checking that the transition is legal.
    async fn transition_payment(&self, request: TransitionRequest) -> Result<TransitionOutcome, StorefrontDbError>;

    /// Writes an audit entry for a transition that was refused, with `applied = false`.
    async fn record_rejected_transition(
        &self,
        intent_id: &str,
        from: PaymentStatus,
        to: PaymentStatus,
        source: TransitionSource,
        note: &str,
    ) -> Result<(), StorefrontDbError>;

    async fn webhook_event_exists(
        &self,
        gateway_code: &str,
        external_reference: &str,
        payload_hash: &str,
    ) -> Result<bool, StorefrontDbError>;

    /// Stores the webhook event. Returns `false` if an identical event was already stored.
    async fn record_webhook_event(&self, event: NewWebhookEvent) -> Result<bool, StorefrontDbError>;

    /// Moves a `New` order to `Processing`. Returns `None` if the order was not `New`.
    async fn mark_order_processing(&self, order_id: i64) -> Result<Option<Order>, StorefrontDbError>;

    /// Line items of the order without a successful provisioning result.
    async fn fetch_unprovisioned_line_items(&self, order_id: i64) -> Result<Vec<LineItem>, StorefrontDbError>;

    async fn count_failed_provisioning_attempts(&self, line_item_id: i64) -> Result<i64, StorefrontDbError>;

    async fn record_provisioning_result(
        &self,
        result: NewProvisioningResult,
    ) -> Result<ProvisioningResult, StorefrontDbError>;

    /// Marks the order `Confirmed` if every line item has been provisioned successfully. Returns the confirmed order,
    /// or `None` if the order is not (yet) complete or was not `Processing`.
    async fn confirm_order_if_provisioned(&self, order_id: i64) -> Result<Option<Order>, StorefrontDbError>;

    /// Orders that are paid for but still have unprovisioned line items: balance orders in `New` or `Processing`, and
    /// gateway orders in `Processing` whose intent has completed.
    async fn fetch_orders_awaiting_provisioning(&self) -> Result<Vec<Order>, StorefrontDbError>;

    /// Intents that are `Pending` or `Confirming`, have an external reference, and have not changed for at least
    /// `min_age`.
    async fn fetch_unsettled_intents(&self, min_age: Duration) -> Result<Vec<PaymentIntent>, StorefrontDbError>;

    /// `Pending` intents created more than `older_than` ago.
    async fn fetch_stale_pending_intents(&self, older_than: Duration) -> Result<Vec<PaymentIntent>, StorefrontDbError>;
}

#[derive(Debug, Clone, Error)]
pub enum StorefrontDbError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("Insufficient balance: {required} is required, but only {available} is available")]
    InsufficientBalance { required: Money, available: Money },
    #[error("The payment intent {0} does not exist")]
    PaymentIntentNotFound(String),
    #[error("The order with internal id {0} does not exist")]
    OrderIdNotFound(i64),
    #[error("The requested amount is invalid. {0}")]
    InvalidAmount(String),
    #[error("{0}")]
    AccountError(#[from] AccountApiError),
}

impl From<sqlx::Error> for StorefrontDbError {
    fn from(e: sqlx::Error) -> Self {
        StorefrontDbError::DatabaseError(e.to_string())
    }
}
