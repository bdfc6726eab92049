//! Read access to customer balances, orders and payments, plus manual balance adjustments.
use std::fmt::Debug;

use log::*;
use sfp_common::Money;

use crate::{
    db_types::{Order, OrderNumber, UserAccount},
    spe_api::account_objects::{BalanceResult, OrderDetails, PaymentDetails},
    traits::{AccountApiError, AccountManagement, StorefrontDatabase, StorefrontDbError},
};

/// The `AccountsApi` provides a unified API for querying customer accounts and their history.
#[derive(Clone)]
pub struct AccountsApi<B> {
    db: B,
}

impl<B> Debug for AccountsApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccountsApi")
    }
}

impl<B> AccountsApi<B>
where B: AccountManagement
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn account(&self, customer_id: &str) -> Result<Option<UserAccount>, AccountApiError> {
        self.db.fetch_user_account_for_customer_id(customer_id).await
    }

    /// The customer's balance and journal. Customers who never deposited or spent anything have a zero balance.
    pub async fn balance(&self, customer_id: &str) -> Result<BalanceResult, AccountApiError> {
        let balance = self.account(customer_id).await?.map(|a| a.balance).unwrap_or_default();
        let history = self.db.fetch_balance_history(customer_id).await?;
        trace!("🗃️ Balance for {customer_id}: {balance} ({} journal entries)", history.len());
        Ok(BalanceResult { customer_id: customer_id.to_string(), balance, history })
    }

    pub async fn order_details(&self, order_number: &OrderNumber) -> Result<Option<OrderDetails>, AccountApiError> {
        let Some(order) = self.db.fetch_order_by_number(order_number).await? else {
            return Ok(None);
        };
        let line_items = self.db.fetch_line_items(order.id).await?;
        let provisioning = self.db.fetch_provisioning_results(order.id).await?;
        Ok(Some(OrderDetails { order, line_items, provisioning }))
    }

    pub async fn payment_details(&self, intent_id: &str) -> Result<Option<PaymentDetails>, AccountApiError> {
        let Some(payment) = self.db.fetch_payment_intent(intent_id).await? else {
            return Ok(None);
        };
        let orders = self.db.fetch_orders_for_payment_intent(intent_id).await?;
        let audit = self.db.fetch_payment_audit(intent_id).await?;
        Ok(Some(PaymentDetails { payment, orders, audit }))
    }

    pub async fn orders_for_customer(&self, customer_id: &str) -> Result<Vec<Order>, AccountApiError> {
        self.db.fetch_orders_for_customer(customer_id).await
    }
}

impl<B> AccountsApi<B>
where B: StorefrontDatabase
{
    /// Adds `amount` to the customer's balance, e.g. for a goodwill credit or a refund. Replaying the same `reference`
    /// has no further effect.
    pub async fn credit(
        &self,
        customer_id: &str,
        amount: Money,
        reason: &str,
        reference: &str,
    ) -> Result<UserAccount, StorefrontDbError> {
        if !amount.is_positive() {
            return Err(StorefrontDbError::InvalidAmount(format!("Credits must be positive, not {amount}")));
        }
        let account = self.db.credit_balance(customer_id, amount, reason, reference).await?;
        info!("🗃️ Credited {amount} to {customer_id} ({reason}: {reference}). Balance is now {}", account.balance);
        Ok(account)
    }

    /// Removes `amount` from the customer's balance. Fails with `InsufficientBalance` if the balance is too low.
    pub async fn debit(
        &self,
        customer_id: &str,
        amount: Money,
        reason: &str,
        reference: &str,
    ) -> Result<UserAccount, StorefrontDbError> {
        if !amount.is_positive() {
            return Err(StorefrontDbError::InvalidAmount(format!("Debits must be positive, not {amount}")));
        }
        let account = self.db.debit_balance(customer_id, amount, reason, reference).await?;
        info!("🗃️ Debited {amount} from {customer_id} ({reason}: {reference}). Balance is now {}", account.balance);
        Ok(account)
    }
}
