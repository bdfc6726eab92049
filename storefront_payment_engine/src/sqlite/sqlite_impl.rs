//! `SqliteDatabase` is a concrete implementation of a storefront payment engine backend.
//!
//! It uses SQLite as the backend and implements all the traits defined in the [`crate::traits`] module. Every write
//! runs inside a `BEGIN IMMEDIATE` transaction (see `db::begin_immediate`) that is committed before the method
//! returns, so a read on another pooled connection always sees it.
use std::fmt::Debug;

use chrono::Duration;
use log::*;
use sfp_common::{Money, OrderStatusType, PaymentStatus};
use sqlx::SqlitePool;

use super::db::{
    accounts,
    begin_immediate,
    catalog,
    db_url,
    finish,
    fulfilment,
    new_pool,
    orders,
    payment_intents,
    webhooks,
};
use crate::{
    db_types::{
        BalanceEntry,
        GatewayConfig,
        LineItem,
        NewGatewayConfig,
        NewOrder,
        NewPaymentIntent,
        NewProduct,
        NewProvisioningResult,
        NewWebhookEvent,
        Order,
        OrderNumber,
        PaymentAuditEntry,
        PaymentIntent,
        PaymentPurpose,
        Product,
        ProvisioningResult,
        SettlementMethod,
        TransitionSource,
        UserAccount,
        WebhookEvent,
    },
    traits::{
        AccountApiError,
        AccountManagement,
        CatalogManagement,
        StorefrontDatabase,
        StorefrontDbError,
        TransitionOutcome,
        TransitionRequest,
    },
};

pub const DEPOSIT_REASON: &str = "deposit";
pub const CHECKOUT_REASON: &str = "checkout";

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl StorefrontDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn credit_balance(
        &self,
        customer_id: &str,
        amount: Money,
        reason: &str,
        reference: &str,
    ) -> Result<UserAccount, StorefrontDbError> {
        if !amount.is_positive() {
            return Err(StorefrontDbError::InvalidAmount(format!("Cannot credit {amount}")));
        }
        let mut conn = begin_immediate(&self.pool).await?;
        let result = async {
            let account = accounts::fetch_or_create_account(customer_id, None, &mut conn).await?;
            let (account, _) = accounts::adjust_balance(account.id, amount, reason, reference, &mut conn).await?;
            Ok::<_, StorefrontDbError>(account)
        }
        .await;
        finish(conn, result).await
    }

    async fn debit_balance(
        &self,
        customer_id: &str,
        amount: Money,
        reason: &str,
        reference: &str,
    ) -> Result<UserAccount, StorefrontDbError> {
        if !amount.is_positive() {
            return Err(StorefrontDbError::InvalidAmount(format!("Cannot debit {amount}")));
        }
        let mut conn = begin_immediate(&self.pool).await?;
        let result = async {
            let account = accounts::fetch_account_by_customer_id(customer_id, &mut conn)
                .await?
                .ok_or(StorefrontDbError::InsufficientBalance { required: amount, available: Money::default() })?;
            let (account, _) = accounts::adjust_balance(account.id, -amount, reason, reference, &mut conn).await?;
            Ok::<_, StorefrontDbError>(account)
        }
        .await;
        finish(conn, result).await
    }

    async fn create_balance_checkout(
        &self,
        customer_id: &str,
        reference: &str,
        new_orders: Vec<NewOrder>,
    ) -> Result<Vec<Order>, StorefrontDbError> {
        let total = Money::checked_sum(new_orders.iter().map(NewOrder::total_amount))
            .ok_or_else(|| StorefrontDbError::InvalidAmount(format!("Checkout {reference} total is too large")))?;
        let mut conn = begin_immediate(&self.pool).await?;
        let result = async {
            let account = accounts::fetch_account_by_customer_id(customer_id, &mut conn)
                .await?
                .ok_or(StorefrontDbError::InsufficientBalance { required: total, available: Money::default() })?;
            let (account, applied) =
                accounts::adjust_balance(account.id, -total, CHECKOUT_REASON, reference, &mut conn).await?;
            if !applied {
                return Err(StorefrontDbError::DatabaseError(format!("Checkout {reference} has already been paid")));
            }
            let mut result = Vec::with_capacity(new_orders.len());
            for order in new_orders {
                let order = orders::insert_order(order, SettlementMethod::Balance, None, &mut conn).await?;
                result.push(order);
            }
            debug!(
                "🗃️ {} orders paid from the balance of {customer_id}. {total} debited, {} remains",
                result.len(),
                account.balance
            );
            Ok::<_, StorefrontDbError>(result)
        }
        .await;
        finish(conn, result).await
    }

    async fn create_gateway_checkout(
        &self,
        intent: NewPaymentIntent,
        new_orders: Vec<NewOrder>,
    ) -> Result<(PaymentIntent, Vec<Order>), StorefrontDbError> {
        let mut conn = begin_immediate(&self.pool).await?;
        let result = async {
            let intent = payment_intents::insert_payment_intent(intent, &mut conn).await?;
            let mut result = Vec::with_capacity(new_orders.len());
            for order in new_orders {
                let intent_id = Some(intent.id.as_str());
                let order = orders::insert_order(order, SettlementMethod::Gateway, intent_id, &mut conn).await?;
                result.push(order);
            }
            Ok::<_, StorefrontDbError>((intent, result))
        }
        .await;
        finish(conn, result).await
    }

    async fn create_deposit_intent(&self, intent: NewPaymentIntent) -> Result<PaymentIntent, StorefrontDbError> {
        let mut conn = begin_immediate(&self.pool).await?;
        let result = async {
            accounts::fetch_or_create_account(&intent.customer_id, None, &mut conn).await?;
            let intent = payment_intents::insert_payment_intent(intent, &mut conn).await?;
            Ok::<_, StorefrontDbError>(intent)
        }
        .await;
        finish(conn, result).await
    }

    async fn attach_external_reference(
        &self,
        intent_id: &str,
        external_reference: &str,
        checkout_url: &str,
    ) -> Result<PaymentIntent, StorefrontDbError> {
        let mut conn = begin_immediate(&self.pool).await?;
        let result = async {
            let intent =
                payment_intents::attach_external_reference(intent_id, external_reference, checkout_url, &mut conn)
                    .await?;
            intent.ok_or_else(|| StorefrontDbError::PaymentIntentNotFound(intent_id.to_string()))
        }
        .await;
        finish(conn, result).await
    }

    async fn fetch_payment_intent_by_reference(
        &self,
        gateway_code: &str,
        external_reference: &str,
    ) -> Result<Option<PaymentIntent>, StorefrontDbError> {
        let mut conn = self.pool.acquire().await?;
        let intent =
            payment_intents::fetch_payment_intent_by_reference(gateway_code, external_reference, &mut conn).await?;
        Ok(intent)
    }

    async fn has_unattached_charges(&self, gateway_code: &str, within: Duration) -> Result<bool, StorefrontDbError> {
        let mut conn = self.pool.acquire().await?;
        let count = payment_intents::count_unattached_pending_intents(gateway_code, within, &mut conn).await?;
        Ok(count > 0)
    }

    async fn transition_payment(&self, request: TransitionRequest) -> Result<TransitionOutcome, StorefrontDbError> {
        let mut conn = begin_immediate(&self.pool).await?;
        let result = async {
            let updated =
                payment_intents::compare_and_set_status(&request.intent_id, request.from, request.to, &mut conn)
                    .await?;
            let Some(intent) = updated else {
                let current = payment_intents::fetch_payment_intent(&request.intent_id, &mut conn)
                    .await?
                    .ok_or_else(|| StorefrontDbError::PaymentIntentNotFound(request.intent_id.clone()))?;
                return Ok(TransitionOutcome::Stale { current });
            };
            payment_intents::insert_audit_entry(
                &intent.id,
                Some(request.from),
                request.to,
                request.source,
                true,
                request.note.as_deref(),
                &mut conn,
            )
            .await?;
            let n = orders::update_status_for_payment_intent(&intent.id, request.order_status, &mut conn).await?;
            trace!("🗃️ {n} orders for {} moved to {}", intent.id, request.order_status);
            let credited = if intent.purpose == PaymentPurpose::Deposit && request.to == PaymentStatus::Completed {
                let account = accounts::fetch_or_create_account(&intent.customer_id, None, &mut conn).await?;
                let credit = intent.effective_credit();
                let (_, applied) =
                    accounts::adjust_balance(account.id, credit, DEPOSIT_REASON, &intent.id, &mut conn).await?;
                applied.then_some(credit)
            } else {
                None
            };
            let orders = orders::fetch_orders_for_payment_intent(&intent.id, &mut conn).await?;
            debug!(
                "🗃️ Payment {} moved from {} to {} ({})",
                intent.id, request.from, request.to, request.source
            );
            Ok::<_, StorefrontDbError>(TransitionOutcome::Applied { intent, orders, credited })
        }
        .await;
        finish(conn, result).await
    }

    async fn record_rejected_transition(
        &self,
        intent_id: &str,
        from: PaymentStatus,
        to: PaymentStatus,
        source: TransitionSource,
        note: &str,
    ) -> Result<(), StorefrontDbError> {
        let mut conn = begin_immediate(&self.pool).await?;
        let result = async {
            payment_intents::insert_audit_entry(intent_id, Some(from), to, source, false, Some(note), &mut conn)
                .await?;
            Ok::<_, StorefrontDbError>(())
        }
        .await;
        finish(conn, result).await
    }

    async fn webhook_event_exists(
        &self,
        gateway_code: &str,
        external_reference: &str,
        payload_hash: &str,
    ) -> Result<bool, StorefrontDbError> {
        let mut conn = self.pool.acquire().await?;
        let exists = webhooks::webhook_event_exists(gateway_code, external_reference, payload_hash, &mut conn).await?;
        Ok(exists)
    }

    async fn record_webhook_event(&self, event: NewWebhookEvent) -> Result<bool, StorefrontDbError> {
        let mut conn = begin_immediate(&self.pool).await?;
        let result = async {
            let inserted = webhooks::insert_webhook_event(event, &mut conn).await?;
            Ok::<_, StorefrontDbError>(inserted)
        }
        .await;
        finish(conn, result).await
    }

    async fn mark_order_processing(&self, order_id: i64) -> Result<Option<Order>, StorefrontDbError> {
        let mut conn = begin_immediate(&self.pool).await?;
        let result = async {
            let order =
                orders::compare_and_set_status(order_id, OrderStatusType::New, OrderStatusType::Processing, &mut conn)
                    .await?;
            Ok::<_, StorefrontDbError>(order)
        }
        .await;
        finish(conn, result).await
    }

    async fn fetch_unprovisioned_line_items(&self, order_id: i64) -> Result<Vec<LineItem>, StorefrontDbError> {
        let mut conn = self.pool.acquire().await?;
        let items = fulfilment::fetch_unprovisioned_line_items(order_id, &mut conn).await?;
        Ok(items)
    }

    async fn count_failed_provisioning_attempts(&self, line_item_id: i64) -> Result<i64, StorefrontDbError> {
        let mut conn = self.pool.acquire().await?;
        let count = fulfilment::count_failed_attempts(line_item_id, &mut conn).await?;
        Ok(count)
    }

    async fn record_provisioning_result(
        &self,
        result: NewProvisioningResult,
    ) -> Result<ProvisioningResult, StorefrontDbError> {
        let mut conn = begin_immediate(&self.pool).await?;
        let saved = async {
            let saved = fulfilment::insert_provisioning_result(result, &mut conn).await?;
            Ok::<_, StorefrontDbError>(saved)
        }
        .await;
        finish(conn, saved).await
    }

    async fn confirm_order_if_provisioned(&self, order_id: i64) -> Result<Option<Order>, StorefrontDbError> {
        let mut conn = begin_immediate(&self.pool).await?;
        let result = async {
            if !fulfilment::is_fully_provisioned(order_id, &mut conn).await? {
                return Ok(None);
            }
            let order = orders::compare_and_set_status(
                order_id,
                OrderStatusType::Processing,
                OrderStatusType::Confirmed,
                &mut conn,
            )
            .await?;
            Ok::<_, StorefrontDbError>(order)
        }
        .await;
        finish(conn, result).await
    }

    async fn fetch_orders_awaiting_provisioning(&self) -> Result<Vec<Order>, StorefrontDbError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_orders_awaiting_provisioning(&mut conn).await?;
        Ok(orders)
    }

    async fn fetch_unsettled_intents(&self, min_age: Duration) -> Result<Vec<PaymentIntent>, StorefrontDbError> {
        let mut conn = self.pool.acquire().await?;
        let intents = payment_intents::fetch_unsettled_intents(min_age, &mut conn).await?;
        Ok(intents)
    }

    async fn fetch_stale_pending_intents(&self, older_than: Duration) -> Result<Vec<PaymentIntent>, StorefrontDbError> {
        let mut conn = self.pool.acquire().await?;
        let intents = payment_intents::fetch_stale_pending_intents(older_than, &mut conn).await?;
        Ok(intents)
    }
}

impl AccountManagement for SqliteDatabase {
    async fn fetch_user_account_for_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<UserAccount>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let account = accounts::fetch_account_by_customer_id(customer_id, &mut conn).await?;
        Ok(account)
    }

    async fn fetch_balance_history(&self, customer_id: &str) -> Result<Vec<BalanceEntry>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let history = accounts::fetch_balance_history(customer_id, &mut conn).await?;
        Ok(history)
    }

    async fn fetch_order_by_number(&self, order_number: &OrderNumber) -> Result<Option<Order>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_number(order_number, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_orders_for_customer(&self, customer_id: &str) -> Result<Vec<Order>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_orders_for_customer(customer_id, &mut conn).await?;
        Ok(orders)
    }

    async fn fetch_line_items(&self, order_id: i64) -> Result<Vec<LineItem>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let items = orders::fetch_line_items(order_id, &mut conn).await?;
        Ok(items)
    }

    async fn fetch_provisioning_results(&self, order_id: i64) -> Result<Vec<ProvisioningResult>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let results = fulfilment::fetch_provisioning_results(order_id, &mut conn).await?;
        Ok(results)
    }

    async fn fetch_payment_intent(&self, intent_id: &str) -> Result<Option<PaymentIntent>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let intent = payment_intents::fetch_payment_intent(intent_id, &mut conn).await?;
        Ok(intent)
    }

    async fn fetch_orders_for_payment_intent(&self, intent_id: &str) -> Result<Vec<Order>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_orders_for_payment_intent(intent_id, &mut conn).await?;
        Ok(orders)
    }

    async fn fetch_payment_audit(&self, intent_id: &str) -> Result<Vec<PaymentAuditEntry>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let trail = payment_intents::fetch_audit_trail(intent_id, &mut conn).await?;
        Ok(trail)
    }

    async fn fetch_webhook_events(
        &self,
        gateway_code: &str,
        external_reference: &str,
    ) -> Result<Vec<WebhookEvent>, AccountApiError> {
        let mut conn = self.pool.acquire().await?;
        let events = webhooks::fetch_webhook_events(gateway_code, external_reference, &mut conn).await?;
        Ok(events)
    }
}

impl CatalogManagement for SqliteDatabase {
    async fn fetch_product(&self, product_ref: &str) -> Result<Option<Product>, StorefrontDbError> {
        let mut conn = self.pool.acquire().await?;
        let product = catalog::fetch_product(product_ref, &mut conn).await?;
        Ok(product)
    }

    async fn fetch_products(&self) -> Result<Vec<Product>, StorefrontDbError> {
        let mut conn = self.pool.acquire().await?;
        let products = catalog::fetch_products(&mut conn).await?;
        Ok(products)
    }

    async fn upsert_product(&self, product: NewProduct) -> Result<Product, StorefrontDbError> {
        let mut conn = begin_immediate(&self.pool).await?;
        let result = async {
            let product = catalog::upsert_product(product, &mut conn).await?;
            Ok::<_, StorefrontDbError>(product)
        }
        .await;
        finish(conn, result).await
    }

    async fn fetch_gateway_config(&self, gateway_code: &str) -> Result<Option<GatewayConfig>, StorefrontDbError> {
        let mut conn = self.pool.acquire().await?;
        let config = catalog::fetch_gateway_config(gateway_code, &mut conn).await?;
        Ok(config)
    }

    async fn fetch_gateway_configs(&self) -> Result<Vec<GatewayConfig>, StorefrontDbError> {
        let mut conn = self.pool.acquire().await?;
        let configs = catalog::fetch_gateway_configs(&mut conn).await?;
        Ok(configs)
    }

    async fn upsert_gateway_config(&self, config: NewGatewayConfig) -> Result<GatewayConfig, StorefrontDbError> {
        let mut conn = begin_immediate(&self.pool).await?;
        let result = async {
            let config = catalog::upsert_gateway_config(config, &mut conn).await?;
            Ok::<_, StorefrontDbError>(config)
        }
        .await;
        finish(conn, result).await
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `SFP_DATABASE_URL`
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
        debug!("🗃️ Connection pool for {} closed", self.url);
    }
}
