//! Provisioning of paid-for orders.
//!
//! Each line item is sent to the [`CredentialIssuer`] separately and its outcome is recorded, so one failing item
//! never blocks or rolls back its siblings. Provisioning of a single order is serialized with a per-order lock;
//! different orders are provisioned concurrently.
use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{Arc, Mutex},
};

use futures_util::future::join_all;
use log::*;
use sfp_common::{OrderStatusType, PaymentStatus};
use sfp_integrations::{CredentialIssuer, ProvisioningRequest};

use crate::{
    db_types::{NewProvisioningResult, Order, SettlementMethod},
    events::{EventProducers, OrderConfirmedEvent, ProvisioningFailedEvent},
    spe_api::{checkout_objects::ProvisioningReport, errors::FulfillmentError},
    traits::StorefrontDatabase,
};

pub const DEFAULT_MAX_PROVISIONING_ATTEMPTS: i64 = 5;

type OrderLock = Arc<tokio::sync::Mutex<()>>;

/// One async mutex per order that is currently being provisioned.
#[derive(Clone, Default)]
struct OrderLocks {
    locks: Arc<Mutex<HashMap<i64, OrderLock>>>,
}

impl OrderLocks {
    fn lock_for(&self, order_id: i64) -> OrderLock {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(order_id).or_default().clone()
    }

    fn release(&self, order_id: i64, lock: OrderLock) {
        drop(lock);
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Only the map holds a reference, so nobody is waiting for this order
        if locks.get(&order_id).map(|l| Arc::strong_count(l) == 1).unwrap_or(false) {
            locks.remove(&order_id);
        }
    }
}

#[derive(Clone)]
pub struct FulfillmentApi<B> {
    db: B,
    issuer: Arc<dyn CredentialIssuer>,
    locks: OrderLocks,
    max_attempts: i64,
    producers: EventProducers,
}

impl<B> Debug for FulfillmentApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FulfillmentApi (max attempts: {})", self.max_attempts)
    }
}

impl<B> FulfillmentApi<B> {
    pub fn new(db: B, issuer: Arc<dyn CredentialIssuer>, max_attempts: i64, producers: EventProducers) -> Self {
        Self { db, issuer, locks: OrderLocks::default(), max_attempts, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> FulfillmentApi<B>
where B: StorefrontDatabase
{
    /// Provisions the given orders concurrently. Failures are logged and reported, never returned as errors.
    pub async fn provision_orders(&self, orders: &[Order]) -> Vec<ProvisioningReport> {
        let runs = orders.iter().map(|order| async move {
            match self.provision_order(order).await {
                Ok(report) => report,
                Err(e) => {
                    error!("📦️ Provisioning of order {} could not run: {e}", order.order_number);
                    ProvisioningReport::skipped(&order.order_number, e)
                },
            }
        });
        join_all(runs).await
    }

    /// Provisions every outstanding line item of the order and confirms the order once all of them have succeeded.
    ///
    /// The order is re-read under its lock, so calling this concurrently for the same order (e.g. from a webhook and
    /// the sweep) never provisions a line item twice.
    pub async fn provision_order(&self, order: &Order) -> Result<ProvisioningReport, FulfillmentError> {
        let lock = self.locks.lock_for(order.id);
        let result = {
            let _guard = lock.lock().await;
            self.provision_locked(order).await
        };
        self.locks.release(order.id, lock);
        result
    }

    async fn provision_locked(&self, order: &Order) -> Result<ProvisioningReport, FulfillmentError> {
        let order = self
            .db
            .fetch_order_by_number(&order.order_number)
            .await?
            .ok_or_else(|| FulfillmentError::OrderNotFound(order.order_number.to_string()))?;
        let number = order.order_number.clone();
        let order = match (order.status, order.settlement) {
            (OrderStatusType::Confirmed | OrderStatusType::Cancelled, _) => {
                trace!("📦️ Order {number} is {}. Nothing to provision.", order.status);
                return Ok(ProvisioningReport::skipped(&number, format!("order is {}", order.status)));
            },
            (OrderStatusType::New, SettlementMethod::Balance) => {
                self.db.mark_order_processing(order.id).await?.unwrap_or(order)
            },
            (OrderStatusType::New, SettlementMethod::Gateway) => {
                debug!("📦️ Order {number} has not been paid for yet.");
                return Ok(ProvisioningReport::skipped(&number, "payment has not completed"));
            },
            (OrderStatusType::Processing, _) => order,
        };
        if order.settlement == SettlementMethod::Gateway && !self.payment_completed(&order).await? {
            warn!("📦️ Order {number} is processing, but its payment has not completed. Skipping.");
            return Ok(ProvisioningReport::skipped(&number, "payment has not completed"));
        }
        let mut report = ProvisioningReport::for_order(&number);
        let items = self.db.fetch_unprovisioned_line_items(order.id).await?;
        for item in items {
            let attempts = self.db.count_failed_provisioning_attempts(item.id).await?;
            if attempts >= self.max_attempts {
                warn!(
                    "📦️ Line item #{} of order {number} has failed {attempts} times. It needs manual review.",
                    item.id
                );
                report.needs_review += 1;
                continue;
            }
            let request = ProvisioningRequest {
                line_item_id: item.id,
                product_ref: item.product_ref.clone(),
                quantity: item.quantity,
                configuration: item.configuration.0.clone(),
            };
            let outcome = self.issuer.issue(number.as_str(), &request).await;
            let error = outcome.as_ref().err().map(|e| e.to_string());
            let result = NewProvisioningResult {
                order_id: order.id,
                line_item_id: item.id,
                outcome: outcome.map_err(|e| e.to_string()),
            };
            self.db.record_provisioning_result(result).await?;
            match error {
                None => {
                    debug!("📦️ Line item #{} ({}) of order {number} provisioned", item.id, item.product_ref);
                    report.provisioned += 1;
                },
                Some(error) => {
                    warn!("📦️ Provisioning line item #{} of order {number} failed: {error}", item.id);
                    report.failed += 1;
                    let event = ProvisioningFailedEvent {
                        order: order.clone(),
                        line_item_id: item.id,
                        attempts: attempts + 1,
                        error,
                    };
                    self.producers.publish_provisioning_failed(event).await;
                },
            }
        }
        if let Some(confirmed) = self.db.confirm_order_if_provisioned(order.id).await? {
            info!("📦️ Order {number} is fully provisioned and confirmed");
            report.confirmed = true;
            self.producers.publish_order_confirmed(OrderConfirmedEvent::new(confirmed)).await;
        }
        Ok(report)
    }

    async fn payment_completed(&self, order: &Order) -> Result<bool, FulfillmentError> {
        let Some(intent_id) = order.payment_intent_id.as_deref() else {
            return Ok(false);
        };
        let intent = self.db.fetch_payment_intent(intent_id).await?;
        Ok(intent.map(|i| i.status == PaymentStatus::Completed).unwrap_or(false))
    }

    /// Retries provisioning for every paid-for order that still has unprovisioned line items.
    pub async fn retry_outstanding(&self) -> Result<Vec<ProvisioningReport>, FulfillmentError> {
        let orders = self.db.fetch_orders_awaiting_provisioning().await?;
        if orders.is_empty() {
            trace!("📦️ No orders are awaiting provisioning");
            return Ok(Vec::new());
        }
        info!("📦️ Retrying provisioning for {} order(s)", orders.len());
        Ok(self.provision_orders(&orders).await)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn order_locks_are_released() {
        let locks = OrderLocks::default();
        let a = locks.lock_for(1);
        let b = locks.lock_for(1);
        assert!(Arc::ptr_eq(&a, &b));
        locks.release(1, a);
        // b is still held, so the entry stays
        assert!(locks.locks.lock().unwrap().contains_key(&1));
        locks.release(1, b);
        assert!(locks.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn order_locks_serialize_access() {
        let locks = OrderLocks::default();
        let lock = locks.lock_for(7);
        let guard = lock.lock().await;
        let other = locks.lock_for(7);
        assert!(other.try_lock().is_err());
        drop(guard);
        assert!(other.try_lock().is_ok());
    }
}
