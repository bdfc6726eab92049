use futures::future::BoxFuture;
use log::*;
use sfp_common::PaymentStatus;
use storefront_payment_engine::events::{
    EventHandlers,
    EventHooks,
    OrderConfirmedEvent,
    PaymentStatusChangedEvent,
    ProvisioningFailedEvent,
};

pub const NOTIFICATION_BUFFER_SIZE: usize = 25;

/// Assigns the operator notification handlers.
///
/// Nothing downstream of the storefront needs to be told about these events yet, so every hook writes to the log:
///
/// 1. OrderConfirmedEvent - The order was fully provisioned.
/// 2. ProvisioningFailedEvent - A line item could not be provisioned. Once it reaches `max_attempts` failures the sweep
///    stops retrying it and it needs manual review.
/// 3. PaymentStatusChangedEvent - Refunds of completed payments need an operator to decide what happens to the
///    already-provisioned orders.
pub fn create_notification_handlers(max_attempts: i64) -> EventHandlers {
    let mut hooks = EventHooks::default();
    hooks.on_order_confirmed(|ev: OrderConfirmedEvent| -> BoxFuture<'static, ()> {
        let order = ev.order;
        Box::pin(async move {
            info!(
                "📬️ Order {} for customer {} ({}) has been delivered",
                order.order_number, order.customer_id, order.total_amount
            );
        })
    });
    hooks.on_provisioning_failed(move |ev: ProvisioningFailedEvent| -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let ProvisioningFailedEvent { order, line_item_id, attempts, error } = ev;
            if attempts >= max_attempts {
                error!(
                    "📬️ Line item #{line_item_id} of order {} has failed provisioning {attempts} times and will not \
                     be retried. It needs manual review. Last error: {error}",
                    order.order_number
                );
            } else {
                warn!(
                    "📬️ Line item #{line_item_id} of order {} failed provisioning (attempt {attempts} of \
                     {max_attempts}). It will be retried. {error}",
                    order.order_number
                );
            }
        })
    });
    hooks.on_payment_status_changed(|ev: PaymentStatusChangedEvent| -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let PaymentStatusChangedEvent { intent, old_status, source } = ev;
            if intent.status == PaymentStatus::Refunded {
                warn!(
                    "📬️ Payment {} for customer {} was refunded by {}. Its orders stay confirmed; review them \
                     manually.",
                    intent.id, intent.customer_id, intent.gateway_code
                );
            } else {
                info!("📬️ Payment {} is now {} (was {old_status}, via {source})", intent.id, intent.status);
            }
        })
    });
    EventHandlers::new(NOTIFICATION_BUFFER_SIZE, hooks)
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn every_hook_is_registered() {
        let handlers = create_notification_handlers(5);
        assert!(handlers.on_order_confirmed.is_some());
        assert!(handlers.on_provisioning_failed.is_some());
        assert!(handlers.on_payment_status_changed.is_some());
        let producers = handlers.producers();
        assert_eq!(producers.order_confirmed_producer.len(), 1);
        assert_eq!(producers.provisioning_failed_producer.len(), 1);
        assert_eq!(producers.payment_status_producer.len(), 1);
    }
}
