use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    EventHandler,
    EventProducer,
    Handler,
    OrderConfirmedEvent,
    PaymentStatusChangedEvent,
    ProvisioningFailedEvent,
};

/// The publishing side of the event hooks. Cheap to clone; the APIs each hold a copy.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_confirmed_producer: Vec<EventProducer<OrderConfirmedEvent>>,
    pub provisioning_failed_producer: Vec<EventProducer<ProvisioningFailedEvent>>,
    pub payment_status_producer: Vec<EventProducer<PaymentStatusChangedEvent>>,
}

impl EventProducers {
    pub async fn publish_order_confirmed(&self, event: OrderConfirmedEvent) {
        for producer in &self.order_confirmed_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_provisioning_failed(&self, event: ProvisioningFailedEvent) {
        for producer in &self.provisioning_failed_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_payment_status_changed(&self, event: PaymentStatusChangedEvent) {
        for producer in &self.payment_status_producer {
            producer.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_order_confirmed: Option<EventHandler<OrderConfirmedEvent>>,
    pub on_provisioning_failed: Option<EventHandler<ProvisioningFailedEvent>>,
    pub on_payment_status_changed: Option<EventHandler<PaymentStatusChangedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_confirmed = hooks.on_order_confirmed.map(|f| EventHandler::new(buffer_size, f));
        let on_provisioning_failed = hooks.on_provisioning_failed.map(|f| EventHandler::new(buffer_size, f));
        let on_payment_status_changed = hooks.on_payment_status_changed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_confirmed, on_provisioning_failed, on_payment_status_changed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_confirmed {
            result.order_confirmed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_provisioning_failed {
            result.provisioning_failed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payment_status_changed {
            result.payment_status_producer.push(handler.subscribe());
        }
        result
    }

    /// Spawns one task per configured handler. Each task ends once every producer has been dropped.
    pub fn start_handlers(self) {
        if let Some(handler) = self.on_order_confirmed {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_provisioning_failed {
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_payment_status_changed {
            tokio::spawn(handler.start_handler());
        }
    }
}

type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_confirmed: Option<Handler<OrderConfirmedEvent>>,
    pub on_provisioning_failed: Option<Handler<ProvisioningFailedEvent>>,
    pub on_payment_status_changed: Option<Handler<PaymentStatusChangedEvent>>,
}

impl EventHooks {
    pub fn on_order_confirmed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderConfirmedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_order_confirmed = Some(Arc::new(f));
        self
    }

    pub fn on_provisioning_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(ProvisioningFailedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_provisioning_failed = Some(Arc::new(f));
        self
    }

    pub fn on_payment_status_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PaymentStatusChangedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_payment_status_changed = Some(Arc::new(f));
        self
    }
}
