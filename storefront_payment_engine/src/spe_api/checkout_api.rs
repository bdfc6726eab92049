//! The checkout entry points: balance and gateway checkouts, deposits and buyer cancellation.
//!
//! A cart is validated completely before anything is written. Each cart item becomes its own order, so a problem
//! with one item after payment never affects the others.
use std::{collections::HashSet, fmt::Debug, sync::Arc};

use log::*;
use sfp_common::{Money, PaymentStatus, DEFAULT_CURRENCY_CODE};
use sfp_integrations::{ChargeRequest, ConfigOption, GatewayError, StatusMapping};

use crate::{
    db_types::{NewLineItem, NewOrder, NewPaymentIntent, Order, PaymentIntent, PaymentPurpose, Product, TransitionSource},
    events::EventProducers,
    gateways::{GatewayRegistry, RegisteredGateway},
    helpers::{new_checkout_reference, new_order_number, new_payment_intent_id},
    pricing::{price, FeeRule},
    spe_api::{
        checkout_objects::{CartItem, CheckoutRequest, CheckoutResult, DepositRequest, DepositResult, Settlement},
        errors::CheckoutError,
        fulfillment_api::FulfillmentApi,
        reconciler_api::ReconcilerApi,
    },
    traits::StorefrontDatabase,
};

pub const MAX_ITEM_QUANTITY: i64 = 1_000;

#[derive(Clone)]
pub struct CheckoutApi<B> {
    db: B,
    registry: Arc<GatewayRegistry>,
    fulfillment: FulfillmentApi<B>,
    reconciler: ReconcilerApi<B>,
}

impl<B> Debug for CheckoutApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutApi ({:?})", self.registry.codes())
    }
}

impl<B: Clone> CheckoutApi<B> {
    pub fn new(
        db: B,
        registry: Arc<GatewayRegistry>,
        fulfillment: FulfillmentApi<B>,
        producers: EventProducers,
    ) -> Self {
        let reconciler = ReconcilerApi::new(db.clone(), Arc::clone(&registry), fulfillment.clone(), producers);
        Self { db, registry, fulfillment, reconciler }
    }

    /// The reconciler that shares this API's registry and fulfilment pipeline.
    pub fn reconciler(&self) -> &ReconcilerApi<B> {
        &self.reconciler
    }

    pub fn fulfillment(&self) -> &FulfillmentApi<B> {
        &self.fulfillment
    }
}

impl<B> CheckoutApi<B>
where B: StorefrontDatabase
{
    /// Validates the cart and settles it with the requested method.
    ///
    /// * Balance checkouts debit the customer's balance and provision the orders straight away.
    /// * Gateway checkouts create a pending payment and return the processor's checkout URL. The orders are
    ///   provisioned once the payment completes.
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutResult, CheckoutError> {
        let orders = self.build_orders(&request).await?;
        match request.settlement {
            Settlement::Balance => self.checkout_with_balance(&request.customer_id, orders).await,
            Settlement::Gateway { gateway_code, success_url, cancel_url } => {
                let callbacks = Callbacks { success_url, cancel_url, email: request.email };
                self.checkout_with_gateway(&request.customer_id, &gateway_code, callbacks, orders).await
            },
        }
    }

    async fn checkout_with_balance(
        &self,
        customer_id: &str,
        orders: Vec<NewOrder>,
    ) -> Result<CheckoutResult, CheckoutError> {
        let total = cart_total(&orders)?;
        let reference = new_checkout_reference();
        let orders = self.db.create_balance_checkout(customer_id, &reference, orders).await?;
        info!("🛒️ Customer {customer_id} paid {total} from their balance for {} order(s) ({reference})", orders.len());
        let fulfilment = self.fulfillment.provision_orders(&orders).await;
        let orders = self.refresh_orders(orders).await?;
        Ok(CheckoutResult {
            orders,
            price: price(total, &FeeRule::None, &[])?,
            payment: None,
            checkout_url: None,
            fulfilment,
        })
    }

    async fn checkout_with_gateway(
        &self,
        customer_id: &str,
        gateway_code: &str,
        callbacks: Callbacks,
        orders: Vec<NewOrder>,
    ) -> Result<CheckoutResult, CheckoutError> {
        let gateway = self.active_gateway(gateway_code)?;
        let currency = orders.first().map(|o| o.currency.clone()).unwrap_or_else(default_currency);
        let total = cart_total(&orders)?;
        let breakdown = price(total, &gateway.config.fee_rule.0, &[])?;
        gateway.context.check_amount(breakdown.total_charged)?;
        let intent = NewPaymentIntent {
            id: new_payment_intent_id(),
            gateway_code: gateway_code.to_string(),
            purpose: PaymentPurpose::Checkout,
            customer_id: customer_id.to_string(),
            amount_requested: breakdown.base_amount,
            amount_charged: breakdown.total_charged,
            fee_amount: breakdown.fee_amount,
            bonus_amount: Money::default(),
            currency,
        };
        let (intent, orders) = self.db.create_gateway_checkout(intent, orders).await?;
        debug!("🛒️ Created payment {} for {} order(s) of customer {customer_id}", intent.id, orders.len());
        let intent = self.create_charge(gateway, intent, callbacks).await?;
        let orders = self.refresh_orders(orders).await?;
        info!(
            "🛒️ Customer {customer_id} is paying {} via {gateway_code} for {} order(s). Payment id: {}",
            breakdown.total_charged,
            orders.len(),
            intent.id
        );
        Ok(CheckoutResult {
            orders,
            price: breakdown,
            checkout_url: intent.checkout_url.clone(),
            payment: Some(intent),
            fulfilment: Vec::new(),
        })
    }

    /// Starts a balance top-up of `request.amount` through a payment gateway.
    ///
    /// The gateway's fee is added to the amount charged, and its bonus rules decide the extra credit. The customer's
    /// balance is credited with the effective credit once the payment completes.
    pub async fn init_deposit(&self, request: DepositRequest) -> Result<DepositResult, CheckoutError> {
        let customer_id = request.customer_id.trim();
        if customer_id.is_empty() {
            return Err(CheckoutError::Validation("A customer id is required".into()));
        }
        validate_email(request.email.as_deref())?;
        if !request.amount.is_positive() {
            return Err(CheckoutError::Validation(format!("Deposit amount must be positive, not {}", request.amount)));
        }
        let gateway = self.active_gateway(&request.gateway_code)?;
        let breakdown = price(request.amount, &gateway.config.fee_rule.0, &gateway.config.bonus_rules.0)?;
        gateway.context.check_amount(breakdown.total_charged)?;
        let intent = NewPaymentIntent {
            id: new_payment_intent_id(),
            gateway_code: request.gateway_code.clone(),
            purpose: PaymentPurpose::Deposit,
            customer_id: customer_id.to_string(),
            amount_requested: breakdown.base_amount,
            amount_charged: breakdown.total_charged,
            fee_amount: breakdown.fee_amount,
            bonus_amount: breakdown.bonus_amount,
            currency: request.currency.clone().unwrap_or_else(default_currency),
        };
        let intent = self.db.create_deposit_intent(intent).await?;
        let callbacks =
            Callbacks { success_url: request.success_url, cancel_url: request.cancel_url, email: request.email };
        let intent = self.create_charge(gateway, intent, callbacks).await?;
        info!(
            "🛒️ Customer {customer_id} is depositing {} via {} (charged {}, bonus {}). Payment id: {}",
            breakdown.base_amount, request.gateway_code, breakdown.total_charged, breakdown.bonus_amount, intent.id
        );
        let checkout_url = intent.checkout_url.clone().unwrap_or_default();
        Ok(DepositResult { payment: intent, price: breakdown, checkout_url })
    }

    /// Cancels a payment on the buyer's behalf. Only `Pending` payments can be cancelled. Their orders are
    /// cancelled too.
    pub async fn cancel_payment(&self, intent_id: &str) -> Result<PaymentIntent, CheckoutError> {
        let intent = self.fetch_intent(intent_id).await?;
        if intent.status != PaymentStatus::Pending {
            return Err(CheckoutError::CannotCancel { id: intent.id, status: intent.status });
        }
        let mapping = StatusMapping::for_payment(PaymentStatus::Failed);
        let note = Some("cancelled by the buyer".to_string());
        self.reconciler
            .apply_transition(intent, mapping, TransitionSource::Buyer, note)
            .await
            .map_err(|e| CheckoutError::DatabaseError(e.to_string()))?;
        let intent = self.fetch_intent(intent_id).await?;
        if intent.status != PaymentStatus::Failed {
            // The processor settled the payment while we were cancelling it
            return Err(CheckoutError::CannotCancel { id: intent.id, status: intent.status });
        }
        info!("🛒️ Payment {intent_id} was cancelled by the buyer");
        Ok(intent)
    }

    async fn create_charge(
        &self,
        gateway: &RegisteredGateway,
        intent: PaymentIntent,
        callbacks: Callbacks,
    ) -> Result<PaymentIntent, CheckoutError> {
        let request = ChargeRequest {
            amount: intent.amount_charged,
            currency: intent.currency.clone(),
            order_ref: intent.id.clone(),
            success_url: callbacks.success_url,
            cancel_url: callbacks.cancel_url,
            email: callbacks.email,
        };
        match gateway.processor.create_charge(&gateway.context, request).await {
            Ok(charge) => {
                let intent = self
                    .db
                    .attach_external_reference(&intent.id, &charge.external_reference, &charge.checkout_url)
                    .await?;
                Ok(intent)
            },
            Err(e) => {
                self.abandon(intent, &e).await;
                Err(e.into())
            },
        }
    }

    /// Fails a payment whose charge could not be created, which also cancels its orders.
    async fn abandon(&self, intent: PaymentIntent, error: &GatewayError) {
        let id = intent.id.clone();
        warn!("🛒️ Could not create a charge for payment {id} at {}. {error}", intent.gateway_code);
        let mapping = StatusMapping::for_payment(PaymentStatus::Failed);
        let note = Some(format!("charge could not be created: {error}"));
        if let Err(e) = self.reconciler.apply_transition(intent, mapping, TransitionSource::Checkout, note).await {
            error!("🛒️ Payment {id} could not be marked as failed after the charge failed. {e}");
        }
    }

    async fn build_orders(&self, request: &CheckoutRequest) -> Result<Vec<NewOrder>, CheckoutError> {
        let customer_id = request.customer_id.trim();
        if customer_id.is_empty() {
            return Err(CheckoutError::Validation("A customer id is required".into()));
        }
        validate_email(request.email.as_deref())?;
        if request.items.is_empty() {
            return Err(CheckoutError::Validation("The cart is empty".into()));
        }
        let mut currency: Option<String> = None;
        let mut orders = Vec::with_capacity(request.items.len());
        for (i, item) in request.items.iter().enumerate() {
            let product = self.validate_item(i + 1, item).await?;
            match &currency {
                Some(c) if *c != product.currency => {
                    return Err(CheckoutError::Validation(format!(
                        "Item {}: every item must be priced in {c}, but {} is priced in {}",
                        i + 1,
                        product.product_ref,
                        product.currency
                    )));
                },
                Some(_) => {},
                None => currency = Some(product.currency.clone()),
            }
            let line_item = NewLineItem {
                product_ref: product.product_ref.clone(),
                quantity: item.quantity,
                configuration: item.configuration.clone(),
                price: product.unit_price.checked_mul(item.quantity).ok_or_else(|| {
                    CheckoutError::Validation(format!("Item {}: the price of {} is too large", i + 1, product.product_ref))
                })?,
            };
            orders.push(NewOrder {
                order_number: new_order_number(),
                customer_id: customer_id.to_string(),
                buyer_email: request.email.clone(),
                currency: product.currency.clone(),
                line_items: vec![line_item],
            });
        }
        Ok(orders)
    }

    async fn validate_item(&self, position: usize, item: &CartItem) -> Result<Product, CheckoutError> {
        if item.quantity < 1 || item.quantity > MAX_ITEM_QUANTITY {
            return Err(CheckoutError::Validation(format!(
                "Item {position}: quantity must be between 1 and {MAX_ITEM_QUANTITY}, not {}",
                item.quantity
            )));
        }
        let product = self
            .db
            .fetch_product(&item.product_ref)
            .await?
            .ok_or_else(|| CheckoutError::Validation(format!("Item {position}: unknown product {}", item.product_ref)))?;
        if !product.is_active {
            return Err(CheckoutError::Validation(format!(
                "Item {position}: {} is no longer available",
                item.product_ref
            )));
        }
        validate_configuration(&product, &item.configuration)
            .map_err(|e| CheckoutError::Validation(format!("Item {position}: {e}")))?;
        Ok(product)
    }

    fn active_gateway(&self, gateway_code: &str) -> Result<&RegisteredGateway, CheckoutError> {
        self.registry
            .get(gateway_code)
            .filter(|g| g.config.is_active)
            .ok_or_else(|| CheckoutError::UnknownGateway(gateway_code.to_string()))
    }

    async fn fetch_intent(&self, intent_id: &str) -> Result<PaymentIntent, CheckoutError> {
        self.db.fetch_payment_intent(intent_id).await?.ok_or_else(|| CheckoutError::PaymentNotFound(intent_id.into()))
    }

    async fn refresh_orders(&self, orders: Vec<Order>) -> Result<Vec<Order>, CheckoutError> {
        let mut result = Vec::with_capacity(orders.len());
        for order in orders {
            let fresh = self.db.fetch_order_by_number(&order.order_number).await?;
            result.push(fresh.unwrap_or(order));
        }
        Ok(result)
    }
}

struct Callbacks {
    success_url: String,
    cancel_url: String,
    email: Option<String>,
}

fn cart_total(orders: &[NewOrder]) -> Result<Money, CheckoutError> {
    Money::checked_sum(orders.iter().map(NewOrder::total_amount))
        .ok_or_else(|| CheckoutError::Validation("The cart total is too large".into()))
}

fn default_currency() -> String {
    DEFAULT_CURRENCY_CODE.to_string()
}

fn validate_email(email: Option<&str>) -> Result<(), CheckoutError> {
    match email {
        Some(e) if !e.contains('@') || e.trim() != e || e.starts_with('@') || e.ends_with('@') => {
            Err(CheckoutError::Validation(format!("{e} is not a valid email address")))
        },
        _ => Ok(()),
    }
}

/// Option names must be non-empty and unique, and every option the product requires must have a value.
fn validate_configuration(product: &Product, options: &[ConfigOption]) -> Result<(), String> {
    let mut seen = HashSet::new();
    for option in options {
        let name = option.name.trim();
        if name.is_empty() {
            return Err("configuration option names cannot be empty".into());
        }
        if !seen.insert(name) {
            return Err(format!("configuration option '{name}' is given more than once"));
        }
    }
    for required in product.required_options.0.iter() {
        let present = options.iter().any(|o| o.name.trim() == required && !o.value.trim().is_empty());
        if !present {
            return Err(format!("{} requires the '{required}' option", product.product_ref));
        }
    }
    Ok(())
}
