use cucumber::{given, then, when};
use sfp_common::{Money, OrderStatusType, PaymentStatus};
use sfp_integrations::ConfigOption;
use storefront_payment_engine::{
    checkout_objects::{CartItem, CheckoutRequest, ReconcileOutcome, Settlement, WebhookOutcome},
    test_utils::fakes::FAKE_GATEWAY,
    AccountManagement,
    CheckoutError,
    WebhookError,
};

use crate::cucumber::StoreWorld;

fn cart(items: &str) -> Vec<CartItem> {
    items
        .split(',')
        .map(|product_ref| {
            let configuration = match product_ref {
                "vpn" => vec![ConfigOption { name: "region".into(), value: "eu-west".into() }],
                _ => vec![],
            };
            CartItem { product_ref: product_ref.to_string(), quantity: 1, configuration }
        })
        .collect()
}

#[given(expr = "customer '{word}' has a balance of {int} cents")]
async fn customer_balance(world: &mut StoreWorld, customer_id: String, amount: i64) {
    let reference = format!("seed-{customer_id}");
    world.store().accounts.credit(&customer_id, Money::from(amount), "manual", &reference).await.expect("Error crediting");
}

#[given(expr = "the credential issuer fails for '{word}'")]
async fn issuer_fails(world: &mut StoreWorld, product_ref: String) {
    world.store().issuer.fail_for(&product_ref);
}

#[when(expr = "the credential issuer recovers for '{word}'")]
async fn issuer_recovers(world: &mut StoreWorld, product_ref: String) {
    world.store().issuer.heal(&product_ref);
}

#[when(expr = "customer '{word}' buys {word} with their balance")]
async fn balance_checkout(world: &mut StoreWorld, customer_id: String, items: String) {
    let request =
        CheckoutRequest { customer_id, email: None, items: cart(&items), settlement: Settlement::Balance };
    world.last_checkout = Some(world.store().checkout.checkout(request).await);
}

#[when(expr = "customer '{word}' buys {word} through the gateway")]
async fn gateway_checkout(world: &mut StoreWorld, customer_id: String, items: String) {
    let settlement = Settlement::Gateway {
        gateway_code: FAKE_GATEWAY.into(),
        success_url: "https://shop.test/ok".into(),
        cancel_url: "https://shop.test/cancel".into(),
    };
    let request = CheckoutRequest { customer_id, email: None, items: cart(&items), settlement };
    world.last_checkout = Some(world.store().checkout.checkout(request).await);
}

#[when(expr = "the gateway reports '{word}' for the payment")]
async fn signed_webhook(world: &mut StoreWorld, status: String) {
    let reference = world.payment().external_reference.clone().expect("No external reference");
    let (body, signature) = world.store().processor.signed_webhook(&reference, &status);
    world.last_delivery = Some((body, Some(signature)));
    deliver(world).await;
}

#[when(expr = "the gateway reports '{word}' for the payment with a forged signature")]
async fn forged_webhook(world: &mut StoreWorld, status: String) {
    let reference = world.payment().external_reference.clone().expect("No external reference");
    let (body, _) = world.store().processor.signed_webhook(&reference, &status);
    world.last_delivery = Some((body, Some("00".repeat(32))));
    deliver(world).await;
}

#[when("the same webhook is delivered again")]
async fn redeliver(world: &mut StoreWorld) {
    deliver(world).await;
}

async fn deliver(world: &mut StoreWorld) {
    let (body, signature) = world.last_delivery.clone().expect("No webhook has been sent");
    let result = world.store().reconciler().process_webhook(FAKE_GATEWAY, &body, signature.as_deref()).await;
    world.last_webhook = Some(result);
}

#[when("the buyer cancels the payment")]
async fn buyer_cancels(world: &mut StoreWorld) {
    let id = world.payment().id.clone();
    world.store().checkout.cancel_payment(&id).await.expect("Error cancelling payment");
}

#[when("the provisioning sweep runs")]
async fn sweep(world: &mut StoreWorld) {
    world.store().fulfillment().retry_outstanding().await.expect("Error running the sweep");
}

#[then(expr = "the checkout fails with {word}")]
async fn checkout_fails(world: &mut StoreWorld, kind: String) {
    let err = match &world.last_checkout {
        Some(Err(e)) => e,
        other => panic!("Expected the checkout to fail, but got {other:?}"),
    };
    let matched = match kind.as_str() {
        "InsufficientBalance" => matches!(err, CheckoutError::InsufficientBalance { .. }),
        "ValidationError" => matches!(err, CheckoutError::Validation(_)),
        "AmountOutOfRange" => matches!(err, CheckoutError::AmountOutOfRange { .. }),
        "UpstreamError" => matches!(err, CheckoutError::GatewayUnavailable(_)),
        _ => panic!("Unknown checkout error kind {kind}"),
    };
    assert!(matched, "Expected {kind}, got {err}");
}

#[then(expr = "order {int} is {word}")]
async fn order_status(world: &mut StoreWorld, index: usize, status: String) {
    check_order_status(world, index, &status).await;
}

#[then(expr = "every order is {word}")]
async fn all_orders(world: &mut StoreWorld, status: String) {
    for index in 1..=world.checkout().orders.len() {
        check_order_status(world, index, &status).await;
    }
}

async fn check_order_status(world: &StoreWorld, index: usize, status: &str) {
    let expected = status.parse::<OrderStatusType>().expect("Not an order status");
    let number = &world.checkout().orders[index - 1].order_number;
    let order = world.store().db.fetch_order_by_number(number).await.expect("Error fetching order").expect("No order");
    assert_eq!(order.status, expected, "order {index} ({number})");
}

#[then(expr = "order {int} has {int} provisioning failure(s)")]
async fn provisioning_failures(world: &mut StoreWorld, index: usize, failures: usize) {
    let id = world.checkout().orders[index - 1].id;
    let results = world.store().db.fetch_provisioning_results(id).await.expect("Error fetching results");
    assert_eq!(results.iter().filter(|r| !r.success).count(), failures);
}

#[then(expr = "customer '{word}' has a balance of {int} cents")]
async fn balance_is(world: &mut StoreWorld, customer_id: String, amount: i64) {
    let balance = world.store().accounts.balance(&customer_id).await.expect("Error fetching balance");
    assert_eq!(balance.balance, Money::from(amount));
}

#[then(expr = "the payment is {word}")]
async fn payment_status(world: &mut StoreWorld, status: String) {
    let expected = status.parse::<PaymentStatus>().expect("Not a payment status");
    let id = world.payment().id.clone();
    let payment = world.store().db.fetch_payment_intent(&id).await.expect("Error fetching payment").expect("No payment");
    assert_eq!(payment.status, expected);
}

#[then(expr = "the payment charges {int} cents")]
async fn payment_charges(world: &mut StoreWorld, amount: i64) {
    assert_eq!(world.payment().amount_charged, Money::from(amount));
}

#[then(expr = "the webhook is {word}")]
async fn webhook_outcome(world: &mut StoreWorld, outcome: String) {
    let result = world.last_webhook.as_ref().expect("No webhook has been delivered");
    let matched = match (outcome.as_str(), result) {
        ("applied", Ok(WebhookOutcome::Reconciled { outcome: ReconcileOutcome::Applied { .. }, .. })) => true,
        ("rejected", Ok(WebhookOutcome::Reconciled { outcome: ReconcileOutcome::Rejected { .. }, .. })) => true,
        ("unchanged", Ok(WebhookOutcome::Reconciled { outcome: ReconcileOutcome::Unchanged { .. }, .. })) => true,
        ("ignored", Ok(WebhookOutcome::Duplicate)) => true,
        ("refused", Err(WebhookError::InvalidSignature)) => true,
        _ => false,
    };
    assert!(matched, "Expected the webhook to be {outcome}, but got {result:?}");
}

#[then(expr = "the credential issuer was called {int} time(s)")]
async fn issuer_calls(world: &mut StoreWorld, calls: usize) {
    assert_eq!(world.store().issuer.calls(), calls);
}
