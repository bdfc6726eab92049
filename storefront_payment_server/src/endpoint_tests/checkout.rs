use std::sync::Arc;

use actix_web::http::StatusCode;
use serde_json::json as body;
use sfp_common::Money;
use sfp_integrations::{Credential, ProvisioningError};
use storefront_payment_engine::{
    events::EventProducers,
    test_utils::fakes::{TestStore, FAKE_GATEWAY},
    CheckoutApi,
    FulfillmentApi,
};

use super::{
    helpers::{configure_store, get_request, json, post_json},
    mocks::MockIssuer,
};

fn gateway_checkout(customer_id: &str, product_ref: &str) -> serde_json::Value {
    body!({
        "customer_id": customer_id,
        "email": format!("{customer_id}@example.com"),
        "items": [{ "product_ref": product_ref, "quantity": 1 }],
        "settlement": {
            "method": "gateway",
            "gateway_code": FAKE_GATEWAY,
            "success_url": "https://shop.test/thanks",
            "cancel_url": "https://shop.test/cart"
        }
    })
}

#[actix_web::test]
async fn balance_checkout_is_provisioned_immediately() {
    let store = TestStore::new().await;
    store.accounts.credit("alice", Money::from(5_000), "manual", "top-up").await.unwrap();
    let request = body!({
        "customer_id": "alice",
        "items": [{ "product_ref": "ebook", "quantity": 2 }],
        "settlement": { "method": "balance" }
    });
    let (status, response) = post_json("/checkout", request, configure_store(&store)).await;
    assert_eq!(status, StatusCode::OK, "{response}");
    let response = json(&response);
    assert_eq!(response["order_numbers"].as_array().unwrap().len(), 1);
    assert_eq!(response["total_charged"], 1_000);
    assert!(response["checkout_url"].is_null());
    assert_eq!(response["fulfilment"][0]["confirmed"], true);

    let order_number = response["order_numbers"][0].as_str().unwrap().to_string();
    let (status, order) = get_request(&format!("/order/{order_number}"), configure_store(&store)).await;
    assert_eq!(status, StatusCode::OK);
    let order = json(&order);
    assert_eq!(order["order"]["status"], "Confirmed");
    assert_eq!(order["provisioning"][0]["success"], true);

    let (_, balance) = get_request("/balance/alice", configure_store(&store)).await;
    assert_eq!(json(&balance)["balance"], 4_000);
    store.teardown().await;
}

#[actix_web::test]
async fn insufficient_balance_is_refused() {
    let store = TestStore::new().await;
    let request = body!({
        "customer_id": "bob",
        "items": [{ "product_ref": "course", "quantity": 1 }],
        "settlement": { "method": "balance" }
    });
    let (status, response) = post_json("/checkout", request, configure_store(&store)).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert!(json(&response)["error"].as_str().unwrap().starts_with("Insufficient balance"));
    let (_, orders) = get_request("/orders/bob", configure_store(&store)).await;
    assert_eq!(json(&orders), body!([]));
    store.teardown().await;
}

#[actix_web::test]
async fn invalid_carts_are_bad_requests() {
    let store = TestStore::new().await;
    let empty = body!({ "customer_id": "carol", "items": [], "settlement": { "method": "balance" } });
    let (status, _) = post_json("/checkout", empty, configure_store(&store)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    // vpn needs a region
    let (status, response) = post_json("/checkout", gateway_checkout("carol", "vpn"), configure_store(&store)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json(&response)["error"].as_str().unwrap().contains("region"));
    assert_eq!(store.processor.charges_created(), 0);
    store.teardown().await;
}

#[actix_web::test]
async fn gateway_checkout_returns_the_redirect() {
    let store = TestStore::new().await;
    let (status, response) = post_json("/checkout", gateway_checkout("dave", "course"), configure_store(&store)).await;
    assert_eq!(status, StatusCode::OK, "{response}");
    let response = json(&response);
    let payment_id = response["payment_intent_id"].as_str().unwrap();
    assert_eq!(response["total_charged"], 2_575);
    assert_eq!(response["fee_amount"], 75);
    assert_eq!(response["checkout_url"], format!("https://fakepay.test/pay/fake_{payment_id}"));
    assert_eq!(response["fulfilment"], body!([]));

    let (status, payment) = get_request(&format!("/payment/{payment_id}"), configure_store(&store)).await;
    assert_eq!(status, StatusCode::OK);
    let payment = json(&payment);
    assert_eq!(payment["payment"]["status"], "Pending");
    assert_eq!(payment["orders"][0]["status"], "New");
    store.teardown().await;
}

#[actix_web::test]
async fn processor_outage_is_a_bad_gateway() {
    let store = TestStore::new().await;
    store.processor.fail_charges(true);
    let (status, response) = post_json("/checkout", gateway_checkout("erin", "ebook"), configure_store(&store)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(json(&response)["error"].as_str().unwrap().contains("try again"));
    store.teardown().await;
}

#[actix_web::test]
async fn cancel_a_pending_payment() {
    let store = TestStore::new().await;
    let (_, response) = post_json("/checkout", gateway_checkout("frank", "ebook"), configure_store(&store)).await;
    let payment_id = json(&response)["payment_intent_id"].as_str().unwrap().to_string();
    let path = format!("/payment/{payment_id}/cancel");
    let (status, response) = post_json(&path, body!({}), configure_store(&store)).await;
    assert_eq!(status, StatusCode::OK, "{response}");
    assert_eq!(json(&response)["status"], "Failed");
    // Only pending payments can be cancelled
    let (status, _) = post_json(&path, body!({}), configure_store(&store)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = post_json("/payment/pay_nope/cancel", body!({}), configure_store(&store)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    store.teardown().await;
}

#[actix_web::test]
async fn deposits_report_the_bonus() {
    let store = TestStore::new().await;
    let request = body!({
        "customer_id": "gina",
        "gateway_code": FAKE_GATEWAY,
        "amount": 10_000,
        "success_url": "https://shop.test/thanks",
        "cancel_url": "https://shop.test/account"
    });
    let (status, response) = post_json("/deposit", request, configure_store(&store)).await;
    assert_eq!(status, StatusCode::OK, "{response}");
    let response = json(&response);
    assert_eq!(response["total_charged"], 10_300);
    assert_eq!(response["effective_credit"], 11_000);

    let too_small = body!({
        "customer_id": "gina",
        "gateway_code": FAKE_GATEWAY,
        "amount": 50,
        "success_url": "https://shop.test/thanks",
        "cancel_url": "https://shop.test/account"
    });
    let (status, _) = post_json("/deposit", too_small, configure_store(&store)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    store.teardown().await;
}

#[actix_web::test]
async fn one_failed_item_does_not_hold_back_the_others() -> anyhow::Result<()> {
    let store = TestStore::new().await;
    store.accounts.credit("hank", Money::from(10_000), "manual", "top-up").await?;
    let mut issuer = MockIssuer::new();
    issuer.expect_issue().times(2).returning(|order_number, request| match request.product_ref.as_str() {
        "ebook" => Err(ProvisioningError::Unreachable("connection refused".into())),
        _ => Ok(vec![Credential { label: "licence_key".into(), value: format!("KEY-{order_number}") }]),
    });
    let fulfillment = FulfillmentApi::new(store.db.clone(), Arc::new(issuer), 3, EventProducers::default());
    let registry = Arc::new(store.reconciler().registry().clone());
    let checkout = CheckoutApi::new(store.db.clone(), registry, fulfillment, EventProducers::default());
    let accounts = store.accounts.clone();
    let request = body!({
        "customer_id": "hank",
        "items": [{ "product_ref": "course", "quantity": 1 }, { "product_ref": "ebook", "quantity": 1 }],
        "settlement": { "method": "balance" }
    });
    let (status, response) = post_json("/checkout", request, move |cfg| {
        cfg.app_data(actix_web::web::Data::new(checkout))
            .app_data(actix_web::web::Data::new(accounts))
            .service(crate::routes::CheckoutRoute::<storefront_payment_engine::SqliteDatabase>::new());
    })
    .await;
    assert_eq!(status, StatusCode::OK, "{response}");
    let response = json(&response);
    let reports = response["fulfilment"].as_array().unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0]["confirmed"], true);
    assert_eq!(reports[1]["confirmed"], false);
    assert_eq!(reports[1]["failed"], 1);
    // The debit is never reversed
    let (_, balance) = get_request("/balance/hank", configure_store(&store)).await;
    assert_eq!(json(&balance)["balance"], 7_000);
    store.teardown().await;
    Ok(())
}
