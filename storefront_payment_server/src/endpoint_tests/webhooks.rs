use std::sync::Arc;

use actix_web::{http::StatusCode, web};
use serde_json::json as body;
use sfp_common::Money;
use sfp_integrations::{GatewayContext, Notification};
use storefront_payment_engine::{
    db_types::{NewPaymentIntent, PaymentPurpose},
    events::EventProducers,
    test_utils::fakes::{test_gateway_config, TestStore, FAKE_GATEWAY, FAKE_SIGNATURE_HEADER},
    CatalogManagement,
    CheckoutApi,
    SqliteDatabase,
    StorefrontDatabase,
};

use super::{
    helpers::{configure_store, get_request, json, post_json, post_raw},
    mocks::MockProcessor,
};
use crate::{config::ServerOptions, routes::WebhookRoute};

/// Starts a gateway checkout for one course and returns (order number, external reference).
async fn pending_checkout(store: &TestStore, customer_id: &str) -> (String, String) {
    let request = body!({
        "customer_id": customer_id,
        "items": [{ "product_ref": "course", "quantity": 1 }],
        "settlement": {
            "method": "gateway",
            "gateway_code": FAKE_GATEWAY,
            "success_url": "https://shop.test/thanks",
            "cancel_url": "https://shop.test/cart"
        }
    });
    let (status, response) = post_json("/checkout", request, configure_store(store)).await;
    assert_eq!(status, StatusCode::OK, "{response}");
    let response = json(&response);
    let order_number = response["order_numbers"][0].as_str().unwrap().to_string();
    let payment_id = response["payment_intent_id"].as_str().unwrap();
    (order_number, format!("fake_{payment_id}"))
}

async fn deliver(store: &TestStore, payload: Vec<u8>, signature: &str) -> (StatusCode, String) {
    let path = format!("/webhook/{FAKE_GATEWAY}");
    post_raw(&path, payload, &[(FAKE_SIGNATURE_HEADER, signature)], configure_store(store)).await
}

#[actix_web::test]
async fn completed_payment_confirms_the_order() {
    let store = TestStore::new().await;
    let (order_number, reference) = pending_checkout(&store, "ivy").await;
    let (payload, signature) = store.processor.signed_webhook(&reference, "paid");
    let (status, response) = deliver(&store, payload.clone(), &signature).await;
    assert_eq!(status, StatusCode::OK, "{response}");
    let response = json(&response);
    assert_eq!(response["result"], "reconciled");
    assert_eq!(response["outcome"]["result"], "applied");
    assert_eq!(response["outcome"]["to"], "Completed");

    let (_, order) = get_request(&format!("/order/{order_number}"), configure_store(&store)).await;
    assert_eq!(json(&order)["order"]["status"], "Confirmed");

    // Redelivery is acknowledged but changes nothing
    let (status, response) = deliver(&store, payload, &signature).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&response)["result"], "duplicate");
    assert_eq!(store.issuer.calls(), 1);
    store.teardown().await;
}

#[actix_web::test]
async fn bad_signatures_are_401s() {
    let store = TestStore::new().await;
    let (order_number, reference) = pending_checkout(&store, "jack").await;
    let (payload, _) = store.processor.signed_webhook(&reference, "paid");
    let (status, response) = deliver(&store, payload.clone(), "deadbeef").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json(&response)["error"], "The webhook signature is missing or invalid");
    // No signature header at all
    let path = format!("/webhook/{FAKE_GATEWAY}");
    let (status, _) = post_raw(&path, payload, &[], configure_store(&store)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, order) = get_request(&format!("/order/{order_number}"), configure_store(&store)).await;
    assert_eq!(json(&order)["order"]["status"], "New");
    store.teardown().await;
}

#[actix_web::test]
async fn unusable_deliveries_are_acknowledged() {
    let store = TestStore::new().await;
    let (status, response) = deliver(&store, b"{not json".to_vec(), "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&response)["result"], "malformed");

    let (payload, signature) = store.processor.signed_webhook("fake_unknown", "paid");
    let (status, response) = deliver(&store, payload, &signature).await;
    assert_eq!(status, StatusCode::OK);
    let response = json(&response);
    assert_eq!(response["result"], "unknown_reference");
    assert_eq!(response["external_reference"], "fake_unknown");
    store.teardown().await;
}

#[actix_web::test]
async fn unknown_gateways_are_404s() {
    let store = TestStore::new().await;
    let (status, _) = post_raw("/webhook/nopay", b"{}".to_vec(), &[], configure_store(&store)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    store.teardown().await;
}

#[actix_web::test]
async fn signature_is_read_from_the_adapters_header() {
    let store = TestStore::new().await;
    let config = store.db.upsert_gateway_config(test_gateway_config("mockpay")).await.unwrap();
    let mut processor = MockProcessor::new();
    processor.expect_name().return_const("mock");
    processor.expect_signature_header().return_const("X-Mock-Signature");
    processor.expect_initialize().returning(|settings| GatewayContext::from_settings(settings));
    processor.expect_parse_notification().returning(|_| {
        Ok(Notification { external_reference: "mock_1".into(), native_status: "done".into() })
    });
    processor.expect_verify_signature().withf(|_, _, signature| signature == "mock-sig").times(1).return_const(true);
    // Nothing is mapped for a payment we do not know about
    processor.expect_map_status().never();
    let mut registry = store.reconciler().registry().clone();
    registry.register(config, Arc::new(processor)).unwrap();
    let checkout =
        CheckoutApi::new(store.db.clone(), Arc::new(registry), store.fulfillment().clone(), EventProducers::default());

    let headers = [("X-Mock-Signature", "mock-sig"), (FAKE_SIGNATURE_HEADER, "not-this-one")];
    let (status, response) = post_raw("/webhook/mockpay", br#"{"id": "mock_1"}"#.to_vec(), &headers, move |cfg| {
        cfg.app_data(web::Data::new(checkout))
            .app_data(web::Data::new(ServerOptions::default()))
            .service(web::scope("/webhook").service(WebhookRoute::<SqliteDatabase>::new()));
    })
    .await;
    assert_eq!(status, StatusCode::OK, "{response}");
    assert_eq!(json(&response)["result"], "unknown_reference");
    store.teardown().await;
}

#[actix_web::test]
async fn early_webhooks_are_503s_until_the_reference_is_stored() {
    let store = TestStore::new().await;
    let intent = NewPaymentIntent {
        id: "pi_early".into(),
        gateway_code: FAKE_GATEWAY.into(),
        purpose: PaymentPurpose::Checkout,
        customer_id: "kim".into(),
        amount_requested: Money::from(2_500),
        amount_charged: Money::from(2_575),
        fee_amount: Money::from(75),
        bonus_amount: Money::default(),
        currency: "USD".into(),
    };
    store.db.create_gateway_checkout(intent, vec![]).await.unwrap();
    let (payload, signature) = store.processor.signed_webhook("fake_pi_early", "paid");
    let (status, response) = deliver(&store, payload, &signature).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{response}");
    assert!(json(&response)["error"].as_str().unwrap().contains("fake_pi_early"));
    store.teardown().await;
}
