use sfp_common::{Money, OrderStatusType, PaymentStatus};
use sfp_integrations::ConfigOption;
use storefront_payment_engine::{
    checkout_objects::{CartItem, CheckoutRequest, DepositRequest, ReconcileOutcome, Settlement, WebhookOutcome},
    db_types::{PaymentPurpose, SettlementMethod},
    test_utils::fakes::{test_products, TestStore, FAKE_GATEWAY},
    CatalogManagement,
    CheckoutError,
};

fn item(product_ref: &str) -> CartItem {
    let configuration = match product_ref {
        "vpn" => vec![ConfigOption { name: "region".into(), value: "eu-west".into() }],
        _ => vec![],
    };
    CartItem { product_ref: product_ref.into(), quantity: 1, configuration }
}

fn gateway() -> Settlement {
    Settlement::Gateway {
        gateway_code: FAKE_GATEWAY.into(),
        success_url: "https://shop.test/ok".into(),
        cancel_url: "https://shop.test/cancel".into(),
    }
}

#[tokio::test]
async fn one_failing_item_does_not_hold_up_the_others() {
    let store = TestStore::new().await;
    store.accounts.credit("alice", Money::from(10_000), "manual", "top-up").await.unwrap();
    store.issuer.fail_for("ebook");
    let request = CheckoutRequest {
        customer_id: "alice".into(),
        email: Some("alice@example.com".into()),
        items: vec![item("vpn"), item("ebook"), item("course")],
        settlement: Settlement::Balance,
    };
    let result = store.checkout.checkout(request).await.unwrap();
    assert_eq!(result.orders.len(), 3);
    let statuses = result.orders.iter().map(|o| o.status).collect::<Vec<_>>();
    assert_eq!(statuses, vec![OrderStatusType::Confirmed, OrderStatusType::Processing, OrderStatusType::Confirmed]);
    assert!(result.orders.iter().all(|o| o.settlement == SettlementMethod::Balance));
    // 10.00 + 5.00 + 25.00 were debited, and nothing was given back
    let balance = store.accounts.balance("alice").await.unwrap();
    assert_eq!(balance.balance, Money::from(6_000));

    let failed = store.accounts.order_details(&result.orders[1].order_number).await.unwrap().unwrap();
    assert_eq!(failed.provisioning.len(), 1);
    assert!(!failed.provisioning[0].success);
    assert!(failed.provisioning[0].error.is_some());
    let done = store.accounts.order_details(&result.orders[0].order_number).await.unwrap().unwrap();
    assert!(done.provisioning[0].success);
    assert_eq!(done.provisioning[0].credentials.0[0].label, "licence_key");

    // The sweep picks the failed order up once the issuer recovers
    store.issuer.heal("ebook");
    let reports = store.fulfillment().retry_outstanding().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].confirmed);
    let retried = store.accounts.order_details(&result.orders[1].order_number).await.unwrap().unwrap();
    assert_eq!(retried.order.status, OrderStatusType::Confirmed);
    assert_eq!(retried.provisioning.len(), 2);
    assert!(store.fulfillment().retry_outstanding().await.unwrap().is_empty());
    assert_eq!(store.issuer.issued().len(), 3);
    // Confirmed orders are never provisioned twice
    let reports = store.fulfillment().provision_orders(&result.orders[..1]).await;
    assert_eq!(reports[0].order_number.as_ref(), Some(&result.orders[0].order_number));
    assert_eq!(reports[0].skipped.as_deref(), Some("order is Confirmed"));
    assert_eq!(store.issuer.issued().len(), 3);
    store.teardown().await;
}

#[tokio::test]
async fn provisioning_gives_up_after_the_attempt_limit() {
    let store = TestStore::new().await;
    store.accounts.credit("erin", Money::from(1_000), "manual", "top-up").await.unwrap();
    store.issuer.fail_for("ebook");
    let request = CheckoutRequest {
        customer_id: "erin".into(),
        email: None,
        items: vec![item("ebook")],
        settlement: Settlement::Balance,
    };
    let result = store.checkout.checkout(request).await.unwrap();
    // The store allows three attempts: one at checkout and two from the sweep
    for _ in 0..2 {
        let reports = store.fulfillment().retry_outstanding().await.unwrap();
        assert_eq!(reports[0].failed, 1);
    }
    let calls = store.issuer.calls();
    let reports = store.fulfillment().retry_outstanding().await.unwrap();
    assert_eq!(reports[0].needs_review, 1);
    assert_eq!(store.issuer.calls(), calls, "the issuer is not called again once the limit is reached");
    let order = store.accounts.order_details(&result.orders[0].order_number).await.unwrap().unwrap();
    assert_eq!(order.order.status, OrderStatusType::Processing);
    assert_eq!(order.provisioning.len(), 3);
    store.teardown().await;
}

#[tokio::test]
async fn invalid_carts_have_no_side_effects() {
    let store = TestStore::new().await;
    store.accounts.credit("frank", Money::from(10_000), "manual", "top-up").await.unwrap();
    let cart = |items: Vec<CartItem>| CheckoutRequest {
        customer_id: "frank".into(),
        email: None,
        items,
        settlement: Settlement::Balance,
    };
    let bad_carts = vec![
        cart(vec![]),
        cart(vec![item("ebook"), CartItem { quantity: 0, ..item("course") }]),
        cart(vec![item("ebook"), item("no-such-product")]),
        cart(vec![item("retired")]),
        cart(vec![CartItem { product_ref: "vpn".into(), quantity: 1, configuration: vec![] }]),
    ];
    for request in bad_carts {
        let err = store.checkout.checkout(request).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)), "{err}");
    }
    let err = store.checkout.checkout(cart(vec![item("course"); 5])).await.unwrap_err();
    assert!(matches!(err, CheckoutError::InsufficientBalance { .. }));
    assert!(store.accounts.orders_for_customer("frank").await.unwrap().is_empty());
    assert_eq!(store.accounts.balance("frank").await.unwrap().balance, Money::from(10_000));
    assert_eq!(store.issuer.calls(), 0);
    store.teardown().await;
}

#[tokio::test]
async fn gateway_checkout_adds_the_fee_and_defers_provisioning() {
    let store = TestStore::new().await;
    let request = CheckoutRequest {
        customer_id: "gina".into(),
        email: Some("gina@example.com".into()),
        items: vec![item("course"), item("ebook")],
        settlement: gateway(),
    };
    let result = store.checkout.checkout(request).await.unwrap();
    let payment = result.payment.clone().unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.purpose, PaymentPurpose::Checkout);
    assert_eq!(payment.amount_requested, Money::from(3_000));
    assert_eq!(payment.fee_amount, Money::from(90));
    assert_eq!(payment.amount_charged, Money::from(3_090));
    let reference = payment.external_reference.clone().unwrap();
    assert_eq!(result.checkout_url.as_deref(), Some(format!("https://fakepay.test/pay/{reference}").as_str()));
    assert!(result.orders.iter().all(|o| o.status == OrderStatusType::New));
    assert_eq!(store.issuer.calls(), 0);

    let (body, signature) = store.processor.signed_webhook(&reference, "paid");
    let outcome = store.reconciler().process_webhook(FAKE_GATEWAY, &body, Some(&signature)).await.unwrap();
    assert_eq!(outcome, WebhookOutcome::Reconciled {
        payment_id: payment.id.clone(),
        outcome: ReconcileOutcome::Applied { from: PaymentStatus::Pending, to: PaymentStatus::Completed },
    });
    let details = store.accounts.payment_details(&payment.id).await.unwrap().unwrap();
    assert_eq!(details.payment.status, PaymentStatus::Completed);
    assert!(details.orders.iter().all(|o| o.status == OrderStatusType::Confirmed));
    assert_eq!(store.issuer.calls(), 2);
    store.teardown().await;
}

#[tokio::test]
async fn amounts_outside_the_gateway_range_are_refused_up_front() {
    let store = TestStore::new().await;
    let request = CheckoutRequest {
        customer_id: "hal".into(),
        email: None,
        items: vec![CartItem { quantity: 1_000, ..item("course") }],
        settlement: gateway(),
    };
    let err = store.checkout.checkout(request).await.unwrap_err();
    assert!(matches!(err, CheckoutError::AmountOutOfRange { .. }), "{err}");
    assert!(store.accounts.orders_for_customer("hal").await.unwrap().is_empty());
    assert_eq!(store.processor.charges_created(), 0);
    store.teardown().await;
}

#[tokio::test]
async fn a_failed_charge_fails_the_payment_and_cancels_its_orders() {
    let store = TestStore::new().await;
    store.processor.fail_charges(true);
    let request = CheckoutRequest {
        customer_id: "ivy".into(),
        email: None,
        items: vec![item("ebook")],
        settlement: gateway(),
    };
    let err = store.checkout.checkout(request).await.unwrap_err();
    assert!(matches!(err, CheckoutError::GatewayUnavailable(_)), "{err}");
    let orders = store.accounts.orders_for_customer("ivy").await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatusType::Cancelled);
    let intent_id = orders[0].payment_intent_id.clone().unwrap();
    let details = store.accounts.payment_details(&intent_id).await.unwrap().unwrap();
    assert_eq!(details.payment.status, PaymentStatus::Failed);
    assert_eq!(details.audit.len(), 2);
    store.teardown().await;
}

#[tokio::test]
async fn deposits_credit_the_balance_with_the_bonus_exactly_once() {
    let store = TestStore::new().await;
    let request = DepositRequest {
        customer_id: "jack".into(),
        email: None,
        gateway_code: FAKE_GATEWAY.into(),
        amount: Money::from(10_000),
        currency: None,
        success_url: "https://shop.test/ok".into(),
        cancel_url: "https://shop.test/cancel".into(),
    };
    let deposit = store.checkout.init_deposit(request).await.unwrap();
    assert_eq!(deposit.price.fee_amount, Money::from(300));
    assert_eq!(deposit.price.total_charged, Money::from(10_300));
    assert_eq!(deposit.price.bonus_amount, Money::from(1_000));
    assert_eq!(deposit.payment.purpose, PaymentPurpose::Deposit);
    assert_eq!(deposit.payment.amount_charged, Money::from(10_300));

    let reference = deposit.payment.external_reference.clone().unwrap();
    let (body, signature) = store.processor.signed_webhook(&reference, "paid");
    store.reconciler().process_webhook(FAKE_GATEWAY, &body, Some(&signature)).await.unwrap();
    // A poll that reports the same status changes nothing
    store.processor.set_status(&reference, "paid");
    let payment = store.accounts.payment_details(&deposit.payment.id).await.unwrap().unwrap().payment;
    let outcome = store.reconciler().poll_payment(payment).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Unchanged { status: PaymentStatus::Completed });

    let balance = store.accounts.balance("jack").await.unwrap();
    assert_eq!(balance.balance, Money::from(11_000));
    assert_eq!(balance.history.len(), 1);
    assert_eq!(balance.history[0].reason, "deposit");
    assert_eq!(balance.history[0].reference, deposit.payment.id);
    store.teardown().await;
}

#[tokio::test]
async fn amounts_too_large_to_price_are_refused() {
    let store = TestStore::new().await;
    let request = DepositRequest {
        customer_id: "kate".into(),
        email: None,
        gateway_code: FAKE_GATEWAY.into(),
        amount: Money::from(i64::MAX - 1),
        currency: None,
        success_url: "https://shop.test/ok".into(),
        cancel_url: "https://shop.test/cancel".into(),
    };
    let err = store.checkout.init_deposit(request).await.unwrap_err();
    assert!(matches!(err, CheckoutError::Validation(_)), "{err}");

    let mut yacht = test_products().remove(0);
    yacht.product_ref = "yacht".into();
    yacht.required_options = vec![];
    yacht.unit_price = Money::from(i64::MAX / 2);
    store.db.upsert_product(yacht).await.unwrap();
    let request = CheckoutRequest {
        customer_id: "kate".into(),
        email: None,
        items: vec![CartItem { quantity: 3, ..item("yacht") }],
        settlement: gateway(),
    };
    let err = store.checkout.checkout(request).await.unwrap_err();
    assert!(matches!(err, CheckoutError::Validation(_)), "{err}");
    // Two of them fit individually, but not together
    let request = CheckoutRequest {
        customer_id: "kate".into(),
        email: None,
        items: vec![item("yacht"), item("yacht"), item("yacht")],
        settlement: gateway(),
    };
    let err = store.checkout.checkout(request).await.unwrap_err();
    assert!(matches!(err, CheckoutError::Validation(_)), "{err}");

    assert!(store.accounts.orders_for_customer("kate").await.unwrap().is_empty());
    assert_eq!(store.processor.charges_created(), 0);
    store.teardown().await;
}
