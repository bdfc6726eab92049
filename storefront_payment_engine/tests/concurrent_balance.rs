use sfp_common::Money;
use storefront_payment_engine::{
    checkout_objects::{CartItem, CheckoutRequest, Settlement},
    test_utils::fakes::TestStore,
    CheckoutError,
};

fn course_cart(customer_id: &str) -> CheckoutRequest {
    CheckoutRequest {
        customer_id: customer_id.to_string(),
        email: None,
        items: vec![CartItem { product_ref: "course".into(), quantity: 1, configuration: vec![] }],
        settlement: Settlement::Balance,
    }
}

#[tokio::test]
async fn simultaneous_balance_checkouts_only_spend_once() {
    let store = TestStore::new().await;
    // Enough for exactly one course
    store.accounts.credit("carol", Money::from(2_500), "manual", "top-up-1").await.unwrap();

    let (a, b) = tokio::join!(store.checkout.checkout(course_cart("carol")), store.checkout.checkout(course_cart("carol")));
    let results = [a, b];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let shortfalls =
        results.iter().filter(|r| matches!(r, Err(CheckoutError::InsufficientBalance { .. }))).count();
    assert_eq!(successes, 1);
    assert_eq!(shortfalls, 1);

    let balance = store.accounts.balance("carol").await.unwrap();
    assert_eq!(balance.balance, Money::from(0));
    let orders = store.accounts.orders_for_customer("carol").await.unwrap();
    assert_eq!(orders.len(), 1, "the failed checkout must not leave an order behind");
    store.teardown().await;
}

#[tokio::test]
async fn a_burst_of_checkouts_never_overdraws() {
    let store = TestStore::new().await;
    store.accounts.credit("dave", Money::from(1_500), "manual", "top-up-1").await.unwrap();
    let ebook = || CheckoutRequest {
        customer_id: "dave".into(),
        email: None,
        items: vec![CartItem { product_ref: "ebook".into(), quantity: 1, configuration: vec![] }],
        settlement: Settlement::Balance,
    };
    let runs = (0..8).map(|_| store.checkout.checkout(ebook()));
    let results = futures_util::future::join_all(runs).await;
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
    let balance = store.accounts.balance("dave").await.unwrap();
    assert_eq!(balance.balance, Money::from(0));
    assert_eq!(balance.history.len(), 4);
    store.teardown().await;
}
