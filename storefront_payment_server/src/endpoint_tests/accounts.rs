use actix_web::{http::StatusCode, web, web::ServiceConfig};
use chrono::{TimeZone, Utc};
use sfp_common::{Money, OrderStatusType, PaymentStatus};
use storefront_payment_engine::{
    db_types::{
        BalanceEntry,
        Order,
        OrderNumber,
        PaymentAuditEntry,
        PaymentIntent,
        PaymentPurpose,
        SettlementMethod,
        TransitionSource,
        UserAccount,
    },
    AccountApiError,
    AccountsApi,
};

use super::{
    helpers::{get_request, json},
    mocks::MockAccountManager,
};
use crate::routes::{BalanceRoute, CustomerOrdersRoute, OrderByNumberRoute, PaymentByIdRoute};

#[actix_web::test]
async fn fetch_balance() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/balance/alice", configure).await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["customer_id"], "alice");
    assert_eq!(body["balance"], 2_500);
    assert_eq!(body["history"][0]["reason"], "deposit");
}

#[actix_web::test]
async fn balance_of_unknown_customer_is_zero() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/balance/nobody", configure).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["balance"], 0);
}

#[actix_web::test]
async fn fetch_payment_with_audit_trail() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/payment/pay_123", configure).await;
    assert_eq!(status, StatusCode::OK);
    let body = json(&body);
    assert_eq!(body["payment"]["status"], "Failed");
    assert_eq!(body["orders"][0]["order_number"], "ORD-1");
    let audit = body["audit"].as_array().unwrap();
    assert_eq!(audit.len(), 2);
    assert_eq!(audit[1]["applied"], false);
    assert_eq!(audit[1]["to_status"], "Completed");
}

#[actix_web::test]
async fn missing_records_are_404s() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/payment/pay_missing", configure).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["error"], "The data was not found. Payment pay_missing does not exist");
    let (status, _) = get_request("/order/ORD-404", configure).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn database_errors_are_500s() {
    let _ = env_logger::try_init().ok();
    let (status, body) = get_request("/orders/broken", configure).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json(&body)["error"].as_str().unwrap().contains("database is locked"));
}

fn configure(cfg: &mut ServiceConfig) {
    let mut accounts = MockAccountManager::new();
    accounts.expect_fetch_user_account_for_customer_id().returning(|id| match id {
        "alice" => Ok(Some(account())),
        _ => Ok(None),
    });
    accounts.expect_fetch_balance_history().returning(|id| match id {
        "alice" => Ok(vec![balance_entry()]),
        _ => Ok(vec![]),
    });
    accounts.expect_fetch_payment_intent().returning(|id| match id {
        "pay_123" => Ok(Some(payment_intent())),
        _ => Ok(None),
    });
    accounts.expect_fetch_orders_for_payment_intent().returning(|_| Ok(vec![order()]));
    accounts.expect_fetch_payment_audit().returning(|_| Ok(audit_trail()));
    accounts.expect_fetch_order_by_number().returning(|_| Ok(None));
    accounts.expect_fetch_orders_for_customer().returning(|id| match id {
        "broken" => Err(AccountApiError::DatabaseError("database is locked".into())),
        _ => Ok(vec![order()]),
    });
    let accounts_api = AccountsApi::new(accounts);
    cfg.service(BalanceRoute::<MockAccountManager>::new())
        .service(PaymentByIdRoute::<MockAccountManager>::new())
        .service(OrderByNumberRoute::<MockAccountManager>::new())
        .service(CustomerOrdersRoute::<MockAccountManager>::new())
        .app_data(web::Data::new(accounts_api));
}

fn account() -> UserAccount {
    UserAccount {
        id: 1,
        customer_id: "alice".into(),
        email: Some("alice@example.com".into()),
        balance: Money::from(2_500),
        created_at: Utc.with_ymd_and_hms(2024, 2, 29, 13, 30, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
    }
}

fn balance_entry() -> BalanceEntry {
    BalanceEntry {
        id: 1,
        account_id: 1,
        amount: Money::from(2_500),
        balance_after: Money::from(2_500),
        reason: "deposit".into(),
        reference: "pay_001".into(),
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
    }
}

fn payment_intent() -> PaymentIntent {
    PaymentIntent {
        id: "pay_123".into(),
        gateway_code: "cards".into(),
        purpose: PaymentPurpose::Checkout,
        customer_id: "alice".into(),
        amount_requested: Money::from(1_000),
        amount_charged: Money::from(1_030),
        fee_amount: Money::from(30),
        bonus_amount: Money::from(0),
        currency: "USD".into(),
        status: PaymentStatus::Failed,
        external_reference: Some("cs_123".into()),
        checkout_url: Some("https://cards.test/pay/cs_123".into()),
        created_at: Utc.with_ymd_and_hms(2024, 3, 15, 18, 30, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2024, 3, 15, 18, 35, 0).unwrap(),
    }
}

fn order() -> Order {
    Order {
        id: 1,
        order_number: OrderNumber("ORD-1".into()),
        customer_id: "alice".into(),
        buyer_email: Some("alice@example.com".into()),
        settlement: SettlementMethod::Gateway,
        payment_intent_id: Some("pay_123".into()),
        total_amount: Money::from(1_000),
        currency: "USD".into(),
        status: OrderStatusType::Cancelled,
        created_at: Utc.with_ymd_and_hms(2024, 3, 15, 18, 30, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2024, 3, 15, 18, 35, 0).unwrap(),
    }
}

// The buyer cancelled, then the processor reported the payment as completed
fn audit_trail() -> Vec<PaymentAuditEntry> {
    let entry = |id: i64, from: PaymentStatus, to: PaymentStatus, source: TransitionSource, applied: bool| {
        PaymentAuditEntry {
            id,
            payment_intent_id: "pay_123".into(),
            from_status: Some(from),
            to_status: to,
            source,
            applied,
            note: None,
            created_at: Utc.with_ymd_and_hms(2024, 3, 15, 18, 35, 0).unwrap(),
        }
    };
    vec![
        entry(1, PaymentStatus::Pending, PaymentStatus::Failed, TransitionSource::Buyer, true),
        entry(2, PaymentStatus::Failed, PaymentStatus::Completed, TransitionSource::Webhook, false),
    ]
}
