use actix_web::{http::StatusCode, test, test::TestRequest, web, web::ServiceConfig, App};
use log::debug;
use serde_json::Value;
use storefront_payment_engine::{test_utils::fakes::TestStore, SqliteDatabase};

use crate::{
    config::ServerOptions,
    routes::{
        BalanceRoute,
        CancelPaymentRoute,
        CheckoutRoute,
        CustomerOrdersRoute,
        DepositRoute,
        OrderByNumberRoute,
        PaymentByIdRoute,
        WebhookRoute,
    },
};

pub async fn get_request(path: &str, configure: impl FnOnce(&mut ServiceConfig)) -> (StatusCode, String) {
    let req = TestRequest::get().uri(path).to_request();
    send(req, configure).await
}

pub async fn post_json(path: &str, body: Value, configure: impl FnOnce(&mut ServiceConfig)) -> (StatusCode, String) {
    let req = TestRequest::post().uri(path).set_json(body).to_request();
    send(req, configure).await
}

/// Posts a raw body, as a payment processor does.
pub async fn post_raw(
    path: &str,
    body: Vec<u8>,
    headers: &[(&str, &str)],
    configure: impl FnOnce(&mut ServiceConfig),
) -> (StatusCode, String) {
    let mut req = TestRequest::post().uri(path).insert_header(("Content-Type", "application/json"));
    for &(name, value) in headers {
        req = req.insert_header((name, value));
    }
    send(req.set_payload(body).to_request(), configure).await
}

async fn send(req: actix_http::Request, configure: impl FnOnce(&mut ServiceConfig)) -> (StatusCode, String) {
    let app = App::new().configure(configure);
    let service = test::init_service(app).await;
    debug!("Making request");
    let res = test::call_service(&service, req).await;
    let status = res.status();
    let body = String::from_utf8_lossy(&test::read_body(res).await).into_owned();
    (status, body)
}

pub fn json(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|e| panic!("Response is not JSON ({e}): {body}"))
}

/// Mounts every engine-backed route against the test store's database, the way the server does.
pub fn configure_store(store: &TestStore) -> impl FnOnce(&mut ServiceConfig) {
    let checkout = store.checkout.clone();
    let accounts = store.accounts.clone();
    move |cfg| {
        cfg.app_data(web::Data::new(checkout))
            .app_data(web::Data::new(accounts))
            .app_data(web::Data::new(ServerOptions::default()))
            .service(CheckoutRoute::<SqliteDatabase>::new())
            .service(DepositRoute::<SqliteDatabase>::new())
            .service(CancelPaymentRoute::<SqliteDatabase>::new())
            .service(PaymentByIdRoute::<SqliteDatabase>::new())
            .service(OrderByNumberRoute::<SqliteDatabase>::new())
            .service(CustomerOrdersRoute::<SqliteDatabase>::new())
            .service(BalanceRoute::<SqliteDatabase>::new())
            .service(web::scope("/webhook").service(WebhookRoute::<SqliteDatabase>::new()));
    }
}
