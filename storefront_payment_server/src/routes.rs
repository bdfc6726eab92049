//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into the engine. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests:
//! ```nocompile
//!     fn my_handler() -> impl Responder {
//!         std::thread::sleep(Duration::from_secs(5)); // <-- Bad practice! Will cause the current worker thread to
//! hang!
//!     }
//! ```
//! For this reason, any long, non-cpu-bound operation (e.g. I/O, database operations, etc.) should be expressed as
//! futures or asynchronous functions. Async handlers get executed concurrently by worker threads and thus don’t block
//! execution:
//!
//! ```nocompile
//!     async fn my_handler() -> impl Responder {
//!         tokio::time::sleep(Duration::from_secs(5)).await; // <-- Ok. Worker thread will handle other requests here
//!     }
//! ```
use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use bytes::Bytes;
use log::*;
use storefront_payment_engine::{
    checkout_objects::{CheckoutRequest, DepositRequest, Settlement},
    db_types::OrderNumber,
    AccountManagement,
    AccountsApi,
    CheckoutApi,
    StorefrontDatabase,
};

use crate::{
    config::ServerOptions,
    data_objects::{CancelResponse, CheckoutResponse, DepositResponse},
    errors::ServerError,
    helpers::get_remote_ip,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Checkout  ----------------------------------------------------
route!(checkout => Post "/checkout" impl StorefrontDatabase);
/// Submits a cart. Each cart item becomes its own order.
///
/// Balance checkouts are debited and provisioned before the response is sent. Gateway checkouts return the URL the
/// buyer must be redirected to; the orders are provisioned once the processor reports the payment as completed.
pub async fn checkout<B: StorefrontDatabase>(
    body: web::Json<CheckoutRequest>,
    api: web::Data<CheckoutApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    let method = match &request.settlement {
        Settlement::Balance => "balance".to_string(),
        Settlement::Gateway { gateway_code, .. } => gateway_code.clone(),
    };
    debug!("💻️ Checkout request from {} for {} item(s), paid with {method}", request.customer_id, request.items.len());
    let result = api.checkout(request).await?;
    Ok(HttpResponse::Ok().json(CheckoutResponse::from(result)))
}

route!(deposit => Post "/deposit" impl StorefrontDatabase);
pub async fn deposit<B: StorefrontDatabase>(
    body: web::Json<DepositRequest>,
    api: web::Data<CheckoutApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    debug!("💻️ Deposit request from {} for {} via {}", request.customer_id, request.amount, request.gateway_code);
    let result = api.init_deposit(request).await?;
    Ok(HttpResponse::Ok().json(DepositResponse::from(result)))
}

route!(cancel_payment => Post "/payment/{payment_id}/cancel" impl StorefrontDatabase);
pub async fn cancel_payment<B: StorefrontDatabase>(
    path: web::Path<String>,
    api: web::Data<CheckoutApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let payment_id = path.into_inner();
    debug!("💻️ Buyer cancellation request for payment {payment_id}");
    let intent = api.cancel_payment(&payment_id).await?;
    Ok(HttpResponse::Ok().json(CancelResponse::from(intent)))
}

//----------------------------------------------   Webhooks  ----------------------------------------------------
route!(webhook => Post "/{gateway_code}" impl StorefrontDatabase);
/// Route handler for payment processor notifications. Mounted under `/webhook`.
///
/// The signature is read from the header that the gateway's adapter names. Any delivery that was handled, including
/// duplicates, malformed payloads and notifications for unknown payments, is acknowledged with a 200. A bad signature
/// gets a 401 and a persistence failure a 500, so that the processor retries.
pub async fn webhook<B: StorefrontDatabase>(
    req: HttpRequest,
    path: web::Path<String>,
    body: Bytes,
    api: web::Data<CheckoutApi<B>>,
    options: web::Data<ServerOptions>,
) -> Result<HttpResponse, ServerError> {
    let gateway_code = path.into_inner();
    let peer = get_remote_ip(&req, options.use_x_forwarded_for, options.use_forwarded);
    trace!("💻️ Webhook for {gateway_code} from {peer:?} ({} bytes)", body.len());
    let reconciler = api.reconciler();
    let signature = reconciler
        .registry()
        .get(&gateway_code)
        .and_then(|g| req.headers().get(g.processor.signature_header()))
        .and_then(|v| v.to_str().ok());
    let outcome = reconciler.process_webhook(&gateway_code, &body, signature).await?;
    debug!("💻️ Webhook for {gateway_code} handled: {outcome:?}");
    Ok(HttpResponse::Ok().json(outcome))
}

//----------------------------------------------   Accounts  ----------------------------------------------------
route!(payment_by_id => Get "/payment/{payment_id}" impl AccountManagement);
/// A payment intent with its orders and its audit trail, rejected transitions included.
pub async fn payment_by_id<B: AccountManagement>(
    path: web::Path<String>,
    api: web::Data<AccountsApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let payment_id = path.into_inner();
    trace!("💻️ Fetching payment {payment_id}");
    let details = api
        .payment_details(&payment_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Payment {payment_id} does not exist")))?;
    Ok(HttpResponse::Ok().json(details))
}

route!(order_by_number => Get "/order/{order_number}" impl AccountManagement);
pub async fn order_by_number<B: AccountManagement>(
    path: web::Path<String>,
    api: web::Data<AccountsApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_number = OrderNumber(path.into_inner());
    trace!("💻️ Fetching order {order_number}");
    let details = api
        .order_details(&order_number)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Order {order_number} does not exist")))?;
    Ok(HttpResponse::Ok().json(details))
}

route!(customer_orders => Get "/orders/{customer_id}" impl AccountManagement);
pub async fn customer_orders<B: AccountManagement>(
    path: web::Path<String>,
    api: web::Data<AccountsApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let customer_id = path.into_inner();
    trace!("💻️ Fetching orders for customer {customer_id}");
    let orders = api.orders_for_customer(&customer_id).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(balance => Get "/balance/{customer_id}" impl AccountManagement);
pub async fn balance<B: AccountManagement>(
    path: web::Path<String>,
    api: web::Data<AccountsApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let customer_id = path.into_inner();
    trace!("💻️ Fetching balance for customer {customer_id}");
    let balance = api.balance(&customer_id).await?;
    Ok(HttpResponse::Ok().json(balance))
}
