use std::{net::IpAddr, sync::Arc, time::Duration};

use actix_web::{
    dev::{Server, Service},
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    HttpServer,
};
use futures::{future::ok, FutureExt};
use log::*;
use sfp_integrations::HttpCredentialIssuer;
use storefront_payment_engine::{AccountsApi, CheckoutApi, FulfillmentApi, GatewayRegistry, SqliteDatabase};

use crate::{
    config::{ServerConfig, ServerOptions},
    errors::ServerError,
    helpers::get_remote_ip,
    hooks::create_notification_handlers,
    routes::{
        health,
        BalanceRoute,
        CancelPaymentRoute,
        CheckoutRoute,
        CustomerOrdersRoute,
        DepositRoute,
        OrderByNumberRoute,
        PaymentByIdRoute,
        WebhookRoute,
    },
    seed::{apply_seed, load_seed_file},
    workers::{start_provisioning_sweep, start_status_poll_worker},
};

/// Prepares the database, wires up the engine and the background workers, and runs the HTTP server until it is shut
/// down.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    if let Some(path) = &config.seed_file {
        let seed = load_seed_file(path)?;
        apply_seed(&db, seed).await?;
    }
    let registry = GatewayRegistry::load(&db).await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    if registry.is_empty() {
        warn!("🪛️ No payment gateways are configured. Only balance checkouts will be possible.");
    }
    let issuer = HttpCredentialIssuer::new(&config.provisioning.url, config.provisioning.api_key.clone())
        .map_err(|e| ServerError::ConfigurationError(e.to_string()))?;
    let handlers = create_notification_handlers(config.max_provisioning_attempts);
    let producers = handlers.producers();
    handlers.start_handlers();
    let fulfillment =
        FulfillmentApi::new(db.clone(), Arc::new(issuer), config.max_provisioning_attempts, producers.clone());
    let checkout_api = CheckoutApi::new(db.clone(), Arc::new(registry), fulfillment, producers);
    let _poll_worker =
        start_status_poll_worker(checkout_api.reconciler().clone(), config.status_poll_interval, config.payment_expiry);
    let _sweep_worker =
        start_provisioning_sweep(checkout_api.fulfillment().clone(), config.provisioning_sweep_interval);
    let srv = create_server_instance(config, db, checkout_api)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    checkout_api: CheckoutApi<SqliteDatabase>,
) -> Result<Server, ServerError> {
    let options = ServerOptions::from_config(&config);
    let webhook_whitelist = config.webhook_whitelist.clone();
    let srv = HttpServer::new(move || {
        let accounts_api = AccountsApi::new(db.clone());
        let webhook_whitelist = webhook_whitelist.clone();
        let webhook_scope = web::scope("/webhook")
            .wrap_fn(move |req, srv| {
                let peer_ip = get_remote_ip(req.request(), options.use_x_forwarded_for, options.use_forwarded);
                if is_whitelisted(peer_ip, webhook_whitelist.as_deref()) {
                    srv.call(req)
                } else {
                    ok(req.error_response(ServerError::ForbiddenPeer)).boxed_local()
                }
            })
            .service(WebhookRoute::<SqliteDatabase>::new());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("sfp::access_log"))
            .app_data(web::Data::new(checkout_api.clone()))
            .app_data(web::Data::new(accounts_api))
            .app_data(web::Data::new(options))
            .service(health)
            .service(CheckoutRoute::<SqliteDatabase>::new())
            .service(DepositRoute::<SqliteDatabase>::new())
            .service(CancelPaymentRoute::<SqliteDatabase>::new())
            .service(PaymentByIdRoute::<SqliteDatabase>::new())
            .service(OrderByNumberRoute::<SqliteDatabase>::new())
            .service(CustomerOrdersRoute::<SqliteDatabase>::new())
            .service(BalanceRoute::<SqliteDatabase>::new())
            .service(webhook_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}

/// With no whitelist configured every peer is allowed. With one, the peer's address must be known and on the list.
pub fn is_whitelisted(peer_ip: Option<IpAddr>, whitelist: Option<&[IpAddr]>) -> bool {
    match (peer_ip, whitelist) {
        (_, None) => true,
        (Some(ip), Some(whitelist)) => {
            let allowed = whitelist.contains(&ip);
            if !allowed {
                warn!("💻️ Webhook from {ip} is not on the whitelist. Denying access.");
            }
            allowed
        },
        (None, Some(_)) => {
            warn!("💻️ No IP address found in webhook request, denying access.");
            false
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn whitelist_checks() {
        let ip: IpAddr = "10.1.2.3".parse().unwrap();
        let other: IpAddr = "10.1.2.4".parse().unwrap();
        assert!(is_whitelisted(Some(ip), None));
        assert!(is_whitelisted(None, None));
        assert!(is_whitelisted(Some(ip), Some(&[ip])));
        assert!(!is_whitelisted(Some(other), Some(&[ip])));
        assert!(!is_whitelisted(None, Some(&[ip])));
        assert!(!is_whitelisted(Some(ip), Some(&[])));
    }
}
