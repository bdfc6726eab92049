//! # Storefront payment server
//! This crate hosts the HTTP front end of the storefront payment pipeline. It is responsible for:
//! * Accepting checkouts and balance deposits from the storefront.
//! * Receiving webhook notifications from the payment processors and handing them to the reconciler.
//! * Running the background workers that poll unsettled payments and retry failed provisioning.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `POST /checkout`: Submit a cart, paid from the customer's balance or through a payment gateway.
//! * `POST /deposit`: Top up a customer's balance through a payment gateway.
//! * `POST /payment/{id}/cancel`: Cancel a pending payment on the buyer's behalf.
//! * `POST /webhook/{gateway}`: Payment processor notifications.
//! * `GET /payment/{id}`, `GET /order/{number}`, `GET /balance/{customer_id}`: Read-only views.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod hooks;
pub mod routes;
pub mod seed;
pub mod server;
pub mod workers;

#[cfg(test)]
mod endpoint_tests;
