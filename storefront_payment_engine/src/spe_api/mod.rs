//! # Storefront payment engine public API
//!
//! The `spe_api` module exposes the programmatic API of the payment engine. The API is modular, so that clients can
//! pick the parts they need.
//!
//! * [`checkout_api`] validates carts, settles them from the customer's balance or through a payment gateway, starts
//!   deposits and lets buyers cancel pending payments.
//! * [`reconciler_api`] applies status changes reported by payment processors (webhooks and status polls) and expires
//!   abandoned payments.
//! * [`fulfillment_api`] provisions paid-for orders through the credential issuer and confirms them.
//! * [`accounts_api`] provides read access to balances, orders and payments.
//!
//! The other submodules hold the request, result and error types of these APIs.
//!
//! # API usage
//!
//! Every API is created from a database backend that implements the backend traits it requires. The checkout,
//! reconciler and fulfilment APIs share a [`GatewayRegistry`](crate::gateways::GatewayRegistry) and an
//! [`EventProducers`](crate::events::EventProducers) instance.
//!
//! ```rust,ignore
//! use storefront_payment_engine::{AccountsApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let api = AccountsApi::new(db);
//! let balance = api.balance("alice").await?;
//! ```
pub mod account_objects;
pub mod accounts_api;
pub mod checkout_api;
pub mod checkout_objects;
pub mod errors;
pub mod fulfillment_api;
pub mod reconciler_api;
