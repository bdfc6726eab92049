//! Storefront Payment Engine
//!
//! The storefront payment engine takes a buyer's cart from checkout to fulfilment. It is processor-agnostic: every
//! payment processor is reached through the [`PaymentProcessor`](sfp_integrations::PaymentProcessor) contract.
//!
//! The library is divided into these main sections:
//! 1. Database management ([`traits`] and the SQLite backend). You should never need to access the database directly.
//!    Use the public API instead. The exception is the data types stored in the database, which are defined in
//!    [`mod@db_types`] and are public.
//! 2. The payment engine public API. [`CheckoutApi`] settles carts and deposits, [`ReconcilerApi`] applies payment
//!    status changes reported by processors, [`FulfillmentApi`] provisions paid-for orders, and [`AccountsApi`]
//!    answers queries about balances, orders and payments.
//! 3. Pricing ([`pricing`]) and the startup-built [`GatewayRegistry`].
//!
//! The engine also emits events when orders are confirmed, provisioning fails, or a payment changes status. A
//! simple actor framework in [`events`] lets you hook into these events and perform custom actions.
#[cfg(feature = "sqlite")]
mod sqlite;

pub mod db_types;
pub mod events;
pub mod gateways;
pub mod helpers;
pub mod pricing;
mod spe_api;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use gateways::{GatewayRegistry, RegisteredGateway};
#[cfg(feature = "sqlite")]
pub use sqlite::{db::db_url, SqliteDatabase};
pub use spe_api::{
    account_objects,
    accounts_api::AccountsApi,
    checkout_api::{CheckoutApi, MAX_ITEM_QUANTITY},
    checkout_objects,
    errors::{CheckoutError, FulfillmentError, ReconcileError, WebhookError},
    fulfillment_api::{FulfillmentApi, DEFAULT_MAX_PROVISIONING_ATTEMPTS},
    reconciler_api::{PollSummary, ReconcilerApi},
};
pub use traits::{AccountApiError, AccountManagement, CatalogManagement, StorefrontDatabase, StorefrontDbError};
