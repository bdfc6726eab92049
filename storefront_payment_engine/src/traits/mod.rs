//! # Backend contracts
//!
//! The traits in this module define what a database backend must provide to drive the storefront payment engine.
//!
//! * [`StorefrontDatabase`] is the highest level of behaviour: creating orders and payment intents, applying payment
//!   status transitions, moving money in and out of customer balances and recording fulfilment.
//! * [`AccountManagement`] provides read-only queries over accounts, orders, payment intents and their audit trails.
//! * [`CatalogManagement`] manages the product catalog and the payment gateway configurations.
//!
//! Every method that changes more than one record does so in a single atomic transaction.
mod account_management;
mod catalog_management;
mod data_objects;
mod storefront_database;

pub use account_management::{AccountApiError, AccountManagement};
pub use catalog_management::CatalogManagement;
pub use data_objects::{TransitionOutcome, TransitionRequest};
pub use storefront_database::{StorefrontDatabase, StorefrontDbError};
