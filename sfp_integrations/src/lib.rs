//! # Storefront integrations
//!
//! Everything that talks to a third party lives here.
//!
//! * [`PaymentProcessor`] is the single contract that every payment processor adapter implements. The storefront
//!   never branches on which processor it is talking to; it looks the adapter up in a registry and calls through the
//!   trait.
//! * [`adapters`] contains the concrete processors: a hosted card checkout ([`adapters::CardProcessor`]), a crypto
//!   invoice service ([`adapters::CryptoProcessor`]) and an exchange-wallet pay service
//!   ([`adapters::ExchangeProcessor`]).
//! * [`CredentialIssuer`] is the downstream service that provisions the digital product once an order is paid for.
//!
//! Adapters are stateless. [`PaymentProcessor::initialize`] turns the stored gateway settings into an immutable
//! [`GatewayContext`], which is then passed explicitly into every subsequent call.
pub mod adapters;
mod error;
mod http;
mod processor;
mod provisioning;
pub mod signature;

pub use error::{GatewayError, ProvisioningError};
pub use processor::{
    ChargeRequest,
    ChargeResponse,
    GatewayContext,
    GatewayCredentials,
    Notification,
    PaymentProcessor,
    ProcessorSettings,
    StatusMapping,
};
pub use provisioning::{ConfigOption, Credential, CredentialIssuer, HttpCredentialIssuer, ProvisioningRequest};
