//! The gateway registry: stored gateway configurations paired with their adapter and initialized context.
//!
//! The registry is built once at startup. Changing a gateway's configuration requires a restart.
use std::{collections::HashMap, fmt::Debug, sync::Arc};

use log::*;
use sfp_integrations::{adapters::processor_for_adapter, GatewayContext, GatewayError, PaymentProcessor};

use crate::{
    db_types::GatewayConfig,
    traits::{CatalogManagement, StorefrontDbError},
};

#[derive(Clone)]
pub struct RegisteredGateway {
    pub config: GatewayConfig,
    pub processor: Arc<dyn PaymentProcessor>,
    pub context: GatewayContext,
}

impl Debug for RegisteredGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, active: {})", self.config.gateway_code, self.processor.name(), self.config.is_active)
    }
}

impl RegisteredGateway {
    pub fn code(&self) -> &str {
        self.config.gateway_code.as_str()
    }
}

#[derive(Clone, Debug, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<String, RegisteredGateway>,
}

impl GatewayRegistry {
    /// Loads every stored gateway configuration and initializes its adapter.
    ///
    /// Inactive gateways are registered too, so that webhooks and status polls for payments that are already in
    /// flight can still be reconciled. Gateways with an unknown adapter or invalid credentials are skipped with an
    /// error in the log.
    pub async fn load<B: CatalogManagement>(db: &B) -> Result<Self, StorefrontDbError> {
        let configs = db.fetch_gateway_configs().await?;
        let mut registry = Self::default();
        for config in configs {
            let code = config.gateway_code.clone();
            let Some(processor) = processor_for_adapter(&config.adapter) else {
                error!("🛒️ Gateway {code} uses unknown adapter '{}'. It will not be available.", config.adapter);
                continue;
            };
            if let Err(e) = registry.register(config, processor) {
                error!("🛒️ Gateway {code} could not be initialized: {e}. It will not be available.");
            }
        }
        info!("🛒️ {} payment gateway(s) registered: {:?}", registry.gateways.len(), registry.codes());
        Ok(registry)
    }

    /// Initializes `processor` with the stored configuration and adds it to the registry.
    pub fn register(
        &mut self,
        config: GatewayConfig,
        processor: Arc<dyn PaymentProcessor>,
    ) -> Result<&RegisteredGateway, GatewayError> {
        let context = processor.initialize(&config.processor_settings())?;
        let code = config.gateway_code.clone();
        debug!("🛒️ Registered gateway {code} with the {} adapter", processor.name());
        self.gateways.insert(code.clone(), RegisteredGateway { config, processor, context });
        self.gateways.get(&code).ok_or_else(|| GatewayError::Configuration(format!("{code} was not registered")))
    }

    pub fn get(&self, gateway_code: &str) -> Option<&RegisteredGateway> {
        self.gateways.get(gateway_code)
    }

    pub fn codes(&self) -> Vec<&str> {
        let mut codes = self.gateways.keys().map(String::as_str).collect::<Vec<_>>();
        codes.sort_unstable();
        codes
    }

    pub fn is_empty(&self) -> bool {
        self.gateways.is_empty()
    }
}
