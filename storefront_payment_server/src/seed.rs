//! Loads the product catalogue and gateway configurations from a JSON file at start-up.
//!
//! ```json
//! {
//!   "products": [{ "product_ref": "vpn-monthly", "name": "VPN (1 month)", "unit_price": 999, "required_options": ["region"] }],
//!   "gateways": [{ "gateway_code": "cards", "adapter": "card", "credentials": { "api_key": "..", "webhook_secret": ".." },
//!                  "min_amount": 100, "fee_rule": { "type": "percentage", "bps": 300 } }]
//! }
//! ```
//!
//! Entries are upserted by `product_ref` and `gateway_code`, so the same file can be loaded on every start.
use std::{fs, path::Path};

use log::*;
use serde::Deserialize;
use storefront_payment_engine::{
    db_types::{NewGatewayConfig, NewProduct},
    CatalogManagement,
};

use crate::errors::ServerError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub products: Vec<NewProduct>,
    #[serde(default)]
    pub gateways: Vec<NewGatewayConfig>,
}

pub fn load_seed_file<P: AsRef<Path>>(path: P) -> Result<SeedData, ServerError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| {
        ServerError::ConfigurationError(format!("{} is not a valid seed file. {e}", path.display()))
    })
}

/// Upserts every product and gateway in `seed`. Returns the number of products and gateways written.
pub async fn apply_seed<B: CatalogManagement>(db: &B, seed: SeedData) -> Result<(usize, usize), ServerError> {
    let (mut products, mut gateways) = (0, 0);
    for product in seed.products {
        let product = db.upsert_product(product).await?;
        debug!("🪛️ Product {} ({}) loaded", product.product_ref, product.unit_price);
        products += 1;
    }
    for gateway in seed.gateways {
        let gateway = db.upsert_gateway_config(gateway).await?;
        debug!("🪛️ Gateway {} ({}) loaded", gateway.gateway_code, gateway.adapter);
        gateways += 1;
    }
    info!("🪛️ Seed data loaded: {products} product(s), {gateways} gateway(s)");
    Ok((products, gateways))
}
