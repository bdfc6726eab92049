use crate::{
    db_types::{GatewayConfig, NewGatewayConfig, NewProduct, Product},
    traits::StorefrontDbError,
};

/// Products and payment gateway configuration.
///
/// Both are maintained by operators (typically via the seed file) and treated as read-only by the checkout flow.
#[allow(async_fn_in_trait)]
pub trait CatalogManagement {
    async fn fetch_product(&self, product_ref: &str) -> Result<Option<Product>, StorefrontDbError>;

    async fn fetch_products(&self) -> Result<Vec<Product>, StorefrontDbError>;

    /// Inserts the product, or updates the existing product with the same `product_ref`.
    async fn upsert_product(&self, product: NewProduct) -> Result<Product, StorefrontDbError>;

    async fn fetch_gateway_config(&self, gateway_code: &str) -> Result<Option<GatewayConfig>, StorefrontDbError>;

    async fn fetch_gateway_configs(&self) -> Result<Vec<GatewayConfig>, StorefrontDbError>;

    /// Inserts the gateway configuration, or replaces the existing one with the same `gateway_code`.
    async fn upsert_gateway_config(&self, config: NewGatewayConfig) -> Result<GatewayConfig, StorefrontDbError>;
}
