use log::*;
use sqlx::{types::Json, SqliteConnection};

use crate::db_types::{GatewayConfig, NewGatewayConfig, NewProduct, Product};

pub async fn fetch_product(product_ref: &str, conn: &mut SqliteConnection) -> Result<Option<Product>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM products WHERE product_ref = $1").bind(product_ref).fetch_optional(conn).await
}

pub async fn fetch_products(conn: &mut SqliteConnection) -> Result<Vec<Product>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM products ORDER BY product_ref").fetch_all(conn).await
}

pub async fn upsert_product(product: NewProduct, conn: &mut SqliteConnection) -> Result<Product, sqlx::Error> {
    let product: Product = sqlx::query_as(
        r#"
        INSERT INTO products (product_ref, name, unit_price, currency, required_options, is_active)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (product_ref) DO UPDATE SET
            name = excluded.name,
            unit_price = excluded.unit_price,
            currency = excluded.currency,
            required_options = excluded.required_options,
            is_active = excluded.is_active,
            updated_at = CURRENT_TIMESTAMP
        RETURNING *;
        "#,
    )
    .bind(product.product_ref)
    .bind(product.name)
    .bind(product.unit_price)
    .bind(product.currency)
    .bind(Json(product.required_options))
    .bind(product.is_active)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Product {} saved at {} {}", product.product_ref, product.unit_price, product.currency);
    Ok(product)
}

pub async fn fetch_gateway_config(
    gateway_code: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<GatewayConfig>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM gateway_configs WHERE gateway_code = $1")
        .bind(gateway_code)
        .fetch_optional(conn)
        .await
}

pub async fn fetch_gateway_configs(conn: &mut SqliteConnection) -> Result<Vec<GatewayConfig>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM gateway_configs ORDER BY gateway_code").fetch_all(conn).await
}

pub async fn upsert_gateway_config(
    config: NewGatewayConfig,
    conn: &mut SqliteConnection,
) -> Result<GatewayConfig, sqlx::Error> {
    let config: GatewayConfig = sqlx::query_as(
        r#"
        INSERT INTO gateway_configs (
            gateway_code,
            adapter,
            credentials,
            min_amount,
            max_amount,
            fee_rule,
            bonus_rules,
            is_active,
            allow_unsigned_webhooks
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (gateway_code) DO UPDATE SET
            adapter = excluded.adapter,
            credentials = excluded.credentials,
            min_amount = excluded.min_amount,
            max_amount = excluded.max_amount,
            fee_rule = excluded.fee_rule,
            bonus_rules = excluded.bonus_rules,
            is_active = excluded.is_active,
            allow_unsigned_webhooks = excluded.allow_unsigned_webhooks,
            updated_at = CURRENT_TIMESTAMP
        RETURNING *;
        "#,
    )
    .bind(config.gateway_code)
    .bind(config.adapter)
    .bind(Json(config.credentials))
    .bind(config.min_amount)
    .bind(config.max_amount)
    .bind(Json(config.fee_rule))
    .bind(Json(config.bonus_rules))
    .bind(config.is_active)
    .bind(config.allow_unsigned_webhooks)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Gateway {} saved using the {} adapter", config.gateway_code, config.adapter);
    Ok(config)
}
