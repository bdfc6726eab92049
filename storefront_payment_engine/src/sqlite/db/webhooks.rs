use sqlx::SqliteConnection;

use crate::db_types::{NewWebhookEvent, WebhookEvent};

pub async fn webhook_event_exists(
    gateway_code: &str,
    external_reference: &str,
    payload_hash: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM webhook_events
        WHERE gateway_code = $1 AND external_reference = $2 AND payload_hash = $3
        "#,
    )
    .bind(gateway_code)
    .bind(external_reference)
    .bind(payload_hash)
    .fetch_one(conn)
    .await?;
    Ok(count > 0)
}

/// Inserts the event, returning `false` if the same `(gateway, reference, payload hash)` was already recorded.
pub async fn insert_webhook_event(event: NewWebhookEvent, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO webhook_events (gateway_code, external_reference, payload_hash, signature_valid, outcome)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (gateway_code, external_reference, payload_hash) DO NOTHING;
        "#,
    )
    .bind(event.gateway_code)
    .bind(event.external_reference)
    .bind(event.payload_hash)
    .bind(event.signature_valid)
    .bind(event.outcome)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn fetch_webhook_events(
    gateway_code: &str,
    external_reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<WebhookEvent>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM webhook_events WHERE gateway_code = $1 AND external_reference = $2 ORDER BY id ASC",
    )
    .bind(gateway_code)
    .bind(external_reference)
    .fetch_all(conn)
    .await
}
