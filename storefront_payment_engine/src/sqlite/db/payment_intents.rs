use chrono::Duration;
use log::*;
use sfp_common::PaymentStatus;
use sqlx::SqliteConnection;

use crate::db_types::{NewPaymentIntent, PaymentAuditEntry, PaymentIntent, TransitionSource};

pub async fn insert_payment_intent(
    intent: NewPaymentIntent,
    conn: &mut SqliteConnection,
) -> Result<PaymentIntent, sqlx::Error> {
    let intent: PaymentIntent = sqlx::query_as(
        r#"
        INSERT INTO payment_intents (
            id,
            gateway_code,
            purpose,
            customer_id,
            amount_requested,
            amount_charged,
            fee_amount,
            bonus_amount,
            currency
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *;
        "#,
    )
    .bind(intent.id)
    .bind(intent.gateway_code)
    .bind(intent.purpose)
    .bind(intent.customer_id)
    .bind(intent.amount_requested)
    .bind(intent.amount_charged)
    .bind(intent.fee_amount)
    .bind(intent.bonus_amount)
    .bind(intent.currency)
    .fetch_one(&mut *conn)
    .await?;
    insert_audit_entry(&intent.id, None, PaymentStatus::Pending, TransitionSource::Checkout, true, None, conn).await?;
    debug!("🗃️ {} intent {} for {} created on {}", intent.purpose, intent.id, intent.amount_charged, intent.gateway_code);
    Ok(intent)
}

pub async fn fetch_payment_intent(id: &str, conn: &mut SqliteConnection) -> Result<Option<PaymentIntent>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payment_intents WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_payment_intent_by_reference(
    gateway_code: &str,
    external_reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentIntent>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payment_intents WHERE gateway_code = $1 AND external_reference = $2")
        .bind(gateway_code)
        .bind(external_reference)
        .fetch_optional(conn)
        .await
}

pub async fn attach_external_reference(
    id: &str,
    external_reference: &str,
    checkout_url: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentIntent>, sqlx::Error> {
    sqlx::query_as(
        r#"
        UPDATE payment_intents SET external_reference = $1, checkout_url = $2, updated_at = CURRENT_TIMESTAMP
        WHERE id = $3
        RETURNING *;
        "#,
    )
    .bind(external_reference)
    .bind(checkout_url)
    .bind(id)
    .fetch_optional(conn)
    .await
}

/// Sets the status to `to` only if it is currently `from`. Returns the updated intent, or `None` if the intent was
/// not in `from`.
pub async fn compare_and_set_status(
    id: &str,
    from: PaymentStatus,
    to: PaymentStatus,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentIntent>, sqlx::Error> {
    sqlx::query_as(
        r#"
        UPDATE payment_intents SET status = $1, updated_at = CURRENT_TIMESTAMP
        WHERE id = $2 AND status = $3
        RETURNING *;
        "#,
    )
    .bind(to)
    .bind(id)
    .bind(from)
    .fetch_optional(conn)
    .await
}

pub async fn insert_audit_entry(
    intent_id: &str,
    from: Option<PaymentStatus>,
    to: PaymentStatus,
    source: TransitionSource,
    applied: bool,
    note: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO payment_audit (payment_intent_id, from_status, to_status, source, applied, note)
        VALUES ($1, $2, $3, $4, $5, $6);
        "#,
    )
    .bind(intent_id)
    .bind(from)
    .bind(to)
    .bind(source)
    .bind(applied)
    .bind(note)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_audit_trail(
    intent_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentAuditEntry>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM payment_audit WHERE payment_intent_id = $1 ORDER BY id ASC")
        .bind(intent_id)
        .fetch_all(conn)
        .await
}

pub async fn fetch_unsettled_intents(
    min_age: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentIntent>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT * FROM payment_intents
        WHERE status IN ('Pending', 'Confirming')
          AND external_reference IS NOT NULL
          AND strftime('%s', 'now') - strftime('%s', updated_at) >= $1
        ORDER BY updated_at ASC
        "#,
    )
    .bind(min_age.num_seconds())
    .fetch_all(conn)
    .await
}

pub async fn fetch_stale_pending_intents(
    older_than: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentIntent>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT * FROM payment_intents
        WHERE status = 'Pending'
          AND strftime('%s', 'now') - strftime('%s', created_at) >= $1
        ORDER BY created_at ASC
        "#,
    )
    .bind(older_than.num_seconds())
    .fetch_all(conn)
    .await
}

/// Counts `Pending` intents at `gateway_code` created less than `within` ago that have no external reference yet.
pub async fn count_unattached_pending_intents(
    gateway_code: &str,
    within: Duration,
    conn: &mut SqliteConnection,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM payment_intents
        WHERE gateway_code = $1
          AND status = 'Pending'
          AND external_reference IS NULL
          AND strftime('%s', 'now') - strftime('%s', created_at) < $2
        "#,
    )
    .bind(gateway_code)
    .bind(within.num_seconds())
    .fetch_one(conn)
    .await
}
