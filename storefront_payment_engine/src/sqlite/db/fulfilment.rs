use sqlx::{types::Json, SqliteConnection};

use crate::db_types::{LineItem, NewProvisioningResult, ProvisioningResult};

pub async fn insert_provisioning_result(
    result: NewProvisioningResult,
    conn: &mut SqliteConnection,
) -> Result<ProvisioningResult, sqlx::Error> {
    let (success, credentials, error) = match result.outcome {
        Ok(credentials) => (true, credentials, None),
        Err(e) => (false, Vec::new(), Some(e)),
    };
    sqlx::query_as(
        r#"
        INSERT INTO provisioning_results (order_id, line_item_id, success, credentials, error)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *;
        "#,
    )
    .bind(result.order_id)
    .bind(result.line_item_id)
    .bind(success)
    .bind(Json(credentials))
    .bind(error)
    .fetch_one(conn)
    .await
}

pub async fn fetch_provisioning_results(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<ProvisioningResult>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM provisioning_results WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id)
        .fetch_all(conn)
        .await
}

pub async fn fetch_unprovisioned_line_items(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<LineItem>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT * FROM line_items
        WHERE order_id = $1
          AND NOT EXISTS (
              SELECT 1 FROM provisioning_results
              WHERE provisioning_results.line_item_id = line_items.id AND provisioning_results.success = 1
          )
        ORDER BY id ASC
        "#,
    )
    .bind(order_id)
    .fetch_all(conn)
    .await
}

pub async fn count_failed_attempts(line_item_id: i64, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM provisioning_results WHERE line_item_id = $1 AND success = 0")
            .bind(line_item_id)
            .fetch_one(conn)
            .await?;
    Ok(count)
}

/// True if the order has at least one line item and every line item has a successful provisioning result.
pub async fn is_fully_provisioned(order_id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let (items, provisioned): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*),
            COUNT(*) FILTER (
                WHERE EXISTS (
                    SELECT 1 FROM provisioning_results
                    WHERE provisioning_results.line_item_id = line_items.id AND provisioning_results.success = 1
                )
            )
        FROM line_items WHERE order_id = $1
        "#,
    )
    .bind(order_id)
    .fetch_one(conn)
    .await?;
    Ok(items > 0 && items == provisioned)
}
