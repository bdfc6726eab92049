use log::*;
use sfp_common::OrderStatusType;
use sqlx::{types::Json, SqliteConnection};

use crate::db_types::{LineItem, NewOrder, Order, OrderNumber, SettlementMethod};

/// Inserts the order and its line items. This is not atomic. Embed the call in a transaction if you need atomicity.
pub async fn insert_order(
    order: NewOrder,
    settlement: SettlementMethod,
    payment_intent_id: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Order, sqlx::Error> {
    let total = order.total_amount();
    let inserted: Order = sqlx::query_as(
        r#"
        INSERT INTO orders (
            order_number,
            customer_id,
            buyer_email,
            settlement,
            payment_intent_id,
            total_amount,
            currency
        ) VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *;
        "#,
    )
    .bind(order.order_number)
    .bind(order.customer_id)
    .bind(order.buyer_email)
    .bind(settlement)
    .bind(payment_intent_id)
    .bind(total)
    .bind(order.currency)
    .fetch_one(&mut *conn)
    .await?;
    for item in order.line_items {
        sqlx::query(
            r#"
            INSERT INTO line_items (order_id, product_ref, quantity, configuration, price)
            VALUES ($1, $2, $3, $4, $5);
            "#,
        )
        .bind(inserted.id)
        .bind(item.product_ref)
        .bind(item.quantity)
        .bind(Json(item.configuration))
        .bind(item.price)
        .execute(&mut *conn)
        .await?;
    }
    debug!("🗃️ Order {} for {} saved with id {}", inserted.order_number, inserted.total_amount, inserted.id);
    Ok(inserted)
}

pub async fn fetch_order_by_number(
    order_number: &OrderNumber,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE order_number = $1")
        .bind(order_number.as_str())
        .fetch_optional(conn)
        .await
}

pub async fn fetch_orders_for_customer(
    customer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE customer_id = $1 ORDER BY id ASC")
        .bind(customer_id)
        .fetch_all(conn)
        .await
}

pub async fn fetch_orders_for_payment_intent(
    intent_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE payment_intent_id = $1 ORDER BY id ASC")
        .bind(intent_id)
        .fetch_all(conn)
        .await
}

pub async fn fetch_line_items(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<LineItem>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM line_items WHERE order_id = $1 ORDER BY id ASC").bind(order_id).fetch_all(conn).await
}

/// Moves every order attached to the intent that is still `New` or `Processing` to `status`.
pub async fn update_status_for_payment_intent(
    intent_id: &str,
    status: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP
        WHERE payment_intent_id = $2 AND status IN ('New', 'Processing') AND status <> $1
        "#,
    )
    .bind(status)
    .bind(intent_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Sets the order status to `to` only if it is currently `from`.
pub async fn compare_and_set_status(
    order_id: i64,
    from: OrderStatusType,
    to: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as(
        r#"
        UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP
        WHERE id = $2 AND status = $3
        RETURNING *;
        "#,
    )
    .bind(to)
    .bind(order_id)
    .bind(from)
    .fetch_optional(conn)
    .await
}

/// Orders that have been paid for and still have at least one line item without a successful provisioning result.
pub async fn fetch_orders_awaiting_provisioning(conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT orders.* FROM orders
        LEFT JOIN payment_intents ON payment_intents.id = orders.payment_intent_id
        WHERE (
            (orders.settlement = 'Balance' AND orders.status IN ('New', 'Processing'))
            OR (orders.settlement = 'Gateway' AND orders.status = 'Processing' AND payment_intents.status = 'Completed')
        )
        AND EXISTS (
            SELECT 1 FROM line_items
            WHERE line_items.order_id = orders.id
              AND NOT EXISTS (
                  SELECT 1 FROM provisioning_results
                  WHERE provisioning_results.line_item_id = line_items.id AND provisioning_results.success = 1
              )
        )
        ORDER BY orders.id ASC
        "#,
    )
    .fetch_all(conn)
    .await
}
