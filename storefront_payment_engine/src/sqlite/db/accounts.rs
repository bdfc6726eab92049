use log::*;
use sfp_common::Money;
use sqlx::SqliteConnection;

use crate::{
    db_types::{BalanceEntry, UserAccount},
    traits::StorefrontDbError,
};

pub async fn fetch_account_by_customer_id(
    customer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<UserAccount>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM user_accounts WHERE customer_id = $1")
        .bind(customer_id)
        .fetch_optional(conn)
        .await
}

/// Returns the account for `customer_id`, creating an empty one if it does not exist yet. A supplied email is stored
/// if the account does not have one.
pub async fn fetch_or_create_account(
    customer_id: &str,
    email: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<UserAccount, sqlx::Error> {
    let account = sqlx::query_as(
        r#"
        INSERT INTO user_accounts (customer_id, email) VALUES ($1, $2)
        ON CONFLICT (customer_id) DO UPDATE SET email = COALESCE(user_accounts.email, excluded.email)
        RETURNING *;
        "#,
    )
    .bind(customer_id)
    .bind(email)
    .fetch_one(conn)
    .await?;
    Ok(account)
}

pub async fn fetch_journal_entry(
    reason: &str,
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<BalanceEntry>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM balance_journal WHERE reason = $1 AND reference = $2")
        .bind(reason)
        .bind(reference)
        .fetch_optional(conn)
        .await
}

/// Adds `delta` (which may be negative) to the account balance and writes a journal entry.
///
/// The update is conditional on the balance staying non-negative, so concurrent debits can never overdraw the account.
/// If a journal entry for `(reason, reference)` already exists, nothing changes and `false` is returned alongside the
/// account. This is not atomic on its own; run it inside a transaction.
pub async fn adjust_balance(
    account_id: i64,
    delta: Money,
    reason: &str,
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<(UserAccount, bool), StorefrontDbError> {
    if fetch_journal_entry(reason, reference, conn).await?.is_some() {
        debug!("🗃️ Balance adjustment {reason}/{reference} has already been applied");
        let account = fetch_account_by_id(account_id, conn)
            .await?
            .ok_or_else(|| StorefrontDbError::DatabaseError(format!("Account {account_id} disappeared")))?;
        return Ok((account, false));
    }
    let updated: Option<UserAccount> = sqlx::query_as(
        r#"
        UPDATE user_accounts SET balance = balance + $1, updated_at = CURRENT_TIMESTAMP
        WHERE id = $2 AND balance + $1 >= 0
        RETURNING *;
        "#,
    )
    .bind(delta)
    .bind(account_id)
    .fetch_optional(&mut *conn)
    .await?;
    let account = match updated {
        Some(account) => account,
        None => {
            let available = fetch_account_by_id(account_id, conn).await?.map(|a| a.balance).unwrap_or_default();
            return Err(StorefrontDbError::InsufficientBalance { required: -delta, available });
        },
    };
    sqlx::query(
        r#"
        INSERT INTO balance_journal (account_id, amount, balance_after, reason, reference)
        VALUES ($1, $2, $3, $4, $5);
        "#,
    )
    .bind(account_id)
    .bind(delta)
    .bind(account.balance)
    .bind(reason)
    .bind(reference)
    .execute(conn)
    .await?;
    trace!("🗃️ Account #{account_id} adjusted by {delta} ({reason}/{reference}). Balance is now {}", account.balance);
    Ok((account, true))
}

pub async fn fetch_account_by_id(account_id: i64, conn: &mut SqliteConnection) -> Result<Option<UserAccount>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM user_accounts WHERE id = $1").bind(account_id).fetch_optional(conn).await
}

pub async fn fetch_balance_history(
    customer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<BalanceEntry>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT balance_journal.* FROM balance_journal
        JOIN user_accounts ON user_accounts.id = balance_journal.account_id
        WHERE user_accounts.customer_id = $1
        ORDER BY balance_journal.id ASC
        "#,
    )
    .bind(customer_id)
    .fetch_all(conn)
    .await
}
