/// Account repository
use super::models::{format_amount, parse_stored_amount, Account};
use crate::error::ApiResult;
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

fn account_from_row(row: &SqliteRow) -> ApiResult<Account> {
    let balance: String = row.try_get("balance")?;
    Ok(Account {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        balance: parse_stored_amount(&balance)?,
    })
}

/// Take the write lock on an account, creating it with a zero balance if absent
///
/// The first statement is a write, so SQLite grants this connection the
/// database write lock before anything is read; it is held until the
/// enclosing transaction ends. Returns `None` when the account does not exist
/// and cannot be created because `user_id` names no user.
pub async fn lock_or_create(
    conn: &mut SqliteConnection,
    account_id: i64,
    user_id: i64,
) -> ApiResult<Option<Account>> {
    sqlx::query(
        "INSERT INTO accounts (id, user_id, balance)
         SELECT ?1, ?2, '0.00' WHERE EXISTS (SELECT 1 FROM users WHERE id = ?2)
         ON CONFLICT(id) DO NOTHING",
    )
    .bind(account_id)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;

    tracing::debug!(account_id, "account lock acquired");

    find(conn, account_id).await
}

pub async fn find(conn: &mut SqliteConnection, account_id: i64) -> ApiResult<Option<Account>> {
    let row = sqlx::query("SELECT id, user_id, balance FROM accounts WHERE id = ?1")
        .bind(account_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(account_from_row).transpose()
}

/// Overwrite the balance; callers must hold the account lock
pub async fn update_balance(
    conn: &mut SqliteConnection,
    account_id: i64,
    balance: Decimal,
) -> ApiResult<()> {
    sqlx::query("UPDATE accounts SET balance = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2")
        .bind(format_amount(balance))
        .bind(account_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn list_for_user(conn: &mut SqliteConnection, user_id: i64) -> ApiResult<Vec<Account>> {
    let rows = sqlx::query("SELECT id, user_id, balance FROM accounts WHERE user_id = ?1 ORDER BY id")
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(account_from_row).collect()
}
