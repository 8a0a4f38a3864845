/// Transaction ledger repository
use super::models::{format_amount, parse_stored_amount, Transaction};
use crate::error::{ApiError, ApiResult};
use sqlx::{Row, SqliteConnection};

pub async fn exists(conn: &mut SqliteConnection, id: &str) -> ApiResult<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM transactions WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

/// Insert a ledger entry; a primary key collision is reported as a duplicate
pub async fn insert(conn: &mut SqliteConnection, transaction: &Transaction) -> ApiResult<()> {
    sqlx::query(
        "INSERT INTO transactions (id, user_id, account_id, amount, signature)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(&transaction.id)
    .bind(transaction.user_id)
    .bind(transaction.account_id)
    .bind(format_amount(transaction.amount))
    .bind(&transaction.signature)
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        if super::is_unique_violation(&e) {
            ApiError::DuplicateTransaction(transaction.id.clone())
        } else {
            ApiError::Database(e)
        }
    })?;

    Ok(())
}

/// Transactions for a user in insertion order
pub async fn list_for_user(conn: &mut SqliteConnection, user_id: i64) -> ApiResult<Vec<Transaction>> {
    let rows = sqlx::query(
        "SELECT id, user_id, account_id, amount, signature FROM transactions
         WHERE user_id = ?1 ORDER BY rowid",
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| -> ApiResult<Transaction> {
            let amount: String = row.try_get("amount")?;
            Ok(Transaction {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                account_id: row.try_get("account_id")?,
                amount: parse_stored_amount(&amount)?,
                signature: row.try_get("signature")?,
            })
        })
        .collect()
}
