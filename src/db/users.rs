/// User repository
use super::models::{parse_stored_amount, Account, NewUser, Role, User};
use crate::error::ApiResult;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

fn user_from_row(row: &SqliteRow) -> ApiResult<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: Role::parse(&role)?,
    })
}

/// Insert a user
pub async fn create(conn: &mut SqliteConnection, user: NewUser) -> ApiResult<User> {
    let result = sqlx::query(
        "INSERT INTO users (full_name, email, password_hash, role) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(&user.full_name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(User {
        id: result.last_insert_rowid(),
        full_name: user.full_name,
        email: user.email,
        password_hash: user.password_hash,
        role: user.role,
    })
}

pub async fn find_by_id(conn: &mut SqliteConnection, id: i64) -> ApiResult<Option<User>> {
    let row = sqlx::query(
        "SELECT id, full_name, email, password_hash, role FROM users WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(user_from_row).transpose()
}

pub async fn find_by_email(conn: &mut SqliteConnection, email: &str) -> ApiResult<Option<User>> {
    let row = sqlx::query(
        "SELECT id, full_name, email, password_hash, role FROM users WHERE email = ?1",
    )
    .bind(email)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(user_from_row).transpose()
}

/// All users with their accounts, ordered by user id
pub async fn list_with_accounts(conn: &mut SqliteConnection) -> ApiResult<Vec<(User, Vec<Account>)>> {
    let user_rows = sqlx::query(
        "SELECT id, full_name, email, password_hash, role FROM users ORDER BY id",
    )
    .fetch_all(&mut *conn)
    .await?;

    let account_rows = sqlx::query("SELECT id, user_id, balance FROM accounts ORDER BY user_id, id")
        .fetch_all(&mut *conn)
        .await?;

    let mut accounts = Vec::with_capacity(account_rows.len());
    for row in &account_rows {
        let balance: String = row.try_get("balance")?;
        accounts.push(Account {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            balance: parse_stored_amount(&balance)?,
        });
    }

    let mut result = Vec::with_capacity(user_rows.len());
    for row in &user_rows {
        let user = user_from_row(row)?;
        let owned = accounts
            .iter()
            .filter(|a| a.user_id == user.id)
            .cloned()
            .collect();
        result.push((user, owned));
    }

    Ok(result)
}
