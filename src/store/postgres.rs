//! `PostgreSQL` queries for the user store (schema in `sql/schema.sql`).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Connection, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::{InsertOutcome, NewUser, UserRecord};

const USER_COLUMNS: &str = "id, username, email, phone_number, password_hash, \
     phone_number_confirmed, two_factor_enabled, created_at";

fn user_from_row(row: &PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        phone_number: row.get("phone_number"),
        password_hash: row.get("password_hash"),
        phone_number_confirmed: row.get("phone_number_confirmed"),
        two_factor_enabled: row.get("two_factor_enabled"),
        created_at: row.get("created_at"),
    }
}

pub(super) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

pub(super) async fn ping(pool: &PgPool) -> Result<()> {
    let acquire_span = tracing::info_span!(
        "db.acquire",
        db.system = "postgresql",
        db.operation = "ACQUIRE"
    );
    let mut conn = pool
        .acquire()
        .instrument(acquire_span)
        .await
        .context("failed to acquire database connection")?;
    let ping_span = tracing::info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
    conn.ping()
        .instrument(ping_span)
        .await
        .context("failed to ping database")
}

pub(super) async fn insert_user(pool: &PgPool, user: &NewUser) -> Result<InsertOutcome> {
    let query = format!(
        "INSERT INTO users (id, username, email, phone_number, password_hash, two_factor_enabled) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = %query
    );
    let row = sqlx::query(&query)
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.phone_number.as_deref())
        .bind(&user.password_hash)
        .bind(user.two_factor_enabled)
        .fetch_one(pool)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(InsertOutcome::Created(user_from_row(&row))),
        Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::Conflict),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

pub(super) async fn find_by_login(pool: &PgPool, login: &str) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR email = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = %query
    );
    let row = sqlx::query(&query)
        .bind(login)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by login")?;

    Ok(row.as_ref().map(user_from_row))
}

pub(super) async fn find_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = %query
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by id")?;

    Ok(row.as_ref().map(user_from_row))
}

pub(super) async fn confirm_phone_number(pool: &PgPool, user_id: Uuid) -> Result<bool> {
    let query = "UPDATE users SET phone_number_confirmed = TRUE WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to confirm phone number")?;

    Ok(result.rows_affected() == 1)
}

pub(super) async fn update_password_hash(
    pool: &PgPool,
    user_id: Uuid,
    password_hash: &str,
) -> Result<bool> {
    let query = "UPDATE users SET password_hash = $2 WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(password_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update password hash")?;

    Ok(result.rows_affected() == 1)
}

pub(super) async fn insert_reset_token(
    pool: &PgPool,
    user_id: Uuid,
    token_hash: &[u8],
    expires_at: DateTime<Utc>,
) -> Result<()> {
    let query = r"
        INSERT INTO password_reset_tokens (token_hash, user_id, expires_at)
        VALUES ($1, $2, $3)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .bind(user_id)
        .bind(expires_at)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert password reset token")?;

    Ok(())
}

pub(super) async fn consume_reset_token(
    pool: &PgPool,
    token_hash: &[u8],
    now: DateTime<Utc>,
) -> Result<Option<Uuid>> {
    // Single statement so two concurrent resets cannot both consume the token.
    let query = r"
        UPDATE password_reset_tokens
        SET used_at = $2
        WHERE token_hash = $1
          AND used_at IS NULL
          AND expires_at > $2
        RETURNING user_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .bind(now)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to consume password reset token")?;

    Ok(row.map(|row| row.get("user_id")))
}

pub(super) async fn prune_reset_tokens(pool: &PgPool, now: DateTime<Utc>) -> Result<u64> {
    let query = r"
        DELETE FROM password_reset_tokens
        WHERE used_at IS NOT NULL
           OR expires_at <= $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(now)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to prune password reset tokens")?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn is_unique_violation_matches_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("99999"),
        }));
        assert!(!is_unique_violation(&err));

        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn user_columns_cover_record_fields() {
        for column in [
            "id",
            "username",
            "email",
            "phone_number",
            "password_hash",
            "phone_number_confirmed",
            "two_factor_enabled",
            "created_at",
        ] {
            assert!(USER_COLUMNS.contains(column), "missing column {column}");
        }
    }
}
