use crate::db::DbConnection;
use crate::error::{Error, Result, ValidationError};
use crate::models::User;
use bcrypt::{hash, verify};
use chrono::{DateTime, Utc};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

const ADMIN_USERNAME: &str = "admin";
const ADMIN_EMAIL: &str = "admin@local";
const USER_COLUMNS: &str = "id, username, email, password_hash, is_admin, created_at";

#[derive(Debug, Clone, Deserialize)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm: String,
}

pub fn hash_password(password: &str, cost: u32) -> Result<String> {
    Ok(hash(password, cost)?)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    verify(password, hash).unwrap_or(false)
}

pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

pub async fn signup(conn: &DbConnection, form: &SignupForm, cost: u32) -> Result<User> {
    let username = form.username.trim();
    let email = form.email.trim();
    let password = form.password.trim();
    let confirm = form.confirm.trim();

    if username.is_empty() || email.is_empty() || password.is_empty() || confirm.is_empty() {
        return Err(ValidationError::MissingFields.into());
    }
    if password != confirm {
        return Err(ValidationError::PasswordMismatch.into());
    }

    let conn = conn.lock().await;
    if find_user_by_username(&conn, username)?.is_some() {
        return Err(Error::UsernameTaken);
    }

    let user = User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email: email.to_string(),
        password_hash: hash_password(password, cost)?,
        is_admin: false,
        created_at: Utc::now(),
    };
    insert_user(&conn, &user)?;

    info!("Created account `{}`", user.username);
    Ok(user)
}

/// Unknown users and wrong passwords fail the same way.
pub async fn login(conn: &DbConnection, username: &str, password: &str) -> Result<User> {
    let username = username.trim();
    let password = password.trim();
    if username.is_empty() || password.is_empty() {
        return Err(ValidationError::MissingCredentials.into());
    }

    let user = find_user_by_username(&*conn.lock().await, username)?;
    match user {
        Some(user) if verify_password(password, &user.password_hash) => Ok(user),
        _ => {
            warn!("Rejected login for `{username}`");
            Err(Error::InvalidCredentials)
        }
    }
}

/// Seeds the default admin account on first run. Returns whether it was created.
pub async fn create_admin_if_not_exists(
    conn: &DbConnection,
    password: &str,
    cost: u32,
) -> Result<bool> {
    let conn = conn.lock().await;
    if find_user_by_username(&conn, ADMIN_USERNAME)?.is_some() {
        return Ok(false);
    }

    let admin = User {
        id: Uuid::new_v4(),
        username: ADMIN_USERNAME.to_string(),
        email: ADMIN_EMAIL.to_string(),
        password_hash: hash_password(password, cost)?,
        is_admin: true,
        created_at: Utc::now(),
    };
    insert_user(&conn, &admin)?;

    info!("Admin user created: {ADMIN_USERNAME}");
    Ok(true)
}

pub async fn get_user(conn: &DbConnection, user_id: &Uuid) -> Result<User> {
    conn.lock()
        .await
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"),
            [user_id.to_string()],
            user_from_row,
        )
        .optional()?
        .ok_or(Error::NotFound)
}

pub async fn create_auth_token(conn: &DbConnection, user_id: &Uuid) -> Result<String> {
    let token = generate_token();
    let now = Utc::now();

    conn.lock().await.execute(
        "INSERT INTO auth_tokens (token, user_id, created_at) VALUES (?, ?, ?)",
        params![token, user_id.to_string(), now.to_rfc3339()],
    )?;

    Ok(token)
}

pub async fn verify_auth_token(conn: &DbConnection, token: &str) -> Result<Uuid> {
    let user_id: Option<String> = conn
        .lock()
        .await
        .query_row(
            "SELECT user_id FROM auth_tokens WHERE token = ?",
            [token],
            |row| row.get(0),
        )
        .optional()?;

    let user_id = user_id.ok_or(Error::Unauthorized)?;
    Uuid::parse_str(&user_id).map_err(|_| Error::Unauthorized)
}

pub async fn delete_auth_token(conn: &DbConnection, token: &str) -> Result<()> {
    conn.lock()
        .await
        .execute("DELETE FROM auth_tokens WHERE token = ?", [token])?;
    Ok(())
}

fn find_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>> {
    Ok(conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?"),
            [username],
            user_from_row,
        )
        .optional()?)
}

fn insert_user(conn: &Connection, user: &User) -> Result<()> {
    let result = conn.execute(
        "INSERT INTO users (id, username, email, password_hash, is_admin, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        params![
            user.id.to_string(),
            user.username,
            user.email,
            user.password_hash,
            user.is_admin,
            user.created_at.to_rfc3339()
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(Error::UsernameTaken)
        }
        Err(e) => Err(e.into()),
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: parse_uuid(row, 0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        is_admin: row.get(4)?,
        created_at: parse_timestamp(row, 5)?,
    })
}

pub(crate) fn parse_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}
