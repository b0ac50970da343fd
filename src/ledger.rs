use crate::auth::{parse_timestamp, parse_uuid};
use crate::db::DbConnection;
use crate::error::{Error, Result, ValidationError};
use crate::models::{StoredImage, Upload, User};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::info;
use uuid::Uuid;

const UPLOAD_COLUMNS: &str =
    "id, user_id, username, image_path, caption, description, created_at";

/// Persists one upload record and returns its id.
pub async fn save_upload(
    conn: &DbConnection,
    user: &User,
    image: &StoredImage,
    caption: &str,
    description: &str,
) -> Result<Uuid> {
    let caption = caption.trim();
    let description = description.trim();
    if caption.is_empty() && description.is_empty() {
        return Err(ValidationError::EmptyText.into());
    }

    let id = Uuid::new_v4();
    let now = Utc::now();

    conn.lock().await.execute(
        "INSERT INTO uploads (id, user_id, username, image_path, caption, description, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
            id.to_string(),
            user.id.to_string(),
            user.username,
            image.path().to_string_lossy().into_owned(),
            caption,
            description,
            now.to_rfc3339()
        ],
    )?;

    info!("Saved upload {id} for `{}`", user.username);
    Ok(id)
}

pub async fn get_upload(conn: &DbConnection, id: &Uuid) -> Result<Upload> {
    conn.lock()
        .await
        .query_row(
            &format!("SELECT {UPLOAD_COLUMNS} FROM uploads WHERE id = ?"),
            [id.to_string()],
            upload_from_row,
        )
        .optional()?
        .ok_or(Error::NotFound)
}

pub async fn list_uploads_for_user(conn: &DbConnection, user_id: &Uuid) -> Result<Vec<Upload>> {
    let conn = conn.lock().await;
    let mut stmt = conn.prepare(&format!(
        "SELECT {UPLOAD_COLUMNS} FROM uploads WHERE user_id = ? ORDER BY created_at DESC"
    ))?;

    let uploads = stmt
        .query_map([user_id.to_string()], upload_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(uploads)
}

pub async fn count_uploads(conn: &DbConnection) -> Result<u64> {
    let count: i64 = conn
        .lock()
        .await
        .query_row("SELECT COUNT(*) FROM uploads", [], |row| row.get(0))?;
    Ok(count as u64)
}

fn upload_from_row(row: &Row<'_>) -> rusqlite::Result<Upload> {
    Ok(Upload {
        id: parse_uuid(row, 0)?,
        user_id: parse_uuid(row, 1)?,
        username: row.get(2)?,
        image_path: row.get(3)?,
        caption: row.get(4)?,
        description: row.get(5)?,
        created_at: parse_timestamp(row, 6)?,
    })
}
