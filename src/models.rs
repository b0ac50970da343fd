use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upload {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub image_path: String,
    pub caption: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// An image copied into the owned directory.
///
/// Only [`crate::intake`] creates these, so anything holding one refers to a
/// file the application has custody of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredImage {
    path: PathBuf,
    original_name: String,
}

impl StoredImage {
    pub(crate) fn new(path: PathBuf, original_name: String) -> Self {
        Self {
            path,
            original_name,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name inside the owned directory.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File name the user picked before intake.
    pub fn original_name(&self) -> &str {
        &self.original_name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub caption: String,
    pub description: String,
}
