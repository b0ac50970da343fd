use thiserror::Error;

/// Rejected input. Nothing is written when one of these is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please enter username and password.")]
    MissingCredentials,
    #[error("Please fill all fields.")]
    MissingFields,
    #[error("Passwords do not match.")]
    PasswordMismatch,
    #[error("Please select an image first.")]
    NoImageSelected,
    #[error("Caption/Description are empty. Generate first or enter text.")]
    EmptyText,
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Invalid username or password.")]
    InvalidCredentials,
    #[error("Username already exists.")]
    UsernameTaken,
    #[error("Not logged in.")]
    Unauthorized,
    #[error("Not found.")]
    NotFound,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("Caption cache error: {0}")]
    Cache(#[from] serde_json::Error),
    #[error("Image could not be decoded: {0}")]
    Image(#[from] image::ImageError),
    #[error("Request to {service} failed: {source}")]
    Request {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service} responded with status {status}: {body}")]
    BadResponse {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("{0} returned no text")]
    EmptyResponse(&'static str),
}

impl Error {
    /// True for failures caused by the caller's input rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::InvalidCredentials
                | Error::UsernameTaken
                | Error::Unauthorized
                | Error::NotFound
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
