use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResiduosError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Permission denied ({action}): {reason}")]
    PermissionDenied { action: String, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    Duplicate(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

impl From<calamine::Error> for ResiduosError {
    fn from(e: calamine::Error) -> Self {
        ResiduosError::Spreadsheet(e.to_string())
    }
}

impl ResiduosError {
    /// Map a UNIQUE constraint violation to `Duplicate`, leaving other store errors intact.
    pub fn from_insert(e: rusqlite::Error, what: &str) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                ResiduosError::Duplicate(what.to_string())
            }
            other => ResiduosError::Db(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ResiduosError>;
