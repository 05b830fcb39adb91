use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database locked: {operation} gave up after {attempts} attempts")]
    Locked { operation: String, attempts: u32 },

    #[error("Invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    /// A row holds a value the player's schema does not allow
    #[error("Invalid library data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, LibraryError>;
