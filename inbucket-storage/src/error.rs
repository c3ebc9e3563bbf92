use thiserror::Error;

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur in a message store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested message does not exist.
    #[error("Message {id} does not exist in mailbox {mailbox}")]
    NotFound { mailbox: String, id: String },

    /// The backing implementation failed.
    #[error("Storage failure: {0}")]
    Internal(String),
}
