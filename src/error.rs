//! Error types for the screening chat service.

use uuid::Uuid;

use crate::chat::stage::ChatStage;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("News error: {0}")]
    News(#[from] NewsError),

    #[error("Comment error: {0}")]
    Comment(#[from] CommentError),

    #[error("Articles error: {0}")]
    Articles(#[from] ArticlesError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Input rejected before any external write.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: &'static str },

    #[error("Please enter a valid email address")]
    InvalidEmail,

    #[error("Please end your question with a question mark")]
    NotAQuestion,

    #[error("Unsupported file type: {mime}. Only PDF, DOC and DOCX files are accepted")]
    UnsupportedFileType { mime: String },

    #[error("File uploads are not enabled for this conversation")]
    UploadNotAllowed,

    #[error("Unknown topic: {0}")]
    UnknownTopic(String),
}

/// Errors surfaced by the dialog controller and session registry.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Action {action} is not available in stage {stage}")]
    InvalidAction {
        stage: ChatStage,
        action: &'static str,
    },

    #[error("Cannot transition from {from} to {to}")]
    InvalidTransition { from: ChatStage, to: ChatStage },

    #[error("This conversation is closed")]
    Closed,

    #[error("Session {0} not found")]
    SessionNotFound(Uuid),
}

/// Object storage errors (uploaded attachments).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file name: {0}")]
    InvalidName(String),
}

/// Scheduled news refresh errors.
#[derive(Debug, thiserror::Error)]
pub enum NewsError {
    #[error("News request failed: {0}")]
    Request(String),

    #[error("Invalid response format: could not find JSON block")]
    MissingJsonBlock,

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Failed to parse news items: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Comment board errors.
#[derive(Debug, thiserror::Error)]
pub enum CommentError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Comment {0} not found")]
    NotFound(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Article feed errors.
#[derive(Debug, thiserror::Error)]
pub enum ArticlesError {
    #[error("Article feed request failed: {0}")]
    Request(String),

    #[error("Invalid article feed: {0}")]
    InvalidResponse(String),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
