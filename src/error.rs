//! Error types for gatehouse.

use crate::ids::{ThreadId, UserId};

/// Top-level error type for the onboarding core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Record-store errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Chat-platform errors, as surfaced through the [`Gateway`] seam.
///
/// [`Gateway`]: crate::platform::Gateway
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("Platform request failed: {0}")]
    RequestFailed(String),

    #[error("Missing permission for {action}: {reason}")]
    Forbidden { action: String, reason: String },

    #[error("Unknown member: {0}")]
    UnknownMember(UserId),

    #[error("Unknown thread: {0}")]
    UnknownThread(ThreadId),

    #[error("Rename rejected for {user}: {reason}")]
    RenameRejected { user: UserId, reason: String },
}

/// Session lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A session for this applicant is already in flight.
    #[error("Onboarding already in progress for {0}")]
    AlreadyInProgress(UserId),

    /// The language catalog could not be loaded, so a session cannot start.
    #[error("Language catalog unavailable, try again later: {0}")]
    CatalogUnavailable(#[source] DatabaseError),
}

/// Result type alias for the onboarding core.
pub type Result<T> = std::result::Result<T, Error>;
