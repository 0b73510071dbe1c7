//! Error types for the conversation store.

use thiserror::Error;

use crate::backend::BackendError;

use super::types::ChatId;

/// Errors surfaced by conversation store operations.
///
/// Local precondition violations (posting into a non-active conversation,
/// empty message text, a second post while one is in flight) are handled as
/// logged no-ops inside the store and never reach this type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend call behind the operation failed.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// No identity has been loaded; the store is inert.
    #[error("No authenticated user loaded")]
    NoIdentity,

    /// The conversation id is not present in the store.
    #[error("Unknown conversation: {0}")]
    UnknownConversation(ChatId),

    /// Another operation already holds the conversation's in-flight flag.
    #[error("Conversation {0} has an operation in flight")]
    Busy(ChatId),

    /// A file upload failed; later files in the same batch were skipped.
    #[error("Upload of {file} failed: {source}")]
    Upload {
        /// Name of the file whose upload failed.
        file: String,
        /// The backend failure.
        source: BackendError,
    },
}

/// Result type for conversation store operations.
pub type StoreResult<T> = Result<T, StoreError>;
