//! Remote chat backend contract.
//!
//! The store talks to the backend exclusively through [`ChatBackend`], so
//! tests can substitute a scripted implementation. The production
//! implementation is [`http::HttpChatBackend`].

pub mod config;
pub mod error;
pub mod http;

use async_trait::async_trait;

use crate::conversations::types::{
    Attachment, AttachmentId, ChatId, ConversationMeta, FileUpload, Message, UserId,
};

pub use config::BackendConfig;
pub use error::{BackendError, BackendResult};
pub use http::HttpChatBackend;

/// Partial update of a conversation's mutable fields.
///
/// Only the populated fields are transmitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatUpdate {
    /// New display title, when set.
    pub title: Option<String>,
    /// New system instruction, when set.
    pub system_instruction: Option<String>,
}

impl ChatUpdate {
    /// Update carrying only a new title.
    #[must_use]
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// Update carrying only a new system instruction.
    #[must_use]
    pub fn system_instruction(text: impl Into<String>) -> Self {
        Self {
            system_instruction: Some(text.into()),
            ..Self::default()
        }
    }
}

/// The remote chat backend: the store's only data source of truth.
///
/// All calls are stateless request/response; identity travels as an
/// explicit parameter, never as ambient session state.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// List the conversations owned by `user`, most recent first.
    async fn list_chats(&self, user: &UserId) -> BackendResult<Vec<ConversationMeta>>;

    /// Create a conversation for `user` and return the authoritative record.
    async fn create_chat(&self, user: &UserId, title: &str) -> BackendResult<ConversationMeta>;

    /// Apply a partial update to a conversation.
    async fn update_chat(&self, chat: &ChatId, update: &ChatUpdate) -> BackendResult<()>;

    /// Delete a conversation and everything attached to it.
    async fn delete_chat(&self, chat: &ChatId) -> BackendResult<()>;

    /// List a conversation's messages in chronological order.
    async fn list_messages(&self, chat: &ChatId) -> BackendResult<Vec<Message>>;

    /// Submit a user turn and have the backend generate the assistant turn.
    ///
    /// The backend persists both turns; callers observe the result through
    /// a subsequent [`Self::list_messages`].
    async fn request_completion(&self, chat: &ChatId, message: &str) -> BackendResult<()>;

    /// List a conversation's attachments.
    async fn list_documents(&self, chat: &ChatId) -> BackendResult<Vec<Attachment>>;

    /// Upload one document into a conversation.
    async fn upload_document(&self, chat: &ChatId, file: &FileUpload) -> BackendResult<()>;

    /// Delete a single attachment.
    async fn delete_document(&self, attachment: &AttachmentId) -> BackendResult<()>;
}
