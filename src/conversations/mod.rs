//! Conversation state: canonical data model, the store that owns it, and
//! transcript export.

pub mod error;
pub mod export;
pub mod store;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use export::ExportFormat;
pub use store::ChatStore;
pub use types::{
    Attachment, AttachmentId, ChatId, Conversation, ConversationMeta, FileUpload, Message,
    MessageId, MessageRole, UserId,
};
