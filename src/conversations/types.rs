//! Canonical data model for conversations, messages, and attachments.
//!
//! This module is intentionally **type-heavy** and **logic-light**. All
//! durable identifiers are server-assigned and treated as opaque strings;
//! the only ids minted on the client are the temporary ones used for
//! optimistic message inserts, and those never survive a reconciliation.

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Declare an opaque string-id newtype with a consistent API.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[repr(transparent)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier.
            #[inline]
            #[must_use]
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Borrow as `&str`.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume into `String`.
            #[inline]
            #[must_use]
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl From<String> for $name {
            #[inline]
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            #[inline]
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl AsRef<str> for $name {
            #[inline]
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl From<$name> for String {
            #[inline]
            fn from(value: $name) -> Self {
                value.into_string()
            }
        }
    };
}

define_string_id!(
    /// Identifier of a conversation, stable across the session.
    ChatId
);

define_string_id!(
    /// Identifier of a persisted message.
    ///
    /// Server-assigned once persisted; the client mints `temp-`/`error-`
    /// prefixed ids for messages that only exist locally.
    MessageId
);

define_string_id!(
    /// Identifier of an attachment (a durable server-side document).
    AttachmentId
);

define_string_id!(
    /// Identifier of the authenticated user owning the conversations.
    UserId
);

/// Prefix of temporary ids assigned on optimistic insert.
const TEMP_ID_PREFIX: &str = "temp-";

/// Prefix of ids assigned to locally synthesized failure notices.
const FAILURE_ID_PREFIX: &str = "error-";

impl MessageId {
    /// Mint a temporary id for an optimistically inserted message.
    #[must_use]
    pub fn temporary(seq: u64) -> Self {
        Self(format!("{TEMP_ID_PREFIX}{seq}"))
    }

    /// Mint an id for a locally synthesized failure notice.
    #[must_use]
    pub fn failure(seq: u64) -> Self {
        Self(format!("{FAILURE_ID_PREFIX}{seq}"))
    }

    /// Whether this id was minted locally and is not backed by the server.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.0.starts_with(TEMP_ID_PREFIX) || self.0.starts_with(FAILURE_ID_PREFIX)
    }
}

/// Sender discriminator of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Authored by the user.
    User,
    /// Authored by the assistant. The legacy wire spelling `"bot"` is
    /// accepted on input.
    #[serde(alias = "bot")]
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Assistant => f.write_str("assistant"),
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message identifier.
    pub id: MessageId,
    /// Sender discriminator.
    pub role: MessageRole,
    /// Text content.
    pub content: String,
    /// Creation timestamp; messages are totally ordered by it.
    pub created_at: DateTime<Utc>,
}

/// A file attached to a conversation, durable on the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Attachment identifier.
    pub id: AttachmentId,
    /// Display name (the uploaded filename).
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Media-type classifier, derived from the filename extension.
    pub media_type: String,
}

/// Derive a media-type classifier from a filename.
///
/// The backend stores documents by name only; the classifier shown in the
/// attachment list is the lowercased extension, or `unknown` when absent.
#[must_use]
pub fn media_type_from_name(name: &str) -> String {
    name.rsplit_once('.')
        .map_or_else(|| "unknown".to_owned(), |(_, ext)| ext.to_ascii_lowercase())
}

/// A file payload handed to the store for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    /// Filename under which the backend stores the document.
    pub name: String,
    /// Media-type classifier, derived from the name.
    pub media_type: String,
    /// Raw file content.
    pub bytes: Vec<u8>,
}

impl FileUpload {
    /// Build an upload payload, deriving the media type from the name.
    #[must_use]
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let media_type = media_type_from_name(&name);
        Self {
            name,
            media_type,
            bytes,
        }
    }
}

/// Sidebar metadata of a conversation as returned by the backend list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMeta {
    /// Conversation identifier.
    pub id: ChatId,
    /// Display title.
    pub title: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-updated timestamp.
    pub updated_at: DateTime<Utc>,
    /// Optional system instruction steering the assistant.
    pub system_instruction: Option<String>,
}

/// A conversation with its lazily loaded detail data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation identifier.
    pub id: ChatId,
    /// Display title.
    pub title: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-updated timestamp.
    pub updated_at: DateTime<Utc>,
    /// Optional system instruction steering the assistant.
    pub system_instruction: Option<String>,
    /// Messages in chronological order. Empty until detail is loaded.
    pub messages: Vec<Message>,
    /// Attachments. Empty until detail is loaded.
    pub attachments: Vec<Attachment>,
    /// Whether messages and attachments reflect a completed detail fetch.
    pub detail_loaded: bool,
}

impl Conversation {
    /// Placeholder title given to freshly created conversations.
    pub const DEFAULT_TITLE: &'static str = "Neuer Chat";

    /// Sidebar preview shown while a conversation has no messages.
    pub const EMPTY_PREVIEW: &'static str = "Noch keine Nachrichten";

    /// Maximum length of an auto-derived title, in characters.
    const DERIVED_TITLE_MAX: usize = 50;

    /// Maximum length of the sidebar preview, in characters.
    const PREVIEW_MAX: usize = 80;

    /// Build a conversation with empty detail from sidebar metadata.
    #[must_use]
    pub fn from_meta(meta: ConversationMeta) -> Self {
        Self {
            id: meta.id,
            title: meta.title,
            created_at: meta.created_at,
            updated_at: meta.updated_at,
            system_instruction: meta.system_instruction,
            messages: Vec::new(),
            attachments: Vec::new(),
            detail_loaded: false,
        }
    }

    /// Sidebar preview text: the latest message, truncated.
    #[must_use]
    pub fn preview(&self) -> String {
        self.messages.last().map_or_else(
            || Self::EMPTY_PREVIEW.to_owned(),
            |msg| truncate_chars(&msg.content, Self::PREVIEW_MAX),
        )
    }

    /// Title derived from the first user message, when one exists.
    ///
    /// Used to replace [`Self::DEFAULT_TITLE`] after the first exchange.
    #[must_use]
    pub fn derived_title(&self) -> Option<String> {
        self.messages
            .iter()
            .find(|msg| msg.role == MessageRole::User)
            .map(|msg| truncate_chars(msg.content.trim(), Self::DERIVED_TITLE_MAX))
            .filter(|title| !title.is_empty())
    }

    /// Whether the title is still the creation placeholder.
    #[must_use]
    pub fn has_placeholder_title(&self) -> bool {
        self.title == Self::DEFAULT_TITLE
    }
}

/// Truncate to at most `max` characters on a char boundary.
fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_message_ids() {
        assert!(MessageId::temporary(7).is_local());
        assert!(MessageId::failure(7).is_local());
        assert!(!MessageId::new("42").is_local());
        assert_eq!(MessageId::temporary(3).as_str(), "temp-3");
        assert_eq!(MessageId::failure(3).as_str(), "error-3");
    }

    #[test]
    fn test_role_accepts_legacy_bot_spelling() {
        let role: MessageRole = serde_json::from_str("\"bot\"").unwrap();
        assert_eq!(role, MessageRole::Assistant);
        let role: MessageRole = serde_json::from_str("\"assistant\"").unwrap();
        assert_eq!(role, MessageRole::Assistant);
        assert_eq!(serde_json::to_string(&role).unwrap(), "\"assistant\"");
    }

    #[test]
    fn test_media_type_from_name() {
        assert_eq!(media_type_from_name("Bericht.PDF"), "pdf");
        assert_eq!(media_type_from_name("notes.tar.gz"), "gz");
        assert_eq!(media_type_from_name("README"), "unknown");
    }

    #[test]
    fn test_preview_and_derived_title() {
        let meta = ConversationMeta {
            id: ChatId::new("1"),
            title: Conversation::DEFAULT_TITLE.to_owned(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            system_instruction: None,
        };
        let mut conv = Conversation::from_meta(meta);
        assert_eq!(conv.preview(), Conversation::EMPTY_PREVIEW);
        assert!(conv.has_placeholder_title());
        assert!(conv.derived_title().is_none());

        conv.messages.push(Message {
            id: MessageId::new("10"),
            role: MessageRole::User,
            content: "  Wie funktioniert der Urlaubsantrag?  ".to_owned(),
            created_at: Utc::now(),
        });
        assert_eq!(
            conv.derived_title().as_deref(),
            Some("Wie funktioniert der Urlaubsantrag?")
        );
        assert_eq!(conv.preview(), "  Wie funktioniert der Urlaubsantrag?  ");
    }

    #[test]
    fn test_derived_title_truncates() {
        let long = "a".repeat(120);
        let conv = Conversation {
            id: ChatId::new("1"),
            title: Conversation::DEFAULT_TITLE.to_owned(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            system_instruction: None,
            messages: vec![Message {
                id: MessageId::new("1"),
                role: MessageRole::User,
                content: long,
                created_at: Utc::now(),
            }],
            attachments: Vec::new(),
            detail_loaded: true,
        };
        assert_eq!(conv.derived_title().map(|t| t.chars().count()), Some(50));
    }
}
