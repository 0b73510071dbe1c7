//! HTTP implementation of the chat backend contract.
//!
//! Speaks the REST/JSON dialect of the chatbot backend: resources live
//! under an `api/` root, identifiers arrive numeric on the wire and are
//! treated as opaque strings everywhere above this module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::conversations::types::{
    Attachment, AttachmentId, ChatId, ConversationMeta, FileUpload, Message, MessageId,
    MessageRole, UserId, media_type_from_name,
};

use super::config::BackendConfig;
use super::error::{BackendError, BackendResult};
use super::{ChatBackend, ChatUpdate};

/// Reqwest-backed client for the chat backend.
pub struct HttpChatBackend {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpChatBackend {
    /// Build a client from configuration.
    ///
    /// # Errors
    /// Returns an error if the base URL or a configured header is invalid,
    /// or if the HTTP client cannot be constructed.
    pub fn new(config: &BackendConfig) -> BackendResult<Self> {
        let base_url = Url::parse(&config.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::Config(format!(
                "base URL cannot carry paths: {}",
                config.base_url
            )));
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &config.default_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| BackendError::Config(format!("invalid header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| BackendError::Config(format!("invalid header value: {e}")))?;
            headers.insert(name, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self { http, base_url })
    }

    /// The underlying HTTP client, shared with the auth calls.
    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Assemble an endpoint URL under the `api/` root.
    pub(crate) fn api_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut parts) = url.path_segments_mut() {
            parts.pop_if_empty().push("api").extend(segments);
        }
        url
    }
}

/// Map a non-success response to a typed error, passing success through.
pub(crate) fn ensure_success(
    response: reqwest::Response,
    endpoint: &str,
) -> BackendResult<reqwest::Response> {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(BackendError::RateLimited(60));
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(BackendError::AccessDenied(endpoint.to_owned()));
    }
    if !status.is_success() {
        return Err(BackendError::Rejected {
            status,
            endpoint: endpoint.to_owned(),
        });
    }
    Ok(response)
}

/// Parse an opaque id back into the numeric form the backend expects in
/// JSON request bodies.
fn numeric_id(raw: &str) -> BackendResult<i64> {
    raw.parse::<i64>()
        .map_err(|_| BackendError::InvalidId(raw.to_owned()))
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn list_chats(&self, user: &UserId) -> BackendResult<Vec<ConversationMeta>> {
        let url = self.api_url(&["users", user.as_str(), "chats"]);
        let response = self.http.get(url).send().await?;
        let records: Vec<ChatRecord> = ensure_success(response, "list chats")?.json().await?;
        Ok(records.into_iter().map(ConversationMeta::from).collect())
    }

    async fn create_chat(&self, user: &UserId, title: &str) -> BackendResult<ConversationMeta> {
        let url = self.api_url(&["chats"]);
        let body = CreateChatRequest {
            title,
            user_id: numeric_id(user.as_str())?,
        };
        let response = self.http.post(url).json(&body).send().await?;
        let record: ChatRecord = ensure_success(response, "create chat")?.json().await?;
        Ok(record.into())
    }

    async fn update_chat(&self, chat: &ChatId, update: &ChatUpdate) -> BackendResult<()> {
        let url = self.api_url(&["chats", chat.as_str()]);
        let body = UpdateChatRequest {
            title: update.title.as_deref(),
            system_prompt: update.system_instruction.as_deref(),
        };
        let response = self.http.put(url).json(&body).send().await?;
        ensure_success(response, "update chat")?;
        Ok(())
    }

    async fn delete_chat(&self, chat: &ChatId) -> BackendResult<()> {
        let url = self.api_url(&["chats", chat.as_str()]);
        let response = self.http.delete(url).send().await?;
        ensure_success(response, "delete chat")?;
        Ok(())
    }

    async fn list_messages(&self, chat: &ChatId) -> BackendResult<Vec<Message>> {
        let url = self.api_url(&["chats", chat.as_str(), "messages"]);
        let response = self.http.get(url).send().await?;
        let records: Vec<MessageRecord> = ensure_success(response, "list messages")?.json().await?;
        Ok(records.into_iter().map(Message::from).collect())
    }

    async fn request_completion(&self, chat: &ChatId, message: &str) -> BackendResult<()> {
        let url = self.api_url(&["chat", "completion"]);
        let body = CompletionRequest {
            chat_id: numeric_id(chat.as_str())?,
            message,
        };
        let response = self.http.post(url).json(&body).send().await?;
        // The response body is ignored; the authoritative transcript is
        // re-fetched by the caller.
        ensure_success(response, "chat completion")?;
        Ok(())
    }

    async fn list_documents(&self, chat: &ChatId) -> BackendResult<Vec<Attachment>> {
        let url = self.api_url(&["chats", chat.as_str(), "documents"]);
        let response = self.http.get(url).send().await?;
        let records: Vec<DocumentRecord> =
            ensure_success(response, "list documents")?.json().await?;
        Ok(records.into_iter().map(Attachment::from).collect())
    }

    async fn upload_document(&self, chat: &ChatId, file: &FileUpload) -> BackendResult<()> {
        let url = self.api_url(&["chats", chat.as_str(), "documents"]);
        let part = Part::bytes(file.bytes.clone()).file_name(file.name.clone());
        let form = Form::new().part("file", part);
        let response = self.http.post(url).multipart(form).send().await?;
        ensure_success(response, "upload document")?;
        Ok(())
    }

    async fn delete_document(&self, attachment: &AttachmentId) -> BackendResult<()> {
        let url = self.api_url(&["documents", attachment.as_str()]);
        let response = self.http.delete(url).send().await?;
        ensure_success(response, "delete document")?;
        Ok(())
    }
}

/// Accept the backend's numeric identifiers as well as plain strings.
pub(crate) fn opaque_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Number(n) => n.to_string(),
        Raw::Text(s) => s,
    })
}

// Wire records of the chat backend.

#[derive(Debug, Deserialize)]
struct ChatRecord {
    #[serde(deserialize_with = "opaque_id")]
    id: String,
    title: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    system_prompt: Option<String>,
}

impl From<ChatRecord> for ConversationMeta {
    fn from(record: ChatRecord) -> Self {
        Self {
            id: ChatId::new(record.id),
            title: record.title,
            created_at: record.created_at,
            updated_at: record.updated_at,
            system_instruction: record.system_prompt,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageRecord {
    #[serde(deserialize_with = "opaque_id")]
    id: String,
    role: MessageRole,
    content: String,
    created_at: DateTime<Utc>,
}

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        Self {
            id: MessageId::new(record.id),
            role: record.role,
            content: record.content,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DocumentRecord {
    #[serde(deserialize_with = "opaque_id")]
    id: String,
    filename: String,
    filesize: u64,
}

impl From<DocumentRecord> for Attachment {
    fn from(record: DocumentRecord) -> Self {
        let media_type = media_type_from_name(&record.filename);
        Self {
            id: AttachmentId::new(record.id),
            name: record.filename,
            size: record.filesize,
            media_type,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateChatRequest<'a> {
    title: &'a str,
    user_id: i64,
}

#[derive(Debug, Serialize)]
struct UpdateChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_prompt: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    chat_id: i64,
    message: &'a str,
}
