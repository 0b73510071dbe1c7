//! Transcript export for a conversation.

use core::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use super::types::{Conversation, MessageRole};

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Pretty-printed JSON array of transcript entries.
    Json,
    /// Plain text, one timestamped block per message.
    Text,
}

/// Error parsing an export format name.
#[derive(Debug, Error)]
#[error("Unsupported export format: {0}")]
pub struct UnknownFormat(String);

impl FromStr for ExportFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "txt" | "text" => Ok(Self::Text),
            other => Err(UnknownFormat(other.to_owned())),
        }
    }
}

/// Errors that can occur while rendering an export.
#[derive(Debug, Error)]
pub enum ExportError {
    /// JSON rendering failed.
    #[error("JSON rendering error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct ExportEntry<'a> {
    sender: &'a str,
    content: &'a str,
    timestamp: String,
}

/// Render a conversation's transcript in the given format.
///
/// # Errors
/// Returns an error when JSON rendering fails.
pub fn render(conversation: &Conversation, format: ExportFormat) -> Result<String, ExportError> {
    let entries: Vec<ExportEntry<'_>> = conversation
        .messages
        .iter()
        .map(|msg| ExportEntry {
            sender: match msg.role {
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
            },
            content: &msg.content,
            timestamp: msg.created_at.to_rfc3339(),
        })
        .collect();

    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(&entries)?),
        ExportFormat::Text => {
            let blocks: Vec<String> = entries
                .iter()
                .map(|entry| {
                    let label = if entry.sender == "user" { "Sie" } else { "Bot" };
                    format!("[{}] {}: {}", entry.timestamp, label, entry.content)
                })
                .collect();
            Ok(blocks.join("\n\n"))
        }
    }
}
