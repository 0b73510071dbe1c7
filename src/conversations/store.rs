//! The conversation store: single owner of client-side chat state.
//!
//! All reads and writes go through the [`ChatBackend`] seam; optimistic
//! local edits are reconciled against authoritative re-fetches, never
//! field-merged. Constructed explicitly and passed by handle to whatever
//! presentation layer needs it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::backend::{BackendError, ChatBackend, ChatUpdate};

use super::error::{StoreError, StoreResult};
use super::types::{
    AttachmentId, ChatId, Conversation, FileUpload, Message, MessageId, MessageRole, UserId,
};

/// In-memory state guarded by the store's lock.
#[derive(Default)]
struct StoreState {
    /// Identity whose conversations are loaded. `None` means inert.
    user: Option<UserId>,
    /// Conversations, most recent first.
    chats: Vec<Conversation>,
    /// Active conversation id; always `None` or present in `chats`.
    active: Option<ChatId>,
}

impl StoreState {
    fn conversation(&self, id: &ChatId) -> Option<&Conversation> {
        self.chats.iter().find(|c| &c.id == id)
    }

    fn conversation_mut(&mut self, id: &ChatId) -> Option<&mut Conversation> {
        self.chats.iter_mut().find(|c| &c.id == id)
    }

    fn contains(&self, id: &ChatId) -> bool {
        self.chats.iter().any(|c| &c.id == id)
    }
}

/// Removes the per-conversation in-flight flag when the operation settles,
/// whether it returned, errored, or was cancelled.
struct InFlightGuard<'a> {
    registry: &'a DashMap<ChatId, ()>,
    id: ChatId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}

/// Single source of truth for the authenticated identity's conversations
/// and the active conversation's detail data.
pub struct ChatStore {
    backend: Arc<dyn ChatBackend>,
    state: RwLock<StoreState>,
    /// One flag per conversation; held by `post_message` and `attach_files`.
    in_flight: DashMap<ChatId, ()>,
    /// Sequence for locally minted message ids, unique per process.
    local_seq: AtomicU64,
}

impl ChatStore {
    /// Transcript notice inserted when a completion could not be obtained.
    pub const FAILURE_NOTICE: &'static str = "Fehler: Antwort konnte nicht empfangen werden.";

    /// Create a store talking to the given backend. State starts empty.
    #[must_use]
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            state: RwLock::new(StoreState::default()),
            in_flight: DashMap::new(),
            local_seq: AtomicU64::new(1),
        }
    }

    /// Replace the conversation list with the backend's list for `user`.
    ///
    /// Entries start with empty detail (lazy loading). Keeps the previously
    /// active conversation when it still exists, otherwise selects the
    /// first; an empty list leaves the active slot empty and never creates
    /// a conversation implicitly. Failures leave the list empty and are
    /// logged; this method never surfaces an error.
    pub async fn load(&self, user: &UserId) {
        {
            let mut state = self.state.write().await;
            state.user = Some(user.clone());
        }

        let metas = match self.backend.list_chats(user).await {
            Ok(metas) => metas,
            Err(e) => {
                warn!("Failed to load conversations for {user}: {e}");
                let mut state = self.state.write().await;
                state.chats.clear();
                state.active = None;
                return;
            }
        };

        let (count, selected) = {
            let mut state = self.state.write().await;
            state.chats = metas.into_iter().map(Conversation::from_meta).collect();
            let previous = state.active.take();
            let next = previous
                .filter(|id| state.contains(id))
                .or_else(|| state.chats.first().map(|c| c.id.clone()));
            state.active = next.clone();
            (state.chats.len(), next)
        };

        info!("Loaded {count} conversations for {user}");

        if let Some(id) = selected {
            if let Err(e) = self.load_detail(&id).await {
                warn!("Failed to load detail for {id}: {e}");
            }
        }
    }

    /// Make `id` the active conversation and fetch its detail data.
    ///
    /// A no-op when `id` is already active. The selection takes effect even
    /// when the detail fetch fails; the error is surfaced so the caller can
    /// re-select to retry.
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownConversation`] for an id not in the
    /// list, or the detail-fetch failure.
    pub async fn select_conversation(&self, id: &ChatId) -> StoreResult<()> {
        {
            let mut state = self.state.write().await;
            if state.active.as_ref() == Some(id) {
                return Ok(());
            }
            if !state.contains(id) {
                return Err(StoreError::UnknownConversation(id.clone()));
            }
            state.active = Some(id.clone());
        }
        debug!("Switched to conversation {id}");
        self.load_detail(id).await
    }

    /// Fetch messages and attachments for `id` and replace the prior
    /// detail wholesale. The backend is authoritative; partial client
    /// edits must not linger after a fetch.
    ///
    /// # Errors
    /// Returns the first backend failure; local detail is left untouched.
    pub async fn load_detail(&self, id: &ChatId) -> StoreResult<()> {
        let (messages, documents) = tokio::join!(
            self.backend.list_messages(id),
            self.backend.list_documents(id)
        );
        let messages = messages?;
        let documents = documents?;

        let mut state = self.state.write().await;
        if let Some(conv) = state.conversation_mut(id) {
            conv.messages = messages;
            conv.attachments = documents;
            conv.detail_loaded = true;
        } else {
            debug!("Conversation {id} disappeared before detail merge");
        }
        Ok(())
    }

    /// Create a conversation with the placeholder title, prepend it to the
    /// list, and activate it.
    ///
    /// Uses the identity captured by [`Self::load`]; the store never mixes
    /// conversations across identities.
    ///
    /// # Errors
    /// Returns [`StoreError::NoIdentity`] when no identity is loaded, or
    /// the backend failure. Local state is unchanged on failure.
    pub async fn create_conversation(&self) -> StoreResult<ChatId> {
        let user = {
            let state = self.state.read().await;
            state.user.clone().ok_or(StoreError::NoIdentity)?
        };

        let meta = self
            .backend
            .create_chat(&user, Conversation::DEFAULT_TITLE)
            .await?;
        let id = meta.id.clone();

        {
            let mut state = self.state.write().await;
            state.chats.insert(0, Conversation::from_meta(meta));
            state.active = Some(id.clone());
        }

        info!("Created conversation {id}");
        Ok(id)
    }

    /// Delete a conversation on the backend, then locally.
    ///
    /// The request is sent before the local removal, so a failed request
    /// leaves the list untouched. Deleting the active conversation
    /// re-activates the first remaining one, or clears the active slot.
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownConversation`] or the backend failure.
    pub async fn delete_conversation(&self, id: &ChatId) -> StoreResult<()> {
        if !self.state.read().await.contains(id) {
            return Err(StoreError::UnknownConversation(id.clone()));
        }

        self.backend.delete_chat(id).await?;

        let next = {
            let mut state = self.state.write().await;
            state.chats.retain(|c| &c.id != id);
            if state.active.as_ref() == Some(id) {
                let next = state.chats.first().map(|c| c.id.clone());
                state.active = next.clone();
                next
            } else {
                None
            }
        };

        info!("Deleted conversation {id}");

        if let Some(next_id) = next {
            if let Err(e) = self.load_detail(&next_id).await {
                warn!("Failed to load detail for {next_id}: {e}");
            }
        }
        Ok(())
    }

    /// Set the title locally, then persist it.
    ///
    /// Optimistic without rollback: a failed persistence request leaves
    /// the local title in place and surfaces the error; callers may
    /// re-issue.
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownConversation`] or the backend failure.
    pub async fn rename_conversation(&self, id: &ChatId, title: &str) -> StoreResult<()> {
        {
            let mut state = self.state.write().await;
            let conv = state
                .conversation_mut(id)
                .ok_or_else(|| StoreError::UnknownConversation(id.clone()))?;
            conv.title = title.to_owned();
        }
        self.backend.update_chat(id, &ChatUpdate::title(title)).await?;
        debug!("Renamed conversation {id} to: {title}");
        Ok(())
    }

    /// Set the system instruction locally, then persist it.
    ///
    /// Same optimistic-then-persist contract as [`Self::rename_conversation`].
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownConversation`] or the backend failure.
    pub async fn set_system_instruction(&self, id: &ChatId, text: &str) -> StoreResult<()> {
        {
            let mut state = self.state.write().await;
            let conv = state
                .conversation_mut(id)
                .ok_or_else(|| StoreError::UnknownConversation(id.clone()))?;
            conv.system_instruction = Some(text.to_owned());
        }
        self.backend
            .update_chat(id, &ChatUpdate::system_instruction(text))
            .await?;
        Ok(())
    }

    /// Post a user message into the active conversation and reconcile the
    /// assistant's reply.
    ///
    /// The message is appended optimistically under a temporary id so the
    /// send is visible immediately. The backend persists the user turn as
    /// part of the completion call; on success the whole transcript is
    /// re-fetched, discarding the temporary message, so local ordering
    /// exactly matches the backend's record. On failure a synthetic
    /// assistant-role notice is appended after the optimistic message,
    /// keeping the typed text in view.
    ///
    /// Preconditions are handled as logged no-ops: empty text, a
    /// conversation that is not active, and a second call while a post for
    /// the same conversation is still in flight (single-flight; the flag is
    /// released on every exit path).
    ///
    /// # Errors
    /// Returns the completion or re-fetch failure after the synthetic
    /// notice has been inserted.
    pub async fn post_message(&self, id: &ChatId, text: &str) -> StoreResult<()> {
        if text.trim().is_empty() {
            debug!("Ignoring empty message for {id}");
            return Ok(());
        }
        {
            let state = self.state.read().await;
            if state.active.as_ref() != Some(id) {
                warn!("Ignoring message for non-active conversation {id}");
                return Ok(());
            }
        }
        let Some(_guard) = self.try_begin(id) else {
            debug!("Completion already in flight for {id}; ignoring send");
            return Ok(());
        };

        let seq = self.local_seq.fetch_add(1, Ordering::Relaxed);
        {
            let mut state = self.state.write().await;
            if let Some(conv) = state.conversation_mut(id) {
                conv.messages.push(Message {
                    id: MessageId::temporary(seq),
                    role: MessageRole::User,
                    content: text.to_owned(),
                    created_at: Utc::now(),
                });
            }
        }

        let outcome = match self.backend.request_completion(id, text).await {
            Ok(()) => self.load_detail(id).await,
            Err(e) => Err(StoreError::Backend(e)),
        };

        match outcome {
            Ok(()) => {
                {
                    let mut state = self.state.write().await;
                    if let Some(conv) = state.conversation_mut(id) {
                        conv.updated_at = Utc::now();
                    }
                }
                self.derive_title_if_placeholder(id).await;
                Ok(())
            }
            Err(e) => {
                error!("Failed to obtain a reply for {id}: {e}");
                let failure_seq = self.local_seq.fetch_add(1, Ordering::Relaxed);
                let mut state = self.state.write().await;
                if let Some(conv) = state.conversation_mut(id) {
                    conv.messages.push(Message {
                        id: MessageId::failure(failure_seq),
                        role: MessageRole::Assistant,
                        content: Self::FAILURE_NOTICE.to_owned(),
                        created_at: Utc::now(),
                    });
                }
                Err(e)
            }
        }
    }

    /// Upload files into a conversation, strictly one after another.
    ///
    /// Uploads abort on the first failure; remaining files are never
    /// attempted and the error names the file that failed. The attachment
    /// list is re-fetched after full or partial completion so it reflects
    /// exactly what the backend persisted.
    ///
    /// # Errors
    /// Returns [`StoreError::Busy`] when the conversation already has an
    /// operation in flight, [`StoreError::Upload`] naming the failed file,
    /// or the re-fetch failure.
    pub async fn attach_files(&self, id: &ChatId, files: &[FileUpload]) -> StoreResult<()> {
        if !self.state.read().await.contains(id) {
            return Err(StoreError::UnknownConversation(id.clone()));
        }
        let Some(_guard) = self.try_begin(id) else {
            return Err(StoreError::Busy(id.clone()));
        };

        let mut failed: Option<(String, BackendError)> = None;
        for file in files {
            info!("Uploading {} ({} bytes) to {id}", file.name, file.bytes.len());
            if let Err(e) = self.backend.upload_document(id, file).await {
                failed = Some((file.name.clone(), e));
                break;
            }
        }

        let refetch = self.load_detail(id).await;

        if let Some((file, source)) = failed {
            error!("Upload of {file} to {id} failed: {source}");
            return Err(StoreError::Upload { file, source });
        }
        refetch
    }

    /// Delete one attachment on the backend, then re-fetch the detail.
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownConversation`] or the backend failure;
    /// local state is untouched when the deletion is rejected.
    pub async fn remove_attachment(
        &self,
        id: &ChatId,
        attachment: &AttachmentId,
    ) -> StoreResult<()> {
        if !self.state.read().await.contains(id) {
            return Err(StoreError::UnknownConversation(id.clone()));
        }
        self.backend.delete_document(attachment).await?;
        debug!("Removed attachment {attachment} from {id}");
        self.load_detail(id).await
    }

    /// Clear all state; the store becomes inert until the next [`Self::load`].
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        *state = StoreState::default();
    }

    /// The loaded identity, if any.
    pub async fn user(&self) -> Option<UserId> {
        self.state.read().await.user.clone()
    }

    /// Snapshot of all conversations, most recent first.
    pub async fn conversations(&self) -> Vec<Conversation> {
        self.state.read().await.chats.clone()
    }

    /// The active conversation id, if any.
    pub async fn active_id(&self) -> Option<ChatId> {
        self.state.read().await.active.clone()
    }

    /// Snapshot of the active conversation, if any.
    pub async fn active_conversation(&self) -> Option<Conversation> {
        let state = self.state.read().await;
        state.active.as_ref().and_then(|id| state.conversation(id)).cloned()
    }

    /// Snapshot of one conversation by id.
    pub async fn conversation(&self, id: &ChatId) -> Option<Conversation> {
        self.state.read().await.conversation(id).cloned()
    }

    /// Whether a post or upload currently holds the conversation's flag.
    #[must_use]
    pub fn has_operation_in_flight(&self, id: &ChatId) -> bool {
        self.in_flight.contains_key(id)
    }

    /// Claim the conversation's in-flight flag, or `None` when occupied.
    fn try_begin(&self, id: &ChatId) -> Option<InFlightGuard<'_>> {
        match self.in_flight.entry(id.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(InFlightGuard {
                    registry: &self.in_flight,
                    id: id.clone(),
                })
            }
        }
    }

    /// Replace a placeholder title with one derived from the first user
    /// message and persist it. Persistence failures are logged only; the
    /// next successful exchange retries.
    async fn derive_title_if_placeholder(&self, id: &ChatId) {
        let derived = {
            let state = self.state.read().await;
            state
                .conversation(id)
                .filter(|c| c.has_placeholder_title())
                .and_then(Conversation::derived_title)
        };
        let Some(title) = derived else {
            return;
        };

        {
            let mut state = self.state.write().await;
            if let Some(conv) = state.conversation_mut(id) {
                conv.title = title.clone();
            }
        }
        if let Err(e) = self
            .backend
            .update_chat(id, &ChatUpdate::title(title.clone()))
            .await
        {
            warn!("Failed to persist derived title for {id}: {e}");
        } else {
            debug!("Derived title for {id}: {title}");
        }
    }
}
