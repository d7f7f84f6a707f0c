//! In-memory inbox state and the optimistic reconciler. Every user action is
//! applied to local state before the network round-trip completes, and every
//! one has a deterministic rollback path taken when the call fails.

use crate::api::client::ApiClient;
use crate::api::error::Result;
use crate::api::models::OutgoingMessage;
use crate::avatar::{AvatarContext, resolve_avatar_src};
use crate::config::PortalConfig;
use crate::conversation::{Conversation, build_conversations, merge_drafts};
use crate::normalize::{MessageId, NormalizedMessage, SenderRole, normalize};
use crate::utils::api_origin;
use log::{debug, warn};
use std::collections::HashMap;

/// Snapshot taken before an optimistic edit, sufficient to undo it.
#[derive(Debug)]
pub struct EditSnapshot {
    id: MessageId,
    prior_content: String,
}

/// Snapshot of an optimistically deleted message and where it sat.
#[derive(Debug)]
pub struct DeleteSnapshot {
    index: usize,
    message: NormalizedMessage,
}

/// Snapshot of the messages whose unread flags were optimistically cleared.
#[derive(Debug)]
pub struct MarkReadSnapshot {
    ids: Vec<MessageId>,
}

impl MarkReadSnapshot {
    /// Server-side ids for the batch call. Local (unconfirmed) messages are
    /// never sent in the batch.
    pub fn server_ids(&self) -> Vec<i64> {
        self.ids.iter().filter_map(MessageId::as_server).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Snapshot of an optimistically deleted conversation: every removed message
/// with its original index, plus any draft that was showing for it.
#[derive(Debug)]
pub struct ConversationSnapshot {
    entries: Vec<(usize, NormalizedMessage)>,
    draft: Option<Conversation>,
    was_active: bool,
    conversation_key: String,
}

/// All inbox state owned by one UI component instance. Single-threaded; no
/// locks. The message list is the only truth, conversations are derived from
/// it on every read.
pub struct InboxState {
    self_user_id: String,
    messages: Vec<NormalizedMessage>,
    drafts: Vec<Conversation>,
    // Backfilled avatars are additive only: they overlay the derived
    // conversations and never cause re-grouping.
    avatar_cache: HashMap<String, String>,
    active_conversation: Option<String>,
    // Bumped on every message-list change; in-flight avatar backfills compare
    // against it and abandon themselves when stale.
    generation: u64,
}

impl InboxState {
    pub fn new(self_user_id: impl Into<String>) -> Self {
        Self {
            self_user_id: self_user_id.into(),
            messages: Vec::new(),
            drafts: Vec::new(),
            avatar_cache: HashMap::new(),
            active_conversation: None,
            generation: 0,
        }
    }

    pub fn messages(&self) -> &[NormalizedMessage] {
        &self.messages
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn active_conversation(&self) -> Option<&str> {
        self.active_conversation.as_deref()
    }

    pub fn set_active_conversation(&mut self, key: Option<String>) {
        self.active_conversation = key;
    }

    fn bump(&mut self) {
        self.generation += 1;
    }

    /// Replace the whole message list with a fresh fetch.
    pub fn set_messages(&mut self, messages: Vec<NormalizedMessage>) {
        self.messages = messages;
        self.bump();
    }

    /// Derived conversation list: server truth plus draft overlay, avatar
    /// hints resolved and backfilled URLs applied.
    pub fn conversations(&self, ctx: &AvatarContext) -> Vec<Conversation> {
        let mut server = build_conversations(&self.messages, &self.self_user_id);
        for conversation in &mut server {
            conversation.peer_avatar_url = conversation
                .peer_avatar_url
                .as_deref()
                .and_then(|hint| resolve_avatar_src(Some(hint), ctx))
                .or_else(|| self.avatar_cache.get(&conversation.id).cloned());
        }
        merge_drafts(server, &self.drafts)
    }

    /// The chronologically ordered messages of one conversation.
    pub fn thread(&self, conversation_key: &str) -> Vec<&NormalizedMessage> {
        let mut thread: Vec<&NormalizedMessage> = self
            .messages
            .iter()
            .filter(|m| m.conversation_key == conversation_key)
            .collect();
        thread.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.id.to_string().cmp(&b.id.to_string()))
        });
        thread
    }

    /// Start a new thread locally before any message exists. No-op if a
    /// conversation or draft with that key is already present.
    pub fn start_conversation(&mut self, draft: Conversation) {
        let exists = self.messages.iter().any(|m| m.conversation_key == draft.id)
            || self.drafts.iter().any(|d| d.id == draft.id);
        if !exists {
            self.drafts.push(draft.clone());
        }
        self.active_conversation = Some(draft.id);
    }

    pub fn drafts(&self) -> &[Conversation] {
        &self.drafts
    }

    /// Record a backfilled avatar for a conversation. Additive: does not bump
    /// the generation, so an in-flight backfill is not self-cancelling.
    pub fn cache_peer_avatar(&mut self, conversation_key: &str, url: String) {
        self.avatar_cache.insert(conversation_key.to_string(), url);
    }

    // ---- optimistic send ----

    /// Append a local, unconfirmed message and return its id. The caller
    /// issues the network send and then calls `confirm_send` or `fail_send`.
    pub fn begin_send(
        &mut self,
        conversation_key: &str,
        content: &str,
        recipient_role: Option<&str>,
        recipient_id: Option<&str>,
    ) -> MessageId {
        let id = MessageId::new_local();
        let now = chrono::Utc::now();
        self.messages.push(NormalizedMessage {
            id: id.clone(),
            conversation_key: conversation_key.to_string(),
            sender_role: SenderRole::Counselor,
            sender_name: SenderRole::Counselor.placeholder_name().to_string(),
            content: content.to_string(),
            created_at: now.to_rfc3339(),
            timestamp: now.timestamp(),
            is_unread: false,
            sender_id: Some(self.self_user_id.clone()),
            recipient_id: recipient_id.map(str::to_string),
            recipient_role: recipient_role.map(str::to_string),
            sender_avatar_url: None,
            recipient_avatar_url: None,
        });
        self.bump();
        id
    }

    /// Replace the local entry with the confirmed server record. If the
    /// server assigned a different conversation key than the client guessed,
    /// the active-conversation pointer follows it. Any draft superseded by
    /// the confirmed message is removed.
    pub fn confirm_send(&mut self, local_id: &MessageId, confirmed: NormalizedMessage) {
        let Some(index) = self.messages.iter().position(|m| &m.id == local_id) else {
            warn!("confirm_send: local message {} no longer present", local_id);
            return;
        };
        let expected_key = self.messages[index].conversation_key.clone();
        let confirmed_key = confirmed.conversation_key.clone();
        self.messages[index] = confirmed;
        if confirmed_key != expected_key
            && self.active_conversation.as_deref() == Some(expected_key.as_str())
        {
            self.active_conversation = Some(confirmed_key.clone());
        }
        self.drafts.retain(|d| d.id != expected_key && d.id != confirmed_key);
        self.bump();
    }

    /// Rollback for a failed send: the local entry is removed entirely. The
    /// compose field is deliberately not restored by any layer; the user must
    /// retype, which avoids duplicate-submit ambiguity.
    pub fn fail_send(&mut self, local_id: &MessageId) {
        self.messages.retain(|m| &m.id != local_id);
        self.bump();
    }

    // ---- optimistic edit ----

    /// Apply new content locally and return the snapshot needed to undo it.
    /// Returns `None` when the message is missing or not authored by the
    /// current counselor (content is editable only by its author).
    pub fn begin_edit(&mut self, id: &MessageId, new_content: &str) -> Option<EditSnapshot> {
        let self_id = self.self_user_id.clone();
        let message = self
            .messages
            .iter_mut()
            .find(|m| &m.id == id)
            .filter(|m| {
                m.sender_role == SenderRole::Counselor
                    && m.sender_id.as_deref() == Some(self_id.as_str())
            })?;
        let snapshot = EditSnapshot { id: id.clone(), prior_content: message.content.clone() };
        message.content = new_content.to_string();
        self.bump();
        Some(snapshot)
    }

    /// Restore the exact prior content after a failed edit.
    pub fn fail_edit(&mut self, snapshot: EditSnapshot) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == snapshot.id) {
            message.content = snapshot.prior_content;
        }
        self.bump();
    }

    // ---- optimistic delete (message) ----

    /// Remove a message locally, remembering its original index.
    pub fn begin_delete(&mut self, id: &MessageId) -> Option<DeleteSnapshot> {
        let index = self.messages.iter().position(|m| &m.id == id)?;
        let message = self.messages.remove(index);
        self.bump();
        Some(DeleteSnapshot { index, message })
    }

    /// Best-effort position restore after a failed delete.
    pub fn fail_delete(&mut self, snapshot: DeleteSnapshot) {
        let index = snapshot.index.min(self.messages.len());
        self.messages.insert(index, snapshot.message);
        self.bump();
    }

    // ---- optimistic delete (conversation) ----

    /// Remove every message of a conversation and any matching draft.
    pub fn begin_delete_conversation(&mut self, conversation_key: &str) -> ConversationSnapshot {
        let mut kept = Vec::with_capacity(self.messages.len());
        let mut entries = Vec::new();
        for (index, message) in self.messages.drain(..).enumerate() {
            if message.conversation_key == conversation_key {
                entries.push((index, message));
            } else {
                kept.push(message);
            }
        }
        self.messages = kept;

        let draft = self
            .drafts
            .iter()
            .position(|d| d.id == conversation_key)
            .map(|pos| self.drafts.remove(pos));

        let was_active = self.active_conversation.as_deref() == Some(conversation_key);
        if was_active {
            self.active_conversation = None;
        }

        self.bump();
        ConversationSnapshot {
            entries,
            draft,
            was_active,
            conversation_key: conversation_key.to_string(),
        }
    }

    /// Restore the full removed message set and draft after a failed
    /// conversation delete. Ascending original indices keep the exact order.
    pub fn fail_delete_conversation(&mut self, snapshot: ConversationSnapshot) {
        for (index, message) in snapshot.entries {
            let index = index.min(self.messages.len());
            self.messages.insert(index, message);
        }
        if let Some(draft) = snapshot.draft {
            self.drafts.push(draft);
        }
        if snapshot.was_active {
            self.active_conversation = Some(snapshot.conversation_key);
        }
        self.bump();
    }

    // ---- mark as read ----

    /// Clear the unread flag on every message of a conversation, remembering
    /// exactly which messages were cleared so a failed batch call can restore
    /// them.
    pub fn begin_mark_read(&mut self, conversation_key: &str) -> MarkReadSnapshot {
        let mut ids = Vec::new();
        for message in &mut self.messages {
            if message.conversation_key == conversation_key && message.is_unread {
                message.is_unread = false;
                ids.push(message.id.clone());
            }
        }
        if !ids.is_empty() {
            self.bump();
        }
        MarkReadSnapshot { ids }
    }

    /// Re-set the unread flag on exactly the messages the failed batch had
    /// cleared.
    pub fn fail_mark_read(&mut self, snapshot: MarkReadSnapshot) {
        if snapshot.ids.is_empty() {
            return;
        }
        for message in &mut self.messages {
            if snapshot.ids.contains(&message.id) {
                message.is_unread = true;
            }
        }
        self.bump();
    }
}

/// Async driver: owns the state, the HTTP client, and the connection details,
/// and wires each optimistic mutation to its network call and rollback.
pub struct Inbox {
    pub state: InboxState,
    client: ApiClient,
    base_url: String,
    token: Option<String>,
    avatar_ctx: AvatarContext,
}

impl Inbox {
    pub fn new(config: &PortalConfig) -> Self {
        let avatar_ctx = AvatarContext {
            api_origin: api_origin(&config.base_url),
            ..AvatarContext::default()
        };
        Self {
            state: InboxState::new(config.self_user_id.clone()),
            client: ApiClient::new(),
            base_url: config.base_url.clone(),
            token: config.token.clone(),
            avatar_ctx,
        }
    }

    fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Fetch and normalize the full message list.
    pub async fn refresh(&mut self) -> Result<()> {
        let raws = self.client.fetch_messages(&self.base_url, self.token()).await?;
        self.state.set_messages(raws.iter().map(normalize).collect());
        Ok(())
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.state.conversations(&self.avatar_ctx)
    }

    /// Start a new local thread with a chosen recipient.
    pub fn start_conversation(
        &mut self,
        conversation_key: &str,
        peer_role: &str,
        peer_name: &str,
        peer_id: Option<&str>,
        avatar_hint: Option<&str>,
    ) {
        let draft = Conversation::draft(
            conversation_key.to_string(),
            peer_role.to_string(),
            peer_name.to_string(),
            peer_id.map(str::to_string),
            resolve_avatar_src(avatar_hint, &self.avatar_ctx),
            chrono::Utc::now().timestamp(),
        );
        self.state.start_conversation(draft);
    }

    /// Optimistic send: the message appears immediately and is replaced by
    /// the confirmed server record, or removed again on failure.
    pub async fn send(
        &mut self,
        conversation_key: &str,
        content: &str,
        recipient_role: Option<&str>,
        recipient_id: Option<&str>,
    ) -> Result<()> {
        let local_id =
            self.state.begin_send(conversation_key, content, recipient_role, recipient_id);
        let outgoing = OutgoingMessage {
            content: content.to_string(),
            conversation_id: Some(conversation_key.to_string()),
            recipient_role: recipient_role.map(str::to_string),
            recipient_id: recipient_id.map(str::to_string),
        };
        match self.client.send_message(&self.base_url, self.token(), &outgoing).await {
            Ok(raw) => {
                self.state.confirm_send(&local_id, normalize(&raw));
                Ok(())
            }
            Err(e) => {
                warn!("send failed, rolling back optimistic message: {}", e);
                self.state.fail_send(&local_id);
                Err(e)
            }
        }
    }

    /// Optimistic edit with exact-content restore on failure. Editing a
    /// still-unconfirmed local message stays local.
    pub async fn edit(&mut self, id: &MessageId, content: &str) -> Result<()> {
        let Some(snapshot) = self.state.begin_edit(id, content) else {
            debug!("edit ignored: {} is not an editable own message", id);
            return Ok(());
        };
        let Some(server_id) = id.as_server() else {
            return Ok(());
        };
        match self.client.update_message(&self.base_url, self.token(), server_id, content).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("edit failed, restoring prior content: {}", e);
                self.state.fail_edit(snapshot);
                Err(e)
            }
        }
    }

    /// Optimistic message delete with position restore on failure.
    pub async fn delete_message(&mut self, id: &MessageId) -> Result<()> {
        let Some(snapshot) = self.state.begin_delete(id) else {
            return Ok(());
        };
        let Some(server_id) = id.as_server() else {
            // Unconfirmed local message: nothing exists server-side.
            return Ok(());
        };
        match self.client.delete_message(&self.base_url, self.token(), server_id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("delete failed, restoring message: {}", e);
                self.state.fail_delete(snapshot);
                Err(e)
            }
        }
    }

    /// Optimistic conversation delete: messages and draft vanish together and
    /// are restored together on failure.
    pub async fn delete_conversation(&mut self, conversation_key: &str) -> Result<()> {
        let snapshot = self.state.begin_delete_conversation(conversation_key);
        match self.client.delete_conversation(&self.base_url, self.token(), conversation_key).await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("conversation delete failed, restoring: {}", e);
                self.state.fail_delete_conversation(snapshot);
                Err(e)
            }
        }
    }

    /// Clear unread flags locally and tell the server in one batch. On
    /// failure the cleared flags are restored, like every other optimistic
    /// mutation.
    pub async fn mark_conversation_read(&mut self, conversation_key: &str) -> Result<()> {
        let snapshot = self.state.begin_mark_read(conversation_key);
        match self.client.mark_read(&self.base_url, self.token(), &snapshot.server_ids()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("mark-read failed, restoring unread flags: {}", e);
                self.state.fail_mark_read(snapshot);
                Err(e)
            }
        }
    }

    /// Best-effort avatar backfill for conversations with no resolvable hint.
    /// Abandons itself as soon as the underlying message list changes, so a
    /// superseded render cycle can never write stale avatars.
    pub async fn backfill_avatars(&mut self) {
        let generation = self.state.generation();
        let pending: Vec<(String, String, String, String)> = self
            .conversations()
            .into_iter()
            .filter(|c| c.peer_avatar_url.is_none())
            .filter_map(|c| {
                c.peer_id.clone().map(|peer_id| (c.id, c.peer_role, c.peer_name, peer_id))
            })
            .collect();

        for (key, role, name, peer_id) in pending {
            let users =
                match self.client.search_users(&self.base_url, self.token(), &role, &name).await {
                    Ok(users) => users,
                    Err(e) => {
                        debug!("avatar lookup for {} failed: {}", key, e);
                        continue;
                    }
                };
            if self.state.generation() != generation {
                debug!("conversation list changed, abandoning avatar backfill");
                return;
            }
            let resolved = users
                .iter()
                .find(|u| u.id.as_deref() == Some(peer_id.as_str()))
                .and_then(|u| resolve_avatar_src(u.avatar.as_deref(), &self.avatar_ctx));
            if let Some(url) = resolved {
                self.state.cache_peer_avatar(&key, url);
            }
        }
    }
}
