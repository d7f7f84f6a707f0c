use crate::normalize::{NormalizedMessage, SenderRole};
use std::collections::HashMap;

/// A conversation derived from its constituent messages. Never stored:
/// rebuilding from the same messages always yields the same result, so any
/// local mutation is reflected by just building again.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub peer_role: String,
    pub peer_name: String,
    pub peer_id: Option<String>,
    pub unread_count: usize,
    pub last_message: String,
    pub last_created_at: String,
    pub last_timestamp: i64,
    pub peer_avatar_url: Option<String>,
}

impl Conversation {
    /// A draft shell for a thread started locally before any message exists.
    pub fn draft(
        id: String,
        peer_role: String,
        peer_name: String,
        peer_id: Option<String>,
        peer_avatar_url: Option<String>,
        created_timestamp: i64,
    ) -> Self {
        Self {
            id,
            peer_role,
            peer_name,
            peer_id,
            unread_count: 0,
            last_message: String::new(),
            last_created_at: String::new(),
            last_timestamp: created_timestamp,
            peer_avatar_url,
        }
    }
}

fn is_own(message: &NormalizedMessage, self_user_id: &str) -> bool {
    message.sender_role == SenderRole::Counselor
        && message.sender_id.as_deref() == Some(self_user_id)
}

fn placeholder_for_tag(tag: &str) -> String {
    match tag {
        "student" => "Student".to_string(),
        "guest" => "Guest".to_string(),
        "counselor" => "Counselor".to_string(),
        "admin" => "Admin".to_string(),
        _ => SenderRole::System.placeholder_name().to_string(),
    }
}

/// Group messages into conversations for the given counselor. Pure function
/// of its inputs, holds no state between calls.
pub fn build_conversations(
    messages: &[NormalizedMessage],
    self_user_id: &str,
) -> Vec<Conversation> {
    // Stable grouping: keys keep first-seen (arrival) order.
    let mut key_order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&NormalizedMessage>> = HashMap::new();
    for message in messages {
        if !groups.contains_key(&message.conversation_key) {
            key_order.push(message.conversation_key.clone());
        }
        groups.entry(message.conversation_key.clone()).or_default().push(message);
    }

    let mut conversations = Vec::with_capacity(key_order.len());
    for key in key_order {
        let Some(mut group) = groups.remove(&key) else { continue };
        // Timestamp ascending, id string as tiebreak so colliding timestamps
        // still order deterministically.
        group.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.id.to_string().cmp(&b.id.to_string()))
        });
        let Some(last) = group.last() else { continue };

        // Peer: first message not from the counselor themself and not from
        // the system. If nothing has come back yet, fall back to whoever the
        // counselor's own last message was addressed to.
        let peer = group
            .iter()
            .find(|m| !is_own(m, self_user_id) && m.sender_role != SenderRole::System);
        let (peer_role, peer_name, peer_id, peer_avatar_url) = match peer {
            Some(m) => (
                m.sender_role.as_str().to_string(),
                m.sender_name.clone(),
                m.sender_id.clone(),
                m.sender_avatar_url.clone(),
            ),
            None => match group.iter().rev().find(|m| is_own(m, self_user_id)) {
                Some(own) => {
                    let role = own.recipient_role.clone().unwrap_or_else(|| "student".to_string());
                    let name = placeholder_for_tag(&role);
                    (role, name, own.recipient_id.clone(), own.recipient_avatar_url.clone())
                }
                None => (
                    "system".to_string(),
                    SenderRole::System.placeholder_name().to_string(),
                    None,
                    None,
                ),
            },
        };

        conversations.push(Conversation {
            id: key,
            peer_role,
            peer_name,
            peer_id,
            unread_count: group.iter().filter(|m| m.is_unread).count(),
            last_message: last.content.clone(),
            last_created_at: last.created_at.clone(),
            last_timestamp: last.timestamp,
            peer_avatar_url,
        });
    }

    sort_for_display(&mut conversations);
    conversations
}

/// Unread-first (descending count), then recency. Conversations needing
/// attention surface at the top.
pub fn sort_for_display(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| {
        b.unread_count
            .cmp(&a.unread_count)
            .then_with(|| b.last_timestamp.cmp(&a.last_timestamp))
    });
}

/// Overlay drafts onto the server-derived list. A draft is shown only while
/// no server conversation with the same id exists; server truth wins on
/// collision. Draft lifecycle (removal once its first message is confirmed)
/// is the reconciler's job, not this function's.
pub fn merge_drafts(
    server_conversations: Vec<Conversation>,
    drafts: &[Conversation],
) -> Vec<Conversation> {
    let mut merged = server_conversations;
    for draft in drafts {
        if !merged.iter().any(|c| c.id == draft.id) {
            merged.push(draft.clone());
        }
    }
    sort_for_display(&mut merged);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::RawMessage;
    use crate::normalize::normalize;
    use serde_json::json;

    fn msg(value: serde_json::Value) -> NormalizedMessage {
        let raw: RawMessage = serde_json::from_value(value).unwrap();
        normalize(&raw)
    }

    #[test]
    fn two_sided_exchange_lands_in_one_conversation() {
        // Worked example from the messaging page: student writes in, the
        // counselor replies, both key to student-7.
        let messages = vec![
            msg(json!({
                "id": 1, "sender": "student", "user_id": 7, "content": "hi",
                "created_at": "2024-03-01T10:00:00Z", "is_read": false
            })),
            msg(json!({
                "id": 2, "sender": "counselor", "sender_id": 9,
                "recipient_role": "student", "recipient_id": 7, "content": "hello",
                "created_at": "2024-03-01T10:05:00Z", "is_read": true
            })),
        ];
        let conversations = build_conversations(&messages, "9");
        assert_eq!(conversations.len(), 1);
        let c = &conversations[0];
        assert_eq!(c.id, "student-7");
        assert_eq!(c.peer_role, "student");
        assert_eq!(c.peer_id.as_deref(), Some("7"));
        assert_eq!(c.last_message, "hello");
        assert_eq!(c.unread_count, 1);
    }

    #[test]
    fn peer_falls_back_to_recipient_of_own_last_message() {
        let messages = vec![msg(json!({
            "id": 3, "sender": "counselor", "sender_id": "9",
            "recipient_role": "guest", "recipient_id": "g2", "content": "welcome",
            "created_at": "2024-03-01T09:00:00Z", "is_read": true
        }))];
        let conversations = build_conversations(&messages, "9");
        assert_eq!(conversations.len(), 1);
        let c = &conversations[0];
        assert_eq!(c.peer_role, "guest");
        assert_eq!(c.peer_name, "Guest");
        assert_eq!(c.peer_id.as_deref(), Some("g2"));
    }

    #[test]
    fn system_messages_never_become_the_peer() {
        let messages = vec![
            msg(json!({
                "id": 1, "sender": "system", "user_id": 7, "content": "intake received",
                "created_at": "2024-03-01T08:00:00Z", "is_read": true
            })),
            msg(json!({
                "id": 2, "sender": "student", "user_id": 7, "sender_id": 7,
                "sender_name": "Ana", "content": "thanks",
                "created_at": "2024-03-01T08:30:00Z", "is_read": true
            })),
        ];
        let conversations = build_conversations(&messages, "9");
        assert_eq!(conversations[0].peer_name, "Ana");
        assert_eq!(conversations[0].peer_role, "student");
    }

    #[test]
    fn unread_conversations_sort_before_read_ones() {
        let messages = vec![
            msg(json!({
                "id": 1, "sender": "student", "user_id": 1, "content": "old but unread",
                "created_at": "2024-03-01T08:00:00Z", "is_read": false
            })),
            msg(json!({
                "id": 2, "sender": "student", "user_id": 2, "content": "newer but read",
                "created_at": "2024-03-02T08:00:00Z", "is_read": true
            })),
        ];
        let conversations = build_conversations(&messages, "9");
        assert_eq!(conversations[0].id, "student-1");
        // No zero-unread conversation ahead of one with unread messages.
        let first_zero = conversations.iter().position(|c| c.unread_count == 0);
        let last_unread = conversations.iter().rposition(|c| c.unread_count > 0);
        if let (Some(zero), Some(unread)) = (first_zero, last_unread) {
            assert!(unread < zero);
        }
    }

    #[test]
    fn build_is_idempotent() {
        let messages = vec![
            msg(json!({
                "id": 5, "sender": "student", "user_id": 3, "content": "a",
                "created_at": "2024-03-01T08:00:00Z", "is_read": false
            })),
            msg(json!({
                "id": 4, "sender": "counselor", "sender_id": 9,
                "recipient_role": "student", "recipient_id": 3, "content": "b",
                "created_at": "2024-03-01T09:00:00Z", "is_read": true
            })),
        ];
        assert_eq!(build_conversations(&messages, "9"), build_conversations(&messages, "9"));
    }

    #[test]
    fn colliding_timestamps_break_ties_by_id() {
        let messages = vec![
            msg(json!({
                "id": 20, "sender": "student", "user_id": 3, "content": "second",
                "created_at": "2024-03-01T08:00:00Z", "is_read": true
            })),
            msg(json!({
                "id": 10, "sender": "student", "user_id": 3, "content": "first",
                "created_at": "2024-03-01T08:00:00Z", "is_read": true
            })),
        ];
        let conversations = build_conversations(&messages, "9");
        // "10" < "20" as strings, so id 20 is the last message.
        assert_eq!(conversations[0].last_message, "second");
    }

    #[test]
    fn draft_hidden_once_server_conversation_exists() {
        let server = build_conversations(
            &[msg(json!({
                "id": 1, "sender": "student", "user_id": 7, "content": "hi",
                "created_at": "2024-03-01T08:00:00Z", "is_read": true
            }))],
            "9",
        );
        let draft = Conversation::draft(
            "student-7".into(),
            "student".into(),
            "Ana".into(),
            Some("7".into()),
            None,
            100,
        );
        let merged = merge_drafts(server.clone(), &[draft.clone()]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].last_message, "hi");

        let other_draft = Conversation::draft(
            "guest-g1".into(),
            "guest".into(),
            "Guest".into(),
            Some("g1".into()),
            None,
            100,
        );
        let merged = merge_drafts(server, &[other_draft]);
        assert_eq!(merged.len(), 2);
    }
}
