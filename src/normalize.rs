use crate::api::models::RawMessage;
use chrono::{DateTime, NaiveDateTime};
use std::fmt;
use uuid::Uuid;

/// Sender role after normalization. Anything the backend sends that is not
/// exactly one of the known tags collapses to `System`: an unknown tag must
/// never be promoted to a privileged role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SenderRole {
    Student,
    Guest,
    Counselor,
    System,
}

impl SenderRole {
    pub fn parse(tag: Option<&str>) -> Self {
        match tag {
            Some("student") => SenderRole::Student,
            Some("guest") => SenderRole::Guest,
            Some("counselor") => SenderRole::Counselor,
            _ => SenderRole::System,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SenderRole::Student => "student",
            SenderRole::Guest => "guest",
            SenderRole::Counselor => "counselor",
            SenderRole::System => "system",
        }
    }

    pub fn placeholder_name(self) -> &'static str {
        match self {
            SenderRole::Student => "Student",
            SenderRole::Guest => "Guest",
            SenderRole::Counselor => "Counselor",
            SenderRole::System => "Guidance & Counseling Office",
        }
    }
}

/// Message identity: numeric ids come from the server, string ids are
/// generated locally for optimistic messages. Immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageId {
    Server(i64),
    Local(String),
}

impl MessageId {
    pub fn new_local() -> Self {
        MessageId::Local(Uuid::new_v4().to_string())
    }

    pub fn as_server(&self) -> Option<i64> {
        match self {
            MessageId::Server(id) => Some(*id),
            MessageId::Local(_) => None,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Server(id) => write!(f, "{}", id),
            MessageId::Local(id) => write!(f, "{}", id),
        }
    }
}

/// Canonical in-memory message. `is_unread` and `content` are the only fields
/// mutated after creation; everything else, including the conversation key,
/// is fixed at normalization time.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMessage {
    pub id: MessageId,
    pub conversation_key: String,
    pub sender_role: SenderRole,
    pub sender_name: String,
    pub content: String,
    pub created_at: String,
    /// Unix seconds parsed from `created_at`; 0 when unparseable. Used for
    /// ordering only, never shown.
    pub timestamp: i64,
    pub is_unread: bool,
    pub sender_id: Option<String>,
    pub recipient_id: Option<String>,
    pub recipient_role: Option<String>,
    pub sender_avatar_url: Option<String>,
    pub recipient_avatar_url: Option<String>,
}

/// Convert a raw backend record into its canonical form. Total: unrecognized
/// fields default safely, nothing here can fail.
pub fn normalize(raw: &RawMessage) -> NormalizedMessage {
    let sender_role = SenderRole::parse(raw.sender.as_deref());

    let sender_name = raw
        .sender_name
        .clone()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| raw.sender_user.as_ref().and_then(|p| p.name.clone()))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| sender_role.placeholder_name().to_string());

    // Flat avatar field first, then the nested sender sub-object.
    let sender_avatar_url = raw
        .avatar
        .clone()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| raw.sender_user.as_ref().and_then(|p| p.avatar.clone()))
        .filter(|s| !s.trim().is_empty());

    let recipient_avatar_url = raw
        .recipient_user
        .as_ref()
        .and_then(|p| p.avatar.clone())
        .filter(|s| !s.trim().is_empty());

    let created_at = raw.created_at.clone().unwrap_or_default();

    NormalizedMessage {
        id: raw.id.map(MessageId::Server).unwrap_or_else(MessageId::new_local),
        conversation_key: derive_conversation_key(raw),
        sender_role,
        sender_name,
        content: raw.content.clone().unwrap_or_default(),
        timestamp: parse_timestamp(&created_at),
        created_at,
        is_unread: raw.is_read.map(|read| !read).unwrap_or(false),
        sender_id: raw.sender_id.clone(),
        recipient_id: raw.recipient_id.clone(),
        recipient_role: raw.recipient_role.clone(),
        sender_avatar_url,
        recipient_avatar_url,
    }
}

/// Derive the conversation key from a single raw record. The backend does not
/// always supply a conversation id, so the key must be reconstructible
/// identically from either side of a two-party exchange. Ordered rules, first
/// match wins; the ordering is load-bearing and must not be rearranged.
pub fn derive_conversation_key(raw: &RawMessage) -> String {
    // 1. Explicit conversation id wins verbatim.
    if let Some(cid) = raw.conversation_id.as_deref() {
        if !cid.trim().is_empty() {
            return cid.to_string();
        }
    }

    let sender_role = SenderRole::parse(raw.sender.as_deref());
    let recipient_role = raw.recipient_role.as_deref();

    // 2. Student/guest sender with an owning user id.
    if matches!(sender_role, SenderRole::Student | SenderRole::Guest) {
        if let Some(user_id) = raw.user_id.as_deref() {
            return format!("{}-{}", sender_role.as_str(), user_id);
        }
    }

    // 3. Recognized recipient role + id.
    if let (Some(role), Some(id)) = (recipient_role, raw.recipient_id.as_deref()) {
        if matches!(role, "student" | "guest" | "admin") {
            return format!("{}-{}", role, id);
        }
    }

    // 4. Owning user id alone: unattributed-but-user-scoped messages are
    //    assumed to belong to a student thread.
    if let Some(user_id) = raw.user_id.as_deref() {
        return format!("student-{}", user_id);
    }

    // 5. Counselor-to-counselor: join both sub-keys lexicographically so both
    //    directions of the exchange land in the same conversation.
    if sender_role == SenderRole::Counselor && recipient_role == Some("counselor") {
        if let (Some(sender_id), Some(recipient_id)) =
            (raw.sender_id.as_deref(), raw.recipient_id.as_deref())
        {
            let a = format!("counselor-{}", sender_id);
            let b = format!("counselor-{}", recipient_id);
            return if a <= b {
                format!("{}__{}", a, b)
            } else {
                format!("{}__{}", b, a)
            };
        }
    }

    // 6. A lone counselor on either end.
    if sender_role == SenderRole::Counselor {
        if let Some(sender_id) = raw.sender_id.as_deref() {
            return format!("counselor-{}", sender_id);
        }
    }
    if recipient_role == Some("counselor") {
        if let Some(recipient_id) = raw.recipient_id.as_deref() {
            return format!("counselor-{}", recipient_id);
        }
    }

    // 7. Nothing usable on the record.
    "general".to_string()
}

/// Best-effort timestamp parse across the formats the backend has used.
/// Failure degrades to 0 rather than erroring; ordering among unparseable
/// timestamps then falls back to the id tiebreak.
pub fn parse_timestamp(text: &str) -> i64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return dt.timestamp();
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return naive.and_utc().timestamp();
        }
    }
    // Bare unix timestamps, in seconds or milliseconds.
    if let Ok(n) = trimmed.parse::<i64>() {
        return if n > 10_000_000_000 { n / 1000 } else { n };
    }
    0
}
