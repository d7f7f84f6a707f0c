use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Envelope keys the user-directory endpoint has been seen wrapping its list in.
pub const USER_ENVELOPE_KEYS: &[&str] = &["users", "data", "results", "items", "records"];

/// Envelope keys for the message-list endpoint.
pub const MESSAGE_ENVELOPE_KEYS: &[&str] = &["messages", "data"];

// Backend ids arrive sometimes as numbers, sometimes as numeric strings.
fn de_opt_string_or_number<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(de)?;
    Ok(value.and_then(|v| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }))
}

fn de_opt_i64<'de, D>(de: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(de)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

// Read flags arrive as booleans, 0/1 integers, or "0"/"1" strings.
fn de_opt_flag<'de, D>(de: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(de)?;
    Ok(value.and_then(|v| match v {
        Value::Bool(b) => Some(b),
        Value::Number(n) => Some(n.as_i64().unwrap_or(0) != 0),
        Value::String(s) => match s.trim() {
            "" => None,
            "0" | "false" => Some(false),
            _ => Some(true),
        },
        _ => None,
    }))
}

/// Nested sender/recipient sub-object carrying display name and avatar path.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawParty {
    #[serde(default, deserialize_with = "de_opt_string_or_number")]
    pub id: Option<String>,
    #[serde(default, alias = "full_name", alias = "display_name")]
    pub name: Option<String>,
    #[serde(default, alias = "avatar_url", alias = "profile_picture", alias = "photo")]
    pub avatar: Option<String>,
}

/// A message record as the backend returns it. Every field is optional; the
/// normalizer is the only consumer and defaults each one safely.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawMessage {
    #[serde(default, deserialize_with = "de_opt_i64")]
    pub id: Option<i64>,
    #[serde(default, alias = "sender_role")]
    pub sender: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string_or_number")]
    pub sender_id: Option<String>,
    /// Owning user id: the student/guest the thread is about, distinct from
    /// whoever sent this particular message.
    #[serde(default, deserialize_with = "de_opt_string_or_number")]
    pub user_id: Option<String>,
    #[serde(default, alias = "receiver_role")]
    pub recipient_role: Option<String>,
    #[serde(default, alias = "receiver_id", deserialize_with = "de_opt_string_or_number")]
    pub recipient_id: Option<String>,
    #[serde(default, alias = "message", alias = "body")]
    pub content: Option<String>,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<String>,
    #[serde(default, alias = "read", alias = "seen", deserialize_with = "de_opt_flag")]
    pub is_read: Option<bool>,
    #[serde(default, deserialize_with = "de_opt_string_or_number")]
    pub conversation_id: Option<String>,
    #[serde(default, alias = "senderName")]
    pub sender_name: Option<String>,
    #[serde(default, alias = "avatar_url")]
    pub avatar: Option<String>,
    #[serde(default, alias = "sender_info", alias = "user")]
    pub sender_user: Option<RawParty>,
    #[serde(default, alias = "recipient_info")]
    pub recipient_user: Option<RawParty>,
}

/// Body for the send-message endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingMessage {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
}

/// One entry from the user-directory search endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryUser {
    #[serde(default, deserialize_with = "de_opt_string_or_number")]
    pub id: Option<String>,
    #[serde(default, alias = "full_name", alias = "display_name")]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default, alias = "avatar_url", alias = "profile_picture")]
    pub avatar: Option<String>,
}

/// Pull a list out of a response that may be a bare array or wrapped in one of
/// several known envelope keys, tried in order.
pub fn extract_list(json: &Value, envelope_keys: &[&str]) -> Vec<Value> {
    if let Some(arr) = json.as_array() {
        return arr.clone();
    }
    for key in envelope_keys {
        if let Some(arr) = json.get(*key).and_then(|v| v.as_array()) {
            return arr.clone();
        }
    }
    Vec::new()
}

/// Unwrap a single created/updated record that may come back bare or under a
/// `data`/`message` envelope.
pub fn unwrap_record(json: Value) -> Value {
    for key in ["data", "message"] {
        if let Some(inner) = json.get(key) {
            if inner.is_object() {
                return inner.clone();
            }
        }
    }
    json
}
