use crate::api::error::{ApiError, Result};
use crate::api::models::{
    DirectoryUser, MESSAGE_ENVELOPE_KEYS, OutgoingMessage, RawMessage, USER_ENVELOPE_KEYS,
    extract_list, unwrap_record,
};
use log::{debug, warn};
use reqwest::Client as HttpClient;
use serde_json::Value;

pub struct ApiClient {
    http: HttpClient,
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiClient {
    pub fn new() -> Self {
        Self { http: HttpClient::new() }
    }

    fn base_api(base_url: &str) -> String {
        let trimmed = base_url.trim_end_matches('/');
        if trimmed.ends_with("/api") { trimmed.to_string() } else { format!("{}/api", trimmed) }
    }

    fn with_auth(req: reqwest::RequestBuilder, token: Option<&str>) -> reqwest::RequestBuilder {
        match token {
            Some(t) => req.header("Authorization", format!("Bearer {}", t)),
            None => req,
        }
    }

    /// Try to reach the portal backend using common ping endpoints. Used by
    /// hosts to validate a configured base URL before opening the inbox.
    pub async fn ping(&self, base_url: &str, token: Option<&str>) -> Result<u16> {
        let base_api = Self::base_api(base_url);
        let candidates = [
            format!("{}/ping", base_api),
            format!("{}/health", base_api),
            base_url.trim_end_matches('/').to_string(),
        ];
        let mut last_err: Option<ApiError> = None;
        for endpoint in candidates {
            let req = Self::with_auth(self.http.get(&endpoint), token);
            match req.send().await {
                Ok(resp) => return Ok(resp.status().as_u16()),
                Err(e) => {
                    debug!("ping candidate {} failed: {}", endpoint, e);
                    last_err = Some(e.into());
                }
            }
        }
        Err(ApiError::Exhausted(
            last_err.map(|e| e.to_string()).unwrap_or_else(|| "no candidates".into()),
        ))
    }

    /// Fetch the flat message list. The response may be a bare array or
    /// wrapped in a `messages`/`data` envelope; records that do not parse are
    /// skipped, not fatal.
    pub async fn fetch_messages(
        &self,
        base_url: &str,
        token: Option<&str>,
    ) -> Result<Vec<RawMessage>> {
        let endpoint = format!("{}/messages", Self::base_api(base_url));
        let resp = Self::with_auth(self.http.get(&endpoint), token).send().await?;
        if !resp.status().is_success() {
            return Err(ApiError::Status(resp.status().as_u16()));
        }
        let json: Value = resp.json().await?;
        let items = extract_list(&json, MESSAGE_ENVELOPE_KEYS);
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<RawMessage>(item) {
                Ok(raw) => out.push(raw),
                Err(e) => warn!("skipping unparseable message record: {}", e),
            }
        }
        Ok(out)
    }

    /// Send a message; returns the created record as the server sees it.
    pub async fn send_message(
        &self,
        base_url: &str,
        token: Option<&str>,
        outgoing: &OutgoingMessage,
    ) -> Result<RawMessage> {
        let endpoint = format!("{}/messages", Self::base_api(base_url));
        let resp = Self::with_auth(self.http.post(&endpoint), token).json(outgoing).send().await?;
        if !resp.status().is_success() {
            return Err(ApiError::Status(resp.status().as_u16()));
        }
        let json: Value = resp.json().await?;
        serde_json::from_value(unwrap_record(json)).map_err(|e| ApiError::Shape(e.to_string()))
    }

    /// Update a message's content. PATCH is attempted first; some deployments
    /// only accept PUT, so that is the fallback.
    pub async fn update_message(
        &self,
        base_url: &str,
        token: Option<&str>,
        id: i64,
        content: &str,
    ) -> Result<()> {
        let endpoint = format!("{}/messages/{}", Self::base_api(base_url), id);
        let body = serde_json::json!({ "content": content });

        match Self::with_auth(self.http.patch(&endpoint), token).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            Ok(resp) => debug!("PATCH {} returned {}, retrying as PUT", endpoint, resp.status()),
            Err(e) => debug!("PATCH {} failed ({}), retrying as PUT", endpoint, e),
        }

        let resp = Self::with_auth(self.http.put(&endpoint), token).json(&body).send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ApiError::Status(resp.status().as_u16()))
        }
    }

    /// Candidate URL shapes for deleting a single message, in probe order.
    pub fn delete_message_candidates(base_url: &str, id: i64) -> Vec<String> {
        let base_api = Self::base_api(base_url);
        vec![
            format!("{}/messages/{}", base_api, id),
            format!("{}/message/{}", base_api, id),
            format!("{}/messages/delete/{}", base_api, id),
        ]
    }

    /// Candidate URL shapes for deleting a whole conversation, in probe order.
    pub fn delete_conversation_candidates(base_url: &str, conversation_key: &str) -> Vec<String> {
        let base_api = Self::base_api(base_url);
        vec![
            format!("{}/conversations/{}", base_api, conversation_key),
            format!("{}/messages/conversation/{}", base_api, conversation_key),
            format!("{}/conversation/{}", base_api, conversation_key),
        ]
    }

    pub async fn delete_message(&self, base_url: &str, token: Option<&str>, id: i64) -> Result<()> {
        self.probe_delete(Self::delete_message_candidates(base_url, id), token).await
    }

    pub async fn delete_conversation(
        &self,
        base_url: &str,
        token: Option<&str>,
        conversation_key: &str,
    ) -> Result<()> {
        self.probe_delete(Self::delete_conversation_candidates(base_url, conversation_key), token)
            .await
    }

    // Ordered-candidate DELETE: 404/405 means the deployment does not expose
    // that URL shape, so the next candidate is tried. Any other response ends
    // the probe. Exhaustion surfaces the last error seen.
    async fn probe_delete(&self, candidates: Vec<String>, token: Option<&str>) -> Result<()> {
        let mut last_err: Option<ApiError> = None;
        for endpoint in candidates {
            match Self::with_auth(self.http.delete(&endpoint), token).send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if resp.status().is_success() {
                        return Ok(());
                    }
                    if status == 404 || status == 405 {
                        debug!("DELETE {} returned {}, trying next candidate", endpoint, status);
                        last_err = Some(ApiError::Status(status));
                        continue;
                    }
                    return Err(ApiError::Status(status));
                }
                Err(e) => {
                    debug!("DELETE {} failed: {}", endpoint, e);
                    last_err = Some(e.into());
                }
            }
        }
        Err(ApiError::Exhausted(
            last_err.map(|e| e.to_string()).unwrap_or_else(|| "no candidates".into()),
        ))
    }

    /// Mark a batch of server-side messages as read. The backend exposes this
    /// as a GET with a comma-joined ids parameter.
    pub async fn mark_read(&self, base_url: &str, token: Option<&str>, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let joined = ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",");
        let endpoint = format!("{}/messages/mark-read?ids={}", Self::base_api(base_url), joined);
        let resp = Self::with_auth(self.http.get(&endpoint), token).send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ApiError::Status(resp.status().as_u16()))
        }
    }

    /// Search the user directory by role and free-text query. The list comes
    /// back in one of several known envelope shapes.
    pub async fn search_users(
        &self,
        base_url: &str,
        token: Option<&str>,
        role: &str,
        query: &str,
    ) -> Result<Vec<DirectoryUser>> {
        let endpoint =
            format!("{}/users/search?{}", Self::base_api(base_url), search_query(role, query));
        let resp = Self::with_auth(self.http.get(&endpoint), token).send().await?;
        if !resp.status().is_success() {
            return Err(ApiError::Status(resp.status().as_u16()));
        }
        let json: Value = resp.json().await?;
        let items = extract_list(&json, USER_ENVELOPE_KEYS);
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<DirectoryUser>(item) {
                Ok(user) => out.push(user),
                Err(e) => warn!("skipping unparseable directory record: {}", e),
            }
        }
        Ok(out)
    }
}

// Query string for the directory search endpoint; the free-text part needs
// escaping.
fn search_query(role: &str, query: &str) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .append_pair("role", role)
        .append_pair("q", query)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_api_appends_once() {
        assert_eq!(ApiClient::base_api("https://h"), "https://h/api");
        assert_eq!(ApiClient::base_api("https://h/api/"), "https://h/api");
    }

    #[test]
    fn delete_candidates_are_ordered() {
        let candidates = ApiClient::delete_message_candidates("https://h", 5);
        assert_eq!(
            candidates,
            vec![
                "https://h/api/messages/5",
                "https://h/api/message/5",
                "https://h/api/messages/delete/5",
            ]
        );
        let candidates = ApiClient::delete_conversation_candidates("https://h", "student-7");
        assert_eq!(candidates[0], "https://h/api/conversations/student-7");
        assert_eq!(candidates.len(), 3);
    }

    #[test]
    fn search_query_escapes_free_text() {
        assert_eq!(search_query("student", "ana cruz"), "role=student&q=ana+cruz");
        assert_eq!(search_query("guest", "a&b=c"), "role=guest&q=a%26b%3Dc");
    }

    #[tokio::test]
    async fn probing_surfaces_last_error_when_unreachable() {
        // Nothing listens here; every candidate fails and the last error is
        // surfaced as Exhausted.
        let client = ApiClient::new();
        let result = client.delete_message("http://127.0.0.1:9", None, 1).await;
        assert!(matches!(result, Err(ApiError::Exhausted(_))));
    }
}
