//! REST boundary: wire DTOs plus the `MessagingApi` trait the engine core is
//! programmed against. `HttpMessagingApi` is the production implementation;
//! tests substitute their own.
//!
//! The backend (and the broadcast transport, which reuses the same message
//! shape) is not consistent about field spellings or scalar encodings, so the
//! DTOs here are deliberately tolerant: ids may be numbers or strings,
//! timestamps may be epoch seconds or datetime strings, and the sender id can
//! live under several names. Normalization into engine types happens once, in
//! `core::identity`, never at call sites.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ApiError;
use crate::state::ImageAttachment;

/// Bearer credential source, injected by the shell. The engine never reads
/// ambient token storage; auth acquisition/refresh is the shell's problem.
#[uniffi::export(callback_interface)]
pub trait TokenProvider: Send + Sync + 'static {
    fn bearer_token(&self) -> Option<String>;
}

fn de_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdRepr {
        Num(i64),
        Str(String),
    }
    Ok(match IdRepr::deserialize(d)? {
        IdRepr::Num(n) => n.to_string(),
        IdRepr::Str(s) => s,
    })
}

fn de_opt_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdRepr {
        Num(i64),
        Str(String),
    }
    Ok(Option::<IdRepr>::deserialize(d)?.map(|v| match v {
        IdRepr::Num(n) => n.to_string(),
        IdRepr::Str(s) => s,
    }))
}

fn parse_datetime(s: &str) -> Option<i64> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc().timestamp())
}

fn de_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TsRepr {
        Num(i64),
        Str(String),
    }
    match TsRepr::deserialize(d)? {
        TsRepr::Num(n) => Ok(n),
        TsRepr::Str(s) => {
            parse_datetime(&s).ok_or_else(|| serde::de::Error::custom(format!("bad timestamp: {s}")))
        }
    }
}

fn de_opt_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TsRepr {
        Num(i64),
        Str(String),
    }
    match Option::<TsRepr>::deserialize(d)? {
        None => Ok(None),
        Some(TsRepr::Num(n)) => Ok(Some(n)),
        Some(TsRepr::Str(s)) => Ok(parse_datetime(&s)),
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderRef {
    pub id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub conversation_id: Option<String>,
    // Sender id shapes observed in the wild; probed in priority order by
    // `core::identity::resolved_sender_id`.
    #[serde(default)]
    pub sender_id: Option<i64>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub sender: Option<SenderRef>,
    #[serde(default)]
    pub from: Option<SenderRef>,
    #[serde(default)]
    pub actual_sender_id: Option<i64>,
    #[serde(default)]
    pub sender_role: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(deserialize_with = "de_timestamp")]
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OtherUserRecord {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image: Option<String>,
}

impl OtherUserRecord {
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            return name.to_string();
        }
        let joined = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or(""),
            self.last_name.as_deref().unwrap_or("")
        );
        let joined = joined.trim();
        if joined.is_empty() {
            "Unknown".to_string()
        } else {
            joined.to_string()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyRecord {
    pub id: Option<i64>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub other_user: Option<OtherUserRecord>,
    #[serde(default)]
    pub property: Option<PropertyRecord>,
    #[serde(default)]
    pub last_message: Option<MessageRecord>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub last_message_at: Option<i64>,
    #[serde(default)]
    pub unread_count: u32,
}

#[async_trait]
pub trait MessagingApi: Send + Sync + 'static {
    async fn list_conversations(&self) -> Result<Vec<ConversationRecord>, ApiError>;
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<MessageRecord>, ApiError>;
    async fn send_message(
        &self,
        conversation_id: &str,
        text: Option<String>,
        image: Option<ImageAttachment>,
    ) -> Result<MessageRecord, ApiError>;
    async fn start_conversation(
        &self,
        recipient_id: i64,
        property_id: Option<i64>,
    ) -> Result<ConversationRecord, ApiError>;
}

/// Responses may arrive bare or wrapped in a `{ "data": ... }` envelope.
fn unwrap_data(v: serde_json::Value) -> serde_json::Value {
    match v {
        serde_json::Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(serde_json::Value::Null)
        }
        other => other,
    }
}

pub struct HttpMessagingApi {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpMessagingApi {
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn authed(&self, rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.tokens.bearer_token() {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    async fn read_json(resp: reqwest::Response) -> Result<serde_json::Value, ApiError> {
        let status = resp.status();
        if status.as_u16() == 401 {
            return Err(ApiError::Unauthorized);
        }
        if status.as_u16() == 403 {
            return Err(ApiError::Forbidden);
        }
        if !status.is_success() {
            let message = resp
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str().map(String::from)))
                .unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }
        resp.json::<serde_json::Value>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    fn decode<T: serde::de::DeserializeOwned>(v: serde_json::Value) -> Result<T, ApiError> {
        serde_json::from_value(unwrap_data(v)).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Network(e.to_string())
    }
}

#[async_trait]
impl MessagingApi for HttpMessagingApi {
    async fn list_conversations(&self) -> Result<Vec<ConversationRecord>, ApiError> {
        let resp = self.authed(self.http.get(self.url("conversations"))).send().await?;
        Self::decode(Self::read_json(resp).await?)
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<MessageRecord>, ApiError> {
        let resp = self
            .authed(
                self.http
                    .get(self.url(&format!("conversations/{conversation_id}/messages"))),
            )
            .send()
            .await?;
        Self::decode(Self::read_json(resp).await?)
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        text: Option<String>,
        image: Option<ImageAttachment>,
    ) -> Result<MessageRecord, ApiError> {
        let rb = self
            .authed(
                self.http
                    .post(self.url(&format!("conversations/{conversation_id}/messages"))),
            );
        let rb = match image {
            Some(image) => {
                // Multipart only when an image rides along; text-only sends
                // stay plain JSON.
                let part = reqwest::multipart::Part::bytes(image.bytes)
                    .file_name(image.filename)
                    .mime_str(&image.mime_type)
                    .map_err(|e| ApiError::Network(e.to_string()))?;
                let mut form = reqwest::multipart::Form::new().part("image", part);
                if let Some(text) = text {
                    form = form.text("text", text);
                }
                rb.multipart(form)
            }
            None => rb.json(&serde_json::json!({ "text": text })),
        };
        let resp = rb.send().await?;
        Self::decode(Self::read_json(resp).await?)
    }

    async fn start_conversation(
        &self,
        recipient_id: i64,
        property_id: Option<i64>,
    ) -> Result<ConversationRecord, ApiError> {
        let resp = self
            .authed(self.http.post(self.url("conversations")))
            .json(&serde_json::json!({
                "recipient_id": recipient_id,
                "property_id": property_id,
            }))
            .send()
            .await?;
        Self::decode(Self::read_json(resp).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_record_accepts_numeric_and_string_scalars() {
        let m: MessageRecord = serde_json::from_value(serde_json::json!({
            "id": 1042,
            "conversation_id": 7,
            "sender_id": 3,
            "text": "hi",
            "created_at": "2026-08-01T09:30:00Z",
        }))
        .unwrap();
        assert_eq!(m.id, "1042");
        assert_eq!(m.conversation_id.as_deref(), Some("7"));
        assert_eq!(m.created_at, 1_785_576_600);

        let m: MessageRecord = serde_json::from_value(serde_json::json!({
            "id": "m-100",
            "created_at": 1_700_000_000,
        }))
        .unwrap();
        assert_eq!(m.id, "m-100");
        assert_eq!(m.created_at, 1_700_000_000);
    }

    #[test]
    fn message_record_accepts_sql_datetime() {
        let m: MessageRecord = serde_json::from_value(serde_json::json!({
            "id": "m-1",
            "created_at": "2026-08-01 09:30:00",
        }))
        .unwrap();
        assert_eq!(m.created_at, 1_785_576_600);
    }

    #[test]
    fn conversation_record_tolerates_missing_denormalized_fields() {
        let c: ConversationRecord = serde_json::from_value(serde_json::json!({
            "id": 42,
            "other_user": { "first_name": "Avery", "last_name": "Stone" },
        }))
        .unwrap();
        assert_eq!(c.id, "42");
        assert_eq!(c.other_user.unwrap().display_name(), "Avery Stone");
        assert_eq!(c.last_message_at, None);
        assert_eq!(c.unread_count, 0);
    }

    #[test]
    fn data_envelope_is_unwrapped() {
        let v = serde_json::json!({ "data": [ { "id": 1, "created_at": 5 } ] });
        let list: Vec<MessageRecord> = HttpMessagingApi::decode(v).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, "1");
    }
}
