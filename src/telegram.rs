//! # telegram — Telegram Bot API client
//!
//! Outbound: `sendMessage` for alerts and command replies (the [`Notifier`]
//! seam). Inbound: `getUpdates` for the command phase. Both are plain HTTPS
//! POSTs with JSON bodies.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::AppError;

/// Delivers one text message to one chat.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, chat_id: &str, text: &str) -> Result<(), AppError>;
}

// ─── Update payloads ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok:          bool,
    result:      Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message:   Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

impl Message {
    /// Sender id, falling back to the chat id for channel posts.
    pub fn sender_id(&self) -> i64 {
        self.from.as_ref().map(|u| u.id).unwrap_or(self.chat.id)
    }
}

// ─── TelegramClient ───────────────────────────────────────────────────────────

pub struct TelegramClient {
    client:   reqwest::Client,
    api_base: String,
    token:    String,
}

impl TelegramClient {
    pub fn new(api_base: &str, token: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.token)
    }

    /// Pending updates after `offset` (exclusive). Never long-polls: a batch
    /// run takes what is queued and moves on.
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, AppError> {
        let mut params = json!({
            "timeout": 0,
            "allowed_updates": ["message"],
        });
        if let Some(last) = offset {
            params["offset"] = json!(last + 1);
        }

        let response = self
            .client
            .post(self.method_url("getUpdates"))
            .json(&params)
            .send()
            .await
            .map_err(|e| AppError::Notification(format!("getUpdates unreachable: {e}")))?;

        let body: ApiResponse<Vec<Update>> = response
            .json()
            .await
            .map_err(|e| AppError::Notification(format!("getUpdates parse error: {e}")))?;

        if !body.ok {
            return Err(AppError::Notification(format!(
                "getUpdates rejected: {}",
                body.description.unwrap_or_default()
            )));
        }
        Ok(body.result.unwrap_or_default())
    }
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn send(&self, chat_id: &str, text: &str) -> Result<(), AppError> {
        let params = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });

        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&params)
            .send()
            .await
            .map_err(|e| AppError::Notification(format!("Telegram unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Notification(format!("Telegram HTTP {status}: {body}")));
        }

        debug!(chat_id, "Message delivered");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use mockito::Matcher;
    use std::sync::Mutex;

    /// Notifier that keeps every message instead of sending it. Chats listed
    /// in `failing` get a `Notification` error.
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub(crate) sent:    Mutex<Vec<(String, String)>>,
        pub(crate) failing: Vec<String>,
    }

    impl RecordingNotifier {
        pub(crate) fn failing_for(chat_id: &str) -> Self {
            Self {
                sent:    Mutex::new(Vec::new()),
                failing: vec![chat_id.to_string()],
            }
        }

        pub(crate) fn messages(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, chat_id: &str, text: &str) -> Result<(), AppError> {
            if self.failing.iter().any(|c| c == chat_id) {
                return Err(AppError::Notification("chat unavailable".into()));
            }
            self.sent.lock().unwrap().push((chat_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    fn client(server: &mockito::ServerGuard) -> TelegramClient {
        TelegramClient::new(&server.url(), "TOKEN", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_send_posts_html_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botTOKEN/sendMessage")
            .match_body(Matcher::PartialJson(json!({
                "chat_id": "42",
                "text": "<b>hi</b>",
                "parse_mode": "HTML",
            })))
            .with_status(200)
            .with_body(r#"{"ok":true,"result":{}}"#)
            .create_async()
            .await;

        client(&server).send("42", "<b>hi</b>").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_failure_is_notification_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/botTOKEN/sendMessage")
            .with_status(400)
            .with_body(r#"{"ok":false,"description":"Bad Request: chat not found"}"#)
            .create_async()
            .await;

        let err = client(&server).send("42", "x").await.unwrap_err();
        assert!(matches!(err, AppError::Notification(ref msg) if msg.contains("chat not found")));
    }

    #[tokio::test]
    async fn test_send_unreachable_returns_error() {
        let telegram = TelegramClient::new("http://127.0.0.1:9", "TOKEN", Duration::from_secs(2)).unwrap();
        let err = telegram.send("42", "x").await.unwrap_err();
        assert!(matches!(err, AppError::Notification(ref msg) if msg.starts_with("Telegram unreachable")));
    }

    #[tokio::test]
    async fn test_get_updates_sends_next_offset() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botTOKEN/getUpdates")
            .match_body(Matcher::PartialJson(json!({ "offset": 101 })))
            .with_status(200)
            .with_body(
                r#"{"ok":true,"result":[
                    {"update_id":101,"message":{"message_id":1,"from":{"id":7,"is_bot":false},"chat":{"id":7},"date":0,"text":"help"}},
                    {"update_id":102,"edited_message":{"message_id":1}}
                ]}"#,
            )
            .create_async()
            .await;

        let updates = client(&server).get_updates(Some(100)).await.unwrap();
        mock.assert_async().await;

        assert_eq!(updates.len(), 2);
        let msg = updates[0].message.as_ref().unwrap();
        assert_eq!(msg.sender_id(), 7);
        assert_eq!(msg.text.as_deref(), Some("help"));
        assert!(updates[1].message.is_none());
    }
}
