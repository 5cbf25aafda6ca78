//! Telegram Bot API notification channel.
//!
//! Text goes through `sendMessage`. Messages with an attachment use `sendPhoto`
//! for images and `sendDocument` otherwise, with the text as the caption.
//! A 429 is reported with the `parameters.retry_after` hint from the body.

use async_trait::async_trait;
use reqwest::{Client, multipart};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::NotificationChannel;
use crate::notification::message::{Attachment, NotificationMessage};
use crate::{Error, Result};

/// Telegram `sendMessage` text limit (UTF-8 characters).
const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Telegram media caption limit.
const TELEGRAM_CAPTION_LIMIT: usize = 1024;

/// Telegram channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Stable channel instance identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Optional display name for this channel instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Whether the channel is enabled.
    pub enabled: bool,
    /// Telegram Bot API token.
    pub bot_token: String,
    /// Target chat ID (user, group, or channel).
    pub chat_id: String,
    /// Bot API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            id: None,
            name: None,
            enabled: false,
            bot_token: String::new(),
            chat_id: String::new(),
            api_base: default_api_base(),
        }
    }
}

/// Telegram notification channel.
pub struct TelegramChannel {
    config: TelegramConfig,
    client: Client,
}

impl TelegramChannel {
    /// Create a new Telegram channel.
    pub fn new(config: TelegramConfig, client: Client) -> Self {
        Self { config, client }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }

    /// Build the message text. Plain text, so no escaping is needed.
    fn build_message(&self, message: &NotificationMessage, limit: usize) -> String {
        let text = format!("{}\n{}", message.title, message.text);
        truncate_message(&text, limit)
    }

    async fn send_text(&self, message: &NotificationMessage) -> Result<reqwest::Response> {
        let payload = json!({
            "chat_id": self.config.chat_id,
            "text": self.build_message(message, TELEGRAM_MESSAGE_LIMIT),
            "disable_web_page_preview": false,
        });
        Ok(self
            .client
            .post(self.method_url("sendMessage"))
            .json(&payload)
            .send()
            .await?)
    }

    async fn send_media(
        &self,
        message: &NotificationMessage,
        attachment: &Attachment,
    ) -> Result<reqwest::Response> {
        let (method, field) = if attachment.is_image() {
            ("sendPhoto", "photo")
        } else {
            ("sendDocument", "document")
        };

        let part = multipart::Part::bytes(attachment.bytes.to_vec())
            .file_name(attachment.file_name.clone())
            .mime_str(&attachment.content_type)?;
        let form = multipart::Form::new()
            .text("chat_id", self.config.chat_id.clone())
            .text("caption", self.build_message(message, TELEGRAM_CAPTION_LIMIT))
            .part(field, part);

        Ok(self
            .client
            .post(self.method_url(method))
            .multipart(form)
            .send()
            .await?)
    }

    async fn check_response(response: reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        if status.as_u16() == 429 {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            let retry_after = body
                .get("parameters")
                .and_then(|p| p.get("retry_after"))
                .and_then(|v| v.as_u64());
            warn!(retry_after = ?retry_after, "Telegram rate limited");
            return Err(Error::channel_send(
                "telegram",
                format!("rate limited (retry after {retry_after:?}s)"),
            ));
        }

        let body = response.text().await.unwrap_or_default();
        warn!("Telegram request failed: {} - {}", status, body);
        Err(Error::channel_send(
            "telegram",
            format!("request failed: {status} - {body}"),
        ))
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn channel_type(&self) -> &'static str {
        "telegram"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.bot_token.is_empty() && !self.config.chat_id.is_empty()
    }

    async fn send(&self, message: &NotificationMessage) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let response = match &message.attachment {
            Some(attachment) => self.send_media(message, attachment).await,
            None => self.send_text(message).await,
        }
        .map_err(|e| Error::channel_send("telegram", e.to_string()))?;
        Self::check_response(response).await?;

        debug!(
            event_id = %message.event_id,
            serial = message.serial,
            kind = %message.kind,
            "Telegram notification sent"
        );
        Ok(())
    }
}

/// Truncate a message to fit within a Telegram character limit.
fn truncate_message(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let suffix = "\n\n[truncated]";
    let budget = limit - suffix.chars().count();
    let truncated: String = text.chars().take(budget).collect();
    format!("{truncated}{suffix}")
}
