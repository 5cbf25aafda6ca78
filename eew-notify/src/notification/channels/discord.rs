//! Discord webhook notification channel.
//!
//! Text goes out as a single embed. When the message carries an attachment the
//! request switches to multipart with the embed in `payload_json`.

use async_trait::async_trait;
use reqwest::{Client, multipart};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::{NotificationChannel, retry_after_secs};
use crate::notification::message::{MessageKind, NotificationMessage};
use crate::{Error, Result};

/// Discord limits an embed description to 4096 characters.
const EMBED_DESCRIPTION_LIMIT: usize = 4096;

/// Discord channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Stable channel instance identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Optional display name for this channel instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Whether the channel is enabled.
    pub enabled: bool,
    /// Discord webhook URL.
    pub webhook_url: String,
    /// Optional username for the webhook.
    #[serde(default = "default_username")]
    pub username: Option<String>,
    /// Optional avatar URL for the webhook.
    #[serde(default)]
    pub avatar_url: Option<String>,
}

fn default_username() -> Option<String> {
    Some("地震速報".to_string())
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            id: None,
            name: None,
            enabled: false,
            webhook_url: String::new(),
            username: default_username(),
            avatar_url: None,
        }
    }
}

/// Discord notification channel.
pub struct DiscordChannel {
    config: DiscordConfig,
    client: Client,
}

impl DiscordChannel {
    /// Create a new Discord channel.
    pub fn new(config: DiscordConfig, client: Client) -> Self {
        Self { config, client }
    }

    /// Get the embed color for a message kind.
    fn get_color(kind: MessageKind) -> u32 {
        match kind {
            MessageKind::Alert => 0xe74c3c,      // Red
            MessageKind::Update => 0xf39c12,     // Orange
            MessageKind::MapCaption => 0x3498db, // Blue
        }
    }

    /// Build the webhook payload for a message.
    fn build_payload(&self, message: &NotificationMessage) -> serde_json::Value {
        let description: String = message.text.chars().take(EMBED_DESCRIPTION_LIMIT).collect();
        let mut embed = json!({
            "title": message.title,
            "description": description,
            "color": Self::get_color(message.kind),
            "timestamp": message.timestamp.to_rfc3339(),
            "footer": {
                "text": format!("編號 {} | 第 {} 報", message.event_id, message.serial)
            }
        });

        if let Some(attachment) = message.attachment.as_ref().filter(|a| a.is_image()) {
            embed["image"] = json!({ "url": format!("attachment://{}", attachment.file_name) });
        }

        let mut payload = json!({
            "embeds": [embed]
        });

        if let Some(username) = &self.config.username {
            payload["username"] = json!(username);
        }
        if let Some(avatar_url) = &self.config.avatar_url {
            payload["avatar_url"] = json!(avatar_url);
        }

        payload
    }

    async fn post(&self, message: &NotificationMessage) -> Result<()> {
        let payload = self.build_payload(message);
        let request = self.client.post(&self.config.webhook_url);

        let request = match &message.attachment {
            Some(attachment) => {
                let part = multipart::Part::bytes(attachment.bytes.to_vec())
                    .file_name(attachment.file_name.clone())
                    .mime_str(&attachment.content_type)?;
                let form = multipart::Form::new()
                    .text("payload_json", payload.to_string())
                    .part("files[0]", part);
                request.multipart(form)
            }
            None => request.json(&payload),
        };

        let response = request
            .send()
            .await
            .map_err(|e| Error::channel_send("discord", format!("request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        if status.as_u16() == 429 {
            let retry_after = retry_after_secs(response.headers(), "Retry-After")
                .or_else(|| retry_after_secs(response.headers(), "X-RateLimit-Reset-After"));
            warn!(retry_after = ?retry_after, "Discord rate limited");
            return Err(Error::channel_send(
                "discord",
                format!("rate limited (retry after {retry_after:?}s)"),
            ));
        }

        let body = response.text().await.unwrap_or_default();
        warn!("Discord webhook failed: {} - {}", status, body);
        Err(Error::channel_send(
            "discord",
            format!("webhook failed: {status} - {body}"),
        ))
    }
}

#[async_trait]
impl NotificationChannel for DiscordChannel {
    fn channel_type(&self) -> &'static str {
        "discord"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.webhook_url.is_empty()
    }

    async fn send(&self, message: &NotificationMessage) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        self.post(message).await?;

        debug!(
            event_id = %message.event_id,
            serial = message.serial,
            kind = %message.kind,
            "Discord notification sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::http_client::test_client;
    use crate::notification::message::Attachment;

    fn channel(config: DiscordConfig) -> DiscordChannel {
        DiscordChannel::new(config, test_client())
    }

    #[test]
    fn test_discord_config_default() {
        let config = DiscordConfig::default();
        assert!(!config.enabled);
        assert!(config.webhook_url.is_empty());
        assert_eq!(config.username.as_deref(), Some("地震速報"));
    }

    #[test]
    fn test_discord_channel_disabled() {
        assert!(!channel(DiscordConfig::default()).is_enabled());
    }

    #[test]
    fn test_get_color() {
        assert_eq!(DiscordChannel::get_color(MessageKind::Alert), 0xe74c3c);
        assert_eq!(DiscordChannel::get_color(MessageKind::MapCaption), 0x3498db);
    }

    #[test]
    fn test_build_payload() {
        let message = NotificationMessage::new(
            "1130123",
            2,
            MessageKind::Update,
            "地震速報 第 2 報",
            "花蓮縣 花蓮市:5弱",
        );

        let payload = channel(DiscordConfig::default()).build_payload(&message);

        let embed = &payload["embeds"][0];
        assert_eq!(embed["title"], "地震速報 第 2 報");
        assert!(embed["description"].as_str().unwrap().contains("5弱"));
        assert_eq!(
            embed["color"],
            DiscordChannel::get_color(MessageKind::Update) as i64
        );
        assert!(embed["footer"]["text"].as_str().unwrap().contains("1130123"));
        assert!(embed.get("image").is_none());
    }

    #[test]
    fn test_build_payload_references_image_attachment() {
        let message = NotificationMessage::new("1", 3, MessageKind::MapCaption, "map", "caption")
            .with_attachment(Attachment {
                file_name: "1.png".to_string(),
                content_type: "image/png".to_string(),
                bytes: bytes::Bytes::from_static(b"png"),
            });
        let config = DiscordConfig {
            enabled: true,
            webhook_url: "https://example.com".to_string(),
            username: Some("CustomBot".to_string()),
            avatar_url: Some("https://example.com/avatar.png".to_string()),
            ..Default::default()
        };

        let payload = channel(config).build_payload(&message);

        assert_eq!(payload["embeds"][0]["image"]["url"], "attachment://1.png");
        assert_eq!(payload["username"], "CustomBot");
        assert_eq!(payload["avatar_url"], "https://example.com/avatar.png");
    }
}
