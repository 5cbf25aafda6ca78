//! LINE Notify channel.
//!
//! `POST /api/notify` with a Bearer token. Text is sent as a url-encoded
//! `message` field; an image attachment switches to multipart with `imageFile`.

use async_trait::async_trait;
use reqwest::{Client, multipart};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{NotificationChannel, retry_after_secs};
use crate::notification::message::NotificationMessage;
use crate::{Error, Result};

/// LINE Notify rejects messages longer than this.
const LINE_MESSAGE_LIMIT: usize = 1000;

/// LINE Notify channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineNotifyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub enabled: bool,
    /// Personal or group access token.
    pub token: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_api_url() -> String {
    "https://notify-api.line.me/api/notify".to_string()
}

impl Default for LineNotifyConfig {
    fn default() -> Self {
        Self {
            id: None,
            name: None,
            enabled: false,
            token: String::new(),
            api_url: default_api_url(),
        }
    }
}

pub struct LineNotifyChannel {
    config: LineNotifyConfig,
    client: Client,
}

impl LineNotifyChannel {
    pub fn new(config: LineNotifyConfig, client: Client) -> Self {
        Self { config, client }
    }

    /// LINE prefixes the bot name itself, so the text starts on a new line.
    fn build_message(message: &NotificationMessage) -> String {
        let text = format!("\n{}", message.text);
        text.chars().take(LINE_MESSAGE_LIMIT).collect()
    }
}

#[async_trait]
impl NotificationChannel for LineNotifyChannel {
    fn channel_type(&self) -> &'static str {
        "line_notify"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.token.is_empty()
    }

    async fn send(&self, message: &NotificationMessage) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let text = Self::build_message(message);
        let request = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.token);

        let request = match message.attachment.as_ref() {
            Some(attachment) if attachment.is_image() => {
                let part = multipart::Part::bytes(attachment.bytes.to_vec())
                    .file_name(attachment.file_name.clone())
                    .mime_str(&attachment.content_type)?;
                request.multipart(
                    multipart::Form::new()
                        .text("message", text)
                        .part("imageFile", part),
                )
            }
            Some(attachment) => {
                debug!(
                    content_type = %attachment.content_type,
                    "LINE Notify only accepts images; sending text only"
                );
                request.form(&[("message", text)])
            }
            None => request.form(&[("message", text)]),
        };

        let response = request
            .send()
            .await
            .map_err(|e| Error::channel_send("line_notify", format!("request failed: {e}")))?;

        let status = response.status();
        if status.as_u16() == 429 {
            let reset = retry_after_secs(response.headers(), "X-RateLimit-Reset");
            warn!(reset = ?reset, "LINE Notify rate limited");
            return Err(Error::channel_send("line_notify", "rate limited"));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("LINE Notify failed: {} - {}", status, body);
            return Err(Error::channel_send(
                "line_notify",
                format!("notify failed: {status} - {body}"),
            ));
        }

        debug!(
            event_id = %message.event_id,
            serial = message.serial,
            kind = %message.kind,
            "Message sent to LINE Notify"
        );
        Ok(())
    }
}
