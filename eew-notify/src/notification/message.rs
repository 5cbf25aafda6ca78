//! Outbound notification messages.
//!
//! A message is what a channel delivers for one dispatch attempt: the rendered
//! text plus, for the map caption, an optional file attachment.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// What a message announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// First report of an event.
    Alert,
    /// A later revision of an event already alerted.
    Update,
    /// Caption for the intensity map of a final revision.
    MapCaption,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Alert => "alert",
            Self::Update => "update",
            Self::MapCaption => "map_caption",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file sent alongside a message.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}

/// One rendered notification.
#[derive(Debug, Clone)]
pub struct NotificationMessage {
    pub event_id: String,
    pub serial: u32,
    pub kind: MessageKind,
    /// Short heading, used by providers that have a title field.
    pub title: String,
    pub text: String,
    pub attachment: Option<Attachment>,
    pub timestamp: DateTime<Utc>,
}

impl NotificationMessage {
    pub fn new(
        event_id: impl Into<String>,
        serial: u32,
        kind: MessageKind,
        title: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            serial,
            kind,
            title: title.into(),
            text: text.into(),
            attachment: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// Message sent by `test()` on every channel.
    pub fn test() -> Self {
        Self::new(
            "test",
            0,
            MessageKind::Alert,
            "地震速報測試",
            "這是一則測試訊息,並非實際地震。",
        )
    }
}
