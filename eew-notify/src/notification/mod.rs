//! Notification delivery.
//!
//! Rendered alerts are delivered through every configured channel
//! (Discord, Telegram, LINE Notify, generic webhook). Delivery is best-effort:
//! one channel failing never blocks the others and nothing is retried.
//!
//! # Example
//!
//! ```ignore
//! use eew_notify::notification::{ChannelConfig, DiscordConfig, NotificationService};
//!
//! let service = NotificationService::from_configs(
//!     &[ChannelConfig::Discord(DiscordConfig {
//!         enabled: true,
//!         webhook_url: "https://discord.com/api/webhooks/...".to_string(),
//!         ..Default::default()
//!     })],
//!     reqwest::Client::new(),
//! );
//! ```

pub mod channels;
pub mod message;
pub mod service;

pub use channels::{
    ChannelConfig, DiscordConfig, LineNotifyConfig, NotificationChannel, TelegramConfig,
    WebhookAuth, WebhookConfig,
};
pub use message::{Attachment, MessageKind, NotificationMessage};
pub use service::{ChannelDelivery, DeliveryReport, NotificationService, NotificationStats};
