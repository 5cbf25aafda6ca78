//! Notification channels.
//!
//! This module provides the providers a message can be delivered to:
//! - Discord webhooks
//! - Telegram Bot API
//! - LINE Notify
//! - Generic webhooks (HTTP POST)

mod discord;
mod line_notify;
mod telegram;
mod webhook;

pub use discord::{DiscordChannel, DiscordConfig};
pub use line_notify::{LineNotifyChannel, LineNotifyConfig};
pub use telegram::{TelegramChannel, TelegramConfig};
pub use webhook::{WebhookAuth, WebhookChannel, WebhookConfig};

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::message::NotificationMessage;
use crate::Result;

/// Trait for notification channels.
///
/// Implementations deliver exactly once per call; failures are returned to the
/// caller and never retried here.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Get the channel type name.
    fn channel_type(&self) -> &'static str;

    /// Check if the channel is enabled.
    fn is_enabled(&self) -> bool;

    /// Prepare the channel before the first delivery.
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    /// Send a message through this channel.
    async fn send(&self, message: &NotificationMessage) -> Result<()>;

    /// Test the channel configuration.
    async fn test(&self) -> Result<()> {
        self.send(&NotificationMessage::test()).await
    }
}

/// Channel configuration wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelConfig {
    /// Discord webhook channel.
    Discord(DiscordConfig),
    /// Telegram Bot API channel.
    Telegram(TelegramConfig),
    /// LINE Notify channel.
    LineNotify(LineNotifyConfig),
    /// Generic webhook channel.
    Webhook(WebhookConfig),
}

impl ChannelConfig {
    /// Get the channel type name.
    pub fn channel_type(&self) -> &'static str {
        match self {
            Self::Discord(_) => "discord",
            Self::Telegram(_) => "telegram",
            Self::LineNotify(_) => "line_notify",
            Self::Webhook(_) => "webhook",
        }
    }

    /// Check if the channel is enabled.
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Discord(c) => c.enabled,
            Self::Telegram(c) => c.enabled,
            Self::LineNotify(c) => c.enabled,
            Self::Webhook(c) => c.enabled,
        }
    }

    /// Optional stable channel instance identifier.
    pub fn instance_id(&self) -> Option<&str> {
        match self {
            Self::Discord(c) => c.id.as_deref(),
            Self::Telegram(c) => c.id.as_deref(),
            Self::LineNotify(c) => c.id.as_deref(),
            Self::Webhook(c) => c.id.as_deref(),
        }
    }

    /// Optional human-friendly display name.
    pub fn display_name(&self) -> Option<&str> {
        match self {
            Self::Discord(c) => c.name.as_deref(),
            Self::Telegram(c) => c.name.as_deref(),
            Self::LineNotify(c) => c.name.as_deref(),
            Self::Webhook(c) => c.name.as_deref(),
        }
    }

    /// Instantiate the channel on a shared HTTP client.
    pub fn build(&self, client: Client) -> Arc<dyn NotificationChannel> {
        match self {
            Self::Discord(c) => Arc::new(DiscordChannel::new(c.clone(), client)),
            Self::Telegram(c) => Arc::new(TelegramChannel::new(c.clone(), client)),
            Self::LineNotify(c) => Arc::new(LineNotifyChannel::new(c.clone(), client)),
            Self::Webhook(c) => Arc::new(WebhookChannel::new(c.clone(), client)),
        }
    }
}

/// Read a `Retry-After` style header as seconds, for rate-limit diagnostics.
pub(crate) fn retry_after_secs(headers: &reqwest::header::HeaderMap, name: &str) -> Option<f64> {
    headers.get(name)?.to_str().ok()?.trim().parse::<f64>().ok()
}
