//! Fan-out of one message to every configured channel.
//!
//! Delivery is concurrent and best-effort: each channel is awaited independently,
//! a failure is logged and recorded in the [`DeliveryReport`], and nothing is
//! retried.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::join_all;
use parking_lot::RwLock;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use super::channels::{ChannelConfig, NotificationChannel};
use super::message::NotificationMessage;

#[derive(Clone)]
struct RuntimeChannel {
    key: String,
    channel: Arc<dyn NotificationChannel>,
}

/// Outcome of one channel for one message.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelDelivery {
    pub channel_key: String,
    pub channel_type: String,
    /// `None` on success.
    pub error: Option<String>,
}

impl ChannelDelivery {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-channel results of one fan-out.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeliveryReport {
    pub deliveries: Vec<ChannelDelivery>,
}

impl DeliveryReport {
    pub fn succeeded(&self) -> usize {
        self.deliveries.iter().filter(|d| d.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.deliveries.len() - self.succeeded()
    }
}

/// The notification service.
pub struct NotificationService {
    channels: RwLock<Vec<RuntimeChannel>>,
    sent: AtomicU64,
    failed: AtomicU64,
}

impl NotificationService {
    /// Create a service without channels.
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(Vec::new()),
            sent: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Create a service with the enabled channels of `configs`.
    pub fn from_configs(configs: &[ChannelConfig], client: Client) -> Self {
        let service = Self::new();
        service.init_channels(configs, client);
        service
    }

    /// Replace the channel set.
    pub fn init_channels(&self, configs: &[ChannelConfig], client: Client) {
        let mut channels = Vec::new();
        let mut used_keys: HashSet<String> = HashSet::new();

        for (idx, channel_config) in configs.iter().enumerate() {
            let channel = channel_config.build(client.clone());
            if !channel.is_enabled() {
                continue;
            }

            let base_key = match channel_config.instance_id() {
                Some(id) => format!(
                    "{}:{}",
                    channel_config.channel_type(),
                    normalize_channel_key_part(id)
                ),
                None => format!("{}:{}", channel_config.channel_type(), idx),
            };
            let key = if used_keys.insert(base_key.clone()) {
                base_key
            } else {
                let disambiguated = format!("{}:{}", base_key, idx);
                warn!(
                    "Duplicate notification channel key detected (base_key={}), using {}",
                    base_key, disambiguated
                );
                used_keys.insert(disambiguated.clone());
                disambiguated
            };

            info!(
                channel = %key,
                name = channel_config.display_name().unwrap_or(channel_config.channel_type()),
                "Initialized notification channel"
            );
            channels.push(RuntimeChannel { key, channel });
        }

        info!(
            "Notification service initialized with {} channels",
            channels.len()
        );
        *self.channels.write() = channels;
    }

    /// Add a channel under an explicit key.
    pub fn add_channel(&self, key: impl Into<String>, channel: Arc<dyn NotificationChannel>) {
        self.channels.write().push(RuntimeChannel {
            key: key.into(),
            channel,
        });
    }

    /// Keys of the loaded channels, in delivery order.
    pub fn channel_keys(&self) -> Vec<String> {
        self.channels.read().iter().map(|c| c.key.clone()).collect()
    }

    /// Run `start()` on every channel. Failures are logged; the channel stays loaded.
    pub async fn start(&self) {
        let channels = self.channels.read().clone();
        for c in channels {
            if let Err(e) = c.channel.start().await {
                warn!(channel = %c.key, error = %e, "Notification channel failed to start");
            }
        }
    }

    /// Send `message` to every channel concurrently and wait for all of them.
    pub async fn notify(&self, message: &NotificationMessage) -> DeliveryReport {
        let channels = self.channels.read().clone();
        if channels.is_empty() {
            return DeliveryReport::default();
        }

        let sends = channels.iter().map(|c| async move {
            let result = c.channel.send(message).await;
            if let Err(e) = &result {
                warn!(
                    channel = %c.key,
                    event_id = %message.event_id,
                    serial = message.serial,
                    kind = %message.kind,
                    error = %e,
                    "Notification delivery failed"
                );
            }
            ChannelDelivery {
                channel_key: c.key.clone(),
                channel_type: c.channel.channel_type().to_string(),
                error: result.err().map(|e| e.to_string()),
            }
        });

        let report = DeliveryReport {
            deliveries: join_all(sends).await,
        };
        self.sent
            .fetch_add(report.succeeded() as u64, Ordering::Relaxed);
        self.failed.fetch_add(report.failed() as u64, Ordering::Relaxed);
        report
    }

    /// Run a connectivity/config test for every channel.
    pub async fn test_channels(&self) -> DeliveryReport {
        self.notify(&NotificationMessage::test()).await
    }

    pub fn stats(&self) -> NotificationStats {
        NotificationStats {
            channel_count: self.channels.read().len(),
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

fn normalize_channel_key_part(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return "_".to_string();
    }

    trimmed
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl Default for NotificationService {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the notification service.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationStats {
    /// Number of configured channels.
    pub channel_count: usize,
    /// Successful channel deliveries since start.
    pub sent: u64,
    /// Failed channel deliveries since start.
    pub failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::http_client::test_client;
    use crate::Result;
    use crate::notification::channels::{DiscordConfig, LineNotifyConfig};
    use crate::notification::message::MessageKind;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    struct TestChannel {
        fail: bool,
        attempts: Arc<AtomicU32>,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl NotificationChannel for TestChannel {
        fn channel_type(&self) -> &'static str {
            "test"
        }

        fn is_enabled(&self) -> bool {
            true
        }

        async fn send(&self, _message: &NotificationMessage) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(crate::Error::channel_send("test", "forced failure"))
            } else {
                Ok(())
            }
        }
    }

    fn message() -> NotificationMessage {
        NotificationMessage::new("1130123", 1, MessageKind::Alert, "t", "body")
    }

    #[test]
    fn test_notification_service_creation() {
        let stats = NotificationService::new().stats();
        assert_eq!(stats.channel_count, 0);
        assert_eq!(stats.sent, 0);
    }

    #[test]
    fn test_init_channels_skips_disabled_and_dedupes_keys() {
        let configs = vec![
            ChannelConfig::Discord(DiscordConfig {
                id: Some("main hook".to_string()),
                enabled: true,
                webhook_url: "https://discord.com/api/webhooks/1".to_string(),
                ..Default::default()
            }),
            ChannelConfig::Discord(DiscordConfig {
                id: Some("main hook".to_string()),
                enabled: true,
                webhook_url: "https://discord.com/api/webhooks/2".to_string(),
                ..Default::default()
            }),
            ChannelConfig::LineNotify(LineNotifyConfig::default()),
        ];

        let service = NotificationService::from_configs(&configs, test_client());
        assert_eq!(
            service.channel_keys(),
            vec!["discord:main_hook", "discord:main_hook:1"]
        );
    }

    #[tokio::test]
    async fn test_failure_does_not_block_other_channels() {
        let service = NotificationService::new();
        let ok_attempts = Arc::new(AtomicU32::new(0));
        let bad_attempts = Arc::new(AtomicU32::new(0));

        service.add_channel(
            "bad",
            Arc::new(TestChannel {
                fail: true,
                attempts: bad_attempts.clone(),
                delay: Duration::ZERO,
            }),
        );
        service.add_channel(
            "ok",
            Arc::new(TestChannel {
                fail: false,
                attempts: ok_attempts.clone(),
                delay: Duration::from_millis(20),
            }),
        );

        let report = service.notify(&message()).await;

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(ok_attempts.load(Ordering::SeqCst), 1);
        // No retry.
        assert_eq!(bad_attempts.load(Ordering::SeqCst), 1);

        let stats = service.stats();
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_channels_are_sent_concurrently() {
        let service = NotificationService::new();
        for key in ["a", "b", "c"] {
            service.add_channel(
                key,
                Arc::new(TestChannel {
                    fail: false,
                    attempts: Arc::new(AtomicU32::new(0)),
                    delay: Duration::from_secs(1),
                }),
            );
        }

        let started = tokio::time::Instant::now();
        let report = service.notify(&message()).await;

        assert_eq!(report.succeeded(), 3);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
