//! EEW poller.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::RevisionHandler;
use super::http::{ExpTechHttp, NodeSelection};
use crate::config::ConfigService;
use crate::earthquake::{EewPayload, EewRevision};

/// What the poller decided for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordDisposition {
    New,
    Update,
    /// Same or older serial than already handled.
    Known,
    /// Provider not enabled in `[eew_source]`.
    Filtered,
}

/// Polls the EEW endpoint and hands new revisions to a [`RevisionHandler`].
pub struct EewClient<H> {
    http: ExpTechHttp,
    config: Arc<ConfigService>,
    handler: H,
    /// Highest serial handled per event id, forgotten after `source.alert_ttl_secs`.
    alerts: Cache<String, u32>,
}

impl<H: RevisionHandler> EewClient<H> {
    /// The alert TTL is read once here; a settings reload does not change it.
    pub fn new(http: ExpTechHttp, config: Arc<ConfigService>, handler: H) -> Self {
        let ttl = Duration::from_secs(config.current().source.alert_ttl_secs);
        Self {
            http,
            config,
            handler,
            alerts: Cache::builder().time_to_live(ttl).build(),
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Pick the fastest node, then poll until cancelled.
    pub async fn run(&self, token: CancellationToken) {
        info!("Starting EEW client");
        let latencies = self.http.test_latencies().await;
        for (node, latency) in &latencies {
            debug!(node = %node, latency_ms = ?latency.map(|l| l.as_millis()), "API node latency");
        }
        self.http.switch_node(&NodeSelection::Fastest);

        let period = Duration::from_millis(self.config.current().source.poll_interval_ms.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(node = %self.http.base_url(), interval_ms = period.as_millis() as u64, "EEW HTTP client is ready");

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => self.poll_once().await,
            }
        }
        info!("EEW client stopped");
    }

    /// Fetch the current records once. A failed request moves to the next node.
    pub async fn poll_once(&self) {
        match self.http.get_eew().await {
            Ok(records) => {
                for record in records {
                    self.on_record(record).await;
                }
            }
            Err(e) => {
                warn!(node = %self.http.base_url(), error = %e, "Failed to fetch EEW data");
                self.http.switch_node(&NodeSelection::Next);
            }
        }
    }

    /// Filter, de-duplicate and forward one record.
    pub async fn on_record(&self, record: EewPayload) -> RecordDisposition {
        let config = self.config.current();
        if !config.eew_source.accepts(&record.author) {
            return RecordDisposition::Filtered;
        }

        let disposition = match self.alerts.get(&record.id) {
            None => RecordDisposition::New,
            Some(serial) if record.serial > serial => RecordDisposition::Update,
            Some(_) => RecordDisposition::Known,
        };
        if disposition == RecordDisposition::Known {
            return disposition;
        }

        self.alerts.insert(record.id.clone(), record.serial);

        let revision = record.into_revision();
        log_revision(&revision, disposition);
        self.handler.accept(revision).await;
        disposition
    }
}

fn log_revision(revision: &EewRevision, disposition: RecordDisposition) {
    let eq = &revision.earthquake;
    let message = if disposition == RecordDisposition::New {
        "New EEW alert detected"
    } else {
        "EEW alert updated"
    };
    info!(
        event_id = %revision.id,
        serial = revision.serial,
        final_report = revision.final_report,
        provider = %revision.provider.name,
        location = %eq.location,
        lon = eq.location.lon,
        lat = eq.location.lat,
        magnitude = eq.magnitude,
        depth_km = eq.depth_km,
        origin_time = %eq.origin_time.format("%Y/%m/%d %H:%M:%S"),
        "{}",
        message
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::http_client::test_client;
    use crate::config::AppConfig;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default, Clone)]
    struct Recorder {
        accepted: Arc<Mutex<Vec<(String, u32)>>>,
    }

    #[async_trait]
    impl RevisionHandler for Recorder {
        async fn accept(&self, revision: EewRevision) {
            self.accepted.lock().push((revision.id, revision.serial));
        }
    }

    fn payload(id: &str, serial: u32, author: &str) -> EewPayload {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "serial": serial,
            "final": 0,
            "author": author,
            "time": 1_700_000_005_000i64,
            "eq": {"lon": 121.6, "lat": 24.0, "mag": 5.0, "depth": 10, "time": 1_700_000_000_000i64}
        }))
        .unwrap()
    }

    fn client(config: AppConfig) -> (EewClient<Recorder>, Recorder) {
        let recorder = Recorder::default();
        let http = ExpTechHttp::new(test_client(), &config.source.api_nodes).unwrap();
        let client = EewClient::new(http, Arc::new(ConfigService::new(config)), recorder.clone());
        (client, recorder)
    }

    #[tokio::test]
    async fn test_dedup_by_serial() {
        let (client, recorder) = client(AppConfig::default());

        assert_eq!(client.on_record(payload("a", 1, "cwa")).await, RecordDisposition::New);
        assert_eq!(client.on_record(payload("a", 1, "cwa")).await, RecordDisposition::Known);
        assert_eq!(client.on_record(payload("a", 3, "cwa")).await, RecordDisposition::Update);
        assert_eq!(client.on_record(payload("a", 2, "cwa")).await, RecordDisposition::Known);
        assert_eq!(client.on_record(payload("b", 1, "cwa")).await, RecordDisposition::New);

        assert_eq!(
            *recorder.accepted.lock(),
            vec![("a".to_string(), 1), ("a".to_string(), 3), ("b".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn test_provider_filter() {
        let config = AppConfig::from_toml_str("[eew_source]\nall = false\ncwa = true\n").unwrap();
        let (client, recorder) = client(config);

        assert_eq!(client.on_record(payload("a", 1, "jma")).await, RecordDisposition::Filtered);
        assert_eq!(client.on_record(payload("b", 1, "cwa")).await, RecordDisposition::New);
        assert_eq!(recorder.accepted.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_expired_alert_is_new_again() {
        let config = AppConfig::from_toml_str("[source]\nalert_ttl_secs = 0\n").unwrap();
        let (client, _) = client(config);

        assert_eq!(client.on_record(payload("a", 1, "cwa")).await, RecordDisposition::New);
        assert_eq!(client.on_record(payload("a", 1, "cwa")).await, RecordDisposition::New);
    }
}
