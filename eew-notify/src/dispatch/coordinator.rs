//! Per-event dispatch state machine.
//!
//! Every event id owns an [`EventSlot`] in the coordinator's store. A slot carries
//! the cumulative region table plus two locks:
//!
//! - `state` (sync) guards the table and bookkeeping and is never held across an await;
//! - `dispatch` (async) serializes sends for the event, so at most one primary send
//!   is in flight and the map caption never overlaps it.
//!
//! Each revision takes a ticket when it is submitted. Table updates are applied in
//! ticket order, whichever intensity estimate finishes first.
//!
//! A revision updates the table first and marks it pending, then queues on
//! `dispatch`. Whoever gets the lock sends the table as it is at that moment and
//! clears the pending flag; revisions that queued behind it find nothing pending
//! and are coalesced into that send.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::formatter::MessageFormatter;
use super::gate::should_notify;
use super::table::{RegionIntensityTable, ReportMode};
use crate::config::ConfigService;
use crate::earthquake::{EewRevision, MapOutcome};
use crate::map::{MapArtifact, MapProvider};
use crate::notification::{
    Attachment, DeliveryReport, MessageKind, NotificationMessage, NotificationService,
};
use crate::{Error, Result};

/// Where an event is in its dispatch lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPhase {
    New,
    PrimaryInFlight,
    PrimarySent,
    ImagePending,
    ImageSent,
    ImageSkipped,
}

impl DispatchPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::PrimaryInFlight => "primary_in_flight",
            Self::PrimarySent => "primary_sent",
            Self::ImagePending => "image_pending",
            Self::ImageSent => "image_sent",
            Self::ImageSkipped => "image_skipped",
        }
    }
}

impl std::fmt::Display for DispatchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageState {
    NotScheduled,
    Pending,
    Sent,
    Skipped,
}

/// Result of handling one revision.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The table was sent to the channels.
    Sent(DeliveryReport),
    /// The gate judged the table not alert-worthy.
    Suppressed,
    /// The gate could not be evaluated; nothing was sent.
    GateError(Error),
    /// An earlier queued dispatch already sent this revision's update.
    Coalesced,
    /// The serial was not newer than one already applied.
    Stale,
    /// Shutdown began before the revision was applied.
    Cancelled,
}

#[derive(Debug)]
struct EventState {
    table: RegionIntensityTable,
    latest: Option<EewRevision>,
    last_serial: Option<u32>,
    /// Ticket handed to the next submitted revision.
    next_ticket: u64,
    /// The table changed since the last primary dispatch.
    pending: bool,
    primary_in_flight: bool,
    primary_sends: u32,
    primary_suppressed: u32,
    image: ImageState,
    last_activity: Instant,
    terminal_since: Option<Instant>,
}

impl EventState {
    fn new() -> Self {
        Self {
            table: RegionIntensityTable::new(),
            latest: None,
            last_serial: None,
            next_ticket: 0,
            pending: false,
            primary_in_flight: false,
            primary_sends: 0,
            primary_suppressed: 0,
            image: ImageState::NotScheduled,
            last_activity: Instant::now(),
            terminal_since: None,
        }
    }

    fn phase(&self) -> DispatchPhase {
        match self.image {
            ImageState::Sent => DispatchPhase::ImageSent,
            ImageState::Skipped => DispatchPhase::ImageSkipped,
            ImageState::Pending => DispatchPhase::ImagePending,
            ImageState::NotScheduled if self.primary_in_flight => DispatchPhase::PrimaryInFlight,
            ImageState::NotScheduled if self.primary_sends + self.primary_suppressed > 0 => {
                DispatchPhase::PrimarySent
            }
            ImageState::NotScheduled => DispatchPhase::New,
        }
    }

    fn finish_image(&mut self, image: ImageState) {
        self.image = image;
        self.terminal_since = Some(Instant::now());
        self.last_activity = Instant::now();
    }
}

/// Store entry for one event id.
struct EventSlot {
    state: Mutex<EventState>,
    dispatch: tokio::sync::Mutex<()>,
    /// Number of tickets whose table update has been applied or rejected.
    applied: watch::Sender<u64>,
}

impl EventSlot {
    fn new() -> Self {
        Self {
            state: Mutex::new(EventState::new()),
            dispatch: tokio::sync::Mutex::new(()),
            applied: watch::channel(0).0,
        }
    }

    /// Wait until every revision submitted before `ticket` has been applied.
    async fn wait_turn(&self, ticket: u64) {
        let mut rx = self.applied.subscribe();
        loop {
            let applied = *rx.borrow_and_update();
            if applied >= ticket {
                return;
            }
            // The sender lives in this slot, so this only wakes on progress.
            let _ = rx.changed().await;
        }
    }

    fn finish_turn(&self, ticket: u64) {
        self.applied
            .send_modify(|applied| *applied = (*applied).max(ticket + 1));
    }

    fn has_queued(&self, state: &EventState) -> bool {
        state.next_ticket > *self.applied.borrow()
    }
}

/// Read-only view of an event's dispatch state.
#[derive(Debug, Clone, Serialize)]
pub struct EventSnapshot {
    pub event_id: String,
    pub phase: DispatchPhase,
    pub last_serial: Option<u32>,
    pub table: RegionIntensityTable,
    /// Primary dispatches that reached the channels.
    pub primary_sends: u32,
    /// Primary dispatches withheld by the gate.
    pub primary_suppressed: u32,
    pub image_scheduled: bool,
}

struct Inner {
    config: Arc<ConfigService>,
    notifier: Arc<NotificationService>,
    map_provider: Option<Arc<dyn MapProvider>>,
    formatter: MessageFormatter,
    events: DashMap<String, Arc<EventSlot>>,
    dispatches: Mutex<JoinSet<()>>,
    background: Mutex<JoinSet<()>>,
    cancellation_token: CancellationToken,
}

/// Owns every event's state and drives revisions to the channels.
///
/// Cheap to clone; clones share the same store and task set.
#[derive(Clone)]
pub struct DispatchCoordinator {
    inner: Arc<Inner>,
}

impl DispatchCoordinator {
    pub fn new(
        config: Arc<ConfigService>,
        notifier: Arc<NotificationService>,
        map_provider: Option<Arc<dyn MapProvider>>,
    ) -> Self {
        Self::with_formatter(config, notifier, map_provider, MessageFormatter::default())
    }

    pub fn with_formatter(
        config: Arc<ConfigService>,
        notifier: Arc<NotificationService>,
        map_provider: Option<Arc<dyn MapProvider>>,
        formatter: MessageFormatter,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                notifier,
                map_provider,
                formatter,
                events: DashMap::new(),
                dispatches: Mutex::new(JoinSet::new()),
                background: Mutex::new(JoinSet::new()),
                cancellation_token: CancellationToken::new(),
            }),
        }
    }

    /// Handle `revision` on a tracked task.
    ///
    /// The revision's place in its event's order is fixed by this call, before its
    /// intensity estimate is awaited.
    pub fn submit(&self, revision: EewRevision) {
        let (slot, ticket) = self.reserve(&revision.id);
        let this = self.clone();
        self.inner.dispatches.lock().spawn(async move {
            this.process(slot, ticket, revision).await;
        });
    }

    /// Apply one revision and run its primary dispatch.
    ///
    /// Waits for the revision's intensity estimate, merges it into the event table
    /// and sends the table unless a queued dispatch already covered it. A final
    /// revision schedules the map dispatch once the primary step has settled,
    /// whatever the gate decided.
    ///
    /// The revision is ordered when the returned future is first polled; use
    /// [`submit`](Self::submit) to order it at call time.
    pub async fn handle(&self, revision: EewRevision) -> DispatchOutcome {
        let (slot, ticket) = self.reserve(&revision.id);
        self.process(slot, ticket, revision).await
    }

    async fn process(
        &self,
        slot: Arc<EventSlot>,
        ticket: u64,
        revision: EewRevision,
    ) -> DispatchOutcome {
        let inner = &self.inner;
        let event_id = revision.id.clone();

        let report = tokio::select! {
            biased;
            _ = inner.cancellation_token.cancelled() => {
                debug!(event_id = %event_id, serial = revision.serial, "Revision dropped on shutdown");
                return DispatchOutcome::Cancelled;
            }
            report = revision.earthquake.intensity_calculated().wait() => report,
        };

        tokio::select! {
            biased;
            _ = inner.cancellation_token.cancelled() => {
                debug!(event_id = %event_id, serial = revision.serial, "Revision dropped on shutdown");
                return DispatchOutcome::Cancelled;
            }
            _ = slot.wait_turn(ticket) => {}
        }

        // Settings are read once per revision; a reload only affects later ones.
        let config = inner.config.current();
        let mode = ReportMode::from_customization(config.customization.enable);

        let applied = {
            let mut state = slot.state.lock();
            if state.last_serial.is_some_and(|last| revision.serial <= last) {
                debug!(
                    event_id = %event_id,
                    serial = revision.serial,
                    last_serial = ?state.last_serial,
                    "Ignoring stale revision"
                );
                false
            } else {
                state.table.update(&report.regions, revision.serial, mode);
                state.last_serial = Some(revision.serial);
                state.latest = Some(revision.clone());
                state.pending = true;
                state.last_activity = Instant::now();
                true
            }
        };
        slot.finish_turn(ticket);
        if !applied {
            return DispatchOutcome::Stale;
        }

        let _dispatch = slot.dispatch.lock().await;

        let outcome = self.dispatch_primary(&slot, &config.customization).await;
        self.schedule_image(&slot);
        outcome
    }

    /// Must be called with the slot's dispatch lock held.
    async fn dispatch_primary(
        &self,
        slot: &Arc<EventSlot>,
        customization: &crate::config::CustomizationConfig,
    ) -> DispatchOutcome {
        let (revision, table) = {
            let mut state = slot.state.lock();
            if !state.pending {
                return DispatchOutcome::Coalesced;
            }
            let Some(revision) = state.latest.clone() else {
                return DispatchOutcome::Coalesced;
            };
            state.pending = false;
            state.primary_in_flight = true;
            (revision, state.table.clone())
        };

        let outcome = match should_notify(&table, customization) {
            Ok(true) => {
                let message = self.primary_message(&revision, &table);
                let report = self.inner.notifier.notify(&message).await;
                info!(
                    event_id = %revision.id,
                    serial = revision.serial,
                    regions = table.len(),
                    delivered = report.succeeded(),
                    failed = report.failed(),
                    "Primary alert dispatched"
                );
                DispatchOutcome::Sent(report)
            }
            Ok(false) => {
                debug!(
                    event_id = %revision.id,
                    serial = revision.serial,
                    max_level = ?table.max_level(),
                    "Revision below notification threshold"
                );
                DispatchOutcome::Suppressed
            }
            Err(e) => {
                error!(
                    event_id = %revision.id,
                    serial = revision.serial,
                    error = %e,
                    "Cannot evaluate notification threshold; alert suppressed"
                );
                DispatchOutcome::GateError(e)
            }
        };

        let mut state = slot.state.lock();
        state.primary_in_flight = false;
        match outcome {
            DispatchOutcome::Sent(_) => state.primary_sends += 1,
            _ => state.primary_suppressed += 1,
        }
        state.last_activity = Instant::now();
        outcome
    }

    fn primary_message(
        &self,
        revision: &EewRevision,
        table: &RegionIntensityTable,
    ) -> NotificationMessage {
        let formatter = &self.inner.formatter;
        let now = chrono::Utc::now().timestamp();
        let text = format!(
            "{}\n\n{}",
            formatter.render_summary(revision),
            formatter.render_region_breakdown(table, now, revision.serial)
        );
        let kind = if revision.is_first_report() {
            MessageKind::Alert
        } else {
            MessageKind::Update
        };
        NotificationMessage::new(
            revision.id.as_str(),
            revision.serial,
            kind,
            formatter.render_title(revision),
            text,
        )
    }

    /// Start the map dispatch once per event, after its final revision.
    fn schedule_image(&self, slot: &Arc<EventSlot>) {
        let revision = {
            let mut guard = slot.state.lock();
            let state = &mut *guard;
            match &state.latest {
                Some(latest) if latest.final_report && state.image == ImageState::NotScheduled => {
                    state.image = ImageState::Pending;
                    latest.clone()
                }
                _ => return,
            }
        };

        debug!(event_id = %revision.id, serial = revision.serial, "Map dispatch scheduled");
        let this = self.clone();
        let slot = slot.clone();
        self.inner.dispatches.lock().spawn(async move {
            this.dispatch_image(slot, revision).await;
        });
    }

    async fn dispatch_image(&self, slot: Arc<EventSlot>, revision: EewRevision) {
        let inner = &self.inner;
        let outcome = tokio::select! {
            biased;
            _ = inner.cancellation_token.cancelled() => {
                info!(event_id = %revision.id, "Map dispatch abandoned on shutdown");
                return;
            }
            outcome = revision.earthquake.map_drawn().wait() => outcome,
        };

        let _dispatch = slot.dispatch.lock().await;
        match self.send_image(&revision, outcome).await {
            Ok(report) => {
                info!(
                    event_id = %revision.id,
                    delivered = report.succeeded(),
                    failed = report.failed(),
                    "Map caption dispatched"
                );
                slot.state.lock().finish_image(ImageState::Sent);
            }
            Err(e) => {
                info!(event_id = %revision.id, reason = %e, "Map dispatch skipped");
                slot.state.lock().finish_image(ImageState::Skipped);
            }
        }
    }

    async fn send_image(&self, revision: &EewRevision, outcome: MapOutcome) -> Result<DeliveryReport> {
        let artifact = match outcome {
            MapOutcome::Drawn(artifact) if !artifact.content.is_empty() => artifact,
            MapOutcome::Drawn(_) => return Err(Error::artifact_unavailable("map is empty")),
            MapOutcome::Failed(reason) => return Err(Error::ArtifactUnavailable(reason)),
        };

        let url = match &self.inner.map_provider {
            Some(provider) => match provider.upload(&revision.id, &artifact).await {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(event_id = %revision.id, error = %e, "Map upload failed");
                    None
                }
            },
            None => None,
        };
        let attachment = artifact.is_image().then(|| attachment(&revision.id, &artifact));

        if url.is_none() && attachment.is_none() {
            return Err(Error::artifact_unavailable(
                "map has neither a public URL nor an image to attach",
            ));
        }

        let formatter = &self.inner.formatter;
        let mut message = NotificationMessage::new(
            revision.id.as_str(),
            revision.serial,
            MessageKind::MapCaption,
            formatter.render_title(revision),
            formatter.render_image_caption(revision, url.as_deref()),
        );
        if let Some(attachment) = attachment {
            message = message.with_attachment(attachment);
        }

        Ok(self.inner.notifier.notify(&message).await)
    }

    /// Get or create the event's slot and take the next ticket in its order.
    fn reserve(&self, event_id: &str) -> (Arc<EventSlot>, u64) {
        // The entry guard keeps the sweeper from evicting the slot in between.
        let entry = self
            .inner
            .events
            .entry(event_id.to_string())
            .or_insert_with(|| {
                info!(event_id, "Tracking new event");
                Arc::new(EventSlot::new())
            });
        let slot = entry.value().clone();
        let ticket = {
            let mut state = slot.state.lock();
            let ticket = state.next_ticket;
            state.next_ticket += 1;
            state.last_activity = Instant::now();
            ticket
        };
        drop(entry);
        (slot, ticket)
    }

    pub fn snapshot(&self, event_id: &str) -> Option<EventSnapshot> {
        let slot = self.inner.events.get(event_id)?.clone();
        let state = slot.state.lock();
        Some(EventSnapshot {
            event_id: event_id.to_string(),
            phase: state.phase(),
            last_serial: state.last_serial,
            table: state.table.clone(),
            primary_sends: state.primary_sends,
            primary_suppressed: state.primary_suppressed,
            image_scheduled: state.image != ImageState::NotScheduled,
        })
    }

    /// Number of events currently tracked.
    pub fn active_events(&self) -> usize {
        self.inner.events.len()
    }

    /// Evict events that finished their map dispatch more than `grace` ago, and any
    /// event without activity for `idle`. Events with a dispatch running or a
    /// revision still waiting for its estimate are kept.
    pub fn cleanup_stale(&self, grace: Duration, idle: Duration) -> usize {
        let mut removed = 0;

        self.inner.events.retain(|event_id, slot| {
            if slot.dispatch.try_lock().is_err() {
                return true;
            }
            let state = slot.state.lock();
            if slot.has_queued(&state) {
                return true;
            }
            let expired = state.terminal_since.is_some_and(|t| t.elapsed() >= grace);
            let idle_for = state.last_activity.elapsed();
            if expired || idle_for >= idle {
                debug!(
                    event_id = %event_id,
                    phase = %state.phase(),
                    idle_secs = idle_for.as_secs(),
                    "Evicting event state"
                );
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            info!(removed, remaining = self.inner.events.len(), "Cleaned up event state");
        }
        removed
    }

    /// Periodically evict stale events with the `[retention]` settings.
    pub fn start_sweeper(&self) {
        let this = self.clone();
        let token = self.inner.cancellation_token.clone();
        self.inner.background.lock().spawn(async move {
            let interval_secs = this.inner.config.current().retention.sweep_interval_secs;
            let period = Duration::from_secs(interval_secs.max(1));
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let retention = this.inner.config.current().retention.clone();
                        this.cleanup_stale(
                            Duration::from_secs(retention.grace_secs),
                            Duration::from_secs(retention.idle_secs),
                        );
                        this.reap_finished();
                    }
                }
            }
            debug!("Event sweeper stopped");
        });
    }

    fn reap_finished(&self) {
        let mut dispatches = self.inner.dispatches.lock();
        while let Some(result) = dispatches.try_join_next() {
            if let Err(e) = result {
                error!(error = %e, "Dispatch task failed");
            }
        }
    }

    /// Wait until every submitted revision and scheduled map dispatch has finished,
    /// including dispatches scheduled while waiting.
    pub async fn drain(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *self.inner.dispatches.lock());
            if tasks.is_empty() {
                return;
            }
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    error!(error = %e, "Dispatch task failed");
                }
            }
        }
    }

    /// Cancel pending waits (unfinished map dispatches are abandoned) and join all tasks.
    pub async fn shutdown(&self) {
        info!("Stopping dispatch coordinator");
        self.inner.cancellation_token.cancel();
        self.drain().await;

        let mut background = std::mem::take(&mut *self.inner.background.lock());
        while background.join_next().await.is_some() {}
        info!("Dispatch coordinator stopped");
    }

    /// Token cancelled by [`shutdown`](Self::shutdown).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancellation_token.clone()
    }
}

fn attachment(event_id: &str, artifact: &MapArtifact) -> Attachment {
    Attachment {
        file_name: format!("{}.{}", event_id, artifact.extension),
        content_type: artifact.content_type.clone(),
        bytes: artifact.content.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, ThresholdSetting};
    use crate::earthquake::{
        EarthquakeData, EarthquakeLocation, IntensityReport, Provider, RegionEstimate,
    };
    use crate::notification::NotificationChannel;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct CountingChannel {
        sends: AtomicU32,
    }

    #[async_trait::async_trait]
    impl NotificationChannel for CountingChannel {
        fn channel_type(&self) -> &'static str {
            "counting"
        }

        fn is_enabled(&self) -> bool {
            true
        }

        async fn send(&self, _message: &NotificationMessage) -> Result<()> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn coordinator(config: AppConfig) -> (DispatchCoordinator, Arc<CountingChannel>) {
        let channel = Arc::new(CountingChannel::default());
        let notifier = Arc::new(NotificationService::new());
        notifier.add_channel("counting", channel.clone());
        let coordinator =
            DispatchCoordinator::new(Arc::new(ConfigService::new(config)), notifier, None);
        (coordinator, channel)
    }

    fn revision(serial: u32, final_report: bool, level: i32) -> EewRevision {
        let rev = unestimated_revision(serial, final_report);
        rev.earthquake
            .intensity_calculated()
            .complete(Arc::new(IntensityReport::from_regions(vec![
                RegionEstimate::new("花蓮縣", "花蓮市", level, level.to_string(), 0),
            ])));
        rev
    }

    fn unestimated_revision(serial: u32, final_report: bool) -> EewRevision {
        let earthquake = EarthquakeData::new(
            EarthquakeLocation {
                lon: 121.6,
                lat: 24.0,
                name: None,
            },
            6.0,
            10.0,
            Utc::now(),
            None,
        );
        EewRevision {
            id: "evt".to_string(),
            serial,
            final_report,
            provider: Provider::new("cwa"),
            published_at: Utc::now(),
            earthquake: Arc::new(earthquake),
        }
    }

    #[tokio::test]
    async fn test_stale_serial_is_ignored() {
        let (coordinator, channel) = coordinator(AppConfig::default());

        assert!(matches!(coordinator.handle(revision(2, false, 3)).await, DispatchOutcome::Sent(_)));
        assert!(matches!(coordinator.handle(revision(1, false, 5)).await, DispatchOutcome::Stale));
        assert!(matches!(coordinator.handle(revision(2, false, 5)).await, DispatchOutcome::Stale));

        assert_eq!(channel.sends.load(Ordering::SeqCst), 1);
        let snapshot = coordinator.snapshot("evt").unwrap();
        assert_eq!(snapshot.last_serial, Some(2));
        assert_eq!(snapshot.phase, DispatchPhase::PrimarySent);
    }

    #[tokio::test]
    async fn test_gate_error_suppresses_but_still_schedules_image() {
        let mut config = AppConfig::default();
        config.customization.enable = true;
        config.customization.threshold = ThresholdSetting::Text("strong".to_string());
        let (coordinator, channel) = coordinator(config);

        let rev = revision(1, true, 7);
        rev.earthquake
            .map_drawn()
            .complete(MapOutcome::Failed("renderer unavailable".to_string()));

        let outcome = coordinator.handle(rev).await;
        assert!(matches!(outcome, DispatchOutcome::GateError(Error::Configuration(_))));

        coordinator.drain().await;
        let snapshot = coordinator.snapshot("evt").unwrap();
        assert_eq!(snapshot.primary_suppressed, 1);
        assert_eq!(snapshot.phase, DispatchPhase::ImageSkipped);
        assert_eq!(channel.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_recent_and_evicts_terminal() {
        let (coordinator, _) = coordinator(AppConfig::default());

        let rev = revision(1, true, 4);
        rev.earthquake
            .map_drawn()
            .complete(MapOutcome::Failed("no map".to_string()));
        coordinator.handle(rev).await;
        coordinator.drain().await;

        let long = Duration::from_secs(3600);
        assert_eq!(coordinator.cleanup_stale(long, long), 0);
        assert_eq!(coordinator.active_events(), 1);

        assert_eq!(coordinator.cleanup_stale(Duration::ZERO, long), 1);
        assert!(coordinator.snapshot("evt").is_none());
    }

    #[tokio::test]
    async fn test_idle_non_final_event_is_evicted() {
        let (coordinator, _) = coordinator(AppConfig::default());
        coordinator.handle(revision(1, false, 4)).await;

        let long = Duration::from_secs(3600);
        assert_eq!(coordinator.cleanup_stale(Duration::ZERO, long), 0);
        assert_eq!(coordinator.cleanup_stale(long, Duration::ZERO), 1);
    }

    #[tokio::test]
    async fn test_shutdown_abandons_pending_map() {
        let (coordinator, channel) = coordinator(AppConfig::default());

        // The map never completes.
        coordinator.handle(revision(1, true, 4)).await;
        assert_eq!(coordinator.snapshot("evt").unwrap().phase, DispatchPhase::ImagePending);

        coordinator.shutdown().await;

        assert_eq!(coordinator.snapshot("evt").unwrap().phase, DispatchPhase::ImagePending);
        assert_eq!(channel.sends.load(Ordering::SeqCst), 1);
        assert!(matches!(
            coordinator.handle(revision(2, true, 4)).await,
            DispatchOutcome::Cancelled
        ));
    }

    #[tokio::test]
    async fn test_revisions_apply_in_submission_order() {
        let (coordinator, channel) = coordinator(AppConfig::default());
        let first = unestimated_revision(1, false);
        let second = unestimated_revision(2, false);

        coordinator.submit(first.clone());
        coordinator.submit(second.clone());

        // The later estimate finishes first.
        second
            .earthquake
            .intensity_calculated()
            .complete(Arc::new(IntensityReport::from_regions(vec![
                RegionEstimate::new("花蓮縣", "花蓮市", 4, "4級", 999),
            ])));
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(coordinator.snapshot("evt").unwrap().last_serial, None);

        first
            .earthquake
            .intensity_calculated()
            .complete(Arc::new(IntensityReport::from_regions(vec![
                RegionEstimate::new("花蓮縣", "花蓮市", 3, "3級", 130),
            ])));
        coordinator.drain().await;

        let snapshot = coordinator.snapshot("evt").unwrap();
        assert_eq!(snapshot.last_serial, Some(2));
        let record = snapshot
            .table
            .get(&crate::dispatch::RegionKey::new("花蓮縣", "花蓮市"))
            .unwrap();
        assert_eq!(record.arrival_epoch, 130);
        assert_eq!(record.label, "4級");
        assert!(snapshot.primary_sends >= 1);
        assert!(channel.sends.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_waiting_revision_blocks_eviction() {
        let (coordinator, _) = coordinator(AppConfig::default());
        let rev = unestimated_revision(1, false);
        coordinator.submit(rev.clone());

        assert_eq!(coordinator.cleanup_stale(Duration::ZERO, Duration::ZERO), 0);

        rev.earthquake
            .intensity_calculated()
            .complete(Arc::new(IntensityReport::default()));
        coordinator.drain().await;
        assert_eq!(coordinator.cleanup_stale(Duration::ZERO, Duration::ZERO), 1);
    }
}
