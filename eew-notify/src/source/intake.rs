//! Turns polled revisions into dispatches.
//!
//! The coordinator is handed the revision right away and waits on its intensity
//! signal. The estimate, and for final revisions the map, are computed on the
//! blocking pool and complete the revision's signals when done.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use super::RevisionHandler;
use crate::config::{ConfigService, CustomizationConfig};
use crate::dispatch::DispatchCoordinator;
use crate::earthquake::{
    EewRevision, IntensityEstimator, IntensityReport, MapOutcome, summarize_regions,
};
use crate::map::MapRenderer;

pub struct RevisionIntake {
    config: Arc<ConfigService>,
    coordinator: DispatchCoordinator,
    estimator: Arc<dyn IntensityEstimator>,
    renderer: Option<Arc<dyn MapRenderer>>,
    tasks: Mutex<JoinSet<()>>,
}

impl RevisionIntake {
    pub fn new(
        config: Arc<ConfigService>,
        coordinator: DispatchCoordinator,
        estimator: Arc<dyn IntensityEstimator>,
        renderer: Option<Arc<dyn MapRenderer>>,
    ) -> Self {
        Self {
            config,
            coordinator,
            estimator,
            renderer,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    async fn compute(
        customization: CustomizationConfig,
        estimator: Arc<dyn IntensityEstimator>,
        renderer: Option<Arc<dyn MapRenderer>>,
        revision: EewRevision,
    ) {
        let earthquake = revision.earthquake.clone();
        let report = tokio::task::spawn_blocking(move || {
            let expected = estimator.estimate(&earthquake);
            let regions = summarize_regions(&expected, &customization);
            IntensityReport { expected, regions }
        })
        .await;

        let report = match report {
            Ok(report) => Arc::new(report),
            Err(e) => {
                // Never leave the coordinator waiting on this revision.
                error!(event_id = %revision.id, error = %e, "Intensity estimation failed");
                Arc::new(IntensityReport::default())
            }
        };
        revision
            .earthquake
            .intensity_calculated()
            .complete(report.clone());

        if revision.final_report {
            Self::draw(renderer, &revision, report).await;
        }
    }

    async fn draw(
        renderer: Option<Arc<dyn MapRenderer>>,
        revision: &EewRevision,
        report: Arc<IntensityReport>,
    ) {
        let map = revision.earthquake.map_drawn();
        let Some(renderer) = renderer else {
            map.complete(MapOutcome::Failed("map rendering is disabled".to_string()));
            return;
        };

        let earthquake = revision.earthquake.clone();
        let drawn =
            tokio::task::spawn_blocking(move || renderer.draw(&earthquake, &report.expected))
                .await;

        let outcome = match drawn {
            Ok(Ok(artifact)) => {
                debug!(event_id = %revision.id, bytes = artifact.content.len(), "Map drawn");
                MapOutcome::Drawn(artifact)
            }
            Ok(Err(e)) => {
                warn!(event_id = %revision.id, error = %e, "Map drawing failed");
                MapOutcome::Failed(e.to_string())
            }
            Err(e) => {
                error!(event_id = %revision.id, error = %e, "Map drawing task failed");
                MapOutcome::Failed(e.to_string())
            }
        };
        map.complete(outcome);
    }

    /// Wait for every pending estimation and drawing.
    pub async fn drain(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        while tasks.join_next().await.is_some() {}
    }
}

#[async_trait]
impl RevisionHandler for RevisionIntake {
    async fn accept(&self, revision: EewRevision) {
        self.coordinator.submit(revision.clone());

        // Settings snapshot taken per revision.
        let customization = self.config.current().customization.clone();
        let compute = Self::compute(
            customization,
            self.estimator.clone(),
            self.renderer.clone(),
            revision,
        );

        let mut tasks = self.tasks.lock();
        while tasks.try_join_next().is_some() {}
        tasks.spawn(compute);
    }
}
