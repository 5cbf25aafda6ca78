use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use eew_notify::config::ConfigService;
use eew_notify::dispatch::DispatchCoordinator;
use eew_notify::earthquake::{AttenuationEstimator, IntensityEstimator, RegionCatalog};
use eew_notify::logging::{self, LoggingHandle};
use eew_notify::map::{HtmlMapRenderer, MapProvider, MapRenderer, ScriptUploadProvider};
use eew_notify::notification::NotificationService;
use eew_notify::source::{EewClient, ExpTechHttp, RevisionIntake};
use eew_notify::utils::http_client;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file
    #[arg(short, long, env = "EEW_NOTIFY_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Send a test message through every enabled channel and exit
    #[arg(long)]
    test_channels: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = Arc::new(
        ConfigService::load(&args.config)
            .with_context(|| format!("Failed to load settings from {}", args.config.display()))?,
    );
    let settings = config.current();

    let (logging, _guard) = logging::init_logging(&settings.log, settings.debug_mode)
        .context("Failed to initialize logging")?;
    let shutdown = CancellationToken::new();
    let log_cleanup = logging.start_retention_cleanup(shutdown.child_token());

    let client =
        http_client::build_client(Duration::from_secs(settings.source.request_timeout_secs));

    let notifier = Arc::new(NotificationService::from_configs(
        &settings.channels,
        client.clone(),
    ));
    notifier.start().await;

    if args.test_channels {
        let report = notifier.test_channels().await;
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Channel test finished"
        );
        if report.failed() > 0 {
            anyhow::bail!("{} channel(s) failed the test", report.failed());
        }
        return Ok(());
    }

    let catalog = RegionCatalog::load(&settings.estimator.regions_file)
        .context("Failed to load region catalog")?;
    info!(regions = catalog.len(), "Region catalog loaded");
    let estimator: Arc<dyn IntensityEstimator> = Arc::new(AttenuationEstimator::new(catalog));

    let (renderer, map_provider) = match settings.map.upload_target() {
        Some(target) if settings.map.enabled => (
            Some(Arc::new(HtmlMapRenderer::new()) as Arc<dyn MapRenderer>),
            Some(Arc::new(ScriptUploadProvider::new(client.clone(), target)) as Arc<dyn MapProvider>),
        ),
        _ => (None, None),
    };

    let coordinator = DispatchCoordinator::new(config.clone(), notifier.clone(), map_provider);
    coordinator.start_sweeper();

    let intake = RevisionIntake::new(config.clone(), coordinator.clone(), estimator, renderer);
    let http = ExpTechHttp::new(client.clone(), &settings.source.api_nodes)?;
    let eew_client = Arc::new(EewClient::new(http, config.clone(), intake));

    #[cfg(unix)]
    spawn_reload_listener(
        config.clone(),
        notifier.clone(),
        logging.clone(),
        client.clone(),
        shutdown.child_token(),
    )?;

    let poller = {
        let eew_client = eew_client.clone();
        let token = shutdown.child_token();
        tokio::spawn(async move { eew_client.run(token).await })
    };

    info!("eew-notify started");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("Shutdown requested");

    shutdown.cancel();
    if let Err(e) = poller.await {
        error!(error = %e, "EEW client task failed");
    }
    eew_client.handler().drain().await;
    coordinator.shutdown().await;
    if let Err(e) = log_cleanup.await {
        error!(error = %e, "Log retention task failed");
    }

    let stats = notifier.stats();
    info!(sent = stats.sent, failed = stats.failed, "eew-notify stopped");
    Ok(())
}

/// Reload settings on SIGHUP. Channels and the log filter follow the new file;
/// other sections apply to later evaluations through the config snapshot.
#[cfg(unix)]
fn spawn_reload_listener(
    config: Arc<ConfigService>,
    notifier: Arc<NotificationService>,
    logging: Arc<LoggingHandle>,
    client: reqwest::Client,
    token: CancellationToken,
) -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to listen for SIGHUP")?;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                    if let Err(e) = config.reload() {
                        warn!(error = %e, "Settings reload failed; keeping previous settings");
                        continue;
                    }
                    let settings = config.current();
                    logging.apply_config(&settings.log, settings.debug_mode);
                    notifier.init_channels(&settings.channels, client.clone());
                    notifier.start().await;
                }
            }
        }
    });
    Ok(())
}
