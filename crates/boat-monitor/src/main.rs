use aggregator::{Aggregator, CsvRecordSink, DailyCounter};
use anyhow::{Context, Result};
use boat_monitor::MonitorConfig;
use clap::Parser;
use common::site::SiteFile;
use ocr_service::{
    KnownIdentifiers, OcrConfig, OcrDiagnostics, OcrEngine, PlateReader, ScriptedOcrEngine,
    SmartValidator,
};
use std::sync::Arc;
use telemetry::{init_structured_logging, LogConfig};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracker_node::{CameraWorker, ReplaySource, SnapshotBoard};

#[tokio::main]
async fn main() -> Result<()> {
    let config = MonitorConfig::parse();
    let _log_guard = init_structured_logging(
        LogConfig::new("boat-monitor")
            .with_version(env!("CARGO_PKG_VERSION"))
            .with_location(&config.location),
    );

    let sites = SiteFile::from_path(&config.site_file)?;
    let site = sites.site(&config.location)?;
    config.validate(&site).context("invalid camera configuration")?;
    let preserved = sites.location_names();

    let known = match &config.known_identifiers {
        Some(path) => KnownIdentifiers::from_path(path)?,
        None => {
            warn!("no known identifier file configured, licence matching disabled");
            KnownIdentifiers::default()
        }
    };
    info!(
        location = %site.location,
        cameras = site.cameras.len(),
        known_identifiers = known.len(),
        "starting boat monitor"
    );

    let ocr_config = OcrConfig::from_env();
    let tracker_config = config.tracker_config();
    let aggregator_config = config.aggregator_config();

    // Replayed tracker output carries its OCR candidates; no recognizer runs here
    let engine: Arc<dyn OcrEngine> = Arc::new(ScriptedOcrEngine::new());
    let validator = Arc::new(SmartValidator::new(known)?);
    let mut reader = PlateReader::new(validator, engine, ocr_config.clone());
    if let Some(dir) = &ocr_config.diagnostics_dir {
        info!(dir = %dir.display(), "OCR diagnostics enabled");
        reader = reader.with_diagnostics(Arc::new(OcrDiagnostics::new(
            dir.clone(),
            ocr_config.difficult_dir.clone(),
        )));
    }
    let reader = Arc::new(reader);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let counter = DailyCounter::new();
    let sink = Arc::new(CsvRecordSink::new(
        &aggregator_config.output_root,
        &site.location,
        &preserved,
    ));
    let aggregator_token = CancellationToken::new();
    let aggregator = Aggregator::new(aggregator_config, &site.location, sink, Some(counter.clone()))
        .spawn(events_rx, aggregator_token.clone());

    let board = SnapshotBoard::new(site.cameras.iter().map(|c| c.id));
    let camera_token = CancellationToken::new();
    let mut cameras = JoinSet::new();
    for camera in &site.cameras {
        let source = match ReplaySource::for_camera(&config.replay_dir, camera.id) {
            Ok(source) => source.with_realtime(tracker_config.replay_realtime),
            Err(e) => {
                warn!(camera = camera.id, error = %e, "no tracker output for camera, skipping");
                continue;
            }
        };

        let worker = CameraWorker::new(
            camera.clone(),
            site.location.clone(),
            preserved.clone(),
            reader.clone(),
            board.clone(),
            events_tx.clone(),
            tracker_config.clone(),
            ocr_config.clone(),
        );
        let id = camera.id;
        let token = camera_token.clone();
        cameras.spawn_blocking(move || (id, worker.run(Box::new(source), token)));
    }
    drop(events_tx);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!(error = %e, "failed to listen for shutdown signal");
                }
                info!("shutdown requested");
                break;
            }
            joined = cameras.join_next() => match joined {
                Some(Ok((camera, events))) => info!(camera, events, "camera finished"),
                Some(Err(e)) => error!(error = %e, "camera worker failed"),
                None => {
                    info!("all cameras finished");
                    break;
                }
            },
        }
    }

    camera_token.cancel();
    let remaining = async {
        while let Some(joined) = cameras.join_next().await {
            match joined {
                Ok((camera, events)) => info!(camera, events, "camera stopped"),
                Err(e) => error!(error = %e, "camera worker failed"),
            }
        }
    };
    if tokio::time::timeout(config.shutdown_grace(), remaining).await.is_err() {
        warn!(
            grace_secs = config.shutdown_grace_secs,
            "camera workers did not stop in time, abandoning them"
        );
        cameras.abort_all();
    }

    aggregator_token.cancel();
    let stats = aggregator.await.context("aggregator task failed")?;
    info!(
        paired = stats.paired,
        timed_out = stats.timed_out,
        unmatched_secondary = stats.unmatched_secondary,
        written = stats.records_written,
        today = counter.get(),
        "boat monitor stopped"
    );

    match telemetry::encode_metrics() {
        Ok(metrics) => debug!(%metrics, "final metrics"),
        Err(e) => warn!(error = %e, "failed to encode metrics"),
    }

    if stats.records_unwritten > 0 {
        anyhow::bail!("{} completed records could not be written", stats.records_unwritten);
    }
    Ok(())
}
