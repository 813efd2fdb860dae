// src/main.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use log::{error, info, warn};

use screenlog_node::config::{self, Config};
use screenlog_node::core::{Clock, SystemClock};
use screenlog_node::monitoring::{self, Metrics};
use screenlog_node::producers;
use screenlog_node::recorder::{
    ArchiveWorker, Archiver, CaptureScheduler, FfmpegEncoder, PngSink, Recorder, RecorderConfig,
    StorageLayout, run_recorder,
};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // ------------------------------------------------------------
    // Config
    // ------------------------------------------------------------
    let cfg_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "screenlog.toml".into());

    let cfg: Config = config::load(&cfg_path)?;
    info!("[screenlog] loaded {}", cfg_path);

    // ------------------------------------------------------------
    // Graceful shutdown
    // ------------------------------------------------------------
    let running = Arc::new(AtomicBool::new(true));
    {
        let r = running.clone();
        ctrlc::set_handler(move || {
            info!("[screenlog] shutdown requested");
            r.store(false, Ordering::SeqCst);
        })?;
    }

    // ------------------------------------------------------------
    // Recorder + archive worker
    // ------------------------------------------------------------
    let metrics = Arc::new(Metrics::new());
    let recorder_thread = start_recorder(&cfg, metrics.clone(), running.clone())?;

    // ------------------------------------------------------------
    // Main loop
    // ------------------------------------------------------------
    info!("[screenlog] running - Ctrl+C to stop");

    let stats_interval = Duration::from_secs(cfg.monitoring.stats_interval_secs.max(1));
    let mut last_stats = Instant::now();

    while running.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));

        if recorder_thread.is_finished() {
            warn!("[screenlog] recorder thread exited");
            running.store(false, Ordering::SeqCst);
            break;
        }

        if last_stats.elapsed() >= stats_interval {
            report_stats(&cfg, &metrics);
            last_stats = Instant::now();
        }
    }

    // ------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------
    info!("[screenlog] shutting down…");
    match recorder_thread.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("[screenlog] recorder error: {:#}", e),
        Err(_) => error!("[screenlog] recorder thread panicked"),
    }
    report_stats(&cfg, &metrics);
    info!("[screenlog] shutdown complete");

    Ok(())
}

fn start_recorder(
    cfg: &Config,
    metrics: Arc<Metrics>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<std::thread::JoinHandle<anyhow::Result<()>>> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let layout = StorageLayout::new(cfg.root(), cfg.bucket.granularity);

    let source = producers::build_source(&cfg.capture)?;
    info!("[screenlog] capture source: {}", source.name());

    let archiver = Archiver::new(
        layout.clone(),
        Box::new(FfmpegEncoder::new()),
        cfg.video_settings(),
        cfg.retention(),
        cfg.retry(),
        metrics.clone(),
    );
    let worker = ArchiveWorker::spawn(archiver, clock.clone())?;

    let rec_cfg = RecorderConfig {
        tick: cfg.tick(),
        sweep_interval: cfg.sweep_interval(),
    };

    let mut recorder = Recorder::new(
        clock,
        layout.clone(),
        CaptureScheduler::new(source, cfg.schedule()),
        Box::new(PngSink::new(layout)),
        Box::new(worker),
        metrics,
        rec_cfg.sweep_interval,
    );

    // Unwritable storage is the one fatal condition.
    recorder
        .start()
        .with_context(|| format!("preparing {}", cfg.root().display()))?;

    info!(
        "[screenlog] recorder enabled ({:?} x{} per {:?}, {:?} buckets, keep {})",
        cfg.schedule().interval(),
        cfg.capture.per_unit,
        cfg.capture.timescale,
        cfg.bucket.granularity,
        cfg.archive.limit
    );

    let handle = std::thread::Builder::new()
        .name("recorder".into())
        .spawn(move || run_recorder(recorder, rec_cfg, running))?;
    Ok(handle)
}

fn report_stats(cfg: &Config, metrics: &Metrics) {
    info!("[screenlog] {}", metrics.snapshot().summary());

    if let Some(path) = &cfg.monitoring.metrics_file {
        if let Err(e) = monitoring::write_metrics_file(std::path::Path::new(path), metrics) {
            warn!("[monitoring] writing {} failed: {}", path, e);
        }
    }
}
