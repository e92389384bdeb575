use anyhow::{Context, Result};
use clap::Parser;
use facechecker_capture::ScreenCapture;
use facechecker_core::{Config, DetectorModel, FaceChecker, OnnxAnalyzer};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod watcher;

use watcher::{Watcher, WatcherSettings};

#[derive(Parser)]
#[command(name = "facecheckerd", about = "Watch the screen and save frames with known faces")]
struct Args {
    /// TOML config file (defaults to $FACECHECKER_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Detector model: fast (hog) or accurate (cnn)
    #[arg(short = 'm', long = "model")]
    model: Option<DetectorModel>,
    /// Match distance threshold
    #[arg(long)]
    threshold: Option<f32>,
    /// Pause between captures, in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,
    /// Monitor index to capture
    #[arg(long)]
    monitor: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(model) = args.model {
        config.detector = model;
    }
    if let Some(threshold) = args.threshold {
        config.match_threshold = threshold;
    }
    if let Some(interval_ms) = args.interval_ms {
        config.capture_interval_ms = interval_ms;
    }
    if let Some(monitor) = args.monitor {
        config.monitor = monitor;
    }
    config.validate()?;

    tracing::info!(
        detector = %config.detector,
        threshold = config.match_threshold,
        interval_ms = config.capture_interval_ms,
        monitor = config.monitor,
        "facecheckerd starting"
    );

    // Fail fast: models, encodings and the monitor must all be available.
    let analyzer = OnnxAnalyzer::load(&config.model_dir, config.detector)
        .with_context(|| format!("failed to load models from {}", config.model_dir.display()))?;
    let checker = FaceChecker::new(analyzer, &config.encodings_path).with_threshold(config.match_threshold);
    let capture = ScreenCapture::open(config.monitor).context("failed to open screen capture")?;

    let settings = WatcherSettings {
        output_dir: config.output_dir.clone(),
        interval: config.capture_interval(),
        skip_blank: config.skip_blank_frames,
    };
    let watcher = Watcher::new(checker, capture, settings).context("run `facechecker train` first")?;

    let token = CancellationToken::new();
    tokio::spawn(cancel_on_signal(token.clone()));

    tracing::info!("facecheckerd ready");
    watcher.run(token).await?;
    tracing::info!("facecheckerd shutting down");

    Ok(())
}

/// Cancel `token` on Ctrl-C or, on Unix, SIGTERM.
async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("shutdown requested, finishing current frame");
    token.cancel();
}
