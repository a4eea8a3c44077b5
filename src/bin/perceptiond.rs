//! perceptiond - obstacle perception daemon
//!
//! This daemon:
//! 1. Loads configuration (file + environment)
//! 2. Loads the detector and depth networks (stub networks when no model paths are set)
//! 3. Feeds camera frames through the frame scheduler
//! 4. Logs ranked detections and alerts until Ctrl-C or the frame limit

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use perception_kernel::detect::load_model;
use perception_kernel::ingest::SyntheticSource;
use perception_kernel::{
    AlertEvent, AlertSelector, Detection, FrameScheduler, InferenceBackend, LogAlertSink,
    PerceptionConfig, Pipeline, StubBackend,
};

#[derive(Parser, Debug)]
#[command(name = "perceptiond", about = "Obstacle perception daemon")]
struct Args {
    /// Stop after this many captured frames (runs until Ctrl-C when omitted).
    #[arg(long)]
    frames: Option<u64>,

    /// Camera frame rate.
    #[arg(long, default_value_t = 15)]
    fps: u32,

    /// Disable depth fusion (faster, every distance reported as far).
    #[arg(long)]
    no_depth: bool,

    /// Print each delivered detection list as a JSON line on stdout.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("--fps must be greater than zero"));
    }
    let cfg = PerceptionConfig::load()?;

    let labels = cfg.label_table()?;
    let detector: Box<dyn InferenceBackend> = match &cfg.detector.model_path {
        Some(path) => load_model(path, &cfg.detector_input_shape())?,
        None => {
            log::warn!("no detector model configured, using stub detector");
            Box::new(StubBackend::centered_detector(cfg.detector.input_size, labels.len())?)
        }
    };
    let depth: Option<Box<dyn InferenceBackend>> = match &cfg.depth.model_path {
        Some(path) => Some(load_model(path, &cfg.depth_input_shape())?),
        None => {
            log::warn!("no depth model configured, using flat stub depth");
            let stub: Box<dyn InferenceBackend> =
                Box::new(StubBackend::flat_depth(cfg.depth.input_size, 100.0));
            Some(stub)
        }
    };
    let pipeline = Pipeline::new(detector, depth, labels, cfg.pipeline_settings())?;

    let json = args.json;
    let on_result = move |detections: &[Detection], _alert: Option<&AlertEvent>| {
        if json {
            match serde_json::to_string(detections) {
                Ok(line) => println!("{}", line),
                Err(e) => log::warn!("failed to encode detections: {}", e),
            }
        }
        for detection in detections {
            log::info!(
                "{} {:.2} at {:.1} ({})",
                detection.class_name,
                detection.confidence,
                detection.distance,
                detection.category.label()
            );
        }
    };

    let scheduler = FrameScheduler::spawn(
        pipeline,
        AlertSelector::with_policy(cfg.cooldowns),
        LogAlertSink,
        on_result,
        cfg.intervals,
    )?;
    scheduler.set_depth_enabled(cfg.depth.enabled && !args.no_depth);

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();
    ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst))
        .context("failed to install Ctrl-C handler")?;

    let mut source = SyntheticSource::new(cfg.source_config())?;
    source.connect()?;

    let frame_period = Duration::from_secs(1) / args.fps;
    let mut last_health_log = Instant::now();
    log::info!(
        "perceptiond running: {}x{} at {} fps from {}",
        cfg.camera.width,
        cfg.camera.height,
        args.fps,
        cfg.camera.url
    );

    while running.load(Ordering::SeqCst) {
        if args
            .frames
            .is_some_and(|limit| source.stats().frames_captured >= limit)
        {
            break;
        }
        let tick = Instant::now();
        source.capture(|view| scheduler.submit(view))?;

        if last_health_log.elapsed() >= Duration::from_secs(10) {
            let stats = scheduler.stats();
            log::info!(
                "health: captured={} admitted={} busy={} throttled={} failed={} alerts={}",
                source.stats().frames_captured,
                stats.admitted,
                stats.dropped_busy,
                stats.dropped_throttled,
                stats.failed,
                stats.alerts
            );
            last_health_log = Instant::now();
        }

        if let Some(rest) = frame_period.checked_sub(tick.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    let stats = scheduler.stats();
    scheduler.shutdown()?;
    log::info!(
        "perceptiond stopped: {} frames admitted, {} delivered, {} alerts",
        stats.admitted,
        stats.delivered,
        stats.alerts
    );
    Ok(())
}
