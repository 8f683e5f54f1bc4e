//! engine - inference-engine process.
//!
//! Runs the detection pipeline over a folder of images and publishes
//! status and per-stage timing telemetry for the benchmark monitor.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use edgebench::detect::ArchFamily;
use edgebench::{CoreBudget, Detector, EdgebenchConfig, PostprocessParams, TelemetryProducer};

#[derive(Parser, Debug)]
#[command(author, version, about = "Run detection inference over an image folder, publishing telemetry")]
struct Args {
    /// Folder containing the benchmark images.
    #[arg(long, env = "EDGEBENCH_IMAGES_FOLDER")]
    images_folder: PathBuf,

    /// Path to the detection model file.
    #[arg(long, env = "EDGEBENCH_MODEL_PATH")]
    model_path: PathBuf,

    /// Architecture family override (yolov5|yolov8|yolo11); inferred from
    /// the model file name when omitted.
    #[arg(long)]
    arch: Option<String>,

    /// Restrict inference to half of the available cores.
    #[arg(long)]
    half_cores: bool,

    /// Write annotated copies of the input images into this folder.
    #[arg(long)]
    output_folder: Option<PathBuf>,

    /// MQTT client identifier.
    #[arg(long, default_value = "inference-engine")]
    client_id: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = EdgebenchConfig::load()?;

    let arch = args
        .arch
        .as_deref()
        .map(ArchFamily::parse)
        .transpose()
        .context("invalid --arch value")?;
    let budget = if args.half_cores {
        CoreBudget::Half
    } else {
        CoreBudget::Full
    };

    let mut detector = Detector::new(PostprocessParams {
        score_thresh: config.thresholds.score,
        confidence_thresh: config.thresholds.confidence,
        iou_thresh: config.thresholds.iou,
    });
    detector.init(
        &args.model_path,
        arch,
        (config.input_size, config.input_size),
        budget,
    )?;

    let mut producer = TelemetryProducer::start(&config.broker, &args.client_id)?;

    let stop = Arc::new(AtomicBool::new(false));
    let stop_signal = stop.clone();
    ctrlc::set_handler(move || {
        stop_signal.store(true, Ordering::SeqCst);
    })
    .context("failed to install signal handler")?;

    let processed = edgebench::runner::run_folder(
        &mut detector,
        &mut producer,
        &args.images_folder,
        args.output_folder.as_deref(),
        &stop,
    )?;
    producer.stop()?;

    log::info!("engine finished: {} images processed", processed);
    Ok(())
}
