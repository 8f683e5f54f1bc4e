//! benchmark - monitor/orchestrator process.
//!
//! Spawns the inference engine, polls resource counters while aggregating
//! its telemetry, and writes the per-experiment report artifacts.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use edgebench::bench::{write_consumption_report, write_performance_report};
use edgebench::detect::ArchFamily;
use edgebench::monitor::read_board_name;
use edgebench::{
    ConsumptionMonitor, CoreBudget, CurrentCalibration, EdgebenchConfig, EngineCommand, Experiment,
    ModelSpec, Orchestrator, PerformanceMonitor, TelemetryConsumer,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Benchmark detection inference on this board")]
struct Args {
    /// Folder containing the benchmark images.
    #[arg(long, env = "EDGEBENCH_IMAGES_FOLDER")]
    images_folder: PathBuf,

    /// Path to the detection model file.
    #[arg(long, env = "EDGEBENCH_MODEL_PATH")]
    model_path: PathBuf,

    /// Architecture family override (yolov5|yolov8|yolo11).
    #[arg(long)]
    arch: Option<String>,

    /// Restrict the engine to half of the available cores.
    #[arg(long)]
    half_cores: bool,

    /// Language tag of the engine implementation, recorded in the
    /// experiment identity.
    #[arg(long, default_value = "rust")]
    language: String,

    /// Engine binary to spawn; defaults to the `engine` binary next to
    /// this executable.
    #[arg(long)]
    engine_bin: Option<PathBuf>,

    /// Lower current bound for the post-hoc estimator, in mA.
    #[arg(long, default_value_t = 100.0)]
    min_current_ma: f32,

    /// Upper current bound for the post-hoc estimator, in mA.
    #[arg(long, default_value_t = 900.0)]
    max_current_ma: f32,
}

fn engine_binary(args: &Args) -> Result<PathBuf> {
    if let Some(path) = &args.engine_bin {
        return Ok(path.clone());
    }
    let current = std::env::current_exe().context("cannot locate the benchmark executable")?;
    Ok(current.with_file_name("engine"))
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

    let spec = ModelSpec::resolve(&args.model_path, arch)?;
    let board = read_board_name(&config.sensors.board)?;
    let experiment = Experiment::new(
        board,
        &args.model_path,
        spec,
        budget,
        args.language.clone(),
    );
    log::info!("starting benchmark: {}", experiment.summary());

    let mut consumer = TelemetryConsumer::start(&config.broker, "benchmark")?;

    let mut command = EngineCommand::new(engine_binary(&args)?)
        .arg("--images-folder")
        .arg(args.images_folder.display().to_string())
        .arg("--model-path")
        .arg(args.model_path.display().to_string());
    if let Some(arch) = arch {
        command = command.arg("--arch").arg(arch.token());
    }
    if args.half_cores {
        command = command.arg("--half-cores");
    }
    let mut engine = command.spawn()?;

    let mut performance = PerformanceMonitor::new();
    let mut consumption = ConsumptionMonitor::new(config.sensors.clone());
    let mut orchestrator = Orchestrator::new(Duration::from_millis(config.poll_interval_ms));

    let ticks = match orchestrator.run(&mut consumer, &mut performance, &mut consumption) {
        Ok(ticks) => ticks,
        Err(e) => {
            // Do not leave the engine running detached when the monitor
            // aborts mid-run.
            log::error!("benchmark loop failed, stopping the engine: {:#}", e);
            let _ = engine.kill();
            return Err(e);
        }
    };
    consumer.stop()?;
    log::info!("benchmark loop terminated after {} ticks", ticks);

    // A crashed engine would otherwise go unnoticed once telemetry stops.
    engine.wait()?;

    consumption.estimate_currents(
        CurrentCalibration {
            min_ma: args.min_current_ma,
            max_ma: args.max_current_ma,
        },
        budget,
    );

    let output_dir = experiment.output_dir(&config.output_root);
    let performance_samples = performance
        .measures()
        .context("run terminated without performance samples")?;
    let consumption_samples = consumption
        .measures()
        .context("run terminated without consumption samples")?;
    let perf_path = write_performance_report(&output_dir, performance_samples)?;
    let cons_path = write_consumption_report(&output_dir, consumption_samples)?;

    let images = performance_samples.len() as f64;
    let mean = |f: fn(&edgebench::PerformanceSample) -> u64| {
        performance_samples.iter().map(|s| f(s) as f64).sum::<f64>() / images
    };
    log::info!(
        "{} images: mean pre {:.1}ms, inference {:.1}ms, post {:.1}ms",
        performance_samples.len(),
        mean(|s| s.pre_ms),
        mean(|s| s.inf_ms),
        mean(|s| s.post_ms)
    );
    log::info!(
        "reports written to {} and {}",
        perf_path.display(),
        cons_path.display()
    );
    Ok(())
}
