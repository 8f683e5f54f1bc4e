//! edgebench
//!
//! Benchmarks object-detection inference on an edge board. Two processes
//! cooperate over MQTT:
//!
//! - the **engine** (`src/bin/engine.rs`) runs a detection pipeline over a
//!   folder of images and publishes per-stage timings plus an active flag;
//! - the **benchmark** monitor (`src/bin/benchmark.rs`) spawns the engine,
//!   polls OS resource counters every tick, aggregates the telemetry and
//!   writes the report artifacts once the run terminates.
//!
//! # Module Structure
//!
//! - `detect`: backend abstraction, pre/post-processing (NMS, coordinate
//!   rescaling) and the detector state machine
//! - `telemetry`: MQTT producer/consumer with a bounded FIFO queue and a
//!   validated JSON message schema
//! - `monitor`: performance aggregation and consumption sampling
//! - `bench`: experiment identity, orchestrator polling loop, engine
//!   launcher, report writer
//! - `runner`: engine-side folder driver
//! - `config`: layered TOML + env configuration

pub mod bench;
pub mod config;
pub mod detect;
pub mod monitor;
#[cfg(feature = "annotate")]
pub mod plot;
pub mod runner;
pub mod telemetry;

pub use bench::{EngineCommand, EngineHandle, Experiment, Orchestrator};
pub use config::EdgebenchConfig;
pub use detect::{
    ArchFamily, BoundingBox, CoreBudget, DetectError, Detection, Detector, InferenceBackend,
    ModelFormat, ModelSpec, PostprocessParams, StageTimings, StubBackend,
};
pub use monitor::{
    ConsumptionMonitor, ConsumptionSample, CurrentCalibration, PerformanceMonitor,
    PerformanceSample, SensorPaths,
};
pub use telemetry::{
    BrokerSettings, TelemetryConsumer, TelemetryMessage, TelemetryProducer, TelemetrySink,
    TelemetrySource,
};
