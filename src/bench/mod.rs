//! Benchmark-side orchestration: experiment identity, the polling loop,
//! engine subprocess lifecycle and report artifacts.

mod experiment;
mod launcher;
mod orchestrator;
mod report;

pub use experiment::Experiment;
pub use launcher::{EngineCommand, EngineHandle};
pub use orchestrator::{Orchestrator, DEFAULT_POLL_INTERVAL};
pub use report::{write_consumption_report, write_performance_report};
