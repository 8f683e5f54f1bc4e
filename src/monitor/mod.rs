//! Run-time monitors owned by the benchmark process: telemetry-driven
//! performance aggregation and OS-counter consumption sampling.

mod consumption;
mod performance;

pub use consumption::{
    read_board_name, ConsumptionMonitor, ConsumptionSample, CurrentCalibration, SensorPaths,
};
pub use performance::{PerformanceMonitor, PerformanceSample};
