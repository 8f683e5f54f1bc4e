use anyhow::Result;

use crate::telemetry::{TelemetryMessage, TelemetrySource};

/// Per-image stage timings collected from the data topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PerformanceSample {
    pub pre_ms: u64,
    pub inf_ms: u64,
    pub post_ms: u64,
}

/// Aggregates telemetry into an `active` flag plus a timing-sample
/// history, ordered by arrival.
///
/// Plain context object: construct one per experiment and pass it to the
/// orchestrator loop by reference.
#[derive(Debug, Default)]
pub struct PerformanceMonitor {
    active: bool,
    samples: Vec<PerformanceSample>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume at most one telemetry message and fold it into the state.
    pub fn update(&mut self, source: &mut dyn TelemetrySource) -> Result<()> {
        match source.consume()? {
            Some(TelemetryMessage::Status(status)) => {
                self.active = status.active;
            }
            Some(TelemetryMessage::Data(timing)) => {
                self.samples.push(PerformanceSample {
                    pre_ms: timing.pre_processing_time,
                    inf_ms: timing.inference_time,
                    post_ms: timing.post_processing_time,
                });
            }
            None => {}
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Collected samples, or `None` until the first data message arrived.
    pub fn measures(&self) -> Option<&[PerformanceSample]> {
        if self.samples.is_empty() {
            None
        } else {
            Some(&self.samples)
        }
    }

    pub fn reset(&mut self) {
        self.active = false;
        self.samples.clear();
    }
}
