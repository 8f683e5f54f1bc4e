use std::time::Duration;

use anyhow::Result;

use crate::monitor::{ConsumptionMonitor, PerformanceMonitor};
use crate::telemetry::TelemetrySource;

/// Default polling cadence of the benchmark loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Fixed-cadence polling loop correlating resource samples with
/// telemetry.
///
/// Each tick samples consumption first, then folds one telemetry message
/// into the performance monitor. The run terminates once the engine has
/// signaled inactivity *and* at least one timing sample exists; that
/// second clause keeps the loop alive before telemetry starts flowing.
/// There is no timeout: an engine that never reports `active: false`
/// blocks the loop indefinitely.
#[derive(Debug)]
pub struct Orchestrator {
    poll_interval: Duration,
    ticks: usize,
}

impl Orchestrator {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ticks: 0,
        }
    }

    pub fn ticks(&self) -> usize {
        self.ticks
    }

    /// One polling step. Returns true when the termination condition
    /// holds after this tick.
    pub fn tick(
        &mut self,
        source: &mut dyn TelemetrySource,
        performance: &mut PerformanceMonitor,
        consumption: &mut ConsumptionMonitor,
    ) -> Result<bool> {
        consumption.update()?;
        performance.update(source)?;
        self.ticks += 1;
        Ok(!performance.is_active() && performance.measures().is_some())
    }

    /// Poll until the run completes; returns the number of ticks taken.
    pub fn run(
        &mut self,
        source: &mut dyn TelemetrySource,
        performance: &mut PerformanceMonitor,
        consumption: &mut ConsumptionMonitor,
    ) -> Result<usize> {
        loop {
            if self.tick(source, performance, consumption)? {
                return Ok(self.ticks);
            }
            std::thread::sleep(self.poll_interval);
        }
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StageTimings;
    use crate::monitor::SensorPaths;
    use crate::telemetry::TelemetryMessage;
    use std::collections::VecDeque;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    struct Fixtures {
        _files: Vec<NamedTempFile>,
        paths: SensorPaths,
    }

    fn sensor_fixtures() -> Fixtures {
        let mut stat = NamedTempFile::new().unwrap();
        stat.write_all(b"cpu  100 0 100 800 0 0 0 0\n").unwrap();
        let mut meminfo = NamedTempFile::new().unwrap();
        meminfo
            .write_all(b"MemTotal: 4000000 kB\nMemAvailable: 2000000 kB\n")
            .unwrap();
        let mut thermal = NamedTempFile::new().unwrap();
        thermal.write_all(b"45000\n").unwrap();
        let paths = SensorPaths {
            stat: stat.path().to_path_buf(),
            meminfo: meminfo.path().to_path_buf(),
            thermal: thermal.path().to_path_buf(),
            board: PathBuf::from("/nonexistent"),
            rail: None,
        };
        Fixtures {
            _files: vec![stat, meminfo, thermal],
            paths,
        }
    }

    fn data(pre: u64, inf: u64, post: u64) -> TelemetryMessage {
        TelemetryMessage::data(StageTimings {
            pre_ms: pre,
            inf_ms: inf,
            post_ms: post,
        })
    }

    #[test]
    fn stops_after_samples_plus_inactivity() {
        let fixtures = sensor_fixtures();
        let mut consumption = ConsumptionMonitor::new(fixtures.paths.clone());
        let mut performance = PerformanceMonitor::new();

        let mut source: VecDeque<TelemetryMessage> = VecDeque::from(vec![
            TelemetryMessage::status(true),
            data(1, 2, 3),
            data(4, 5, 6),
            data(7, 8, 9),
            TelemetryMessage::status(false),
        ]);

        // The engine announces itself before the loop starts polling.
        performance.update(&mut source).unwrap();
        assert!(performance.is_active());

        let mut orchestrator = Orchestrator::new(Duration::ZERO);
        let ticks = orchestrator
            .run(&mut source, &mut performance, &mut consumption)
            .unwrap();

        // Three ticks collecting samples, one observing inactivity.
        assert_eq!(ticks, 4);
        assert_eq!(performance.measures().unwrap().len(), 3);
        assert_eq!(consumption.measures().unwrap().len(), 4);
    }

    #[test]
    fn inactivity_without_samples_does_not_stop() {
        let fixtures = sensor_fixtures();
        let mut consumption = ConsumptionMonitor::new(fixtures.paths.clone());
        let mut performance = PerformanceMonitor::new();

        let mut source: VecDeque<TelemetryMessage> = VecDeque::from(vec![
            TelemetryMessage::status(true),
            TelemetryMessage::status(false),
        ]);

        let mut orchestrator = Orchestrator::new(Duration::ZERO);
        for _ in 0..5 {
            let done = orchestrator
                .tick(&mut source, &mut performance, &mut consumption)
                .unwrap();
            assert!(!done);
        }
    }

    #[test]
    fn consumption_is_sampled_every_tick_regardless_of_telemetry() {
        let fixtures = sensor_fixtures();
        let mut consumption = ConsumptionMonitor::new(fixtures.paths.clone());
        let mut performance = PerformanceMonitor::new();
        let mut source: VecDeque<TelemetryMessage> = VecDeque::new();

        let mut orchestrator = Orchestrator::new(Duration::ZERO);
        for _ in 0..3 {
            orchestrator
                .tick(&mut source, &mut performance, &mut consumption)
                .unwrap();
        }
        assert_eq!(consumption.measures().unwrap().len(), 3);
        assert!(performance.measures().is_none());
    }
}
