use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::monitor::SensorPaths;
use crate::telemetry::BrokerSettings;

const DEFAULT_SCORE_THRESH: f32 = 0.25;
const DEFAULT_CONFIDENCE_THRESH: f32 = 0.5;
const DEFAULT_IOU_THRESH: f32 = 0.5;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_OUTPUT_ROOT: &str = "reports";
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Environment variable naming the TOML config file.
pub const CONFIG_ENV: &str = "EDGEBENCH_CONFIG";

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    broker: Option<BrokerSection>,
    thresholds: Option<ThresholdSection>,
    sensors: Option<SensorSection>,
    benchmark: Option<BenchmarkSection>,
}

#[derive(Debug, Deserialize, Default)]
struct BrokerSection {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
struct ThresholdSection {
    score: Option<f32>,
    confidence: Option<f32>,
    iou: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct SensorSection {
    stat: Option<PathBuf>,
    meminfo: Option<PathBuf>,
    thermal: Option<PathBuf>,
    board: Option<PathBuf>,
    rail: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct BenchmarkSection {
    poll_interval_ms: Option<u64>,
    output_root: Option<PathBuf>,
    input_size: Option<u32>,
}

/// Detection thresholds shared by both processes.
#[derive(Clone, Copy, Debug)]
pub struct Thresholds {
    pub score: f32,
    pub confidence: f32,
    pub iou: f32,
}

/// Merged, validated configuration.
#[derive(Clone, Debug)]
pub struct EdgebenchConfig {
    pub broker: BrokerSettings,
    pub thresholds: Thresholds,
    pub sensors: SensorPaths,
    pub poll_interval_ms: u64,
    pub output_root: PathBuf,
    pub input_size: u32,
}

impl EdgebenchConfig {
    /// Load from the file named by `EDGEBENCH_CONFIG` (defaults apply when
    /// unset), then apply environment overrides and validate.
    pub fn load() -> Result<Self> {
        let file_cfg = match std::env::var(CONFIG_ENV).ok() {
            Some(path) => read_config_file(Path::new(&path))?,
            None => ConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ConfigFile) -> Self {
        let defaults = SensorPaths::default();
        let sensors = match file.sensors {
            Some(section) => SensorPaths {
                stat: section.stat.unwrap_or(defaults.stat),
                meminfo: section.meminfo.unwrap_or(defaults.meminfo),
                thermal: section.thermal.unwrap_or(defaults.thermal),
                board: section.board.unwrap_or(defaults.board),
                rail: section.rail,
            },
            None => defaults,
        };
        let broker_defaults = BrokerSettings::default();
        let broker = match file.broker {
            Some(section) => BrokerSettings {
                host: section.host.unwrap_or(broker_defaults.host),
                port: section.port.unwrap_or(broker_defaults.port),
            },
            None => broker_defaults,
        };
        let thresholds = file.thresholds.unwrap_or_default();
        let benchmark = file.benchmark.unwrap_or_default();
        Self {
            broker,
            thresholds: Thresholds {
                score: thresholds.score.unwrap_or(DEFAULT_SCORE_THRESH),
                confidence: thresholds.confidence.unwrap_or(DEFAULT_CONFIDENCE_THRESH),
                iou: thresholds.iou.unwrap_or(DEFAULT_IOU_THRESH),
            },
            sensors,
            poll_interval_ms: benchmark.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            output_root: benchmark
                .output_root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_ROOT)),
            input_size: benchmark.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("EDGEBENCH_BROKER_HOST") {
            self.broker.host = host;
        }
        if let Ok(port) = std::env::var("EDGEBENCH_BROKER_PORT") {
            self.broker.port = port
                .parse()
                .context("EDGEBENCH_BROKER_PORT is not a port number")?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("score", self.thresholds.score),
            ("confidence", self.thresholds.confidence),
            ("iou", self.thresholds.iou),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} threshold {} is outside [0, 1]", name, value));
            }
        }
        if self.broker.host.is_empty() {
            return Err(anyhow!("broker host is empty"));
        }
        if self.poll_interval_ms == 0 {
            return Err(anyhow!("poll interval must be at least 1ms"));
        }
        if self.input_size == 0 {
            return Err(anyhow!("model input size must be positive"));
        }
        Ok(())
    }
}

impl Default for EdgebenchConfig {
    fn default() -> Self {
        Self::from_file(ConfigFile::default())
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("invalid config file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_match_benchmark_conventions() {
        let cfg = EdgebenchConfig::default();
        assert_eq!(cfg.broker.host, "localhost");
        assert_eq!(cfg.broker.port, 1883);
        assert_eq!(cfg.thresholds.score, 0.25);
        assert_eq!(cfg.poll_interval_ms, 100);
        assert!(cfg.sensors.rail.is_none());
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[broker]\nhost = \"broker.local\"\nport = 1884\n\n[thresholds]\niou = 0.4\n\n[sensors]\nrail = \"/sys/bus/i2c/rails\"\n"
        )
        .unwrap();
        let parsed = read_config_file(file.path()).unwrap();
        let cfg = EdgebenchConfig::from_file(parsed);
        assert_eq!(cfg.broker.host, "broker.local");
        assert_eq!(cfg.broker.port, 1884);
        assert_eq!(cfg.thresholds.iou, 0.4);
        assert_eq!(cfg.thresholds.score, 0.25);
        assert_eq!(cfg.sensors.rail.as_deref(), Some(Path::new("/sys/bus/i2c/rails")));
    }

    #[test]
    fn out_of_range_threshold_fails_validation() {
        let mut cfg = EdgebenchConfig::default();
        cfg.thresholds.iou = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_config_file_is_an_error() {
        assert!(read_config_file(Path::new("/nonexistent/edgebench.toml")).is_err());
    }
}
