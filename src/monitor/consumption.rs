use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::detect::CoreBudget;

/// Reference voltage used to convert per-rail power into a package-level
/// current figure.
const V_REF: f32 = 5.0;

/// One resource snapshot per orchestrator tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ConsumptionSample {
    pub cpu_usage_pct: f32,
    pub cpu_temp_c: f32,
    pub ram_used_mb: f32,
    pub current_ma: f32,
}

/// Operator-supplied current bounds for the post-hoc estimator.
#[derive(Clone, Copy, Debug)]
pub struct CurrentCalibration {
    pub min_ma: f32,
    pub max_ma: f32,
}

impl CurrentCalibration {
    /// Linear interpolation between the bounds, scaled by observed CPU
    /// load against the budget's ceiling (50 on a half budget, else 100).
    pub fn estimate(&self, cpu_usage_pct: f32, budget: CoreBudget) -> f32 {
        self.min_ma + (self.max_ma - self.min_ma) * (cpu_usage_pct / budget.cpu_ceiling())
    }
}

/// OS counter locations read by the sampler. Defaults target a Linux SBC;
/// tests point them at fixture files.
#[derive(Clone, Debug)]
pub struct SensorPaths {
    pub stat: PathBuf,
    pub meminfo: PathBuf,
    pub thermal: PathBuf,
    pub board: PathBuf,
    /// Hardware rail sensor, when the board has one.
    pub rail: Option<PathBuf>,
}

impl Default for SensorPaths {
    fn default() -> Self {
        Self {
            stat: PathBuf::from("/proc/stat"),
            meminfo: PathBuf::from("/proc/meminfo"),
            thermal: PathBuf::from("/sys/class/thermal/thermal_zone0/temp"),
            board: PathBuf::from("/proc/device-tree/model"),
            rail: None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct CpuTimes {
    busy: u64,
    total: u64,
}

/// Samples CPU load, SoC temperature, used RAM and (optionally) measured
/// current once per tick, independent of the telemetry cadence.
///
/// A missing or unreadable sensor file is fatal; the run aborts rather
/// than producing a gappy report.
#[derive(Debug)]
pub struct ConsumptionMonitor {
    paths: SensorPaths,
    previous_cpu: Option<CpuTimes>,
    samples: Vec<ConsumptionSample>,
}

impl ConsumptionMonitor {
    pub fn new(paths: SensorPaths) -> Self {
        Self {
            paths,
            previous_cpu: None,
            samples: Vec::new(),
        }
    }

    /// Append one sample from the OS counters.
    pub fn update(&mut self) -> Result<()> {
        let cpu_usage_pct = self.read_cpu_usage()?;
        let cpu_temp_c = read_thermal(&self.paths.thermal)?;
        let ram_used_mb = read_ram_used_mb(&self.paths.meminfo)?;
        let current_ma = match &self.paths.rail {
            Some(rail) => read_rail_current_ma(rail)?,
            None => 0.0,
        };
        self.samples.push(ConsumptionSample {
            cpu_usage_pct,
            cpu_temp_c,
            ram_used_mb,
            current_ma,
        });
        Ok(())
    }

    /// Collected samples, or `None` before the first tick.
    pub fn measures(&self) -> Option<&[ConsumptionSample]> {
        if self.samples.is_empty() {
            None
        } else {
            Some(&self.samples)
        }
    }

    pub fn has_rail_sensor(&self) -> bool {
        self.paths.rail.is_some()
    }

    /// Fill in current draw post-hoc from the CPU-load estimator.
    ///
    /// No-op when a hardware rail sensor measured it directly.
    pub fn estimate_currents(&mut self, calibration: CurrentCalibration, budget: CoreBudget) {
        if self.has_rail_sensor() {
            return;
        }
        for sample in &mut self.samples {
            sample.current_ma = calibration.estimate(sample.cpu_usage_pct, budget);
        }
    }

    pub fn reset(&mut self) {
        self.previous_cpu = None;
        self.samples.clear();
    }

    fn read_cpu_usage(&mut self) -> Result<f32> {
        let current = read_cpu_times(&self.paths.stat)?;
        let usage = match self.previous_cpu {
            // First tick has no delta to compute against.
            None => 0.0,
            Some(previous) => {
                let total = current.total.saturating_sub(previous.total);
                let busy = current.busy.saturating_sub(previous.busy);
                if total == 0 {
                    0.0
                } else {
                    busy as f32 / total as f32 * 100.0
                }
            }
        };
        self.previous_cpu = Some(current);
        Ok(usage)
    }
}

fn read_cpu_times(path: &Path) -> Result<CpuTimes> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read CPU counters from {}", path.display()))?;
    let line = text
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| anyhow!("no aggregate cpu line in {}", path.display()))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(|f| f.parse::<u64>())
        .collect::<Result<_, _>>()
        .with_context(|| format!("malformed cpu line in {}", path.display()))?;
    if fields.len() < 5 {
        return Err(anyhow!("cpu line in {} has too few fields", path.display()));
    }
    let total: u64 = fields.iter().sum();
    // idle + iowait are the non-busy columns.
    let idle = fields[3] + fields[4];
    Ok(CpuTimes {
        busy: total - idle,
        total,
    })
}

/// Thermal zone file: integer milli-degrees Celsius.
fn read_thermal(path: &Path) -> Result<f32> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read thermal sensor {}", path.display()))?;
    let millidegrees: f32 = text
        .trim()
        .parse()
        .with_context(|| format!("malformed thermal reading in {}", path.display()))?;
    Ok(millidegrees / 1000.0)
}

/// Used memory in megabytes: MemTotal minus MemAvailable.
fn read_ram_used_mb(path: &Path) -> Result<f32> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read memory counters from {}", path.display()))?;
    let field_kb = |name: &str| -> Result<u64> {
        text.lines()
            .find(|l| l.starts_with(name))
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| anyhow!("no {} field in {}", name, path.display()))
    };
    let total = field_kb("MemTotal:")?;
    let available = field_kb("MemAvailable:")?;
    Ok(total.saturating_sub(available) as f32 / 1024.0)
}

/// Rail sensor format: `PREFIX_A=<amps>A` and `PREFIX_V=<volts>V` lines,
/// paired by shared prefix. Per-rail power is clipped at zero, divided by
/// the reference voltage and summed into a single milliamp figure.
fn read_rail_current_ma(path: &Path) -> Result<f32> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read rail sensor {}", path.display()))?;
    parse_rail_current_ma(&text)
}

fn parse_rail_current_ma(text: &str) -> Result<f32> {
    let mut rails: BTreeMap<String, (Option<f32>, Option<f32>)> = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| anyhow!("malformed rail line '{}'", line))?;
        let entry = if let Some(prefix) = key.strip_suffix("_A") {
            let amps: f32 = value
                .strip_suffix('A')
                .ok_or_else(|| anyhow!("rail line '{}' missing 'A' unit", line))?
                .parse()
                .with_context(|| format!("malformed amps in '{}'", line))?;
            (prefix, amps, true)
        } else if let Some(prefix) = key.strip_suffix("_V") {
            let volts: f32 = value
                .strip_suffix('V')
                .ok_or_else(|| anyhow!("rail line '{}' missing 'V' unit", line))?
                .parse()
                .with_context(|| format!("malformed volts in '{}'", line))?;
            (prefix, volts, false)
        } else {
            continue;
        };
        let slot = rails.entry(entry.0.to_string()).or_insert((None, None));
        if entry.2 {
            slot.0 = Some(entry.1);
        } else {
            slot.1 = Some(entry.1);
        }
    }

    let mut total_ma = 0.0;
    for (prefix, (amps, volts)) in &rails {
        let (amps, volts) = match (amps, volts) {
            (Some(a), Some(v)) => (a, v),
            _ => return Err(anyhow!("rail '{}' is missing its amps or volts line", prefix)),
        };
        let power = (amps * volts).max(0.0);
        total_ma += power / V_REF * 1000.0;
    }
    Ok(total_ma)
}

/// Board identity file: plain text, NUL-stripped, read once per experiment.
pub fn read_board_name(path: &Path) -> Result<String> {
    let bytes = fs::read(path)
        .with_context(|| format!("failed to read board identity from {}", path.display()))?;
    let text: String = bytes
        .iter()
        .filter(|&&b| b != 0)
        .map(|&b| b as char)
        .collect();
    Ok(text.trim().to_string())
}
