use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::monitor::{ConsumptionSample, PerformanceSample};

/// Write the per-image timing table as delimited text.
///
/// Columns: sample, pre-processing ms, inference ms, post-processing ms.
pub fn write_performance_report(dir: &Path, samples: &[PerformanceSample]) -> Result<PathBuf> {
    let path = dir.join("performance.csv");
    let mut file = create_report_file(&path)?;
    writeln!(file, "sample,pre_processing_ms,inference_ms,post_processing_ms")?;
    for (index, sample) in samples.iter().enumerate() {
        writeln!(
            file,
            "{},{},{},{}",
            index + 1,
            sample.pre_ms,
            sample.inf_ms,
            sample.post_ms
        )?;
    }
    Ok(path)
}

/// Write the per-tick resource table as delimited text.
///
/// Columns: sample, CPU %, temperature °C, RAM MB, current mA; floats to
/// two decimals.
pub fn write_consumption_report(dir: &Path, samples: &[ConsumptionSample]) -> Result<PathBuf> {
    let path = dir.join("consumption.csv");
    let mut file = create_report_file(&path)?;
    writeln!(file, "sample,cpu_usage_pct,cpu_temp_c,ram_used_mb,current_ma")?;
    for (index, sample) in samples.iter().enumerate() {
        writeln!(
            file,
            "{},{:.2},{:.2},{:.2},{:.2}",
            index + 1,
            sample.cpu_usage_pct,
            sample.cpu_temp_c,
            sample.ram_used_mb,
            sample.current_ma
        )?;
    }
    Ok(path)
}

fn create_report_file(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create report directory {}", parent.display()))?;
    }
    fs::File::create(path).with_context(|| format!("failed to create report {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn performance_report_has_header_and_one_row_per_sample() {
        let dir = tempdir().unwrap();
        let samples = vec![
            PerformanceSample {
                pre_ms: 1,
                inf_ms: 2,
                post_ms: 3,
            },
            PerformanceSample {
                pre_ms: 4,
                inf_ms: 5,
                post_ms: 6,
            },
        ];
        let path = write_performance_report(dir.path(), &samples).unwrap();
        let text = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "1,1,2,3");
        assert_eq!(lines[2], "2,4,5,6");
    }

    #[test]
    fn consumption_report_formats_floats_to_two_decimals() {
        let dir = tempdir().unwrap();
        let samples = vec![ConsumptionSample {
            cpu_usage_pct: 42.123,
            cpu_temp_c: 48.05,
            ram_used_mb: 2000.0,
            current_ma: 500.456,
        }];
        let path = write_consumption_report(dir.path(), &samples).unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert!(text.lines().nth(1).unwrap().starts_with("1,42.12,48.05,2000.00,500.46"));
    }

    #[test]
    fn report_directory_is_created_when_missing() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("exp").join("run1");
        write_performance_report(&nested, &[]).unwrap();
        assert!(nested.join("performance.csv").exists());
    }
}
