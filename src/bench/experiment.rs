use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::detect::{CoreBudget, ModelSpec};

/// Identity of one benchmark run. Created once at start, immutable, and
/// names the output artifact directory.
#[derive(Clone, Debug)]
pub struct Experiment {
    pub board: String,
    pub model_name: String,
    pub model_format: String,
    pub architecture: String,
    pub budget: CoreBudget,
    pub engine_language: String,
    pub started_at: DateTime<Local>,
}

impl Experiment {
    pub fn new(
        board: String,
        model_path: &Path,
        spec: ModelSpec,
        budget: CoreBudget,
        engine_language: String,
    ) -> Self {
        let model_name = model_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("model")
            .to_string();
        Self {
            board,
            model_name,
            model_format: spec.format.tag().to_string(),
            architecture: spec.arch.token().to_string(),
            budget,
            engine_language,
            started_at: Local::now(),
        }
    }

    /// Per-experiment artifact directory under `root`.
    pub fn output_dir(&self, root: &Path) -> PathBuf {
        let cores = match self.budget {
            CoreBudget::Full => "full",
            CoreBudget::Half => "half",
        };
        root.join(format!(
            "{}_{}_{}_{}cores_{}",
            self.model_name,
            self.model_format,
            self.engine_language,
            cores,
            self.started_at.format("%Y%m%d-%H%M%S")
        ))
    }

    pub fn summary(&self) -> String {
        format!(
            "{} ({} {}) on {}, {:?} core budget, {} engine",
            self.model_name,
            self.architecture,
            self.model_format,
            self.board,
            self.budget,
            self.engine_language
        )
    }
}
