use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use anyhow::{Context, Result};

/// Structured description of the inference-engine subprocess: an argument
/// vector plus an optional working directory, never a shell string.
#[derive(Clone, Debug)]
pub struct EngineCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub workdir: Option<PathBuf>,
}

impl EngineCommand {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            workdir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn workdir(mut self, dir: PathBuf) -> Self {
        self.workdir = Some(dir);
        self
    }

    /// Spawn the engine, inheriting stdio so its logs interleave with the
    /// monitor's.
    pub fn spawn(&self) -> Result<EngineHandle> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }
        let child = command
            .spawn()
            .with_context(|| format!("failed to spawn engine '{}'", self.program.display()))?;
        log::info!(
            "spawned inference engine '{}' (pid {})",
            self.program.display(),
            child.id()
        );
        Ok(EngineHandle { child })
    }
}

/// Lifecycle handle for a spawned engine process.
pub struct EngineHandle {
    child: Child,
}

impl EngineHandle {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Wait for the engine to exit and surface a non-zero status, so a
    /// crashed engine is reported instead of passing silently.
    pub fn wait(mut self) -> Result<()> {
        let status = self.child.wait().context("failed to wait for engine")?;
        if status.success() {
            Ok(())
        } else {
            Err(anyhow::anyhow!("inference engine exited with {}", status))
        }
    }

    pub fn kill(&mut self) -> Result<()> {
        self.child.kill().context("failed to kill engine")?;
        let _ = self.child.wait();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_engine_exit_is_ok() {
        let handle = EngineCommand::new(PathBuf::from("true")).spawn().unwrap();
        handle.wait().unwrap();
    }

    #[test]
    fn failing_engine_exit_is_surfaced() {
        let handle = EngineCommand::new(PathBuf::from("false")).spawn().unwrap();
        assert!(handle.wait().is_err());
    }

    #[test]
    fn missing_engine_binary_is_an_error() {
        assert!(EngineCommand::new(PathBuf::from("/nonexistent/engine"))
            .spawn()
            .is_err());
    }

    #[test]
    fn kill_terminates_a_running_engine() {
        let mut handle = EngineCommand::new(PathBuf::from("sleep"))
            .arg("30")
            .spawn()
            .unwrap();
        handle.kill().unwrap();
    }

    #[test]
    fn builder_collects_argument_vector() {
        let command = EngineCommand::new(PathBuf::from("engine"))
            .arg("--images-folder")
            .arg("/data/images");
        assert_eq!(command.args, vec!["--images-folder", "/data/images"]);
    }
}
