//! ONNX export backends.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::ConvertError;
use crate::runtime::PythonRuntime;
use kfops_core::ConvertConfig;

/// Turns a checkpoint directory into an ONNX model directory.
#[async_trait]
pub trait ExportBackend: Send + Sync {
    /// Export the checkpoint in `model_dir` into `output_dir`.
    async fn export(&self, model_dir: &Path, output_dir: &Path) -> Result<(), ConvertError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Exporter that runs the toolkit's command line (`optimum-cli` by default).
pub struct OptimumExporter {
    runtime: PythonRuntime,
    program: String,
    args: Vec<String>,
    task: String,
    timeout: Duration,
}

impl OptimumExporter {
    pub fn new(runtime: PythonRuntime, config: &ConvertConfig) -> Self {
        Self {
            runtime,
            program: config.exporter_program.clone(),
            args: config.exporter_args.clone(),
            task: config.task.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Command-line arguments with placeholders filled in.
    pub fn render_args(&self, model_dir: &Path, output_dir: &Path) -> Vec<String> {
        render_args(&self.args, model_dir, output_dir, &self.task)
    }
}

pub(crate) fn render_args(
    template: &[String],
    model_dir: &Path,
    output_dir: &Path,
    task: &str,
) -> Vec<String> {
    let model_dir = model_dir.to_string_lossy();
    let output_dir = output_dir.to_string_lossy();
    template
        .iter()
        .map(|arg| {
            arg.replace("{model_dir}", &model_dir)
                .replace("{output_dir}", &output_dir)
                .replace("{task}", task)
        })
        .collect()
}

#[async_trait]
impl ExportBackend for OptimumExporter {
    async fn export(&self, model_dir: &Path, output_dir: &Path) -> Result<(), ConvertError> {
        let program = self.runtime.resolve_program(&self.program);
        let args = self.render_args(model_dir, output_dir);
        info!(
            program = %program.display(),
            task = %self.task,
            model_dir = %model_dir.display(),
            "Exporting checkpoint to ONNX"
        );

        let output = self
            .runtime
            .run(&program, &args, Some(self.timeout))
            .await
            .map_err(|e| match e {
                ConvertError::Timeout(msg) => ConvertError::Timeout(msg),
                other => ConvertError::export(other.to_string()),
            })?;
        if !output.stdout.trim().is_empty() {
            debug!(stdout = %output.stdout.trim(), "Exporter output");
        }

        let models = onnx_files(output_dir)?;
        if models.is_empty() {
            return Err(ConvertError::export(format!(
                "{} produced no .onnx files in {}",
                self.program,
                output_dir.display()
            )));
        }
        info!(models = models.len(), "ONNX export finished");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// All `*.onnx` files under `dir`.
pub fn onnx_files(dir: &Path) -> Result<Vec<PathBuf>, ConvertError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut found = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "onnx")
        {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}
