//! Checkpoint to ONNX archive conversion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::archive::{archive_output_path, dir_size, extract_archive, write_archive};
use super::export::{ExportBackend, OptimumExporter};
use crate::error::{ConversionStage, ConvertError};
use crate::runtime::PythonRuntime;
use kfops_core::ConvertConfig;

/// Inputs of one conversion.
#[derive(Debug, Clone)]
pub struct ConvertRequest {
    /// Root for the scratch and export directories.
    pub checkpoint_dir: PathBuf,
    /// Zip archive holding the fine-tuned checkpoint and tokenizer.
    pub finetuned_model: PathBuf,
    /// Base path of the output; the archive suffix is appended.
    pub output: PathBuf,
}

impl ConvertRequest {
    /// Copy of the request with every path made absolute against the
    /// current directory.
    pub fn absolute(&self) -> std::io::Result<Self> {
        Ok(Self {
            checkpoint_dir: std::path::absolute(&self.checkpoint_dir)?,
            finetuned_model: std::path::absolute(&self.finetuned_model)?,
            output: std::path::absolute(&self.output)?,
        })
    }
}

/// Result of a model conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionResult {
    pub source_path: PathBuf,
    pub onnx_dir: PathBuf,
    pub output_path: PathBuf,
    pub target_format: String,
    pub extracted_files: usize,
    pub archive_entries: usize,
    pub source_size_bytes: u64,
    pub exported_size_bytes: u64,
    pub output_size_bytes: u64,
    /// Archive size over exported size.
    pub compression_ratio: f64,
    pub duration_secs: f64,
    pub completed_at: DateTime<Utc>,
}

/// Converts fine-tuned checkpoints into packaged ONNX models.
pub struct ModelConverter {
    exporter: Box<dyn ExportBackend>,
    runtime: PythonRuntime,
    config: ConvertConfig,
}

impl ModelConverter {
    /// Converter using the configured command-line exporter.
    pub fn new(config: ConvertConfig, workspace: PathBuf) -> Self {
        let runtime = PythonRuntime::from_config(&config, workspace);
        let exporter = OptimumExporter::new(runtime.clone(), &config);
        Self {
            exporter: Box::new(exporter),
            runtime,
            config,
        }
    }

    /// Converter with a custom export backend.
    pub fn with_exporter(
        config: ConvertConfig,
        runtime: PythonRuntime,
        exporter: Box<dyn ExportBackend>,
    ) -> Self {
        Self {
            exporter,
            runtime,
            config,
        }
    }

    /// Make sure the export toolkit can be imported, installing it if allowed.
    pub async fn preflight(&self) -> Result<(), ConvertError> {
        let missing = self
            .runtime
            .missing_modules(&self.config.required_modules)
            .await?;
        if missing.is_empty() {
            return Ok(());
        }
        if !self.config.install_packages {
            return Err(ConvertError::MissingModules(missing));
        }

        warn!(?missing, "Export toolkit incomplete, installing packages");
        self.runtime.ensure_packages(&self.config.packages).await?;

        let still_missing = self
            .runtime
            .missing_modules(&self.config.required_modules)
            .await?;
        if still_missing.is_empty() {
            Ok(())
        } else {
            Err(ConvertError::MissingModules(still_missing))
        }
    }

    /// Run the full conversion.
    ///
    /// Relative request paths are resolved against the current directory
    /// before the exporter (which runs in the workspace) sees them.
    pub async fn convert(&self, request: &ConvertRequest) -> Result<ConversionResult, ConvertError> {
        let started = Instant::now();
        let request = request
            .absolute()
            .map_err(|e| ConvertError::from(e).at(ConversionStage::Prepare))?;
        let request = &request;
        if !request.finetuned_model.is_file() {
            return Err(ConvertError::invalid_input(format!(
                "Fine-tuned model archive not found: {}",
                request.finetuned_model.display()
            ))
            .at(ConversionStage::Prepare));
        }

        let workdir = request.checkpoint_dir.join(&self.config.workdir_name);
        let onnx_dir = request.checkpoint_dir.join(&self.config.onnx_dir_name);
        prepare_dirs(&workdir, &onnx_dir).map_err(|e| e.at(ConversionStage::Prepare))?;

        let result = self.run_stages(request, &workdir, &onnx_dir, started).await;

        if !self.config.keep_workdir
            && let Err(e) = std::fs::remove_dir_all(&workdir)
        {
            warn!(workdir = %workdir.display(), error = %e, "Failed to remove workdir");
        }
        result
    }

    async fn run_stages(
        &self,
        request: &ConvertRequest,
        workdir: &Path,
        onnx_dir: &Path,
        started: Instant,
    ) -> Result<ConversionResult, ConvertError> {
        info!(
            archive = %request.finetuned_model.display(),
            workdir = %workdir.display(),
            "Decompressing fine-tuned model"
        );
        let extracted_files = extract_archive(&request.finetuned_model, workdir)
            .map_err(|e| e.at(ConversionStage::Extract))?;
        if extracted_files == 0 {
            return Err(ConvertError::invalid_input(format!(
                "{} contains no files",
                request.finetuned_model.display()
            ))
            .at(ConversionStage::Extract));
        }

        if self.config.preflight {
            self.preflight()
                .await
                .map_err(|e| e.at(ConversionStage::Preflight))?;
        }

        info!(exporter = self.exporter.name(), "Running ONNX export");
        self.exporter
            .export(workdir, onnx_dir)
            .await
            .map_err(|e| e.at(ConversionStage::Export))?;

        let output_path = archive_output_path(&request.output, &self.config.archive_suffix);
        info!(output = %output_path.display(), "Packaging ONNX model");
        let archive_entries =
            write_archive(onnx_dir, &output_path).map_err(|e| e.at(ConversionStage::Package))?;

        let source_size_bytes = std::fs::metadata(&request.finetuned_model)
            .map(|m| m.len())
            .unwrap_or(0);
        let exported_size_bytes = dir_size(onnx_dir).map_err(|e| e.at(ConversionStage::Package))?;
        let output_size_bytes = std::fs::metadata(&output_path)
            .map_err(|e| ConvertError::from(e).at(ConversionStage::Package))?
            .len();
        let compression_ratio = if exported_size_bytes == 0 {
            1.0
        } else {
            output_size_bytes as f64 / exported_size_bytes as f64
        };

        let result = ConversionResult {
            source_path: request.finetuned_model.clone(),
            onnx_dir: onnx_dir.to_path_buf(),
            output_path,
            target_format: "onnx".to_string(),
            extracted_files,
            archive_entries,
            source_size_bytes,
            exported_size_bytes,
            output_size_bytes,
            compression_ratio,
            duration_secs: started.elapsed().as_secs_f64(),
            completed_at: Utc::now(),
        };
        info!(
            output = %result.output_path.display(),
            entries = result.archive_entries,
            bytes = result.output_size_bytes,
            "Conversion complete"
        );
        Ok(result)
    }
}

/// Start from an empty export directory so files from an earlier run can
/// neither satisfy the export check nor end up in the new archive.
fn prepare_dirs(workdir: &Path, onnx_dir: &Path) -> Result<(), ConvertError> {
    if onnx_dir.exists() {
        debug!(onnx_dir = %onnx_dir.display(), "Clearing previous export");
        std::fs::remove_dir_all(onnx_dir)?;
    }
    std::fs::create_dir_all(workdir)?;
    std::fs::create_dir_all(onnx_dir)?;
    Ok(())
}
