//! Error types for the kfops-ml crate.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for conversion operations.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Archive error at {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Export failed: {0}")]
    Export(String),

    #[error("Python runtime error: {0}")]
    Python(String),

    #[error("Missing Python modules: {}", .0.join(", "))]
    MissingModules(Vec<String>),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{stage} failed: {source}")]
    Stage {
        stage: ConversionStage,
        #[source]
        source: Box<ConvertError>,
    },
}

impl ConvertError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export(msg.into())
    }

    pub fn archive(path: impl Into<PathBuf>, source: zip::result::ZipError) -> Self {
        Self::Archive {
            path: path.into(),
            source,
        }
    }

    /// Tag this error with the conversion stage it happened in.
    pub fn at(self, stage: ConversionStage) -> Self {
        match self {
            already @ Self::Stage { .. } => already,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage the error was tagged with, if any.
    pub fn stage(&self) -> Option<ConversionStage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Stages of a checkpoint conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStage {
    Prepare,
    Extract,
    Preflight,
    Export,
    Package,
}

impl std::fmt::Display for ConversionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Prepare => "Preparing directories",
            Self::Extract => "Extracting fine-tuned checkpoint",
            Self::Preflight => "Checking export toolkit",
            Self::Export => "ONNX export",
            Self::Package => "Packaging ONNX archive",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_is_applied_once() {
        let err = ConvertError::export("exit 1")
            .at(ConversionStage::Export)
            .at(ConversionStage::Package);
        assert_eq!(err.stage(), Some(ConversionStage::Export));
        assert_eq!(err.to_string(), "ONNX export failed: Export failed: exit 1");
    }

    #[test]
    fn test_missing_modules_message() {
        let err = ConvertError::MissingModules(vec!["optimum.onnxruntime".into(), "transformers".into()]);
        assert_eq!(
            err.to_string(),
            "Missing Python modules: optimum.onnxruntime, transformers"
        );
    }
}
