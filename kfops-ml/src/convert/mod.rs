//! Fine-tuned checkpoint to ONNX conversion.
//!
//! A conversion extracts the checkpoint archive into a scratch directory,
//! runs an [`ExportBackend`] over it, and zips the exported directory back up.

pub mod archive;
pub mod converter;
pub mod export;

pub use archive::{archive_output_path, extract_archive, write_archive};
pub use converter::{ConversionResult, ConvertRequest, ModelConverter};
pub use export::{ExportBackend, OptimumExporter, onnx_files};
