//! # kfops-ml
//!
//! Model packaging for kfops: turns a fine-tuned sequence-to-sequence
//! checkpoint archive into a zipped ONNX model. The export itself runs in the
//! Python toolkit, managed through [`PythonRuntime`].

pub mod convert;
pub mod error;
pub mod runtime;

pub use convert::{ConversionResult, ConvertRequest, ExportBackend, ModelConverter};
pub use error::{ConversionStage, ConvertError};
pub use runtime::PythonRuntime;
