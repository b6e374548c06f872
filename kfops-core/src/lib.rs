//! # kfops-core
//!
//! Configuration, error types, and the pipeline orchestration client used by
//! the `kfops` command line. The cleanup operations work against the
//! [`PipelineApi`] trait so they can run on any backend that speaks the
//! v2beta1 pipeline API.

pub mod config;
pub mod error;
pub mod pipelines;

pub use config::{ConvertConfig, KfopsConfig, PipelinesConfig, config_exists, load_config};
pub use error::{ApiError, CleanupError, CleanupStep, ConfigError, KfopsError};
pub use pipelines::{
    CascadeReport, CleanupOptions, ConnectionSettings, KfpClient, MatchMode, PipelineApi,
    RunCleanupReport, cascade_delete_pipeline, delete_runs_by_name,
};

/// Connect to the pipeline API described by `config`.
pub fn connect(config: &PipelinesConfig) -> Result<KfpClient, KfopsError> {
    let settings = ConnectionSettings::resolve(config)?;
    Ok(KfpClient::new(&settings)?)
}
