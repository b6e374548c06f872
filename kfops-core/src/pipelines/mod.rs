//! Pipeline orchestration API: connection discovery, REST client, and
//! cascading cleanup.

pub mod cleanup;
pub mod client;
pub mod connection;
pub mod types;

pub use cleanup::{
    CascadeReport, CleanupOptions, MatchMode, RunCleanupReport, cascade_delete_pipeline,
    delete_runs_by_name,
};
pub use client::{KfpClient, PipelineApi};
pub use connection::{ConnectionSettings, in_cluster_endpoint};
pub use types::{Experiment, Pipeline, PipelineVersion, Run};
