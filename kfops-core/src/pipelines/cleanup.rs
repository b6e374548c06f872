//! Cascading deletion of pipelines, their versions, experiments and runs.
//!
//! All listings are collected before the first DELETE is issued so deleting
//! never shifts the pages being read. The first API failure stops the
//! operation and is returned tagged with the step that failed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::client::PipelineApi;
use super::types::{Experiment, PipelineVersion, Run};
use crate::error::{CleanupError, CleanupStep};

/// How a display name is compared against the requested name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Exact,
    Contains,
}

impl MatchMode {
    pub fn matches(&self, display_name: &str, wanted: &str) -> bool {
        match self {
            Self::Exact => display_name == wanted,
            Self::Contains => display_name.contains(wanted),
        }
    }
}

impl std::str::FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "contains" | "substring" => Ok(Self::Contains),
            other => Err(format!(
                "Unknown match mode '{other}'. Use 'exact' or 'contains'."
            )),
        }
    }
}

impl std::fmt::Display for MatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact => f.write_str("exact"),
            Self::Contains => f.write_str("contains"),
        }
    }
}

/// Options shared by the cleanup operations.
#[derive(Debug, Clone, Copy)]
pub struct CleanupOptions {
    pub match_mode: MatchMode,
    pub dry_run: bool,
}

/// What a cascading pipeline deletion did (or would do, for a dry run).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeReport {
    pub pipeline_name: String,
    /// `None` when no pipeline has the requested name.
    pub pipeline_id: Option<String>,
    pub deleted_versions: Vec<PipelineVersion>,
    pub pipeline_deleted: bool,
    pub deleted_experiments: Vec<Experiment>,
    pub dry_run: bool,
    pub finished_at: DateTime<Utc>,
}

impl CascadeReport {
    pub fn is_not_found(&self) -> bool {
        self.pipeline_id.is_none()
    }
}

/// Delete a pipeline, all of its versions, and the experiments named after it.
pub async fn cascade_delete_pipeline(
    api: &dyn PipelineApi,
    pipeline_name: &str,
    options: CleanupOptions,
) -> Result<CascadeReport, CleanupError> {
    let mut report = CascadeReport {
        pipeline_name: pipeline_name.to_string(),
        pipeline_id: None,
        deleted_versions: Vec::new(),
        pipeline_deleted: false,
        deleted_experiments: Vec::new(),
        dry_run: options.dry_run,
        finished_at: Utc::now(),
    };
    let verb = if options.dry_run { "Would delete" } else { "Deleting" };

    let pipeline_id = api
        .get_pipeline_id(pipeline_name)
        .await
        .map_err(|e| CleanupError::new(CleanupStep::ResolvePipeline, e))?;
    let Some(pipeline_id) = pipeline_id else {
        info!("Pipeline '{}' not found.", pipeline_name);
        return Ok(report);
    };
    report.pipeline_id = Some(pipeline_id.clone());

    let versions = api
        .list_pipeline_versions(&pipeline_id)
        .await
        .map_err(|e| CleanupError::new(CleanupStep::ListVersions, e))?;
    if versions.is_empty() {
        info!("No versions found to delete.");
    }
    for version in versions {
        info!(
            "{} version: {} ({})",
            verb, version.display_name, version.pipeline_version_id
        );
        if !options.dry_run {
            api.delete_pipeline_version(&pipeline_id, &version.pipeline_version_id)
                .await
                .map_err(|e| CleanupError::new(CleanupStep::DeleteVersion, e))?;
        }
        report.deleted_versions.push(version);
    }

    info!(
        "{} pipeline container: {} ({})",
        verb, pipeline_name, pipeline_id
    );
    if !options.dry_run {
        api.delete_pipeline(&pipeline_id)
            .await
            .map_err(|e| CleanupError::new(CleanupStep::DeletePipeline, e))?;
    }
    report.pipeline_deleted = true;

    let experiments = api
        .list_experiments()
        .await
        .map_err(|e| CleanupError::new(CleanupStep::ListExperiments, e))?;
    for experiment in experiments {
        if !options
            .match_mode
            .matches(&experiment.display_name, pipeline_name)
        {
            continue;
        }
        info!(
            "{} matching experiment: {} ({})",
            verb, experiment.display_name, experiment.experiment_id
        );
        if !options.dry_run {
            api.delete_experiment(&experiment.experiment_id)
                .await
                .map_err(|e| CleanupError::new(CleanupStep::DeleteExperiment, e))?;
        }
        report.deleted_experiments.push(experiment);
    }

    info!("--- Cascade deletion complete ---");
    report.finished_at = Utc::now();
    Ok(report)
}

/// What a run deletion did (or would do, for a dry run).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCleanupReport {
    pub run_name: String,
    /// The cluster had no runs at all.
    pub cluster_empty: bool,
    pub deleted_runs: Vec<Run>,
    pub dry_run: bool,
    pub finished_at: DateTime<Utc>,
}

impl RunCleanupReport {
    pub fn deleted_count(&self) -> usize {
        self.deleted_runs.len()
    }
}

/// Delete every run whose display name matches `run_name`.
pub async fn delete_runs_by_name(
    api: &dyn PipelineApi,
    run_name: &str,
    options: CleanupOptions,
) -> Result<RunCleanupReport, CleanupError> {
    info!("Searching for runs named: '{}'...", run_name);
    let mut report = RunCleanupReport {
        run_name: run_name.to_string(),
        cluster_empty: false,
        deleted_runs: Vec::new(),
        dry_run: options.dry_run,
        finished_at: Utc::now(),
    };

    let runs = api
        .list_runs()
        .await
        .map_err(|e| CleanupError::new(CleanupStep::ListRuns, e))?;
    if runs.is_empty() {
        info!("No runs found in the cluster.");
        report.cluster_empty = true;
        return Ok(report);
    }

    let verb = if options.dry_run { "Would delete" } else { "Deleting" };
    for run in runs {
        if !options.match_mode.matches(&run.display_name, run_name) {
            continue;
        }
        info!("{} run: {} (ID: {})", verb, run.display_name, run.run_id);
        if !options.dry_run {
            api.delete_run(&run.run_id)
                .await
                .map_err(|e| CleanupError::new(CleanupStep::DeleteRun, e))?;
        }
        report.deleted_runs.push(run);
    }

    if report.deleted_runs.is_empty() {
        info!("No runs found matching the name '{}'.", run_name);
    } else if options.dry_run {
        info!("Would delete {} run(s).", report.deleted_count());
    } else {
        info!("Successfully deleted {} run(s).", report.deleted_count());
    }
    report.finished_at = Utc::now();
    Ok(report)
}
