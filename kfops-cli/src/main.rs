//! kfops CLI: housekeeping for Kubeflow pipeline deployments.
//!
//! Deletes pipelines together with their versions and experiments, deletes
//! runs by name, and packages fine-tuned checkpoints as ONNX archives.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use kfops_core::MatchMode;

/// kfops: Kubeflow pipeline cleanup and ONNX model packaging
#[derive(Parser, Debug)]
#[command(name = "kfops", version, about, long_about = None)]
pub(crate) struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only report errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the `[pipelines]` connection settings.
#[derive(clap::Args, Debug, Default, Clone)]
pub(crate) struct ConnectionArgs {
    /// Pipeline API base URL (default: derived from the namespace)
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Namespace hosting the pipeline server
    #[arg(long, global = true)]
    pub namespace: Option<String>,

    /// File holding the bearer token
    #[arg(long, global = true)]
    pub token_file: Option<PathBuf>,

    /// PEM bundle used to verify the API server
    #[arg(long, global = true)]
    pub ca_cert: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum Commands {
    /// Delete pipelines along with their versions and experiments
    Pipeline {
        #[command(subcommand)]
        action: PipelineAction,
    },
    /// Delete pipeline runs
    Runs {
        #[command(subcommand)]
        action: RunsAction,
    },
    /// Convert a fine-tuned checkpoint archive into a zipped ONNX model
    Convert(ConvertArgs),
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum PipelineAction {
    /// Delete a pipeline, every version of it, and the experiments named after it
    Delete {
        /// Pipeline display name
        name: String,
        /// How experiment names are matched against the pipeline name
        #[arg(long)]
        experiment_match: Option<MatchMode>,
        /// List what would be deleted without deleting anything
        #[arg(long)]
        dry_run: bool,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum RunsAction {
    /// Delete every run with the given display name
    Delete {
        /// Run display name
        name: String,
        /// How run names are matched
        #[arg(long = "match")]
        match_mode: Option<MatchMode>,
        /// List what would be deleted without deleting anything
        #[arg(long)]
        dry_run: bool,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args, Debug)]
pub(crate) struct ConvertArgs {
    /// Directory that receives the scratch and ONNX directories
    #[arg(long)]
    pub checkpoint_dir: PathBuf,
    /// Zip archive holding the fine-tuned checkpoint
    #[arg(long = "model")]
    pub finetuned_model: PathBuf,
    /// Output base path; the archive suffix is appended
    #[arg(long)]
    pub output: PathBuf,
    /// Export task passed to the exporter
    #[arg(long)]
    pub task: Option<String>,
    /// Keep the extracted checkpoint after conversion
    #[arg(long)]
    pub keep_workdir: bool,
    /// Do not check that the export toolkit is importable
    #[arg(long)]
    pub skip_preflight: bool,
    /// Install missing toolkit packages with pip
    #[arg(long)]
    pub install_deps: bool,
    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Write a default configuration file into the workspace
    Init,
    /// Show the merged configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    // Structured JSON log alongside the console output.
    let log_dir = directories::ProjectDirs::from("dev", "kfops", "kfops")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "kfops.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    if let Err(e) = commands::handle_command(
        cli.command,
        &workspace,
        cli.config.as_deref(),
        &cli.connection,
    )
    .await
    {
        tracing::error!("{e:#}");
        drop(guard);
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_pipeline_delete() {
        let cli = Cli::try_parse_from([
            "kfops",
            "pipeline",
            "delete",
            "flan-t5-finetune",
            "--experiment-match",
            "exact",
            "--dry-run",
            "--namespace",
            "team-a",
        ])
        .unwrap();
        assert_eq!(cli.connection.namespace.as_deref(), Some("team-a"));
        match cli.command {
            Commands::Pipeline {
                action:
                    PipelineAction::Delete {
                        name,
                        experiment_match,
                        dry_run,
                        yes,
                        json,
                    },
            } => {
                assert_eq!(name, "flan-t5-finetune");
                assert_eq!(experiment_match, Some(MatchMode::Exact));
                assert!(dry_run);
                assert!(!yes);
                assert!(!json);
            }
            other => panic!("Unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_runs_delete_with_global_flags_first() {
        let cli = Cli::try_parse_from([
            "kfops",
            "-vv",
            "--endpoint",
            "http://localhost:8888",
            "runs",
            "delete",
            "nightly",
            "--match",
            "contains",
            "-y",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(
            cli.connection.endpoint.as_deref(),
            Some("http://localhost:8888")
        );
        match cli.command {
            Commands::Runs {
                action:
                    RunsAction::Delete {
                        name,
                        match_mode,
                        yes,
                        ..
                    },
            } => {
                assert_eq!(name, "nightly");
                assert_eq!(match_mode, Some(MatchMode::Contains));
                assert!(yes);
            }
            other => panic!("Unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_convert() {
        let cli = Cli::try_parse_from([
            "kfops",
            "convert",
            "--checkpoint-dir",
            "/mnt/ckpt",
            "--model",
            "/mnt/ckpt/finetuned_model",
            "--output",
            "/mnt/out/model",
            "--skip-preflight",
        ])
        .unwrap();
        match cli.command {
            Commands::Convert(args) => {
                assert_eq!(args.checkpoint_dir, PathBuf::from("/mnt/ckpt"));
                assert_eq!(
                    args.finetuned_model,
                    PathBuf::from("/mnt/ckpt/finetuned_model")
                );
                assert!(args.skip_preflight);
                assert!(!args.keep_workdir);
                assert!(args.task.is_none());
            }
            other => panic!("Unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_convert_requires_model() {
        let err = Cli::try_parse_from([
            "kfops",
            "convert",
            "--checkpoint-dir",
            "/mnt/ckpt",
            "--output",
            "/mnt/out/model",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_unknown_match_mode_rejected() {
        let err = Cli::try_parse_from(["kfops", "runs", "delete", "x", "--match", "fuzzy"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
