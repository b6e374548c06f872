//! CLI subcommand handlers.

use anyhow::Context;
use std::io::IsTerminal;
use std::path::Path;

use crate::{
    Commands, ConfigAction, ConnectionArgs, ConvertArgs, PipelineAction, RunsAction,
};
use kfops_core::config::workspace_config_path;
use kfops_core::{
    CleanupOptions, KfopsConfig, PipelinesConfig, cascade_delete_pipeline, delete_runs_by_name,
};
use kfops_ml::{ConvertRequest, ModelConverter};

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_path: Option<&Path>,
    connection: &ConnectionArgs,
) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, workspace, config_path, connection),
        Commands::Pipeline { action } => {
            let config = load(workspace, config_path, connection)?;
            handle_pipeline(action, &config).await
        }
        Commands::Runs { action } => {
            let config = load(workspace, config_path, connection)?;
            handle_runs(action, &config).await
        }
        Commands::Convert(args) => {
            let config = load(workspace, config_path, connection)?;
            handle_convert(args, config, workspace).await
        }
    }
}

fn load(
    workspace: &Path,
    config_path: Option<&Path>,
    connection: &ConnectionArgs,
) -> anyhow::Result<KfopsConfig> {
    let mut config = kfops_core::load_config(Some(workspace), config_path)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    apply_connection_overrides(&mut config.pipelines, connection);
    Ok(config)
}

/// CLI flags take precedence over every configuration layer.
pub(crate) fn apply_connection_overrides(config: &mut PipelinesConfig, args: &ConnectionArgs) {
    if let Some(endpoint) = &args.endpoint {
        config.endpoint = Some(endpoint.clone());
    }
    if let Some(namespace) = &args.namespace {
        config.namespace = Some(namespace.clone());
    }
    if let Some(token_file) = &args.token_file {
        config.token_file = Some(token_file.clone());
        // An explicit file beats a token from config or environment.
        config.token = None;
    }
    if let Some(ca_cert) = &args.ca_cert {
        config.ca_cert = Some(ca_cert.clone());
    }
}

/// Ask before deleting. Dry runs and `--yes` skip the prompt; without a
/// terminal the deletion is refused.
fn confirm(prompt: &str, yes: bool, dry_run: bool) -> anyhow::Result<bool> {
    confirm_with(prompt, yes, dry_run, std::io::stdin().is_terminal())
}

fn confirm_with(prompt: &str, yes: bool, dry_run: bool, interactive: bool) -> anyhow::Result<bool> {
    if yes || dry_run {
        return Ok(true);
    }
    if !interactive {
        anyhow::bail!("Refusing to delete without confirmation; pass --yes to proceed");
    }
    let answer = dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?;
    Ok(answer)
}

async fn handle_pipeline(action: PipelineAction, config: &KfopsConfig) -> anyhow::Result<()> {
    match action {
        PipelineAction::Delete {
            name,
            experiment_match,
            dry_run,
            yes,
            json,
        } => {
            let prompt = format!(
                "Delete pipeline '{}', all of its versions and matching experiments?",
                name
            );
            if !confirm(&prompt, yes, dry_run)? {
                println!("Aborted.");
                return Ok(());
            }

            let client = kfops_core::connect(&config.pipelines)?;
            let options = CleanupOptions {
                match_mode: experiment_match.unwrap_or(config.pipelines.experiment_match),
                dry_run,
            };
            let report = cascade_delete_pipeline(&client, &name, options).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if report.is_not_found() {
                println!("Pipeline '{}' not found; nothing deleted.", name);
            } else {
                let verb = if report.dry_run { "Would delete" } else { "Deleted" };
                println!(
                    "{} pipeline '{}' with {} version(s) and {} experiment(s).",
                    verb,
                    name,
                    report.deleted_versions.len(),
                    report.deleted_experiments.len()
                );
            }
            Ok(())
        }
    }
}

async fn handle_runs(action: RunsAction, config: &KfopsConfig) -> anyhow::Result<()> {
    match action {
        RunsAction::Delete {
            name,
            match_mode,
            dry_run,
            yes,
            json,
        } => {
            let prompt = format!("Delete all runs named '{}'?", name);
            if !confirm(&prompt, yes, dry_run)? {
                println!("Aborted.");
                return Ok(());
            }

            let client = kfops_core::connect(&config.pipelines)?;
            let options = CleanupOptions {
                match_mode: match_mode.unwrap_or(config.pipelines.run_match),
                dry_run,
            };
            let report = delete_runs_by_name(&client, &name, options).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let verb = if report.dry_run { "Would delete" } else { "Deleted" };
                println!("{} {} run(s) named '{}'.", verb, report.deleted_count(), name);
            }
            Ok(())
        }
    }
}

async fn handle_convert(
    args: ConvertArgs,
    mut config: KfopsConfig,
    workspace: &Path,
) -> anyhow::Result<()> {
    if let Some(task) = args.task {
        config.convert.task = task;
    }
    config.convert.keep_workdir |= args.keep_workdir;
    config.convert.install_packages |= args.install_deps;
    if args.skip_preflight {
        config.convert.preflight = false;
    }

    let converter = ModelConverter::new(config.convert, workspace.to_path_buf());
    let request = ConvertRequest {
        checkpoint_dir: args.checkpoint_dir,
        finetuned_model: args.finetuned_model,
        output: args.output,
    };
    let result = converter
        .convert(&request)
        .await
        .context("ONNX conversion failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "Wrote {} ({} entries, {} bytes, {:.1}s)",
            result.output_path.display(),
            result.archive_entries,
            result.output_size_bytes,
            result.duration_secs
        );
    }
    Ok(())
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_path: Option<&Path>,
    connection: &ConnectionArgs,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let path = workspace_config_path(workspace);
            if path.exists() {
                println!("Configuration file already exists at: {}", path.display());
                return Ok(());
            }
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)?;
            }

            let toml_str = toml::to_string_pretty(&KfopsConfig::default())?;
            std::fs::write(&path, &toml_str)?;
            println!("Created default configuration at: {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            if config_path.is_none() && !kfops_core::config_exists(Some(workspace)) {
                eprintln!("No configuration file found; showing built-in defaults.");
            }
            let config = load(workspace, config_path, connection)?;
            println!("{}", render_config(config)?);
            Ok(())
        }
    }
}

/// TOML rendering with the bearer token masked.
fn render_config(mut config: KfopsConfig) -> anyhow::Result<String> {
    if config.pipelines.token.is_some() {
        config.pipelines.token = Some("********".to_string());
    }
    Ok(toml::to_string_pretty(&config)?)
}
