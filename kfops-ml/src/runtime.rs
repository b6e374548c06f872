//! Python runtime manager for the export toolkit.
//!
//! The ONNX export lives in the Python ecosystem, so conversion shells out to
//! it. This module finds the interpreter (honouring a virtualenv), checks
//! and installs the toolkit packages, and runs commands under a timeout.

use crate::error::ConvertError;
use kfops_core::ConvertConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Information about the detected Python installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PythonInfo {
    pub path: PathBuf,
    pub version: String,
    pub has_pip: bool,
}

/// Captured output of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Imports the module named by the first argument; never spliced into source.
const IMPORT_CHECK: &str = "import importlib, sys; importlib.import_module(sys.argv[1])";

/// Managed subprocess runner for Python tooling.
#[derive(Debug, Clone)]
pub struct PythonRuntime {
    /// Configured interpreter; detected on PATH when unset.
    python_path: Option<PathBuf>,
    venv_path: Option<PathBuf>,
    workspace: PathBuf,
    timeout: Duration,
}

impl PythonRuntime {
    pub fn new(workspace: PathBuf) -> Self {
        Self {
            python_path: None,
            venv_path: None,
            workspace,
            timeout: Duration::from_secs(300),
        }
    }

    /// Build from the `[convert]` configuration section.
    ///
    /// Without a configured virtualenv, an active one (`VIRTUAL_ENV`) or a
    /// `.venv`/`venv` directory in the workspace is used.
    pub fn from_config(config: &ConvertConfig, workspace: PathBuf) -> Self {
        let venv_path = config
            .venv_path
            .clone()
            .or_else(|| detect_venv(&workspace));
        if let Some(venv) = &venv_path {
            debug!(venv = %venv.display(), "Using virtualenv");
        }
        Self {
            python_path: config.python_path.clone(),
            venv_path,
            workspace,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Detect an available Python installation, trying `python3` then `python`.
    pub async fn detect() -> Result<PythonInfo, ConvertError> {
        for cmd in &["python3", "python"] {
            let Ok(output) = Command::new(cmd).arg("--version").output().await else {
                continue;
            };
            if !output.status.success() {
                continue;
            }

            // Python 2 printed its version on stderr.
            let mut version = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if version.is_empty() {
                version = String::from_utf8_lossy(&output.stderr).trim().to_string();
            }

            let has_pip = Command::new(cmd)
                .args(["-m", "pip", "--version"])
                .output()
                .await
                .is_ok_and(|o| o.status.success());

            return Ok(PythonInfo {
                path: PathBuf::from(cmd),
                version,
                has_pip,
            });
        }

        Err(ConvertError::Python(
            "Python not found. Install Python 3.9+ with the export toolkit.".to_string(),
        ))
    }

    /// The interpreter to invoke: the virtualenv's, the configured one, or
    /// whichever [`detect`](Self::detect) finds.
    pub async fn python_cmd(&self) -> Result<PathBuf, ConvertError> {
        if let Some(venv) = &self.venv_path {
            return Ok(venv_bin(venv).join("python"));
        }
        if let Some(path) = &self.python_path {
            return Ok(path.clone());
        }
        let info = Self::detect().await?;
        debug!(
            python = %info.path.display(),
            version = %info.version,
            has_pip = info.has_pip,
            "Detected Python"
        );
        Ok(info.path)
    }

    /// Resolve a console script, preferring the virtualenv's copy.
    pub fn resolve_program(&self, program: &str) -> PathBuf {
        if let Some(venv) = &self.venv_path {
            let candidate = venv_bin(venv).join(program);
            if candidate.exists() {
                return candidate;
            }
        }
        PathBuf::from(program)
    }

    /// Run `program` with `args` in the workspace, failing on non-zero exit.
    pub async fn run(
        &self,
        program: &Path,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, ConvertError> {
        let timeout = timeout.unwrap_or(self.timeout);
        debug!(program = %program.display(), ?args, "Running command");

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(&self.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(venv) = &self.venv_path {
            command.env("VIRTUAL_ENV", venv);
        }

        let output = match tokio::time::timeout(timeout, command.output()).await {
            Ok(result) => result.map_err(|e| {
                ConvertError::Python(format!("Failed to spawn {}: {e}", program.display()))
            })?,
            Err(_) => {
                return Err(ConvertError::Timeout(format!(
                    "{} timed out after {}s",
                    program.display(),
                    timeout.as_secs()
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            return Err(ConvertError::Python(format!(
                "{} failed ({}): {}",
                program.display(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(CommandOutput { stdout, stderr })
    }

    /// Check which modules can be imported.
    pub async fn check_packages(
        &self,
        modules: &[String],
    ) -> Result<HashMap<String, bool>, ConvertError> {
        let python = self.python_cmd().await?;
        let mut results = HashMap::new();
        for module in modules {
            let available = Command::new(&python)
                .args(["-c", IMPORT_CHECK, module.as_str()])
                .current_dir(&self.workspace)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await
                .is_ok_and(|s| s.success());
            results.insert(module.clone(), available);
        }
        Ok(results)
    }

    /// Modules from `modules` that cannot be imported, in input order.
    pub async fn missing_modules(&self, modules: &[String]) -> Result<Vec<String>, ConvertError> {
        let available = self.check_packages(modules).await?;
        Ok(modules
            .iter()
            .filter(|m| !available.get(*m).copied().unwrap_or(false))
            .cloned()
            .collect())
    }

    /// Install requirement specs via pip.
    pub async fn ensure_packages(&self, packages: &[String]) -> Result<(), ConvertError> {
        if packages.is_empty() {
            return Ok(());
        }
        tracing::info!(?packages, "Installing export toolkit packages");

        let mut args = vec![
            "-m".to_string(),
            "pip".to_string(),
            "install".to_string(),
            "--quiet".to_string(),
        ];
        args.extend(packages.iter().cloned());
        let python = self.python_cmd().await?;
        self.run(&python, &args, None)
            .await
            .map_err(|e| ConvertError::Python(format!("pip install failed: {e}")))?;
        Ok(())
    }
}

fn venv_bin(venv: &Path) -> PathBuf {
    venv.join(if cfg!(windows) { "Scripts" } else { "bin" })
}

/// The active virtualenv, else one inside the workspace.
fn detect_venv(workspace: &Path) -> Option<PathBuf> {
    if let Ok(venv) = std::env::var("VIRTUAL_ENV") {
        let path = PathBuf::from(venv);
        if path.exists() {
            return Some(path);
        }
    }
    workspace_venv(workspace)
}

fn workspace_venv(workspace: &Path) -> Option<PathBuf> {
    [".venv", "venv"]
        .iter()
        .map(|name| workspace.join(name))
        .find(|p| p.join("pyvenv.cfg").exists())
}
