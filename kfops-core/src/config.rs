//! Configuration system for kfops.
//!
//! Uses `figment` for layered configuration: defaults -> user config -> workspace
//! config -> explicit file -> environment. CLI flags are applied by the caller on
//! the extracted value. Files live at `~/.config/kfops/config.toml` and
//! `.kfops/config.toml` in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::pipelines::MatchMode;

/// Top-level configuration for kfops.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KfopsConfig {
    #[serde(default)]
    pub pipelines: PipelinesConfig,
    #[serde(default)]
    pub convert: ConvertConfig,
}

/// Connection and cleanup settings for the pipeline orchestration API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelinesConfig {
    /// Base URL of the pipeline API. Derived from the namespace when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Namespace override; otherwise read from the service account directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Mounted Kubernetes service account directory.
    #[serde(default = "default_service_account_dir")]
    pub service_account_dir: PathBuf,
    /// Literal bearer token. Takes precedence over `token_file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// File holding the bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_file: Option<PathBuf>,
    /// PEM bundle trusted in addition to the system roots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,
    /// Page size for list calls.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Upper bound on pages fetched by a single listing.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// How experiment names are compared against the pipeline name.
    #[serde(default = "default_experiment_match")]
    pub experiment_match: MatchMode,
    /// How run names are compared against the requested run name.
    #[serde(default = "default_run_match")]
    pub run_match: MatchMode,
}

impl Default for PipelinesConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            namespace: None,
            service_account_dir: default_service_account_dir(),
            token: None,
            token_file: None,
            ca_cert: None,
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            request_timeout_secs: default_request_timeout(),
            experiment_match: default_experiment_match(),
            run_match: default_run_match(),
        }
    }
}

fn default_service_account_dir() -> PathBuf {
    PathBuf::from("/var/run/secrets/kubernetes.io/serviceaccount")
}

fn default_page_size() -> u32 {
    100
}

fn default_max_pages() -> usize {
    50
}

fn default_request_timeout() -> u64 {
    30
}

fn default_experiment_match() -> MatchMode {
    MatchMode::Contains
}

fn default_run_match() -> MatchMode {
    MatchMode::Exact
}

/// Model conversion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertConfig {
    /// Path to the Python executable (auto-detected if not set).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_path: Option<PathBuf>,
    /// Virtual environment holding the export toolkit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venv_path: Option<PathBuf>,
    /// Export program. Resolved inside `venv_path` when set.
    #[serde(default = "default_exporter_program")]
    pub exporter_program: String,
    /// Export arguments. `{model_dir}`, `{output_dir}` and `{task}` are substituted.
    #[serde(default = "default_exporter_args")]
    pub exporter_args: Vec<String>,
    /// Export task passed to the toolkit.
    #[serde(default = "default_task")]
    pub task: String,
    /// Export timeout in seconds.
    #[serde(default = "default_export_timeout")]
    pub timeout_secs: u64,
    /// Suffix appended to the output path to form the archive name.
    #[serde(default = "default_archive_suffix")]
    pub archive_suffix: String,
    /// Scratch directory name under the checkpoint dir.
    #[serde(default = "default_workdir_name")]
    pub workdir_name: String,
    /// Export directory name under the checkpoint dir.
    #[serde(default = "default_onnx_dir_name")]
    pub onnx_dir_name: String,
    /// Keep the extracted checkpoint after conversion.
    #[serde(default)]
    pub keep_workdir: bool,
    /// Verify the export toolkit is importable before exporting.
    #[serde(default = "default_true")]
    pub preflight: bool,
    /// Install `packages` when preflight finds modules missing.
    #[serde(default)]
    pub install_packages: bool,
    /// Python modules the exporter needs.
    #[serde(default = "default_required_modules")]
    pub required_modules: Vec<String>,
    /// pip requirement specs installed by `install_packages`.
    #[serde(default = "default_packages")]
    pub packages: Vec<String>,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            python_path: None,
            venv_path: None,
            exporter_program: default_exporter_program(),
            exporter_args: default_exporter_args(),
            task: default_task(),
            timeout_secs: default_export_timeout(),
            archive_suffix: default_archive_suffix(),
            workdir_name: default_workdir_name(),
            onnx_dir_name: default_onnx_dir_name(),
            keep_workdir: false,
            preflight: true,
            install_packages: false,
            required_modules: default_required_modules(),
            packages: default_packages(),
        }
    }
}

fn default_exporter_program() -> String {
    "optimum-cli".to_string()
}

fn default_exporter_args() -> Vec<String> {
    [
        "export",
        "onnx",
        "--model",
        "{model_dir}",
        "--task",
        "{task}",
        "{output_dir}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_task() -> String {
    "text2text-generation-with-past".to_string()
}

fn default_export_timeout() -> u64 {
    1800
}

fn default_archive_suffix() -> String {
    "-onnx.zip".to_string()
}

fn default_workdir_name() -> String {
    "workdir".to_string()
}

fn default_onnx_dir_name() -> String {
    "onnx".to_string()
}

fn default_required_modules() -> Vec<String> {
    vec!["optimum.onnxruntime".to_string(), "transformers".to_string()]
}

fn default_packages() -> Vec<String> {
    vec![
        "optimum".to_string(),
        "transformers".to_string(),
        "optimum[onnxruntime]".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

/// User-level configuration file, if a home directory can be determined.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "kfops", "kfops")
        .map(|d| d.config_dir().join("config.toml"))
}

/// Workspace-level configuration file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".kfops").join("config.toml")
}

/// Load configuration from all layers.
///
/// `explicit` must exist when given; the user and workspace files are optional.
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<KfopsConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(KfopsConfig::default()));

    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::ReadFile {
                what: "configuration",
                path: path.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    // KFOPS_PIPELINES__ENDPOINT, KFOPS_CONVERT__TASK, ...
    figment = figment.merge(Env::prefixed("KFOPS_").split("__"));

    figment.extract().map_err(|e| ConfigError::Load(Box::new(e)))
}

/// Whether a user-level or workspace-level configuration file exists.
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if user_config_path().is_some_and(|p| p.exists()) {
        return true;
    }
    workspace.is_some_and(|ws| workspace_config_path(ws).exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = KfopsConfig::default();
        assert_eq!(config.pipelines.page_size, 100);
        assert_eq!(config.pipelines.experiment_match, MatchMode::Contains);
        assert_eq!(config.pipelines.run_match, MatchMode::Exact);
        assert_eq!(config.convert.archive_suffix, "-onnx.zip");
        assert_eq!(config.convert.exporter_program, "optimum-cli");
        assert!(config.convert.preflight);
        assert!(!config.convert.keep_workdir);
        assert_eq!(
            config.pipelines.service_account_dir,
            PathBuf::from("/var/run/secrets/kubernetes.io/serviceaccount")
        );
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = KfopsConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: KfopsConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.convert.exporter_args, config.convert.exporter_args);
        assert_eq!(parsed.pipelines.max_pages, config.pipelines.max_pages);
    }

    #[test]
    fn test_partial_section_uses_defaults() {
        let parsed: KfopsConfig = toml::from_str(
            r#"
[pipelines]
endpoint = "https://kfp.example.com"
experiment_match = "exact"
"#,
        )
        .unwrap();
        assert_eq!(
            parsed.pipelines.endpoint.as_deref(),
            Some("https://kfp.example.com")
        );
        assert_eq!(parsed.pipelines.experiment_match, MatchMode::Exact);
        assert_eq!(parsed.pipelines.page_size, 100);
        assert_eq!(parsed.convert.task, "text2text-generation-with-past");
    }

    #[test]
    fn test_load_config_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let kfops_dir = dir.path().join(".kfops");
        std::fs::create_dir_all(&kfops_dir).unwrap();
        std::fs::write(
            kfops_dir.join("config.toml"),
            r#"
[pipelines]
namespace = "ml-team"
page_size = 25

[convert]
keep_workdir = true
"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.pipelines.namespace.as_deref(), Some("ml-team"));
        assert_eq!(config.pipelines.page_size, 25);
        assert!(config.convert.keep_workdir);
    }

    #[test]
    fn test_explicit_file_overrides_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let kfops_dir = dir.path().join(".kfops");
        std::fs::create_dir_all(&kfops_dir).unwrap();
        std::fs::write(
            kfops_dir.join("config.toml"),
            "[pipelines]\npage_size = 25\n",
        )
        .unwrap();
        let explicit = dir.path().join("override.toml");
        std::fs::write(&explicit, "[pipelines]\npage_size = 7\n").unwrap();

        let config = load_config(Some(dir.path()), Some(&explicit)).unwrap();
        assert_eq!(config.pipelines.page_size, 7);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = load_config(None, Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_config_exists_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".kfops")).unwrap();
        std::fs::write(workspace_config_path(dir.path()), "").unwrap();
        assert!(config_exists(Some(dir.path())));
    }
}
