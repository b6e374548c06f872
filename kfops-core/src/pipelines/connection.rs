//! Connection discovery for the pipeline API.
//!
//! Inside a cluster the namespace, bearer token and service CA are mounted
//! under the service account directory. Explicit configuration wins over
//! anything discovered there.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};
use url::Url;

use crate::config::PipelinesConfig;
use crate::error::ConfigError;

const NAMESPACE_FILE: &str = "namespace";
const TOKEN_FILE: &str = "token";
const SERVICE_CA_FILE: &str = "service-ca.crt";
const PEM_CERT_MARKER: &str = "-----BEGIN CERTIFICATE-----";

/// Fully resolved settings for talking to the pipeline API.
#[derive(Clone)]
pub struct ConnectionSettings {
    pub endpoint: Url,
    pub token: Option<String>,
    pub ca_cert_pem: Option<Vec<u8>>,
    pub timeout: Duration,
    pub page_size: u32,
    pub max_pages: usize,
}

impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("endpoint", &self.endpoint.as_str())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("ca_cert", &self.ca_cert_pem.is_some())
            .field("timeout", &self.timeout)
            .field("page_size", &self.page_size)
            .field("max_pages", &self.max_pages)
            .finish()
    }
}

/// Endpoint of the Data Science Pipelines API server in `namespace`.
pub fn in_cluster_endpoint(namespace: &str) -> String {
    format!("https://ds-pipeline-dspa.{namespace}.svc:8443")
}

impl ConnectionSettings {
    /// Resolve settings from configuration and the service account mount.
    pub fn resolve(config: &PipelinesConfig) -> Result<Self, ConfigError> {
        let sa_dir = config.service_account_dir.as_path();

        let endpoint = match &config.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => {
                let namespace = match &config.namespace {
                    Some(ns) => ns.trim().to_string(),
                    None => read_optional(sa_dir.join(NAMESPACE_FILE), "namespace")?
                        .ok_or(ConfigError::NoEndpoint)?,
                };
                if namespace.is_empty() {
                    return Err(ConfigError::NoEndpoint);
                }
                in_cluster_endpoint(&namespace)
            }
        };
        let endpoint = parse_endpoint(&endpoint)?;

        let token = if let Some(token) = &config.token {
            Some(token.trim().to_string())
        } else if let Some(path) = &config.token_file {
            Some(read_required(path, "bearer token")?)
        } else {
            read_optional(sa_dir.join(TOKEN_FILE), "bearer token")?
        };
        let token = token.filter(|t| !t.is_empty());
        if token.is_none() {
            warn!("No bearer token found, connecting unauthenticated");
        }

        let ca_cert_pem = match &config.ca_cert {
            Some(path) => Some(read_ca_cert(path)?),
            None => {
                let default_ca = sa_dir.join(SERVICE_CA_FILE);
                if default_ca.exists() {
                    Some(read_ca_cert(&default_ca)?)
                } else {
                    None
                }
            }
        };

        let settings = Self {
            endpoint,
            token,
            ca_cert_pem,
            timeout: Duration::from_secs(config.request_timeout_secs),
            page_size: config.page_size.max(1),
            max_pages: config.max_pages.max(1),
        };
        debug!(settings = ?settings, "Resolved pipeline API connection");
        Ok(settings)
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(endpoint.trim()).map_err(|e| ConfigError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

fn read_required(path: &Path, what: &'static str) -> Result<String, ConfigError> {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|source| ConfigError::ReadFile {
            what,
            path: path.to_path_buf(),
            source,
        })
}

fn read_optional(path: PathBuf, what: &'static str) -> Result<Option<String>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    read_required(&path, what).map(Some)
}

/// Read a PEM bundle, requiring at least one certificate block.
fn read_ca_cert(path: &Path) -> Result<Vec<u8>, ConfigError> {
    let pem = std::fs::read(path).map_err(|source| ConfigError::ReadFile {
        what: "CA certificate",
        path: path.to_path_buf(),
        source,
    })?;
    let has_block = String::from_utf8_lossy(&pem).contains(PEM_CERT_MARKER);
    if !has_block {
        return Err(ConfigError::InvalidCaCert {
            path: path.to_path_buf(),
            reason: format!("no '{PEM_CERT_MARKER}' block found"),
        });
    }
    Ok(pem)
}
