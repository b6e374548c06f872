//! REST client for the v2beta1 pipeline API.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use tracing::{debug, info};

use super::connection::ConnectionSettings;
use super::types::{
    Experiment, Filter, ListExperimentsResponse, ListPipelineVersionsResponse,
    ListPipelinesResponse, ListRunsResponse, Page, PipelineVersion, Run,
};
use crate::error::ApiError;

const API_PREFIX: &str = "apis/v2beta1";

/// Operations the cleanup logic needs from the orchestration service.
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// Id of the pipeline with this exact display name, if one exists.
    async fn get_pipeline_id(&self, name: &str) -> Result<Option<String>, ApiError>;

    async fn list_pipeline_versions(
        &self,
        pipeline_id: &str,
    ) -> Result<Vec<PipelineVersion>, ApiError>;

    async fn delete_pipeline_version(
        &self,
        pipeline_id: &str,
        version_id: &str,
    ) -> Result<(), ApiError>;

    async fn delete_pipeline(&self, pipeline_id: &str) -> Result<(), ApiError>;

    async fn list_experiments(&self) -> Result<Vec<Experiment>, ApiError>;

    async fn delete_experiment(&self, experiment_id: &str) -> Result<(), ApiError>;

    async fn list_runs(&self) -> Result<Vec<Run>, ApiError>;

    async fn delete_run(&self, run_id: &str) -> Result<(), ApiError>;
}

/// `reqwest`-backed client for a Kubeflow / Data Science Pipelines server.
pub struct KfpClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    page_size: u32,
    max_pages: usize,
}

impl KfpClient {
    pub fn new(settings: &ConnectionSettings) -> Result<Self, ApiError> {
        let mut builder = Client::builder().timeout(settings.timeout);
        if let Some(pem) = &settings.ca_cert_pem {
            let cert = reqwest::Certificate::from_pem(pem)
                .map_err(|e| ApiError::Client(format!("Invalid CA certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }
        let client = builder
            .build()
            .map_err(|e| ApiError::Client(e.to_string()))?;

        info!(
            "Connecting to Data Science Pipelines: {}",
            settings.endpoint.as_str().trim_end_matches('/')
        );

        Ok(Self {
            client,
            base_url: settings.endpoint.as_str().trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            page_size: settings.page_size,
            max_pages: settings.max_pages,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, API_PREFIX, path)
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and return the body of a successful response.
    async fn send(&self, builder: reqwest::RequestBuilder, url: &str) -> Result<String, ApiError> {
        let response = builder.send().await.map_err(|e| ApiError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ApiError::Transport {
            url: url.to_string(),
            message: format!("Failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            return Err(map_http_error(status, url, &body));
        }
        Ok(body)
    }

    /// Fetch every page of a listing.
    async fn list_all<P: Page>(
        &self,
        path: &str,
        extra: &[(&str, String)],
    ) -> Result<Vec<P::Item>, ApiError> {
        let url = self.url(path);
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        for page in 0..self.max_pages {
            let mut query: Vec<(&str, String)> = vec![("page_size", self.page_size.to_string())];
            query.extend(extra.iter().cloned());
            if let Some(token) = &page_token {
                query.push(("page_token", token.clone()));
            }

            debug!(url = %url, page, "Listing");
            let body = self
                .send(self.request(Method::GET, &url).query(&query), &url)
                .await?;
            let parsed: P = decode(&url, &body)?;
            let (page_items, next) = parsed.into_parts();
            items.extend(page_items);

            match next {
                Some(token) => page_token = Some(token),
                None => return Ok(items),
            }
        }

        Err(ApiError::TooManyPages {
            url,
            pages: self.max_pages,
        })
    }

    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let url = self.url(path);
        debug!(url = %url, "DELETE");
        self.send(self.request(Method::DELETE, &url), &url).await?;
        Ok(())
    }
}

fn decode<T: serde::de::DeserializeOwned>(url: &str, body: &str) -> Result<T, ApiError> {
    // DELETE and some empty listings come back as an empty body.
    let body = if body.trim().is_empty() { "{}" } else { body };
    serde_json::from_str(body).map_err(|e| ApiError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}

fn seg(id: &str) -> std::borrow::Cow<'_, str> {
    urlencoding::encode(id)
}

/// Map a non-success HTTP status to the matching `ApiError`.
pub(crate) fn map_http_error(status: StatusCode, url: &str, body: &str) -> ApiError {
    match status.as_u16() {
        401 | 403 => {
            debug!(body = %body, "Pipeline API rejected credentials");
            ApiError::Unauthorized {
                status: status.as_u16(),
            }
        }
        404 => ApiError::NotFound {
            url: url.to_string(),
        },
        code => ApiError::Status {
            url: url.to_string(),
            status: code,
            body: body.chars().take(500).collect(),
        },
    }
}

#[async_trait]
impl PipelineApi for KfpClient {
    async fn get_pipeline_id(&self, name: &str) -> Result<Option<String>, ApiError> {
        let filter = serde_json::to_string(&Filter::display_name_equals(name)).map_err(|e| {
            ApiError::Client(format!("Failed to encode filter: {e}"))
        })?;
        let pipelines = self
            .list_all::<ListPipelinesResponse>("pipelines", &[("filter", filter)])
            .await?;

        // Servers without filter support return everything; match locally too.
        let mut matching: Vec<_> = pipelines
            .into_iter()
            .filter(|p| p.display_name == name)
            .collect();
        match matching.len() {
            0 => Ok(None),
            1 => Ok(matching.pop().map(|p| p.pipeline_id)),
            count => Err(ApiError::AmbiguousPipeline {
                name: name.to_string(),
                count,
            }),
        }
    }

    async fn list_pipeline_versions(
        &self,
        pipeline_id: &str,
    ) -> Result<Vec<PipelineVersion>, ApiError> {
        self.list_all::<ListPipelineVersionsResponse>(
            &format!("pipelines/{}/versions", seg(pipeline_id)),
            &[],
        )
        .await
    }

    async fn delete_pipeline_version(
        &self,
        pipeline_id: &str,
        version_id: &str,
    ) -> Result<(), ApiError> {
        self.delete(&format!(
            "pipelines/{}/versions/{}",
            seg(pipeline_id),
            seg(version_id)
        ))
        .await
    }

    async fn delete_pipeline(&self, pipeline_id: &str) -> Result<(), ApiError> {
        self.delete(&format!("pipelines/{}", seg(pipeline_id))).await
    }

    async fn list_experiments(&self) -> Result<Vec<Experiment>, ApiError> {
        self.list_all::<ListExperimentsResponse>("experiments", &[])
            .await
    }

    async fn delete_experiment(&self, experiment_id: &str) -> Result<(), ApiError> {
        self.delete(&format!("experiments/{}", seg(experiment_id)))
            .await
    }

    async fn list_runs(&self) -> Result<Vec<Run>, ApiError> {
        self.list_all::<ListRunsResponse>("runs", &[]).await
    }

    async fn delete_run(&self, run_id: &str) -> Result<(), ApiError> {
        self.delete(&format!("runs/{}", seg(run_id))).await
    }
}
