//! Synchronous read client for recorded experiment data.
//!
//! Reads are one-shot GETs: a backend or transport failure is an empty
//! result, never an error (reads are idempotent and off the critical path).
//! Malformed JSON in a successful response is surfaced, because it means
//! client and backend disagree about the schema.

use crate::config::TrackerConfig;
use crate::connection::{Connection, QueryParams};
use crate::types::{
    endpoints, AssetListResponse, ExperimentsResponse, HtmlResponse, MetricsResponse,
    OutputResponse, ParametersResponse, ProjectsResponse, TagsResponse, WorkspacesResponse,
};
use crate::Result;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Read-only client. Owns its own [`Connection`], never shared with any
/// experiment.
pub struct ApiClient {
    connection: Connection,
}

impl ApiClient {
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        Ok(Self {
            connection: Connection::open(
                &config.api_key,
                &config.base_url,
                config.max_retries,
                config.request_timeout,
            )?,
        })
    }

    /// Open directly from scalars, mainly for tests and tools.
    pub fn open(
        api_key: impl Into<String>,
        base_url: &str,
        request_timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            connection: Connection::open(api_key, base_url, 1, request_timeout)?,
        })
    }

    pub async fn experiment_metrics(&self, experiment_key: &str) -> Result<Option<MetricsResponse>> {
        self.get_for_experiment(endpoints::GET_METRICS, experiment_key)
            .await
    }

    pub async fn experiment_parameters(
        &self,
        experiment_key: &str,
    ) -> Result<Option<ParametersResponse>> {
        self.get_for_experiment(endpoints::GET_PARAMETERS, experiment_key)
            .await
    }

    pub async fn experiment_html(&self, experiment_key: &str) -> Result<Option<HtmlResponse>> {
        self.get_for_experiment(endpoints::GET_HTML, experiment_key)
            .await
    }

    pub async fn experiment_output(&self, experiment_key: &str) -> Result<Option<OutputResponse>> {
        self.get_for_experiment(endpoints::GET_OUTPUT, experiment_key)
            .await
    }

    pub async fn experiment_tags(&self, experiment_key: &str) -> Result<Option<TagsResponse>> {
        self.get_for_experiment(endpoints::GET_TAGS, experiment_key)
            .await
    }

    pub async fn experiment_assets(
        &self,
        experiment_key: &str,
    ) -> Result<Option<AssetListResponse>> {
        self.get_for_experiment(endpoints::GET_ASSET_LIST, experiment_key)
            .await
    }

    pub async fn experiments(
        &self,
        project_name: &str,
    ) -> Result<Option<ExperimentsResponse>> {
        let params = QueryParams::new().with("projectName", project_name);
        self.get(endpoints::GET_EXPERIMENTS, Some(&params)).await
    }

    pub async fn projects(&self, workspace_name: &str) -> Result<Option<ProjectsResponse>> {
        let params = QueryParams::new().with("workspaceName", workspace_name);
        self.get(endpoints::GET_PROJECTS, Some(&params)).await
    }

    pub async fn workspaces(&self) -> Result<Option<WorkspacesResponse>> {
        self.get(endpoints::GET_WORKSPACES, None).await
    }

    /// Release the client's connection.
    pub fn close(self) {
        self.connection.close();
    }

    async fn get_for_experiment<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        experiment_key: &str,
    ) -> Result<Option<T>> {
        let params = QueryParams::new().with("experimentKey", experiment_key);
        self.get(endpoint, Some(&params)).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: Option<&QueryParams>,
    ) -> Result<Option<T>> {
        match self.connection.send_get(endpoint, params).await {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }
}
