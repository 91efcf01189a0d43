use crate::config::TrackerConfig;
use crate::connection::Connection;
use crate::experiment::heartbeat::HeartbeatTask;
use crate::experiment::Experiment;
use crate::types::{endpoints, CreateExperimentRequest, CreateExperimentResponse};
use crate::{Error, Result};
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use tracing::info;
use uuid::Uuid;

/// Builder for creating or resuming an experiment run.
///
/// Keep this surface small and predictable: identity of the run, plus the
/// config override points callers actually need.
pub struct ExperimentBuilder {
    config: Option<TrackerConfig>,
    api_key: Option<String>,
    base_url: Option<String>,
    workspace_name: Option<String>,
    project_name: Option<String>,
    experiment_name: Option<String>,
    resume_key: Option<String>,
    heartbeat_enabled: bool,
}

impl ExperimentBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            api_key: None,
            base_url: None,
            workspace_name: None,
            project_name: None,
            experiment_name: None,
            resume_key: None,
            heartbeat_enabled: true,
        }
    }

    /// Use a fully resolved configuration, bypassing env/file resolution.
    pub fn config(mut self, config: TrackerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Override the backend base URL (useful against a staging or mock
    /// server).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn workspace_name(mut self, name: impl Into<String>) -> Self {
        self.workspace_name = Some(name.into());
        self
    }

    pub fn project_name(mut self, name: impl Into<String>) -> Self {
        self.project_name = Some(name.into());
        self
    }

    pub fn experiment_name(mut self, name: impl Into<String>) -> Self {
        self.experiment_name = Some(name.into());
        self
    }

    /// Resume an existing run instead of creating a new one; no create call
    /// is made against the backend.
    pub fn resume_key(mut self, key: impl Into<String>) -> Self {
        self.resume_key = Some(key.into());
        self
    }

    /// Disable the periodic liveness ping.
    pub fn disable_heartbeat(mut self) -> Self {
        self.heartbeat_enabled = false;
        self
    }

    /// Resolve configuration, open the connection, register (or resume) the
    /// run, and start the heartbeat.
    pub async fn build(self) -> Result<Experiment> {
        let config = match self.config {
            Some(config) => config,
            None => {
                let mut builder = TrackerConfig::builder();
                if let Some(key) = self.api_key {
                    builder = builder.api_key(key);
                }
                if let Some(url) = self.base_url {
                    builder = builder.base_url(url);
                }
                builder.build()?
            }
        };

        let connection = Arc::new(Connection::open(
            &config.api_key,
            &config.base_url,
            config.max_retries,
            config.request_timeout,
        )?);

        let experiment_key = match self.resume_key {
            Some(key) => {
                if key.trim().is_empty() {
                    return Err(Error::validation("resume key must not be blank"));
                }
                key
            }
            None => {
                let request = CreateExperimentRequest {
                    workspace_name: self.workspace_name,
                    project_name: self.project_name,
                    experiment_name: Some(self.experiment_name.unwrap_or_else(|| {
                        format!("run-{}", Uuid::new_v4().simple())
                    })),
                };
                register_run(&connection, &request).await?
            }
        };
        info!(experiment_key = %experiment_key, "experiment ready");

        let heartbeat = self.heartbeat_enabled.then(|| {
            HeartbeatTask::start(
                Arc::clone(&connection),
                experiment_key.clone(),
                config.heartbeat_interval,
            )
        });

        Ok(Experiment {
            connection,
            experiment_key,
            cleanup_timeout: config.cleanup_timeout,
            state: Mutex::new(Default::default()),
            heartbeat,
            captures: Mutex::new(Vec::new()),
            output_offset: Arc::new(AtomicU64::new(0)),
        })
    }
}

impl Default for ExperimentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Run registration is critical path: retried, and a failure is an error.
async fn register_run(
    connection: &Connection,
    request: &CreateExperimentRequest,
) -> Result<String> {
    let body = serde_json::to_value(request)?;
    let text = connection
        .send_post(&body, endpoints::NEW_EXPERIMENT, true)
        .await?
        .ok_or_else(|| Error::Runtime("experiment registration returned no body".into()))?;
    let response: CreateExperimentResponse = serde_json::from_str(&text)?;
    Ok(response.experiment_key)
}
