//! Wire DTOs and REST endpoint constants.
//!
//! These are intentionally thin: camelCase serde structs matching the
//! backend's JSON, nothing more.

use serde::{Deserialize, Serialize};

/// REST endpoint paths, relative to the configured base URL.
pub mod endpoints {
    pub const NEW_EXPERIMENT: &str = "/write/experiment/create";
    pub const METRIC: &str = "/write/experiment/metric";
    pub const PARAMETER: &str = "/write/experiment/parameter";
    pub const LOG_OTHER: &str = "/write/experiment/log-other";
    pub const HTML: &str = "/write/experiment/html";
    pub const TAGS: &str = "/write/experiment/tags";
    pub const GRAPH: &str = "/write/experiment/graph";
    pub const START_END_TIME: &str = "/write/experiment/start-end-time";
    pub const OUTPUT: &str = "/write/experiment/output";
    pub const UPLOAD_ASSET: &str = "/write/experiment/upload-asset";
    pub const HEARTBEAT: &str = "/write/experiment/heartbeat";

    pub const GET_METRICS: &str = "/read/experiment/metrics";
    pub const GET_PARAMETERS: &str = "/read/experiment/params";
    pub const GET_HTML: &str = "/read/experiment/html";
    pub const GET_OUTPUT: &str = "/read/experiment/output";
    pub const GET_TAGS: &str = "/read/experiment/tags";
    pub const GET_ASSET_LIST: &str = "/read/experiment/asset-list";
    pub const GET_EXPERIMENTS: &str = "/read/project/experiments";
    pub const GET_PROJECTS: &str = "/read/projects";
    pub const GET_WORKSPACES: &str = "/read/workspaces";
}

// ---------------------------------------------------------------------------
// Write payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExperimentRequest {
    pub workspace_name: Option<String>,
    pub project_name: Option<String>,
    pub experiment_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExperimentResponse {
    pub experiment_key: String,
    #[serde(default)]
    pub link: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricWrite {
    pub experiment_key: String,
    pub metric_name: String,
    pub metric_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epoch: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterWrite {
    pub experiment_key: String,
    pub parameter_name: String,
    pub parameter_value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<u64>,
    pub timestamp: i64,
}

/// Free-form key/value attached to the run ("log other" in the UI).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogOtherWrite {
    pub experiment_key: String,
    pub key: String,
    pub value: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HtmlWrite {
    pub experiment_key: String,
    pub html: String,
    /// Replace the stored report instead of appending to it.
    pub overwrite: bool,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagsWrite {
    pub experiment_key: String,
    pub added_tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphWrite {
    pub experiment_key: String,
    pub graph: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartEndTimeWrite {
    pub experiment_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time_millis: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time_millis: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputLine {
    pub output: String,
    pub stderr: bool,
    pub local_timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputWrite {
    pub experiment_key: String,
    pub run_context: Option<String>,
    pub output_lines: Vec<OutputLine>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatWrite {
    pub experiment_key: String,
    pub is_alive: bool,
    pub local_timestamp: i64,
}

// ---------------------------------------------------------------------------
// Read responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricPoint {
    pub metric_name: String,
    pub metric_value: f64,
    #[serde(default)]
    pub step: Option<u64>,
    #[serde(default)]
    pub epoch: Option<u64>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    #[serde(default)]
    pub metrics: Vec<MetricPoint>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterEntry {
    pub name: String,
    pub value_current: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParametersResponse {
    #[serde(default)]
    pub results: Vec<ParameterEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HtmlResponse {
    #[serde(default)]
    pub html: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputResponse {
    #[serde(default)]
    pub output: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagsResponse {
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetEntry {
    pub asset_id: String,
    pub file_name: String,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub step: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetListResponse {
    #[serde(default)]
    pub assets: Vec<AssetEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentSummary {
    pub experiment_key: String,
    #[serde(default)]
    pub experiment_name: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub workspace_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentsResponse {
    #[serde(default)]
    pub experiments: Vec<ExperimentSummary>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub project_name: String,
    #[serde(default)]
    pub number_of_experiments: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectsResponse {
    #[serde(default)]
    pub projects: Vec<ProjectSummary>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspacesResponse {
    #[serde(default)]
    pub workspace_names: Vec<String>,
}

/// Current wall-clock time in epoch milliseconds, as the backend expects.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
