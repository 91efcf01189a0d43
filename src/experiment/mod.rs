//! Write façade for a single run.
//!
//! An [`Experiment`] turns domain calls (`log_metric`, `upload_asset`, ...)
//! into wire DTOs and hands them to its [`Connection`]. Every logging call
//! is fire-and-forget: it validates input, submits, and returns a completion
//! handle the caller may await or drop. Ordering between submissions is not
//! guaranteed; the step/epoch state stamped into each payload is what gives
//! measurements their position.

mod builder;
mod heartbeat;
mod output;

pub use builder::ExperimentBuilder;

use crate::connection::{AsyncPostHandle, Connection, Payload, QueryParams};
use crate::types::{
    endpoints, now_millis, GraphWrite, HtmlWrite, LogOtherWrite, MetricWrite, OutputLine,
    OutputWrite, ParameterWrite, StartEndTimeWrite, TagsWrite,
};
use crate::{Error, Result};
use heartbeat::HeartbeatTask;
use output::OutputCapture;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::AsyncRead;
use tracing::info;

#[derive(Debug, Default, Clone)]
pub(crate) struct RunState {
    step: Option<u64>,
    epoch: Option<u64>,
    context: Option<String>,
}

/// A logical run to which metrics, parameters and assets are attached.
///
/// Owns its [`Connection`] exclusively; [`end`](Self::end) drains pending
/// uploads before releasing it, [`close`](Self::close) releases immediately
/// and accepts the loss of anything still in flight.
pub struct Experiment {
    pub(crate) connection: Arc<Connection>,
    pub(crate) experiment_key: String,
    pub(crate) cleanup_timeout: Duration,
    pub(crate) state: Mutex<RunState>,
    pub(crate) heartbeat: Option<HeartbeatTask>,
    pub(crate) captures: Mutex<Vec<OutputCapture>>,
    pub(crate) output_offset: Arc<AtomicU64>,
}

impl Experiment {
    /// The server-issued key identifying this run.
    pub fn experiment_key(&self) -> &str {
        &self.experiment_key
    }

    /// Uploads submitted but not yet resolved.
    pub fn pending_requests(&self) -> usize {
        self.connection.pending_requests()
    }

    pub fn set_step(&self, step: u64) {
        self.state_guard().step = Some(step);
    }

    pub fn set_epoch(&self, epoch: u64) {
        self.state_guard().epoch = Some(epoch);
    }

    /// Context label stamped into subsequent metrics (e.g. "train", "test").
    pub fn set_context(&self, context: impl Into<String>) {
        self.state_guard().context = Some(context.into());
    }

    pub fn log_metric(&self, name: &str, value: f64) -> Result<AsyncPostHandle> {
        require_non_blank(name, "metric name")?;
        let state = self.state_snapshot();
        let write = MetricWrite {
            experiment_key: self.experiment_key.clone(),
            metric_name: name.to_string(),
            metric_value: value,
            step: state.step,
            epoch: state.epoch,
            context: state.context,
            timestamp: now_millis(),
        };
        self.submit_json(&write, endpoints::METRIC)
    }

    pub fn log_parameter(&self, name: &str, value: impl ToString) -> Result<AsyncPostHandle> {
        require_non_blank(name, "parameter name")?;
        let write = ParameterWrite {
            experiment_key: self.experiment_key.clone(),
            parameter_name: name.to_string(),
            parameter_value: value.to_string(),
            step: self.state_snapshot().step,
            timestamp: now_millis(),
        };
        self.submit_json(&write, endpoints::PARAMETER)
    }

    /// Attach a free-form key/value to the run.
    pub fn log_other(&self, key: &str, value: impl ToString) -> Result<AsyncPostHandle> {
        require_non_blank(key, "key")?;
        let write = LogOtherWrite {
            experiment_key: self.experiment_key.clone(),
            key: key.to_string(),
            value: value.to_string(),
            timestamp: now_millis(),
        };
        self.submit_json(&write, endpoints::LOG_OTHER)
    }

    pub fn log_html(&self, html: &str, overwrite: bool) -> Result<AsyncPostHandle> {
        require_non_blank(html, "html")?;
        let write = HtmlWrite {
            experiment_key: self.experiment_key.clone(),
            html: html.to_string(),
            overwrite,
            timestamp: now_millis(),
        };
        self.submit_json(&write, endpoints::HTML)
    }

    pub fn add_tag(&self, tag: &str) -> Result<AsyncPostHandle> {
        self.add_tags(&[tag])
    }

    pub fn add_tags(&self, tags: &[&str]) -> Result<AsyncPostHandle> {
        if tags.is_empty() || tags.iter().any(|t| t.trim().is_empty()) {
            return Err(Error::validation("tags must be non-empty and non-blank"));
        }
        let write = TagsWrite {
            experiment_key: self.experiment_key.clone(),
            added_tags: tags.iter().map(|t| t.to_string()).collect(),
        };
        self.submit_json(&write, endpoints::TAGS)
    }

    /// Model-graph description (JSON or free text) shown in the UI.
    pub fn log_graph(&self, graph: &str) -> Result<AsyncPostHandle> {
        require_non_blank(graph, "graph")?;
        let write = GraphWrite {
            experiment_key: self.experiment_key.clone(),
            graph: graph.to_string(),
            timestamp: now_millis(),
        };
        self.submit_json(&write, endpoints::GRAPH)
    }

    pub fn log_start_time(&self, epoch_millis: i64) -> Result<AsyncPostHandle> {
        let write = StartEndTimeWrite {
            experiment_key: self.experiment_key.clone(),
            start_time_millis: Some(epoch_millis),
            end_time_millis: None,
        };
        self.submit_json(&write, endpoints::START_END_TIME)
    }

    pub fn log_end_time(&self, epoch_millis: i64) -> Result<AsyncPostHandle> {
        let write = StartEndTimeWrite {
            experiment_key: self.experiment_key.clone(),
            start_time_millis: None,
            end_time_millis: Some(epoch_millis),
        };
        self.submit_json(&write, endpoints::START_END_TIME)
    }

    /// Record one console line directly, without a capture task.
    pub fn log_output_line(&self, line: &str, stderr: bool) -> Result<AsyncPostHandle> {
        let write = OutputWrite {
            experiment_key: self.experiment_key.clone(),
            run_context: self.state_snapshot().context,
            output_lines: vec![OutputLine {
                output: line.to_string(),
                stderr,
                local_timestamp: now_millis(),
                offset: Some(self.output_offset.fetch_add(1, Ordering::SeqCst)),
            }],
        };
        self.submit_json(&write, endpoints::OUTPUT)
    }

    /// Stream console lines from an async source (e.g. a child-process pipe)
    /// until it reaches EOF. Lines are batched and uploaded in the
    /// background.
    pub fn capture_output<R>(&self, reader: R, stderr: bool)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let capture = OutputCapture::start(
            Arc::clone(&self.connection),
            self.experiment_key.clone(),
            self.state_snapshot().context,
            reader,
            stderr,
            Arc::clone(&self.output_offset),
        );
        self.captures_guard().push(capture);
    }

    /// Upload a file from disk as an experiment asset.
    pub fn upload_asset(
        &self,
        path: impl AsRef<Path>,
        overwrite: bool,
    ) -> Result<AsyncPostHandle> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                Error::validation(format!("asset path has no file name: {}", path.display()))
            })?;
        let params = self.asset_params(&file_name, overwrite);
        Ok(self.connection.send_post_async(
            Payload::File(path.to_path_buf()),
            endpoints::UPLOAD_ASSET,
            Some(params),
        ))
    }

    /// Upload an in-memory buffer as an experiment asset.
    pub fn upload_asset_bytes(
        &self,
        file_name: &str,
        data: impl Into<bytes::Bytes>,
        overwrite: bool,
    ) -> Result<AsyncPostHandle> {
        require_non_blank(file_name, "asset file name")?;
        let params = self.asset_params(file_name, overwrite);
        Ok(self.connection.send_post_async(
            Payload::Bytes {
                data: data.into(),
                file_name: file_name.to_string(),
            },
            endpoints::UPLOAD_ASSET,
            Some(params),
        ))
    }

    fn asset_params(&self, file_name: &str, overwrite: bool) -> QueryParams {
        let mut params = QueryParams::new()
            .with("experimentKey", self.experiment_key.clone())
            .with("fileName", file_name)
            .with("overwrite", overwrite.to_string());
        if let Some(step) = self.state_snapshot().step {
            params.push("step", step.to_string());
        }
        params
    }

    /// Mark the run ended, stop background tasks, drain pending uploads,
    /// then release the connection.
    ///
    /// Returns [`Error::DrainTimeout`] if uploads are still pending after
    /// the configured cleanup timeout; the connection stays open in that
    /// case so the caller can decide between retrying and [`close`](Self::close).
    pub async fn end(self) -> Result<()> {
        info!(experiment_key = %self.experiment_key, "ending experiment");
        self.stop_background_tasks();

        let write = StartEndTimeWrite {
            experiment_key: self.experiment_key.clone(),
            start_time_millis: None,
            end_time_millis: Some(now_millis()),
        };
        // Best effort: a run that cannot record its end time is still worth
        // draining.
        let body = serde_json::to_value(&write)?;
        let _ = self
            .connection
            .send_post(&body, endpoints::START_END_TIME, false)
            .await;

        self.connection.wait_and_close(self.cleanup_timeout).await
    }

    /// Release the connection immediately without draining. Uploads still in
    /// flight may be lost; that is this method's contract.
    pub fn close(self) {
        self.stop_background_tasks();
        self.connection.close();
    }

    fn stop_background_tasks(&self) {
        if let Some(heartbeat) = &self.heartbeat {
            heartbeat.stop();
        }
        for capture in self.captures_guard().iter() {
            capture.stop();
        }
    }

    fn submit_json<T: serde::Serialize>(&self, write: &T, endpoint: &str) -> Result<AsyncPostHandle> {
        let body = serde_json::to_value(write)?;
        Ok(self
            .connection
            .send_post_async(Payload::Json(body), endpoint, None))
    }

    fn state_snapshot(&self) -> RunState {
        self.state_guard().clone()
    }

    fn state_guard(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn captures_guard(&self) -> MutexGuard<'_, Vec<OutputCapture>> {
        self.captures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn require_non_blank(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{what} must not be blank")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_experiment() -> Experiment {
        // Port 9 (discard) is never listening; submissions fail in the
        // background, which is all these tests need.
        let connection = Arc::new(
            Connection::open(
                "test-key",
                "http://127.0.0.1:9",
                1,
                Duration::from_millis(100),
            )
            .unwrap(),
        );
        Experiment {
            connection,
            experiment_key: "exp-1".into(),
            cleanup_timeout: Duration::from_secs(1),
            state: Mutex::new(RunState::default()),
            heartbeat: None,
            captures: Mutex::new(Vec::new()),
            output_offset: Arc::new(AtomicU64::new(0)),
        }
    }

    #[tokio::test]
    async fn blank_metric_name_is_rejected() {
        let exp = offline_experiment();
        assert!(matches!(exp.log_metric("  ", 1.0), Err(Error::Validation(_))));
        assert_eq!(exp.pending_requests(), 0);
    }

    #[tokio::test]
    async fn blank_tag_is_rejected() {
        let exp = offline_experiment();
        assert!(exp.add_tags(&[]).is_err());
        assert!(exp.add_tags(&["ok", " "]).is_err());
    }

    #[tokio::test]
    async fn step_and_epoch_are_stamped_into_metrics() {
        let exp = offline_experiment();
        exp.set_step(7);
        exp.set_epoch(2);
        exp.set_context("train");

        let state = exp.state_snapshot();
        assert_eq!(state.step, Some(7));
        assert_eq!(state.epoch, Some(2));
        assert_eq!(state.context.as_deref(), Some("train"));
    }

    #[tokio::test]
    async fn output_offsets_are_monotonic() {
        let exp = offline_experiment();
        let _ = exp.log_output_line("a", false).unwrap();
        let _ = exp.log_output_line("b", false).unwrap();
        assert_eq!(exp.output_offset.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn asset_without_file_name_is_rejected() {
        let exp = offline_experiment();
        assert!(exp.upload_asset("/", true).is_err());
        assert!(exp.upload_asset_bytes(" ", vec![1], false).is_err());
    }
}
