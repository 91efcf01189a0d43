//! HTTP dispatch core.
//!
//! A [`Connection`] owns one `reqwest::Client`, authenticates every request
//! with the API key, and offers three dispatch modes:
//!
//! - [`send_get`](Connection::send_get): one attempt, failures collapse to
//!   an empty result
//! - [`send_post`](Connection::send_post): bounded retry with exponential
//!   backoff, per-call choice between error and empty result
//! - [`send_post_async`](Connection::send_post_async): fire-and-forget
//!   upload tracked by the in-flight counter
//!
//! The counter is what makes [`wait_and_close`](Connection::wait_and_close)
//! safe: it only releases the transport once every submitted upload has
//! resolved, or reports how many were still pending at the deadline.

mod backoff;
mod inflight;
mod request;

pub use request::{Payload, QueryParams};

use crate::{Error, Result};
use inflight::InflightCounter;
use request::{apply_common, attach_payload, validate_endpoint};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

/// How often `wait_and_close` re-checks the in-flight counter.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Authenticated dispatch channel to one backend.
///
/// Exclusively owns its HTTP client; create one per experiment or per read
/// client, never share across independently-closable owners.
pub struct Connection {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
    max_retries: u32,
    inflight: Arc<InflightCounter>,
    closed: AtomicBool,
}

impl Connection {
    /// Open a connection from already-resolved scalars.
    ///
    /// `max_retries` is the total attempt budget of [`send_post`]; it must be
    /// at least 1. A blank API key is rejected here, before any request.
    pub fn open(
        api_key: impl Into<String>,
        base_url: &str,
        max_retries: u32,
        request_timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::configuration("API key must not be blank"));
        }
        if max_retries == 0 {
            return Err(Error::configuration("max_retries must be at least 1"));
        }
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::configuration(format!("invalid base URL {base_url:?}: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key,
            max_retries,
            inflight: InflightCounter::new(),
            closed: AtomicBool::new(false),
        })
    }

    fn url_for(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    /// Number of asynchronous uploads submitted but not yet resolved.
    pub fn pending_requests(&self) -> usize {
        self.inflight.pending()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// One-shot read. Any failure, transport or protocol, is logged and
    /// collapses to `None`; reads are never retried and never raise.
    pub async fn send_get(&self, endpoint: &str, params: Option<&QueryParams>) -> Option<String> {
        if validate_endpoint(endpoint).is_err() {
            warn!("send_get called with blank endpoint");
            return None;
        }
        if self.is_closed() {
            warn!(endpoint, "send_get on closed connection");
            return None;
        }

        let url = self.url_for(endpoint);
        let builder = apply_common(self.client.get(&url), &self.api_key, params);
        match builder.send().await {
            Ok(resp) if resp.status().is_success() => resp.text().await.ok(),
            Ok(resp) => {
                warn!(endpoint, status = resp.status().as_u16(), "GET failed");
                None
            }
            Err(e) => {
                warn!(endpoint, error = %e, "GET transport failure");
                None
            }
        }
    }

    /// Critical-path JSON write with bounded retry.
    ///
    /// Non-2xx responses are retried up to `max_retries` total attempts with
    /// exponential backoff; a 2xx short-circuits. Transport failures are
    /// final immediately. On final failure, `fail_on_error` selects between
    /// an error (carrying endpoint, status and body) and `Ok(None)`.
    pub async fn send_post(
        &self,
        body: &serde_json::Value,
        endpoint: &str,
        fail_on_error: bool,
    ) -> Result<Option<String>> {
        validate_endpoint(endpoint)?;
        if self.is_closed() {
            // Never touch a closed transport, not even for attempt one.
            return if fail_on_error {
                Err(Error::ConnectionClosed)
            } else {
                Ok(None)
            };
        }

        let url = self.url_for(endpoint);
        let mut last_err = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay = backoff::delay_for_attempt(
                    attempt - 1,
                    backoff::DEFAULT_BASE_DELAY,
                    backoff::DEFAULT_MAX_DELAY,
                );
                debug!(endpoint, attempt, ?delay, "retrying POST");
                tokio::time::sleep(delay).await;
            }

            let builder =
                apply_common(self.client.post(&url), &self.api_key, None).json(body);
            match builder.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    if status.is_success() {
                        return Ok(if text.is_empty() { None } else { Some(text) });
                    }
                    warn!(
                        endpoint,
                        status = status.as_u16(),
                        attempt,
                        "POST rejected by backend"
                    );
                    last_err = Some(Error::remote(endpoint, status.as_u16(), Some(text)));
                }
                Err(e) => {
                    warn!(endpoint, error = %e, "POST transport failure");
                    last_err = Some(Error::Transport(e));
                    break;
                }
            }
        }

        let err = last_err
            .unwrap_or_else(|| Error::Runtime(format!("POST to {endpoint} made no attempts")));
        if fail_on_error {
            Err(err)
        } else {
            Ok(None)
        }
    }

    /// Fire-and-forget POST. Returns immediately; the upload runs on the
    /// runtime and its outcome is observable through the returned handle.
    ///
    /// The in-flight counter is incremented before dispatch and released
    /// exactly once when the upload resolves, on every exit path. A closed
    /// connection fails through the handle without touching the counter.
    pub fn send_post_async(
        &self,
        payload: Payload,
        endpoint: &str,
        params: Option<QueryParams>,
    ) -> AsyncPostHandle {
        if let Err(e) = validate_endpoint(endpoint) {
            return AsyncPostHandle::failed(e);
        }
        if self.is_closed() {
            warn!(endpoint, "async POST on closed connection");
            return AsyncPostHandle::failed(Error::ConnectionClosed);
        }

        let guard = self.inflight.begin();
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let url = self.url_for(endpoint);
        let endpoint = endpoint.to_string();

        let handle = tokio::spawn(async move {
            // Owns the counter slot until this task resolves, however it
            // resolves.
            let _guard = guard;

            let builder = apply_common(client.post(&url), &api_key, params.as_ref());
            let builder = match attach_payload(builder, payload).await {
                Ok(b) => b,
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "async POST payload rejected");
                    return Err(e);
                }
            };

            match builder.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    if status.is_success() {
                        Ok(if text.is_empty() { None } else { Some(text) })
                    } else {
                        warn!(
                            endpoint = %endpoint,
                            status = status.as_u16(),
                            "async POST rejected by backend"
                        );
                        Err(Error::remote(&endpoint, status.as_u16(), Some(text)))
                    }
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "async POST transport failure");
                    Err(Error::Transport(e))
                }
            }
        });

        AsyncPostHandle::spawned(handle)
    }

    /// Block (asynchronously) until every submitted upload has resolved,
    /// then close. Polls the counter at a short fixed interval.
    ///
    /// If uploads are still pending when `timeout` elapses, returns
    /// [`Error::DrainTimeout`] and leaves the connection open so the caller
    /// can retry the drain or accept the loss with [`close`](Self::close).
    pub async fn wait_and_close(&self, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        while self.inflight.pending() > 0 {
            if start.elapsed() >= timeout {
                return Err(Error::DrainTimeout {
                    pending: self.inflight.pending(),
                    waited: timeout,
                });
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
        self.close();
        Ok(())
    }

    /// Release the transport immediately, without draining. Idempotent.
    ///
    /// Uploads still in flight are allowed to fail once the connection is
    /// closed; that data loss is the caller's explicit choice.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(pending = self.inflight.pending(), "connection closed");
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("base_url", &self.base_url.as_str())
            .field("max_retries", &self.max_retries)
            .field("pending", &self.inflight.pending())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Completion handle for one fire-and-forget POST.
///
/// Dropping the handle detaches the upload; it still runs and still releases
/// its in-flight slot. Awaiting [`wait`](Self::wait) surfaces the outcome.
#[derive(Debug)]
pub struct AsyncPostHandle {
    inner: HandleInner,
}

#[derive(Debug)]
enum HandleInner {
    /// Submission failed before a task was spawned (closed connection,
    /// invalid input). The counter was never incremented.
    Rejected(Error),
    Spawned(JoinHandle<Result<Option<String>>>),
}

impl AsyncPostHandle {
    fn failed(err: Error) -> Self {
        Self {
            inner: HandleInner::Rejected(err),
        }
    }

    fn spawned(handle: JoinHandle<Result<Option<String>>>) -> Self {
        Self {
            inner: HandleInner::Spawned(handle),
        }
    }

    /// Await the upload's outcome.
    pub async fn wait(self) -> Result<Option<String>> {
        match self.inner {
            HandleInner::Rejected(err) => Err(err),
            HandleInner::Spawned(handle) => handle
                .await
                .unwrap_or_else(|e| Err(Error::Runtime(format!("upload task failed: {e}")))),
        }
    }

    /// True if the submission was rejected up front and no upload task runs.
    pub fn is_rejected(&self) -> bool {
        matches!(self.inner, HandleInner::Rejected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_connection() -> Connection {
        Connection::open(
            "test-key",
            "http://127.0.0.1:9",
            3,
            Duration::from_millis(200),
        )
        .unwrap()
    }

    #[test]
    fn blank_api_key_is_rejected() {
        let err = Connection::open(" ", "http://localhost", 3, Duration::from_secs(1));
        assert!(matches!(err, Err(Error::Configuration(_))));
    }

    #[test]
    fn zero_retries_is_rejected() {
        let err = Connection::open("k", "http://localhost", 0, Duration::from_secs(1));
        assert!(matches!(err, Err(Error::Configuration(_))));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = Connection::open("k", "not a url", 3, Duration::from_secs(1));
        assert!(matches!(err, Err(Error::Configuration(_))));
    }

    #[test]
    fn url_join_handles_slashes() {
        let conn = test_connection();
        assert_eq!(
            conn.url_for("/write/experiment/metric"),
            "http://127.0.0.1:9/write/experiment/metric"
        );
        assert_eq!(
            conn.url_for("write/experiment/metric"),
            "http://127.0.0.1:9/write/experiment/metric"
        );
    }

    #[tokio::test]
    async fn closed_connection_get_returns_none() {
        let conn = test_connection();
        conn.close();
        assert_eq!(conn.send_get("/read/x", None).await, None);
    }

    #[tokio::test]
    async fn closed_connection_post_branches_on_flag() {
        let conn = test_connection();
        conn.close();

        let body = serde_json::json!({"k": "v"});
        match conn.send_post(&body, "/write/x", true).await {
            Err(Error::ConnectionClosed) => {}
            other => panic!("expected ConnectionClosed, got {other:?}"),
        }
        assert!(matches!(conn.send_post(&body, "/write/x", false).await, Ok(None)));
    }

    #[tokio::test]
    async fn closed_connection_async_post_skips_counter() {
        let conn = test_connection();
        conn.close();

        let handle = conn.send_post_async(
            Payload::Json(serde_json::json!({})),
            "/write/x",
            None,
        );
        assert!(handle.is_rejected());
        assert_eq!(conn.pending_requests(), 0);
        match handle.wait().await {
            Err(Error::ConnectionClosed) => {}
            other => panic!("expected ConnectionClosed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let conn = test_connection();
        conn.close();
        conn.close();
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn wait_and_close_on_idle_connection_closes() {
        let conn = test_connection();
        conn.wait_and_close(Duration::from_millis(50)).await.unwrap();
        assert!(conn.is_closed());
    }
}
