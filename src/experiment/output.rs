//! Stdout/stderr capture for a running experiment.
//!
//! Each capture is a background task reading lines from an async source
//! (typically a child process pipe), batching them, and funneling the
//! batches through the connection's fire-and-forget path.

use crate::connection::{Connection, Payload};
use crate::types::{endpoints, now_millis, OutputLine, OutputWrite};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::debug;

const BATCH_SIZE: usize = 25;
const FLUSH_INTERVAL: Duration = Duration::from_secs(2);

/// Handle to one running line-capture task.
#[derive(Debug)]
pub(crate) struct OutputCapture {
    handle: JoinHandle<()>,
}

impl OutputCapture {
    pub(crate) fn start<R>(
        connection: Arc<Connection>,
        experiment_key: String,
        run_context: Option<String>,
        reader: R,
        stderr: bool,
        offset: Arc<AtomicU64>,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            let mut batch: Vec<OutputLine> = Vec::new();
            let mut flush_tick = tokio::time::interval(FLUSH_INTERVAL);
            flush_tick.tick().await;

            loop {
                tokio::select! {
                    line = lines.next_line() => match line {
                        Ok(Some(text)) => {
                            batch.push(OutputLine {
                                output: text,
                                stderr,
                                local_timestamp: now_millis(),
                                offset: Some(offset.fetch_add(1, Ordering::SeqCst)),
                            });
                            if batch.len() >= BATCH_SIZE {
                                flush(&connection, &experiment_key, &run_context, &mut batch);
                            }
                        }
                        // EOF or a broken pipe both end the capture.
                        Ok(None) | Err(_) => break,
                    },
                    _ = flush_tick.tick() => {
                        flush(&connection, &experiment_key, &run_context, &mut batch);
                    }
                }
            }
            flush(&connection, &experiment_key, &run_context, &mut batch);
            debug!(experiment_key = %experiment_key, stderr, "output capture finished");
        });
        Self { handle }
    }

    pub(crate) fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for OutputCapture {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn flush(
    connection: &Connection,
    experiment_key: &str,
    run_context: &Option<String>,
    batch: &mut Vec<OutputLine>,
) {
    if batch.is_empty() {
        return;
    }
    let write = OutputWrite {
        experiment_key: experiment_key.to_string(),
        run_context: run_context.clone(),
        output_lines: std::mem::take(batch),
    };
    if let Ok(body) = serde_json::to_value(&write) {
        let _ = connection.send_post_async(Payload::Json(body), endpoints::OUTPUT, None);
    }
}
