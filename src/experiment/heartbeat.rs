//! Periodic liveness pings for a running experiment.

use crate::connection::{Connection, Payload};
use crate::types::{endpoints, now_millis, HeartbeatWrite};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Background task posting a status ping on a fixed interval.
///
/// Cancellation stops the timer as a unit; pings already handed to the
/// connection keep their own in-flight slot and resolve independently.
#[derive(Debug)]
pub(crate) struct HeartbeatTask {
    handle: JoinHandle<()>,
}

impl HeartbeatTask {
    pub(crate) fn start(
        connection: Arc<Connection>,
        experiment_key: String,
        interval: Duration,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the run was just created,
            // so skip it.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if connection.is_closed() {
                    break;
                }
                let beat = HeartbeatWrite {
                    experiment_key: experiment_key.clone(),
                    is_alive: true,
                    local_timestamp: now_millis(),
                };
                if let Ok(body) = serde_json::to_value(&beat) {
                    debug!(experiment_key = %experiment_key, "heartbeat");
                    let _ = connection.send_post_async(
                        Payload::Json(body),
                        endpoints::HEARTBEAT,
                        None,
                    );
                }
            }
        });
        Self { handle }
    }

    pub(crate) fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for HeartbeatTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
