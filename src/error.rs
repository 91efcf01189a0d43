use std::time::Duration;
use thiserror::Error;

/// Unified error type for the MLTrack SDK.
///
/// This aggregates all low-level failures into actionable, high-level
/// categories. Asynchronous upload failures are never surfaced through this
/// type to the submitting caller; they are logged and observable only through
/// the completion handle and the in-flight counter.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// The backend answered with a non-2xx status.
    #[error("Remote error: endpoint {endpoint} returned HTTP {status}: {body}")]
    Remote {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// The connection was closed before the call was submitted. No network
    /// activity took place.
    #[error("Connection is already closed")]
    ConnectionClosed,

    /// `wait_and_close` deadline elapsed with uploads still pending. The
    /// connection is left open.
    #[error("Timed out after {waited:?} waiting for {pending} in-flight request(s) to complete")]
    DrainTimeout { pending: usize, waited: Duration },

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Network transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Marker stored in `Error::Remote.body` when the backend sent no body.
pub(crate) const NO_RESPONSE_BODY: &str = "[no response body]";

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub(crate) fn remote(endpoint: &str, status: u16, body: Option<String>) -> Self {
        Error::Remote {
            endpoint: endpoint.to_string(),
            status,
            body: body
                .filter(|b| !b.is_empty())
                .unwrap_or_else(|| NO_RESPONSE_BODY.to_string()),
        }
    }

    /// True for failures worth another attempt on the retrying POST path.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Remote { .. } | Error::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_keeps_endpoint_and_status() {
        let err = Error::remote("/write/experiment/metric", 503, Some("overloaded".into()));
        let msg = err.to_string();
        assert!(msg.contains("/write/experiment/metric"));
        assert!(msg.contains("503"));
        assert!(msg.contains("overloaded"));
    }

    #[test]
    fn remote_error_marks_missing_body() {
        let err = Error::remote("/x", 500, None);
        assert!(err.to_string().contains(NO_RESPONSE_BODY));

        let err = Error::remote("/x", 500, Some(String::new()));
        assert!(err.to_string().contains(NO_RESPONSE_BODY));
    }

    #[test]
    fn retryable_classification() {
        assert!(Error::remote("/x", 500, None).is_retryable());
        assert!(!Error::validation("bad").is_retryable());
        assert!(!Error::ConnectionClosed.is_retryable());
    }
}
