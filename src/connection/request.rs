//! Pure request assembly: headers, query parameters, body encoding.
//!
//! Nothing here performs network I/O or touches shared state; the Connection
//! calls into these helpers per request and owns everything else.

use crate::{Error, Result};
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::RequestBuilder;
use std::path::PathBuf;

/// Header carrying the API key on every outbound request.
pub(crate) const API_KEY_HEADER: &str = "Authorization";

/// Multipart field name the backend expects for binary uploads.
const FILE_FIELD: &str = "file";

const OCTET_STREAM: &str = "application/octet-stream";

/// Body of an asynchronous POST.
///
/// One tagged union instead of per-shape overloads, so retry and counter
/// logic exist exactly once downstream.
#[derive(Debug, Clone)]
pub enum Payload {
    /// JSON document sent as `application/json`.
    Json(serde_json::Value),
    /// Raw bytes sent as a multipart `file` field with
    /// `application/octet-stream`.
    Bytes { data: Bytes, file_name: String },
    /// File on disk sent as a multipart `file` field.
    File(PathBuf),
}

/// Ordered query-string pairs, forwarded to the backend verbatim.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((key.into(), value.into()));
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub(crate) fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Attach auth header and query pairs common to every outbound request.
pub(crate) fn apply_common(
    builder: RequestBuilder,
    api_key: &str,
    params: Option<&QueryParams>,
) -> RequestBuilder {
    let mut builder = builder.header(API_KEY_HEADER, api_key);
    if let Some(params) = params {
        if !params.is_empty() {
            builder = builder.query(params.pairs());
        }
    }
    builder
}

/// Encode the payload onto the request: JSON body or multipart form.
pub(crate) async fn attach_payload(builder: RequestBuilder, payload: Payload) -> Result<RequestBuilder> {
    match payload {
        Payload::Json(value) => Ok(builder.json(&value)),
        Payload::Bytes { data, file_name } => {
            if file_name.trim().is_empty() {
                return Err(Error::validation("byte payload requires a file name"));
            }
            let part = Part::stream(reqwest::Body::from(data))
                .file_name(file_name)
                .mime_str(OCTET_STREAM)
                .map_err(|e| Error::validation(format!("invalid multipart encoding: {e}")))?;
            Ok(builder.multipart(Form::new().part(FILE_FIELD, part)))
        }
        Payload::File(path) => {
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .ok_or_else(|| {
                    Error::validation(format!("asset path has no file name: {}", path.display()))
                })?;
            // Read up front so an unreadable file fails before any network
            // activity and async completions only ever report HTTP outcomes.
            let data = tokio::fs::read(&path).await?;
            let part = Part::bytes(data)
                .file_name(file_name)
                .mime_str(OCTET_STREAM)
                .map_err(|e| Error::validation(format!("invalid multipart encoding: {e}")))?;
            Ok(builder.multipart(Form::new().part(FILE_FIELD, part)))
        }
    }
}

pub(crate) fn validate_endpoint(endpoint: &str) -> Result<()> {
    if endpoint.trim().is_empty() {
        return Err(Error::validation("endpoint must not be blank"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_params_preserve_insertion_order() {
        let params: QueryParams = [("experimentKey", "abc"), ("step", "7"), ("a", "1")]
            .into_iter()
            .collect();
        let keys: Vec<&str> = params.pairs().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["experimentKey", "step", "a"]);
    }

    #[test]
    fn query_params_allow_duplicate_keys() {
        let params = QueryParams::new().with("tag", "a").with("tag", "b");
        assert_eq!(params.pairs().len(), 2);
    }

    #[test]
    fn blank_endpoint_is_rejected() {
        assert!(validate_endpoint("  ").is_err());
        assert!(validate_endpoint("/write/experiment/metric").is_ok());
    }

    #[tokio::test]
    async fn byte_payload_without_name_is_rejected() {
        let client = reqwest::Client::new();
        let builder = client.post("http://localhost/upload");
        let payload = Payload::Bytes {
            data: Bytes::from_static(&[1, 2, 3]),
            file_name: "  ".into(),
        };
        assert!(attach_payload(builder, payload).await.is_err());
    }

    #[tokio::test]
    async fn missing_file_fails_before_dispatch() {
        let client = reqwest::Client::new();
        let builder = client.post("http://localhost/upload");
        let payload = Payload::File(PathBuf::from("/definitely/not/here.bin"));
        match attach_payload(builder, payload).await {
            Err(Error::Io(_)) => {}
            other => panic!("expected Io error, got {other:?}"),
        }
    }
}
