//! Retry and header behavior of the synchronous dispatch paths.

use mltrack::{Connection, Error, QueryParams};
use std::time::Duration;

fn connection_to(server: &mockito::ServerGuard, max_retries: u32) -> Connection {
    Connection::open(
        "test-key",
        &server.url(),
        max_retries,
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn post_retries_exactly_max_attempts_then_errors() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/write/experiment/metric")
        .match_header("Authorization", "test-key")
        .with_status(500)
        .with_body("backend down")
        .expect(3)
        .create_async()
        .await;

    let conn = connection_to(&server, 3);
    let body = serde_json::json!({"metricName": "loss"});
    let result = conn
        .send_post(&body, "/write/experiment/metric", true)
        .await;

    match result {
        Err(Error::Remote {
            endpoint,
            status,
            body,
        }) => {
            assert_eq!(endpoint, "/write/experiment/metric");
            assert_eq!(status, 500);
            assert_eq!(body, "backend down");
        }
        other => panic!("expected Remote error, got {other:?}"),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn post_without_fail_flag_returns_empty_after_retries() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/write/experiment/metric")
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    let conn = connection_to(&server, 3);
    let body = serde_json::json!({});
    let result = conn
        .send_post(&body, "/write/experiment/metric", false)
        .await;
    assert!(matches!(result, Ok(None)));
    mock.assert_async().await;
}

#[tokio::test]
async fn post_success_short_circuits_retry_budget() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/write/experiment/parameter")
        .with_status(200)
        .with_body(r#"{"saved":true}"#)
        .expect(1)
        .create_async()
        .await;

    let conn = connection_to(&server, 5);
    let body = serde_json::json!({"parameterName": "lr"});
    let result = conn
        .send_post(&body, "/write/experiment/parameter", true)
        .await
        .unwrap();
    assert_eq!(result.as_deref(), Some(r#"{"saved":true}"#));
    mock.assert_async().await;
}

#[tokio::test]
async fn transport_failure_is_final_not_retried() {
    // Nothing listens on port 9.
    let conn = Connection::open("k", "http://127.0.0.1:9", 5, Duration::from_millis(200)).unwrap();
    let body = serde_json::json!({});
    match conn.send_post(&body, "/write/x", true).await {
        Err(Error::Transport(_)) => {}
        other => panic!("expected Transport error, got {other:?}"),
    }
    assert!(matches!(conn.send_post(&body, "/write/x", false).await, Ok(None)));
}

#[tokio::test]
async fn get_carries_api_key_and_query_params() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/read/experiment/metrics")
        .match_header("Authorization", "test-key")
        .match_query(mockito::Matcher::UrlEncoded(
            "experimentKey".into(),
            "exp-1".into(),
        ))
        .with_status(200)
        .with_body(r#"{"metrics":[]}"#)
        .create_async()
        .await;

    let conn = connection_to(&server, 1);
    let params = QueryParams::new().with("experimentKey", "exp-1");
    let body = conn
        .send_get("/read/experiment/metrics", Some(&params))
        .await;
    assert_eq!(body.as_deref(), Some(r#"{"metrics":[]}"#));
    mock.assert_async().await;
}

#[tokio::test]
async fn get_failure_is_empty_and_never_retried() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/read/experiment/metrics")
        .with_status(500)
        .expect(1)
        .create_async()
        .await;

    let conn = connection_to(&server, 5);
    let body = conn.send_get("/read/experiment/metrics", None).await;
    assert_eq!(body, None);
    mock.assert_async().await;
}

#[tokio::test]
async fn async_post_carries_api_key() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/write/experiment/metric")
        .match_header("Authorization", "test-key")
        .with_status(200)
        .create_async()
        .await;

    let conn = connection_to(&server, 1);
    let handle = conn.send_post_async(
        mltrack::Payload::Json(serde_json::json!({"metricName": "acc"})),
        "/write/experiment/metric",
        None,
    );
    handle.wait().await.unwrap();
    mock.assert_async().await;
}
