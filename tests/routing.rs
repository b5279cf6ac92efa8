//! Request routing, static assets and backend proxy tests.

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::Value;

mod common;
use common::Echo;

#[tokio::test]
async fn test_static_asset_served_from_root() {
    let backend = common::start_echo_backend().await;
    let static_dir = tempfile::tempdir().unwrap();
    common::write_static_fixture(static_dir.path());
    let (addr, shutdown) = common::start_gateway(common::test_config(backend, static_dir.path())).await;

    let res = common::client()
        .get(format!("http://{addr}/bundle/app.js"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let content_type = res.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.contains("javascript"), "{content_type}");
    assert_eq!(res.text().await.unwrap(), "console.log('app')");

    shutdown.trigger();
}

#[tokio::test]
async fn test_unknown_paths_fall_back_to_shell() {
    let backend = common::start_echo_backend().await;
    let static_dir = tempfile::tempdir().unwrap();
    common::write_static_fixture(static_dir.path());
    let (addr, shutdown) = common::start_gateway(common::test_config(backend, static_dir.path())).await;

    let client = common::client();
    for path in ["/", "/settings", "/sessions/abc", "/bundle/missing.js"] {
        let res = client.get(format!("http://{addr}{path}")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK, "path {path}");
        assert_eq!(res.text().await.unwrap(), "<html>shell</html>", "path {path}");
    }

    shutdown.trigger();
}

#[tokio::test]
async fn test_traversal_is_not_found() {
    let backend = common::start_echo_backend().await;
    let static_dir = tempfile::tempdir().unwrap();
    common::write_static_fixture(static_dir.path());
    let (addr, shutdown) = common::start_gateway(common::test_config(backend, static_dir.path())).await;

    let res = common::client()
        .get(format!("http://{addr}/bundle/..%2F..%2Fetc%2Fpasswd"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    shutdown.trigger();
}

#[tokio::test]
async fn test_health_and_response_headers() {
    let backend = common::start_echo_backend().await;
    let static_dir = tempfile::tempdir().unwrap();
    let (addr, shutdown) = common::start_gateway(common::test_config(backend, static_dir.path())).await;

    let res = common::client()
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-content-type-options"], "nosniff");
    assert_eq!(res.headers()["x-frame-options"], "SAMEORIGIN");
    assert!(res.headers().contains_key("x-request-id"));

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["server"], "TunnelForge Gateway");
    assert!(body["tunnels"].is_object());

    shutdown.trigger();
}

#[tokio::test]
async fn test_api_health_answered_locally() {
    let backend = common::unused_addr().await;
    let static_dir = tempfile::tempdir().unwrap();
    let (addr, shutdown) = common::start_gateway(common::test_config(backend, static_dir.path())).await;

    let res = common::client()
        .get(format!("http://{addr}/api/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    shutdown.trigger();
}

#[tokio::test]
async fn test_client_request_id_is_echoed() {
    let backend = common::start_echo_backend().await;
    let static_dir = tempfile::tempdir().unwrap();
    let (addr, shutdown) = common::start_gateway(common::test_config(backend, static_dir.path())).await;

    let res = common::client()
        .get(format!("http://{addr}/health"))
        .header("x-request-id", "trace-me-42")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "trace-me-42");

    shutdown.trigger();
}

#[tokio::test]
async fn test_api_request_reaches_backend_intact() {
    let backend = common::start_echo_backend().await;
    let static_dir = tempfile::tempdir().unwrap();
    let (addr, shutdown) = common::start_gateway(common::test_config(backend, static_dir.path())).await;

    let res = common::client()
        .post(format!("http://{addr}/api/sessions?limit=5&cursor=x"))
        .header("content-type", "application/json")
        .body(r#"{"name":"build"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(res.headers()["x-backend"], "echo");

    let echo: Echo = res.json().await.unwrap();
    assert_eq!(echo.method, "POST");
    assert_eq!(echo.path, "/api/sessions");
    assert_eq!(echo.query.as_deref(), Some("limit=5&cursor=x"));
    assert_eq!(echo.body, r#"{"name":"build"}"#);
    assert_eq!(echo.headers["host"], backend.to_string());
    assert_eq!(echo.headers["x-forwarded-for"], "127.0.0.1");
    assert_eq!(echo.headers["x-forwarded-proto"], "http");
    assert_eq!(echo.headers["x-forwarded-host"], addr.to_string());

    shutdown.trigger();
}

#[tokio::test]
async fn test_backend_status_is_relayed() {
    let backend = common::start_echo_backend().await;
    let static_dir = tempfile::tempdir().unwrap();
    let (addr, shutdown) = common::start_gateway(common::test_config(backend, static_dir.path())).await;

    let res = common::client()
        .get(format!("http://{addr}/api/teapot"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::IM_A_TEAPOT);

    shutdown.trigger();
}

#[tokio::test]
async fn test_plain_backend_body_is_relayed() {
    let backend = common::start_mock_backend("plain backend").await;
    let static_dir = tempfile::tempdir().unwrap();
    let (addr, shutdown) = common::start_gateway(common::test_config(backend, static_dir.path())).await;

    let res = common::client()
        .get(format!("http://{addr}/api/anything"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(!res.headers().contains_key("connection"));
    assert_eq!(res.text().await.unwrap(), "plain backend");

    shutdown.trigger();
}

#[tokio::test]
async fn test_unreachable_backend_is_bad_gateway() {
    let backend = common::unused_addr().await;
    let static_dir = tempfile::tempdir().unwrap();
    common::write_static_fixture(static_dir.path());
    let (addr, shutdown) = common::start_gateway(common::test_config(backend, static_dir.path())).await;

    let client = common::client();
    let res = client.get(format!("http://{addr}/api/sessions")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "upstream unreachable");

    // Static content keeps working without a backend.
    let res = client.get(format!("http://{addr}/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    shutdown.trigger();
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let backend = common::start_echo_backend().await;
    let static_dir = tempfile::tempdir().unwrap();
    let mut config = common::test_config(backend, static_dir.path());
    config.network.upstream_timeout = Duration::from_millis(300);
    let (addr, shutdown) = common::start_gateway(config).await;

    let res = common::client()
        .get(format!("http://{addr}/api/slow"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);

    shutdown.trigger();
}

#[tokio::test]
async fn test_request_timeout_answers_408() {
    let backend = common::start_echo_backend().await;
    let static_dir = tempfile::tempdir().unwrap();
    let mut config = common::test_config(backend, static_dir.path());
    config.network.upstream_timeout = Duration::from_secs(10);
    config.network.request_timeout = Duration::from_millis(300);
    let (addr, shutdown) = common::start_gateway(config).await;

    let res = common::client()
        .get(format!("http://{addr}/api/slow"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::REQUEST_TIMEOUT);

    shutdown.trigger();
}

#[tokio::test]
async fn test_stalled_backend_body_is_cut_off() {
    let backend = common::start_stalling_backend().await;
    let static_dir = tempfile::tempdir().unwrap();
    let mut config = common::test_config(backend, static_dir.path());
    config.network.upstream_timeout = Duration::from_millis(500);
    config.network.request_timeout = Duration::from_secs(2);
    let (addr, shutdown) = common::start_gateway(config).await;

    let res = common::client()
        .get(format!("http://{addr}/api/stream"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = tokio::time::timeout(Duration::from_secs(5), res.bytes())
        .await
        .expect("body should end well before the backend wakes up");
    assert!(body.is_err(), "a truncated body must surface as an error");

    shutdown.trigger();
}

#[tokio::test]
async fn test_websocket_path_without_upgrade_is_proxied() {
    let backend = common::start_echo_backend().await;
    let static_dir = tempfile::tempdir().unwrap();
    let (addr, shutdown) = common::start_gateway(common::test_config(backend, static_dir.path())).await;

    let echo: Echo = common::client()
        .get(format!("http://{addr}/buffers"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(echo.path, "/buffers");

    shutdown.trigger();
}

#[tokio::test]
async fn test_server_stops_on_shutdown() {
    let backend = common::start_echo_backend().await;
    let static_dir = tempfile::tempdir().unwrap();
    let (addr, shutdown) = common::start_gateway(common::test_config(backend, static_dir.path())).await;

    let client = common::client();
    assert!(client.get(format!("http://{addr}/health")).send().await.is_ok());

    shutdown.trigger();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let fresh = common::client();
    assert!(fresh.get(format!("http://{addr}/health")).send().await.is_err());
}
