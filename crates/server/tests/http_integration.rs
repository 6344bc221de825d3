//! End-to-end HTTP tests: binds the real router to an ephemeral port and
//! drives it with actual requests, exercising the auth layer and route glue
//! together rather than unit-testing either in isolation.

use config::Config;
use llm::Gateway;
use secrecy::ExposeSecret;
use tokio::net::TcpListener;

async fn spawn_test_server() -> String {
    let config = Config::from_env_iter(
        [("PROXY_API_KEY", "test-proxy-key"), ("REFRESH_TOKEN", "dummy-refresh-token-for-tests")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string())),
    )
    .expect("minimal env is valid");

    let gateway = Gateway::new(&config);
    let app = server::build_router(gateway, config.proxy_api_key.expose_secret());

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("ephemeral port binds");
    let addr = listener.local_addr().expect("listener has a local address");

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.expect("server runs cleanly");
    });

    format!("http://{addr}")
}

#[tokio::test]
async fn health_route_is_open_and_returns_ok() {
    let base = spawn_test_server().await;

    let response = reqwest::get(format!("{base}/health")).await.expect("request succeeds");
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.expect("valid json body");
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn chat_completions_without_a_key_is_rejected() {
    let base = spawn_test_server().await;

    let response = reqwest::Client::new()
        .post(format!("{base}/v1/chat/completions"))
        .json(&serde_json::json!({ "model": "claude-sonnet-4.5", "messages": [] }))
        .send()
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn messages_without_a_key_is_rejected() {
    let base = spawn_test_server().await;

    let response = reqwest::Client::new()
        .post(format!("{base}/v1/messages"))
        .json(&serde_json::json!({ "model": "claude-sonnet-4.5", "messages": [], "max_tokens": 10 }))
        .send()
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn chat_completions_with_the_wrong_key_is_rejected() {
    let base = spawn_test_server().await;

    let response = reqwest::Client::new()
        .post(format!("{base}/v1/chat/completions"))
        .bearer_auth("not-the-right-key")
        .json(&serde_json::json!({ "model": "claude-sonnet-4.5", "messages": [] }))
        .send()
        .await
        .expect("request succeeds");

    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn account_status_with_the_right_key_passes_the_auth_layer() {
    let base = spawn_test_server().await;

    let response = reqwest::Client::new()
        .get(format!("{base}/v1/accounts/status"))
        .bearer_auth("test-proxy-key")
        .send()
        .await
        .expect("request succeeds");

    // Past the auth layer, this one fans out to the route handler itself,
    // which confirms the glue between AuthLayer and the OpenAI sub-router.
    assert_eq!(response.status(), 200);
}
