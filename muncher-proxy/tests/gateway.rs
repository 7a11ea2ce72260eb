//! End-to-end tests: the real router in front of a local mock of TETR.IO.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use muncher_core::{AdmissionConfig, DispatchConfig, TokioClock};
use muncher_proxy::{
    analyzer::PassthroughAnalyzer, build_router, AppState, Credentials, ProxyConfig,
    TetrioClient, UpstreamError,
};
use serde_json::{json, Value};
use tokio::sync::Mutex;

const TOKEN: &str = "mock-token";

async fn authenticate(Json(body): Json<Value>) -> Response {
    if body["username"] == "bot" && body["password"] == "secret" {
        Json(json!({ "success": true, "token": TOKEN })).into_response()
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "success": false }))).into_response()
    }
}

async fn game(headers: HeaderMap, Path(id): Path<String>) -> Response {
    let expected = format!("Bearer {TOKEN}");
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some(expected.as_str()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    match id.as_str() {
        "good" => Json(json!({
            "success": true,
            "game": { "gamemode": "league", "replay": { "rounds": [] } }
        }))
        .into_response(),
        "unsuccessful" => Json(json!({ "success": false })).into_response(),
        "html" => "<html>maintenance</html>".into_response(),
        _ => (StatusCode::NOT_FOUND, Json(json!({ "success": false }))).into_response(),
    }
}

async fn channel_user(Path(name): Path<String>) -> Response {
    match name.as_str() {
        "osk" => Json(json!({
            "success": true,
            "data": { "_id": "5e32fc85ab319c2ab1beb07c", "username": "osk" }
        }))
        .into_response(),
        "broken" => "not json".into_response(),
        _ => (StatusCode::NOT_FOUND, Json(json!({ "success": false }))).into_response(),
    }
}

async fn league_recent(Path(id): Path<String>) -> Json<Value> {
    Json(json!({ "success": true, "data": { "user": id, "entries": [] } }))
}

async fn spawn_upstream() -> SocketAddr {
    let app = Router::new()
        .route("/api/users/authenticate", post(authenticate))
        .route("/api/games/:id", get(game))
        .route("/ch/users/:name", get(channel_user))
        .route("/ch/users/:name/records/league/recent", get(league_recent));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn gateway_config(upstream: SocketAddr, admission: AdmissionConfig) -> ProxyConfig {
    ProxyConfig {
        api_url: format!("http://{upstream}/api"),
        channel_url: format!("http://{upstream}/ch"),
        credentials: Some(Credentials {
            username: "bot".to_string(),
            password: "secret".to_string(),
        }),
        supporter_keys: vec!["gold".to_string()],
        upstream_timeout: Duration::from_secs(5),
        dispatch: DispatchConfig::unthrottled(),
        admission,
        ..Default::default()
    }
}

async fn spawn_gateway(config: ProxyConfig) -> (String, Arc<AppState>) {
    let client =
        TetrioClient::new(&config.api_url, &config.channel_url, config.upstream_timeout).unwrap();
    let state = Arc::new(AppState::new(
        config,
        TokioClock::shared(),
        client,
        Arc::new(PassthroughAnalyzer),
    ));

    let app = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });

    (format!("http://{addr}"), state)
}

async fn logged_in_gateway() -> String {
    let upstream = spawn_upstream().await;
    let (base, state) = spawn_gateway(gateway_config(upstream, AdmissionConfig::relaxed())).await;
    state.login().await.unwrap();
    base
}

#[tokio::test]
async fn test_status() {
    let base = logged_in_gateway().await;

    let response = reqwest::get(format!("{base}/status")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "OK");

    let health: Value = reqwest::get(format!("{base}/health")).await.unwrap().json().await.unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["authenticated"], true);
}

#[tokio::test]
async fn test_replay_download() {
    let base = logged_in_gateway().await;

    let response = reqwest::get(format!("{base}/replay/good")).await.unwrap();
    assert_eq!(response.status(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["gamemode"], "league");
}

#[tokio::test]
async fn test_replay_upstream_status_passes_through() {
    let base = logged_in_gateway().await;

    let response = reqwest::get(format!("{base}/replay/missing")).await.unwrap();
    assert_eq!(response.status(), 404);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "upstream_rejected");
}

#[tokio::test]
async fn test_malformed_replay_is_bad_gateway() {
    let base = logged_in_gateway().await;

    let response = reqwest::get(format!("{base}/replay/unsuccessful")).await.unwrap();
    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "malformed_response");

    let response = reqwest::get(format!("{base}/replay/html")).await.unwrap();
    assert_eq!(response.status(), 502);
}

#[tokio::test]
async fn test_user_and_league_pass_through() {
    let base = logged_in_gateway().await;

    let user: Value = reqwest::get(format!("{base}/user/osk")).await.unwrap().json().await.unwrap();
    assert_eq!(user["data"]["username"], "osk");

    let league: Value =
        reqwest::get(format!("{base}/league/5e32")).await.unwrap().json().await.unwrap();
    assert_eq!(league["data"]["user"], "5e32");

    let response = reqwest::get(format!("{base}/user/broken")).await.unwrap();
    assert_eq!(response.status(), 502);
}

#[tokio::test]
async fn test_rate_limit_is_per_caller() {
    let upstream = spawn_upstream().await;
    let admission = AdmissionConfig {
        capacity: 2,
        window: Duration::from_secs(30),
        ..Default::default()
    };
    let (base, state) = spawn_gateway(gateway_config(upstream, admission)).await;
    state.login().await.unwrap();

    let client = reqwest::Client::new();
    let get_as = |ip: &'static str| {
        client
            .get(format!("{base}/user/osk"))
            .header("x-forwarded-for", ip)
            .send()
    };

    assert_eq!(get_as("198.51.100.1").await.unwrap().status(), 200);
    assert_eq!(get_as("198.51.100.1").await.unwrap().status(), 200);

    let denied = get_as("198.51.100.1").await.unwrap();
    assert_eq!(denied.status(), 429);
    let retry_after: u64 = denied
        .headers()
        .get("retry-after")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=30).contains(&retry_after));

    assert_eq!(get_as("198.51.100.2").await.unwrap().status(), 200);
}

#[tokio::test]
async fn test_replay_upload() {
    let base = logged_in_gateway().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/replay"))
        .body(r#"{"gamemode":"league","replay":{}}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = client
        .post(format!("{base}/replay"))
        .body("definitely not a replay")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "analysis_failed");

    let response = reqwest::get(format!("{base}/replay")).await.unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_api_prefix_is_not_found() {
    let base = logged_in_gateway().await;

    let response = reqwest::get(format!("{base}/api/users/osk")).await.unwrap();
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Not found");
}

#[tokio::test]
async fn test_metrics_snapshot() {
    let base = logged_in_gateway().await;
    reqwest::get(format!("{base}/user/osk")).await.unwrap();

    let metrics: Value = reqwest::get(format!("{base}/metrics")).await.unwrap().json().await.unwrap();
    // login + user lookup
    assert_eq!(metrics["dispatch"]["totals"]["tasks_succeeded"], 2);
    assert_eq!(metrics["admission"]["totals"]["admitted"], 1);
    assert_eq!(metrics["supporters"], 1);
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    // Grab a free port, then close it
    let closed = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let (base, state) = spawn_gateway(gateway_config(closed, AdmissionConfig::relaxed())).await;
    state.set_token("stale").await;

    let response = reqwest::get(format!("{base}/replay/good")).await.unwrap();
    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "upstream_unreachable");
}

#[tokio::test]
async fn test_replay_without_login_is_unavailable() {
    let upstream = spawn_upstream().await;
    let (base, _state) = spawn_gateway(gateway_config(upstream, AdmissionConfig::relaxed())).await;

    let response = reqwest::get(format!("{base}/replay/good")).await.unwrap();
    assert_eq!(response.status(), 503);
}

#[tokio::test]
async fn test_get_user_id() {
    let upstream = spawn_upstream().await;
    let config = gateway_config(upstream, AdmissionConfig::relaxed());
    let client =
        TetrioClient::new(&config.api_url, &config.channel_url, config.upstream_timeout).unwrap();

    assert_eq!(client.get_user_id("osk").await.unwrap(), "5e32fc85ab319c2ab1beb07c");
    assert_eq!(client.get_user_id("nobody").await, Err(UpstreamError::Rejected(404)));
    assert!(matches!(
        client.get_user_id("broken").await,
        Err(UpstreamError::Malformed(_))
    ));
}

#[tokio::test]
async fn test_wrong_credentials_are_rejected() {
    let upstream = spawn_upstream().await;
    let mut config = gateway_config(upstream, AdmissionConfig::relaxed());
    config.credentials = Some(Credentials {
        username: "bot".to_string(),
        password: "wrong".to_string(),
    });
    let (_base, state) = spawn_gateway(config).await;

    assert!(state.login().await.is_err());
    assert!(state.bearer_token().await.is_err());
}

#[tokio::test]
async fn test_user_id_route() {
    let base = logged_in_gateway().await;

    let body: Value =
        reqwest::get(format!("{base}/user/osk/id")).await.unwrap().json().await.unwrap();
    assert_eq!(body["id"], "5e32fc85ab319c2ab1beb07c");

    let response = reqwest::get(format!("{base}/user/nobody/id")).await.unwrap();
    assert_eq!(response.status(), 404);
}

type ArrivalLog = Arc<Mutex<Vec<String>>>;

/// Upstream that records the order profile lookups arrive in and answers slowly
async fn spawn_recording_upstream() -> (SocketAddr, ArrivalLog) {
    async fn slow_user(State(log): State<ArrivalLog>, Path(name): Path<String>) -> Json<Value> {
        log.lock().await.push(name.clone());
        tokio::time::sleep(Duration::from_millis(500)).await;
        Json(json!({ "success": true, "data": { "username": name } }))
    }

    let log = ArrivalLog::default();
    let app = Router::new()
        .route("/ch/users/:name", get(slow_user))
        .with_state(log.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, log)
}

async fn wait_until(what: impl Fn() -> bool) {
    for _ in 0..400 {
        if what() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_supporter_key_jumps_queued_standard_traffic() {
    let (upstream, log) = spawn_recording_upstream().await;
    let (base, state) = spawn_gateway(gateway_config(upstream, AdmissionConfig::relaxed())).await;
    let client = reqwest::Client::new();

    let lookup = |name: &'static str, supporter_key: Option<&'static str>| {
        let mut request = client.get(format!("{base}/user/{name}"));
        if let Some(key) = supporter_key {
            request = request.header("x-supporter-key", key);
        }
        tokio::spawn(async move { request.send().await.unwrap().status() })
    };

    // Occupy the worker, then line up two standard lookups behind it
    let running = lookup("running", None);
    wait_until(|| state.queue.is_active()).await;
    let standard_1 = lookup("standard-1", None);
    wait_until(|| state.queue.depth() == 1).await;
    let standard_2 = lookup("standard-2", None);
    wait_until(|| state.queue.depth() == 2).await;

    let forged = lookup("forged", Some("not-a-key"));
    wait_until(|| state.queue.depth() == 3).await;
    let supporter = lookup("supporter", Some("gold"));

    for handle in [running, standard_1, standard_2, forged, supporter] {
        assert_eq!(handle.await.unwrap(), 200);
    }

    assert_eq!(
        *log.lock().await,
        vec!["running", "supporter", "standard-1", "standard-2", "forged"]
    );
}
