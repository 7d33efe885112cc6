use std::sync::atomic::Ordering;

use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, app_with_state, AppState, Echo, Hits, UserInfo};
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn get(uri: &str) -> Request<String> {
    Request::builder().uri(uri).body(String::new()).unwrap()
}

// --- userinfo ---

#[tokio::test]
async fn user_info_returns_demo_user() {
    let resp = app().oneshot(get("/v1/userinfo")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let user: UserInfo = body_json(resp).await;
    assert_eq!(user.id, 1);
    assert_eq!(user.name, "demo");
}

// --- echo ---

#[tokio::test]
async fn echo_reports_method_uri_headers_and_body() {
    let resp = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/echo?x=1")
                .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header("x-app", "1")
                .header("x-app", "2")
                .body("user=ada&pin=1234".to_string())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let echo: Echo = body_json(resp).await;
    assert_eq!(echo.method, "POST");
    assert_eq!(echo.uri, "/echo?x=1");
    assert_eq!(echo.header_values("X-App"), vec!["1", "2"]);
    assert_eq!(echo.body, "user=ada&pin=1234");
}

#[tokio::test]
async fn root_echoes_too() {
    let resp = app().oneshot(get("/")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let echo: Echo = body_json(resp).await;
    assert_eq!(echo.uri, "/");
    assert_eq!(echo.method, "GET");
}

// --- status ---

#[tokio::test]
async fn status_returns_requested_code() {
    let resp = app().oneshot(get("/status/503")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_bytes(resp).await, "status 503");
}

#[tokio::test]
async fn status_rejects_out_of_range_codes() {
    let resp = app().oneshot(get("/status/42")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- cached ---

#[tokio::test]
async fn cached_counts_hits_and_sets_max_age() {
    let state = AppState::default();
    let router = app_with_state(state.clone());

    let resp = router.clone().oneshot(get("/cached")).await.unwrap();
    assert_eq!(resp.headers()[http::header::CACHE_CONTROL], "max-age=60");
    let first: Hits = body_json(resp).await;

    let resp = router.oneshot(get("/cached")).await.unwrap();
    let second: Hits = body_json(resp).await;

    assert_eq!(first.hits, 1);
    assert_eq!(second.hits, 2);
    assert_eq!(state.cached_hits.load(Ordering::SeqCst), 2);
}

// --- slow ---

#[tokio::test]
async fn slow_waits_then_answers() {
    let started = std::time::Instant::now();
    let resp = app().oneshot(get("/slow/50")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(started.elapsed() >= std::time::Duration::from_millis(50));
    let body: serde_json::Value = body_json(resp).await;
    assert_eq!(body["slept"], 50);
}

// --- large ---

#[tokio::test]
async fn large_returns_a_json_string_of_the_requested_size() {
    let resp = app().oneshot(get("/large/1024")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body_bytes(resp).await;
    assert_eq!(bytes.len(), 1024);
    let text: String = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(text.len(), 1022);
}

#[tokio::test]
async fn large_rejects_sizes_below_two() {
    let resp = app().oneshot(get("/large/1")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_route_is_404() {
    let resp = app().oneshot(get("/nope")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
