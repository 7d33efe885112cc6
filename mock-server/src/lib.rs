use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::debug;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserInfo {
    pub id: u64,
    pub name: String,
}

/// What `/echo` (and `/`) saw of the incoming request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub uri: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Echo {
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Hits {
    pub hits: u64,
}

#[derive(Clone, Default)]
pub struct AppState {
    pub cached_hits: Arc<AtomicU64>,
}

pub fn app() -> Router {
    app_with_state(AppState::default())
}

pub fn app_with_state(state: AppState) -> Router {
    Router::new()
        .route("/", any(echo))
        .route("/echo", any(echo))
        .route("/v1/userinfo", get(user_info))
        .route("/status/{code}", get(status))
        .route("/cached", get(cached))
        .route("/slow/{ms}", get(slow))
        .route("/large/{bytes}", get(large))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: String) -> Json<Echo> {
    debug!(%method, %uri, "echo");
    let headers = headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
        .collect();
    Json(Echo {
        method: method.to_string(),
        uri: uri.to_string(),
        headers,
        body,
    })
}

async fn user_info() -> Json<UserInfo> {
    Json(UserInfo {
        id: 1,
        name: "demo".to_string(),
    })
}

async fn status(Path(code): Path<u16>) -> Result<(StatusCode, String), StatusCode> {
    let status = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok((status, format!("status {code}")))
}

async fn cached(State(state): State<AppState>) -> impl IntoResponse {
    let hits = state.cached_hits.fetch_add(1, Ordering::SeqCst) + 1;
    ([(header::CACHE_CONTROL, "max-age=60")], Json(Hits { hits }))
}

async fn slow(Path(ms): Path<u64>) -> Json<serde_json::Value> {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Json(serde_json::json!({ "slept": ms }))
}

/// A JSON string whose encoded form is exactly `bytes` long.
async fn large(Path(bytes): Path<usize>) -> Result<impl IntoResponse, StatusCode> {
    let inner = bytes.checked_sub(2).ok_or(StatusCode::BAD_REQUEST)?;
    let body = format!("\"{}\"", "a".repeat(inner));
    Ok(([(header::CONTENT_TYPE, "application/json")], body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_info_serializes_to_json() {
        let user = UserInfo {
            id: 1,
            name: "demo".to_string(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["name"], "demo");
    }

    #[test]
    fn echo_header_lookup_is_case_insensitive() {
        let echo = Echo {
            method: "GET".into(),
            uri: "/".into(),
            headers: vec![("x-app".into(), "1".into()), ("X-App".into(), "2".into())],
            body: String::new(),
        };
        assert_eq!(echo.header_values("X-APP"), vec!["1", "2"]);
    }

    #[test]
    fn echo_deserializes_header_pairs() {
        let echo: Echo = serde_json::from_str(
            r#"{"method":"POST","uri":"/echo","headers":[["x-app","1"]],"body":"a=1"}"#,
        )
        .unwrap();
        assert_eq!(echo.header_values("x-app"), vec!["1"]);
        assert_eq!(echo.body, "a=1");
    }
}
