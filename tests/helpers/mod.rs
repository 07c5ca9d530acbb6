#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use geobot::{
    AppState,
    config::Config,
    routes,
    service::{ProximityPolicy, ProximityService},
    store::MemoryStore,
};
use serde_json::Value;
use tower::ServiceExt;

pub fn test_service() -> ProximityService {
    ProximityService::new(Arc::new(MemoryStore::new()))
}

pub fn test_service_with(policy: ProximityPolicy) -> ProximityService {
    ProximityService::with_policy(Arc::new(MemoryStore::new()), policy)
}

pub fn test_app() -> Router {
    let state = AppState {
        service: test_service(),
        config: Config::default(),
    };
    routes::router(state, None)
}

/// 发送请求并解析 JSON 响应
pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}
