use std::sync::Arc;

use axum::{
    Json, Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use crate::AppState;
use crate::middleware::{RateLimiter, log_errors, rate_limit};
use crate::utils::{ApiResponse, error_codes, error_to_api_response, success_to_api_response};

pub mod message;
pub mod update;
pub mod user;

async fn health() -> Json<ApiResponse<&'static str>> {
    success_to_api_response("ok")
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        error_to_api_response::<()>(error_codes::NOT_FOUND, "Not found".to_string()),
    )
}

/// 组装全部路由与中间件
pub fn router(state: AppState, rate_limiter: Option<Arc<RateLimiter>>) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/updates", post(update::handle_update))
        .route(
            "/users/location",
            get(user::get_location).put(user::set_location),
        )
        .route("/messages/create", post(message::create_message))
        .route("/messages/nearby", get(message::nearby_messages));

    let base = state.config.api_base_uri.trim_end_matches('/').to_string();
    let router = if base.is_empty() {
        api
    } else {
        Router::new().nest(&base, api)
    };

    let mut router = router
        .fallback(not_found)
        .layer(axum::middleware::from_fn(log_errors));

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum::middleware::from_fn_with_state(limiter, rate_limit));
    }

    // 开发模式下允许所有来源
    #[cfg(debug_assertions)]
    let router = router.layer(tower_http::cors::CorsLayer::permissive());

    router.with_state(state)
}
