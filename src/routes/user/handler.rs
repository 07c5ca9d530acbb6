use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::model::{SetLocationRequest, UserQuery};
use crate::AppState;
use crate::utils::{service_error_response, success_to_api_response};

#[axum::debug_handler]
pub async fn set_location(
    State(state): State<AppState>,
    Json(req): Json<SetLocationRequest>,
) -> impl IntoResponse {
    let user_id = req.user_id.into_key();
    match state
        .service
        .set_location(&user_id, req.latitude, req.longitude)
        .await
    {
        Ok(location) => (StatusCode::OK, success_to_api_response(location)),
        Err(e) => service_error_response(&e),
    }
}

#[axum::debug_handler]
pub async fn get_location(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> impl IntoResponse {
    match state.service.location_of(&query.user_id).await {
        Ok(location) => (StatusCode::OK, success_to_api_response(location)),
        Err(e) => service_error_response(&e),
    }
}
