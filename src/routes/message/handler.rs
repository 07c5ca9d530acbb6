use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::model::{CreateMessageRequest, CreateMessageResponse, NearbyQuery, NearbyResponse};
use crate::AppState;
use crate::utils::{service_error_response, success_to_api_response};

#[axum::debug_handler]
pub async fn create_message(
    State(state): State<AppState>,
    Json(req): Json<CreateMessageRequest>,
) -> impl IntoResponse {
    let user_id = req.user_id.into_key();
    match state.service.post_message(&user_id, &req.text).await {
        Ok(message_id) => (
            StatusCode::CREATED,
            success_to_api_response(CreateMessageResponse { message_id }),
        ),
        Err(e) => service_error_response(&e),
    }
}

#[axum::debug_handler]
pub async fn nearby_messages(
    State(state): State<AppState>,
    Query(query): Query<NearbyQuery>,
) -> impl IntoResponse {
    match state.service.query_nearby(&query.user_id).await {
        Ok(messages) => (
            StatusCode::OK,
            success_to_api_response(NearbyResponse {
                radius_meters: state.service.policy().radius_meters,
                count: messages.len(),
                messages,
            }),
        ),
        Err(e) => service_error_response(&e),
    }
}
