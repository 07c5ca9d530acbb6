use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::AppState;
use crate::gateway::{self, InboundEvent, ReplyKind};
use crate::utils::success_to_api_response;

/// 传输层推送的入站事件
#[axum::debug_handler]
pub async fn handle_update(
    State(state): State<AppState>,
    Json(event): Json<InboundEvent>,
) -> impl IntoResponse {
    let intent = gateway::classify(event);
    tracing::debug!("Inbound intent: {:?}", intent);

    let reply = gateway::dispatch(&state.service, intent).await;
    let status = match reply.kind {
        ReplyKind::Failure => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    };
    (status, success_to_api_response(reply))
}
