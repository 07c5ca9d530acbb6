use serde::{Deserialize, Serialize};

use crate::gateway::UserId;
use crate::service::NearbyMessage;
use crate::store::MessageId;

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub user_id: UserId,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct CreateMessageResponse {
    pub message_id: MessageId,
}

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct NearbyResponse {
    pub radius_meters: f64,
    pub count: usize,
    pub messages: Vec<NearbyMessage>,
}
