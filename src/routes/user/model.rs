use serde::Deserialize;

use crate::gateway::UserId;

#[derive(Debug, Deserialize)]
pub struct SetLocationRequest {
    pub user_id: UserId,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: String,
}
