//! 位置、发帖与附近消息查询的用例层
//!
//! 服务本身不持有状态，每次调用都重新读取用户当前位置。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::geo::{CoordinateError, Position};
use crate::store::{
    MessageId, NearbyQuery, PostedMessage, SortOrder, SpatialStore, StoreError, UserLocation,
};

pub const DEFAULT_RADIUS_METERS: f64 = 200.0;
pub const DEFAULT_LIMIT: usize = 100;
pub const DEFAULT_MAX_TEXT_LEN: usize = 4096;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 附近查询的距离、数量策略
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityPolicy {
    pub radius_meters: f64,
    pub limit: usize,
    pub max_text_len: usize,
}

impl Default for ProximityPolicy {
    fn default() -> Self {
        Self {
            radius_meters: DEFAULT_RADIUS_METERS,
            limit: DEFAULT_LIMIT,
            max_text_len: DEFAULT_MAX_TEXT_LEN,
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(#[from] CoordinateError),
    #[error("message text is empty")]
    EmptyText,
    #[error("message text exceeds {max} characters")]
    TextTooLong { max: usize },
    #[error("user `{0}` has no location on file")]
    LocationRequired(String),
    #[error("store failure: {0}")]
    Store(StoreError),
}

impl ServiceError {
    /// 面向用户的文本，不包含内部错误细节
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::InvalidCoordinates(CoordinateError::Latitude(_)) => {
                "Latitude must be between -90 and 90".to_string()
            }
            ServiceError::InvalidCoordinates(CoordinateError::Longitude(_)) => {
                "Longitude must be between -180 and 180".to_string()
            }
            ServiceError::InvalidCoordinates(_) => "Position must be a point".to_string(),
            ServiceError::EmptyText => "Message must not be empty".to_string(),
            ServiceError::TextTooLong { max } => {
                format!("Message is too long (max {} characters)", max)
            }
            ServiceError::LocationRequired(_) => "Set position first".to_string(),
            ServiceError::Store(_) => "Something went wrong, please try again".to_string(),
        }
    }
}

/// 附近消息及其单行展示
#[derive(Debug, Clone, Serialize)]
pub struct NearbyMessage {
    pub line: String,
    #[serde(flatten)]
    pub message: PostedMessage,
}

impl From<PostedMessage> for NearbyMessage {
    fn from(message: PostedMessage) -> Self {
        Self {
            line: format_line(&message.created_at, &message.content),
            message,
        }
    }
}

pub fn format_line(created_at: &DateTime<Utc>, content: &str) -> String {
    format!("[{}] {}", created_at.format(TIMESTAMP_FORMAT), content)
}

#[derive(Clone)]
pub struct ProximityService {
    store: Arc<dyn SpatialStore>,
    policy: ProximityPolicy,
}

impl ProximityService {
    pub fn new(store: Arc<dyn SpatialStore>) -> Self {
        Self::with_policy(store, ProximityPolicy::default())
    }

    pub fn with_policy(store: Arc<dyn SpatialStore>, policy: ProximityPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &ProximityPolicy {
        &self.policy
    }

    pub async fn set_location(
        &self,
        user_id: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<UserLocation, ServiceError> {
        let position = Position::new(latitude, longitude)?;
        let now = Utc::now();

        self.store
            .upsert_location(user_id, position, now)
            .await
            .map_err(|e| store_failure("save location", user_id, e))?;

        tracing::info!("Location set for {}: {}, {}", user_id, latitude, longitude);
        Ok(UserLocation {
            user_id: user_id.to_string(),
            position,
            updated_at: now,
        })
    }

    pub async fn location_of(&self, user_id: &str) -> Result<UserLocation, ServiceError> {
        match self.store.get_location(user_id).await {
            Ok(location) => Ok(location),
            Err(e) if e.is_not_found() => {
                tracing::info!("No location on file for {}", user_id);
                Err(ServiceError::LocationRequired(user_id.to_string()))
            }
            Err(e) => Err(store_failure("get location", user_id, e)),
        }
    }

    pub async fn post_message(&self, user_id: &str, text: &str) -> Result<MessageId, ServiceError> {
        if text.trim().is_empty() {
            return Err(ServiceError::EmptyText);
        }
        if text.chars().count() > self.policy.max_text_len {
            return Err(ServiceError::TextTooLong {
                max: self.policy.max_text_len,
            });
        }

        let location = self.location_of(user_id).await?;
        let message_id = self
            .store
            .insert_message(text, location.position, Utc::now())
            .await
            .map_err(|e| store_failure("save message", user_id, e))?;

        tracing::debug!("Message {} posted by {}", message_id, user_id);
        Ok(message_id)
    }

    pub async fn query_nearby(&self, user_id: &str) -> Result<Vec<NearbyMessage>, ServiceError> {
        let location = self.location_of(user_id).await?;
        let query = NearbyQuery {
            center: location.position,
            max_distance_meters: self.policy.radius_meters,
            limit: self.policy.limit,
            order: SortOrder::MostRecentFirst,
        };

        let messages = self
            .store
            .query_nearby(query)
            .await
            .map_err(|e| store_failure("query nearby messages", user_id, e))?;

        tracing::debug!("Found {} messages near {}", messages.len(), user_id);
        Ok(messages.into_iter().map(NearbyMessage::from).collect())
    }
}

fn store_failure(action: &str, user_id: &str, err: StoreError) -> ServiceError {
    tracing::error!("Failed to {} for {}: {}", action, user_id, err);
    ServiceError::Store(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn service() -> ProximityService {
        ProximityService::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn formats_line_with_timestamp() {
        let at = Utc.with_ymd_and_hms(2017, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(format_line(&at, "hello"), "[2017-03-04 05:06:07] hello");
    }

    #[test]
    fn store_errors_never_leak_to_users() {
        let err = ServiceError::Store(StoreError::Unavailable("pool timed out at 10.0.0.3".into()));
        assert_eq!(err.user_message(), "Something went wrong, please try again");
    }

    #[tokio::test]
    async fn rejects_invalid_coordinates() {
        let svc = service();
        let err = svc.set_location("1", 91.0, 0.0).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCoordinates(_)));
        assert_eq!(err.user_message(), "Latitude must be between -90 and 90");

        let err = svc.set_location("1", 0.0, 200.0).await.unwrap_err();
        assert_eq!(err.user_message(), "Longitude must be between -180 and 180");
    }

    #[tokio::test]
    async fn rejects_empty_text_before_location_check() {
        let svc = service();
        let err = svc.post_message("1", "   ").await.unwrap_err();
        assert!(matches!(err, ServiceError::EmptyText));
    }

    #[tokio::test]
    async fn rejects_text_over_policy_limit() {
        let policy = ProximityPolicy {
            max_text_len: 5,
            ..ProximityPolicy::default()
        };
        let svc = ProximityService::with_policy(Arc::new(MemoryStore::new()), policy);
        svc.set_location("1", 0.0, 0.0).await.unwrap();

        assert!(svc.post_message("1", "hello").await.is_ok());
        let err = svc.post_message("1", "hello!").await.unwrap_err();
        assert!(matches!(err, ServiceError::TextTooLong { max: 5 }));
    }

    #[tokio::test]
    async fn post_without_location_is_precondition_failure() {
        let svc = service();
        let err = svc.post_message("1", "hi").await.unwrap_err();
        assert!(matches!(err, ServiceError::LocationRequired(_)));
        assert_eq!(err.user_message(), "Set position first");

        let err = svc.query_nearby("1").await.unwrap_err();
        assert!(matches!(err, ServiceError::LocationRequired(_)));
    }

    #[tokio::test]
    async fn store_failure_maps_to_store_error() {
        let store = Arc::new(MemoryStore::new());
        let svc = ProximityService::new(store.clone());
        store.close().await;

        let err = svc.set_location("1", 0.0, 0.0).await.unwrap_err();
        assert!(matches!(err, ServiceError::Store(_)));
        let err = svc.query_nearby("1").await.unwrap_err();
        assert!(matches!(err, ServiceError::Store(_)));
    }

    #[tokio::test]
    async fn policy_radius_is_applied() {
        let policy = ProximityPolicy {
            radius_meters: 50.0,
            ..ProximityPolicy::default()
        };
        let svc = ProximityService::with_policy(Arc::new(MemoryStore::new()), policy);
        svc.set_location("a", 52.52, 13.405).await.unwrap();
        svc.post_message("a", "hello").await.unwrap();

        // 约 130 米外
        svc.set_location("b", 52.521, 13.406).await.unwrap();
        assert!(svc.query_nearby("b").await.unwrap().is_empty());
        assert_eq!(svc.query_nearby("a").await.unwrap().len(), 1);
    }
}
