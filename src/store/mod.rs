//! 位置与消息的持久化
//!
//! `SpatialStore` 是服务层唯一依赖的存储接口。每个用户只保留最新位置；
//! 消息日志只追加、不修改。

mod memory;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{Config, StoreBackend};
use crate::geo::Position;

pub use memory::{DEFAULT_PRECISION_BITS, MemoryStore};
pub use postgres::PgStore;

pub type MessageId = Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no location on file for user `{0}`")]
    NotFound(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserLocation {
    pub user_id: String,
    pub position: Position,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostedMessage {
    pub message_id: MessageId,
    pub content: String,
    pub position: Position,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    MostRecentFirst,
}

/// 附近消息查询条件
#[derive(Debug, Clone, Copy)]
pub struct NearbyQuery {
    pub center: Position,
    pub max_distance_meters: f64,
    pub limit: usize,
    pub order: SortOrder,
}

#[async_trait]
pub trait SpatialStore: Send + Sync {
    /// 覆盖写入用户当前位置
    async fn upsert_location(
        &self,
        user_id: &str,
        position: Position,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// 读取用户当前位置，未设置过时返回 `StoreError::NotFound`
    async fn get_location(&self, user_id: &str) -> Result<UserLocation, StoreError>;

    /// 追加一条消息，返回新分配的消息ID
    async fn insert_message(
        &self,
        content: &str,
        position: Position,
        timestamp: DateTime<Utc>,
    ) -> Result<MessageId, StoreError>;

    /// 半径内的消息，按创建时间倒序，最多 `limit` 条
    async fn query_nearby(&self, query: NearbyQuery) -> Result<Vec<PostedMessage>, StoreError>;

    async fn close(&self);
}

/// 基于时间的消息ID
pub fn new_message_id(timestamp: DateTime<Utc>) -> MessageId {
    let ts = uuid::Timestamp::from_unix(
        uuid::NoContext,
        timestamp.timestamp().max(0) as u64,
        timestamp.timestamp_subsec_nanos(),
    );
    Uuid::new_v7(ts)
}

/// 按配置打开存储，Postgres 会同时建好表和索引
pub async fn open(config: &Config) -> Result<Arc<dyn SpatialStore>, StoreError> {
    match (config.store_backend, config.database_url.as_deref()) {
        (StoreBackend::Postgres, Some(url)) => {
            let store = PgStore::connect(url, config.database_max_connections).await?;
            store.ensure_schema().await?;
            tracing::info!("Using Postgres store");
            Ok(Arc::new(store))
        }
        (StoreBackend::Postgres, None) => {
            Err(StoreError::Unavailable("DATABASE_URL is not set".into()))
        }
        (StoreBackend::Memory, _) => {
            tracing::warn!("Using in-memory store, data is lost on shutdown");
            Ok(Arc::new(MemoryStore::with_precision(
                config.index_precision_bits,
            )))
        }
    }
}
