use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, FromRow, PgPool};
use uuid::Uuid;

use super::{
    MessageId, NearbyQuery, PostedMessage, SortOrder, SpatialStore, StoreError, UserLocation,
    new_message_id,
};
use crate::geo::{BoundingBox, EARTH_RADIUS_METERS, Position};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS locations (
        user_id TEXT PRIMARY KEY,
        latitude DOUBLE PRECISION NOT NULL,
        longitude DOUBLE PRECISION NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS messages (
        message_id UUID PRIMARY KEY,
        content TEXT NOT NULL,
        latitude DOUBLE PRECISION NOT NULL,
        longitude DOUBLE PRECISION NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS locations_lat_lon_idx ON locations (latitude, longitude)",
    "CREATE INDEX IF NOT EXISTS messages_lat_lon_idx ON messages (latitude, longitude)",
    "CREATE INDEX IF NOT EXISTS messages_created_at_idx ON messages (created_at DESC)",
];

/// Postgres 存储
pub struct PgStore {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct LocationRow {
    user_id: String,
    latitude: f64,
    longitude: f64,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct MessageRow {
    message_id: Uuid,
    content: String,
    latitude: f64,
    longitude: f64,
    created_at: DateTime<Utc>,
}

impl TryFrom<LocationRow> for UserLocation {
    type Error = StoreError;

    fn try_from(row: LocationRow) -> Result<Self, Self::Error> {
        let position = Position::new(row.latitude, row.longitude)
            .map_err(|e| StoreError::Corrupt(format!("location of {}: {}", row.user_id, e)))?;
        Ok(UserLocation {
            user_id: row.user_id,
            position,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<MessageRow> for PostedMessage {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let position = Position::new(row.latitude, row.longitude)
            .map_err(|e| StoreError::Corrupt(format!("message {}: {}", row.message_id, e)))?;
        Ok(PostedMessage {
            message_id: row.message_id,
            content: row.content,
            position,
            created_at: row.created_at,
        })
    }
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute("SET application_name = 'geobot';").await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 建表与索引，启动时调用一次
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("Database schema ready");
        Ok(())
    }
}

#[async_trait]
impl SpatialStore for PgStore {
    async fn upsert_location(
        &self,
        user_id: &str,
        position: Position,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO locations (user_id, latitude, longitude, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
            SET latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(user_id)
        .bind(position.latitude())
        .bind(position.longitude())
        .bind(timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_location(&self, user_id: &str) -> Result<UserLocation, StoreError> {
        let row = sqlx::query_as::<_, LocationRow>(
            r#"
            SELECT user_id, latitude, longitude, updated_at
            FROM locations
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| StoreError::NotFound(user_id.to_string()))?
            .try_into()
    }

    async fn insert_message(
        &self,
        content: &str,
        position: Position,
        timestamp: DateTime<Utc>,
    ) -> Result<MessageId, StoreError> {
        let message_id = new_message_id(timestamp);

        sqlx::query(
            r#"
            INSERT INTO messages (message_id, content, latitude, longitude, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(message_id)
        .bind(content)
        .bind(position.latitude())
        .bind(position.longitude())
        .bind(timestamp)
        .execute(&self.pool)
        .await?;

        Ok(message_id)
    }

    async fn query_nearby(&self, query: NearbyQuery) -> Result<Vec<PostedMessage>, StoreError> {
        if query.limit == 0 {
            return Ok(Vec::new());
        }

        // 先用经纬度范围走索引，再在 SQL 中精确计算球面距离
        let bbox = BoundingBox::around(&query.center, query.max_distance_meters);
        let (lon_a, lon_b) = match bbox.lon_spans.as_slice() {
            [only] => (*only, *only),
            [first, second, ..] => (*first, *second),
            [] => ((-180.0, 180.0), (-180.0, 180.0)),
        };
        let order_by = match query.order {
            SortOrder::MostRecentFirst => "created_at DESC, message_id DESC",
        };

        let sql = format!(
            r#"
            SELECT message_id, content, latitude, longitude, created_at
            FROM messages
            WHERE latitude BETWEEN $1 AND $2
                AND (longitude BETWEEN $3 AND $4 OR longitude BETWEEN $5 AND $6)
                AND 2 * $7::DOUBLE PRECISION * ASIN(LEAST(1.0, SQRT(
                    POWER(SIN(RADIANS(latitude - $8::DOUBLE PRECISION) / 2), 2)
                    + COS(RADIANS($8::DOUBLE PRECISION)) * COS(RADIANS(latitude))
                    * POWER(SIN(RADIANS(longitude - $9::DOUBLE PRECISION) / 2), 2)
                ))) <= $10
            ORDER BY {order_by}
            LIMIT $11
            "#
        );

        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(bbox.min_lat)
            .bind(bbox.max_lat)
            .bind(lon_a.0)
            .bind(lon_a.1)
            .bind(lon_b.0)
            .bind(lon_b.1)
            .bind(EARTH_RADIUS_METERS)
            .bind(query.center.latitude())
            .bind(query.center.longitude())
            .bind(query.max_distance_meters)
            .bind(i64::try_from(query.limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(PostedMessage::try_from).collect()
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Postgres pool closed");
    }
}
