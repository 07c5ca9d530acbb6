use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    MessageId, NearbyQuery, PostedMessage, SortOrder, SpatialStore, StoreError, UserLocation,
    new_message_id,
};
use crate::geo::{BoundingBox, Position};

pub const DEFAULT_PRECISION_BITS: u32 = 26;

/// 进程内存储，消息按经纬度网格建立索引
///
/// 网格每个维度使用 `precision_bits / 2` 位，26 位时单元约为 0.022° x 0.044°。
pub struct MemoryStore {
    grid: Grid,
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    locations: HashMap<String, UserLocation>,
    messages: Vec<PostedMessage>,
    cells: HashMap<(u32, u32), Vec<usize>>,
    closed: bool,
}

#[derive(Debug, Clone, Copy)]
struct Grid {
    cells_per_axis: u32,
    lat_step: f64,
    lon_step: f64,
}

impl Grid {
    fn new(precision_bits: u32) -> Self {
        let axis_bits = (precision_bits / 2).clamp(1, 16);
        let cells_per_axis = 1u32 << axis_bits;
        Self {
            cells_per_axis,
            lat_step: 180.0 / cells_per_axis as f64,
            lon_step: 360.0 / cells_per_axis as f64,
        }
    }

    fn lat_index(&self, latitude: f64) -> u32 {
        let idx = ((latitude + 90.0) / self.lat_step).floor() as u32;
        idx.min(self.cells_per_axis - 1)
    }

    fn lon_index(&self, longitude: f64) -> u32 {
        let idx = ((longitude + 180.0) / self.lon_step).floor() as u32;
        idx.min(self.cells_per_axis - 1)
    }

    fn cell_of(&self, position: &Position) -> (u32, u32) {
        (
            self.lat_index(position.latitude()),
            self.lon_index(position.longitude()),
        )
    }

    /// 与矩形相交的所有单元
    fn cells_covering(&self, bbox: &BoundingBox) -> Vec<(u32, u32)> {
        let lat_lo = self.lat_index(bbox.min_lat);
        let lat_hi = self.lat_index(bbox.max_lat);
        let mut cells = Vec::new();
        for (lon_min, lon_max) in &bbox.lon_spans {
            let lon_lo = self.lon_index(*lon_min);
            let lon_hi = self.lon_index(*lon_max);
            for lat in lat_lo..=lat_hi {
                for lon in lon_lo..=lon_hi {
                    cells.push((lat, lon));
                }
            }
        }
        cells
    }

    fn cell_count(&self, bbox: &BoundingBox) -> u64 {
        let lat_cells = (self.lat_index(bbox.max_lat) - self.lat_index(bbox.min_lat)) as u64 + 1;
        bbox.lon_spans
            .iter()
            .map(|(lo, hi)| (self.lon_index(*hi) - self.lon_index(*lo)) as u64 + 1)
            .sum::<u64>()
            * lat_cells
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_precision(DEFAULT_PRECISION_BITS)
    }

    pub fn with_precision(precision_bits: u32) -> Self {
        Self {
            grid: Grid::new(precision_bits),
            inner: RwLock::new(Inner::default()),
        }
    }

    pub async fn message_count(&self) -> usize {
        self.inner.read().await.messages.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_open(inner: &Inner) -> Result<(), StoreError> {
    if inner.closed {
        return Err(StoreError::Unavailable("memory store is closed".into()));
    }
    Ok(())
}

#[async_trait]
impl SpatialStore for MemoryStore {
    async fn upsert_location(
        &self,
        user_id: &str,
        position: Position,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        ensure_open(&inner)?;
        inner.locations.insert(
            user_id.to_string(),
            UserLocation {
                user_id: user_id.to_string(),
                position,
                updated_at: timestamp,
            },
        );
        Ok(())
    }

    async fn get_location(&self, user_id: &str) -> Result<UserLocation, StoreError> {
        let inner = self.inner.read().await;
        ensure_open(&inner)?;
        inner
            .locations
            .get(user_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(user_id.to_string()))
    }

    async fn insert_message(
        &self,
        content: &str,
        position: Position,
        timestamp: DateTime<Utc>,
    ) -> Result<MessageId, StoreError> {
        let mut inner = self.inner.write().await;
        ensure_open(&inner)?;

        let message_id = new_message_id(timestamp);
        let idx = inner.messages.len();
        inner.messages.push(PostedMessage {
            message_id,
            content: content.to_string(),
            position,
            created_at: timestamp,
        });
        inner
            .cells
            .entry(self.grid.cell_of(&position))
            .or_default()
            .push(idx);

        Ok(message_id)
    }

    async fn query_nearby(&self, query: NearbyQuery) -> Result<Vec<PostedMessage>, StoreError> {
        let inner = self.inner.read().await;
        ensure_open(&inner)?;
        if query.limit == 0 {
            return Ok(Vec::new());
        }

        let bbox = BoundingBox::around(&query.center, query.max_distance_meters);
        let within = |m: &PostedMessage| {
            bbox.contains(&m.position)
                && query.center.distance_to(&m.position) <= query.max_distance_meters
        };

        // 覆盖的单元比消息还多时，直接扫描更快
        let mut found: Vec<&PostedMessage> =
            if self.grid.cell_count(&bbox) > inner.messages.len() as u64 {
                inner.messages.iter().filter(|m| within(*m)).collect()
            } else {
                self.grid
                    .cells_covering(&bbox)
                    .iter()
                    .filter_map(|cell| inner.cells.get(cell))
                    .flatten()
                    .map(|idx| &inner.messages[*idx])
                    .filter(|m| within(*m))
                    .collect()
            };

        match query.order {
            SortOrder::MostRecentFirst => found.sort_by(|a, b| {
                b.created_at
                    .cmp(&a.created_at)
                    .then_with(|| b.message_id.cmp(&a.message_id))
            }),
        }
        found.truncate(query.limit);

        Ok(found.into_iter().cloned().collect())
    }

    async fn close(&self) {
        let mut inner = self.inner.write().await;
        inner.closed = true;
        tracing::info!(
            "Memory store closed with {} locations and {} messages",
            inner.locations.len(),
            inner.messages.len()
        );
    }
}
