//! 球面坐标与距离计算
//!
//! 所有坐标对外序列化为 GeoJSON Point，坐标顺序为 `[经度, 纬度]`。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 地球平均半径（米）
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinateError {
    #[error("latitude {0} is outside [-90, 90]")]
    Latitude(f64),
    #[error("longitude {0} is outside [-180, 180]")]
    Longitude(f64),
    #[error("unsupported geometry type `{0}`")]
    GeometryType(String),
}

/// 地球表面上的一个点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GeoJsonPoint", into = "GeoJsonPoint")]
pub struct Position {
    longitude: f64,
    latitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        // NaN 不满足区间判断，会在这里被拒绝
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::Latitude(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::Longitude(longitude));
        }
        Ok(Self {
            longitude,
            latitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// GeoJSON 顺序的坐标
    pub fn coordinates(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }

    /// 大圆距离（米）
    pub fn distance_to(&self, other: &Position) -> f64 {
        calculate_distance(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

// 使用 Haversine 公式计算距离
pub fn calculate_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_phi = (lat2 - lat1).to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let a = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_METERS * c
}

#[derive(Debug, Serialize, Deserialize)]
struct GeoJsonPoint {
    #[serde(rename = "type")]
    kind: String,
    coordinates: [f64; 2],
}

impl TryFrom<GeoJsonPoint> for Position {
    type Error = CoordinateError;

    fn try_from(point: GeoJsonPoint) -> Result<Self, Self::Error> {
        if point.kind != "Point" {
            return Err(CoordinateError::GeometryType(point.kind));
        }
        let [longitude, latitude] = point.coordinates;
        Position::new(latitude, longitude)
    }
}

impl From<Position> for GeoJsonPoint {
    fn from(position: Position) -> Self {
        Self {
            kind: "Point".to_string(),
            coordinates: position.coordinates(),
        }
    }
}

/// 以某点为中心、给定半径的外接经纬度矩形
///
/// 跨越反经线时经度区间拆成两段；覆盖极点时经度取全范围。
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub lon_spans: Vec<(f64, f64)>,
}

impl BoundingBox {
    pub fn around(center: &Position, radius_meters: f64) -> Self {
        let angular = radius_meters.max(0.0) / EARTH_RADIUS_METERS;
        let lat_delta = angular.to_degrees();
        let min_lat = center.latitude - lat_delta;
        let max_lat = center.latitude + lat_delta;

        if min_lat <= -90.0 || max_lat >= 90.0 || angular >= std::f64::consts::PI {
            return Self {
                min_lat: min_lat.max(-90.0),
                max_lat: max_lat.min(90.0),
                lon_spans: vec![(-180.0, 180.0)],
            };
        }

        let ratio = angular.sin() / center.latitude.to_radians().cos();
        let lon_delta = ratio.min(1.0).asin().to_degrees();
        let min_lon = center.longitude - lon_delta;
        let max_lon = center.longitude + lon_delta;

        let lon_spans = if lon_delta >= 180.0 {
            vec![(-180.0, 180.0)]
        } else if min_lon < -180.0 {
            vec![(min_lon + 360.0, 180.0), (-180.0, max_lon)]
        } else if max_lon > 180.0 {
            vec![(min_lon, 180.0), (-180.0, max_lon - 360.0)]
        } else {
            vec![(min_lon, max_lon)]
        };

        Self {
            min_lat,
            max_lat,
            lon_spans,
        }
    }

    pub fn contains(&self, position: &Position) -> bool {
        position.latitude >= self.min_lat
            && position.latitude <= self.max_lat
            && self
                .lon_spans
                .iter()
                .any(|(lo, hi)| position.longitude >= *lo && position.longitude <= *hi)
    }
}
