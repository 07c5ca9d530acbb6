use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::service::{DEFAULT_LIMIT, DEFAULT_MAX_TEXT_LEN, DEFAULT_RADIUS_METERS, ProximityPolicy};
use crate::store::DEFAULT_PRECISION_BITS;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(StoreBackend::Postgres),
            "memory" | "mem" => Ok(StoreBackend::Memory),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub redis_url: Option<String>,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub nearby_radius_meters: f64,
    pub nearby_limit: usize,
    pub max_message_length: usize,
    pub index_precision_bits: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_backend: StoreBackend::Memory,
            database_url: None,
            database_max_connections: 10,
            redis_url: None,
            server_host: "::".to_string(),
            server_port: 3000,
            api_base_uri: "/api".to_string(),
            rate_limit_window_secs: 60,
            rate_limit_requests: 100,
            nearby_radius_meters: DEFAULT_RADIUS_METERS,
            nearby_limit: DEFAULT_LIMIT,
            max_message_length: DEFAULT_MAX_TEXT_LEN,
            index_precision_bits: DEFAULT_PRECISION_BITS,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 从任意键值来源读取配置，未设置的项使用默认值
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let database_url = lookup("DATABASE_URL").filter(|s| !s.is_empty());
        let redis_url = lookup("REDIS_URL").filter(|s| !s.is_empty());

        let store_backend = match lookup("STORE_BACKEND") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "STORE_BACKEND",
                value,
            })?,
            None if database_url.is_some() => StoreBackend::Postgres,
            None => StoreBackend::Memory,
        };
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let config = Config {
            store_backend,
            database_url,
            redis_url,
            database_max_connections: parse_or(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            )?,
            server_host: lookup("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parse_or(&lookup, "SERVER_PORT", defaults.server_port)?,
            api_base_uri: lookup("API_BASE_URI").unwrap_or(defaults.api_base_uri),
            rate_limit_window_secs: parse_or(
                &lookup,
                "RATE_LIMIT_WINDOW",
                defaults.rate_limit_window_secs,
            )?,
            rate_limit_requests: parse_or(
                &lookup,
                "RATE_LIMIT_REQUESTS",
                defaults.rate_limit_requests,
            )?,
            nearby_radius_meters: parse_or(
                &lookup,
                "NEARBY_RADIUS_METERS",
                defaults.nearby_radius_meters,
            )?,
            nearby_limit: parse_or(&lookup, "NEARBY_LIMIT", defaults.nearby_limit)?,
            max_message_length: parse_or(
                &lookup,
                "MAX_MESSAGE_LENGTH",
                defaults.max_message_length,
            )?,
            index_precision_bits: parse_or(
                &lookup,
                "INDEX_PRECISION_BITS",
                defaults.index_precision_bits,
            )?,
        };

        if !(config.nearby_radius_meters.is_finite() && config.nearby_radius_meters > 0.0) {
            return Err(ConfigError::Invalid {
                name: "NEARBY_RADIUS_METERS",
                value: config.nearby_radius_meters.to_string(),
            });
        }

        Ok(config)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn proximity_policy(&self) -> ProximityPolicy {
        ProximityPolicy {
            radius_meters: self.nearby_radius_meters,
            limit: self.nearby_limit,
            max_text_len: self.max_message_length,
        }
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_memory_store_and_reference_policy() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.proximity_policy(), ProximityPolicy::default());
        assert_eq!(config.server_port, 3000);
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn database_url_selects_postgres() {
        let config =
            Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/geobot")]))
                .unwrap();
        assert_eq!(config.store_backend, StoreBackend::Postgres);
    }

    #[test]
    fn postgres_backend_requires_database_url() {
        let err = Config::from_lookup(lookup(&[("STORE_BACKEND", "postgres")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn overrides_policy_values() {
        let config = Config::from_lookup(lookup(&[
            ("NEARBY_RADIUS_METERS", "500"),
            ("NEARBY_LIMIT", "10"),
        ]))
        .unwrap();
        assert_eq!(config.proximity_policy().radius_meters, 500.0);
        assert_eq!(config.proximity_policy().limit, 10);
    }

    #[test]
    fn rejects_malformed_numbers() {
        let err = Config::from_lookup(lookup(&[("SERVER_PORT", "eighty")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "SERVER_PORT",
                ..
            }
        ));
        assert!(Config::from_lookup(lookup(&[("NEARBY_RADIUS_METERS", "-1")])).is_err());
    }
}
