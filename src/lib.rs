use config::Config;
use service::ProximityService;

pub mod config;
pub mod gateway;
pub mod geo;
pub mod middleware;
pub mod routes;
pub mod service;
pub mod store;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub service: ProximityService,
    pub config: Config,
}
