use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use geobot::{
    AppState, config::Config, middleware::RateLimiter, routes, service::ProximityService, store,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    // 打开存储，建表失败直接退出
    let store = store::open(&config)
        .await
        .expect("Failed to open spatial store");

    let service = ProximityService::with_policy(store.clone(), config.proximity_policy());
    tracing::info!(
        "Nearby policy: radius {} m, limit {}",
        config.nearby_radius_meters,
        config.nearby_limit
    );

    // 设置了 REDIS_URL 才启用限流
    let rate_limiter = config.redis_url.as_deref().map(|url| {
        let client = redis::Client::open(url).expect("Failed to create Redis client");
        Arc::new(RateLimiter::new(
            client,
            config.rate_limit_window(),
            config.rate_limit_requests,
        ))
    });
    if rate_limiter.is_none() {
        tracing::info!("REDIS_URL not set, rate limiting disabled");
    }

    let state = AppState {
        service,
        config: config.clone(),
    };
    let app = routes::router(state, rate_limiter);

    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    store.close().await;
    tracing::info!("Shutdown complete");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
