use portal_gate::{
    config::{AppConfig, Env},
    devserver::{DevState, create_router},
};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Entry point of the development API: configuration, logging, seeded directory and
/// the HTTP server.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging Filter Setup
    // RUST_LOG wins; otherwise sensible defaults for local development.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "portal_gate=debug,tower_http=info".into());

    // 3. Initialize Logging based on Environment
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
            tracing::warn!("the development API serves seeded fixtures only");
        }
    }

    tracing::info!("Development API starting in {:?} mode", config.env);

    // 4. Unified State Assembly
    let bind_addr = config.bind_addr.clone();
    let app = create_router(DevState::seeded(config));

    // 5. Server Startup
    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: failed to bind PORTAL_BIND_ADDR");

    tracing::info!("Listening on {}", bind_addr);

    axum::serve(listener, app)
        .await
        .expect("FATAL: development API terminated");
}
