mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use parley_api::state::AppStateInner;
use parley_gateway::registry::Registry;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "parley=debug,parley_api=debug,parley_core=debug,parley_db=debug,\
                     parley_gateway=debug,tower_http=debug"
                        .into()
                }),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(parley_db::Database::open(&config.db_path)?);

    // Connection registry with its recurring dead-channel sweep
    let registry = Registry::new();
    let _pruner = registry.spawn_pruner();

    let state = AppStateInner::new(db, registry, config.first_user.clone());
    state
        .users
        .ensure_first_user(&config.first_user, &config.first_password)
        .await
        .map_err(|e| anyhow::anyhow!("seeding first user failed: {}", e))?;

    let app = parley_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Parley server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
