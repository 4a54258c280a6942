use anyhow::Result;
use dotenvy::dotenv;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use scrapsoc::api::{create_router, AppState};
use scrapsoc::config::SocConfig;
use scrapsoc::containment::MemoryAccountRegistry;
use scrapsoc::playbooks::MemoryIncidentStore;
use scrapsoc::security_log::initialize_event_store;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let config = SocConfig::load()?;
    init_tracing(&config);

    let store = initialize_event_store(
        config.store.backend.as_str(),
        config.store.file_path.clone(),
        config.store.redis_url.as_deref(),
    )?;

    let accounts = Arc::new(MemoryAccountRegistry::new());
    let seeded = accounts.seed(&config.accounts.seed).await;
    let incidents = Arc::new(MemoryIncidentStore::new());

    let state = AppState::build(&config, store, accounts, incidents)?;
    let sweeper = state
        .rate_limiter
        .clone()
        .spawn_sweeper(Duration::from_secs(config.rate_limit.sweep_interval_secs));

    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(
        address = %addr,
        environment = %config.environment,
        store = config.store.backend.as_str(),
        seeded_accounts = seeded,
        trust_proxy_headers = config.server.trust_proxy_headers,
        "scrapsoc listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    sweeper.abort();
    Ok(())
}

fn init_tracing(config: &SocConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    if config.observability.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
