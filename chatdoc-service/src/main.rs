use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

mod api;
mod config;
mod db;
mod error;
mod extract;
mod remote;
mod service;

use crate::config::ServiceConfig;
use crate::db::Database;
use crate::service::ChatDocService;
use crate::service::readiness::start_readiness_worker;

// Re-export config crate types to avoid namespace collision
use ::config::{Config as ConfigBuilder, Environment, File};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    info!(
        "Starting document chat service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config: ServiceConfig = ConfigBuilder::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::with_prefix("CHATDOC")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    info!(
        host = %config.server.host,
        port = config.server.port,
        remote = %config.remote.base_url,
        "Configuration loaded"
    );

    // Ensure data directory exists
    std::fs::create_dir_all(&config.storage.data_dir)?;

    let db_path = config.storage.data_dir.join("chatdoc.db");
    let db = Arc::new(Database::open(&db_path)?);
    info!(path = %db_path.display(), "Database initialized");

    let service = Arc::new(ChatDocService::new(db, config.clone()).await?);

    // Resume polling for any documents left pending across a restart
    start_readiness_worker(service.clone());

    let app = api::router(service);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("chatdoc_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
